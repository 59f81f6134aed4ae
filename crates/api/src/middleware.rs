use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use retailerp_core::ActorId;

use crate::app::errors;
use crate::context::ActorContext;

pub const ACTOR_HEADER: &str = "x-actor-id";

/// Require an `x-actor-id` header holding a UUID and attach it to the request.
pub async fn actor_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    match extract_actor(req.headers()) {
        Ok(actor_id) => {
            req.extensions_mut().insert(ActorContext::new(actor_id));
            next.run(req).await
        }
        Err(message) => errors::json_error(StatusCode::UNAUTHORIZED, "missing_actor", message),
    }
}

fn extract_actor(headers: &HeaderMap) -> Result<ActorId, &'static str> {
    let raw = headers
        .get(ACTOR_HEADER)
        .ok_or("x-actor-id header is required")?
        .to_str()
        .map_err(|_| "x-actor-id must be ASCII")?
        .trim();

    if raw.is_empty() {
        return Err("x-actor-id header is required");
    }

    raw.parse().map_err(|_| "x-actor-id must be a UUID")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn actor_header_is_parsed() {
        let actor = ActorId::new();
        let mut headers = HeaderMap::new();
        headers.insert(ACTOR_HEADER, HeaderValue::from_str(&actor.to_string()).unwrap());
        assert_eq!(extract_actor(&headers), Ok(actor));
    }

    #[test]
    fn missing_or_malformed_actor_is_rejected() {
        assert!(extract_actor(&HeaderMap::new()).is_err());

        let mut headers = HeaderMap::new();
        headers.insert(ACTOR_HEADER, HeaderValue::from_static("nobody"));
        assert_eq!(extract_actor(&headers), Err("x-actor-id must be a UUID"));
    }
}
