use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{Value, json};

use retailerp_api::app::build_app;
use retailerp_api::app::services::build_in_memory_services;
use retailerp_core::{ActorId, ItemVariantId, LocationId};
use retailerp_infra::config::LedgerConfig;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory stores, ephemeral port.
        let services = build_in_memory_services(LedgerConfig::default()).expect("services");
        let app = build_app(Arc::new(services));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct Client {
    http: reqwest::Client,
    base_url: String,
    actor: ActorId,
}

impl Client {
    fn new(srv: &TestServer) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: srv.base_url.clone(),
            actor: ActorId::new(),
        }
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let res = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header("x-actor-id", self.actor.to_string())
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header("x-actor-id", self.actor.to_string())
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn quantity(&self, location: LocationId, variant: ItemVariantId) -> i64 {
        let (status, body) = self
            .get(&format!("/inventory/records/{location}/{variant}"))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["quantity"].as_i64().unwrap()
    }

    async fn adjust(&self, location: LocationId, variant: ItemVariantId, delta: i64) {
        let (status, body) = self
            .post(
                "/inventory/adjust",
                json!({ "location_id": location, "item_variant_id": variant, "delta": delta }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(format!("{}/health", srv.base_url)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn domain_routes_require_an_actor() {
    let srv = TestServer::spawn().await;

    let res = reqwest::Client::new()
        .get(format!("{}/inventory/records", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = reqwest::Client::new()
        .get(format!("{}/inventory/records", srv.base_url))
        .header("x-actor-id", "nobody")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn adjustment_shows_up_in_records_and_ledger() {
    let srv = TestServer::spawn().await;
    let client = Client::new(&srv);
    let (location, variant) = (LocationId::new(), ItemVariantId::new());

    assert_eq!(client.quantity(location, variant).await, 0);
    client.adjust(location, variant, 12).await;
    assert_eq!(client.quantity(location, variant).await, 12);

    let (status, body) = client
        .get(&format!("/inventory/ledger?location_id={location}&kind=adjust"))
        .await;
    assert_eq!(status, StatusCode::OK);
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["kind"], "ADJUST");
    assert_eq!(items[0]["quantity_delta"], 12);
    assert_eq!(items[0]["actor"], client.actor.to_string());

    let (status, report) = client.get("/inventory/reconcile").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["entries_checked"], 1);
}

#[tokio::test]
async fn zero_adjustment_is_a_validation_error() {
    let srv = TestServer::spawn().await;
    let client = Client::new(&srv);

    let (status, body) = client
        .post(
            "/inventory/adjust",
            json!({ "location_id": LocationId::new(), "item_variant_id": ItemVariantId::new(), "delta": 0 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn restock_credits_once_and_refuses_a_second_receipt() {
    let srv = TestServer::spawn().await;
    let client = Client::new(&srv);
    let (store, variant) = (LocationId::new(), ItemVariantId::new());

    let (status, restock) = client
        .post(
            "/restocks",
            json!({
                "request_number": "RS-1",
                "location_id": store,
                "lines": [{ "item_variant_id": variant, "requested_qty": 10, "unit_cost": 500 }],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{restock}");
    assert_eq!(restock["status"], "DRAFT");
    let id = restock["id"].as_str().unwrap().to_string();

    for step in ["approve", "order"] {
        let (status, body) = client.post(&format!("/restocks/{id}/{step}"), json!({})).await;
        assert_eq!(status, StatusCode::OK, "{step}: {body}");
    }

    let receipt = json!({ "lines": [{ "line_no": 1, "received_qty": 8 }] });
    let (status, body) = client.post(&format!("/restocks/{id}/receive"), receipt.clone()).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "RECEIVED");
    assert_eq!(client.quantity(store, variant).await, 8);

    let (status, body) = client.post(&format!("/restocks/{id}/receive"), receipt).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_transition");
    assert_eq!(client.quantity(store, variant).await, 8);
}

#[tokio::test]
async fn duplicate_request_number_is_a_conflict() {
    let srv = TestServer::spawn().await;
    let client = Client::new(&srv);
    let body = json!({
        "request_number": "RS-7",
        "location_id": LocationId::new(),
        "lines": [{ "item_variant_id": ItemVariantId::new(), "requested_qty": 4, "unit_cost": 500 }],
    });

    let (status, first) = client.post("/restocks", body.clone()).await;
    assert_eq!(status, StatusCode::CREATED, "{first}");

    let (status, second) = client.post("/restocks", body).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(second["error"], "conflict");

    let (status, listed) = client.get("/restocks").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["items"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn cancelled_transfer_restores_origin_and_clamps_destination() {
    let srv = TestServer::spawn().await;
    let client = Client::new(&srv);
    let (a, b) = (LocationId::new(), LocationId::new());
    let x = ItemVariantId::new();

    client.adjust(a, x, 100).await;

    let (status, shipment) = client
        .post(
            "/shipments",
            json!({
                "request_number": "TR-1",
                "kind": "TRANSFER",
                "from_location": a,
                "to_location": b,
                "lines": [{ "item_variant_id": x, "requested_qty": 10 }],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{shipment}");
    let id = shipment["id"].as_str().unwrap().to_string();

    let (status, body) = client
        .post(
            &format!("/shipments/{id}/ship"),
            json!({ "lines": [{ "line_no": 1, "quantity": 10 }] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(client.quantity(a, x).await, 90);

    let (status, body) = client
        .post(
            &format!("/shipments/{id}/receive"),
            json!({ "lines": [{ "line_no": 1, "quantity": 10 }] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(client.quantity(b, x).await, 10);

    // Goods sold at the destination before the cancel.
    client.adjust(b, x, -10).await;

    let (status, body) = client
        .post(&format!("/shipments/{id}/cancel"), json!({ "reason": "wrong store" }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "CANCELLED");

    assert_eq!(client.quantity(a, x).await, 100);
    assert_eq!(client.quantity(b, x).await, 0);

    let (status, ledger) = client
        .get(&format!("/inventory/ledger?reference_id={id}"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ledger["items"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn return_blocks_deleting_its_sale() {
    let srv = TestServer::spawn().await;
    let client = Client::new(&srv);
    let (store, variant) = (LocationId::new(), ItemVariantId::new());
    client.adjust(store, variant, 20).await;

    let (status, sale) = client
        .post(
            "/sales",
            json!({ "kind": "SALE", "location_id": store, "item_variant_id": variant, "quantity": 5 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{sale}");
    let sale_id = sale["id"].as_str().unwrap().to_string();
    assert_eq!(client.quantity(store, variant).await, 15);

    let (status, ret) = client
        .post(
            "/sales",
            json!({
                "kind": "RETURN",
                "location_id": store,
                "item_variant_id": variant,
                "quantity": 2,
                "original_sale": sale_id,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{ret}");
    assert_eq!(client.quantity(store, variant).await, 17);

    let res = client
        .http
        .delete(format!("{}/sales/{}", client.base_url, sale_id))
        .header("x-actor-id", client.actor.to_string())
        .send()
        .await
        .unwrap();
    assert!(res.status().is_client_error());
    assert_eq!(client.quantity(store, variant).await, 17);
}

#[tokio::test]
async fn malformed_ids_are_rejected() {
    let srv = TestServer::spawn().await;
    let client = Client::new(&srv);

    let (status, body) = client.get("/shipments/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_id");

    let (status, _) = client.get(&format!("/restocks/{}", ActorId::new())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
