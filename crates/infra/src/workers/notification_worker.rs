use std::collections::HashMap;
use std::io;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use retailerp_core::AggregateId;
use retailerp_events::{EventBus, EventEnvelope, Subscription};

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Background consumer of request notifications.
///
/// Subscribes before `spawn` returns, so nothing published afterwards is
/// missed. Redelivered envelopes (a sequence number at or below the last one
/// handled for that request) are skipped. A failing handler is logged and
/// the loop keeps going.
#[derive(Debug)]
pub struct NotificationWorker;

impl NotificationWorker {
    /// Spawn a worker thread. With `prefix`, only event types starting with
    /// it reach `handler`.
    pub fn spawn<B, H, E>(
        name: &'static str,
        bus: B,
        prefix: Option<&'static str>,
        mut handler: H,
    ) -> io::Result<WorkerHandle>
    where
        B: EventBus<EventEnvelope<JsonValue>> + Send + Sync + 'static,
        H: FnMut(EventEnvelope<JsonValue>) -> Result<(), E> + Send + 'static,
        E: core::fmt::Debug + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub = bus.subscribe();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(name, sub, shutdown_rx, prefix, &mut handler))?;

        info!(worker = name, prefix = ?prefix, "notification worker started");
        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }

    /// Worker that logs every request event it sees.
    pub fn spawn_logger<B>(bus: B) -> io::Result<WorkerHandle>
    where
        B: EventBus<EventEnvelope<JsonValue>> + Send + Sync + 'static,
    {
        Self::spawn("request-notifications", bus, None, |envelope| {
            info!(
                event_type = envelope.event_type(),
                aggregate_type = envelope.aggregate_type(),
                aggregate_id = %envelope.aggregate_id(),
                sequence = envelope.sequence_number(),
                actor = %envelope.actor(),
                "request event"
            );
            Ok::<(), core::convert::Infallible>(())
        })
    }
}

fn worker_loop<H, E>(
    name: &'static str,
    sub: Subscription<EventEnvelope<JsonValue>>,
    shutdown_rx: mpsc::Receiver<()>,
    prefix: Option<&'static str>,
    handler: &mut H,
) where
    H: FnMut(EventEnvelope<JsonValue>) -> Result<(), E>,
    E: core::fmt::Debug,
{
    let tick = Duration::from_millis(250);
    let mut last_seen: HashMap<AggregateId, u64> = HashMap::new();

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        let msg = match sub.recv_timeout(tick) {
            Ok(msg) => msg,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        };

        if prefix.is_some_and(|p| !msg.event_type().starts_with(p)) {
            continue;
        }
        let seen = last_seen.get(&msg.aggregate_id()).copied();
        if !msg.is_after(seen) {
            debug!(worker = name, event_id = %msg.event_id(), "skipping redelivered notification");
            continue;
        }
        last_seen.insert(msg.aggregate_id(), msg.sequence_number());

        if let Err(err) = handler(msg) {
            warn!(worker = name, error = ?err, "notification handler failed");
        }
    }
}
