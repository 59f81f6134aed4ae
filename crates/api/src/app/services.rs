//! Infrastructure wiring: stores, gates, the notification bus and its workers.

use std::sync::{Arc, Mutex};

use anyhow::Context;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};

use retailerp_core::{ActorId, AggregateId};
use retailerp_infra::command_dispatcher::{CommandDispatcher, DispatchError};
use retailerp_infra::config::LedgerConfig;
use retailerp_infra::event_bus::{NotificationBus, RequestEnvelope};
use retailerp_infra::event_store::{EventStore, InMemoryEventStore, PostgresEventStore};
use retailerp_infra::inventory_store::{
    InMemoryInventoryStore, InventoryStore, PostgresInventoryStore,
};
use retailerp_infra::keyed_mutex::{GateBackend, InMemoryKeyedMutex};
use retailerp_infra::ledger_mutator::{LedgerMutator, StockLedger};
use retailerp_infra::material_store::{InMemoryMaterialStore, MaterialStore, PostgresMaterialStore};
use retailerp_infra::pg;
use retailerp_infra::workers::{NotificationWorker, WorkerHandle};
use retailerp_infra::workflows::Workflows;
use retailerp_inventory::StockKey;

pub type AppWorkflows = Workflows<Arc<dyn EventStore>, Arc<NotificationBus>, GateBackend<AggregateId>>;

/// Live feed entry pushed to `/events` subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: AggregateId,
    pub sequence_number: u64,
    pub actor: ActorId,
    pub occurred_at: chrono::DateTime<chrono::Utc>,
}

impl From<&RequestEnvelope> for Notification {
    fn from(envelope: &RequestEnvelope) -> Self {
        Self {
            event_type: envelope.event_type().to_string(),
            aggregate_type: envelope.aggregate_type().to_string(),
            aggregate_id: envelope.aggregate_id(),
            sequence_number: envelope.sequence_number(),
            actor: envelope.actor(),
            occurred_at: envelope.occurred_at(),
        }
    }
}

pub struct AppServices {
    workflows: Arc<AppWorkflows>,
    realtime_tx: broadcast::Sender<Notification>,
    workers: Mutex<Vec<WorkerHandle>>,
}

impl AppServices {
    pub fn workflows(&self) -> &AppWorkflows {
        &self.workflows
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.realtime_tx.subscribe()
    }

    /// Run blocking workflow code off the async executor.
    pub async fn run<T, F>(&self, f: F) -> Result<T, DispatchError>
    where
        T: Send + 'static,
        F: FnOnce(&AppWorkflows) -> Result<T, DispatchError> + Send + 'static,
    {
        let workflows = Arc::clone(&self.workflows);
        tokio::task::spawn_blocking(move || f(workflows.as_ref()))
            .await
            .map_err(|e| DispatchError::Storage(format!("workflow task failed: {e}")))?
    }

    /// Stop the notification workers and wait for them.
    pub fn shutdown(&self) {
        let workers = match self.workers.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for worker in workers {
            worker.shutdown();
        }
    }
}

/// Everything in process. Used by tests and by `main` when no database is set.
pub fn build_in_memory_services(config: LedgerConfig) -> anyhow::Result<AppServices> {
    let inventory: Arc<dyn InventoryStore> = Arc::new(InMemoryInventoryStore::new());
    let materials: Arc<dyn MaterialStore> = Arc::new(InMemoryMaterialStore::new());
    let events: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
    assemble(config, events, inventory, materials, Arc::new(NotificationBus::in_memory()))
}

/// Postgres persistence when `DATABASE_URL` is set; Redis bus, request gate and
/// stock gate when `REDIS_URL` is set and the `redis` feature is on.
pub async fn build_services(config: LedgerConfig) -> anyhow::Result<AppServices> {
    let bus = Arc::new(notification_bus(&config)?);

    let Some(database_url) = config.database_url.clone() else {
        info!(transport = bus.transport(), "using in-memory stores");
        let inventory: Arc<dyn InventoryStore> = Arc::new(InMemoryInventoryStore::new());
        let materials: Arc<dyn MaterialStore> = Arc::new(InMemoryMaterialStore::new());
        let events: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
        return assemble(config, events, inventory, materials, bus);
    };

    let pool = pg::connect(&database_url, 10)
        .await
        .context("failed to connect to postgres")?;
    pg::ensure_schema(&pool)
        .await
        .context("failed to create database schema")?;
    info!(transport = bus.transport(), "using postgres stores");

    let inventory: Arc<dyn InventoryStore> = Arc::new(PostgresInventoryStore::new(pool.clone()));
    let materials: Arc<dyn MaterialStore> = Arc::new(PostgresMaterialStore::new(pool.clone()));
    let events: Arc<dyn EventStore> = Arc::new(PostgresEventStore::new(pool));
    assemble(config, events, inventory, materials, bus)
}

fn assemble(
    config: LedgerConfig,
    events: Arc<dyn EventStore>,
    inventory: Arc<dyn InventoryStore>,
    materials: Arc<dyn MaterialStore>,
    bus: Arc<NotificationBus>,
) -> anyhow::Result<AppServices> {
    let ledger = stock_ledger(&config, Arc::clone(&inventory))?;
    let gate = request_gate(&config)?;
    info!(transport = gate.transport(), "request gate ready");
    let dispatcher = CommandDispatcher::with_gate(events, Arc::clone(&bus), gate);
    let workflows = Arc::new(Workflows::new(dispatcher, inventory, ledger, materials, config));

    let (realtime_tx, _) = broadcast::channel(256);
    let fanout_tx = realtime_tx.clone();
    let fanout = NotificationWorker::spawn("realtime-fanout", Arc::clone(&bus), None, move |envelope| {
        // No live subscribers is not an error.
        let _ = fanout_tx.send(Notification::from(&envelope));
        Ok::<(), core::convert::Infallible>(())
    })
    .context("failed to start realtime fan-out worker")?;
    let logger = NotificationWorker::spawn_logger(bus).context("failed to start notification logger")?;

    Ok(AppServices {
        workflows,
        realtime_tx,
        workers: Mutex::new(vec![fanout, logger]),
    })
}

#[cfg(feature = "redis")]
fn notification_bus(config: &LedgerConfig) -> anyhow::Result<NotificationBus> {
    match config.redis_url.as_deref() {
        Some(url) => NotificationBus::redis(url, "retailerp.requests")
            .context("failed to open redis notification bus"),
        None => Ok(NotificationBus::in_memory()),
    }
}

#[cfg(not(feature = "redis"))]
fn notification_bus(config: &LedgerConfig) -> anyhow::Result<NotificationBus> {
    if config.redis_url.is_some() {
        warn!("REDIS_URL is set but the redis feature is disabled; using in-process bus");
    }
    Ok(NotificationBus::in_memory())
}

/// Request gate: one transition per request, and one create per request
/// number, across every process sharing the stores.
#[cfg(feature = "redis")]
fn request_gate(config: &LedgerConfig) -> anyhow::Result<GateBackend<AggregateId>> {
    match config.redis_url.as_deref() {
        Some(url) => GateBackend::redis(url, "retailerp:requests", config.gate_timeout)
            .context("failed to open redis request gate"),
        None => Ok(GateBackend::in_process(config.gate_timeout)),
    }
}

#[cfg(not(feature = "redis"))]
fn request_gate(config: &LedgerConfig) -> anyhow::Result<GateBackend<AggregateId>> {
    Ok(GateBackend::in_process(config.gate_timeout))
}

/// Stock gate: shared across processes through Redis when available.
#[cfg(feature = "redis")]
fn stock_ledger(
    config: &LedgerConfig,
    inventory: Arc<dyn InventoryStore>,
) -> anyhow::Result<Arc<dyn StockLedger>> {
    use retailerp_infra::keyed_mutex::RedisKeyedMutex;

    match config.redis_url.as_deref() {
        Some(url) => {
            let gate = RedisKeyedMutex::new(url, "retailerp:stock", config.gate_timeout)
                .context("failed to open redis stock gate")?;
            Ok(Arc::new(LedgerMutator::new(inventory, gate)))
        }
        None => Ok(in_process_ledger(config, inventory)),
    }
}

#[cfg(not(feature = "redis"))]
fn stock_ledger(
    config: &LedgerConfig,
    inventory: Arc<dyn InventoryStore>,
) -> anyhow::Result<Arc<dyn StockLedger>> {
    Ok(in_process_ledger(config, inventory))
}

fn in_process_ledger(config: &LedgerConfig, inventory: Arc<dyn InventoryStore>) -> Arc<dyn StockLedger> {
    if config.database_url.is_some() {
        warn!("stock and request gates are in-process only; run a single instance per database");
    }
    Arc::new(LedgerMutator::new(
        inventory,
        InMemoryKeyedMutex::<StockKey>::new(config.gate_timeout),
    ))
}
