use chrono::Utc;
use serde_json::Value as JsonValue;

use retailerp_core::{ActorId, AggregateId};
use retailerp_events::{EventBus, EventEnvelope};
use retailerp_production::{
    BindVariant, CancelPlan, CompletePlan, ConfirmPlan, CreatePlan, PlanCommand, PlanId,
    ProductionPlan, RecordMaterialUsage, RecordOutput, StartProduction,
};

use super::{Workflows, aggregate_types};
use crate::command_dispatcher::DispatchError;
use crate::event_store::EventStore;
use crate::keyed_mutex::KeyedMutex;

fn empty(id: AggregateId) -> ProductionPlan {
    ProductionPlan::empty(PlanId(id))
}

impl<S, B, G> Workflows<S, B, G>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    G: KeyedMutex<AggregateId>,
{
    fn plan_command(&self, plan_id: PlanId, actor: ActorId, cmd: PlanCommand) -> Result<ProductionPlan, DispatchError> {
        self.execute(plan_id.0, aggregate_types::PRODUCTION_PLAN, actor, cmd, empty)
            .map(|o| o.state)
    }

    pub fn create_plan(&self, cmd: CreatePlan) -> Result<ProductionPlan, DispatchError> {
        let (id, actor) = (cmd.plan_id, cmd.actor);
        let number = cmd.plan_number.clone();
        self.create_numbered(aggregate_types::PRODUCTION_PLAN, &number, id.0, actor, || {
            self.plan_command(id, actor, PlanCommand::CreatePlan(cmd))
        })
    }

    pub fn confirm_plan(&self, cmd: ConfirmPlan) -> Result<ProductionPlan, DispatchError> {
        self.plan_command(cmd.plan_id, cmd.actor, PlanCommand::ConfirmPlan(cmd))
    }

    pub fn start_production(&self, cmd: StartProduction) -> Result<ProductionPlan, DispatchError> {
        self.plan_command(cmd.plan_id, cmd.actor, PlanCommand::StartProduction(cmd))
    }

    pub fn record_output(&self, cmd: RecordOutput) -> Result<ProductionPlan, DispatchError> {
        self.plan_command(cmd.plan_id, cmd.actor, PlanCommand::RecordOutput(cmd))
    }

    pub fn record_material_usage(&self, cmd: RecordMaterialUsage) -> Result<ProductionPlan, DispatchError> {
        self.plan_command(cmd.plan_id, cmd.actor, PlanCommand::RecordMaterialUsage(cmd))
    }

    pub fn bind_variant(&self, cmd: BindVariant) -> Result<ProductionPlan, DispatchError> {
        self.plan_command(cmd.plan_id, cmd.actor, PlanCommand::BindVariant(cmd))
    }

    /// Consume used materials and credit produced goods at the configured
    /// finished-goods location.
    pub fn complete_plan(&self, plan_id: PlanId, actor: ActorId) -> Result<ProductionPlan, DispatchError> {
        let cmd = CompletePlan {
            plan_id,
            finished_goods_location: self.config().finished_goods_location,
            actor,
            occurred_at: Utc::now(),
        };
        self.plan_command(plan_id, actor, PlanCommand::CompletePlan(cmd))
    }

    pub fn cancel_plan(&self, cmd: CancelPlan) -> Result<ProductionPlan, DispatchError> {
        self.plan_command(cmd.plan_id, cmd.actor, PlanCommand::CancelPlan(cmd))
    }

    pub fn plan(&self, plan_id: PlanId) -> Result<ProductionPlan, DispatchError> {
        self.require(plan_id.0, empty)
    }

    pub fn plans(&self) -> Result<Vec<ProductionPlan>, DispatchError> {
        self.dispatcher().load_all(aggregate_types::PRODUCTION_PLAN, empty)
    }
}
