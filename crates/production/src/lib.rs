//! Production plans (event-sourced).
//!
//! Only completion has effects: it consumes raw materials and credits finished
//! goods at the configured location.

pub mod plan;

pub use plan::{
    BindVariant, CancelPlan, CompletePlan, ConfirmPlan, CreatePlan, MaterialUsage,
    MaterialUsageRecorded, NewMaterialUsage, NewProductionLine, OutputMovement, OutputRecorded,
    PlanCancelled, PlanCommand, PlanCompleted, PlanConfirmed, PlanCreated, PlanEvent, PlanId,
    PlanStatus, ProductionLine, ProductionPlan, ProductionStarted, RecordMaterialUsage,
    RecordOutput, StartProduction, VariantBound,
};
