#[cfg(feature = "optimization")]
pub mod milp;
pub mod load_scheduler;
pub mod rebuild_evaluator;
pub mod types;

pub use load_scheduler::{schedule_loads, ScheduledLoad};
#[cfg(feature = "optimization")]
pub use milp::{dampen_price, solve};
pub use rebuild_evaluator::{RebuildEvaluator, RebuildResult};
pub use types::{OptimisationPlan, PlanMetrics, PlanSlot, PlanStatus, SolverInputs, TriggerReason};
