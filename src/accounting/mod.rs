pub mod billing_cycle;
pub mod engine;
pub mod events;
pub mod fixed_costs;
pub mod wacb;

pub use billing_cycle::{BillingCycleManager, BillingCycleSummary};
pub use engine::{AccountingEngine, AccountingSummary};
pub use events::{AccountingEvent, AccountingEventKind};
pub use fixed_costs::{calculate_fixed_costs, daily_arbitrage_target, FixedCostBreakdown};
pub use wacb::{CostBasisTracker, WacbState};
