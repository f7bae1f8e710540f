pub mod monitor;
pub mod reserve;

pub use monitor::{StormMonitor, StormState};
pub use reserve::{calculate_reserve_soc, estimate_hours_at_reserve};
