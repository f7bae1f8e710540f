pub mod fallback;
pub mod health;
pub mod manager;
pub mod modes;

pub use fallback::get_fallback_command;
pub use health::{HealthChecker, ProviderHealth};
pub use manager::{ResilienceManager, ResilienceState};
pub use modes::ResilienceLevel;
