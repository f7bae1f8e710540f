pub mod command;
pub mod telemetry;
pub mod types;

pub use command::*;
pub use telemetry::*;
pub use types::*;
