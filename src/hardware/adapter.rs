use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{CommandResult, InverterCommand, Telemetry};

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("communication error: {0}")]
    Communication(String),
    #[error("inverter offline or unreachable")]
    Offline,
    #[error("invalid command: {0}")]
    InvalidCommand(String),
}

/// Single hardware boundary the control loop talks to. Every vendor-specific
/// integration (Modbus, a cloud API, whatever) implements this and nothing
/// upstream needs to know which.
#[async_trait]
pub trait InverterAdapter: Send + Sync {
    async fn connect(&self) -> Result<(), AdapterError>;
    async fn disconnect(&self) -> Result<(), AdapterError>;
    async fn is_connected(&self) -> bool;
    async fn get_telemetry(&self) -> Result<Telemetry, AdapterError>;
    async fn send_command(&self, command: InverterCommand) -> Result<CommandResult, AdapterError>;
}
