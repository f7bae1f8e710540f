use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

/// Current observed state of a controllable load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LoadState {
    On,
    Off,
    Unknown,
    Error,
}

/// Status report from a load controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadStatus {
    pub load_id: String,
    pub name: String,
    pub state: LoadState,
    pub power_w: f64,
    pub is_available: bool,
    pub error: Option<String>,
}

#[derive(Debug, Error)]
pub enum LoadControllerError {
    #[error("load controller communication error: {0}")]
    Communication(String),
    #[error("load controller unreachable")]
    Unavailable,
}

/// Adapter boundary for a single controllable household load (Shelly relay,
/// MQTT-driven contactor, etc). Every concrete integration implements this
/// and nothing upstream needs to know which.
#[async_trait]
pub trait LoadController: Send + Sync {
    fn load_id(&self) -> &str;
    fn name(&self) -> &str;
    /// Rated power consumption in watts.
    fn power_w(&self) -> f64;
    /// 1 = critical, 5 = opportunistic.
    fn priority_class(&self) -> u8;

    async fn turn_on(&self) -> Result<bool, LoadControllerError>;
    async fn turn_off(&self) -> Result<bool, LoadControllerError>;
    async fn get_status(&self) -> Result<LoadStatus, LoadControllerError>;
    async fn is_available(&self) -> bool;
}
