use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Coarse system health bucket selecting the fallback policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResilienceLevel {
    Normal,
    DegradedForecast,
    DegradedTariff,
    DegradedHardware,
    SafeMode,
    Offline,
}

impl Default for ResilienceLevel {
    fn default() -> Self {
        ResilienceLevel::Normal
    }
}
