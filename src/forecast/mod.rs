pub mod aggregator;
pub mod history;
pub mod spike;
pub mod types;

pub use aggregator::{AggregatedForecast, ForecastAggregator, ProviderId, RefreshOutcome, ValidityWindows};
pub use history::{HistoryAverages, HistoryMetric};
pub use spike::{SpikeDetector, SpikeEvent};
pub use types::*;
