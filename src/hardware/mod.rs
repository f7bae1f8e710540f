pub mod adapter;
pub mod simulated;

pub use adapter::{AdapterError, InverterAdapter};
pub use simulated::SimulatedInverterAdapter;
