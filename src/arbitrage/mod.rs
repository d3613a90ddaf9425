pub mod engine;
pub mod types;

pub use engine::{ArbitrageEngine, EngineParams};
pub use types::{ComputeMode, Opportunity, OpportunitySnapshot};
