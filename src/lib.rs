pub mod arbitrage;
pub mod cache;
pub mod catalog;
pub mod common;
pub mod execution;
pub mod fees;
pub mod markets;
pub mod net;
pub mod telemetry;
