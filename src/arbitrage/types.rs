use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::markets::types::SourceTag;

/// `Fast` compares gross prices; `Complete` deducts the reference
/// marketplace's fee schedule first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeMode {
    Fast,
    Complete,
}

impl FromStr for ComputeMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_lowercase().as_str() {
            "fast" => Ok(ComputeMode::Fast),
            "complete" => Ok(ComputeMode::Complete),
            other => Err(format!("unknown mode '{other}' (expected fast|complete)")),
        }
    }
}

impl std::fmt::Display for ComputeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComputeMode::Fast => write!(f, "fast"),
            ComputeMode::Complete => write!(f, "complete"),
        }
    }
}

/// One buy-here-sell-there opportunity that cleared every filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub name: String,
    pub buy_source: SourceTag,
    pub buy_price: f64,
    pub buy_url: String,
    pub reference_gross_price: f64,
    pub reference_net_price: f64,
    pub profit_absolute: f64,
    pub profit_ratio: f64,
    pub reference_url: String,
    pub computed_at: DateTime<Utc>,
}

/// One engine pass as persisted in the snapshot file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpportunityBatch {
    pub timestamp: String,
    pub total_opportunities: usize,
    pub mode: ComputeMode,
    pub opportunities: Vec<Opportunity>,
}

/// `profitability_data.json`: the latest batch plus a bounded history of
/// displaced ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpportunitySnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<OpportunityBatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub history: Vec<OpportunityBatch>,
}

pub const HISTORY_LIMIT: usize = 10;

impl OpportunitySnapshot {
    /// Install a new current batch, pushing the displaced one onto the
    /// history and trimming it to the newest `HISTORY_LIMIT` entries.
    pub fn rotate(&mut self, batch: OpportunityBatch) {
        if let Some(previous) = self.current.take() {
            self.history.push(previous);
        }
        if self.history.len() > HISTORY_LIMIT {
            let excess = self.history.len() - HISTORY_LIMIT;
            self.history.drain(0..excess);
        }
        self.last_updated = Some(batch.timestamp.clone());
        self.current = Some(batch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(ts: &str) -> OpportunityBatch {
        OpportunityBatch {
            timestamp: ts.to_string(),
            total_opportunities: 0,
            mode: ComputeMode::Complete,
            opportunities: Vec::new(),
        }
    }

    #[test]
    fn mode_parses_both_ways() {
        assert_eq!(ComputeMode::from_str("FAST").unwrap(), ComputeMode::Fast);
        assert_eq!(
            ComputeMode::from_str("complete").unwrap(),
            ComputeMode::Complete
        );
        assert!(ComputeMode::from_str("turbo").is_err());
    }

    #[test]
    fn rotation_keeps_at_most_ten_batches() {
        let mut snapshot = OpportunitySnapshot::default();
        for i in 0..15 {
            snapshot.rotate(batch(&format!("t{i}")));
        }
        assert_eq!(snapshot.history.len(), HISTORY_LIMIT);
        assert_eq!(snapshot.current.as_ref().unwrap().timestamp, "t14");
        // Oldest surviving history entry is t4 (t0..t3 trimmed).
        assert_eq!(snapshot.history[0].timestamp, "t4");
        assert_eq!(snapshot.last_updated.as_deref(), Some("t14"));
    }
}
