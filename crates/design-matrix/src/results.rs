//! Run summary written next to the design matrix.
//!
//! Captures:
//! - A deterministic design id (same parameters and seed, same id)
//! - Shape of the design and the seed used
//! - Balance spreads before and after repair
//! - Every talker reassignment made by the repair

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use counterbalance_kernel::{BalanceReport, DesignOutcome, DesignParams, RepairOutcome};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace UUID for generating deterministic design IDs.
const DESIGN_NAMESPACE: Uuid = Uuid::from_bytes([
    0x3f, 0x1c, 0x52, 0x8e, 0x47, 0x0b, 0x4d, 0x9a, 0x8c, 0x61, 0x2e, 0x95, 0xd7, 0x30, 0xb4, 0x1f,
]);

/// Summary of one generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignSummary {
    /// UUID v5 over the parameters and seed
    pub design_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub seed: u64,
    pub n_listeners: usize,
    pub n_sentences: usize,
    pub n_snrs: usize,
    pub n_talkers: usize,
    pub total_trials: usize,
    pub snr_levels: Vec<String>,
    /// Balance right after rotation
    pub initial_balance: BalanceReport,
    /// Balance of the written matrix
    pub final_balance: BalanceReport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repair: Option<RepairOutcome>,
}

impl DesignSummary {
    /// Summarize a finished run.
    pub fn new(params: &DesignParams, outcome: &DesignOutcome) -> Self {
        Self {
            design_id: design_id(params, outcome.seed),
            generated_at: Utc::now(),
            seed: outcome.seed,
            n_listeners: params.n_listeners,
            n_sentences: params.sentences.len(),
            n_snrs: params.snrs.len(),
            n_talkers: params.talkers.len(),
            total_trials: outcome.matrix.len(),
            snr_levels: params.rendered_snrs(),
            initial_balance: outcome.initial_balance.clone(),
            final_balance: outcome.final_balance.clone(),
            repair: outcome.repair.clone(),
        }
    }

    /// Save the summary to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write summary {}", path.display()))?;
        Ok(())
    }

    /// Load a summary from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read summary {}", path.display()))?;
        let summary = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse summary {}", path.display()))?;
        Ok(summary)
    }
}

/// Deterministic identifier for a (parameters, seed) combination.
pub fn design_id(params: &DesignParams, seed: u64) -> Uuid {
    let key = format!(
        "listeners={};sentences={};snrs={};talkers={};format={};seed={}",
        params.n_listeners,
        params.sentences.join(","),
        params.rendered_snrs().join(","),
        params.talkers.join(","),
        params.snr_format,
        seed
    );
    Uuid::new_v5(&DESIGN_NAMESPACE, key.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use counterbalance_kernel::{DesignPipeline, MissingStimulus};

    fn params() -> DesignParams {
        DesignParams {
            snrs: vec![-1.0, 1.0],
            talkers: vec!["X".to_string(), "Y".to_string()],
            sentences: ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect(),
            n_listeners: 2,
            block_len: 4,
            ..Default::default()
        }
    }

    #[test]
    fn test_design_id_is_deterministic() {
        let p = params();
        assert_eq!(design_id(&p, 1), design_id(&p, 1));
        assert_ne!(design_id(&p, 1), design_id(&p, 2));

        let other = DesignParams {
            n_listeners: 3,
            ..params()
        };
        assert_ne!(design_id(&p, 1), design_id(&other, 1));
    }

    #[test]
    fn test_save_and_load() {
        let p = params();
        let outcome = DesignPipeline::new(p.clone())
            .with_missing(vec![MissingStimulus::new("X", "a"), MissingStimulus::new("Y", "b")])
            .run()
            .unwrap();
        let summary = DesignSummary::new(&p, &outcome);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        summary.save(&path).unwrap();
        let loaded = DesignSummary::load(&path).unwrap();

        assert_eq!(loaded.design_id, summary.design_id);
        assert_eq!(loaded.total_trials, 8);
        assert_eq!(loaded.snr_levels, vec!["-1.0", "+1.0"]);
        assert_eq!(loaded.repair.unwrap().repaired_rows(), 4);
        assert_eq!(loaded.final_balance, summary.final_balance);
    }

    #[test]
    fn test_load_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let absent = dir.path().join("absent.json");
        let err = format!("{:#}", DesignSummary::load(&absent).unwrap_err());
        assert!(err.contains("absent.json"), "{}", err);

        let garbled = dir.path().join("garbled.json");
        std::fs::write(&garbled, "{ not json").unwrap();
        let err = format!("{:#}", DesignSummary::load(&garbled).unwrap_err());
        assert!(err.contains("Failed to parse summary") && err.contains("garbled.json"), "{}", err);
    }

    #[test]
    fn test_repair_omitted_when_absent() {
        let p = params();
        let outcome = DesignPipeline::new(p.clone()).run().unwrap();
        let json = serde_json::to_string(&DesignSummary::new(&p, &outcome)).unwrap();
        assert!(!json.contains("\"repair\""));
    }
}
