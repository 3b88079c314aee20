//! Experiment parameters for design generation.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DesignError, DesignResult};
use crate::trial::SnrFormat;

/// Seed used when neither the parameter file nor the caller supplies one.
pub const DEFAULT_SEED: u64 = 15_485_863;

/// Upper bound on missing-stimulus repair passes.
pub const DEFAULT_MAX_REPAIR_ITERATIONS: usize = 1000;

/// Top-level design parameters.
///
/// Loaded from a YAML parameter file. The first five fields mirror what the
/// experiment runner reads; the rest tune generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DesignParams {
    /// SNR levels in dB, in rotation order
    pub snrs: Vec<f64>,

    /// Talker identifiers, in rotation order
    pub talkers: Vec<String>,

    /// Sentence identifiers; each listener hears every one exactly once
    pub sentences: Vec<String>,

    /// Number of listeners
    pub n_listeners: usize,

    /// Trials per presentation block (used for session plans)
    pub block_len: usize,

    /// Seed for the repair draws and the final shuffle
    #[serde(default)]
    pub seed: Option<u64>,

    /// Rendering of the `snr` column
    #[serde(default)]
    pub snr_format: SnrFormat,

    /// Count-balance acceptance policy
    #[serde(default)]
    pub balance: BalancePolicy,

    /// Bound on repair passes before giving up
    #[serde(default = "default_max_repair_iterations")]
    pub max_repair_iterations: usize,

    /// Treat missing records that match no trial as an error
    #[serde(default)]
    pub strict_missing: bool,
}

fn default_max_repair_iterations() -> usize {
    DEFAULT_MAX_REPAIR_ITERATIONS
}

impl Default for DesignParams {
    fn default() -> Self {
        Self {
            snrs: Vec::new(),
            talkers: Vec::new(),
            sentences: Vec::new(),
            n_listeners: 1,
            block_len: 1,
            seed: None,
            snr_format: SnrFormat::default(),
            balance: BalancePolicy::default(),
            max_repair_iterations: DEFAULT_MAX_REPAIR_ITERATIONS,
            strict_missing: false,
        }
    }
}

impl DesignParams {
    /// Parse parameters from YAML text.
    pub fn from_yaml(text: &str) -> DesignResult<Self> {
        serde_yaml::from_str(text).map_err(|e| DesignError::config(e.to_string()))
    }

    /// Seed to use, falling back to [`DEFAULT_SEED`].
    pub fn effective_seed(&self) -> u64 {
        self.seed.unwrap_or(DEFAULT_SEED)
    }

    /// Total number of trials (`n_listeners × S`).
    pub fn total_trials(&self) -> usize {
        self.n_listeners * self.sentences.len()
    }

    /// SNR levels rendered with the configured format, in rotation order.
    pub fn rendered_snrs(&self) -> Vec<String> {
        self.snrs
            .iter()
            .map(|&level| self.snr_format.render(level))
            .collect()
    }

    /// Check every field before any assignment work begins.
    pub fn validate(&self) -> DesignResult<()> {
        if self.n_listeners == 0 {
            return Err(DesignError::config("n_listeners must be at least 1"));
        }
        if self.block_len == 0 {
            return Err(DesignError::config("block_len must be at least 1"));
        }
        if self.max_repair_iterations == 0 {
            return Err(DesignError::config("max_repair_iterations must be at least 1"));
        }

        check_identifiers("sentences", &self.sentences)?;
        check_identifiers("talkers", &self.talkers)?;

        if self.snrs.is_empty() {
            return Err(DesignError::config("snrs must not be empty"));
        }
        for &level in &self.snrs {
            if !level.is_finite() {
                return Err(DesignError::config(format!("SNR level {} is not finite", level)));
            }
            if !self.snr_format.round_trips(level) {
                return Err(DesignError::config(format!(
                    "SNR level {} cannot be rendered exactly in {} format",
                    level, self.snr_format
                )));
            }
        }
        let rendered = self.rendered_snrs();
        if let Some(dup) = first_duplicate(&rendered) {
            return Err(DesignError::config(format!("duplicate SNR level {}", dup)));
        }

        Ok(())
    }
}

fn check_identifiers(field: &str, values: &[String]) -> DesignResult<()> {
    if values.is_empty() {
        return Err(DesignError::config(format!("{} must not be empty", field)));
    }
    if let Some(blank) = values.iter().find(|v| v.trim().is_empty()) {
        return Err(DesignError::config(format!(
            "{} contains a blank identifier {:?}",
            field, blank
        )));
    }
    if let Some(dup) = first_duplicate(values) {
        return Err(DesignError::config(format!("{} contains duplicate {:?}", field, dup)));
    }
    Ok(())
}

fn first_duplicate(values: &[String]) -> Option<&String> {
    let mut seen = HashSet::new();
    values.iter().find(|v| !seen.insert(v.as_str()))
}

/// How strictly grouped counts must agree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalancePolicy {
    /// Max and min group sizes may differ by one
    #[default]
    Tolerant,
    /// All group sizes must be equal
    Strict,
}

impl BalancePolicy {
    /// Largest allowed max − min spread.
    pub fn max_spread(self) -> usize {
        match self {
            BalancePolicy::Tolerant => 1,
            BalancePolicy::Strict => 0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BalancePolicy::Tolerant => "tolerant",
            BalancePolicy::Strict => "strict",
        }
    }
}

impl fmt::Display for BalancePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BalancePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tolerant" | "tol" => Ok(BalancePolicy::Tolerant),
            "strict" | "exact" => Ok(BalancePolicy::Strict),
            _ => Err(format!("Unknown balance policy: {}. Valid: tolerant, strict", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> DesignParams {
        DesignParams {
            snrs: vec![-1.0, 0.0, 1.0],
            talkers: vec!["X".to_string(), "Y".to_string()],
            sentences: ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect(),
            n_listeners: 2,
            block_len: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_params() {
        let p = params();
        assert!(p.validate().is_ok());
        assert_eq!(p.total_trials(), 8);
        assert_eq!(p.effective_seed(), DEFAULT_SEED);
    }

    #[test]
    fn test_from_yaml_with_defaults() {
        let yaml = r#"
snrs: [-6, -3, 0]
talkers: [NWF002, NWM003]
sentences: ["01-01", "01-02", "01-03"]
n_listeners: 3
block_len: 30
"#;
        let p = DesignParams::from_yaml(yaml).unwrap();
        assert_eq!(p.snrs, vec![-6.0, -3.0, 0.0]);
        assert_eq!(p.talkers[1], "NWM003");
        assert_eq!(p.snr_format, SnrFormat::Decimal);
        assert_eq!(p.balance, BalancePolicy::Tolerant);
        assert_eq!(p.max_repair_iterations, DEFAULT_MAX_REPAIR_ITERATIONS);
        assert!(p.seed.is_none());
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_from_yaml_overrides() {
        let yaml = r#"
snrs: [-1, 1]
talkers: [X]
sentences: [a]
n_listeners: 1
block_len: 1
seed: 7
snr_format: integer
balance: strict
max_repair_iterations: 5
strict_missing: true
"#;
        let p = DesignParams::from_yaml(yaml).unwrap();
        assert_eq!(p.seed, Some(7));
        assert_eq!(p.snr_format, SnrFormat::Integer);
        assert_eq!(p.balance, BalancePolicy::Strict);
        assert_eq!(p.max_repair_iterations, 5);
        assert!(p.strict_missing);
        assert_eq!(p.rendered_snrs(), vec!["-1", "+1"]);
    }

    #[test]
    fn test_missing_field_is_config_error() {
        let err = DesignParams::from_yaml("snrs: [1]\ntalkers: [X]\n").unwrap_err();
        assert!(matches!(err, DesignError::Configuration(_)));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = "snrs: [1]\ntalkers: [X]\nsentences: [a]\nn_listeners: 1\nblock_len: 1\nfoo: 2\n";
        assert!(DesignParams::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_rejects_zero_listeners() {
        let p = DesignParams {
            n_listeners: 0,
            ..params()
        };
        assert!(matches!(p.validate(), Err(DesignError::Configuration(_))));
    }

    #[test]
    fn test_rejects_empty_lists() {
        for p in [
            DesignParams {
                snrs: vec![],
                ..params()
            },
            DesignParams {
                talkers: vec![],
                ..params()
            },
            DesignParams {
                sentences: vec![],
                ..params()
            },
        ] {
            assert!(matches!(p.validate(), Err(DesignError::Configuration(_))));
        }
    }

    #[test]
    fn test_rejects_duplicates() {
        let p = DesignParams {
            talkers: vec!["X".to_string(), "X".to_string()],
            ..params()
        };
        let err = p.validate().unwrap_err().to_string();
        assert!(err.contains("talkers"), "{}", err);

        let p = DesignParams {
            snrs: vec![1.0, 1.0],
            ..params()
        };
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_rejects_unrenderable_snr() {
        let p = DesignParams {
            snrs: vec![-1.5, 0.0],
            snr_format: SnrFormat::Integer,
            ..params()
        };
        assert!(p.validate().is_err());

        let p = DesignParams {
            snr_format: SnrFormat::Decimal,
            ..p
        };
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_policy_spread() {
        assert_eq!(BalancePolicy::Tolerant.max_spread(), 1);
        assert_eq!(BalancePolicy::Strict.max_spread(), 0);
        assert_eq!("STRICT".parse::<BalancePolicy>(), Ok(BalancePolicy::Strict));
    }
}
