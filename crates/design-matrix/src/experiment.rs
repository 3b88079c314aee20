//! Design runner: files in, design matrix and summary out.
//!
//! Orchestrates one generation run:
//! 1. Load parameters and apply command-line overrides
//! 2. Collect missing stimuli (CSV and/or stimulus directory)
//! 3. Run the counterbalancing pipeline
//! 4. Write the design CSV and, optionally, the JSON summary

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use counterbalance_kernel::{
    BalancePolicy, BalanceReport, BalanceValidator, DesignOutcome, DesignParams, DesignPipeline,
    MissingStimulus, SnrFormat,
};
use tracing::{info, warn};

use crate::artifact::{load_missing, load_params, read_design_csv, write_design_csv};
use crate::results::DesignSummary;
use crate::stimuli::StimulusInventory;

/// Configuration for a generation run.
#[derive(Debug, Clone)]
pub struct DesignRunnerConfig {
    /// YAML parameter file
    pub params_path: PathBuf,
    /// CSV of unusable (talker, sentence) recordings
    pub missing_path: Option<PathBuf>,
    /// Directory of `{talker}_{sentence}.wav` recordings to check
    pub stimulus_dir: Option<PathBuf>,
    /// Design matrix output
    pub output: PathBuf,
    /// JSON summary output
    pub summary: Option<PathBuf>,
    /// Overrides for the parameter file
    pub seed: Option<u64>,
    pub snr_format: Option<SnrFormat>,
    pub balance: Option<BalancePolicy>,
}

impl Default for DesignRunnerConfig {
    fn default() -> Self {
        Self {
            params_path: PathBuf::from("params.yaml"),
            missing_path: None,
            stimulus_dir: None,
            output: PathBuf::from("design-matrix.csv"),
            summary: None,
            seed: None,
            snr_format: None,
            balance: None,
        }
    }
}

/// The design runner.
pub struct DesignRunner {
    config: DesignRunnerConfig,
}

impl DesignRunner {
    /// Create a new design runner.
    pub fn new(config: DesignRunnerConfig) -> Self {
        Self { config }
    }

    /// Parameters from the file with overrides applied.
    pub fn resolve_params(&self) -> Result<DesignParams> {
        let mut params = load_params(&self.config.params_path)?;
        if let Some(seed) = self.config.seed {
            params.seed = Some(seed);
        }
        if let Some(format) = self.config.snr_format {
            params.snr_format = format;
        }
        if let Some(policy) = self.config.balance {
            params.balance = policy;
        }
        Ok(params)
    }

    /// Union of the explicit missing list and the stimulus-directory scan.
    pub fn collect_missing(&self, params: &DesignParams) -> Result<Vec<MissingStimulus>> {
        let mut missing = BTreeSet::new();

        if let Some(path) = &self.config.missing_path {
            let records = load_missing(path)?;
            info!(records = records.len(), path = %path.display(), "Loaded missing stimuli");
            missing.extend(records);
        }

        if let Some(dir) = &self.config.stimulus_dir {
            let inventory = StimulusInventory::scan(dir, &params.talkers)?;
            let inferred = inventory.missing_for(params);
            info!(
                recorded = inventory.recorded.len(),
                ignored = inventory.ignored.len(),
                missing = inferred.len(),
                dir = %dir.display(),
                "Scanned stimulus directory"
            );
            missing.extend(inferred);
        }

        Ok(missing.into_iter().collect())
    }

    /// Run the pipeline and write outputs. Nothing is written on failure.
    pub fn run(&self) -> Result<(DesignOutcome, DesignSummary)> {
        let params = self.resolve_params()?;
        params
            .validate()
            .with_context(|| format!("Invalid parameters in {}", self.config.params_path.display()))?;
        let missing = self.collect_missing(&params)?;

        let outcome = DesignPipeline::new(params.clone())
            .with_missing(missing)
            .run()
            .context("Design generation failed")?;

        write_design_csv(&outcome.matrix, &self.config.output)?;
        info!(
            rows = outcome.matrix.len(),
            path = %self.config.output.display(),
            "Wrote design matrix"
        );

        let summary = DesignSummary::new(&params, &outcome);
        if let Some(path) = &self.config.summary {
            summary.save(path)?;
            info!(path = %path.display(), "Wrote summary");
        }

        Ok((outcome, summary))
    }
}

/// Re-check an existing design file.
///
/// Fails on rows whose filename does not match their talker, sentence and
/// SNR, and on balance violations. With `after_repair` only the groupings a
/// missing-stimulus repair preserves are fatal, matching the checks
/// `generate` applied to a repaired design. When `params` are given, every
/// configured listener, sentence, SNR level and talker is counted, including
/// ones the file never uses.
pub fn validate_design_file(
    path: impl Into<PathBuf>,
    policy: BalancePolicy,
    params: Option<&DesignParams>,
    after_repair: bool,
) -> Result<BalanceReport> {
    let path = path.into();
    let matrix = read_design_csv(&path)?;

    let stale = matrix.stale_filenames();
    if let Some(&first) = stale.first() {
        anyhow::bail!(
            "{} row(s) in {} have filenames that do not match their fields (first: row {})",
            stale.len(),
            path.display(),
            first + 1
        );
    }

    let mut validator = BalanceValidator::new(policy);
    if let Some(params) = params {
        let snrs: Vec<String> = params
            .snrs
            .iter()
            .map(|&level| matrix.snr_format().render(level))
            .collect();
        validator = validator
            .with_expected(params.n_listeners, &params.sentences)
            .with_levels(&snrs, &params.talkers);
    }

    let checked = if after_repair {
        validator.validate_after_repair(&matrix)
    } else {
        validator.validate(&matrix)
    };

    match checked {
        Ok(report) => Ok(report),
        Err(e) => {
            warn!(path = %path.display(), after_repair, "Design matrix failed validation");
            Err(e).with_context(|| format!("Validation of {} failed", path.display()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARAMS: &str = r#"
snrs: [-1, 1]
talkers: [X, Y]
sentences: [a, b, c, d]
n_listeners: 2
block_len: 4
seed: 15485863
"#;

    fn setup() -> (tempfile::TempDir, DesignRunnerConfig) {
        let dir = tempfile::tempdir().unwrap();
        let params_path = dir.path().join("params.yaml");
        std::fs::write(&params_path, PARAMS).unwrap();
        let config = DesignRunnerConfig {
            params_path,
            output: dir.path().join("design-matrix.csv"),
            ..Default::default()
        };
        (dir, config)
    }

    #[test]
    fn test_overrides_applied() {
        let (_dir, config) = setup();
        let runner = DesignRunner::new(DesignRunnerConfig {
            seed: Some(3),
            snr_format: Some(SnrFormat::Integer),
            balance: Some(BalancePolicy::Strict),
            ..config
        });
        let params = runner.resolve_params().unwrap();
        assert_eq!(params.seed, Some(3));
        assert_eq!(params.snr_format, SnrFormat::Integer);
        assert_eq!(params.balance, BalancePolicy::Strict);
    }

    #[test]
    fn test_collect_missing_unions_sources() {
        let (dir, config) = setup();
        let missing_path = dir.path().join("missing.csv");
        std::fs::write(&missing_path, "talker,sentence\nX,a\nY,b\n").unwrap();

        let stim = dir.path().join("stimuli");
        std::fs::create_dir(&stim).unwrap();
        for t in ["X", "Y"] {
            for s in ["a", "b", "c", "d"] {
                if (t, s) != ("Y", "b") && (t, s) != ("Y", "d") {
                    std::fs::write(stim.join(format!("{}_{}.wav", t, s)), b"").unwrap();
                }
            }
        }

        let runner = DesignRunner::new(DesignRunnerConfig {
            missing_path: Some(missing_path),
            stimulus_dir: Some(stim),
            ..config
        });
        let params = runner.resolve_params().unwrap();
        let missing = runner.collect_missing(&params).unwrap();
        assert_eq!(
            missing,
            vec![
                MissingStimulus::new("X", "a"),
                MissingStimulus::new("Y", "b"),
                MissingStimulus::new("Y", "d"),
            ]
        );
    }

    #[test]
    fn test_failed_run_writes_nothing() {
        let (dir, config) = setup();
        let missing_path = dir.path().join("missing.csv");
        std::fs::write(&missing_path, "talker,sentence\nX,a\n").unwrap();
        let output = config.output.clone();

        let runner = DesignRunner::new(DesignRunnerConfig {
            missing_path: Some(missing_path),
            summary: Some(dir.path().join("summary.json")),
            ..config
        });
        let err = runner.run().unwrap_err();
        assert!(format!("{:#}", err).contains("did not converge"));
        assert!(!output.exists());
        assert!(!dir.path().join("summary.json").exists());
    }

    #[test]
    fn test_validate_counts_configured_levels() {
        let (_dir, config) = setup();
        let output = config.output.clone();
        let runner = DesignRunner::new(config);
        let mut params = runner.resolve_params().unwrap();
        runner.run().unwrap();

        assert!(validate_design_file(&output, BalancePolicy::Strict, Some(&params), false).is_ok());

        // A configured level the file never uses is an empty cell
        params.snrs.push(3.0);
        let err = validate_design_file(&output, BalancePolicy::Tolerant, Some(&params), false)
            .unwrap_err();
        assert!(format!("{:#}", err).contains("listener,snr"), "{:#}", err);
    }

    #[test]
    fn test_validate_detects_tampering() {
        let (_dir, config) = setup();
        let output = config.output.clone();
        DesignRunner::new(config).run().unwrap();
        assert!(validate_design_file(&output, BalancePolicy::Tolerant, None, false).is_ok());

        let text = std::fs::read_to_string(&output).unwrap();
        let tampered = text.replacen(",X,X_", ",Y,X_", 1);
        assert_ne!(tampered, text);
        std::fs::write(&output, tampered).unwrap();
        let err = validate_design_file(&output, BalancePolicy::Tolerant, None, false).unwrap_err();
        assert!(err.to_string().contains("filenames"));
    }
}
