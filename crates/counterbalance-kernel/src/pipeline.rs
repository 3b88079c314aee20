//! DesignPipeline: parameters in, validated randomized design out.
//!
//! Stages run in a fixed order on a single matrix:
//! 1. Validate parameters
//! 2. Build skeleton, rotate SNRs, rotate talkers
//! 3. Validate balance
//! 4. Repair missing stimuli (when any are given) and re-validate
//! 5. Shuffle and regroup by listener
//!
//! One seeded generator drives the repair draws and then the shuffle.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::assign::assign_all;
use crate::balance::{BalanceReport, BalanceValidator};
use crate::config::DesignParams;
use crate::error::DesignResult;
use crate::matrix::DesignMatrix;
use crate::randomize::randomize_order;
use crate::repair::{MissingStimulusRepairer, RepairOutcome};
use crate::trial::MissingStimulus;

/// Everything a successful run produced.
#[derive(Debug, Clone)]
pub struct DesignOutcome {
    /// Final, shuffled matrix
    pub matrix: DesignMatrix,
    /// Seed the generator was created from
    pub seed: u64,
    /// Balance right after rotation
    pub initial_balance: BalanceReport,
    /// Present when missing-stimulus records were supplied
    pub repair: Option<RepairOutcome>,
    /// Balance of the matrix as written
    pub final_balance: BalanceReport,
}

/// Runs the full generation pipeline.
#[derive(Debug, Clone)]
pub struct DesignPipeline {
    params: DesignParams,
    missing: Vec<MissingStimulus>,
}

impl DesignPipeline {
    pub fn new(params: DesignParams) -> Self {
        Self {
            params,
            missing: Vec::new(),
        }
    }

    /// Recordings known to be unusable.
    pub fn with_missing(mut self, missing: Vec<MissingStimulus>) -> Self {
        self.missing = missing;
        self
    }

    pub fn params(&self) -> &DesignParams {
        &self.params
    }

    /// Run every stage. Nothing is returned unless all stages succeed.
    pub fn run(&self) -> DesignResult<DesignOutcome> {
        let params = &self.params;
        params.validate()?;
        let seed = params.effective_seed();

        info!(
            listeners = params.n_listeners,
            sentences = params.sentences.len(),
            snrs = params.snrs.len(),
            talkers = params.talkers.len(),
            seed = seed,
            policy = %params.balance,
            "Generating design matrix"
        );

        let mut matrix = assign_all(params);
        let validator = BalanceValidator::new(params.balance)
            .with_expected(params.n_listeners, &params.sentences)
            .with_levels(&params.rendered_snrs(), &params.talkers);
        let initial_balance = validator.validate(&matrix)?;

        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let repair = if self.missing.is_empty() {
            None
        } else {
            let repairer = MissingStimulusRepairer::new(&self.missing)
                .with_talker_order(&params.talkers)
                .with_max_iterations(params.max_repair_iterations)
                .with_strict_missing(params.strict_missing);
            Some(repairer.repair(&mut matrix, &mut rng)?)
        };

        let final_balance = match &repair {
            Some(outcome) if outcome.repaired_rows() > 0 => validator.validate_after_repair(&matrix)?,
            _ => initial_balance.clone(),
        };

        randomize_order(&mut matrix, &mut rng);

        info!(
            rows = matrix.len(),
            repaired = repair.as_ref().map_or(0, RepairOutcome::repaired_rows),
            "Design matrix ready"
        );

        Ok(DesignOutcome {
            matrix,
            seed,
            initial_balance,
            repair,
            final_balance,
        })
    }
}
