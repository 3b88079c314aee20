//! MissingStimulusRepairer: reassign talkers on rows whose recording is missing.
//!
//! Only the `talker` field of affected rows changes. The talkers already held
//! by those rows are dealt back out among them (a permutation), so every
//! talker keeps its row count. Each row must receive a talker other than its
//! current one whose recording of that row's sentence exists.
//!
//! The draw is a randomized greedy matching: talkers with the largest quota
//! pick their rows first, and an infeasible pass is simply redrawn, up to a
//! fixed bound.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;
use rand::seq::index;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::DEFAULT_MAX_REPAIR_ITERATIONS;
use crate::error::{DesignError, DesignResult};
use crate::matrix::DesignMatrix;
use crate::trial::MissingStimulus;

/// One row whose talker was replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reassignment {
    pub listener: usize,
    pub sentence: String,
    pub snr: String,
    pub from_talker: String,
    pub to_talker: String,
}

/// What a repair pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairOutcome {
    /// Passes drawn until success (0 when nothing needed repair)
    pub iterations: usize,
    /// Rows count per talker among the repaired rows (unchanged by repair)
    pub quotas: BTreeMap<String, usize>,
    pub reassignments: Vec<Reassignment>,
    /// Missing records that match no trial in the matrix
    pub unmatched: Vec<MissingStimulus>,
}

impl RepairOutcome {
    pub fn repaired_rows(&self) -> usize {
        self.reassignments.len()
    }
}

/// Repairs rows whose (talker, sentence) recording is unavailable.
#[derive(Debug, Clone)]
pub struct MissingStimulusRepairer {
    /// sentence -> talkers without a recording of it
    missing: BTreeMap<String, BTreeSet<String>>,
    /// Configured talker order, used to break quota ties
    talker_order: Vec<String>,
    max_iterations: usize,
    strict_missing: bool,
}

impl MissingStimulusRepairer {
    pub fn new<'a>(missing: impl IntoIterator<Item = &'a MissingStimulus>) -> Self {
        let mut by_sentence: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for m in missing {
            by_sentence
                .entry(m.sentence.clone())
                .or_default()
                .insert(m.talker.clone());
        }
        Self {
            missing: by_sentence,
            talker_order: Vec::new(),
            max_iterations: DEFAULT_MAX_REPAIR_ITERATIONS,
            strict_missing: false,
        }
    }

    pub fn with_talker_order(mut self, talkers: &[String]) -> Self {
        self.talker_order = talkers.to_vec();
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_strict_missing(mut self, strict: bool) -> Self {
        self.strict_missing = strict;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.missing.is_empty()
    }

    /// Whether `talker` has no usable recording of `sentence`.
    pub fn is_missing(&self, talker: &str, sentence: &str) -> bool {
        self.missing
            .get(sentence)
            .is_some_and(|talkers| talkers.contains(talker))
    }

    /// Missing records that no trial in `matrix` uses.
    pub fn unmatched(&self, matrix: &DesignMatrix) -> Vec<MissingStimulus> {
        let used: BTreeSet<(&str, &str)> = matrix
            .trials()
            .iter()
            .map(|t| (t.talker.as_str(), t.sentence.as_str()))
            .collect();

        self.missing
            .iter()
            .flat_map(|(sentence, talkers)| {
                talkers
                    .iter()
                    .map(move |talker| MissingStimulus::new(talker.as_str(), sentence.as_str()))
            })
            .filter(|m| !used.contains(&(m.talker.as_str(), m.sentence.as_str())))
            .collect()
    }

    /// Indices of rows whose current (talker, sentence) is missing.
    pub fn affected_rows(&self, matrix: &DesignMatrix) -> Vec<usize> {
        matrix
            .trials()
            .iter()
            .enumerate()
            .filter(|(_, t)| self.is_missing(&t.talker, &t.sentence))
            .map(|(i, _)| i)
            .collect()
    }

    fn talker_rank(&self, talker: &str) -> usize {
        self.talker_order
            .iter()
            .position(|t| t == talker)
            .unwrap_or(usize::MAX)
    }

    /// Reassign talkers on every affected row.
    ///
    /// Fails with [`DesignError::RepairExhausted`] when no legal permutation
    /// is drawn within the iteration bound, and with
    /// [`DesignError::InputMismatch`] for unmatched records in strict mode.
    /// The matrix is untouched on failure.
    pub fn repair<R: Rng + ?Sized>(
        &self,
        matrix: &mut DesignMatrix,
        rng: &mut R,
    ) -> DesignResult<RepairOutcome> {
        let unmatched = self.unmatched(matrix);
        if !unmatched.is_empty() {
            if self.strict_missing {
                return Err(DesignError::InputMismatch { unmatched });
            }
            for m in &unmatched {
                warn!(
                    talker = %m.talker,
                    sentence = %m.sentence,
                    "Missing stimulus matches no trial"
                );
            }
        }

        let rows = self.affected_rows(matrix);
        if rows.is_empty() {
            debug!("No trials use a missing stimulus");
            return Ok(RepairOutcome {
                unmatched,
                ..Default::default()
            });
        }

        let current: Vec<&str> = rows
            .iter()
            .map(|&r| matrix.trials()[r].talker.as_str())
            .collect();
        let sentences: Vec<&str> = rows
            .iter()
            .map(|&r| matrix.trials()[r].sentence.as_str())
            .collect();

        let mut quotas: BTreeMap<String, usize> = BTreeMap::new();
        for talker in &current {
            *quotas.entry(talker.to_string()).or_insert(0) += 1;
        }
        let mut order: Vec<(&str, usize)> = quotas.iter().map(|(t, &c)| (t.as_str(), c)).collect();
        order.sort_by_key(|&(talker, count)| (Reverse(count), self.talker_rank(talker)));

        debug!(
            rows = rows.len(),
            talkers = order.len(),
            "Repairing trials with missing stimuli"
        );

        let mut solution = None;
        let mut iterations = 0;
        while iterations < self.max_iterations {
            iterations += 1;
            if let Some(drawn) = self.draw_pass(&order, &current, &sentences, rng) {
                solution = Some(drawn);
                break;
            }
        }

        let Some(assignment) = solution else {
            return Err(DesignError::RepairExhausted { iterations });
        };

        let mut reassignments = Vec::with_capacity(rows.len());
        let new_talkers: Vec<String> = assignment.into_iter().map(str::to_string).collect();
        let trials = matrix.trials_mut();
        for (&row, to_talker) in rows.iter().zip(new_talkers) {
            let trial = &mut trials[row];
            let from_talker = std::mem::replace(&mut trial.talker, to_talker.clone());
            trial.refresh_filename();
            reassignments.push(Reassignment {
                listener: trial.listener,
                sentence: trial.sentence.clone(),
                snr: trial.snr.clone(),
                from_talker,
                to_talker,
            });
        }

        info!(
            rows = reassignments.len(),
            iterations = iterations,
            "Repaired missing stimuli"
        );

        Ok(RepairOutcome {
            iterations,
            quotas,
            reassignments,
            unmatched,
        })
    }

    /// One greedy randomized pass. Returns the new talker per affected row,
    /// or `None` when some talker runs out of legal rows.
    fn draw_pass<'a, R: Rng + ?Sized>(
        &self,
        order: &[(&'a str, usize)],
        current: &[&str],
        sentences: &[&str],
        rng: &mut R,
    ) -> Option<Vec<&'a str>> {
        let mut assigned: Vec<Option<&'a str>> = vec![None; current.len()];

        for &(talker, quota) in order {
            let candidates: Vec<usize> = (0..current.len())
                .filter(|&k| {
                    assigned[k].is_none()
                        && current[k] != talker
                        && !self.is_missing(talker, sentences[k])
                })
                .collect();

            if candidates.len() < quota {
                debug!(
                    talker = talker,
                    needed = quota,
                    available = candidates.len(),
                    "Repair pass infeasible"
                );
                return None;
            }

            for pick in index::sample(rng, candidates.len(), quota).iter() {
                assigned[candidates[pick]] = Some(talker);
            }
        }

        assigned.into_iter().collect()
    }
}
