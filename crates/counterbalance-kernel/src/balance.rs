//! BalanceValidator: grouped-count checks over a design matrix.
//!
//! Every grouping counts trials over the full cross product of its column
//! levels, so a combination that never occurs counts as zero, and compares
//! the largest and smallest group. `(listener, sentence)` must be exactly one
//! everywhere; the other groupings accept a spread of at most
//! [`BalancePolicy::max_spread`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::BalancePolicy;
use crate::error::{DesignError, DesignResult};
use crate::matrix::DesignMatrix;
use crate::trial::Trial;

/// A set of columns to group trials by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grouping {
    ListenerSentence,
    ListenerSnr,
    TalkerSnr,
    ListenerTalker,
    ListenerTalkerSnr,
    Talker,
}

impl Grouping {
    /// Groupings checked after the initial assignment.
    pub fn all() -> Vec<Self> {
        vec![
            Self::ListenerSentence,
            Self::ListenerSnr,
            Self::TalkerSnr,
            Self::ListenerTalker,
            Self::ListenerTalkerSnr,
            Self::Talker,
        ]
    }

    /// Groupings a talker-only permutation of some rows cannot disturb.
    pub fn repair_invariant() -> Vec<Self> {
        vec![Self::ListenerSentence, Self::ListenerSnr, Self::Talker]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ListenerSentence => "listener,sentence",
            Self::ListenerSnr => "listener,snr",
            Self::TalkerSnr => "talker,snr",
            Self::ListenerTalker => "listener,talker",
            Self::ListenerTalkerSnr => "listener,talker,snr",
            Self::Talker => "talker",
        }
    }

    fn key(&self, t: &Trial) -> Vec<String> {
        let listener = t.listener.to_string();
        match self {
            Self::ListenerSentence => vec![listener, t.sentence.clone()],
            Self::ListenerSnr => vec![listener, t.snr.clone()],
            Self::TalkerSnr => vec![t.talker.clone(), t.snr.clone()],
            Self::ListenerTalker => vec![listener, t.talker.clone()],
            Self::ListenerTalkerSnr => vec![listener, t.talker.clone(), t.snr.clone()],
            Self::Talker => vec![t.talker.clone()],
        }
    }

    fn columns<'a>(&self, levels: &'a Levels) -> Vec<&'a BTreeSet<String>> {
        match self {
            Self::ListenerSentence => vec![&levels.listeners, &levels.sentences],
            Self::ListenerSnr => vec![&levels.listeners, &levels.snrs],
            Self::TalkerSnr => vec![&levels.talkers, &levels.snrs],
            Self::ListenerTalker => vec![&levels.listeners, &levels.talkers],
            Self::ListenerTalkerSnr => vec![&levels.listeners, &levels.talkers, &levels.snrs],
            Self::Talker => vec![&levels.talkers],
        }
    }

    /// Every key combination the levels allow.
    pub fn cells(&self, levels: &Levels) -> Vec<Vec<String>> {
        let mut cells: Vec<Vec<String>> = vec![Vec::new()];
        for column in self.columns(levels) {
            cells = cells
                .into_iter()
                .flat_map(|prefix| {
                    column.iter().map(move |value| {
                        let mut cell = prefix.clone();
                        cell.push(value.clone());
                        cell
                    })
                })
                .collect();
        }
        cells
    }

    /// Count trials per key, with every cell of `levels` present (possibly 0).
    pub fn counts(&self, trials: &[Trial], levels: &Levels) -> BTreeMap<Vec<String>, usize> {
        let mut counts: BTreeMap<Vec<String>, usize> =
            self.cells(levels).into_iter().map(|cell| (cell, 0)).collect();
        for t in trials {
            *counts.entry(self.key(t)).or_insert(0) += 1;
        }
        counts
    }
}

/// Values each design column can take.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Levels {
    pub listeners: BTreeSet<String>,
    pub sentences: BTreeSet<String>,
    pub snrs: BTreeSet<String>,
    pub talkers: BTreeSet<String>,
}

impl Levels {
    /// Levels that occur in `trials`.
    pub fn observed(trials: &[Trial]) -> Self {
        let mut levels = Self::default();
        for t in trials {
            levels.listeners.insert(t.listener.to_string());
            levels.sentences.insert(t.sentence.clone());
            levels.snrs.insert(t.snr.clone());
            levels.talkers.insert(t.talker.clone());
        }
        levels
    }

    fn extend(&mut self, other: &Levels) {
        self.listeners.extend(other.listeners.iter().cloned());
        self.sentences.extend(other.sentences.iter().cloned());
        self.snrs.extend(other.snrs.iter().cloned());
        self.talkers.extend(other.talkers.iter().cloned());
    }
}

impl fmt::Display for Grouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Group-size spread for one grouping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpread {
    pub grouping: Grouping,
    /// Number of key combinations counted, empty ones included
    pub groups: usize,
    pub min: usize,
    pub max: usize,
    pub spread: usize,
    pub passed: bool,
}

/// Result of running every grouping check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceReport {
    pub policy: BalancePolicy,
    pub spreads: Vec<GroupSpread>,
}

impl BalanceReport {
    pub fn passed(&self) -> bool {
        self.spreads.iter().all(|s| s.passed)
    }

    pub fn failures(&self) -> Vec<&GroupSpread> {
        self.spreads.iter().filter(|s| !s.passed).collect()
    }

    pub fn get(&self, grouping: Grouping) -> Option<&GroupSpread> {
        self.spreads.iter().find(|s| s.grouping == grouping)
    }
}

impl fmt::Display for BalanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Balance ({} policy):", self.policy)?;
        for s in &self.spreads {
            writeln!(
                f,
                "  {:<20} groups={:<5} min={:<4} max={:<4} spread={} {}",
                s.grouping.name(),
                s.groups,
                s.min,
                s.max,
                s.spread,
                if s.passed { "ok" } else { "FAIL" }
            )?;
        }
        Ok(())
    }
}

/// Verifies count invariants over a design matrix.
#[derive(Debug, Clone)]
pub struct BalanceValidator {
    policy: BalancePolicy,
    /// Configured (listener count, sentence set), when known
    expected: Option<(usize, Vec<String>)>,
    /// Configured levels; observed levels are always added
    levels: Levels,
}

impl BalanceValidator {
    pub fn new(policy: BalancePolicy) -> Self {
        Self {
            policy,
            expected: None,
            levels: Levels::default(),
        }
    }

    /// Also require every configured (listener, sentence) cell to exist.
    pub fn with_expected(mut self, n_listeners: usize, sentences: &[String]) -> Self {
        self.levels
            .listeners
            .extend((0..n_listeners).map(|l| l.to_string()));
        self.levels.sentences.extend(sentences.iter().cloned());
        self.expected = Some((n_listeners, sentences.to_vec()));
        self
    }

    /// Count every configured SNR level and talker, even ones no trial uses.
    pub fn with_levels(mut self, snrs: &[String], talkers: &[String]) -> Self {
        self.levels.snrs.extend(snrs.iter().cloned());
        self.levels.talkers.extend(talkers.iter().cloned());
        self
    }

    /// Configured levels merged with those present in `matrix`.
    pub fn levels(&self, matrix: &DesignMatrix) -> Levels {
        let mut levels = Levels::observed(matrix.trials());
        levels.extend(&self.levels);
        levels
    }

    pub fn policy(&self) -> BalancePolicy {
        self.policy
    }

    /// Measure one grouping without failing.
    pub fn measure(&self, matrix: &DesignMatrix, grouping: Grouping) -> GroupSpread {
        self.measure_with(matrix, grouping, &self.levels(matrix))
    }

    fn measure_with(&self, matrix: &DesignMatrix, grouping: Grouping, levels: &Levels) -> GroupSpread {
        let counts = grouping.counts(matrix.trials(), levels);
        let min = counts.values().copied().min().unwrap_or(0);
        let max = counts.values().copied().max().unwrap_or(0);
        let spread = max - min;
        let passed = match grouping {
            Grouping::ListenerSentence => min == 1 && max == 1,
            _ => spread <= self.policy.max_spread(),
        };

        GroupSpread {
            grouping,
            groups: counts.len(),
            min,
            max,
            spread,
            passed,
        }
    }

    /// Measure every grouping without failing.
    pub fn report(&self, matrix: &DesignMatrix) -> BalanceReport {
        self.report_for(matrix, &Grouping::all())
    }

    fn report_for(&self, matrix: &DesignMatrix, groupings: &[Grouping]) -> BalanceReport {
        let levels = self.levels(matrix);
        BalanceReport {
            policy: self.policy,
            spreads: groupings
                .iter()
                .map(|&g| self.measure_with(matrix, g, &levels))
                .collect(),
        }
    }

    /// Run every check; the first failure is returned as an error.
    pub fn validate(&self, matrix: &DesignMatrix) -> DesignResult<BalanceReport> {
        self.check_structure(matrix)?;
        let report = self.report(matrix);
        for spread in &report.spreads {
            debug!(
                grouping = spread.grouping.name(),
                min = spread.min,
                max = spread.max,
                "Balance check"
            );
        }
        if let Some(failed) = report.failures().first() {
            return Err(self.violation(failed));
        }
        Ok(report)
    }

    /// Checks after a missing-stimulus repair.
    ///
    /// Only groupings that a talker permutation preserves are fatal. The
    /// talker-crossed groupings are still reported and logged when they
    /// drift out of tolerance.
    pub fn validate_after_repair(&self, matrix: &DesignMatrix) -> DesignResult<BalanceReport> {
        self.check_structure(matrix)?;
        let report = self.report(matrix);
        let fatal = Grouping::repair_invariant();
        for spread in report.failures() {
            if fatal.contains(&spread.grouping) {
                return Err(self.violation(spread));
            }
            warn!(
                grouping = spread.grouping.name(),
                min = spread.min,
                max = spread.max,
                "Grouping out of tolerance after repair"
            );
        }
        Ok(report)
    }

    fn violation(&self, spread: &GroupSpread) -> DesignError {
        let detail = match spread.grouping {
            Grouping::ListenerSentence => "every listener must hear every sentence exactly once".to_string(),
            _ => format!(
                "spread {} exceeds {} policy limit {}",
                spread.spread,
                self.policy,
                self.policy.max_spread()
            ),
        };
        DesignError::BalanceViolation {
            grouping: spread.grouping.name().to_string(),
            min: spread.min,
            max: spread.max,
            detail,
        }
    }

    /// Assignment completeness and the listener × sentence bijection.
    fn check_structure(&self, matrix: &DesignMatrix) -> DesignResult<()> {
        let unassigned = matrix.trials().iter().filter(|t| !t.is_assigned()).count();
        if unassigned > 0 {
            return Err(DesignError::BalanceViolation {
                grouping: "assignment".to_string(),
                min: 0,
                max: unassigned,
                detail: format!("{} trial(s) lack an SNR or talker", unassigned),
            });
        }

        let mut by_listener: BTreeMap<usize, BTreeSet<&str>> = BTreeMap::new();
        for t in matrix.trials() {
            by_listener
                .entry(t.listener)
                .or_default()
                .insert(t.sentence.as_str());
        }

        let (listeners, sentences): (BTreeSet<usize>, BTreeSet<&str>) = match &self.expected {
            Some((n, sentences)) => (
                (0..*n).collect(),
                sentences.iter().map(String::as_str).collect(),
            ),
            None => (
                by_listener.keys().copied().collect(),
                matrix.trials().iter().map(|t| t.sentence.as_str()).collect(),
            ),
        };

        let observed: BTreeSet<usize> = by_listener.keys().copied().collect();
        if observed != listeners {
            return Err(DesignError::BalanceViolation {
                grouping: Grouping::ListenerSentence.name().to_string(),
                min: observed.len(),
                max: listeners.len(),
                detail: format!(
                    "listener ids {:?} do not match expected {:?}",
                    observed, listeners
                ),
            });
        }

        for (listener, heard) in &by_listener {
            if *heard != sentences {
                let absent: Vec<&str> = sentences.difference(heard).copied().collect();
                let extra: Vec<&str> = heard.difference(&sentences).copied().collect();
                return Err(DesignError::BalanceViolation {
                    grouping: Grouping::ListenerSentence.name().to_string(),
                    min: heard.len(),
                    max: sentences.len(),
                    detail: format!(
                        "listener {} is missing sentences {:?} and has unexpected {:?}",
                        listener, absent, extra
                    ),
                });
            }
        }

        Ok(())
    }
}
