//! DesignMatrix: the ordered table of trials.

use std::collections::BTreeMap;
use std::fmt;

use crate::trial::{SnrFormat, Trial};

/// The full listener × sentence table of trials.
///
/// Rows are kept in pipeline order: builder order until the final shuffle,
/// listener-major presentation order afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignMatrix {
    trials: Vec<Trial>,
    snr_format: SnrFormat,
}

impl DesignMatrix {
    pub fn new(trials: Vec<Trial>, snr_format: SnrFormat) -> Self {
        Self { trials, snr_format }
    }

    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    pub(crate) fn trials_mut(&mut self) -> &mut Vec<Trial> {
        &mut self.trials
    }

    pub fn into_trials(self) -> Vec<Trial> {
        self.trials
    }

    pub fn snr_format(&self) -> SnrFormat {
        self.snr_format
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    /// Distinct listener ids in ascending order.
    pub fn listeners(&self) -> Vec<usize> {
        let mut ids: Vec<usize> = self.trials.iter().map(|t| t.listener).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Trials for one listener, in current row order.
    pub fn listener_trials(&self, listener: usize) -> Vec<&Trial> {
        self.trials
            .iter()
            .filter(|t| t.listener == listener)
            .collect()
    }

    /// A listener's trials split into consecutive blocks of `block_len`.
    ///
    /// The last block is shorter when the count is not a multiple of
    /// `block_len`. A zero `block_len` yields a single block.
    pub fn listener_blocks(&self, listener: usize, block_len: usize) -> Vec<Vec<&Trial>> {
        let trials = self.listener_trials(listener);
        if block_len == 0 {
            return vec![trials];
        }
        trials.chunks(block_len).map(|c| c.to_vec()).collect()
    }

    /// Row count per talker across the whole matrix.
    pub fn talker_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for t in &self.trials {
            *counts.entry(t.talker.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// Rows whose `filename` disagrees with their (talker, sentence, snr).
    pub fn stale_filenames(&self) -> Vec<usize> {
        self.trials
            .iter()
            .enumerate()
            .filter(|(_, t)| {
                let mut expected = (*t).clone();
                expected.refresh_filename();
                expected.filename != t.filename
            })
            .map(|(i, _)| i)
            .collect()
    }
}

impl fmt::Display for DesignMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Design matrix: {} trials, {} listeners (snr format: {})",
            self.trials.len(),
            self.listeners().len(),
            self.snr_format
        )?;
        for t in &self.trials {
            writeln!(
                f,
                "  {:>4} {:>8} {:>6} {:>8}  {}",
                t.listener, t.sentence, t.snr, t.talker, t.filename
            )?;
        }
        Ok(())
    }
}
