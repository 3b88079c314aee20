//! Per-listener session plans: a listener's trials in presentation order,
//! split into blocks.

use std::fmt;

use anyhow::{Result, bail};
use counterbalance_kernel::{DesignMatrix, Trial};

/// Presentation plan for one listener.
#[derive(Debug, Clone)]
pub struct SessionPlan {
    pub listener: usize,
    pub blocks: Vec<Vec<Trial>>,
}

impl SessionPlan {
    /// Build the plan for `listener`.
    ///
    /// When `expected` is given the listener must have exactly that many
    /// trials; a session with the wrong stimulus count is refused.
    pub fn build(
        matrix: &DesignMatrix,
        listener: usize,
        block_len: usize,
        expected: Option<usize>,
    ) -> Result<Self> {
        let blocks: Vec<Vec<Trial>> = matrix
            .listener_blocks(listener, block_len)
            .into_iter()
            .map(|block| block.into_iter().cloned().collect())
            .filter(|block: &Vec<Trial>| !block.is_empty())
            .collect();

        let total: usize = blocks.iter().map(Vec::len).sum();
        if total == 0 {
            bail!("Listener {} has no trials in the design matrix", listener);
        }
        if let Some(expected) = expected
            && total != expected
        {
            bail!(
                "{} stimuli loaded for listener {} (should be {})",
                total,
                listener,
                expected
            );
        }

        Ok(Self { listener, blocks })
    }

    pub fn trial_count(&self) -> usize {
        self.blocks.iter().map(Vec::len).sum()
    }

    /// Trials from `first_trial` onward, for resuming an interrupted session.
    pub fn resume_from(&self, first_trial: usize) -> impl Iterator<Item = (usize, &Trial)> {
        self.blocks.iter().flatten().enumerate().skip(first_trial)
    }
}

impl fmt::Display for SessionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Listener {}: {} trials in {} blocks",
            self.listener,
            self.trial_count(),
            self.blocks.len()
        )?;
        let mut ix = 0;
        for (b, block) in self.blocks.iter().enumerate() {
            writeln!(f, "  Block {} ({} trials)", b + 1, block.len())?;
            for t in block {
                writeln!(
                    f,
                    "    trial {:>3} talker {} sentence {} snr {}  {}",
                    ix, t.talker, t.sentence, t.snr, t.filename
                )?;
                ix += 1;
            }
        }
        Ok(())
    }
}
