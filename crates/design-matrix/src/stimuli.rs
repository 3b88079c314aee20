//! Infer missing recordings from a stimulus directory.
//!
//! Recordings are expected as `{talker}_{sentence}.wav`. Any configured
//! (talker, sentence) pair without such a file is reported as missing.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use counterbalance_kernel::{DesignParams, MissingStimulus};
use regex::Regex;
use tracing::debug;

/// Recordings found in a stimulus directory.
#[derive(Debug, Clone, Default)]
pub struct StimulusInventory {
    /// (talker, sentence) pairs with a recording
    pub recorded: BTreeSet<(String, String)>,
    /// File names that did not look like a configured talker's recording
    pub ignored: Vec<String>,
}

impl StimulusInventory {
    /// Scan `dir` (non-recursively) for recordings of the configured talkers.
    pub fn scan(dir: impl AsRef<Path>, talkers: &[String]) -> Result<Self> {
        let dir = dir.as_ref();
        let pattern = recording_pattern(talkers)?;

        let mut names = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read stimulus directory {}", dir.display()))?
        {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();

        Ok(Self::from_names(&pattern, names))
    }

    fn from_names(pattern: &Regex, names: impl IntoIterator<Item = String>) -> Self {
        let mut inventory = Self::default();
        for name in names {
            match pattern.captures(&name) {
                Some(caps) => {
                    inventory
                        .recorded
                        .insert((caps["talker"].to_string(), caps["sentence"].to_string()));
                }
                None => {
                    debug!(file = %name, "Ignoring non-stimulus file");
                    inventory.ignored.push(name);
                }
            }
        }
        inventory
    }

    /// Configured pairs without a recording, talker-major in configured order.
    pub fn missing_for(&self, params: &DesignParams) -> Vec<MissingStimulus> {
        params
            .talkers
            .iter()
            .flat_map(|talker| params.sentences.iter().map(move |sentence| (talker, sentence)))
            .filter(|(talker, sentence)| {
                !self
                    .recorded
                    .contains(&((*talker).clone(), (*sentence).clone()))
            })
            .map(|(talker, sentence)| MissingStimulus::new(talker.as_str(), sentence.as_str()))
            .collect()
    }
}

/// `^(talker1|talker2|...)_(sentence).wav$`, extension case-insensitive.
///
/// Alternatives are tried longest first, so with talkers `A` and `A_B` the
/// file `A_B_c.wav` belongs to `A_B`.
fn recording_pattern(talkers: &[String]) -> Result<Regex> {
    let mut ordered: Vec<&String> = talkers.iter().collect();
    ordered.sort_by_key(|t| std::cmp::Reverse(t.len()));
    let alternatives = ordered
        .into_iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    let pattern = format!(r"^(?P<talker>{})_(?P<sentence>.+)\.(?i:wav)$", alternatives);
    Regex::new(&pattern).context("Failed to build stimulus file pattern")
}
