//! Trial rows and the SNR rendering they carry.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One row of the design matrix: a single sentence presentation.
///
/// `snr` and `talker` stay empty until the rotation assigners fill them in;
/// `filename` is derived from (talker, sentence, snr) and is empty until
/// both are set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trial {
    pub listener: usize,
    pub sentence: String,
    pub snr: String,
    pub talker: String,
    pub filename: String,
}

impl Trial {
    /// Create an unassigned trial for a (listener, sentence) cell.
    pub fn new(listener: usize, sentence: impl Into<String>) -> Self {
        Self {
            listener,
            sentence: sentence.into(),
            snr: String::new(),
            talker: String::new(),
            filename: String::new(),
        }
    }

    /// Both rotation-assigned fields are present.
    pub fn is_assigned(&self) -> bool {
        !self.snr.is_empty() && !self.talker.is_empty()
    }

    /// Recompute `filename` from the current fields.
    pub fn refresh_filename(&mut self) {
        self.filename = if self.is_assigned() {
            stimulus_filename(&self.talker, &self.sentence, &self.snr)
        } else {
            String::new()
        };
    }
}

/// Stimulus key `"{talker}_{sentence}_{snr}.wav"`.
pub fn stimulus_filename(talker: &str, sentence: &str, snr: &str) -> String {
    format!("{}_{}_{}.wav", talker, sentence, snr)
}

/// A (talker, sentence) recording known to be unusable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MissingStimulus {
    pub talker: String,
    pub sentence: String,
}

impl MissingStimulus {
    pub fn new(talker: impl Into<String>, sentence: impl Into<String>) -> Self {
        Self {
            talker: talker.into(),
            sentence: sentence.into(),
        }
    }
}

/// How SNR levels are rendered in the `snr` column and in filenames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnrFormat {
    /// Signed, one decimal place: `+1.0`, `-2.5`.
    #[default]
    Decimal,
    /// Signed integer: `+1`, `-3`.
    Integer,
}

impl SnrFormat {
    /// Render a level. Negative zero renders as positive zero.
    pub fn render(self, level: f64) -> String {
        let level = if level == 0.0 { 0.0 } else { level };
        match self {
            SnrFormat::Decimal => format!("{:+.1}", level),
            SnrFormat::Integer => format!("{:+.0}", level),
        }
    }

    /// Whether `level` survives render-then-parse unchanged.
    pub fn round_trips(self, level: f64) -> bool {
        self.render(level)
            .parse::<f64>()
            .is_ok_and(|parsed| parsed == level)
    }

    pub fn name(&self) -> &'static str {
        match self {
            SnrFormat::Decimal => "decimal",
            SnrFormat::Integer => "integer",
        }
    }
}

impl fmt::Display for SnrFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SnrFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "decimal" | "float" | "1dp" => Ok(SnrFormat::Decimal),
            "integer" | "int" => Ok(SnrFormat::Integer),
            _ => Err(format!("Unknown SNR format: {}. Valid: decimal, integer", s)),
        }
    }
}
