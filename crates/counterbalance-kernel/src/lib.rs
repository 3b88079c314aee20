//! Counterbalance Kernel: balanced listener × sentence × SNR × talker designs.
//!
//! This crate builds the trial table for a speech-in-noise listening
//! experiment. Every listener hears every sentence once; SNR and talker are
//! assigned by independent cyclic rotations so neither is confounded with
//! listener, sentence position or each other. Rows whose talker/sentence
//! recording is unavailable are repaired by permuting talkers among them.

pub mod assign;
pub mod balance;
pub mod config;
pub mod error;
pub mod matrix;
pub mod pipeline;
pub mod randomize;
pub mod repair;
pub mod trial;

pub use balance::{BalanceReport, BalanceValidator, GroupSpread, Grouping, Levels};
pub use config::{BalancePolicy, DesignParams};
pub use error::{DesignError, DesignResult};
pub use matrix::DesignMatrix;
pub use pipeline::{DesignOutcome, DesignPipeline};
pub use repair::{MissingStimulusRepairer, Reassignment, RepairOutcome};
pub use trial::{MissingStimulus, SnrFormat, Trial};
