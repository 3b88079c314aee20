//! Design matrix tooling: file formats, stimulus discovery and the CLI runner
//! around the counterbalancing kernel.
//!
//! This crate:
//! - Reads the YAML parameter file and the missing-stimulus CSV
//! - Infers missing recordings from a stimulus directory
//! - Writes the design CSV and a JSON run summary
//! - Re-validates existing design files and prints per-listener block plans

pub mod artifact;
pub mod experiment;
pub mod plan;
pub mod results;
pub mod stimuli;
