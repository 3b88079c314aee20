//! Deterministic rotation assigners.
//!
//! The skeleton fixes which sentences each listener hears. Two independent
//! cyclic rotations then fill in SNR and talker:
//! - SNR rotates once per listener, so SNR is balanced within each listener
//!   and decorrelated from sentence position across listeners.
//! - Talker rotates once per full pass of the talker list over the flattened
//!   rows, so talker is not locked to the listener/SNR period.
//!
//! None of these steps consume randomness.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::DesignParams;
use crate::matrix::DesignMatrix;
use crate::trial::{SnrFormat, Trial};

/// `items` rotated left by `shift` (modulo its length).
pub fn rotate_left<T: Clone>(items: &[T], shift: usize) -> Vec<T> {
    if items.is_empty() {
        return Vec::new();
    }
    let mut rotated = items.to_vec();
    rotated.rotate_left(shift % items.len());
    rotated
}

/// Build the listener × sentence skeleton.
///
/// Row `i` belongs to listener `i / S` and carries `sentences[i % S]`.
pub fn build_skeleton(
    n_listeners: usize,
    sentences: &[String],
    snr_format: SnrFormat,
) -> DesignMatrix {
    let trials: Vec<Trial> = (0..n_listeners)
        .flat_map(|listener| sentences.iter().map(move |s| Trial::new(listener, s.as_str())))
        .collect();

    debug!(
        listeners = n_listeners,
        sentences = sentences.len(),
        rows = trials.len(),
        "Built design skeleton"
    );

    DesignMatrix::new(trials, snr_format)
}

/// SNR sequence for one listener: `snrs` rotated by `listener`, tiled
/// `ceil(S / K)` times and truncated to `n_sentences`.
pub fn listener_snr_sequence(snrs: &[String], listener: usize, n_sentences: usize) -> Vec<String> {
    if snrs.is_empty() {
        return Vec::new();
    }
    let rotated = rotate_left(snrs, listener);
    rotated.iter().cycle().take(n_sentences).cloned().collect()
}

/// Assign rendered SNR levels to each listener's rows, in sentence order.
pub fn assign_snrs(matrix: &mut DesignMatrix, snrs: &[String]) {
    let mut by_listener: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (idx, trial) in matrix.trials().iter().enumerate() {
        by_listener.entry(trial.listener).or_default().push(idx);
    }

    let trials = matrix.trials_mut();
    for (listener, rows) in by_listener {
        let sequence = listener_snr_sequence(snrs, listener, rows.len());
        for (row, snr) in rows.into_iter().zip(sequence) {
            trials[row].snr = snr;
            trials[row].refresh_filename();
        }
    }

    debug!(levels = snrs.len(), "Assigned SNR rotation");
}

/// Talker sequence over `n_rows` flattened rows: the talker list rotated by
/// `rep` for each repeat `rep`, concatenated and truncated.
pub fn talker_sequence(talkers: &[String], n_rows: usize) -> Vec<String> {
    if talkers.is_empty() {
        return Vec::new();
    }
    let repeats = n_rows.div_ceil(talkers.len());
    (0..repeats)
        .flat_map(|rep| rotate_left(talkers, rep))
        .take(n_rows)
        .collect()
}

/// Assign talkers position for position over the whole matrix.
pub fn assign_talkers(matrix: &mut DesignMatrix, talkers: &[String]) {
    let sequence = talker_sequence(talkers, matrix.len());
    for (trial, talker) in matrix.trials_mut().iter_mut().zip(sequence) {
        trial.talker = talker;
        trial.refresh_filename();
    }

    debug!(talkers = talkers.len(), "Assigned talker rotation");
}

/// Skeleton plus both rotations, straight from parameters.
pub fn assign_all(params: &DesignParams) -> DesignMatrix {
    let mut matrix = build_skeleton(params.n_listeners, &params.sentences, params.snr_format);
    assign_snrs(&mut matrix, &params.rendered_snrs());
    assign_talkers(&mut matrix, &params.talkers);
    matrix
}
