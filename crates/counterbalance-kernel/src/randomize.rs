//! Presentation-order randomization.

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::matrix::DesignMatrix;

/// Shuffle all rows, then stable-sort by listener.
///
/// Listener blocks end up contiguous and ascending, while the order inside
/// each block is the shuffled order.
pub fn randomize_order<R: Rng + ?Sized>(matrix: &mut DesignMatrix, rng: &mut R) {
    let trials = matrix.trials_mut();
    trials.shuffle(rng);
    trials.sort_by_key(|t| t.listener);
    debug!(rows = trials.len(), "Randomized presentation order");
}
