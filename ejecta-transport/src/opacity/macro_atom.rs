//! Macro-atom transition tables (Lucy 2002/2003).
//!
//! A macro-atom level owns a contiguous slice of the flat transition arrays,
//! delimited by [`MacroAtomState::block_references`]. Sampling a transition
//! out of a level means drawing uniformly against the normalized cumulative
//! sum of probabilities within that level's slice.

use crate::error::{Error, Result};

/// Kind of a macro-atom transition.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransitionType {
    /// A radiative de-excitation: terminates the Markov chain and selects
    /// the emission line.
    Radiative,
    /// A collisional transition: internal to the chain.
    Collisional,
    /// An internal (non-radiative, non-collisional) transition.
    Internal,
}

/// Flat macro-atom transition tables, shared across all shells.
///
/// Transition `t` goes from whatever level owns it (implied by
/// `block_references`) to `destination_level_id[t]`, with normalized
/// probability `probability[t]` and kind `transition_type[t]`. When the
/// destination of a radiative transition is chosen, `line_id[t]` names the
/// emitted line.
#[derive(Clone, Debug)]
pub struct MacroAtomState {
    probability: Vec<f64>,
    destination_level_id: Vec<usize>,
    transition_type: Vec<TransitionType>,
    line_id: Vec<Option<usize>>,
    /// `block_references[level]` is the starting offset of `level`'s
    /// transition slice; `block_references[level + 1]` is one past the end.
    /// Has `num_levels + 1` entries.
    block_references: Vec<usize>,
    /// `line_upper_level[line]` names the macro-atom level a line
    /// activates when it is absorbed, i.e. the level the chain (or the
    /// single downbranch step) starts from.
    line_upper_level: Vec<usize>,
}

impl MacroAtomState {
    /// Builds macro-atom tables from flat per-transition arrays and the
    /// per-level block boundaries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the per-transition arrays have
    /// mismatched lengths, if `block_references` is not non-decreasing, or
    /// if it does not cover the full transition array.
    pub fn new(
        probability: Vec<f64>,
        destination_level_id: Vec<usize>,
        transition_type: Vec<TransitionType>,
        line_id: Vec<Option<usize>>,
        block_references: Vec<usize>,
        line_upper_level: Vec<usize>,
    ) -> Result<Self> {
        let n = probability.len();
        if destination_level_id.len() != n || transition_type.len() != n || line_id.len() != n {
            return Err(Error::Configuration(
                "macro-atom transition arrays must all have the same length".to_string(),
            ));
        }
        if block_references.windows(2).any(|w| w[0] > w[1]) {
            return Err(Error::Configuration(
                "macro-atom block_references must be non-decreasing".to_string(),
            ));
        }
        if block_references.last().copied() != Some(n) {
            return Err(Error::Configuration(
                "macro-atom block_references must cover the whole transition array".to_string(),
            ));
        }
        let num_levels = block_references.len().saturating_sub(1);
        if line_upper_level.iter().any(|&level| level >= num_levels) {
            return Err(Error::Configuration(
                "line_upper_level entries must name valid macro-atom levels".to_string(),
            ));
        }

        Ok(Self {
            probability,
            destination_level_id,
            transition_type,
            line_id,
            block_references,
            line_upper_level,
        })
    }

    /// Number of macro-atom levels.
    #[must_use]
    pub fn num_levels(&self) -> usize {
        self.block_references.len().saturating_sub(1)
    }

    /// The macro-atom level that absorbing `line_id` activates.
    #[must_use]
    pub fn activation_level(&self, line_id: usize) -> usize {
        self.line_upper_level[line_id]
    }

    /// Transition-index slice owned by `level`.
    fn block(&self, level: usize) -> std::ops::Range<usize> {
        self.block_references[level]..self.block_references[level + 1]
    }

    /// Samples one transition out of `level` using a uniform draw `xi` in
    /// `[0, 1)` against the block's normalized cumulative probability.
    ///
    /// Returns the transition index chosen. The caller inspects
    /// [`Self::transition_type`] / [`Self::line_id`] / [`Self::destination`]
    /// to act on it. Falls back to the block's last transition if rounding
    /// leaves the cumulative sum just short of `xi` (mirrors how a
    /// normalized stochastic matrix is sampled in practice).
    #[must_use]
    pub fn sample_transition(&self, level: usize, xi: f64) -> usize {
        let block = self.block(level);
        let mut cumulative = 0.0;
        for t in block.clone() {
            cumulative += self.probability[t];
            if xi < cumulative {
                return t;
            }
        }
        block.end - 1
    }

    /// Samples a transition out of `level` restricted to purely radiative
    /// transitions (downbranching mode never visits an internal or
    /// collisional transition), normalizing `xi` against only the
    /// radiative transitions' summed probability within the block. Falls
    /// back to the block's last radiative transition if `level` has none
    /// (configuration error the caller should treat as a fault, not a
    /// panic).
    #[must_use]
    pub fn sample_radiative_transition(&self, level: usize, xi: f64) -> Option<usize> {
        let block = self.block(level);
        let radiative_total: f64 = block
            .clone()
            .filter(|&t| self.transition_type[t] == TransitionType::Radiative)
            .map(|t| self.probability[t])
            .sum();
        if radiative_total <= 0.0 {
            return None;
        }
        let target = xi * radiative_total;
        let mut cumulative = 0.0;
        let mut last_radiative = None;
        for t in block {
            if self.transition_type[t] == TransitionType::Radiative {
                cumulative += self.probability[t];
                last_radiative = Some(t);
                if target < cumulative {
                    return Some(t);
                }
            }
        }
        last_radiative
    }

    /// Kind of transition `t`.
    #[must_use]
    pub fn transition_type(&self, t: usize) -> TransitionType {
        self.transition_type[t]
    }

    /// Destination level of transition `t`.
    #[must_use]
    pub fn destination(&self, t: usize) -> usize {
        self.destination_level_id[t]
    }

    /// Emitted line for a radiative transition `t`, if any.
    #[must_use]
    pub fn line_id(&self, t: usize) -> Option<usize> {
        self.line_id[t]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_level_chain() -> MacroAtomState {
        // Level 0: internal -> level 1 (p=0.4), radiative emit line 2 (p=0.6)
        // Level 1: radiative emit line 5 (p=1.0)
        MacroAtomState::new(
            vec![0.4, 0.6, 1.0],
            vec![1, 0, 0],
            vec![
                TransitionType::Internal,
                TransitionType::Radiative,
                TransitionType::Radiative,
            ],
            vec![None, Some(2), Some(5)],
            vec![0, 2, 3],
            vec![0, 1],
        )
        .unwrap()
    }

    #[test]
    fn samples_low_draw_as_first_transition() {
        let macro_atom = two_level_chain();
        let t = macro_atom.sample_transition(0, 0.1);
        assert_eq!(t, 0);
        assert_eq!(macro_atom.transition_type(t), TransitionType::Internal);
    }

    #[test]
    fn samples_high_draw_as_second_transition() {
        let macro_atom = two_level_chain();
        let t = macro_atom.sample_transition(0, 0.9);
        assert_eq!(t, 1);
        assert_eq!(macro_atom.line_id(t), Some(2));
    }

    #[test]
    fn samples_only_radiative_transitions_for_downbranch() {
        let macro_atom = two_level_chain();
        // Level 0 has one radiative transition (t=1); any xi must land there.
        let t = macro_atom.sample_radiative_transition(0, 0.01).unwrap();
        assert_eq!(t, 1);
    }

    #[test]
    fn rejects_block_references_not_covering_transitions() {
        assert!(MacroAtomState::new(
            vec![1.0],
            vec![0],
            vec![TransitionType::Radiative],
            vec![Some(0)],
            vec![0],
            vec![],
        )
        .is_err());
    }

    #[test]
    fn rejects_out_of_range_activation_level() {
        assert!(MacroAtomState::new(
            vec![1.0],
            vec![0],
            vec![TransitionType::Radiative],
            vec![Some(0)],
            vec![0, 1],
            vec![5],
        )
        .is_err());
    }
}
