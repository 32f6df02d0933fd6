//! Optional continuum opacity tables (bound-free, free-free, collisional).
//!
//! Continuum interactions are an optional process: when present, a
//! continuum event picks among the three channels below weighted by their
//! per-shell partial opacities.

use crate::error::{Error, Result};

/// Which continuum channel a continuum event selected.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContinuumChannel {
    /// Bound-free (photoionization) on the given species/level index.
    BoundFree {
        /// Index into the flat `(species, level)` table for this shell.
        level_index: usize,
    },
    /// Free-free (bremsstrahlung) absorption/emission.
    FreeFree,
    /// Collisional (de-)excitation/ionization.
    Collisional,
}

/// Per-shell continuum opacity tables, indexed `(shell, species, level)` for
/// bound-free, flattened to `bound_free[s * levels_per_shell + k]`.
#[derive(Clone, Debug)]
pub struct ContinuumState {
    levels_per_shell: usize,
    bound_free: Vec<f64>,
    free_free: Vec<f64>,
    collisional: Vec<f64>,
}

impl ContinuumState {
    /// Builds continuum opacity tables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if array lengths are inconsistent
    /// with `num_shells` and `levels_per_shell`, or if any opacity is
    /// negative.
    pub fn new(
        num_shells: usize,
        levels_per_shell: usize,
        bound_free: Vec<f64>,
        free_free: Vec<f64>,
        collisional: Vec<f64>,
    ) -> Result<Self> {
        if bound_free.len() != num_shells * levels_per_shell
            || free_free.len() != num_shells
            || collisional.len() != num_shells
        {
            return Err(Error::Configuration(
                "continuum opacity tables have inconsistent shapes".to_string(),
            ));
        }
        if bound_free.iter().chain(&free_free).chain(&collisional).any(|&x| x < 0.0) {
            return Err(Error::Configuration(
                "continuum opacities must be non-negative".to_string(),
            ));
        }

        Ok(Self {
            levels_per_shell,
            bound_free,
            free_free,
            collisional,
        })
    }

    fn bound_free_row(&self, shell: usize) -> &[f64] {
        let start = shell * self.levels_per_shell;
        &self.bound_free[start..start + self.levels_per_shell]
    }

    /// Total continuum opacity in `shell`, summed over all channels.
    #[must_use]
    pub fn total_opacity(&self, shell: usize) -> f64 {
        self.bound_free_row(shell).iter().sum::<f64>()
            + self.free_free[shell]
            + self.collisional[shell]
    }

    /// Samples a continuum channel in `shell` using uniform draw `xi` in
    /// `[0, 1)` against the normalized cumulative partial opacities, in the
    /// fixed order bound-free (by level), free-free, collisional.
    #[must_use]
    pub fn sample_channel(&self, shell: usize, xi: f64) -> ContinuumChannel {
        let total = self.total_opacity(shell);
        let target = xi * total;

        let mut cumulative = 0.0;
        for (level_index, &opacity) in self.bound_free_row(shell).iter().enumerate() {
            cumulative += opacity;
            if target < cumulative {
                return ContinuumChannel::BoundFree { level_index };
            }
        }
        cumulative += self.free_free[shell];
        if target < cumulative {
            return ContinuumChannel::FreeFree;
        }
        ContinuumChannel::Collisional
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_dominant_channel() {
        // One shell, two bound-free levels, free-free and collisional
        // opacity both zero: every draw must land on whichever bound-free
        // level has non-zero opacity.
        let continuum = ContinuumState::new(1, 2, vec![0.0, 5.0], vec![0.0], vec![0.0]).unwrap();
        assert_eq!(
            continuum.sample_channel(0, 0.999),
            ContinuumChannel::BoundFree { level_index: 1 }
        );
    }

    #[test]
    fn rejects_negative_opacity() {
        assert!(ContinuumState::new(1, 1, vec![-1.0], vec![0.0], vec![0.0]).is_err());
    }
}
