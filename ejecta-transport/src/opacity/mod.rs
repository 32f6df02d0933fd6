//! Per-iteration opacity state: line list, Sobolev optical depths, electron
//! densities, and the optional macro-atom and continuum tables.

pub mod continuum;
pub mod macro_atom;

pub use continuum::ContinuumState;
pub use macro_atom::MacroAtomState;

use crate::error::{Error, Result};

/// Immutable per-iteration opacity tables.
///
/// `tau_sobolev` is laid out shell-major (`tau_sobolev[s * num_lines + l]`)
/// so the inner line walk over a fixed shell is cache-friendly.
#[derive(Clone, Debug)]
pub struct OpacityState {
    /// Line frequencies, Hz, sorted descending (bluest line first).
    line_frequency: Vec<f64>,
    tau_sobolev: Vec<f64>,
    electron_density: Vec<f64>,
    num_shells: usize,
    macro_atom: Option<MacroAtomState>,
    continuum: Option<ContinuumState>,
}

impl OpacityState {
    /// Builds an opacity state from a descending-sorted line list, a
    /// shell-major Sobolev optical-depth table, and per-shell electron
    /// densities.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `line_frequency` is not sorted
    /// descending, if `tau_sobolev` does not have
    /// `num_shells * line_frequency.len()` entries, if any `tau_sobolev` or
    /// `electron_density` entry is negative, or if `electron_density.len()
    /// != num_shells`.
    pub fn new(
        line_frequency: Vec<f64>,
        tau_sobolev: Vec<f64>,
        electron_density: Vec<f64>,
        num_shells: usize,
    ) -> Result<Self> {
        if line_frequency.windows(2).any(|w| w[0] < w[1]) {
            return Err(Error::Configuration(
                "line_frequency must be sorted descending".to_string(),
            ));
        }
        if tau_sobolev.len() != num_shells * line_frequency.len() {
            return Err(Error::Configuration(format!(
                "tau_sobolev has {} entries, expected {} ({num_shells} shells x {} lines)",
                tau_sobolev.len(),
                num_shells * line_frequency.len(),
                line_frequency.len()
            )));
        }
        if electron_density.len() != num_shells {
            return Err(Error::Configuration(format!(
                "electron_density has {} entries, expected {num_shells}",
                electron_density.len()
            )));
        }
        if tau_sobolev.iter().any(|&t| t < 0.0) {
            return Err(Error::Configuration(
                "tau_sobolev entries must be non-negative".to_string(),
            ));
        }
        if electron_density.iter().any(|&n| n < 0.0) {
            return Err(Error::Configuration(
                "electron_density entries must be non-negative".to_string(),
            ));
        }

        Ok(Self {
            line_frequency,
            tau_sobolev,
            electron_density,
            num_shells,
            macro_atom: None,
            continuum: None,
        })
    }

    /// Attaches macro-atom transition tables, for use with
    /// `LineInteractionMode::MacroAtom`.
    #[must_use]
    pub fn with_macro_atom(mut self, macro_atom: MacroAtomState) -> Self {
        self.macro_atom = Some(macro_atom);
        self
    }

    /// Attaches continuum opacity tables, enabling continuum events.
    #[must_use]
    pub fn with_continuum(mut self, continuum: ContinuumState) -> Self {
        self.continuum = Some(continuum);
        self
    }

    /// Number of lines `L`.
    #[must_use]
    pub fn num_lines(&self) -> usize {
        self.line_frequency.len()
    }

    /// Number of shells `S`.
    #[must_use]
    pub fn num_shells(&self) -> usize {
        self.num_shells
    }

    /// Frequency of line `l`, Hz.
    #[must_use]
    pub fn line_frequency(&self, l: usize) -> f64 {
        self.line_frequency[l]
    }

    /// Sobolev optical depth of line `l` in shell `s`.
    #[must_use]
    pub fn tau_sobolev(&self, l: usize, s: usize) -> f64 {
        self.tau_sobolev[s * self.num_lines() + l]
    }

    /// Electron number density in shell `s`, cm⁻³.
    #[must_use]
    pub fn electron_density(&self, s: usize) -> f64 {
        self.electron_density[s]
    }

    /// Macro-atom transition tables, if this opacity state was built with
    /// [`Self::with_macro_atom`].
    #[must_use]
    pub fn macro_atom(&self) -> Option<&MacroAtomState> {
        self.macro_atom.as_ref()
    }

    /// Continuum opacity tables, if this opacity state was built with
    /// [`Self::with_continuum`].
    #[must_use]
    pub fn continuum(&self) -> Option<&ContinuumState> {
        self.continuum.as_ref()
    }

    /// Index of the first line at or below `nu_cmf` (the bluest line the
    /// packet has not yet passed), via binary search on the descending line
    /// list. Returns `num_lines()` when `nu_cmf` is below every line.
    #[must_use]
    pub fn next_line_id_for(&self, nu_cmf: f64) -> usize {
        self.line_frequency.partition_point(|&nu| nu >= nu_cmf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_state() -> OpacityState {
        OpacityState::new(
            vec![9e14, 7e14, 5e14, 3e14],
            vec![0.0; 4 * 2],
            vec![1e8, 2e8],
            2,
        )
        .unwrap()
    }

    #[test]
    fn rejects_ascending_line_list() {
        assert!(OpacityState::new(vec![1e14, 2e14], vec![0.0; 2], vec![1.0], 1).is_err());
    }

    #[test]
    fn shell_major_layout_indexes_correctly() {
        let mut tau = vec![0.0; 4 * 2];
        // line 2, shell 1 -> flat index 1*4 + 2 = 6
        tau[6] = 3.5;
        let state = OpacityState::new(vec![9e14, 7e14, 5e14, 3e14], tau, vec![1e8, 2e8], 2).unwrap();
        assert_eq!(state.tau_sobolev(2, 1), 3.5);
        assert_eq!(state.tau_sobolev(2, 0), 0.0);
    }

    #[test]
    fn next_line_id_finds_bluest_unpassed_line() {
        let state = simple_state();
        // nu_cmf between line[0]=9e14 and line[1]=7e14: the next (bluer)
        // line the packet has not yet passed is index 1 (7e14 <= nu_cmf? no)
        assert_eq!(state.next_line_id_for(9.5e14), 0);
        assert_eq!(state.next_line_id_for(8e14), 1);
        // Exactly on a line: already counted as passed, so the cursor lands
        // one line bluer than it.
        assert_eq!(state.next_line_id_for(7e14), 2);
        assert_eq!(state.next_line_id_for(6.9e14), 2);
        assert_eq!(state.next_line_id_for(1e14), 4);
    }
}
