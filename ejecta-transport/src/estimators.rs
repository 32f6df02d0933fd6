//! Per-shell radiation-field estimator accumulators.
//!
//! Each worker thread owns a private [`Estimators`] shard, which the driver
//! merges into the final result with [`Estimators::merge`] after the
//! parallel region closes. No estimator is ever touched through a shared
//! reference from more than one thread.

use crate::opacity::OpacityState;

/// Per-shell radiation-field estimators accumulated during one iteration.
///
/// `j` and `nu_bar_j` accumulate raw `sum(E * D * d)` and
/// `sum(E * D * d * nu * D)` respectively: the `K_T`/`K_W` normalization and
/// the volume/time division happen once, in `radiation_field_properties`,
/// not on every packet.
#[derive(Clone, Debug)]
pub struct Estimators {
    j: Vec<f64>,
    nu_bar_j: Vec<f64>,
    j_blue: Option<Vec<f64>>,
    photo_ion: Option<Vec<f64>>,
    stim_recomb: Option<Vec<f64>>,
    num_shells: usize,
    num_lines: usize,
}

impl Estimators {
    /// Builds a zero-initialized estimator set sized for `num_shells`
    /// shells. `j_blue` (shell-major, `num_shells * num_lines`) and the two
    /// continuum estimators are only allocated when `track_line_blue` /
    /// `track_continuum` request them, since they are proportional to
    /// `num_shells * num_lines` and otherwise wasted.
    #[must_use]
    pub fn new(num_shells: usize, num_lines: usize, track_line_blue: bool, track_continuum: bool) -> Self {
        Self {
            j: vec![0.0; num_shells],
            nu_bar_j: vec![0.0; num_shells],
            j_blue: track_line_blue.then(|| vec![0.0; num_shells * num_lines]),
            photo_ion: track_continuum.then(|| vec![0.0; num_shells]),
            stim_recomb: track_continuum.then(|| vec![0.0; num_shells]),
            num_shells,
            num_lines,
        }
    }

    /// Builds a zero estimator set shaped to match `opacity`.
    #[must_use]
    pub fn for_opacity(opacity: &OpacityState, track_line_blue: bool) -> Self {
        Self::new(
            opacity.num_shells(),
            opacity.num_lines(),
            track_line_blue,
            opacity.continuum().is_some(),
        )
    }

    /// Number of shells this estimator set is sized for.
    #[must_use]
    pub const fn num_shells(&self) -> usize {
        self.num_shells
    }

    /// Records a free-flight contribution in shell `s`:
    /// `J[s] += E * D * d`, `nu_bar_J[s] += E * D * d * nu * D`.
    pub fn record_free_flight(&mut self, s: usize, energy: f64, doppler: f64, distance: f64, nu: f64) {
        let contribution = energy * doppler * distance;
        self.j[s] += contribution;
        self.nu_bar_j[s] += contribution * nu * doppler;
    }

    /// Records a blue-wing line estimator contribution
    /// (`J_blue[line_id, s] += E * D / nu`), used by downbranch/macro-atom
    /// line-interaction modes to build excitation/ionization balance.
    pub fn record_line_blue(&mut self, line_id: usize, s: usize, energy: f64, doppler: f64, nu: f64) {
        if let Some(j_blue) = self.j_blue.as_mut() {
            j_blue[s * self.num_lines + line_id] += energy * doppler / nu;
        }
    }

    /// Records a photoionization-rate estimator contribution in shell `s`.
    pub fn record_photo_ionization(&mut self, s: usize, value: f64) {
        if let Some(photo_ion) = self.photo_ion.as_mut() {
            photo_ion[s] += value;
        }
    }

    /// Records a stimulated-recombination-rate estimator contribution in
    /// shell `s`.
    pub fn record_stimulated_recombination(&mut self, s: usize, value: f64) {
        if let Some(stim_recomb) = self.stim_recomb.as_mut() {
            stim_recomb[s] += value;
        }
    }

    /// Raw mean-intensity accumulator, `sum(E * D * d)`, per shell.
    #[must_use]
    pub fn j(&self) -> &[f64] {
        &self.j
    }

    /// Raw frequency-weighted mean-intensity accumulator per shell.
    #[must_use]
    pub fn nu_bar_j(&self) -> &[f64] {
        &self.nu_bar_j
    }

    /// Blue-wing line estimator table, shell-major, if tracked.
    #[must_use]
    pub fn j_blue(&self) -> Option<&[f64]> {
        self.j_blue.as_deref()
    }

    /// Photoionization-rate estimator, if tracked.
    #[must_use]
    pub fn photo_ionization(&self) -> Option<&[f64]> {
        self.photo_ion.as_deref()
    }

    /// Stimulated-recombination-rate estimator, if tracked.
    #[must_use]
    pub fn stimulated_recombination(&self) -> Option<&[f64]> {
        self.stim_recomb.as_deref()
    }

    /// Folds `other` into `self` element-wise. Used to reduce per-thread
    /// shards into the run's final estimator set.
    pub fn merge(&mut self, other: &Self) {
        debug_assert_eq!(self.num_shells, other.num_shells);
        for s in 0..self.num_shells {
            self.j[s] += other.j[s];
            self.nu_bar_j[s] += other.nu_bar_j[s];
        }
        if let (Some(a), Some(b)) = (self.j_blue.as_mut(), other.j_blue.as_ref()) {
            for (x, y) in a.iter_mut().zip(b) {
                *x += y;
            }
        }
        if let (Some(a), Some(b)) = (self.photo_ion.as_mut(), other.photo_ion.as_ref()) {
            for (x, y) in a.iter_mut().zip(b) {
                *x += y;
            }
        }
        if let (Some(a), Some(b)) = (self.stim_recomb.as_mut(), other.stim_recomb.as_ref()) {
            for (x, y) in a.iter_mut().zip(b) {
                *x += y;
            }
        }
    }

    /// Derives the radiative temperature `T_rad[s] = K_T * nu_bar_J[s] /
    /// J[s]` and dilution factor `W[s] = J[s] / (4 * sigma_SB * T_rad[s]^4 *
    /// t_sim * V[s])`. Shells with `J[s] == 0` (no packets visited) report
    /// `(0.0, 0.0)`.
    #[must_use]
    pub fn radiation_field_properties(&self, volume: &[f64], t_sim: f64) -> Vec<(f64, f64)> {
        use crate::constants::{K_DILUTION, K_T_RADIATIVE};
        use itertools::izip;

        izip!(&self.j, &self.nu_bar_j, volume)
            .map(|(&j, &nu_bar_j, &v)| {
                if j <= 0.0 {
                    return (0.0, 0.0);
                }
                let t_rad = K_T_RADIATIVE * nu_bar_j / j;
                let w = K_DILUTION * j / (t_rad.powi(4) * t_sim * v);
                (t_rad, w)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_estimators_are_zeroed() {
        let e = Estimators::new(3, 5, false, false);
        assert_eq!(e.j(), &[0.0, 0.0, 0.0]);
        assert!(e.j_blue().is_none());
    }

    #[test]
    fn record_free_flight_accumulates() {
        let mut e = Estimators::new(2, 1, false, false);
        e.record_free_flight(0, 2.0, 1.0, 3.0, 1e14);
        e.record_free_flight(0, 1.0, 1.0, 1.0, 1e14);
        assert!((e.j()[0] - 7.0).abs() < 1e-9);
    }

    #[test]
    fn merge_sums_shards() {
        let mut a = Estimators::new(2, 1, false, false);
        let mut b = Estimators::new(2, 1, false, false);
        a.record_free_flight(0, 1.0, 1.0, 1.0, 1e14);
        b.record_free_flight(0, 2.0, 1.0, 1.0, 1e14);
        a.merge(&b);
        assert!((a.j()[0] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn radiation_field_properties_zero_for_unvisited_shells() {
        let e = Estimators::new(2, 1, false, false);
        let props = e.radiation_field_properties(&[1.0, 1.0], 1.0);
        assert_eq!(props[0], (0.0, 0.0));
    }
}
