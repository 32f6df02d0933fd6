//! Initial packet generation at the inner boundary.
//!
//! Packets are launched from a black-body photosphere at `r_inner_boundary`
//! with temperature `t_inner`, weighted `mu ~ sqrt(xi)` towards the outward
//! normal, and carry equal lab-frame energy `total_luminosity * dt / n`.

use rand::Rng;

use crate::constants::{C_LIGHT, SIGMA_SB};
use crate::error::{Error, Result};
use crate::frame::prime_packet;
use crate::packet::Packet;
use crate::rng::packet_rng;

/// `zeta(4) = pi^4 / 90`, the normalization of the Carter & Cashwell
/// rejection sampler's outer sum over harmonics.
const ZETA4: f64 = std::f64::consts::PI.powi(4) / 90.0;

/// Planck's constant over Boltzmann's constant, K*s (`h / k_B`).
const H_OVER_KB: f64 = 4.799_243_073_366_221e-11;

/// Parameters that fully determine one iteration's initial packet ensemble.
#[derive(Clone, Copy, Debug)]
pub struct SourceParams {
    /// Inner-boundary black-body temperature, K.
    pub t_inner: f64,
    /// Inner-boundary radius, cm.
    pub r_inner_boundary: f64,
    /// Total luminosity emitted into this iteration, erg/s.
    pub total_luminosity: f64,
    /// Duration represented by one iteration, s.
    pub dt: f64,
    /// Base seed shared by the whole run.
    pub base_seed: u64,
}

impl SourceParams {
    /// Validates that every field is physically sensible.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `t_inner`, `r_inner_boundary`,
    /// `total_luminosity`, or `dt` is not strictly positive.
    pub fn validate(self) -> Result<Self> {
        if !(self.t_inner > 0.0) {
            return Err(Error::Configuration(
                "t_inner must be strictly positive".to_string(),
            ));
        }
        if !(self.r_inner_boundary > 0.0) {
            return Err(Error::Configuration(
                "r_inner_boundary must be strictly positive".to_string(),
            ));
        }
        if !(self.total_luminosity > 0.0) {
            return Err(Error::Configuration(
                "total_luminosity must be strictly positive".to_string(),
            ));
        }
        if !(self.dt > 0.0) {
            return Err(Error::Configuration("dt must be strictly positive".to_string()));
        }
        Ok(self)
    }

    /// The equivalent black-body surface flux, erg cm^-2 s^-1, via the
    /// Stefan-Boltzmann law. Exposed for driver-side sanity checks; the
    /// packet source itself only needs `total_luminosity`.
    #[must_use]
    pub fn surface_flux(&self) -> f64 {
        SIGMA_SB * self.t_inner.powi(4)
    }
}

/// Samples a dimensionless Planck-distributed `x = h*nu / (k_B * T)` via the
/// Carter & Cashwell (1975) rejection technique: draw a harmonic `l >= 1`
/// from the series `sum_l 1/l^4`, then `x = -ln(xi_2 xi_3 xi_4) / l`, which
/// reproduces the `x^3 / (e^x - 1)` black-body shape exactly, without
/// evaluating the Planck function itself.
fn sample_planck_x(rng: &mut impl Rng) -> f64 {
    let xi_l: f64 = rng.random();
    let threshold = xi_l * ZETA4;

    let mut l = 1u64;
    let mut cumulative = 1.0;
    while cumulative < threshold {
        l += 1;
        cumulative += 1.0 / (l as f64).powi(4);
    }

    let xi_2: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
    let xi_3: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
    let xi_4: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);

    -(xi_2 * xi_3 * xi_4).ln() / l as f64
}

/// Samples a lab-frame black-body frequency, Hz, at temperature `t`, K.
fn sample_nu(t: f64, rng: &mut impl Rng) -> f64 {
    sample_planck_x(rng) * t / H_OVER_KB
}

/// Samples `mu = sqrt(xi)`, the inverse CDF of the `2*mu` limb-weighting
/// used for packets launched from an isotropically emitting photosphere
/// into the outward hemisphere.
fn sample_mu(rng: &mut impl Rng) -> f64 {
    let xi: f64 = rng.random();
    xi.sqrt()
}

/// Builds the initial ensemble of `n` packets for `iteration`, per
/// `params`. Packet `i`'s RNG is seeded from `(params.base_seed, iteration,
/// i)` (see [`crate::rng`]) so the ensemble is a pure function of its
/// inputs, independent of how work is later partitioned across threads.
///
/// # Errors
///
/// Returns [`Error::Configuration`] if `n == 0` or `params` fails
/// [`SourceParams::validate`].
pub fn create_packets(
    params: SourceParams,
    n: usize,
    iteration: u64,
    time_explosion: f64,
    relativity: crate::config::RelativityMode,
) -> Result<Vec<Packet>> {
    let params = params.validate()?;
    if n == 0 {
        return Err(Error::Configuration(
            "create_packets requires n >= 1".to_string(),
        ));
    }

    let energy_per_packet = params.total_luminosity * params.dt / n as f64;
    let r = params.r_inner_boundary;

    let mut packets = Vec::with_capacity(n);
    for i in 0..n {
        let mut rng = packet_rng(params.base_seed, iteration, i as u64);
        let mu = sample_mu(&mut rng);
        let nu = sample_nu(params.t_inner, &mut rng);

        let (nu, energy, mu) =
            prime_packet(r, mu, nu, energy_per_packet, time_explosion, relativity);

        packets.push(Packet::new(r, mu, nu, energy, 0, rng, i));
    }

    Ok(packets)
}

/// `beta = v / c` at the photosphere, exposed for diagnostics.
#[must_use]
pub fn photosphere_beta(r_inner_boundary: f64, time_explosion: f64) -> f64 {
    (r_inner_boundary / time_explosion) / C_LIGHT
}
