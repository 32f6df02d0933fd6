//! Lab-frame / co-moving-frame transformations for homologous expansion.
//!
//! At radius `r` the ejecta moves at `v(r) = r / t_exp`, so
//! `beta(r) = v(r) / c`. The Doppler factor `D = 1 - mu * beta` converts a
//! lab-frame frequency to its co-moving counterpart: `nu_cmf = nu * D`.

use crate::config::RelativityMode;
use crate::constants::C_LIGHT;

/// `beta(r) = r / (c * t_exp)`.
#[must_use]
pub fn beta(r: f64, time_explosion: f64) -> f64 {
    (r / time_explosion) / C_LIGHT
}

/// Doppler factor `D = 1 - mu * beta`, converting lab `nu` to co-moving
/// `nu_cmf = nu * D`.
#[must_use]
pub fn doppler_factor(r: f64, mu: f64, time_explosion: f64) -> f64 {
    1.0 - mu * beta(r, time_explosion)
}

/// Inverse Doppler factor `1 / D`, converting co-moving `nu_cmf` to lab
/// `nu = nu_cmf / D`.
#[must_use]
pub fn inverse_doppler_factor(r: f64, mu: f64, time_explosion: f64) -> f64 {
    1.0 / doppler_factor(r, mu, time_explosion)
}

/// Aberrates a co-moving-frame propagation angle to the lab frame under full
/// relativity: `mu_lab = (mu_cmf + beta) / (1 + beta * mu_cmf)`.
#[must_use]
pub fn aberrate_to_lab(mu_cmf: f64, beta: f64) -> f64 {
    (mu_cmf + beta) / beta.mul_add(mu_cmf, 1.0)
}

/// One-shot lab-to-co-moving priming applied once at packet creation.
/// Returns the updated `(nu, energy, mu)`.
#[must_use]
pub fn prime_packet(
    r: f64,
    mu: f64,
    nu: f64,
    energy: f64,
    time_explosion: f64,
    relativity: RelativityMode,
) -> (f64, f64, f64) {
    let inv_d = inverse_doppler_factor(r, mu, time_explosion);
    let nu = nu * inv_d;
    let energy = energy * inv_d;

    let mu = if relativity == RelativityMode::Full {
        aberrate_to_lab(mu, beta(r, time_explosion))
    } else {
        mu
    };

    (nu, energy, mu)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doppler_factor_is_one_at_zero_beta() {
        assert!((doppler_factor(0.0, 0.5, 1e5) - 1.0).abs() < 1e-15);
    }

    #[test]
    fn doppler_and_inverse_are_reciprocal() {
        let d = doppler_factor(1e14, 0.3, 1e5);
        let inv = inverse_doppler_factor(1e14, 0.3, 1e5);
        assert!((d * inv - 1.0).abs() < 1e-12);
    }

    #[test]
    fn prime_packet_partial_relativity_leaves_mu_unchanged() {
        let (_, _, mu) = prime_packet(1e14, 0.4, 1e15, 1.0, 1e5, RelativityMode::Partial);
        assert!((mu - 0.4).abs() < 1e-15);
    }

    #[test]
    fn prime_packet_full_relativity_aberrates_mu() {
        let (_, _, mu) = prime_packet(1e14, 0.4, 1e15, 1.0, 1e5, RelativityMode::Full);
        assert!((mu - 0.4).abs() > 1e-9);
    }
}
