//! Virtual-packet variance reduction.
//!
//! After initialization and after every real interaction other than a
//! boundary crossing, a volley of `N_v` virtual packets is launched from the
//! interaction point on fresh, forced-outward directions. Each is traced to
//! the outer boundary accumulating total optical depth deterministically
//! (no stochastic branching: a virtual packet never itself interacts) and
//! contributes `E * exp(-tau)` to the emergent spectrum. They never touch
//! real-packet state or the `J`/`nu_bar_J` estimators.

use rand::Rng;

use crate::config::TransportConfig;
use crate::frame::{doppler_factor, inverse_doppler_factor};
use crate::geometry::Geometry;
use crate::opacity::OpacityState;
use crate::packet::Packet;

/// Optical depths beyond this are treated as fully absorbed; the
/// contribution `exp(-tau)` is negligible (`exp(-30) ~ 1e-13`) and not worth
/// continuing to trace.
const TAU_CUTOFF: f64 = 30.0;

/// Append-only buffer of emergent `(nu_lab, energy)` contributions from
/// virtual packets, later histogrammed by [`crate::spectrum`].
#[derive(Clone, Debug, Default)]
pub struct VirtualPacketCollection {
    nu: Vec<f64>,
    energy: Vec<f64>,
}

impl VirtualPacketCollection {
    /// An empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of virtual-packet contributions recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nu.len()
    }

    /// `true` if no contribution has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nu.is_empty()
    }

    /// Recorded `(nu_lab, energy)` pairs.
    #[must_use]
    pub fn contributions(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.nu.iter().copied().zip(self.energy.iter().copied())
    }

    /// Folds `other`'s contributions into `self`. Used to merge per-thread
    /// shards after the parallel region closes.
    pub fn merge(&mut self, other: &Self) {
        self.nu.extend_from_slice(&other.nu);
        self.energy.extend_from_slice(&other.energy);
    }

    /// Launches `config.number_of_virtual_packets()` virtual packets from
    /// `packet`'s current position, each on an independently sampled
    /// forced-outward direction (`mu_v` uniform in `(0, 1]`, which
    /// guarantees every virtual packet eventually reaches the outer
    /// boundary without first crossing the inner one).
    pub fn dispatch_volley(
        &mut self,
        packet: &mut Packet,
        geometry: &Geometry,
        opacity: &OpacityState,
        config: &TransportConfig,
    ) {
        let n_v = config.number_of_virtual_packets();
        if n_v == 0 {
            return;
        }

        let t = geometry.time_explosion();
        let doppler_real = doppler_factor(packet.r, packet.mu, t);
        let nu_cmf = packet.nu * doppler_real;
        let energy_cmf = packet.energy * doppler_real;

        for _ in 0..n_v {
            let mu_v: f64 = packet.rng.random::<f64>().max(f64::MIN_POSITIVE);
            let inv_doppler_v = inverse_doppler_factor(packet.r, mu_v, t);
            let nu_lab_v = nu_cmf * inv_doppler_v;
            let energy_lab_v = energy_cmf * inv_doppler_v;

            let tau = trace_virtual_tau(geometry, opacity, packet.r, mu_v, packet.shell_id, nu_lab_v);
            if tau >= TAU_CUTOFF {
                continue;
            }

            self.nu.push(nu_lab_v);
            self.energy.push(energy_lab_v * (-tau).exp());
        }
    }
}

/// Traces a virtual packet with fixed lab-frame frequency `nu_lab` from
/// `(r, mu)` in `shell` to the outer boundary, summing Sobolev, continuum,
/// and electron-scattering optical depth along the way without ever
/// branching on it.
fn trace_virtual_tau(
    geometry: &Geometry,
    opacity: &OpacityState,
    mut r: f64,
    mut mu: f64,
    mut shell: usize,
    nu_lab: f64,
) -> f64 {
    let t = geometry.time_explosion();
    let num_shells = geometry.num_shells();
    let num_lines = opacity.num_lines();

    let mut tau_total = 0.0;
    let mut line_cursor = opacity.next_line_id_for(nu_lab * doppler_factor(r, mu, t));

    while shell < num_shells {
        let (distance, _hit) = geometry.distance_to_boundary(r, mu, shell);

        let nu_cmf_entry = nu_lab * doppler_factor(r, mu, t);
        let r_new = (r * r + distance * distance + 2.0 * r * distance * mu).sqrt();
        let mu_new = (r * mu + distance) / r_new;
        let nu_cmf_exit = nu_lab * doppler_factor(r_new, mu_new, t);

        let sigma_t = crate::constants::SIGMA_THOMSON;
        let continuum_opacity = opacity.continuum().map_or(0.0, |c| c.total_opacity(shell));
        tau_total += (opacity.electron_density(shell) * sigma_t + continuum_opacity) * distance;

        while line_cursor < num_lines && opacity.line_frequency(line_cursor) >= nu_cmf_exit {
            if opacity.line_frequency(line_cursor) <= nu_cmf_entry {
                tau_total += opacity.tau_sobolev(line_cursor, shell);
            }
            line_cursor += 1;
        }

        if tau_total >= TAU_CUTOFF {
            return tau_total;
        }

        r = r_new;
        mu = mu_new;
        shell += 1;
    }

    tau_total
}
