//! Distance-to-next-event computation: the line-by-line walk that decides
//! whether a packet's next event is a shell-boundary crossing, a
//! non-resonant scatter, or a resonant line interaction.

use crate::config::RelativityMode;
use crate::constants::{CLOSE_LINE_THRESHOLD, SIGMA_THOMSON, SIGMA_THOMSON_DISABLED};
use crate::error::PacketFault;
use crate::frame::{beta, doppler_factor};
use crate::geometry::{BoundaryHit, Geometry};
use crate::opacity::OpacityState;

/// The event a packet's next step will be.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EventKind {
    /// Crosses into an adjacent shell without interacting.
    Boundary(BoundaryHit),
    /// A non-resonant scatter: either free-electron Thomson scattering or,
    /// if continuum opacity is present, one of its channels. Which is
    /// decided by the caller via [`crate::opacity::ContinuumState::sample_channel`]
    /// weighted against the electron-scattering share.
    Scatter,
    /// A resonant bound-bound (Sobolev) line interaction at this line id.
    Line(usize),
}

/// The outcome of walking a packet to its next event: which kind of event,
/// at what physical distance, and the line-list cursor the packet should
/// resume from afterwards.
#[derive(Clone, Copy, Debug)]
pub struct NextEvent {
    /// Physical distance to the event, cm.
    pub distance: f64,
    /// What kind of event it is.
    pub kind: EventKind,
    /// `next_line_id` to resume scanning from after this event is handled
    /// (for a line event, the line just selected; the caller advances past
    /// it when continuing transport).
    pub next_line_id: usize,
}

/// The non-resonant (escatter + continuum) opacity in `shell`, cm^-1,
/// already combining the effective Thomson cross-section with any
/// continuum opacity present.
fn scatter_opacity(opacity: &OpacityState, shell: usize, disable_electron_scattering: bool) -> f64 {
    let sigma_t = if disable_electron_scattering {
        SIGMA_THOMSON_DISABLED
    } else {
        SIGMA_THOMSON
    };
    let electron = opacity.electron_density(shell) * sigma_t;
    let continuum = opacity.continuum().map_or(0.0, |c| c.total_opacity(shell));
    electron + continuum
}

/// Walks the packet at `(r, mu, nu_cmf)` in `shell`, starting its line scan
/// from `next_line_id`, and returns the next event.
///
/// `tau_event` is the packet's pre-sampled `-ln(xi)` optical-depth budget,
/// shared between the continuum/escatter distance and the cumulative
/// Sobolev-tau line walk: one random optical depth is drawn per packet-step
/// and spent against whichever process reaches it first.
///
/// # Errors
///
/// Returns [`PacketFault::NegativeLineDistance`] if a line's `nu_diff`
/// comes out negative even after the close-line clamp, which indicates
/// `next_line_id` was left in an inconsistent state by the caller.
#[allow(clippy::too_many_arguments)]
pub fn next_event(
    geometry: &Geometry,
    opacity: &OpacityState,
    r: f64,
    mu: f64,
    nu_lab: f64,
    shell: usize,
    next_line_id: usize,
    tau_event: f64,
    disable_electron_scattering: bool,
    relativity: RelativityMode,
) -> Result<NextEvent, PacketFault> {
    let time_explosion = geometry.time_explosion();
    let d_boundary_distance;
    let boundary_hit;
    {
        let (d, hit) = geometry.distance_to_boundary(r, mu, shell);
        d_boundary_distance = d;
        boundary_hit = hit;
    }

    let kappa = scatter_opacity(opacity, shell, disable_electron_scattering);
    let mut d_scatter = tau_event / kappa;

    let doppler = doppler_factor(r, mu, time_explosion);
    let nu_cmf = nu_lab * doppler;
    let beta_r = beta(r, time_explosion);
    let c_t_exp = crate::constants::C_LIGHT * time_explosion;

    let num_lines = opacity.num_lines();
    let mut cumulative_tau = 0.0_f64;
    let mut line = next_line_id;

    while line < num_lines {
        let nu_line = opacity.line_frequency(line);
        let mut nu_diff = nu_cmf - nu_line;
        if (nu_diff / nu_cmf).abs() < CLOSE_LINE_THRESHOLD {
            nu_diff = 0.0;
        }
        if nu_diff < 0.0 {
            return Err(PacketFault::NegativeLineDistance {
                line_id: line,
                shell_id: shell,
            });
        }

        // d_line from the (OLD) position; full relativity adds the same
        // D^-1 correction as the frequency shift itself, since d_line is
        // derived from the identical Doppler relation.
        let d_line = if relativity == RelativityMode::Off {
            (nu_diff / nu_lab) * c_t_exp
        } else {
            (nu_diff / nu_lab) * c_t_exp / (1.0 - beta_r * mu)
        };

        if d_boundary_distance <= d_line && d_boundary_distance <= d_scatter {
            return Ok(NextEvent {
                distance: d_boundary_distance,
                kind: EventKind::Boundary(boundary_hit),
                next_line_id: line,
            });
        }
        if d_scatter <= d_line {
            return Ok(NextEvent {
                distance: d_scatter,
                kind: EventKind::Scatter,
                next_line_id: line,
            });
        }

        cumulative_tau += opacity.tau_sobolev(line, shell);
        if cumulative_tau >= tau_event {
            return Ok(NextEvent {
                distance: d_line,
                kind: EventKind::Line(line),
                next_line_id: line,
            });
        }
        d_scatter = (tau_event - cumulative_tau).max(0.0) / kappa;

        line += 1;
    }

    // Ran off the end of the line list without a decision: compare the
    // boundary and scatter distances directly.
    if d_boundary_distance <= d_scatter {
        Ok(NextEvent {
            distance: d_boundary_distance,
            kind: EventKind::Boundary(boundary_hit),
            next_line_id: line,
        })
    } else {
        Ok(NextEvent {
            distance: d_scatter,
            kind: EventKind::Scatter,
            next_line_id: line,
        })
    }
}
