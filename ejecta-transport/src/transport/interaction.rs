//! Interaction handlers: what happens to a packet once [`super::trace::next_event`]
//! has picked an event.

use rand::Rng;

use crate::config::{LineInteractionMode, RelativityMode, TransportConfig};
use crate::constants::MACRO_ATOM_HOP_CAP;
use crate::error::PacketFault;
use crate::estimators::Estimators;
use crate::frame::{aberrate_to_lab, beta, doppler_factor, inverse_doppler_factor};
use crate::geometry::{BoundaryHit, Geometry};
use crate::opacity::continuum::ContinuumChannel;
use crate::opacity::macro_atom::TransitionType;
use crate::opacity::OpacityState;
use crate::packet::{InteractionType, LastInteraction, Packet, PacketStatus};
use crate::vpacket::VirtualPacketCollection;

use super::trace::EventKind;

/// Advances `packet` to the event position (common to every event kind),
/// recording its free-flight estimator contribution along the way:
/// `J[s] += E*D*d`, `nu_bar_J[s] += E*D*d*nu*D`, with `D` evaluated at the
/// OLD position.
fn move_to_event(packet: &mut Packet, geometry: &Geometry, estimators: &mut Estimators, distance: f64) {
    let t = geometry.time_explosion();
    let doppler = doppler_factor(packet.r, packet.mu, t);
    estimators.record_free_flight(packet.shell_id, packet.energy, doppler, distance, packet.nu);

    let r = packet.r;
    let mu = packet.mu;
    let r_new = (r * r + distance * distance + 2.0 * r * distance * mu).sqrt();
    let mu_new = (r * mu + distance) / r_new;

    packet.r = r_new;
    packet.mu = mu_new;
}

/// Redirects the packet isotropically in the co-moving frame, carrying a
/// resonant or elastic co-moving-frame frequency `nu_cmf` across the frame
/// round trip to the new direction.
fn redirect_isotropically(packet: &mut Packet, time_explosion: f64, relativity: RelativityMode, nu_cmf: f64) {
    let doppler_before = doppler_factor(packet.r, packet.mu, time_explosion);
    let energy_cmf = packet.energy * doppler_before;

    let mu_cmf: f64 = 2.0 * packet.rng.random::<f64>() - 1.0;
    let mu_new = if relativity == RelativityMode::Full {
        aberrate_to_lab(mu_cmf, beta(packet.r, time_explosion))
    } else {
        mu_cmf
    };

    let inv_doppler_after = inverse_doppler_factor(packet.r, mu_new, time_explosion);
    packet.mu = mu_new;
    packet.nu = nu_cmf * inv_doppler_after;
    packet.energy = energy_cmf * inv_doppler_after;
}

/// Applies a boundary-crossing event: moves the packet to the boundary and
/// either steps its shell index or terminates it.
pub fn apply_boundary(
    packet: &mut Packet,
    geometry: &Geometry,
    estimators: &mut Estimators,
    distance: f64,
    hit: BoundaryHit,
) {
    move_to_event(packet, geometry, estimators, distance);

    let next_shell = packet.shell_id as i64 + hit.delta_shell();
    if next_shell < 0 {
        packet.status = PacketStatus::Reabsorbed;
        packet.last_interaction = LastInteraction {
            interaction_type: InteractionType::Boundary,
            in_nu: packet.nu,
            in_line_id: None,
            out_line_id: None,
            shell_id: packet.shell_id,
        };
    } else if next_shell as usize >= geometry.num_shells() {
        packet.status = PacketStatus::Emitted;
        packet.last_interaction = LastInteraction {
            interaction_type: InteractionType::Boundary,
            in_nu: packet.nu,
            in_line_id: None,
            out_line_id: None,
            shell_id: packet.shell_id,
        };
    } else {
        packet.shell_id = next_shell as usize;
    }
}

/// Applies a non-resonant scatter event: decides between free-electron
/// scattering and, if continuum opacity is present, one of its channels,
/// weighted by their relative opacity shares, then redirects the packet.
pub fn apply_scatter(
    packet: &mut Packet,
    geometry: &Geometry,
    opacity: &OpacityState,
    config: &TransportConfig,
    estimators: &mut Estimators,
    distance: f64,
) {
    move_to_event(packet, geometry, estimators, distance);

    let t = geometry.time_explosion();
    let shell = packet.shell_id;
    let sigma_t = if config.disable_electron_scattering() {
        crate::constants::SIGMA_THOMSON_DISABLED
    } else {
        crate::constants::SIGMA_THOMSON
    };
    let electron_opacity = opacity.electron_density(shell) * sigma_t;
    let continuum = opacity.continuum();
    let continuum_opacity = continuum.map_or(0.0, |c| c.total_opacity(shell));
    let total = electron_opacity + continuum_opacity;

    let nu_cmf = packet.nu * doppler_factor(packet.r, packet.mu, t);
    let xi: f64 = packet.rng.random();

    let interaction_type = match continuum {
        Some(continuum) if xi * total >= electron_opacity => {
            let xi_channel: f64 = packet.rng.random();
            match continuum.sample_channel(shell, xi_channel) {
                ContinuumChannel::BoundFree { .. } => {
                    estimators.record_photo_ionization(shell, packet.energy);
                }
                ContinuumChannel::FreeFree => {}
                ContinuumChannel::Collisional => {
                    estimators.record_stimulated_recombination(shell, packet.energy);
                }
            }
            InteractionType::Continuum
        }
        _ => InteractionType::EScatter,
    };

    redirect_isotropically(packet, t, config.relativity(), nu_cmf);
    packet.last_interaction = LastInteraction {
        interaction_type,
        in_nu: nu_cmf,
        in_line_id: None,
        out_line_id: None,
        shell_id: shell,
    };
}

/// Applies a bound-bound line interaction, per `config.line_interaction_mode()`.
///
/// # Errors
///
/// Returns [`PacketFault::MacroAtomOverflow`] if the macro-atom Markov chain
/// exceeds [`MACRO_ATOM_HOP_CAP`] internal hops, and propagates a
/// configuration mismatch (macro-atom mode requested without a macro-atom
/// table attached) as [`PacketFault::MacroAtomOverflow`] as well, since
/// both indicate the packet cannot be resolved and must be sentinel-marked.
pub fn apply_line(
    packet: &mut Packet,
    geometry: &Geometry,
    opacity: &OpacityState,
    config: &TransportConfig,
    estimators: &mut Estimators,
    distance: f64,
    line_id: usize,
) -> Result<(), PacketFault> {
    move_to_event(packet, geometry, estimators, distance);

    let t = geometry.time_explosion();
    let shell = packet.shell_id;
    let nu_line = opacity.line_frequency(line_id);

    estimators.record_line_blue(line_id, shell, packet.energy, doppler_factor(packet.r, packet.mu, t), nu_line);

    let out_line_id = match config.line_interaction_mode() {
        LineInteractionMode::Scatter => line_id,
        LineInteractionMode::Downbranch => {
            let macro_atom = opacity.macro_atom().ok_or(PacketFault::MacroAtomOverflow)?;
            let level = macro_atom.activation_level(line_id);
            let xi: f64 = packet.rng.random();
            let transition = macro_atom
                .sample_radiative_transition(level, xi)
                .ok_or(PacketFault::MacroAtomOverflow)?;
            macro_atom.line_id(transition).ok_or(PacketFault::MacroAtomOverflow)?
        }
        LineInteractionMode::MacroAtom => {
            let macro_atom = opacity.macro_atom().ok_or(PacketFault::MacroAtomOverflow)?;
            let mut level = macro_atom.activation_level(line_id);
            let mut resolved = None;
            for _ in 0..MACRO_ATOM_HOP_CAP {
                let xi: f64 = packet.rng.random();
                let transition = macro_atom.sample_transition(level, xi);
                match macro_atom.transition_type(transition) {
                    TransitionType::Radiative => {
                        resolved = macro_atom.line_id(transition);
                        break;
                    }
                    TransitionType::Collisional | TransitionType::Internal => {
                        level = macro_atom.destination(transition);
                    }
                }
            }
            resolved.ok_or(PacketFault::MacroAtomOverflow)?
        }
    };

    let nu_cmf_out = opacity.line_frequency(out_line_id);
    redirect_isotropically(packet, t, config.relativity(), nu_cmf_out);
    packet.next_line_id = out_line_id;
    packet.last_interaction = LastInteraction {
        interaction_type: InteractionType::Line,
        in_nu: nu_line,
        in_line_id: Some(line_id),
        out_line_id: Some(out_line_id),
        shell_id: shell,
    };

    Ok(())
}

/// Dispatches the per-event kind to its handler, advancing `next_line_id`
/// for a non-terminal event to resume the walk one past whatever line the
/// trace stopped at.
///
/// # Errors
///
/// Propagates [`PacketFault`]s raised by [`apply_line`].
pub fn apply_event(
    packet: &mut Packet,
    geometry: &Geometry,
    opacity: &OpacityState,
    config: &TransportConfig,
    estimators: &mut Estimators,
    vpackets: Option<&mut VirtualPacketCollection>,
    event: super::trace::NextEvent,
) -> Result<(), PacketFault> {
    match event.kind {
        EventKind::Boundary(hit) => {
            apply_boundary(packet, geometry, estimators, event.distance, hit);
            packet.next_line_id = event.next_line_id;
        }
        EventKind::Scatter => {
            apply_scatter(packet, geometry, opacity, config, estimators, event.distance);
            packet.next_line_id = event.next_line_id;
            if let Some(vpackets) = vpackets {
                vpackets.dispatch_volley(packet, geometry, opacity, config);
            }
        }
        EventKind::Line(line_id) => {
            apply_line(packet, geometry, opacity, config, estimators, event.distance, line_id)?;
            packet.next_line_id += 1;
            if let Some(vpackets) = vpackets {
                vpackets.dispatch_volley(packet, geometry, opacity, config);
            }
        }
    }
    Ok(())
}
