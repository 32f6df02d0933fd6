//! The per-packet transport state machine: frame priming already applied,
//! this drives one packet from its initial state through to `Emitted` or
//! `Reabsorbed`, or aborts it with a [`PacketFault`].

pub mod interaction;
pub mod trace;

use rand::Rng;

use crate::config::TransportConfig;
use crate::error::PacketFault;
use crate::estimators::Estimators;
use crate::frame::doppler_factor;
use crate::geometry::Geometry;
use crate::opacity::OpacityState;
use crate::packet::{Packet, PacketStatus};
use crate::spectrum::Spectrum;
use crate::vpacket::VirtualPacketCollection;

use trace::EventKind;

/// One diagnostic event recorded in a [`PacketTrace`].
#[derive(Clone, Copy, Debug)]
pub struct TraceEvent {
    /// Shell the packet occupied when this event fired.
    pub shell_id: usize,
    /// Radius at the event, cm.
    pub r: f64,
    /// Lab-frame frequency at the event, Hz.
    pub nu: f64,
    /// What kind of event this was.
    pub kind: EventKind,
}

/// A pre-sized, growable diagnostic buffer of one packet's events, capped at
/// [`crate::config::TransportConfig::trace_buffer_cap`]. Exceeding the cap
/// marks the trace truncated but never aborts the packet.
#[derive(Clone, Debug, Default)]
pub struct PacketTrace {
    events: Vec<TraceEvent>,
    cap: usize,
    truncated: bool,
}

impl PacketTrace {
    /// Builds an empty trace pre-sized to `cap` events.
    #[must_use]
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            events: Vec::with_capacity(cap.min(256)),
            cap,
            truncated: false,
        }
    }

    /// Appends `event`, marking the trace truncated instead of growing past
    /// `cap`.
    pub fn push(&mut self, event: TraceEvent) {
        if self.events.len() < self.cap {
            self.events.push(event);
        } else {
            self.truncated = true;
        }
    }

    /// Recorded events, in order.
    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// `true` if the trace hit its cap and dropped later events.
    #[must_use]
    pub fn truncated(&self) -> bool {
        self.truncated
    }
}

/// Drives `packet` from its current (already lab/co-moving-primed) state
/// through boundary, scatter, and line events until it reaches `Emitted` or
/// `Reabsorbed`, dispatching a virtual-packet volley after initialization
/// and after every non-boundary event, and recording its terminal
/// contribution into `spectrum`.
///
/// # Errors
///
/// Returns the [`PacketFault`] that aborted the packet; the caller is
/// expected to mark the packet's output as a sentinel and count the fault
/// rather than propagate it as a crate [`crate::error::Error`].
#[allow(clippy::too_many_arguments)]
pub fn single_packet_loop(
    packet: &mut Packet,
    geometry: &Geometry,
    opacity: &OpacityState,
    config: &TransportConfig,
    estimators: &mut Estimators,
    spectrum: &mut Spectrum,
    mut vpackets: Option<&mut VirtualPacketCollection>,
    mut packet_trace: Option<&mut PacketTrace>,
) -> Result<(), PacketFault> {
    let t = geometry.time_explosion();
    packet.next_line_id = opacity.next_line_id_for(packet.nu * doppler_factor(packet.r, packet.mu, t));

    if let Some(vpackets) = vpackets.as_deref_mut() {
        vpackets.dispatch_volley(packet, geometry, opacity, config);
    }

    while packet.is_in_process() {
        if !packet.is_finite() {
            return Err(PacketFault::NonFinite);
        }

        let tau_event = -packet.rng.random::<f64>().max(f64::MIN_POSITIVE).ln();
        let event = trace::next_event(
            geometry,
            opacity,
            packet.r,
            packet.mu,
            packet.nu,
            packet.shell_id,
            packet.next_line_id,
            tau_event,
            config.disable_electron_scattering(),
            config.relativity(),
        )?;

        if let Some(trace_buf) = packet_trace.as_deref_mut() {
            trace_buf.push(TraceEvent {
                shell_id: packet.shell_id,
                r: packet.r,
                nu: packet.nu,
                kind: event.kind,
            });
        }

        interaction::apply_event(
            packet,
            geometry,
            opacity,
            config,
            estimators,
            vpackets.as_deref_mut(),
            event,
        )?;
    }

    match packet.status {
        PacketStatus::Emitted => spectrum.record_emitted(packet.nu, packet.energy),
        PacketStatus::Reabsorbed => spectrum.record_reabsorbed(packet.nu, packet.energy),
        PacketStatus::InProcess => unreachable!("loop only exits once status is terminal"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LineInteractionMode, RelativityMode};
    use crate::frame::prime_packet;
    use crate::packet::Packet;
    use crate::rng::packet_rng;

    fn geometry() -> Geometry {
        Geometry::new(vec![1e14, 2e14, 3e14], vec![2e14, 3e14, 4e14], 1e5).unwrap()
    }

    fn config() -> TransportConfig {
        TransportConfig::new(
            LineInteractionMode::Scatter,
            RelativityMode::Off,
            false,
            0,
            false,
            1,
            vec![1e13, 1e14, 1e15, 1e16, 1e17],
        )
        .unwrap()
    }

    #[test]
    fn free_streaming_packet_escapes_without_interaction() {
        let geometry = geometry();
        // Zero electron density, no lines: the packet can only hit boundaries.
        let opacity = OpacityState::new(vec![], vec![], vec![0.0, 0.0, 0.0], 3).unwrap();
        let config = config();
        let rng = packet_rng(1, 0, 0);
        let (nu, energy, mu) = prime_packet(1e14, 1.0, 1e15, 1.0, geometry.time_explosion(), RelativityMode::Off);
        let mut packet = Packet::new(1e14, mu, nu, energy, 0, rng, 0);

        let mut estimators = Estimators::new(3, 0, false, false);
        let mut spectrum = Spectrum::new(config.spectrum_frequency_bins().to_vec());

        single_packet_loop(&mut packet, &geometry, &opacity, &config, &mut estimators, &mut spectrum, None, None)
            .unwrap();

        assert_eq!(packet.status, PacketStatus::Emitted);
    }

    #[test]
    fn inward_packet_is_reabsorbed() {
        let geometry = geometry();
        let opacity = OpacityState::new(vec![], vec![], vec![0.0, 0.0, 0.0], 3).unwrap();
        let config = config();
        let rng = packet_rng(1, 0, 0);
        let mut packet = Packet::new(1.5e14, -1.0, 1e15, 1.0, 0, rng, 0);

        let mut estimators = Estimators::new(3, 0, false, false);
        let mut spectrum = Spectrum::new(config.spectrum_frequency_bins().to_vec());

        single_packet_loop(&mut packet, &geometry, &opacity, &config, &mut estimators, &mut spectrum, None, None)
            .unwrap();

        assert_eq!(packet.status, PacketStatus::Reabsorbed);
    }
}
