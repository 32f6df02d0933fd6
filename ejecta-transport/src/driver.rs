//! The external interface: `initialize_transport` / `run` / `dump_state`,
//! and the parallel dispatcher.
//!
//! Work is partitioned into chunks of [`crate::constants::CANCEL_POLL_GRANULARITY`]
//! packets and processed by a scoped `rayon` thread pool (built per call,
//! never via `build_global`, since this is a library, not a CLI entry
//! point). Each chunk accumulates its own [`Estimators`]/[`Spectrum`]/
//! [`VirtualPacketCollection`] shard; shards are folded together with
//! `rayon`'s `reduce`, so no chunk ever observes another's partial state and
//! no atomics sit on the per-packet hot path.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use crate::config::TransportConfig;
use crate::constants::CANCEL_POLL_GRANULARITY;
use crate::error::{Error, PacketFault, Result};
use crate::estimators::Estimators;
use crate::frame::prime_packet;
use crate::geometry::Geometry;
use crate::opacity::OpacityState;
use crate::packet::Packet;
use crate::rng::packet_rng;
use crate::source::{create_packets, SourceParams};
use crate::spectrum::Spectrum;
use crate::transport::{single_packet_loop, PacketTrace};
use crate::vpacket::VirtualPacketCollection;

/// Per-fault-kind counts of packets that were aborted and sentinel-marked
/// rather than propagated as a crate [`Error`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PacketFaultCounts {
    /// Count of [`PacketFault::NegativeLineDistance`].
    pub negative_line_distance: usize,
    /// Count of [`PacketFault::NonFinite`].
    pub non_finite: usize,
    /// Count of [`PacketFault::MacroAtomOverflow`].
    pub macro_atom_overflow: usize,
}

impl PacketFaultCounts {
    /// Total number of sentinel-marked packets, across all fault kinds.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.negative_line_distance + self.non_finite + self.macro_atom_overflow
    }

    fn record(&mut self, fault: PacketFault) {
        match fault {
            PacketFault::NegativeLineDistance { .. } => self.negative_line_distance += 1,
            PacketFault::NonFinite => self.non_finite += 1,
            PacketFault::MacroAtomOverflow => self.macro_atom_overflow += 1,
        }
    }

    fn merge(&mut self, other: &Self) {
        self.negative_line_distance += other.negative_line_distance;
        self.non_finite += other.non_finite;
        self.macro_atom_overflow += other.macro_atom_overflow;
    }
}

/// Everything one `run` call produces: per-packet outputs, the reduced
/// radiation-field estimators, the emergent spectrum, and a fault-count
/// summary.
#[derive(Clone, Debug)]
pub struct RunResult {
    /// Final radiation-field estimators.
    pub estimators: Estimators,
    /// Emitted, reabsorbed, and virtual-packet spectra.
    pub spectrum: Spectrum,
    /// Per-diagnostic-kind sentinel-packet counts.
    pub fault_counts: PacketFaultCounts,
    /// Number of packets that reached `Emitted`.
    pub num_emitted: usize,
    /// Number of packets that reached `Reabsorbed`.
    pub num_reabsorbed: usize,
    /// Emergent lab-frame frequency per packet, ordered by packet index.
    /// Sentinel-marked (faulted) packets report `-1.0`.
    pub nu_out: Vec<f64>,
    /// Signed emergent energy per packet, ordered by packet index: positive
    /// for `Emitted`, negative for `Reabsorbed`, `0.0` for a sentinel.
    pub energy_out: Vec<f64>,
    /// Last-interaction metadata per packet, ordered by packet index.
    pub last_interactions: Vec<crate::packet::LastInteraction>,
    /// Per-packet diagnostic traces, present only when
    /// [`TransportConfig::tracking_rpacket`] was set, ordered by packet
    /// index.
    pub traces: Option<Vec<PacketTrace>>,
}

struct ChunkAccumulator {
    estimators: Estimators,
    spectrum: Spectrum,
    vpackets: VirtualPacketCollection,
    fault_counts: PacketFaultCounts,
    num_emitted: usize,
    num_reabsorbed: usize,
    outputs: Vec<(usize, f64, f64, crate::packet::LastInteraction)>,
    traces: Option<Vec<(usize, PacketTrace)>>,
}

impl ChunkAccumulator {
    fn new(opacity: &OpacityState, config: &TransportConfig) -> Self {
        Self {
            estimators: Estimators::for_opacity(opacity, config.line_interaction_mode() != crate::config::LineInteractionMode::Scatter),
            spectrum: Spectrum::new(config.spectrum_frequency_bins().to_vec()),
            vpackets: VirtualPacketCollection::new(),
            fault_counts: PacketFaultCounts::default(),
            num_emitted: 0,
            num_reabsorbed: 0,
            outputs: Vec::new(),
            traces: config.tracking_rpacket().then(Vec::new),
        }
    }

    fn merge(mut self, other: Self) -> Self {
        self.estimators.merge(&other.estimators);
        self.spectrum.merge(&other.spectrum);
        self.vpackets.merge(&other.vpackets);
        self.fault_counts.merge(&other.fault_counts);
        self.num_emitted += other.num_emitted;
        self.num_reabsorbed += other.num_reabsorbed;
        self.outputs.extend(other.outputs);
        if let (Some(a), Some(b)) = (self.traces.as_mut(), other.traces) {
            a.extend(b);
        }
        self
    }
}

/// Drives one transport iteration: packet generation, parallel propagation,
/// and the final reduce into a [`RunResult`].
pub struct TransportDriver {
    geometry: Geometry,
    opacity: OpacityState,
    config: TransportConfig,
    cancel: Arc<AtomicBool>,
}

impl TransportDriver {
    /// Validates `geometry`/`opacity`/`config` against each other and
    /// builds a driver ready to `run`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `config` requests
    /// `LineInteractionMode::MacroAtom` or `Downbranch` while `opacity` has
    /// no macro-atom table attached, or if `opacity.num_shells() !=
    /// geometry.num_shells()`.
    pub fn initialize_transport(
        geometry: Geometry,
        opacity: OpacityState,
        config: TransportConfig,
    ) -> Result<Self> {
        if opacity.num_shells() != geometry.num_shells() {
            return Err(Error::Configuration(format!(
                "opacity has {} shells, geometry has {}",
                opacity.num_shells(),
                geometry.num_shells()
            )));
        }
        let needs_macro_atom = matches!(
            config.line_interaction_mode(),
            crate::config::LineInteractionMode::MacroAtom | crate::config::LineInteractionMode::Downbranch
        );
        if needs_macro_atom && opacity.macro_atom().is_none() {
            return Err(Error::Configuration(
                "line_interaction_mode requires a macro-atom table, but opacity has none".to_string(),
            ));
        }

        Ok(Self {
            geometry,
            opacity,
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Requests cooperative cancellation of an in-flight [`Self::run`]. The
    /// next chunk boundary observes the flag and the call returns
    /// [`Error::Cancelled`]; already-processed packets' contributions are
    /// discarded.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Runs `n` packets for `iteration`, sourced from `source_params`, and
    /// reduces every worker's shard into a single [`RunResult`].
    ///
    /// `progress` is called with `(packets_done, n)` at a coarse granularity
    /// (every [`CANCEL_POLL_GRANULARITY`] packets); it runs on whichever
    /// worker thread finishes a chunk and must not block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `n == 0` or `source_params` is
    /// invalid, [`Error::Resource`] if the thread pool cannot be built, and
    /// [`Error::Cancelled`] if [`Self::cancel`] was observed mid-run.
    pub fn run(
        &self,
        n: usize,
        iteration: u64,
        source_params: SourceParams,
        progress: Option<&(dyn Fn(usize, usize) + Sync)>,
    ) -> Result<RunResult> {
        let span = tracing::info_span!("transport_run", iteration, n);
        let _enter = span.enter();

        if n == 0 {
            return Err(Error::Configuration("run requires n >= 1".to_string()));
        }

        let packets = create_packets(
            source_params,
            n,
            iteration,
            self.geometry.time_explosion(),
            self.config.relativity(),
        )?;

        let pool = ThreadPoolBuilder::new()
            .num_threads(self.config.nthreads())
            .build()
            .map_err(|e| Error::Resource(e.to_string()))?;

        let done = AtomicUsize::new(0);
        let cancelled = Arc::clone(&self.cancel);
        cancelled.store(false, Ordering::Relaxed);

        let result = pool.install(|| {
            packets
                .into_par_iter()
                .chunks(CANCEL_POLL_GRANULARITY)
                .map(|chunk| self.process_chunk(chunk, &done, n, progress, &cancelled))
                .reduce(
                    || ChunkAccumulator::new(&self.opacity, &self.config),
                    ChunkAccumulator::merge,
                )
        });

        if cancelled.load(Ordering::Relaxed) {
            return Err(Error::Cancelled);
        }

        let traces = result.traces.map(|mut indexed| {
            indexed.sort_by_key(|(index, _)| *index);
            indexed.into_iter().map(|(_, trace)| trace).collect()
        });

        let mut outputs = result.outputs;
        outputs.sort_by_key(|(index, ..)| *index);
        let mut nu_out = Vec::with_capacity(outputs.len());
        let mut energy_out = Vec::with_capacity(outputs.len());
        let mut last_interactions = Vec::with_capacity(outputs.len());
        for (_, nu, energy, last_interaction) in outputs {
            nu_out.push(nu);
            energy_out.push(energy);
            last_interactions.push(last_interaction);
        }

        Ok(RunResult {
            estimators: result.estimators,
            spectrum: result.spectrum,
            fault_counts: result.fault_counts,
            num_emitted: result.num_emitted,
            num_reabsorbed: result.num_reabsorbed,
            nu_out,
            energy_out,
            last_interactions,
            traces,
        })
    }

    fn process_chunk(
        &self,
        chunk: Vec<Packet>,
        done: &AtomicUsize,
        total: usize,
        progress: Option<&(dyn Fn(usize, usize) + Sync)>,
        cancelled: &Arc<AtomicBool>,
    ) -> ChunkAccumulator {
        let mut acc = ChunkAccumulator::new(&self.opacity, &self.config);
        let chunk_len = chunk.len();

        if cancelled.load(Ordering::Relaxed) {
            return acc;
        }

        for mut packet in chunk {
            let index = packet.index;
            let mut trace = self
                .config
                .tracking_rpacket()
                .then(|| PacketTrace::with_capacity(self.config.trace_buffer_cap()));
            let mut vpackets = VirtualPacketCollection::new();

            let outcome = single_packet_loop(
                &mut packet,
                &self.geometry,
                &self.opacity,
                &self.config,
                &mut acc.estimators,
                &mut acc.spectrum,
                Some(&mut vpackets),
                trace.as_mut(),
            );

            let (nu_out, energy_out) = match outcome {
                Ok(()) => match packet.status {
                    crate::packet::PacketStatus::Emitted => {
                        acc.num_emitted += 1;
                        (packet.nu, packet.energy)
                    }
                    crate::packet::PacketStatus::Reabsorbed => {
                        acc.num_reabsorbed += 1;
                        (packet.nu, -packet.energy)
                    }
                    crate::packet::PacketStatus::InProcess => unreachable!(
                        "single_packet_loop only returns Ok once status is terminal"
                    ),
                },
                Err(fault) => {
                    tracing::warn!(packet = index, %fault, "packet aborted with a numerical fault");
                    acc.fault_counts.record(fault);
                    (-1.0, 0.0)
                }
            };
            acc.outputs.push((index, nu_out, energy_out, packet.last_interaction));

            acc.vpackets.merge(&vpackets);
            for (nu, energy) in vpackets.contributions() {
                acc.spectrum.record_virtual(nu, energy);
            }
            if let (Some(traces), Some(trace)) = (acc.traces.as_mut(), trace) {
                traces.push((index, trace));
            }
        }

        let processed = done.fetch_add(chunk_len, Ordering::Relaxed) + chunk_len;
        if let Some(progress) = progress {
            progress(processed, total);
        }
        if cancelled.load(Ordering::Relaxed) {
            tracing::warn!("transport run cancelled mid-flight");
        }

        acc
    }

    /// Reads back the driver's immutable inputs, for diagnostics or
    /// checkpointing by the external collaborator that owns plasma-state
    /// iteration.
    #[must_use]
    pub fn dump_state(&self) -> (&Geometry, &OpacityState, &TransportConfig) {
        (&self.geometry, &self.opacity, &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LineInteractionMode, RelativityMode};

    fn driver() -> TransportDriver {
        let geometry = Geometry::new(vec![1e14, 2e14], vec![2e14, 3e14], 1e5).unwrap();
        let opacity = OpacityState::new(vec![], vec![], vec![0.0, 0.0], 2).unwrap();
        let config = TransportConfig::new(
            LineInteractionMode::Scatter,
            RelativityMode::Off,
            false,
            0,
            false,
            2,
            vec![1e13, 1e14, 1e15, 1e16, 1e17],
        )
        .unwrap();
        TransportDriver::initialize_transport(geometry, opacity, config).unwrap()
    }

    fn source_params() -> SourceParams {
        SourceParams {
            t_inner: 10_000.0,
            r_inner_boundary: 1e14,
            total_luminosity: 1e43,
            dt: 1.0,
            base_seed: 7,
        }
    }

    #[test]
    fn run_accounts_for_every_packet() {
        let driver = driver();
        let result = driver.run(500, 0, source_params(), None).unwrap();
        assert_eq!(result.num_emitted + result.num_reabsorbed + result.fault_counts.total(), 500);
    }

    #[test]
    fn run_is_deterministic_across_thread_counts() {
        let geometry = Geometry::new(vec![1e14, 2e14], vec![2e14, 3e14], 1e5).unwrap();
        let opacity = OpacityState::new(vec![], vec![], vec![1e8, 1e8], 2).unwrap();

        let config_one = TransportConfig::new(
            LineInteractionMode::Scatter,
            RelativityMode::Off,
            false,
            0,
            false,
            1,
            vec![1e13, 1e14, 1e15, 1e16, 1e17],
        )
        .unwrap();
        let config_four = TransportConfig::new(
            LineInteractionMode::Scatter,
            RelativityMode::Off,
            false,
            0,
            false,
            4,
            vec![1e13, 1e14, 1e15, 1e16, 1e17],
        )
        .unwrap();

        let driver_one = TransportDriver::initialize_transport(geometry.clone(), opacity.clone(), config_one).unwrap();
        let driver_four = TransportDriver::initialize_transport(geometry, opacity, config_four).unwrap();

        let result_one = driver_one.run(300, 0, source_params(), None).unwrap();
        let result_four = driver_four.run(300, 0, source_params(), None).unwrap();

        assert_eq!(result_one.num_emitted, result_four.num_emitted);
        assert_eq!(result_one.num_reabsorbed, result_four.num_reabsorbed);
    }

    #[test]
    fn rejects_macro_atom_mode_without_a_table() {
        let geometry = Geometry::new(vec![1e14], vec![2e14], 1e5).unwrap();
        let opacity = OpacityState::new(vec![], vec![], vec![0.0], 1).unwrap();
        let config = TransportConfig::new(
            LineInteractionMode::MacroAtom,
            RelativityMode::Off,
            false,
            0,
            false,
            1,
            vec![1e13, 1e17],
        )
        .unwrap();
        assert!(TransportDriver::initialize_transport(geometry, opacity, config).is_err());
    }
}
