//! Immutable, already-validated run configuration.
//!
//! [`TransportConfig`] is built once by [`TransportConfig::new`] (which
//! rejects inconsistent states) and then shared by reference across worker
//! threads: no process-wide mutable flags survive a run.

use crate::error::{Error, Result};

/// Selects how a bound-bound line interaction re-emits.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LineInteractionMode {
    /// Emission line equals the absorbed line.
    Scatter,
    /// Sample one downward radiative transition from the upper level,
    /// weighted by Einstein-A probabilities.
    Downbranch,
    /// Run the full macro-atom Markov chain (requires
    /// [`crate::opacity::OpacityState::macro_atom`] to be present).
    MacroAtom,
}

/// Selects the frame-transform fidelity used by the transport loop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RelativityMode {
    /// No frame transforms: lab frame == co-moving frame.
    Off,
    /// Frequency/energy Doppler shift only; propagation angle `mu` is not
    /// aberrated.
    Partial,
    /// Frequency/energy Doppler shift plus angle aberration.
    Full,
}

/// Immutable transport run configuration.
#[derive(Clone, Debug)]
pub struct TransportConfig {
    line_interaction_mode: LineInteractionMode,
    relativity: RelativityMode,
    disable_electron_scattering: bool,
    number_of_virtual_packets: usize,
    tracking_rpacket: bool,
    nthreads: usize,
    spectrum_frequency_bins: Vec<f64>,
    trace_buffer_cap: usize,
}

impl TransportConfig {
    /// Builds and validates a [`TransportConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `nthreads == 0`, if
    /// `spectrum_frequency_bins` has fewer than two entries or is not sorted
    /// ascending, or if `line_interaction_mode == MacroAtom` is requested
    /// while building a grid with no macro-atom table is the caller's
    /// responsibility (checked later, against the actual
    /// [`crate::opacity::OpacityState`], in
    /// [`crate::driver::initialize_transport`]).
    pub fn new(
        line_interaction_mode: LineInteractionMode,
        relativity: RelativityMode,
        disable_electron_scattering: bool,
        number_of_virtual_packets: usize,
        tracking_rpacket: bool,
        nthreads: usize,
        spectrum_frequency_bins: Vec<f64>,
    ) -> Result<Self> {
        if nthreads == 0 {
            return Err(Error::Configuration(
                "nthreads must be at least 1".to_string(),
            ));
        }
        if spectrum_frequency_bins.len() < 2 {
            return Err(Error::Configuration(
                "spectrum_frequency_bins needs at least two edges".to_string(),
            ));
        }
        if spectrum_frequency_bins.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::Configuration(
                "spectrum_frequency_bins must be sorted strictly ascending".to_string(),
            ));
        }

        Ok(Self {
            line_interaction_mode,
            relativity,
            disable_electron_scattering,
            number_of_virtual_packets,
            tracking_rpacket,
            nthreads,
            spectrum_frequency_bins,
            trace_buffer_cap: 4096,
        })
    }

    /// Overrides the per-packet trace buffer cap (default 4096 events).
    /// Only meaningful when [`Self::tracking_rpacket`] is set.
    #[must_use]
    pub const fn with_trace_buffer_cap(mut self, cap: usize) -> Self {
        self.trace_buffer_cap = cap;
        self
    }

    /// Line-interaction emission mode.
    #[must_use]
    pub const fn line_interaction_mode(&self) -> LineInteractionMode {
        self.line_interaction_mode
    }

    /// Relativity fidelity.
    #[must_use]
    pub const fn relativity(&self) -> RelativityMode {
        self.relativity
    }

    /// Whether electron scattering is disabled (effective cross-section is
    /// set to `SIGMA_THOMSON_DISABLED` rather than special-cased).
    #[must_use]
    pub const fn disable_electron_scattering(&self) -> bool {
        self.disable_electron_scattering
    }

    /// Number of virtual packets dispatched per volley.
    #[must_use]
    pub const fn number_of_virtual_packets(&self) -> usize {
        self.number_of_virtual_packets
    }

    /// Whether per-packet diagnostic traces are recorded.
    #[must_use]
    pub const fn tracking_rpacket(&self) -> bool {
        self.tracking_rpacket
    }

    /// Worker thread count.
    #[must_use]
    pub const fn nthreads(&self) -> usize {
        self.nthreads
    }

    /// Spectral bin edges, Hz, ascending.
    #[must_use]
    pub fn spectrum_frequency_bins(&self) -> &[f64] {
        &self.spectrum_frequency_bins
    }

    /// Hard cap on the per-packet trace buffer length.
    #[must_use]
    pub const fn trace_buffer_cap(&self) -> usize {
        self.trace_buffer_cap
    }
}
