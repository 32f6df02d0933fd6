//! Crate-wide error taxonomy.
//!
//! Packet-level numerical faults never surface as [`Error`]: they are caught
//! at the single-packet boundary, turned into a sentinel output, and counted
//! (see [`crate::driver::RunResult::fault_counts`]). `Error` is reserved for
//! conditions rejected at construction time or raised by the driver itself.

use thiserror::Error;

/// Catch-all error for this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Rejected at `initialize_transport` or at a fallible constructor;
    /// never raised from the per-packet hot path.
    #[error("invalid configuration: {0}")]
    Configuration(String),
    /// A resource (allocation, thread spawn) could not be obtained. Fatal;
    /// unreachable in normal operation.
    #[error("resource error: {0}")]
    Resource(String),
    /// The cooperative cancellation flag was observed; partial estimators
    /// were discarded.
    #[error("transport run was cancelled")]
    Cancelled,
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Numerical fault raised while transporting a single packet.
///
/// These never unwind past the packet's own transport loop: the driver
/// catches them, marks the packet's output as a sentinel
/// (`ν = -1`, `E = 0`), increments a counter, and continues with the next
/// packet.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum PacketFault {
    /// The packet's co-moving frequency had already redshifted past the
    /// line it was being tested against (`Δν < 0`); this indicates a logic
    /// bug in the line walk, not a physical condition.
    #[error("nu_diff < 0 while tracing line {line_id} in shell {shell_id}")]
    NegativeLineDistance {
        /// Line index being tested when the fault was raised.
        line_id: usize,
        /// Shell the packet occupied at the time.
        shell_id: usize,
    },
    /// A packet field (`r`, `mu`, `nu`, `energy`) became non-finite.
    #[error("non-finite packet state encountered")]
    NonFinite,
    /// The macro-atom Markov chain exceeded
    /// [`crate::constants::MACRO_ATOM_HOP_CAP`] internal hops without
    /// reaching a radiative de-excitation.
    #[error("macro-atom chain exceeded the hop cap")]
    MacroAtomOverflow,
}
