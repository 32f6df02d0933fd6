//! The per-packet mutable transport record.

use rand_pcg::Pcg64Mcg;

/// Lifecycle state of a packet.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PacketStatus {
    /// Still being transported.
    InProcess,
    /// Escaped through the outer boundary.
    Emitted,
    /// Fell back through the inner boundary.
    Reabsorbed,
}

/// Which process a packet last interacted via.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InteractionType {
    /// Has not interacted yet.
    None,
    /// Crossed a shell boundary (not an "interaction" in the physical
    /// sense, but recorded for completeness when it is the terminal event).
    Boundary,
    /// Thomson (free-electron) scatter.
    EScatter,
    /// Bound-bound line interaction.
    Line,
    /// Continuum process (bound-free, free-free, or collisional).
    Continuum,
}

/// Diagnostic record of a packet's most recent physical interaction.
#[derive(Clone, Copy, Debug)]
pub struct LastInteraction {
    /// Kind of the most recent interaction.
    pub interaction_type: InteractionType,
    /// Lab-frame frequency the packet carried going into the interaction.
    pub in_nu: f64,
    /// Line absorbed, if the interaction was a line interaction.
    pub in_line_id: Option<usize>,
    /// Line emitted, if the interaction was a line interaction.
    pub out_line_id: Option<usize>,
    /// Shell the interaction occurred in.
    pub shell_id: usize,
}

impl LastInteraction {
    /// The "no interaction yet" sentinel.
    #[must_use]
    pub const fn none(shell_id: usize) -> Self {
        Self {
            interaction_type: InteractionType::None,
            in_nu: 0.0,
            in_line_id: None,
            out_line_id: None,
            shell_id,
        }
    }
}

/// A single energy packet under transport.
///
/// Invariant: while `status == InProcess`, `r` lies within
/// `[r_inner[shell_id], r_outer[shell_id]]` up to rounding, and
/// `next_line_id` always names the bluest line the packet has not yet
/// passed in its co-moving frame.
pub struct Packet {
    /// Radial position, cm.
    pub r: f64,
    /// Cosine of the propagation angle to the outward radial direction,
    /// lab frame.
    pub mu: f64,
    /// Frequency, Hz, lab frame.
    pub nu: f64,
    /// Energy, erg, lab frame. Always non-negative; the sign flip that
    /// denotes reabsorption happens only in the driver's output buffer.
    pub energy: f64,
    /// Current shell index.
    pub shell_id: usize,
    /// Index into the opacity state's line list of the next (bluest
    /// unpassed) line; equals `num_lines` once past the reddest line.
    pub next_line_id: usize,
    /// Lifecycle state.
    pub status: PacketStatus,
    /// Packet-local RNG, seeded deterministically (see [`crate::rng`]).
    pub rng: Pcg64Mcg,
    /// Diagnostic record of the most recent interaction.
    pub last_interaction: LastInteraction,
    /// Stable index into the original packet array, used for seeding and
    /// for writing this packet's output back to the correct slot.
    pub index: usize,
}

impl Packet {
    /// Builds a fresh packet in `InProcess` state, at the given initial
    /// shell, with no recorded interaction yet.
    #[must_use]
    pub fn new(
        r: f64,
        mu: f64,
        nu: f64,
        energy: f64,
        shell_id: usize,
        rng: Pcg64Mcg,
        index: usize,
    ) -> Self {
        Self {
            r,
            mu,
            nu,
            energy,
            shell_id,
            next_line_id: 0,
            status: PacketStatus::InProcess,
            rng,
            last_interaction: LastInteraction::none(shell_id),
            index,
        }
    }

    /// `true` while the packet has not yet reached a terminal state.
    #[must_use]
    pub const fn is_in_process(&self) -> bool {
        matches!(self.status, PacketStatus::InProcess)
    }

    /// `true` if every field that should remain finite during transport
    /// still is. Used to detect [`crate::error::PacketFault::NonFinite`].
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.r.is_finite() && self.mu.is_finite() && self.nu.is_finite() && self.energy.is_finite()
    }
}
