//! Physical and numerical constants shared across the transport engine.
//!
//! All values are in CGS units unless noted otherwise.

/// Speed of light, cm/s.
pub const C_LIGHT: f64 = 2.999_792_458e10;

/// Thomson (free-electron) scattering cross-section, cm².
pub const SIGMA_THOMSON: f64 = 6.652_458_7e-25;

/// Effective cross-section used in place of [`SIGMA_THOMSON`] when
/// electron scattering is disabled. Keeps every distance/optical-depth
/// formula on the same code path instead of special-casing a zero
/// cross-section.
pub const SIGMA_THOMSON_DISABLED: f64 = 1e-200;

/// Relative frequency difference below which a line is treated as exactly
/// resonant with the packet's co-moving frequency (the "close-line" clamp).
pub const CLOSE_LINE_THRESHOLD: f64 = 1e-7;

/// `K_T = (π⁴ / (15·24·ζ(5))) · (h / k_B)`, used to derive the radiative
/// temperature estimator `T_rad[s] = K_T · ν̄J[s] / J[s]`.
///
/// `ζ(5) ≈ 1.036_927_755_143_369_9`, `h = 6.626_070_15e-27 erg·s`,
/// `k_B = 1.380_649e-16 erg/K`.
pub const K_T_RADIATIVE: f64 = 1.252_337_073_814_105_2e-11;

/// `K_W = (c² / (2h)) · (15 / π⁴) · (h / k_B)⁴ / (4π)`, used to derive the
/// dilution factor `W[s] = J[s] / (4·σ_SB·T_rad[s]⁴·t_sim·V[s])`.
///
/// This constant is the inverse normalization that appears inside the
/// Planck-function black-body energy density; the division by
/// `4·σ_SB·t_sim·V[s]` happens once, in [`crate::driver`], not per packet.
pub const K_DILUTION: f64 = 4408.879_934_880_165;

/// Stefan-Boltzmann constant, erg cm⁻² s⁻¹ K⁻⁴.
pub const SIGMA_SB: f64 = 5.670_374_419e-5;

/// Hard cap on internal hops inside a macro-atom Markov chain before the
/// packet is aborted with [`crate::error::PacketFault::MacroAtomOverflow`].
pub const MACRO_ATOM_HOP_CAP: u32 = 1_000_000;

/// Minimum packet-chunk granularity at which the driver polls the
/// cooperative cancellation flag.
pub const CANCEL_POLL_GRANULARITY: usize = 1024;
