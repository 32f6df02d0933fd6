//! Immutable radial shell grid.
//!
//! A [`Geometry`] describes the spatial discretization of the ejecta as a
//! stack of `S` concentric shells under homologous expansion: material at
//! radius `r` moves at `v(r) = r / t_exp`.

use crate::error::{Error, Result};

/// Boundary a packet's next distance-to-event is measured against.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BoundaryHit {
    /// The packet would cross into the next shell out (`shell_id + 1`).
    Outer,
    /// The packet would cross into the next shell in (`shell_id - 1`).
    Inner,
}

impl BoundaryHit {
    /// Shell-index delta associated with this boundary crossing.
    #[must_use]
    pub const fn delta_shell(self) -> i64 {
        match self {
            Self::Outer => 1,
            Self::Inner => -1,
        }
    }
}

/// Relative tolerance used to break distance ties in favour of the outer
/// boundary.
const BOUNDARY_TIE_EPSILON: f64 = 1e-10;

/// Immutable radial shell grid for one transport iteration.
#[derive(Clone, Debug)]
pub struct Geometry {
    r_inner: Vec<f64>,
    r_outer: Vec<f64>,
    volume: Vec<f64>,
    v_inner: Vec<f64>,
    time_explosion: f64,
}

impl Geometry {
    /// Builds a shell grid from per-shell inner/outer radii (cm) and the
    /// explosion time (s).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `r_inner` and `r_outer` have
    /// different lengths, are empty, fail to be strictly increasing and
    /// contiguous (`r_outer[s] == r_inner[s + 1]`), or if `time_explosion`
    /// is not strictly positive.
    pub fn new(r_inner: Vec<f64>, r_outer: Vec<f64>, time_explosion: f64) -> Result<Self> {
        if r_inner.len() != r_outer.len() || r_inner.is_empty() {
            return Err(Error::Configuration(
                "geometry requires non-empty, equal-length r_inner/r_outer".to_string(),
            ));
        }
        if !(time_explosion > 0.0) {
            return Err(Error::Configuration(
                "time_explosion must be strictly positive".to_string(),
            ));
        }
        for (s, (&ri, &ro)) in r_inner.iter().zip(&r_outer).enumerate() {
            if !(ri < ro) {
                return Err(Error::Configuration(format!(
                    "shell {s}: r_inner ({ri}) must be < r_outer ({ro})"
                )));
            }
            if s + 1 < r_inner.len() && (ro - r_inner[s + 1]).abs() > ro * 1e-12 {
                return Err(Error::Configuration(format!(
                    "shell {s}: r_outer ({ro}) does not match r_inner[{}] ({})",
                    s + 1,
                    r_inner[s + 1]
                )));
            }
        }

        let volume = r_inner
            .iter()
            .zip(&r_outer)
            .map(|(&ri, &ro)| (4.0 / 3.0) * std::f64::consts::PI * (ro.powi(3) - ri.powi(3)))
            .collect();
        let v_inner = r_inner.iter().map(|&r| r / time_explosion).collect();

        Ok(Self {
            r_inner,
            r_outer,
            volume,
            v_inner,
            time_explosion,
        })
    }

    /// Number of shells.
    #[must_use]
    pub fn num_shells(&self) -> usize {
        self.r_inner.len()
    }

    /// Inner radius of shell `s`, cm.
    #[must_use]
    pub fn r_inner(&self, s: usize) -> f64 {
        self.r_inner[s]
    }

    /// Outer radius of shell `s`, cm.
    #[must_use]
    pub fn r_outer(&self, s: usize) -> f64 {
        self.r_outer[s]
    }

    /// Volume of shell `s`, cm³.
    #[must_use]
    pub fn volume(&self, s: usize) -> f64 {
        self.volume[s]
    }

    /// Homologous velocity at the inner boundary of shell `s`, cm/s.
    #[must_use]
    pub fn v_inner(&self, s: usize) -> f64 {
        self.v_inner[s]
    }

    /// Time since explosion, s.
    #[must_use]
    pub const fn time_explosion(&self) -> f64 {
        self.time_explosion
    }

    /// Innermost boundary radius of the whole grid, cm.
    #[must_use]
    pub fn r_inner_boundary(&self) -> f64 {
        self.r_inner[0]
    }

    /// Outermost boundary radius of the whole grid, cm.
    #[must_use]
    pub fn r_outer_boundary(&self) -> f64 {
        self.r_outer[self.r_outer.len() - 1]
    }

    /// Homologous expansion velocity at radius `r`, cm/s.
    #[must_use]
    pub fn velocity_at(&self, r: f64) -> f64 {
        r / self.time_explosion
    }

    /// Distance to the boundary of shell `s` along direction `mu`, and
    /// which boundary (and shell-index delta) the packet would cross.
    ///
    /// The outward intersection distance is always real and positive for
    /// `r <= r_outer`; the inward one only exists when `mu < 0` and the
    /// discriminant is non-negative. Ties within
    /// `BOUNDARY_TIE_EPSILON * r_outer` are broken in favour of the outer
    /// boundary.
    #[must_use]
    pub fn distance_to_boundary(&self, r: f64, mu: f64, s: usize) -> (f64, BoundaryHit) {
        let r_outer = self.r_outer[s];
        let r_inner = self.r_inner[s];

        let d_out = (r_outer.mul_add(r_outer, (mu * mu - 1.0) * r * r)).sqrt() - r * mu;

        if mu < 0.0 {
            let discriminant = r_inner.mul_add(r_inner, (mu * mu - 1.0) * r * r);
            if discriminant >= 0.0 {
                let d_in = -r * mu - discriminant.sqrt();
                if (d_in - d_out).abs() < BOUNDARY_TIE_EPSILON * r_outer {
                    return (d_out, BoundaryHit::Outer);
                }
                return (d_in, BoundaryHit::Inner);
            }
        }

        (d_out, BoundaryHit::Outer)
    }
}
