#![warn(clippy::all, clippy::cargo, clippy::nursery, clippy::pedantic)]
#![warn(missing_docs)]

//! Monte Carlo radiative-transfer core for one-dimensional, spherically
//! symmetric, homologously expanding supernova ejecta.
//!
//! This crate owns the per-packet transport state machine, its parallel
//! driver, and the shared data structures that feed it: shell geometry,
//! per-shell opacity tables, radiation-field estimators, the virtual-packet
//! mechanism, and the packet source. Atomic-data ingestion, plasma-state
//! iteration, configuration-file parsing, and spectrum post-processing
//! beyond the histogram step in [`spectrum`] are the responsibility of a
//! calling application.

pub mod config;
pub mod constants;
pub mod driver;
pub mod error;
pub mod estimators;
pub mod frame;
pub mod geometry;
pub mod opacity;
pub mod packet;
pub mod rng;
pub mod source;
pub mod spectrum;
pub mod transport;
pub mod vpacket;

pub use config::TransportConfig;
pub use driver::{PacketFaultCounts, RunResult, TransportDriver};
pub use error::{Error, PacketFault, Result};
pub use estimators::Estimators;
pub use geometry::Geometry;
pub use opacity::OpacityState;
pub use source::SourceParams;
pub use spectrum::Spectrum;
