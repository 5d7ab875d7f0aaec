//! Wire types for the anchors server.
//!
//! This crate holds the shapes of data exchanged with the analysis server,
//! without any I/O:
//!
//! - [`ControlMessage`] - the line-oriented JSON control protocol (client to server)
//! - [`Hyperparameters`] - algorithm settings passed verbatim on the launch command line
//!
//! Higher-level lifecycle management lives in `anchors-runtime`.

pub mod control;
pub mod params;

pub use control::*;
pub use params::*;
