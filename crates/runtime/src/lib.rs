//! Anchors Runtime - server discovery, launch, and connection lifecycle
//!
//! The anchors analysis server is a Java program reached over a local TCP
//! socket. This crate connects to a running server or starts one:
//!
//! - **Runtime location**: finding and version-checking `java`
//! - **Artifact resolution**: finding the server jar, downloading it into a cache when missing
//! - **Process launch**: spawning the server detached, with per-user log files
//! - **Connection management**: probe, launch, reconnect
//! - **Control channel**: the one-line JSON quit message
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────┐
//! │ ConnectionManager │  probe → launch → reconnect
//! └─────────┬─────────┘
//!           │ on demand, in order
//!   ┌───────┼──────────────┬────────────────┐
//!   ▼       ▼              ▼                ▼
//! RuntimeLocator  ArtifactResolver  ProcessLauncher  ProcessRegistry
//!
//! SessionHandle ──borrowed by──► ControlChannel  ({"quit":1}\n)
//! ```
//!
//! The manager reaches its collaborators through the [`RuntimeProvider`],
//! [`ArtifactSource`] and [`Launcher`] traits, so each can be replaced.

pub mod artifact;
pub mod config;
pub mod connection;
pub mod error;
pub mod launcher;
pub mod locator;
pub mod registry;
pub mod session;

pub use artifact::{ArtifactLocation, ArtifactResolver, ArtifactSource, Downloader, HttpDownloader};
pub use config::{ConnectTimeouts, RuntimeConfig};
pub use connection::{ConnectRequest, ConnectionManager, DEFAULT_PORT, is_loopback};
pub use error::{Error, Result};
pub use launcher::{LaunchOptions, LaunchSpec, Launcher, LogFiles, ProcessLauncher, ProcessRecord};
pub use locator::{JavaRuntime, RuntimeLocator, RuntimeProvider, check_version};
pub use registry::ProcessRegistry;
pub use session::{ControlChannel, SessionHandle, shutdown};
