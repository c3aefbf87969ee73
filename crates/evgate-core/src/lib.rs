//! # evgate Core Library
//!
//! The protocol engine of a GB/T 32960 telematics gateway: terminates TCP
//! connections from electric-vehicle on-board terminals, decodes their
//! telemetry for both the 2016 and 2025 protocol revisions, authenticates
//! platforms, tracks per-vehicle sessions, and fans decoded records out to a
//! downstream data sink.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────┐
//! │                  server (TCP)                  │
//! ├────────────────────────────────────────────────┤
//! │  handler   │   session    │   auth   │ dispatch│
//! ├────────────────────────────────────────────────┤
//! │           protocol (framer / codec)            │
//! └────────────────────────────────────────────────┘
//! ```
//!
//! Bytes flow from the server's per-connection buffer through the framer and
//! codec into the handler; decoded realtime records flow through the
//! dispatcher into a [`sink::DataSink`].
//!
//! ## Protocol revisions
//!
//! The 2016 and 2025 revisions share the envelope layout but disagree on the
//! meaning of realtime info-types 0x06–0x09. The revision is signalled by the
//! start marker (`##` vs `$$`) and carried on every decoded packet; decoding
//! of the overlapping info-types dispatches on it.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]
#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod auth;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod server;
pub mod session;
pub mod sink;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default cap on a single frame (header + payload + checksum), in bytes.
///
/// A declared payload length that would push a frame past this limit is
/// treated as framing noise rather than a real packet.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 65535;

/// Default bound on the dispatcher queue, in records.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
