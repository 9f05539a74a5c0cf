//! Host console bridge for sandboxed guests.
//!
//! A sandboxed runtime only sees the standard streams its virtual filesystem
//! gives it. This crate provides [`ConsoleTty`], a TTY driver that forwards a
//! device's reads and writes to real host streams, and [`StreamInstaller`],
//! which puts two such devices behind `/dev/stdin`, `/dev/stdout`,
//! `/dev/stderr` and descriptors 0/1/2.

pub mod console;
pub mod error;
pub mod wiring;

pub use console::{ConsoleTty, READ_CHUNK_SIZE};
pub use error::{Error, Result};
pub use wiring::{install, HostStream, HostStreams, InstalledStreams, StreamInstaller, WiringConfig};
