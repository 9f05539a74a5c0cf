//! Sandbox VFS — in-memory filesystem for sandboxed runtimes
//!
//! This crate provides the node tree, symlinks, the device table and the
//! descriptor table a sandboxed guest sees, together with the generic
//! character-device dispatch layer that device drivers plug into.

pub mod config;
pub mod device;
pub mod error;
pub mod types;
pub mod vfs;

// Re-export key types for convenience
pub use config::{FsConfig, FsLimits};
pub use device::{CharDevice, LogStream, LogTty, NullDevice, TtyDevice, TtyInput, TtyOps};
pub use error::{FsError, FsResult};
pub use types::*;
pub use vfs::FsCore;
