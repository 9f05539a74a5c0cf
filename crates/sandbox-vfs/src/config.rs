//! Configuration types for the sandbox filesystem

use serde::{Deserialize, Serialize};

/// System limits
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FsLimits {
    pub max_open_descriptors: u32,
    pub max_symlink_depth: u32,
}

impl Default for FsLimits {
    fn default() -> Self {
        Self {
            max_open_descriptors: 1024,
            max_symlink_depth: 40,
        }
    }
}

/// Main filesystem configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FsConfig {
    pub limits: FsLimits,
    /// First major number handed out by `FsCore::allocate_device_id`
    pub first_dynamic_major: u32,
    /// Create `/dev/tty`, `/dev/stdin` & co. and open descriptors 0/1/2 at startup
    pub standard_streams: bool,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            limits: FsLimits::default(),
            first_dynamic_major: 64,
            standard_streams: true,
        }
    }
}
