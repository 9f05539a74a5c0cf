//! Installs host-backed devices behind the guest's standard streams.

use std::io::{self, Read, Write};

use sandbox_vfs::{DeviceId, Fd, FsCore, OpenOptions};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::console::{ConsoleTty, READ_CHUNK_SIZE};
use crate::error::{setup_step, Error, Result};

const STDIN_PATH: &str = "/dev/stdin";
const STDOUT_PATH: &str = "/dev/stdout";
const STDERR_PATH: &str = "/dev/stderr";

/// Where the console devices live and how they talk to the host
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WiringConfig {
    /// Device node shared by stdin and stdout
    pub tty_path: String,
    /// Device node behind stderr
    pub tty_err_path: String,
    /// Units requested from the host per blocking read
    pub read_chunk_size: usize,
}

impl Default for WiringConfig {
    fn default() -> Self {
        Self {
            tty_path: "/dev/hosttty".to_string(),
            tty_err_path: "/dev/hosttty-err".to_string(),
            read_chunk_size: READ_CHUNK_SIZE,
        }
    }
}

/// Host input/output pair one console device is bound to
pub struct HostStream {
    input: Box<dyn Read + Send>,
    output: Box<dyn Write + Send>,
}

impl HostStream {
    pub fn new(input: impl Read + Send + 'static, output: impl Write + Send + 'static) -> Self {
        Self {
            input: Box::new(input),
            output: Box::new(output),
        }
    }
}

/// Host streams for the stdout-class and the stderr-class device
pub struct HostStreams {
    pub stdout: HostStream,
    pub stderr: HostStream,
}

impl HostStreams {
    /// The real console of this process
    pub fn process() -> Self {
        Self {
            stdout: HostStream::new(io::stdin(), io::stdout()),
            stderr: HostStream::new(io::stdin(), io::stderr()),
        }
    }
}

/// Device identities created by [`StreamInstaller::install`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InstalledStreams {
    /// Backs `/dev/stdin` and `/dev/stdout`
    pub tty: DeviceId,
    /// Backs `/dev/stderr`
    pub tty_err: DeviceId,
}

/// Rewires `/dev/stdin`, `/dev/stdout`, `/dev/stderr` and descriptors 0/1/2
/// to console devices backed by host streams.
#[derive(Debug, Default)]
pub struct StreamInstaller {
    config: WiringConfig,
}

impl StreamInstaller {
    pub fn new(config: WiringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WiringConfig {
        &self.config
    }

    /// Must run once, before any guest code. Failures leave the filesystem
    /// half wired and are meant to abort startup.
    pub fn install(&self, fs: &FsCore, host: HostStreams) -> Result<InstalledStreams> {
        let tty = fs.allocate_device_id();
        let tty_err = fs.allocate_device_id();
        debug!("allocated console devices {} and {}", tty, tty_err);

        fs.register_tty(tty, Box::new(self.console(host.stdout)))
            .map_err(setup_step(format!("register device {}", tty)))?;
        fs.register_tty(tty_err, Box::new(self.console(host.stderr)))
            .map_err(setup_step(format!("register device {}", tty_err)))?;

        fs.mkdev(&self.config.tty_path, tty)
            .map_err(setup_step(format!("create {}", self.config.tty_path)))?;
        fs.mkdev(&self.config.tty_err_path, tty_err)
            .map_err(setup_step(format!("create {}", self.config.tty_err_path)))?;

        for path in [STDIN_PATH, STDOUT_PATH, STDERR_PATH] {
            fs.unlink(path)
                .map_err(setup_step(format!("unlink {}", path)))?;
        }

        let links = [
            (&self.config.tty_path, STDIN_PATH),
            (&self.config.tty_path, STDOUT_PATH),
            (&self.config.tty_err_path, STDERR_PATH),
        ];
        for (target, path) in links {
            fs.symlink(target, path)
                .map_err(setup_step(format!("link {} to {}", path, target)))?;
        }

        for fd in [Fd::STDIN, Fd::STDOUT, Fd::STDERR] {
            fs.close_stream(fd)
                .map_err(setup_step(format!("close fd {}", fd)))?;
        }

        let reopen = [
            (Fd::STDIN, STDIN_PATH, OpenOptions::read_only()),
            (Fd::STDOUT, STDOUT_PATH, OpenOptions::write_only()),
            (Fd::STDERR, STDERR_PATH, OpenOptions::write_only()),
        ];
        for (expected, path, opts) in reopen {
            let actual = fs
                .open(path, &opts)
                .map_err(setup_step(format!("open {}", path)))?;
            if actual != expected {
                return Err(Error::DescriptorMismatch { expected, actual });
            }
        }

        info!(
            "Console streams installed: stdin/stdout -> {}, stderr -> {}",
            self.config.tty_path, self.config.tty_err_path
        );
        Ok(InstalledStreams { tty, tty_err })
    }

    fn console(&self, host: HostStream) -> ConsoleTty {
        ConsoleTty::new(host.input, host.output).with_read_chunk_size(self.config.read_chunk_size)
    }
}

/// Install console devices with the default paths
pub fn install(fs: &FsCore, host: HostStreams) -> Result<InstalledStreams> {
    StreamInstaller::default().install(fs, host)
}
