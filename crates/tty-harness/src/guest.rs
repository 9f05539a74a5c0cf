//! Guest programs the launcher can run inside the sandbox.

use anyhow::{Context, Result};
use sandbox_vfs::{Fd, FsCore, FsResult};
use tracing::debug;

/// Manifest the guest leaves in its working directory
pub const REQUIREMENTS_FILE: &str = "requirements.txt";

/// A program running inside the sandbox. It only reaches the outside world
/// through the sandbox filesystem, in particular descriptors 0/1/2.
pub trait Guest {
    /// Install the given requirement specifiers into the sandbox
    fn install_packages(&mut self, fs: &FsCore, requirements: &[String]) -> Result<()>;

    /// Run the test entry point with forwarded arguments; returns the exit code
    fn run(&mut self, fs: &FsCore, args: &[String]) -> Result<i32>;
}

/// Write all of `data` to a guest descriptor
pub fn write_all(fs: &FsCore, fd: Fd, mut data: &[u8]) -> FsResult<()> {
    while !data.is_empty() {
        let written = fs.write(fd, data)?;
        if written == 0 {
            break;
        }
        data = &data[written..];
    }
    Ok(())
}

/// Built-in guest: records the requirement manifest, prints the forwarded
/// arguments and optionally copies stdin to stdout until EOF.
#[derive(Debug, Default)]
pub struct EchoGuest {
    echo_stdin: bool,
}

impl EchoGuest {
    pub fn new(echo_stdin: bool) -> Self {
        Self { echo_stdin }
    }

    fn copy_stdin(&self, fs: &FsCore) -> Result<()> {
        let mut buf = [0u8; 4096];
        loop {
            let n = fs.read(Fd::STDIN, &mut buf).context("reading guest stdin")?;
            if n == 0 {
                return Ok(());
            }
            write_all(fs, Fd::STDOUT, &buf[..n]).context("writing guest stdout")?;
        }
    }
}

impl Guest for EchoGuest {
    fn install_packages(&mut self, fs: &FsCore, requirements: &[String]) -> Result<()> {
        let mut manifest = requirements.join("\n");
        manifest.push('\n');
        fs.write_file(REQUIREMENTS_FILE, manifest.as_bytes())
            .with_context(|| format!("writing {}", REQUIREMENTS_FILE))?;
        debug!(
            "staged {} requirements in {}/{}",
            requirements.len(),
            fs.cwd(),
            REQUIREMENTS_FILE
        );
        Ok(())
    }

    fn run(&mut self, fs: &FsCore, args: &[String]) -> Result<i32> {
        let line = format!("args: {}\n", args.join(" "));
        write_all(fs, Fd::STDOUT, line.as_bytes()).context("writing guest stdout")?;
        if self.echo_stdin {
            self.copy_stdin(fs)?;
        }
        Ok(0)
    }
}
