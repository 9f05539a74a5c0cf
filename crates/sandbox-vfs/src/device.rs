//! Character-device dispatch.
//!
//! Device drivers plug into the filesystem through [`CharDevice`]. Terminal
//! style devices implement the narrower [`TtyOps`] contract instead and are
//! wrapped in a [`TtyDevice`], which provides the line discipline shared by
//! every TTY-class device.

use std::io;

use tracing::{info, warn};

use crate::error::{FsError, FsResult};

const LINE_FEED: u8 = b'\n';

/// Result of asking a TTY for its next input unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TtyInput {
    /// The next unit of input
    Byte(u8),
    /// No data available right now; only non-blocking drivers produce this
    Pending,
    /// The input source is exhausted
    Eof,
}

/// Operations a TTY-class device driver provides to the dispatch layer.
pub trait TtyOps: Send {
    /// Produce the next input unit, blocking if the driver is blocking.
    fn get_char(&mut self) -> io::Result<TtyInput>;

    /// Consume one output unit. `None` is the EOF marker and forces a flush.
    fn put_char(&mut self, value: Option<u8>);

    /// Push any buffered output to wherever the driver sends it.
    fn flush(&mut self) -> io::Result<()>;
}

/// Stream-level operations of a character device node.
pub trait CharDevice: Send {
    fn read(&mut self, buf: &mut [u8]) -> FsResult<usize>;
    fn write(&mut self, data: &[u8]) -> FsResult<usize>;

    fn flush(&mut self) -> FsResult<()> {
        Ok(())
    }
}

/// Adapts a [`TtyOps`] driver to the stream interface.
pub struct TtyDevice {
    ops: Box<dyn TtyOps>,
}

impl TtyDevice {
    pub fn new(ops: Box<dyn TtyOps>) -> Self {
        Self { ops }
    }
}

impl CharDevice for TtyDevice {
    fn read(&mut self, buf: &mut [u8]) -> FsResult<usize> {
        let mut bytes_read = 0;
        while bytes_read < buf.len() {
            match self.ops.get_char() {
                Ok(TtyInput::Byte(b)) => {
                    buf[bytes_read] = b;
                    bytes_read += 1;
                    // Canonical mode: a completed line ends the read.
                    if b == LINE_FEED {
                        break;
                    }
                }
                Ok(TtyInput::Pending) if bytes_read == 0 => return Err(FsError::WouldBlock),
                Ok(TtyInput::Pending) | Ok(TtyInput::Eof) => break,
                Err(e) if bytes_read == 0 => return Err(FsError::Io(e)),
                Err(e) => {
                    warn!("tty read stopped after {} bytes: {}", bytes_read, e);
                    break;
                }
            }
        }
        Ok(bytes_read)
    }

    fn write(&mut self, data: &[u8]) -> FsResult<usize> {
        for &b in data {
            self.ops.put_char(Some(b));
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> FsResult<()> {
        self.ops.flush()?;
        Ok(())
    }
}

/// `/dev/null`
#[derive(Debug, Default)]
pub struct NullDevice;

impl CharDevice for NullDevice {
    fn read(&mut self, _buf: &mut [u8]) -> FsResult<usize> {
        Ok(0)
    }

    fn write(&mut self, data: &[u8]) -> FsResult<usize> {
        Ok(data.len())
    }
}

/// Which log level a [`LogTty`] emits completed lines at
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogStream {
    Out,
    Err,
}

/// Default backing of `/dev/tty` and `/dev/tty1` before a host console is
/// wired in: input is always at EOF and each completed output line becomes a
/// tracing event.
#[derive(Debug)]
pub struct LogTty {
    stream: LogStream,
    output: Vec<u8>,
}

impl LogTty {
    pub fn new(stream: LogStream) -> Self {
        Self {
            stream,
            output: Vec::new(),
        }
    }

    fn emit(&mut self) {
        if self.output.is_empty() {
            return;
        }
        let line = std::mem::take(&mut self.output);
        let text = String::from_utf8_lossy(&line);
        match self.stream {
            LogStream::Out => info!(target: "sandbox_vfs::console", "{}", text),
            LogStream::Err => warn!(target: "sandbox_vfs::console", "{}", text),
        }
    }
}

impl TtyOps for LogTty {
    fn get_char(&mut self) -> io::Result<TtyInput> {
        Ok(TtyInput::Eof)
    }

    fn put_char(&mut self, value: Option<u8>) {
        match value {
            Some(LINE_FEED) | None => self.emit(),
            Some(b) => self.output.push(b),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.emit();
        Ok(())
    }
}
