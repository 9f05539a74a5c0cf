//! Device operations bridging a guest TTY to the host console.

use std::collections::VecDeque;
use std::io::{self, Read, Write};

use sandbox_vfs::{TtyInput, TtyOps};
use tracing::warn;

/// Units requested from the host per blocking read
pub const READ_CHUNK_SIZE: usize = 256;

const LINE_FEED: u8 = b'\n';

/// TTY driver bound to one host input and one host output stream.
///
/// Input is pulled from the host in blocking chunks and handed out one unit
/// at a time. Output is line buffered: it reaches the host on a line feed, on
/// the EOF marker, or on an explicit [`TtyOps::flush`].
pub struct ConsoleTty {
    input: Box<dyn Read + Send>,
    output: Box<dyn Write + Send>,
    read_chunk_size: usize,
    pending_input: VecDeque<u8>,
    pending_output: Vec<u8>,
}

impl ConsoleTty {
    pub fn new(input: Box<dyn Read + Send>, output: Box<dyn Write + Send>) -> Self {
        Self {
            input,
            output,
            read_chunk_size: READ_CHUNK_SIZE,
            pending_input: VecDeque::new(),
            pending_output: Vec::new(),
        }
    }

    pub fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }

    /// Output accepted from the guest but not yet written to the host
    pub fn buffered_output(&self) -> &[u8] {
        &self.pending_output
    }

    /// Number of input units read from the host but not yet consumed
    pub fn buffered_input(&self) -> usize {
        self.pending_input.len()
    }

    /// Block until the host delivers input. Returns the number of units staged.
    fn fill_input(&mut self) -> io::Result<usize> {
        let mut chunk = vec![0u8; self.read_chunk_size];
        let count = loop {
            match self.input.read(&mut chunk) {
                Ok(count) => break count,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };
        // An empty read is EOF and must leave the staging buffer alone.
        self.pending_input.extend(&chunk[..count]);
        Ok(count)
    }

    /// Write the whole staging buffer to the host in one call.
    fn write_pending(&mut self) -> io::Result<()> {
        if self.pending_output.is_empty() {
            return Ok(());
        }
        let data = std::mem::take(&mut self.pending_output);
        self.output.write_all(&data)?;
        self.output.flush()
    }
}

impl TtyOps for ConsoleTty {
    fn get_char(&mut self) -> io::Result<TtyInput> {
        if self.pending_input.is_empty() && self.fill_input()? == 0 {
            return Ok(TtyInput::Eof);
        }
        Ok(self
            .pending_input
            .pop_front()
            .map_or(TtyInput::Eof, TtyInput::Byte))
    }

    fn put_char(&mut self, value: Option<u8>) {
        if let Some(b) = value {
            self.pending_output.push(b);
        }
        if matches!(value, None | Some(LINE_FEED)) {
            if let Err(e) = self.write_pending() {
                warn!("Dropped console output: {}", e);
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.write_pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Host output double recording every `write` call.
    #[derive(Clone, Default)]
    struct RecordingWriter {
        writes: Arc<Mutex<Vec<Vec<u8>>>>,
        broken: Arc<Mutex<bool>>,
    }

    impl Write for RecordingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if *self.broken.lock().unwrap() {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"));
            }
            self.writes.lock().unwrap().push(buf.to_vec());
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Host input double serving one scripted result per `read` call.
    #[derive(Clone, Default)]
    struct ScriptedReader {
        script: Arc<Mutex<VecDeque<io::Result<Vec<u8>>>>>,
        requests: Arc<Mutex<Vec<usize>>>,
    }

    impl ScriptedReader {
        fn with(chunks: Vec<io::Result<Vec<u8>>>) -> Self {
            let reader = Self::default();
            reader.script.lock().unwrap().extend(chunks);
            reader
        }

        fn reads(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl Read for ScriptedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.requests.lock().unwrap().push(buf.len());
            match self.script.lock().unwrap().pop_front() {
                Some(Ok(chunk)) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    Ok(n)
                }
                Some(Err(e)) => Err(e),
                None => Ok(0),
            }
        }
    }

    fn console(reader: &ScriptedReader, writer: &RecordingWriter) -> ConsoleTty {
        ConsoleTty::new(Box::new(reader.clone()), Box::new(writer.clone()))
    }

    #[test]
    fn test_output_accumulates_until_line_feed() {
        let writer = RecordingWriter::default();
        let mut tty = console(&ScriptedReader::default(), &writer);

        for &b in b"partial output" {
            tty.put_char(Some(b));
        }

        assert_eq!(tty.buffered_output(), b"partial output");
        assert!(writer.writes.lock().unwrap().is_empty());
    }

    #[test]
    fn test_line_feed_flushes_in_one_write() {
        let writer = RecordingWriter::default();
        let mut tty = console(&ScriptedReader::default(), &writer);

        for b in [72, 105, 10] {
            tty.put_char(Some(b));
        }

        assert_eq!(*writer.writes.lock().unwrap(), vec![b"Hi\n".to_vec()]);
        assert!(tty.buffered_output().is_empty());
    }

    #[test]
    fn test_eof_marker_flushes_without_appending() {
        let writer = RecordingWriter::default();
        let mut tty = console(&ScriptedReader::default(), &writer);

        tty.put_char(None);
        assert!(writer.writes.lock().unwrap().is_empty());

        tty.put_char(Some(b'o'));
        tty.put_char(Some(b'k'));
        tty.put_char(None);
        assert_eq!(*writer.writes.lock().unwrap(), vec![b"ok".to_vec()]);
        assert!(tty.buffered_output().is_empty());
    }

    #[test]
    fn test_explicit_flush() {
        let writer = RecordingWriter::default();
        let mut tty = console(&ScriptedReader::default(), &writer);

        tty.flush().unwrap();
        assert!(writer.writes.lock().unwrap().is_empty());

        tty.put_char(Some(b'>'));
        tty.put_char(Some(b' '));
        tty.flush().unwrap();
        assert_eq!(*writer.writes.lock().unwrap(), vec![b"> ".to_vec()]);
        assert!(tty.buffered_output().is_empty());
    }

    #[test]
    fn test_explicit_flush_reports_host_errors() {
        let writer = RecordingWriter::default();
        let mut tty = console(&ScriptedReader::default(), &writer);
        *writer.broken.lock().unwrap() = true;

        tty.put_char(Some(b'x'));
        assert_eq!(tty.flush().unwrap_err().kind(), io::ErrorKind::BrokenPipe);
        assert!(tty.buffered_output().is_empty());
    }

    #[test]
    fn test_failed_line_flush_is_not_fatal() {
        let reader = ScriptedReader::with(vec![Ok(b"y".to_vec())]);
        let writer = RecordingWriter::default();
        let mut tty = console(&reader, &writer);

        *writer.broken.lock().unwrap() = true;
        tty.put_char(Some(b'a'));
        tty.put_char(Some(b'\n'));
        assert!(tty.buffered_output().is_empty());

        *writer.broken.lock().unwrap() = false;
        tty.put_char(Some(b'b'));
        tty.put_char(Some(b'\n'));
        assert_eq!(*writer.writes.lock().unwrap(), vec![b"b\n".to_vec()]);
        assert_eq!(tty.get_char().unwrap(), TtyInput::Byte(b'y'));
    }

    #[test]
    fn test_input_is_served_in_order_from_one_read() {
        let reader = ScriptedReader::with(vec![Ok(vec![97, 98, 99])]);
        let mut tty = console(&reader, &RecordingWriter::default());

        assert_eq!(tty.get_char().unwrap(), TtyInput::Byte(97));
        assert_eq!(tty.buffered_input(), 2);
        assert_eq!(tty.get_char().unwrap(), TtyInput::Byte(98));
        assert_eq!(tty.get_char().unwrap(), TtyInput::Byte(99));
        assert_eq!(reader.reads(), 1);

        // The buffer is drained, so the next call goes back to the host.
        tty.get_char().unwrap();
        assert_eq!(reader.reads(), 2);
    }

    #[test]
    fn test_reads_request_fixed_chunks() {
        let reader = ScriptedReader::with(vec![Ok(b"z".to_vec())]);
        let mut tty = console(&reader, &RecordingWriter::default());
        tty.get_char().unwrap();
        assert_eq!(*reader.requests.lock().unwrap(), vec![READ_CHUNK_SIZE]);

        let reader = ScriptedReader::with(vec![Ok(b"abc".to_vec()), Ok(b"d".to_vec())]);
        let mut tty = console(&reader, &RecordingWriter::default()).with_read_chunk_size(2);
        let mut got = Vec::new();
        while let TtyInput::Byte(b) = tty.get_char().unwrap() {
            got.push(b);
        }
        // The scripted reader truncates to the requested size.
        assert_eq!(got, b"abd");
    }

    #[test]
    fn test_eof_is_detected_per_call() {
        let reader = ScriptedReader::with(vec![Ok(Vec::new()), Ok(Vec::new()), Ok(b"late".to_vec())]);
        let mut tty = console(&reader, &RecordingWriter::default());

        assert_eq!(tty.get_char().unwrap(), TtyInput::Eof);
        assert_eq!(tty.buffered_input(), 0);
        assert_eq!(tty.get_char().unwrap(), TtyInput::Eof);
        assert_eq!(reader.reads(), 2);

        // EOF is not cached: input arriving later is still delivered.
        assert_eq!(tty.get_char().unwrap(), TtyInput::Byte(b'l'));
        assert_eq!(reader.reads(), 3);
    }

    #[test]
    fn test_interrupted_read_is_retried() {
        let reader = ScriptedReader::with(vec![
            Err(io::Error::new(io::ErrorKind::Interrupted, "signal")),
            Ok(b"q".to_vec()),
        ]);
        let mut tty = console(&reader, &RecordingWriter::default());

        assert_eq!(tty.get_char().unwrap(), TtyInput::Byte(b'q'));
        assert_eq!(reader.reads(), 2);
    }

    #[test]
    fn test_read_error_propagates() {
        let reader = ScriptedReader::with(vec![Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "denied",
        ))]);
        let mut tty = console(&reader, &RecordingWriter::default());

        let err = tty.get_char().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert_eq!(tty.buffered_input(), 0);
    }

    #[test]
    fn test_never_reports_pending() {
        let reader = ScriptedReader::with(vec![Ok(b"ab".to_vec())]);
        let mut tty = console(&reader, &RecordingWriter::default());
        for _ in 0..4 {
            assert_ne!(tty.get_char().unwrap(), TtyInput::Pending);
        }
    }
}
