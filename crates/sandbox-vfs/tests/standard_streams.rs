use std::io;
use std::sync::{Arc, Mutex};

use sandbox_vfs::{DeviceId, Fd, FileKind, FsConfig, FsCore, FsError, OpenOptions, TtyInput, TtyOps};

/// Driver that serves a fixed input and records what was written and flushed.
struct LoopbackTty {
    input: Vec<u8>,
    written: Arc<Mutex<Vec<u8>>>,
    flushes: Arc<Mutex<usize>>,
}

impl TtyOps for LoopbackTty {
    fn get_char(&mut self) -> io::Result<TtyInput> {
        if self.input.is_empty() {
            Ok(TtyInput::Eof)
        } else {
            Ok(TtyInput::Byte(self.input.remove(0)))
        }
    }

    fn put_char(&mut self, value: Option<u8>) {
        if let Some(b) = value {
            self.written.lock().unwrap().push(b);
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        *self.flushes.lock().unwrap() += 1;
        Ok(())
    }
}

#[test]
fn test_rewire_standard_streams_by_hand() {
    let fs = FsCore::new(FsConfig::default()).unwrap();
    let written = Arc::new(Mutex::new(Vec::new()));
    let flushes = Arc::new(Mutex::new(0));

    let dev = fs.allocate_device_id();
    fs.register_tty(
        dev,
        Box::new(LoopbackTty {
            input: b"line one\nline two\n".to_vec(),
            written: written.clone(),
            flushes: flushes.clone(),
        }),
    )
    .unwrap();
    fs.mkdev("/dev/loop", dev).unwrap();
    fs.unlink("/dev/stdin").unwrap();
    fs.unlink("/dev/stdout").unwrap();
    fs.symlink("/dev/loop", "/dev/stdin").unwrap();
    fs.symlink("/dev/loop", "/dev/stdout").unwrap();

    fs.close_stream(Fd::STDIN).unwrap();
    fs.close_stream(Fd::STDOUT).unwrap();
    assert_eq!(fs.open("/dev/stdin", &OpenOptions::read_only()).unwrap(), Fd::STDIN);
    assert_eq!(fs.open("/dev/stdout", &OpenOptions::write_only()).unwrap(), Fd::STDOUT);

    let mut buf = [0u8; 64];
    let n = fs.read(Fd::STDIN, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"line one\n");
    fs.write(Fd::STDOUT, &buf[..n]).unwrap();
    let n = fs.read(Fd::STDIN, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"line two\n");
    assert_eq!(fs.read(Fd::STDIN, &mut buf).unwrap(), 0);

    fs.fsync(Fd::STDOUT).unwrap();
    assert_eq!(*written.lock().unwrap(), b"line one\n");
    assert_eq!(*flushes.lock().unwrap(), 1);

    // stderr still goes to the default tty1
    assert_eq!(fs.stream_device(Fd::STDERR).unwrap(), Some(DeviceId::TTY1));
}

#[test]
fn test_close_flushes_device() {
    let fs = FsCore::new(FsConfig::default()).unwrap();
    let flushes = Arc::new(Mutex::new(0));
    let dev = fs.allocate_device_id();
    fs.register_tty(
        dev,
        Box::new(LoopbackTty {
            input: Vec::new(),
            written: Arc::new(Mutex::new(Vec::new())),
            flushes: flushes.clone(),
        }),
    )
    .unwrap();
    fs.mkdev("/dev/flushme", dev).unwrap();

    let fd = fs.open("/dev/flushme", &OpenOptions::write_only()).unwrap();
    fs.close_stream(fd).unwrap();
    assert_eq!(*flushes.lock().unwrap(), 1);
    assert!(!fs.is_open(fd));
}

#[test]
fn test_dev_listing() {
    let fs = FsCore::new(FsConfig::default()).unwrap();
    let entries = fs.readdir("/dev").unwrap();
    let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["null", "shm", "stderr", "stdin", "stdout", "tty", "tty1"]
    );

    let null = entries.iter().find(|e| e.name == "null").unwrap();
    assert_eq!(null.kind, FileKind::CharDevice(DeviceId::NULL));
    let stdout = entries.iter().find(|e| e.name == "stdout").unwrap();
    assert_eq!(stdout.kind, FileKind::Symlink);
}

#[test]
fn test_write_to_stdin_descriptor_is_rejected() {
    let fs = FsCore::new(FsConfig::default()).unwrap();
    assert!(matches!(fs.write(Fd::STDIN, b"x"), Err(FsError::BadDescriptor)));
    let mut buf = [0u8; 1];
    assert!(matches!(fs.read(Fd::STDOUT, &mut buf), Err(FsError::BadDescriptor)));
}
