//! Virtual filesystem implementation for the sandbox

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::device::{CharDevice, LogStream, LogTty, NullDevice, TtyDevice, TtyOps};
use crate::error::{FsError, FsResult};
use crate::{Attributes, DeviceId, DirEntry, Fd, FileKind, FsConfig, OpenOptions};

/// Internal node ID for filesystem nodes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(u64);

/// Filesystem node types
#[derive(Clone, Debug)]
pub(crate) enum NodeKind {
    File { data: Vec<u8> },
    Directory { children: BTreeMap<String, NodeId> },
    Symlink { target: String },
    CharDevice { dev: DeviceId },
}

/// Filesystem node
#[derive(Clone, Debug)]
pub(crate) struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub mode: u32,
    pub mtime: i64,
    /// Cleared by `unlink`; the node lives on until its last descriptor closes.
    pub linked: bool,
}

/// Entry of the descriptor table
#[derive(Debug)]
pub(crate) struct OpenFile {
    pub node_id: NodeId,
    pub path: String,
    pub options: OpenOptions,
    pub position: u64,
}

/// Outcome of walking a path
struct Resolved {
    node_id: NodeId,
    /// Parent directory and the name the node is linked under
    parent: Option<(NodeId, String)>,
    /// Canonical absolute path of the node
    path: String,
}

type SharedDevice = Arc<Mutex<Box<dyn CharDevice>>>;

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The sandbox filesystem: node tree, device table and descriptor table.
pub struct FsCore {
    config: FsConfig,
    root_id: NodeId,
    nodes: Mutex<HashMap<NodeId, Node>>,
    devices: Mutex<HashMap<DeviceId, SharedDevice>>,
    streams: Mutex<BTreeMap<Fd, OpenFile>>,
    cwd: Mutex<String>,
    next_node_id: Mutex<u64>,
    next_major: Mutex<u32>,
}

impl FsCore {
    pub fn new(config: FsConfig) -> FsResult<Self> {
        let root_id = NodeId(1);
        let root = Node {
            id: root_id,
            kind: NodeKind::Directory {
                children: BTreeMap::new(),
            },
            mode: 0o755,
            mtime: Self::current_timestamp(),
            linked: true,
        };

        let core = Self {
            next_major: Mutex::new(config.first_dynamic_major),
            config,
            root_id,
            nodes: Mutex::new(HashMap::from([(root_id, root)])),
            devices: Mutex::new(HashMap::new()),
            streams: Mutex::new(BTreeMap::new()),
            cwd: Mutex::new("/".to_string()),
            next_node_id: Mutex::new(2),
        };

        if core.config.standard_streams {
            core.create_default_layout()?;
        }
        Ok(core)
    }

    /// Directories, default devices and descriptors 0/1/2 every sandbox starts with.
    fn create_default_layout(&self) -> FsResult<()> {
        for dir in ["/dev", "/dev/shm", "/tmp", "/home"] {
            self.mkdir(dir, 0o777)?;
        }

        self.register_device(DeviceId::NULL, Box::new(NullDevice))?;
        self.mkdev("/dev/null", DeviceId::NULL)?;
        self.register_tty(DeviceId::TTY, Box::new(LogTty::new(LogStream::Out)))?;
        self.mkdev("/dev/tty", DeviceId::TTY)?;
        self.register_tty(DeviceId::TTY1, Box::new(LogTty::new(LogStream::Err)))?;
        self.mkdev("/dev/tty1", DeviceId::TTY1)?;

        self.symlink("/dev/tty", "/dev/stdin")?;
        self.symlink("/dev/tty", "/dev/stdout")?;
        self.symlink("/dev/tty1", "/dev/stderr")?;

        self.open("/dev/stdin", &OpenOptions::read_only())?;
        self.open("/dev/stdout", &OpenOptions::write_only())?;
        self.open("/dev/stderr", &OpenOptions::write_only())?;
        Ok(())
    }

    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    fn allocate_node_id(&self) -> NodeId {
        let mut next_id = lock(&self.next_node_id);
        let id = NodeId(*next_id);
        *next_id += 1;
        id
    }

    fn current_timestamp() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }

    /// Split a path into components, anchored at the root or the current directory.
    fn path_components(&self, path: &Path) -> FsResult<VecDeque<String>> {
        let path = path.to_str().ok_or(FsError::InvalidName)?;
        if path.is_empty() {
            return Err(FsError::NotFound);
        }

        let mut components = VecDeque::new();
        if !path.starts_with('/') {
            let cwd = lock(&self.cwd);
            components.extend(Self::split(&cwd));
        }
        components.extend(Self::split(path));
        Ok(components)
    }

    fn split(path: &str) -> impl Iterator<Item = String> + '_ {
        path.split('/')
            .filter(|c| !c.is_empty() && *c != ".")
            .map(str::to_string)
    }

    /// Resolve a path to a node, expanding symlinks along the way. The last
    /// component is only followed when `follow_last` is set.
    fn resolve(
        &self,
        nodes: &HashMap<NodeId, Node>,
        path: &Path,
        follow_last: bool,
    ) -> FsResult<Resolved> {
        let mut pending = self.path_components(path)?;
        let mut trail: Vec<(NodeId, String)> = Vec::new();
        let mut links_followed = 0;

        while let Some(component) = pending.pop_front() {
            if component == ".." {
                trail.pop();
                continue;
            }

            let current_id = trail.last().map(|(id, _)| *id).unwrap_or(self.root_id);
            let current = nodes.get(&current_id).ok_or(FsError::NotFound)?;
            let child_id = match &current.kind {
                NodeKind::Directory { children } => {
                    *children.get(&component).ok_or(FsError::NotFound)?
                }
                _ => return Err(FsError::NotADirectory),
            };
            let child = nodes.get(&child_id).ok_or(FsError::NotFound)?;

            if let NodeKind::Symlink { target } = &child.kind {
                if follow_last || !pending.is_empty() {
                    links_followed += 1;
                    if links_followed > self.config.limits.max_symlink_depth {
                        return Err(FsError::TooManyLinks);
                    }
                    if target.starts_with('/') {
                        trail.clear();
                    }
                    for part in Self::split(target).collect::<Vec<_>>().into_iter().rev() {
                        pending.push_front(part);
                    }
                    continue;
                }
            }

            trail.push((child_id, component));
        }

        let node_id = trail.last().map(|(id, _)| *id).unwrap_or(self.root_id);
        let parent = trail.last().map(|(_, name)| {
            let parent_id = trail
                .len()
                .checked_sub(2)
                .map(|i| trail[i].0)
                .unwrap_or(self.root_id);
            (parent_id, name.clone())
        });
        let path = format!(
            "/{}",
            trail
                .iter()
                .map(|(_, name)| name.as_str())
                .collect::<Vec<_>>()
                .join("/")
        );

        Ok(Resolved {
            node_id,
            parent,
            path,
        })
    }

    /// Resolve the directory a new entry at `path` would be linked into.
    fn resolve_parent(
        &self,
        nodes: &HashMap<NodeId, Node>,
        path: &Path,
    ) -> FsResult<(NodeId, String)> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or(FsError::InvalidName)?;
        let parent_path = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            Some(_) => Path::new("."),
            None => return Err(FsError::InvalidArgument),
        };

        let parent = self.resolve(nodes, parent_path, true)?;
        match nodes.get(&parent.node_id).map(|n| &n.kind) {
            Some(NodeKind::Directory { children }) => {
                if children.contains_key(name) {
                    return Err(FsError::AlreadyExists);
                }
            }
            Some(_) => return Err(FsError::NotADirectory),
            None => return Err(FsError::NotFound),
        }
        Ok((parent.node_id, name.to_string()))
    }

    /// Create a node of the given kind at `path`
    fn create_node(&self, path: &Path, kind: NodeKind, mode: u32) -> FsResult<NodeId> {
        let mut nodes = lock(&self.nodes);
        let (parent_id, name) = self.resolve_parent(&nodes, path)?;

        let node_id = self.allocate_node_id();
        let node = Node {
            id: node_id,
            kind,
            mode,
            mtime: Self::current_timestamp(),
            linked: true,
        };
        nodes.insert(node_id, node);

        if let Some(Node {
            kind: NodeKind::Directory { children },
            ..
        }) = nodes.get_mut(&parent_id)
        {
            children.insert(name, node_id);
        }
        Ok(node_id)
    }

    fn node_attributes(node: &Node) -> Attributes {
        let (kind, len) = match &node.kind {
            NodeKind::File { data } => (FileKind::File, data.len() as u64),
            NodeKind::Directory { .. } => (FileKind::Directory, 0),
            NodeKind::Symlink { target } => (FileKind::Symlink, target.len() as u64),
            NodeKind::CharDevice { dev } => (FileKind::CharDevice(*dev), 0),
        };
        Attributes {
            ino: node.id.0,
            kind,
            len,
            mode: node.mode,
            mtime: node.mtime,
        }
    }

    // Device table

    /// Allocate a fresh device identity. Major numbers grow monotonically.
    pub fn allocate_device_id(&self) -> DeviceId {
        let mut next_major = lock(&self.next_major);
        let dev = DeviceId::new(*next_major, 0);
        *next_major += 1;
        dev
    }

    pub fn register_device(&self, dev: DeviceId, device: Box<dyn CharDevice>) -> FsResult<()> {
        let mut devices = lock(&self.devices);
        if devices.contains_key(&dev) {
            return Err(FsError::AlreadyExists);
        }
        devices.insert(dev, Arc::new(Mutex::new(device)));
        debug!("registered device {}", dev);
        Ok(())
    }

    /// Register a TTY-class driver; reads and writes go through the tty line discipline.
    pub fn register_tty(&self, dev: DeviceId, ops: Box<dyn TtyOps>) -> FsResult<()> {
        self.register_device(dev, Box::new(TtyDevice::new(ops)))
    }

    pub fn is_registered(&self, dev: DeviceId) -> bool {
        lock(&self.devices).contains_key(&dev)
    }

    fn device(&self, dev: DeviceId) -> FsResult<SharedDevice> {
        lock(&self.devices).get(&dev).cloned().ok_or(FsError::NoDevice)
    }

    // Node operations

    pub fn mkdir(&self, path: impl AsRef<Path>, mode: u32) -> FsResult<()> {
        let kind = NodeKind::Directory {
            children: BTreeMap::new(),
        };
        self.create_node(path.as_ref(), kind, mode)?;
        Ok(())
    }

    /// Create a directory and any missing ancestors
    pub fn mkdir_all(&self, path: impl AsRef<Path>, mode: u32) -> FsResult<()> {
        let path = path.as_ref();
        let mut prefix = String::new();
        if path.is_absolute() {
            prefix.push('/');
        }
        for component in Self::split(path.to_str().ok_or(FsError::InvalidName)?) {
            prefix.push_str(&component);
            match self.mkdir(&prefix, mode) {
                Ok(()) | Err(FsError::AlreadyExists) => {}
                Err(e) => return Err(e),
            }
            prefix.push('/');
        }
        match self.stat(path)?.kind {
            FileKind::Directory => Ok(()),
            _ => Err(FsError::NotADirectory),
        }
    }

    /// Create a character device node bound to `dev`
    pub fn mkdev(&self, path: impl AsRef<Path>, dev: DeviceId) -> FsResult<()> {
        self.create_node(path.as_ref(), NodeKind::CharDevice { dev }, 0o666)?;
        debug!("created device node {} -> {}", path.as_ref().display(), dev);
        Ok(())
    }

    /// Create a symbolic link at `path` pointing at `target`
    pub fn symlink(&self, target: impl AsRef<str>, path: impl AsRef<Path>) -> FsResult<()> {
        let target = target.as_ref();
        if target.is_empty() {
            return Err(FsError::InvalidArgument);
        }
        let kind = NodeKind::Symlink {
            target: target.to_string(),
        };
        self.create_node(path.as_ref(), kind, 0o777)?;
        Ok(())
    }

    pub fn readlink(&self, path: impl AsRef<Path>) -> FsResult<String> {
        let nodes = lock(&self.nodes);
        let resolved = self.resolve(&nodes, path.as_ref(), false)?;
        match nodes.get(&resolved.node_id).map(|n| &n.kind) {
            Some(NodeKind::Symlink { target }) => Ok(target.clone()),
            Some(_) => Err(FsError::InvalidArgument),
            None => Err(FsError::NotFound),
        }
    }

    /// Remove a non-directory entry. Symlinks are removed, not followed.
    pub fn unlink(&self, path: impl AsRef<Path>) -> FsResult<()> {
        let mut nodes = lock(&self.nodes);
        let resolved = self.resolve(&nodes, path.as_ref(), false)?;
        let Some((parent_id, name)) = resolved.parent else {
            return Err(FsError::InvalidArgument); // Can't unlink root
        };

        match nodes.get(&resolved.node_id).map(|n| &n.kind) {
            Some(NodeKind::Directory { .. }) => return Err(FsError::IsADirectory),
            Some(_) => {}
            None => return Err(FsError::NotFound),
        }

        if let Some(Node {
            kind: NodeKind::Directory { children },
            ..
        }) = nodes.get_mut(&parent_id)
        {
            children.remove(&name);
        }

        let still_open = lock(&self.streams)
            .values()
            .any(|s| s.node_id == resolved.node_id);
        if still_open {
            if let Some(node) = nodes.get_mut(&resolved.node_id) {
                node.linked = false;
            }
        } else {
            nodes.remove(&resolved.node_id);
        }
        Ok(())
    }

    pub fn rmdir(&self, path: impl AsRef<Path>) -> FsResult<()> {
        let mut nodes = lock(&self.nodes);
        let resolved = self.resolve(&nodes, path.as_ref(), false)?;
        let Some((parent_id, name)) = resolved.parent else {
            return Err(FsError::InvalidArgument); // Can't remove root
        };

        match nodes.get(&resolved.node_id).map(|n| &n.kind) {
            Some(NodeKind::Directory { children }) if !children.is_empty() => {
                return Err(FsError::NotEmpty)
            }
            Some(NodeKind::Directory { .. }) => {}
            Some(_) => return Err(FsError::NotADirectory),
            None => return Err(FsError::NotFound),
        }
        if *lock(&self.cwd) == resolved.path {
            return Err(FsError::InvalidArgument);
        }

        if let Some(Node {
            kind: NodeKind::Directory { children },
            ..
        }) = nodes.get_mut(&parent_id)
        {
            children.remove(&name);
        }
        nodes.remove(&resolved.node_id);
        Ok(())
    }

    pub fn readdir(&self, path: impl AsRef<Path>) -> FsResult<Vec<DirEntry>> {
        let nodes = lock(&self.nodes);
        let resolved = self.resolve(&nodes, path.as_ref(), true)?;
        let node = nodes.get(&resolved.node_id).ok_or(FsError::NotFound)?;

        let NodeKind::Directory { children } = &node.kind else {
            return Err(FsError::NotADirectory);
        };

        let mut entries = Vec::with_capacity(children.len());
        for (name, child_id) in children {
            let child = nodes.get(child_id).ok_or(FsError::NotFound)?;
            let attrs = Self::node_attributes(child);
            entries.push(DirEntry {
                name: name.clone(),
                kind: attrs.kind,
                len: attrs.len,
            });
        }
        Ok(entries)
    }

    /// Attributes of the node `path` refers to, following symlinks
    pub fn stat(&self, path: impl AsRef<Path>) -> FsResult<Attributes> {
        let nodes = lock(&self.nodes);
        let resolved = self.resolve(&nodes, path.as_ref(), true)?;
        let node = nodes.get(&resolved.node_id).ok_or(FsError::NotFound)?;
        Ok(Self::node_attributes(node))
    }

    /// Like `stat`, but reports a symlink itself
    pub fn lstat(&self, path: impl AsRef<Path>) -> FsResult<Attributes> {
        let nodes = lock(&self.nodes);
        let resolved = self.resolve(&nodes, path.as_ref(), false)?;
        let node = nodes.get(&resolved.node_id).ok_or(FsError::NotFound)?;
        Ok(Self::node_attributes(node))
    }

    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.lstat(path).is_ok()
    }

    pub fn chdir(&self, path: impl AsRef<Path>) -> FsResult<()> {
        let nodes = lock(&self.nodes);
        let resolved = self.resolve(&nodes, path.as_ref(), true)?;
        match nodes.get(&resolved.node_id).map(|n| &n.kind) {
            Some(NodeKind::Directory { .. }) => {
                *lock(&self.cwd) = resolved.path;
                Ok(())
            }
            Some(_) => Err(FsError::NotADirectory),
            None => Err(FsError::NotFound),
        }
    }

    pub fn cwd(&self) -> String {
        lock(&self.cwd).clone()
    }

    /// Replace the contents of a regular file, creating it if needed
    pub fn write_file(&self, path: impl AsRef<Path>, data: &[u8]) -> FsResult<()> {
        let opts = OpenOptions::write_only().create(true).truncate(true);
        let fd = self.open(path, &opts)?;
        let result = self.write(fd, data);
        self.close_stream(fd)?;
        result.map(|_| ())
    }

    pub fn read_file(&self, path: impl AsRef<Path>) -> FsResult<Vec<u8>> {
        let nodes = lock(&self.nodes);
        let resolved = self.resolve(&nodes, path.as_ref(), true)?;
        match nodes.get(&resolved.node_id).map(|n| &n.kind) {
            Some(NodeKind::File { data }) => Ok(data.clone()),
            Some(NodeKind::Directory { .. }) => Err(FsError::IsADirectory),
            Some(_) => Err(FsError::InvalidArgument),
            None => Err(FsError::NotFound),
        }
    }

    // Descriptor table

    /// Open `path` on the lowest free descriptor
    pub fn open(&self, path: impl AsRef<Path>, opts: &OpenOptions) -> FsResult<Fd> {
        if !opts.read && !opts.write {
            return Err(FsError::InvalidArgument);
        }
        let path = path.as_ref();

        let mut nodes = lock(&self.nodes);
        let resolved = self.resolve(&nodes, path, true);
        let node_id = match resolved {
            Ok(resolved) => resolved.node_id,
            Err(FsError::NotFound) if opts.create => {
                drop(nodes);
                let kind = NodeKind::File { data: Vec::new() };
                let node_id = self.create_node(path, kind, 0o644)?;
                nodes = lock(&self.nodes);
                node_id
            }
            Err(e) => return Err(e),
        };

        let node = nodes.get_mut(&node_id).ok_or(FsError::NotFound)?;
        let position = match &mut node.kind {
            NodeKind::Directory { .. } if opts.write => return Err(FsError::IsADirectory),
            NodeKind::File { data } => {
                if opts.write && opts.truncate {
                    data.clear();
                }
                if opts.append {
                    data.len() as u64
                } else {
                    0
                }
            }
            NodeKind::CharDevice { dev } => {
                if !self.is_registered(*dev) {
                    return Err(FsError::NoDevice);
                }
                0
            }
            _ => 0,
        };
        drop(nodes);

        let mut streams = lock(&self.streams);
        let fd = (0..self.config.limits.max_open_descriptors)
            .map(Fd::new)
            .find(|fd| !streams.contains_key(fd))
            .ok_or(FsError::TooManyOpenFiles)?;
        streams.insert(
            fd,
            OpenFile {
                node_id,
                path: path.display().to_string(),
                options: opts.clone(),
                position,
            },
        );
        debug!("opened {} as fd {}", path.display(), fd);
        Ok(fd)
    }

    pub fn is_open(&self, fd: Fd) -> bool {
        lock(&self.streams).contains_key(&fd)
    }

    /// Path a descriptor was opened through
    pub fn stream_path(&self, fd: Fd) -> FsResult<String> {
        lock(&self.streams)
            .get(&fd)
            .map(|s| s.path.clone())
            .ok_or(FsError::BadDescriptor)
    }

    /// Device a descriptor is connected to, if it refers to a device node
    pub fn stream_device(&self, fd: Fd) -> FsResult<Option<DeviceId>> {
        let node_id = lock(&self.streams)
            .get(&fd)
            .map(|s| s.node_id)
            .ok_or(FsError::BadDescriptor)?;
        let nodes = lock(&self.nodes);
        match nodes.get(&node_id).map(|n| &n.kind) {
            Some(NodeKind::CharDevice { dev }) => Ok(Some(*dev)),
            Some(_) => Ok(None),
            None => Err(FsError::NotFound),
        }
    }

    /// Close a descriptor, flushing the device behind it
    pub fn close_stream(&self, fd: Fd) -> FsResult<()> {
        let stream = lock(&self.streams)
            .remove(&fd)
            .ok_or(FsError::BadDescriptor)?;

        let device = self
            .node_device(stream.node_id)
            .and_then(|dev| self.device(dev).ok());
        if let Some(device) = device {
            let result = lock(&device).flush();
            if let Err(e) = result {
                warn!("flush on close of fd {} failed: {}", fd, e);
            }
        }

        // Drop an unlinked node once nothing refers to it.
        let still_open = lock(&self.streams)
            .values()
            .any(|s| s.node_id == stream.node_id);
        if !still_open {
            let mut nodes = lock(&self.nodes);
            if nodes.get(&stream.node_id).is_some_and(|n| !n.linked) {
                nodes.remove(&stream.node_id);
            }
        }
        Ok(())
    }

    fn node_device(&self, node_id: NodeId) -> Option<DeviceId> {
        match lock(&self.nodes).get(&node_id).map(|n| &n.kind) {
            Some(NodeKind::CharDevice { dev }) => Some(*dev),
            _ => None,
        }
    }

    fn stream_state(&self, fd: Fd) -> FsResult<(NodeId, OpenOptions, u64)> {
        lock(&self.streams)
            .get(&fd)
            .map(|s| (s.node_id, s.options.clone(), s.position))
            .ok_or(FsError::BadDescriptor)
    }

    fn advance(&self, fd: Fd, position: u64) {
        if let Some(stream) = lock(&self.streams).get_mut(&fd) {
            stream.position = position;
        }
    }

    pub fn read(&self, fd: Fd, buf: &mut [u8]) -> FsResult<usize> {
        let (node_id, options, position) = self.stream_state(fd)?;
        if !options.read {
            return Err(FsError::BadDescriptor);
        }

        if let Some(dev) = self.node_device(node_id) {
            // No table locks are held while the driver runs; it may block.
            let device = self.device(dev)?;
            let mut driver = lock(&device);
            return driver.read(buf);
        }

        let end = {
            let nodes = lock(&self.nodes);
            match nodes.get(&node_id).map(|n| &n.kind) {
                Some(NodeKind::File { data }) => {
                    let start = (position as usize).min(data.len());
                    let end = (start + buf.len()).min(data.len());
                    buf[..end - start].copy_from_slice(&data[start..end]);
                    end
                }
                Some(NodeKind::Directory { .. }) => return Err(FsError::IsADirectory),
                Some(_) => return Err(FsError::InvalidArgument),
                None => return Err(FsError::NotFound),
            }
        };
        let start = (position as usize).min(end);
        self.advance(fd, end as u64);
        Ok(end - start)
    }

    pub fn write(&self, fd: Fd, data: &[u8]) -> FsResult<usize> {
        let (node_id, options, position) = self.stream_state(fd)?;
        if !options.write {
            return Err(FsError::BadDescriptor);
        }

        if let Some(dev) = self.node_device(node_id) {
            let device = self.device(dev)?;
            let mut driver = lock(&device);
            return driver.write(data);
        }

        let end = {
            let mut nodes = lock(&self.nodes);
            let node = nodes.get_mut(&node_id).ok_or(FsError::NotFound)?;
            let end = match &mut node.kind {
                NodeKind::File { data: content } => {
                    let start = if options.append {
                        content.len()
                    } else {
                        position as usize
                    };
                    let end = start + data.len();
                    if content.len() < end {
                        content.resize(end, 0);
                    }
                    content[start..end].copy_from_slice(data);
                    end
                }
                NodeKind::Directory { .. } => return Err(FsError::IsADirectory),
                _ => return Err(FsError::InvalidArgument),
            };
            node.mtime = Self::current_timestamp();
            end
        };
        self.advance(fd, end as u64);
        Ok(data.len())
    }

    /// Flush whatever the device behind `fd` has buffered
    pub fn fsync(&self, fd: Fd) -> FsResult<()> {
        let (node_id, _, _) = self.stream_state(fd)?;
        match self.node_device(node_id) {
            Some(dev) => {
                let device = self.device(dev)?;
                let mut driver = lock(&device);
                driver.flush()
            }
            None => Ok(()),
        }
    }
}
