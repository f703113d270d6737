//! Node variants of the split view and their operations.
//!
//! Five variants compose the virtual tree: real source directories, regular
//! files rendered as chunk directories, single chunks, and passthrough nodes
//! for excluded files and symlinks. Nodes are created lazily on lookup, are
//! immutable once built, and never hold an open descriptor; reads go through
//! [`OpenFile`] handles that own exactly one descriptor each.

use std::ffi::{OsStr, OsString};
use std::io;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::os::unix::fs::{FileExt, FileTypeExt, MetadataExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use rfuse3::raw::reply::FileAttr;
use rfuse3::{Errno, FileType, Result};

use crate::split::attr::stat_to_attr;
use crate::split::fs::SplitFs;
use crate::split::name::{format_chunk_name, parse_chunk_name};

/// Translate a host syscall error into the narrow FUSE error set: missing
/// entries become ENOENT, permission problems EPERM, everything else ENOSYS.
pub(crate) fn os_to_fuse_err(err: io::Error) -> Errno {
    match err.kind() {
        io::ErrorKind::NotFound => Errno::from(libc::ENOENT),
        io::ErrorKind::PermissionDenied => Errno::from(libc::EPERM),
        _ => Errno::from(libc::ENOSYS),
    }
}

/// Shared identity of every node: the mount configuration plus the
/// source-root-relative path.
#[derive(Debug, Clone)]
pub(crate) struct NodeRef {
    fs: Arc<SplitFs>,
    rel_path: PathBuf,
}

impl NodeRef {
    fn full_path(&self) -> PathBuf {
        self.fs.full_path(&self.rel_path)
    }

    async fn lstat_attr(&self) -> Result<FileAttr> {
        let md = tokio::fs::symlink_metadata(self.full_path())
            .await
            .map_err(os_to_fuse_err)?;
        Ok(stat_to_attr(&md))
    }
}

/// One entry of a virtual directory listing.
#[derive(Debug, Clone)]
pub struct ChildEntry {
    pub inode: u64,
    pub kind: FileType,
    pub name: OsString,
}

/// The tagged node tree. Directory-like variants resolve lookups, file-like
/// variants open read handles, symlinks resolve their target.
#[derive(Debug)]
pub enum Node {
    Directory(DirectoryNode),
    FileAsDir(FileAsDirNode),
    Chunk(ChunkNode),
    DirectFile(DirectFileNode),
    Symlink(SymlinkNode),
}

impl Node {
    pub(crate) fn directory(fs: Arc<SplitFs>, rel_path: PathBuf) -> Self {
        Node::Directory(DirectoryNode {
            inner: NodeRef { fs, rel_path },
        })
    }

    pub fn rel_path(&self) -> &Path {
        &self.inner().rel_path
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Directory(_) | Node::FileAsDir(_))
    }

    fn inner(&self) -> &NodeRef {
        match self {
            Node::Directory(n) => &n.inner,
            Node::FileAsDir(n) => &n.inner,
            Node::Chunk(n) => &n.inner,
            Node::DirectFile(n) => &n.inner,
            Node::Symlink(n) => &n.inner,
        }
    }

    pub async fn attr(&self) -> Result<FileAttr> {
        match self {
            Node::FileAsDir(n) => n.attr().await,
            Node::Chunk(n) => n.attr().await,
            Node::Directory(n) => n.inner.lstat_attr().await,
            Node::DirectFile(n) => n.inner.lstat_attr().await,
            Node::Symlink(n) => n.inner.lstat_attr().await,
        }
    }

    pub async fn entries(&self) -> Result<Vec<ChildEntry>> {
        match self {
            Node::Directory(n) => n.entries().await,
            Node::FileAsDir(n) => n.entries().await,
            _ => Err(Errno::from(libc::ENOTDIR)),
        }
    }

    pub async fn lookup_child(&self, name: &OsStr) -> Result<Node> {
        match self {
            Node::Directory(n) => n.lookup(name).await,
            Node::FileAsDir(n) => n.lookup(name).await,
            _ => Err(Errno::from(libc::ENOTDIR)),
        }
    }

    pub async fn open(&self, flags: u32) -> Result<OpenFile> {
        match self {
            Node::Chunk(n) => n.open(flags).await,
            Node::DirectFile(n) => n.open(flags).await,
            Node::Directory(_) | Node::FileAsDir(_) => Err(Errno::from(libc::EISDIR)),
            Node::Symlink(_) => Err(Errno::from(libc::ENOSYS)),
        }
    }

    pub async fn readlink(&self) -> Result<Bytes> {
        match self {
            Node::Symlink(n) => n.readlink().await,
            _ => Err(Errno::from(libc::EINVAL)),
        }
    }
}

/// A real source directory, listed non-recursively with regular files
/// rewritten to appear as chunk directories unless excluded.
#[derive(Debug)]
pub struct DirectoryNode {
    inner: NodeRef,
}

impl DirectoryNode {
    /// List the source directory in host order. Entry inodes come from the
    /// host dirent; entry types follow the facade rules.
    pub async fn entries(&self) -> Result<Vec<ChildEntry>> {
        let full = self.inner.full_path();
        let mut read_dir = tokio::fs::read_dir(&full).await.map_err(os_to_fuse_err)?;
        let mut out = Vec::new();
        while let Some(entry) = read_dir.next_entry().await.map_err(os_to_fuse_err)? {
            let name = entry.file_name();
            let Ok(file_type) = entry.file_type().await else {
                // Entry vanished between readdir and stat.
                continue;
            };
            let kind = if file_type.is_file() {
                if self.inner.fs.is_excluded(&full.join(&name)) {
                    FileType::RegularFile
                } else {
                    FileType::Directory
                }
            } else if file_type.is_dir() {
                FileType::Directory
            } else if file_type.is_symlink() {
                FileType::Symlink
            } else if file_type.is_socket() {
                FileType::Socket
            } else if file_type.is_block_device() {
                FileType::BlockDevice
            } else if file_type.is_char_device() {
                FileType::CharDevice
            } else if file_type.is_fifo() {
                FileType::NamedPipe
            } else {
                continue;
            };
            out.push(ChildEntry {
                inode: entry.ino(),
                kind,
                name,
            });
        }
        Ok(out)
    }

    /// Classify a child by `lstat` and build the matching node. Non-excluded
    /// regular files get their relative path digested into the chunk
    /// filename hash and inode base here, once.
    pub async fn lookup(&self, name: &OsStr) -> Result<Node> {
        let fs = &self.inner.fs;
        let rel_path = self.inner.rel_path.join(name);
        let full = fs.full_path(&rel_path);
        let md = tokio::fs::symlink_metadata(&full)
            .await
            .map_err(os_to_fuse_err)?;
        let inner = NodeRef {
            fs: fs.clone(),
            rel_path,
        };

        let file_type = md.file_type();
        if file_type.is_dir() {
            return Ok(Node::Directory(DirectoryNode { inner }));
        }
        if file_type.is_symlink() {
            return Ok(Node::Symlink(SymlinkNode { inner }));
        }
        if file_type.is_file() {
            if fs.is_excluded(&full) {
                return Ok(Node::DirectFile(DirectFileNode { inner }));
            }
            let mut hasher = fs.new_hasher();
            hasher.update(inner.rel_path.as_os_str().as_bytes());
            let (digest, inode_base) = hasher.digest();
            return Ok(Node::FileAsDir(FileAsDirNode {
                inner,
                digest,
                inode_base,
            }));
        }
        // Devices, FIFOs and sockets are not represented yet.
        Err(Errno::from(libc::ENOSYS))
    }
}

/// Chunk geometry of a file at one instant: chunk count, tail size, and the
/// mtime truncated to whole seconds.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChunkSnapshot {
    pub num_chunks: u64,
    pub last_chunk_size: u64,
    pub mtime_secs: i64,
}

/// A non-excluded regular file rendered as a directory of chunk files.
#[derive(Debug)]
pub struct FileAsDirNode {
    inner: NodeRef,
    digest: String,
    inode_base: u64,
}

impl FileAsDirNode {
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Re-stat the source; every readdir and lookup works from a fresh
    /// snapshot, never from cached geometry.
    pub(crate) async fn snapshot(&self) -> Result<ChunkSnapshot> {
        let md = tokio::fs::metadata(self.inner.full_path())
            .await
            .map_err(os_to_fuse_err)?;
        let layout = self.inner.fs.layout();
        let size = md.len();
        Ok(ChunkSnapshot {
            num_chunks: layout.chunk_count(size),
            last_chunk_size: layout.last_chunk_size(size),
            mtime_secs: md.mtime(),
        })
    }

    /// The file's own attributes with the mode forced to a read-only
    /// directory.
    pub async fn attr(&self) -> Result<FileAttr> {
        let mut attr = self.inner.lstat_attr().await?;
        attr.kind = FileType::Directory;
        attr.perm = 0o555;
        Ok(attr)
    }

    /// One synthetic entry per chunk, 1-based in filenames, inode pinned at
    /// the hash-derived base plus the 1-based index.
    pub async fn entries(&self) -> Result<Vec<ChildEntry>> {
        let snap = self.snapshot().await?;
        let policy = self.inner.fs.policy();
        let mut out = Vec::with_capacity(snap.num_chunks.min(1 << 16) as usize);
        for index in 0..snap.num_chunks {
            let name = format_chunk_name(
                policy,
                &self.digest,
                index + 1,
                snap.num_chunks,
                snap.mtime_secs,
            );
            out.push(ChildEntry {
                inode: self.inode_base.wrapping_add(index + 1),
                kind: FileType::RegularFile,
                name: name.into(),
            });
        }
        Ok(out)
    }

    /// Decode a chunk filename and re-validate it against the current state
    /// of the source file. Stale totals or mtimes, foreign digests and
    /// out-of-range indices all fail as ENOENT.
    pub async fn lookup(&self, name: &OsStr) -> Result<Node> {
        let not_found = || Errno::from(libc::ENOENT);
        let name = name.to_str().ok_or_else(not_found)?;
        let parsed =
            parse_chunk_name(self.inner.fs.policy(), name).ok_or_else(not_found)?;
        if parsed.hash != self.digest {
            return Err(not_found());
        }

        let snap = self.snapshot().await?;
        if let Some(total) = parsed.total {
            if total != snap.num_chunks {
                return Err(not_found());
            }
        }
        if let Some(mtime_secs) = parsed.mtime_secs {
            if mtime_secs != snap.mtime_secs {
                return Err(not_found());
            }
        }
        if parsed.index == 0 || parsed.index > snap.num_chunks {
            return Err(not_found());
        }

        Ok(Node::Chunk(self.chunk_at(parsed.index - 1, &snap)))
    }

    pub(crate) fn chunk_at(&self, index: u64, snap: &ChunkSnapshot) -> ChunkNode {
        let layout = self.inner.fs.layout();
        let size = if index + 1 == snap.num_chunks {
            snap.last_chunk_size
        } else {
            layout.chunk_size()
        };
        ChunkNode {
            inner: self.inner.clone(),
            index,
            offset: layout.offset_of(index),
            size,
        }
    }
}

/// One chunk of a file-as-directory: a fixed window onto the source file.
#[derive(Debug)]
pub struct ChunkNode {
    inner: NodeRef,
    /// 0-based internally; filenames and inode offsets are 1-based.
    index: u64,
    offset: u64,
    size: u64,
}

impl ChunkNode {
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// The source file's attributes with inode, size and block count
    /// rewritten for this chunk.
    pub async fn attr(&self) -> Result<FileAttr> {
        let mut attr = self.inner.lstat_attr().await?;
        attr.ino = attr.ino.wrapping_add(self.index + 1);
        attr.size = self.size;
        attr.blocks = self.size.div_ceil(512);
        Ok(attr)
    }

    pub async fn open(&self, flags: u32) -> Result<OpenFile> {
        open_read_only(
            &self.inner,
            flags,
            Some(ReadWindow {
                offset: self.offset,
                size: self.size,
            }),
        )
        .await
    }
}

/// An excluded regular file mirrored unchanged.
#[derive(Debug)]
pub struct DirectFileNode {
    inner: NodeRef,
}

impl DirectFileNode {
    pub async fn open(&self, flags: u32) -> Result<OpenFile> {
        open_read_only(&self.inner, flags, None).await
    }
}

/// A symbolic link mirrored unchanged; the target is returned raw, without
/// dereferencing or sanitation.
#[derive(Debug)]
pub struct SymlinkNode {
    inner: NodeRef,
}

impl SymlinkNode {
    pub async fn readlink(&self) -> Result<Bytes> {
        let target = tokio::fs::read_link(self.inner.full_path())
            .await
            .map_err(os_to_fuse_err)?;
        Ok(Bytes::from(target.into_os_string().into_vec()))
    }
}

#[derive(Debug, Clone, Copy)]
struct ReadWindow {
    offset: u64,
    size: u64,
}

/// An open read handle: exactly one descriptor, plus the chunk window when
/// the node is a chunk. Dropping the handle closes the descriptor.
#[derive(Debug)]
pub struct OpenFile {
    file: std::fs::File,
    window: Option<ReadWindow>,
}

impl OpenFile {
    /// Positional read. For windowed handles the request offset is shifted
    /// by the chunk offset and the length clamped to the window, so a reader
    /// can never see bytes of an adjacent chunk. EOF yields a short read.
    pub fn read(&self, offset: u64, size: u32) -> Result<Vec<u8>> {
        let (true_offset, want) = match self.window {
            Some(window) => {
                let remaining = window.size.saturating_sub(offset);
                let want = (size as u64).min(remaining);
                if want == 0 {
                    return Ok(Vec::new());
                }
                (window.offset + offset, want)
            }
            None => (offset, size as u64),
        };
        if want == 0 {
            return Ok(Vec::new());
        }
        let mut buf = vec![0u8; want as usize];
        let n = self.file.read_at(&mut buf, true_offset).map_err(os_to_fuse_err)?;
        buf.truncate(n);
        Ok(buf)
    }
}

async fn open_read_only(
    inner: &NodeRef,
    flags: u32,
    window: Option<ReadWindow>,
) -> Result<OpenFile> {
    if flags & libc::O_ACCMODE as u32 != libc::O_RDONLY as u32 {
        return Err(Errno::from(libc::EROFS));
    }
    let file = tokio::fs::File::open(inner.full_path())
        .await
        .map_err(os_to_fuse_err)?;
    Ok(OpenFile {
        file: file.into_std().await,
        window,
    })
}
