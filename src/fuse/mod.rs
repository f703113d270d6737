//! FUSE adapter and request handling
//!
//! Responsibilities:
//! - Implement the `rfuse3` raw `Filesystem` callbacks and translate kernel
//!   requests into operations on the split-view node tree.
//! - Track live nodes by the inode numbers reported to the kernel, with
//!   lookup counts released through `forget`.
//! - Track open read handles behind monotonically increasing handle ids.
//!
//! Submodules:
//! - `mount`: mount/unmount helpers around the rfuse3 session APIs

pub mod mount;

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{self, BoxStream};
use log::debug;
use rfuse3::raw::reply::{
    DirectoryEntry, DirectoryEntryPlus, ReplyAttr, ReplyData, ReplyDirectory,
    ReplyDirectoryPlus, ReplyEntry, ReplyInit, ReplyOpen,
};
use rfuse3::raw::{Filesystem, Request};
use rfuse3::{Errno, FileType, Result};

use crate::split::attr::stat_to_attr;
use crate::split::node::{Node, OpenFile};
use crate::split::SplitFs;

const ROOT_INODE: u64 = 1;

/// Handle ids start above the values the transport reserves.
const FIRST_FILE_HANDLE: u64 = 2;

/// Entry and attribute cache lifetime handed to the kernel. The view re-stats
/// the source on every request, so a short TTL only bounds staleness.
const TTL: Duration = Duration::from_secs(1);

struct NodeSlot {
    node: Arc<Node>,
    lookups: u64,
}

/// The FUSE-facing filesystem: the shared configuration plus the tables the
/// kernel protocol needs. Nodes themselves stay immutable; the tables are the
/// only mutable state and sit behind their own locks.
pub struct SplitFuse {
    fs: Arc<SplitFs>,
    nodes: RwLock<HashMap<u64, NodeSlot>>,
    handles: RwLock<HashMap<u64, Arc<OpenFile>>>,
    next_fh: AtomicU64,
}

impl SplitFuse {
    pub fn new(fs: Arc<SplitFs>) -> Self {
        let root = Arc::new(fs.root());
        let mut nodes = HashMap::new();
        nodes.insert(
            ROOT_INODE,
            NodeSlot {
                node: root,
                lookups: 1,
            },
        );
        Self {
            fs,
            nodes: RwLock::new(nodes),
            handles: RwLock::new(HashMap::new()),
            next_fh: AtomicU64::new(FIRST_FILE_HANDLE),
        }
    }

    pub fn config(&self) -> &Arc<SplitFs> {
        &self.fs
    }

    fn node(&self, ino: u64) -> Result<Arc<Node>> {
        self.nodes
            .read()
            .unwrap()
            .get(&ino)
            .map(|slot| slot.node.clone())
            .ok_or_else(|| Errno::from(libc::ENOENT))
    }

    /// Register a node under the inode reported to the kernel, bumping its
    /// lookup count. Inode numbers are advisory; a collision replaces the
    /// previous occupant, except that the root slot is never displaced.
    fn remember(&self, ino: u64, node: &Arc<Node>) {
        if ino == ROOT_INODE {
            return;
        }
        let mut nodes = self.nodes.write().unwrap();
        match nodes.entry(ino) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                slot.node = node.clone();
                slot.lookups += 1;
            }
            Entry::Vacant(vacant) => {
                vacant.insert(NodeSlot {
                    node: node.clone(),
                    lookups: 1,
                });
            }
        }
    }

    fn forget_node(&self, ino: u64, nlookup: u64) {
        if ino == ROOT_INODE {
            return;
        }
        let mut nodes = self.nodes.write().unwrap();
        if let Entry::Occupied(mut occupied) = nodes.entry(ino) {
            let slot = occupied.get_mut();
            slot.lookups = slot.lookups.saturating_sub(nlookup);
            if slot.lookups == 0 {
                occupied.remove();
            }
        }
    }

    fn handle(&self, fh: u64) -> Result<Arc<OpenFile>> {
        self.handles
            .read()
            .unwrap()
            .get(&fh)
            .cloned()
            .ok_or_else(|| Errno::from(libc::EBADF))
    }

    /// Inode of a node's parent directory, for `..` entries. Advisory; falls
    /// back to the node itself at the root.
    async fn parent_inode(&self, node: &Node) -> u64 {
        let Some(parent_rel) = node.rel_path().parent() else {
            return ROOT_INODE;
        };
        if parent_rel.as_os_str().is_empty() {
            return ROOT_INODE;
        }
        match tokio::fs::symlink_metadata(self.fs.source_dir().join(parent_rel)).await {
            Ok(md) => std::os::unix::fs::MetadataExt::ino(&md),
            Err(_) => ROOT_INODE,
        }
    }
}

#[allow(refining_impl_trait_reachable)]
impl Filesystem for SplitFuse {
    async fn init(&self, _req: Request) -> Result<ReplyInit> {
        Ok(ReplyInit::default())
    }

    async fn destroy(&self, _req: Request) {}

    async fn lookup(&self, _req: Request, parent: u64, name: &OsStr) -> Result<ReplyEntry> {
        debug!("lookup: parent={parent} name={name:?}");
        let parent_node = self.node(parent)?;
        let child = Arc::new(parent_node.lookup_child(name).await?);
        let attr = child.attr().await?;
        self.remember(attr.ino, &child);
        Ok(ReplyEntry {
            ttl: TTL,
            attr,
            generation: 0,
        })
    }

    async fn forget(&self, _req: Request, inode: u64, nlookup: u64) {
        self.forget_node(inode, nlookup);
    }

    async fn batch_forget(&self, _req: Request, inodes: &[(u64, u64)]) {
        for (inode, nlookup) in inodes {
            self.forget_node(*inode, *nlookup);
        }
    }

    async fn getattr(
        &self,
        _req: Request,
        ino: u64,
        _fh: Option<u64>,
        _flags: u32,
    ) -> Result<ReplyAttr> {
        debug!("getattr: ino={ino}");
        let attr = self.node(ino)?.attr().await?;
        Ok(ReplyAttr { ttl: TTL, attr })
    }

    async fn opendir(&self, _req: Request, ino: u64, _flags: u32) -> Result<ReplyOpen> {
        debug!("opendir: ino={ino}");
        if !self.node(ino)?.is_dir() {
            return Err(Errno::from(libc::ENOTDIR));
        }
        // Enumeration is stateless; no directory handle to allocate.
        Ok(ReplyOpen { fh: 0, flags: 0 })
    }

    async fn releasedir(&self, _req: Request, _inode: u64, _fh: u64, _flags: u32) -> Result<()> {
        Ok(())
    }

    async fn readdir<'a>(
        &'a self,
        _req: Request,
        ino: u64,
        _fh: u64,
        offset: i64,
    ) -> Result<ReplyDirectory<BoxStream<'a, Result<DirectoryEntry>>>> {
        debug!("readdir: ino={ino} offset={offset}");
        let node = self.node(ino)?;
        let children = node.entries().await?;

        let mut all = Vec::with_capacity(children.len() + 2);
        all.push(DirectoryEntry {
            inode: ino,
            kind: FileType::Directory,
            name: OsString::from("."),
            offset: 1,
        });
        all.push(DirectoryEntry {
            inode: self.parent_inode(&node).await,
            kind: FileType::Directory,
            name: OsString::from(".."),
            offset: 2,
        });
        for (i, child) in children.into_iter().enumerate() {
            all.push(DirectoryEntry {
                inode: child.inode,
                kind: child.kind,
                name: child.name,
                offset: i as i64 + 3,
            });
        }

        let entries = all.into_iter().skip(offset.max(0) as usize).map(Ok);
        let boxed: BoxStream<'a, Result<DirectoryEntry>> = Box::pin(stream::iter(entries));
        Ok(ReplyDirectory { entries: boxed })
    }

    async fn readdirplus<'a>(
        &'a self,
        _req: Request,
        ino: u64,
        _fh: u64,
        offset: u64,
        _lock_owner: u64,
    ) -> Result<ReplyDirectoryPlus<BoxStream<'a, Result<DirectoryEntryPlus>>>> {
        debug!("readdirplus: ino={ino} offset={offset}");
        let node = self.node(ino)?;
        let children = node.entries().await?;

        let self_attr = node.attr().await?;
        let parent_ino = self.parent_inode(&node).await;
        let parent_attr = match self.node(parent_ino) {
            Ok(parent) => parent.attr().await.unwrap_or_else(|_| self_attr.clone()),
            Err(_) => self_attr.clone(),
        };
        let mut all = Vec::with_capacity(children.len() + 2);
        all.push(DirectoryEntryPlus {
            inode: ino,
            generation: 0,
            kind: FileType::Directory,
            name: OsString::from("."),
            offset: 1,
            attr: self_attr,
            entry_ttl: TTL,
            attr_ttl: TTL,
        });
        all.push(DirectoryEntryPlus {
            inode: parent_ino,
            generation: 0,
            kind: FileType::Directory,
            name: OsString::from(".."),
            offset: 2,
            attr: parent_attr,
            entry_ttl: TTL,
            attr_ttl: TTL,
        });

        for child in children {
            // Entries handed out by readdirplus count as lookups, so resolve
            // each name into a live node. Children that have no node form
            // (devices, FIFOs, sockets) still get listed with their raw
            // attributes; children that vanished are skipped.
            let attr = match node.lookup_child(&child.name).await {
                Ok(child_node) => {
                    let child_node = Arc::new(child_node);
                    let Ok(attr) = child_node.attr().await else {
                        continue;
                    };
                    self.remember(attr.ino, &child_node);
                    attr
                }
                Err(_) => {
                    let full = self
                        .fs
                        .source_dir()
                        .join(node.rel_path())
                        .join(&child.name);
                    match tokio::fs::symlink_metadata(full).await {
                        Ok(md) => stat_to_attr(&md),
                        Err(_) => continue,
                    }
                }
            };
            let entry_offset = all.len() as i64 + 1;
            all.push(DirectoryEntryPlus {
                inode: attr.ino,
                generation: 0,
                kind: attr.kind,
                name: child.name,
                offset: entry_offset,
                attr,
                entry_ttl: TTL,
                attr_ttl: TTL,
            });
        }

        let entries = all.into_iter().skip(offset as usize).map(Ok);
        let boxed: BoxStream<'a, Result<DirectoryEntryPlus>> = Box::pin(stream::iter(entries));
        Ok(ReplyDirectoryPlus { entries: boxed })
    }

    async fn open(&self, _req: Request, ino: u64, flags: u32) -> Result<ReplyOpen> {
        debug!("open: ino={ino} flags={flags:#o}");
        let node = self.node(ino)?;
        let open = Arc::new(node.open(flags).await?);
        let fh = self.next_fh.fetch_add(1, Ordering::Relaxed);
        self.handles.write().unwrap().insert(fh, open);
        Ok(ReplyOpen { fh, flags })
    }

    async fn read(
        &self,
        _req: Request,
        ino: u64,
        fh: u64,
        offset: u64,
        size: u32,
    ) -> Result<ReplyData> {
        debug!("read: ino={ino} fh={fh} offset={offset} size={size}");
        let data = self.handle(fh)?.read(offset, size)?;
        Ok(ReplyData {
            data: Bytes::from(data),
        })
    }

    async fn release(
        &self,
        _req: Request,
        _inode: u64,
        fh: u64,
        _flags: u32,
        _lock_owner: u64,
        _flush: bool,
    ) -> Result<()> {
        debug!("release: fh={fh}");
        // Dropping the handle closes its descriptor.
        self.handles.write().unwrap().remove(&fh);
        Ok(())
    }

    async fn readlink(&self, _req: Request, ino: u64) -> Result<ReplyData> {
        debug!("readlink: ino={ino}");
        let target = self.node(ino)?.readlink().await?;
        Ok(ReplyData { data: target })
    }
}
