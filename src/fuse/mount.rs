//! Mount helpers for starting/stopping FUSE
//!
//! Notes:
//! - Only supported on Unix-like systems. On Linux the default is an
//!   unprivileged mount via fusermount3.
//! - These helpers are thin wrappers over the rfuse3 raw Session APIs.

use std::path::Path;

use rfuse3::MountOptions;

use crate::fuse::SplitFuse;

/// The volume label of a mount: `splitfs <chunk_size> <basename(source)>`.
pub fn volume_label(fuse: &SplitFuse) -> String {
    let config = fuse.config();
    let base = config
        .source_dir()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "/".to_string());
    format!("splitfs {} {}", config.chunk_size(), base)
}

/// Build mount options for a read-only splitfs volume.
fn default_mount_options(fuse: &SplitFuse) -> MountOptions {
    let mut options = MountOptions::default();
    options
        .fs_name(volume_label(fuse))
        .read_only(true)
        .force_readdir_plus(true)
        .uid(unsafe { libc::getuid() })
        .gid(unsafe { libc::getgid() });
    options
}

/// Mount at `mountpoint` without privileges (requires fusermount3 in PATH).
#[cfg(target_os = "linux")]
pub async fn mount_unprivileged(
    fuse: SplitFuse,
    mountpoint: impl AsRef<Path>,
) -> std::io::Result<rfuse3::raw::MountHandle> {
    let options = default_mount_options(&fuse);
    rfuse3::raw::Session::new(options)
        .mount_with_unprivileged(fuse, mountpoint.as_ref())
        .await
}

/// Mount at `mountpoint` through the privileged mount(2) path.
#[cfg(target_os = "linux")]
pub async fn mount_privileged(
    fuse: SplitFuse,
    mountpoint: impl AsRef<Path>,
) -> std::io::Result<rfuse3::raw::MountHandle> {
    let options = default_mount_options(&fuse);
    rfuse3::raw::Session::new(options)
        .mount(fuse, mountpoint.as_ref())
        .await
}

/// Fallback stubs for non-Linux targets.
#[cfg(not(target_os = "linux"))]
pub async fn mount_unprivileged(
    fuse: SplitFuse,
    mountpoint: impl AsRef<Path>,
) -> std::io::Result<rfuse3::raw::MountHandle> {
    let _ = (fuse, mountpoint.as_ref());
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "FUSE mount is only supported on Linux in this build",
    ))
}

#[cfg(not(target_os = "linux"))]
pub async fn mount_privileged(
    fuse: SplitFuse,
    mountpoint: impl AsRef<Path>,
) -> std::io::Result<rfuse3::raw::MountHandle> {
    mount_unprivileged(fuse, mountpoint).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::split::{SplitFs, SplitOptions};
    use std::sync::Arc;

    #[test]
    fn test_volume_label_names_chunk_size_and_basename() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("media");
        std::fs::create_dir(&source).unwrap();
        let fs = SplitFs::new(&source, 32 << 20, SplitOptions::default()).unwrap();
        let fuse = SplitFuse::new(Arc::new(fs));
        assert_eq!(volume_label(&fuse), format!("splitfs {} media", 32 << 20));
    }
}
