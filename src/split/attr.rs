//! Host `lstat` to FUSE attribute mapping.

use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;

use rfuse3::raw::reply::FileAttr;
use rfuse3::{FileType, Timestamp};

/// POSIX file type behind a raw `st_mode`, `None` for anything outside the
/// POSIX set.
pub fn file_type_of(mode: u32) -> Option<FileType> {
    match mode & libc::S_IFMT {
        libc::S_IFREG => Some(FileType::RegularFile),
        libc::S_IFDIR => Some(FileType::Directory),
        libc::S_IFLNK => Some(FileType::Symlink),
        libc::S_IFBLK => Some(FileType::BlockDevice),
        libc::S_IFCHR => Some(FileType::CharDevice),
        libc::S_IFIFO => Some(FileType::NamedPipe),
        libc::S_IFSOCK => Some(FileType::Socket),
        _ => None,
    }
}

/// Copy an `lstat` result into a FUSE attribute verbatim: permission bits
/// including setuid/setgid/sticky, nlink/uid/gid/rdev/size/blocks/blksize,
/// and nanosecond timestamps.
pub fn stat_to_attr(md: &Metadata) -> FileAttr {
    let ctime = Timestamp::new(md.ctime(), md.ctime_nsec() as u32);
    FileAttr {
        ino: md.ino(),
        size: md.size(),
        blocks: md.blocks(),
        atime: Timestamp::new(md.atime(), md.atime_nsec() as u32),
        mtime: Timestamp::new(md.mtime(), md.mtime_nsec() as u32),
        ctime,
        #[cfg(target_os = "macos")]
        crtime: ctime,
        kind: file_type_of(md.mode()).unwrap_or(FileType::RegularFile),
        perm: (md.mode() & 0o7777) as u16,
        nlink: md.nlink() as u32,
        uid: md.uid(),
        gid: md.gid(),
        rdev: md.rdev() as u32,
        #[cfg(target_os = "macos")]
        flags: 0,
        blksize: md.blksize() as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn test_regular_file_attr_is_copied_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"hello").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();

        let md = std::fs::symlink_metadata(&path).unwrap();
        let attr = stat_to_attr(&md);
        assert_eq!(attr.ino, md.ino());
        assert_eq!(attr.size, 5);
        assert_eq!(attr.kind, FileType::RegularFile);
        assert_eq!(attr.perm, 0o640);
        assert_eq!(attr.uid, md.uid());
        assert_eq!(attr.mtime, Timestamp::new(md.mtime(), md.mtime_nsec() as u32));
    }

    #[test]
    fn test_symlink_and_directory_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("t");
        std::fs::write(&target, b"x").unwrap();
        let link = dir.path().join("l");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let md = std::fs::symlink_metadata(&link).unwrap();
        assert_eq!(stat_to_attr(&md).kind, FileType::Symlink);

        let md = std::fs::symlink_metadata(dir.path()).unwrap();
        assert_eq!(stat_to_attr(&md).kind, FileType::Directory);
    }

    #[test]
    fn test_setgid_bit_survives() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g");
        std::fs::write(&path, b"x").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o2755)).unwrap();

        let md = std::fs::symlink_metadata(&path).unwrap();
        assert_eq!(stat_to_attr(&md).perm & 0o7777, 0o2755);
    }
}
