//! Shared mount configuration, immutable once constructed.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;

use crate::hashes::{self, FilenameHash, HashFactory};
use crate::split::error::SplitError;
use crate::split::layout::ChunkLayout;
use crate::split::name::FilenamePolicy;
use crate::split::node::Node;

/// Optional knobs for [`SplitFs::new`]; defaults mirror the CLI defaults.
#[derive(Debug, Clone)]
pub struct SplitOptions {
    /// Files whose absolute source path matches are passed through unsplit.
    /// Substring match; anchor with `^`/`$` for a full match.
    pub exclude_regexp: Option<String>,
    /// One of [`crate::hashes::HASH_NAMES`].
    pub filename_hash: String,
    pub filename_includes_total_chunks: bool,
    pub filename_includes_mtime: bool,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            exclude_regexp: None,
            filename_hash: "sha256-b32".to_string(),
            filename_includes_total_chunks: true,
            filename_includes_mtime: false,
        }
    }
}

/// The filesystem-wide configuration every node holds an `Arc` to: source
/// root, chunk geometry, exclusion predicate, filename policy and hash
/// factory. Never mutated after construction, so nodes can share it across
/// request threads without locking.
#[derive(Debug)]
pub struct SplitFs {
    source_dir: PathBuf,
    layout: ChunkLayout,
    exclude: Option<Regex>,
    hash: HashFactory,
    policy: FilenamePolicy,
}

impl SplitFs {
    /// Validate the configuration and canonicalize the source directory.
    pub fn new(
        source_dir: impl AsRef<Path>,
        chunk_size: u64,
        options: SplitOptions,
    ) -> Result<Self, SplitError> {
        let source_dir = source_dir.as_ref();
        if chunk_size == 0 {
            return Err(SplitError::InvalidChunkSize);
        }
        let stat_err = |source| SplitError::SourceUnavailable {
            path: source_dir.to_path_buf(),
            source,
        };
        let meta = fs::metadata(source_dir).map_err(stat_err)?;
        if !meta.is_dir() {
            return Err(SplitError::NotADirectory(source_dir.to_path_buf()));
        }
        let source_dir = fs::canonicalize(source_dir).map_err(stat_err)?;

        let exclude = match options.exclude_regexp {
            Some(pattern) => Some(Regex::new(&pattern).map_err(|source| {
                SplitError::InvalidExcludeRegexp { pattern, source }
            })?),
            None => None,
        };
        let hash = hashes::hash_factory(&options.filename_hash)
            .ok_or(SplitError::UnknownFilenameHash(options.filename_hash))?;

        Ok(Self {
            source_dir,
            layout: ChunkLayout::new(chunk_size),
            exclude,
            hash,
            policy: FilenamePolicy {
                includes_total_chunks: options.filename_includes_total_chunks,
                includes_mtime: options.filename_includes_mtime,
            },
        })
    }

    /// The virtual root: a directory node over the source root itself.
    pub fn root(self: &Arc<Self>) -> Node {
        Node::directory(self.clone(), PathBuf::new())
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn layout(&self) -> ChunkLayout {
        self.layout
    }

    pub fn chunk_size(&self) -> u64 {
        self.layout.chunk_size()
    }

    pub fn policy(&self) -> FilenamePolicy {
        self.policy
    }

    /// Absolute source path behind a root-relative one.
    pub(crate) fn full_path(&self, rel_path: &Path) -> PathBuf {
        self.source_dir.join(rel_path)
    }

    /// Whether `absolute` is demoted to a passthrough file. Tested against
    /// the absolute source path, not the root-relative one.
    pub fn is_excluded(&self, absolute: &Path) -> bool {
        match &self.exclude {
            Some(re) => re.is_match(&absolute.to_string_lossy()),
            None => false,
        }
    }

    /// Fresh hasher for digesting a root-relative path.
    pub fn new_hasher(&self) -> Box<dyn FilenameHash> {
        (self.hash)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_zero_chunk_size() {
        let dir = tempfile::tempdir().unwrap();
        let err = SplitFs::new(dir.path(), 0, SplitOptions::default()).unwrap_err();
        assert!(matches!(err, SplitError::InvalidChunkSize));
    }

    #[test]
    fn test_rejects_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = SplitFs::new(&missing, 1024, SplitOptions::default()).unwrap_err();
        assert!(matches!(err, SplitError::SourceUnavailable { .. }));
    }

    #[test]
    fn test_rejects_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain");
        std::fs::write(&file, b"x").unwrap();
        let err = SplitFs::new(&file, 1024, SplitOptions::default()).unwrap_err();
        assert!(matches!(err, SplitError::NotADirectory(_)));
    }

    #[test]
    fn test_rejects_bad_regexp_and_bad_hash() {
        let dir = tempfile::tempdir().unwrap();
        let err = SplitFs::new(
            dir.path(),
            1024,
            SplitOptions {
                exclude_regexp: Some("[".to_string()),
                ..SplitOptions::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, SplitError::InvalidExcludeRegexp { .. }));

        let err = SplitFs::new(
            dir.path(),
            1024,
            SplitOptions {
                filename_hash: "crc32-hex".to_string(),
                ..SplitOptions::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, SplitError::UnknownFilenameHash(_)));
    }

    #[test]
    fn test_canonicalizes_source_and_matches_exclusions_absolutely() {
        let dir = tempfile::tempdir().unwrap();
        let fs = SplitFs::new(
            dir.path(),
            1024,
            SplitOptions {
                exclude_regexp: Some(r"\.iso$".to_string()),
                ..SplitOptions::default()
            },
        )
        .unwrap();
        assert!(fs.source_dir().is_absolute());
        assert!(fs.is_excluded(&fs.source_dir().join("dvd.iso")));
        assert!(!fs.is_excluded(&fs.source_dir().join("dvd.iso.txt")));
    }
}
