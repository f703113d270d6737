//! Core split-view model
//!
//! Responsibilities:
//! - Hold the shared, immutable filesystem configuration (source root, chunk
//!   size, exclusion predicate, filename policy, hash factory).
//! - Model the virtual node tree: real directories, regular files rendered as
//!   chunk directories, single chunks, and passthrough files/symlinks.
//! - Provide the deterministic, reversible chunk filename codec and the
//!   chunk-size arithmetic both sides of it rely on.
//!
//! Submodules:
//! - `fs`: `SplitFs` configuration and construction
//! - `node`: node variants and their attr/readdir/lookup/open operations
//! - `layout`: chunk count/offset/size arithmetic
//! - `name`: chunk filename format and parser
//! - `attr`: host `lstat` to FUSE attribute mapping
//! - `error`: construction-time error type

pub mod attr;
pub mod error;
pub mod fs;
pub mod layout;
pub mod name;
pub mod node;

pub use error::SplitError;
pub use fs::{SplitFs, SplitOptions};
pub use layout::ChunkLayout;
pub use name::{FilenamePolicy, CHUNK_FILE_EXTENSION};
pub use node::Node;
