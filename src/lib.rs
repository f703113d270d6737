// Library crate for splitfs: the split-view node model, the filename hash
// registry and the FUSE transport adapter, reusable by external bins.

pub mod fuse;
pub mod hashes;
pub mod split;
