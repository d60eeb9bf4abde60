//! The region-file layer: addressing (C3 coordinate math), the single-file
//! container (C3), and the bounded LRU of open handles (C4).

pub mod cache;
pub mod coord;
pub mod file;

pub use cache::{RegionCache, RegionHandle};
pub use coord::RegionCoord;
pub use file::RegionFile;
