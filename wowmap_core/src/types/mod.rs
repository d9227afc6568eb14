mod blob;
mod build_version;
mod byte_range;
mod content_hash;
mod tile_coord;

pub use blob::Blob;
pub use build_version::BuildVersion;
pub use byte_range::ByteRange;
pub use content_hash::ContentHash;
pub use tile_coord::TileCoord;
