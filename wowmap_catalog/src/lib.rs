//! The catalog: the relational data model (§3), its SQLite-backed store
//! (§4.J), the tile blob store (§4.K), and the publish protocol server a
//! worker talks to (§4.L).

pub mod blob_store;
pub mod model;
pub mod publish_server;
pub mod store;

pub use blob_store::{LocalTileStore, R2TileStore, TileBlobStore};
pub use model::*;
pub use publish_server::build_router;
pub use store::{CatalogStore, SqliteCatalogStore};
