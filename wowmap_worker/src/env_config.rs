//! Maps the `Section:Key`-style environment knobs documented for this worker
//! onto concrete `SCREAMING_SNAKE_CASE` variable names, since the former
//! isn't valid as a shell identifier.

use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use std::sync::Arc;
use wowmap_catalog::{LocalTileStore, R2TileStore, TileBlobStore};

/// `BackendUrl`: where the worker's [`crate::publish_client::PublishClient`]
/// talks to the catalog.
pub fn backend_url() -> Result<String> {
	std::env::var("BACKEND_URL").context("BACKEND_URL is not set")
}

/// `Blizztrack:CachePath`: the CDN resource cache root.
pub fn cache_dir() -> PathBuf {
	std::env::var("BLIZZTRACK_CACHE_PATH").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("./blizztrack-cache"))
}

/// Where `generate`/`service` keep their own record of tiles they've cached
/// locally, so a later `sync-tiles --connection-string` pointed at this same
/// path can find what the remote catalog is still missing.
pub fn local_catalog_path() -> PathBuf {
	cache_dir().join("catalog.sqlite")
}

/// `TileStoreProvider` plus its matching `LocalTileStore:Path` or
/// `R2TileStore:*` block.
pub fn tile_store() -> Result<Arc<dyn TileBlobStore>> {
	match std::env::var("TILE_STORE_PROVIDER").as_deref() {
		Ok("R2") => {
			let service_url = std::env::var("R2_SERVICE_URL").context("R2_SERVICE_URL is not set")?;
			let bucket = std::env::var("R2_BUCKET_NAME").context("R2_BUCKET_NAME is not set")?;
			// AccessKey/SecretKey are read for completeness but unused: R2TileStore
			// talks to public buckets over unsigned HTTP (see blob_store.rs).
			let _ = std::env::var("R2_ACCESS_KEY");
			let _ = std::env::var("R2_SECRET_KEY");
			Ok(Arc::new(R2TileStore::new(format!("{}/{bucket}", service_url.trim_end_matches('/')))))
		}
		Ok("Local") | Err(_) => {
			let path = std::env::var("LOCAL_TILE_STORE_PATH").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("./tile-store"));
			Ok(Arc::new(LocalTileStore::new(path)))
		}
		Ok(other) => bail!("unknown TILE_STORE_PROVIDER '{other}', expected 'Local' or 'R2'"),
	}
}
