//! The tile blob store (§4.K): content-addressed storage for the encoded
//! WebP tiles themselves, separate from the relational catalog. Two
//! backends: a local directory (the worker's own cache, or a small
//! self-hosted catalog) and an S3/R2-compatible bucket reached over plain
//! unsigned HTTP — deliberately not an AWS SDK, since R2's public buckets
//! and presigned-URL uploads don't need request signing on this side.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use wowmap_core::ContentHash;

#[async_trait]
pub trait TileBlobStore: Send + Sync {
	async fn put(&self, hash: ContentHash, data: &[u8]) -> Result<()>;
	async fn get(&self, hash: ContentHash) -> Result<Option<Vec<u8>>>;
	async fn exists(&self, hash: ContentHash) -> Result<bool>;
}

pub struct LocalTileStore {
	root: PathBuf,
}

impl LocalTileStore {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	fn path_for(&self, hash: ContentHash) -> PathBuf {
		let hex = hash.to_hex();
		self.root.join(&hex[0..2]).join(&hex[2..4]).join(format!("{hex}.webp"))
	}

	/// Every hash cached under this store's root, derived from filenames
	/// rather than any index (`sync-tiles` uses this to find locally cached
	/// tiles a remote catalog may not have seen yet).
	pub fn list_hashes(&self) -> Result<Vec<ContentHash>> {
		let mut hashes = Vec::new();
		if !self.root.exists() {
			return Ok(hashes);
		}
		for xx in std::fs::read_dir(&self.root).with_context(|| format!("reading {}", self.root.display()))? {
			let xx = xx?.path();
			if !xx.is_dir() {
				continue;
			}
			for yy in std::fs::read_dir(&xx).with_context(|| format!("reading {}", xx.display()))? {
				let yy = yy?.path();
				if !yy.is_dir() {
					continue;
				}
				for entry in std::fs::read_dir(&yy).with_context(|| format!("reading {}", yy.display()))? {
					let path = entry?.path();
					let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
					if let Ok(hash) = ContentHash::parse_hex(stem) {
						hashes.push(hash);
					}
				}
			}
		}
		Ok(hashes)
	}
}

#[async_trait]
impl TileBlobStore for LocalTileStore {
	async fn put(&self, hash: ContentHash, data: &[u8]) -> Result<()> {
		let path = self.path_for(hash);
		if let Some(parent) = path.parent() {
			tokio::fs::create_dir_all(parent).await.with_context(|| format!("creating tile directory {}", parent.display()))?;
		}
		let tmp_path = path.with_extension("tmp");
		tokio::fs::write(&tmp_path, data).await.with_context(|| format!("writing {}", tmp_path.display()))?;
		tokio::fs::rename(&tmp_path, &path).await.with_context(|| format!("renaming into place {}", path.display()))?;
		Ok(())
	}

	async fn get(&self, hash: ContentHash) -> Result<Option<Vec<u8>>> {
		let path = self.path_for(hash);
		match tokio::fs::read(&path).await {
			Ok(data) => Ok(Some(data)),
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
		}
	}

	async fn exists(&self, hash: ContentHash) -> Result<bool> {
		Ok(tokio::fs::try_exists(self.path_for(hash)).await.unwrap_or(false))
	}
}

pub struct R2TileStore {
	client: reqwest::Client,
	base_url: String,
}

impl R2TileStore {
	pub fn new(base_url: impl Into<String>) -> Self {
		Self {
			client: reqwest::Client::new(),
			base_url: base_url.into(),
		}
	}

	fn url_for(&self, hash: ContentHash) -> String {
		let hex = hash.to_hex();
		format!("{}/{}/{}/{}.webp", self.base_url.trim_end_matches('/'), &hex[0..2], &hex[2..4], hex)
	}
}

#[async_trait]
impl TileBlobStore for R2TileStore {
	async fn put(&self, hash: ContentHash, data: &[u8]) -> Result<()> {
		let url = self.url_for(hash);
		let response = self
			.client
			.put(&url)
			.body(data.to_vec())
			.send()
			.await
			.with_context(|| format!("PUT {url}"))?;
		if !response.status().is_success() {
			bail!("PUT {url} returned {}", response.status());
		}
		Ok(())
	}

	async fn get(&self, hash: ContentHash) -> Result<Option<Vec<u8>>> {
		let url = self.url_for(hash);
		let response = self.client.get(&url).send().await.with_context(|| format!("GET {url}"))?;
		if response.status() == reqwest::StatusCode::NOT_FOUND {
			return Ok(None);
		}
		if !response.status().is_success() {
			bail!("GET {url} returned {}", response.status());
		}
		Ok(Some(response.bytes().await.with_context(|| format!("reading body of {url}"))?.to_vec()))
	}

	async fn exists(&self, hash: ContentHash) -> Result<bool> {
		let url = self.url_for(hash);
		let response = self.client.head(&url).send().await.with_context(|| format!("HEAD {url}"))?;
		Ok(response.status().is_success())
	}
}
