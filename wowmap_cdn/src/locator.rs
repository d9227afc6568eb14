//! `ResourceLocator` (§4.B): turns a [`ResourceDescriptor`] into a cached,
//! locally-readable handle, downloading from a list of CDN hosts (tried in
//! order, with per-host retry) the first time a resource is requested and
//! serving every later request straight from disk.

use crate::rate_limiter::RateLimiter;
use crate::retry::{RetryPolicy, is_retryable_status, retry};
use crate::{ResourceDescriptor, ResourceKind, TactKeyRegistry, blte};
use anyhow::{Context, Result, bail};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use wowmap_core::io::{DataReader, DataReaderFile, DataReaderTrait};
use wowmap_core::{Blob, ScanError};

#[derive(Clone, Debug)]
pub struct LocatorConfig {
	/// On-disk cache root; see [`ResourceDescriptor::cache_path`] for the
	/// layout beneath it.
	pub cache_dir: PathBuf,
	/// CDN hostnames, tried in order for every resource (§4.B, §9 — the list
	/// comes from `--additional-cdn` plus hard-coded defaults, never from a
	/// product's CDN config).
	pub cdn_hosts: Vec<String>,
	/// CDN path stem for the product, e.g. `tpr/wow`.
	pub cdn_path: String,
	pub concurrency: usize,
	pub retry: RetryPolicy,
}

impl LocatorConfig {
	pub fn new(cache_dir: impl Into<PathBuf>, cdn_hosts: Vec<String>, cdn_path: impl Into<String>) -> Self {
		Self {
			cache_dir: cache_dir.into(),
			cdn_hosts,
			cdn_path: cdn_path.into(),
			concurrency: num_cpus::get(),
			retry: RetryPolicy::default(),
		}
	}
}

pub struct ResourceLocator {
	config: LocatorConfig,
	client: reqwest::Client,
	keys: Arc<TactKeyRegistry>,
	rate_limiter: RateLimiter,
	semaphore: Semaphore,
	inflight: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl ResourceLocator {
	pub fn new(config: LocatorConfig, keys: Arc<TactKeyRegistry>) -> Result<Self> {
		let client = reqwest::Client::builder().build().context("building CDN http client")?;
		let concurrency = config.concurrency.max(1);
		Ok(Self {
			config,
			client,
			keys,
			rate_limiter: RateLimiter::default(),
			semaphore: Semaphore::new(concurrency),
			inflight: DashMap::new(),
		})
	}

	/// Resolves `descriptor` to a readable handle, downloading and caching it
	/// if it isn't already on disk.
	pub async fn open_handle(&self, descriptor: &ResourceDescriptor) -> Result<DataReader> {
		let cache_path = self.config.cache_dir.join(descriptor.cache_path());
		self.ensure_cached(descriptor, &cache_path).await?;
		Ok(DataReaderFile::from_path(&cache_path)?)
	}

	/// Like [`Self::open_handle`], but the cached body is the BLTE-decoded
	/// payload rather than the raw archive bytes (§4.C).
	pub async fn open_compressed_handle(&self, descriptor: &ResourceDescriptor) -> Result<DataReader> {
		let raw_path = self.config.cache_dir.join(descriptor.cache_path());
		self.ensure_cached(descriptor, &raw_path).await?;

		let mut decompressed = descriptor.clone();
		decompressed.kind = ResourceKind::Decompressed;
		let decoded_path = self.config.cache_dir.join("decoded").join(raw_path.strip_prefix(&self.config.cache_dir).unwrap_or(&raw_path));

		if !decoded_path.exists() {
			let lock = self.path_lock(&decoded_path);
			let _guard = lock.lock().await;
			if !decoded_path.exists() {
				let raw = Blob::load_from_file(&raw_path)?;
				let decoded = blte::parse_blte(raw.as_slice(), &self.keys)?;
				write_atomic(&decoded_path, &decoded)?;
			}
		}
		Ok(DataReaderFile::from_path(&decoded_path)?)
	}

	/// Wraps a file that already lives on local disk (e.g. a config-supplied
	/// `TACTKeys.txt`) without involving the CDN at all.
	pub fn create_local_handle(&self, path: &Path) -> Result<DataReader> {
		Ok(DataReaderFile::from_path(path)?)
	}

	/// Downloads `descriptor` straight into memory without touching the
	/// on-disk cache, used for small one-shot fetches like version checks.
	pub async fn open_stream(&self, descriptor: &ResourceDescriptor) -> Result<Blob> {
		self.fetch(descriptor).await
	}

	async fn ensure_cached(&self, descriptor: &ResourceDescriptor, cache_path: &Path) -> Result<()> {
		if cache_path.exists() {
			return Ok(());
		}
		let lock = self.path_lock(cache_path);
		let _guard = lock.lock().await;
		if cache_path.exists() {
			return Ok(());
		}
		let blob = self.fetch(descriptor).await?;
		if let Some(content_key) = descriptor.content_key {
			let actual = blob.md5();
			if actual != content_key {
				bail!(ScanError::IntegrityError {
					expected: content_key.to_hex(),
					actual: actual.to_hex(),
				});
			}
		}
		write_atomic(cache_path, blob.as_slice())
	}

	/// Returns the per-path mutex used to coalesce concurrent fetches of the
	/// same resource, dropping the registry entry once nobody else holds it.
	fn path_lock(&self, path: &Path) -> Arc<Mutex<()>> {
		let entry = self.inflight.entry(path.to_path_buf()).or_insert_with(|| Arc::new(Mutex::new(())));
		let lock = entry.clone();
		drop(entry);
		self.inflight.retain(|_, v| Arc::strong_count(v) > 1);
		lock
	}

	async fn fetch(&self, descriptor: &ResourceDescriptor) -> Result<Blob> {
		if let Some(local_path) = &descriptor.local_path {
			return Blob::load_from_file(local_path);
		}
		let suffix = descriptor.remote_suffix();
		let mut last_err = None;
		for host in &self.config.cdn_hosts {
			let url = format!("https://{host}/{}/{suffix}", self.config.cdn_path);
			match self.fetch_from_host(&url, descriptor).await {
				Ok(Some(blob)) => return Ok(blob),
				Ok(None) => continue,
				Err(err) => last_err = Some(err),
			}
		}
		Err(last_err.unwrap_or_else(|| ScanError::MissingResource(suffix).into()))
	}

	/// Fetches from a single host, retrying transient failures. Returns
	/// `Ok(None)` on a 404 so the caller moves on to the next host.
	async fn fetch_from_host(&self, url: &str, descriptor: &ResourceDescriptor) -> Result<Option<Blob>> {
		let _permit = self.semaphore.acquire().await.expect("semaphore never closed");
		retry(self.config.retry, |_attempt| async {
			self.rate_limiter.acquire().await;
			let mut request = self.client.get(url);
			if descriptor.is_ranged() {
				let offset = descriptor.offset.unwrap_or(0);
				let length = descriptor.length.unwrap_or(0);
				request = request.header("Range", format!("bytes={offset}-{}", offset + length.saturating_sub(1)));
			}
			let response = request.send().await.with_context(|| format!("requesting {url}"))?;
			let status = response.status();
			if status == reqwest::StatusCode::NOT_FOUND {
				return Ok(None);
			}
			if status.is_success() || status == reqwest::StatusCode::PARTIAL_CONTENT {
				let bytes = response.bytes().await.with_context(|| format!("reading body of {url}"))?;
				return Ok(Some(Blob::from(&*bytes)));
			}
			if is_retryable_status(status) {
				bail!("transient status {status} from {url}");
			}
			bail!("unexpected status {status} from {url}");
		})
		.await
	}
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
	if let Some(parent) = path.parent() {
		std::fs::create_dir_all(parent).with_context(|| format!("creating cache directory {}", parent.display()))?;
	}
	let tmp_path = path.with_extension("tmp");
	std::fs::write(&tmp_path, data).with_context(|| format!("writing {}", tmp_path.display()))?;
	std::fs::rename(&tmp_path, path).with_context(|| format!("renaming into place {}", path.display()))?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use wowmap_core::ContentHash;

	#[tokio::test]
	async fn local_descriptor_is_read_without_touching_cache() {
		let dir = tempfile::tempdir().unwrap();
		let local_file = dir.path().join("TACTKeys.txt");
		std::fs::write(&local_file, b"local contents").unwrap();

		let descriptor = ResourceDescriptor {
			product: "wow".into(),
			kind: ResourceKind::Config,
			encoding_key: None,
			content_key: None,
			offset: None,
			length: None,
			remote_path: None,
			local_path: Some(local_file.clone()),
		};

		let config = LocatorConfig::new(dir.path().join("cache"), vec![], "tpr/wow");
		let locator = ResourceLocator::new(config, Arc::new(TactKeyRegistry::new())).unwrap();
		let blob = locator.fetch(&descriptor).await.unwrap();
		assert_eq!(blob.as_slice(), b"local contents");
	}

	#[test]
	fn path_lock_is_dropped_once_unused() {
		let dir = tempfile::tempdir().unwrap();
		let config = LocatorConfig::new(dir.path(), vec![], "tpr/wow");
		let locator = ResourceLocator::new(config, Arc::new(TactKeyRegistry::new())).unwrap();
		let path = dir.path().join("content/ab/cd/abcd");
		{
			let _lock = locator.path_lock(&path);
			assert_eq!(locator.inflight.len(), 1);
		}
		locator.inflight.retain(|_, v| Arc::strong_count(v) > 1);
		assert_eq!(locator.inflight.len(), 0);
	}

	#[test]
	fn content_hash_round_trips_through_hex() {
		let hash = ContentHash::of(b"hello");
		assert_eq!(ContentHash::parse_hex(&hash.to_hex()).unwrap(), hash);
	}
}
