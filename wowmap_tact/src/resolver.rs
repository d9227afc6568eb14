//! Ties the build config, encoding table, root file, and compounding index
//! together into the single entry point the scanner uses: "give me the bytes
//! for this FileDataID" (§4.D, §4.I).

use crate::{CompoundingIndex, EncodingFile, FileIndex, RootFile};
use anyhow::{Context, Result, bail};
use log::debug;
use std::sync::Arc;
use wowmap_cdn::{ResourceDescriptor, ResourceLocator};
use wowmap_core::io::DataReaderTrait;
use wowmap_core::{Blob, ContentHash, ScanError};

pub struct BuildResolver {
	product: String,
	locator: Arc<ResourceLocator>,
	encoding: EncodingFile,
	root: RootFile,
	compounding: CompoundingIndex,
	file_index: FileIndex,
}

impl BuildResolver {
	pub fn new(product: impl Into<String>, locator: Arc<ResourceLocator>, encoding: EncodingFile, root: RootFile, compounding: CompoundingIndex, file_index: FileIndex) -> Self {
		Self {
			product: product.into(),
			locator,
			encoding,
			root,
			compounding,
			file_index,
		}
	}

	pub fn root(&self) -> &RootFile {
		&self.root
	}

	/// Open for a FileDataID without a post-decode integrity check; used for
	/// catalog files (WDT, map table) where the decompressed body's MD5 isn't
	/// separately known ahead of time.
	pub async fn open_by_file_id(&self, file_id: u32) -> Result<Blob> {
		let content_key = self
			.root
			.content_key_for_file_id(file_id)
			.ok_or_else(|| ScanError::MissingResource(format!("fileDataID {file_id}")))?;
		self.open_by_content_key(content_key, false).await
	}

	/// Resolves `content_key` through the compounding index first, the loose
	/// file index second, and a bare loose-data fetch as a last resort
	/// (§4.D). When `validate` is set, the decompressed body's MD5 is
	/// recomputed and checked against `content_key` before returning.
	pub async fn open_by_content_key(&self, content_key: ContentHash, validate: bool) -> Result<Blob> {
		let (encoding_key, _size) = self
			.encoding
			.resolve(&content_key)
			.ok_or_else(|| ScanError::MissingResource(format!("content key {}", content_key.to_hex())))?;

		let descriptor = match self.compounding.locate(&encoding_key) {
			Some(location) => ResourceDescriptor::ranged(&self.product, location.archive, location.range.offset, location.range.length),
			None => {
				if self.file_index.locate(&encoding_key).is_none() {
					debug!("encoding key {} absent from both the compounding index and the file index, falling back to a bare fetch", encoding_key.to_hex());
				}
				ResourceDescriptor::data(&self.product, encoding_key)
			}
		};

		let reader = self.locator.open_compressed_handle(&descriptor).await.with_context(|| format!("opening encoding key {}", encoding_key.to_hex()))?;
		let body = reader.read_all().await?;

		if validate {
			let actual = body.md5();
			if actual != content_key {
				bail!(ScanError::IntegrityError {
					expected: content_key.to_hex(),
					actual: actual.to_hex(),
				});
			}
		}
		Ok(body)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use wowmap_cdn::{LocatorConfig, TactKeyRegistry};

	#[test]
	fn missing_file_id_is_not_resolved() {
		let root = RootFile::default();
		assert!(root.content_key_for_file_id(42).is_none());
	}

	#[test]
	fn missing_content_key_is_not_resolved() {
		let encoding = EncodingFile::default();
		assert!(encoding.resolve(&ContentHash::from_bytes([0u8; 16])).is_none());
	}

	#[test]
	fn missing_resource_error_names_the_content_key() {
		let content_key = "a".repeat(32);
		let err = ScanError::MissingResource(content_key.clone());
		assert!(err.to_string().contains(&content_key));
	}

	/// Mirrors `EncodingFile::parse`'s own fixture shape (one page, one
	/// record) rather than reusing its private test helper, to map a single
	/// content key to a single encoding key.
	fn single_entry_encoding_file(content_key: ContentHash, encoding_key: ContentHash) -> EncodingFile {
		let page_size_kb = 1u16;
		let mut page = Vec::new();
		page.push(1u8); // key_count
		page.extend_from_slice(&1234u64.to_be_bytes()[3..8]); // file_size (5 bytes)
		page.extend_from_slice(&content_key.to_bytes());
		page.extend_from_slice(&encoding_key.to_bytes());
		page.resize(page_size_kb as usize * 1024, 0);

		let page_index_entry = [content_key.to_bytes().as_slice(), &[0u8; 16]].concat();

		let mut data = Vec::new();
		data.extend_from_slice(b"EN");
		data.push(1); // version
		data.push(16); // hash_size_ckey
		data.push(16); // hash_size_ekey
		data.extend_from_slice(&page_size_kb.to_be_bytes());
		data.extend_from_slice(&page_size_kb.to_be_bytes());
		data.extend_from_slice(&1u32.to_be_bytes()); // ckey_page_count
		data.extend_from_slice(&0u32.to_be_bytes()); // ekey_page_count
		data.push(0); // unk
		data.extend_from_slice(&0u32.to_be_bytes()); // espec_block_size
		data.extend_from_slice(&page_index_entry);
		data.extend_from_slice(&page);
		EncodingFile::parse(&data).unwrap()
	}

	/// Pre-populates the locator's on-disk cache with an unframed ('N')
	/// BLTE body at the loose-data cache path for `encoding_key`, so a test
	/// resolver never needs a live CDN host.
	fn seed_loose_cache(cache_dir: &std::path::Path, product: &str, encoding_key: ContentHash, plaintext: &[u8]) {
		let cache_path = cache_dir.join(ResourceDescriptor::data(product, encoding_key).cache_path());
		std::fs::create_dir_all(cache_path.parent().unwrap()).unwrap();
		let mut data = b"BLTE".to_vec();
		data.extend_from_slice(&0u32.to_be_bytes());
		data.push(b'N');
		data.extend_from_slice(plaintext);
		std::fs::write(&cache_path, data).unwrap();
	}

	fn resolver_over(cache_dir: &std::path::Path, encoding: EncodingFile) -> BuildResolver {
		let locator_config = LocatorConfig::new(cache_dir, Vec::new(), "tpr/wow");
		let locator = Arc::new(ResourceLocator::new(locator_config, Arc::new(TactKeyRegistry::new())).unwrap());
		BuildResolver::new("wow", locator, encoding, RootFile::default(), CompoundingIndex::new(), FileIndex::new())
	}

	#[tokio::test]
	async fn validate_true_accepts_a_body_that_hashes_to_the_declared_content_key() {
		let cache_dir = tempfile::tempdir().unwrap();
		let plaintext = b"a correctly identified tile body".to_vec();
		let content_key = ContentHash::of(&plaintext);
		let encoding_key = ContentHash::from_bytes([0x22u8; 16]);

		seed_loose_cache(cache_dir.path(), "wow", encoding_key, &plaintext);
		let resolver = resolver_over(cache_dir.path(), single_entry_encoding_file(content_key, encoding_key));

		let body = resolver.open_by_content_key(content_key, true).await.unwrap();
		assert_eq!(body.as_slice(), plaintext.as_slice());
	}

	#[tokio::test]
	async fn validate_true_rejects_a_body_that_does_not_hash_to_the_declared_content_key() {
		let cache_dir = tempfile::tempdir().unwrap();
		let plaintext = b"a tampered or mislabeled tile body".to_vec();
		// Declared identity deliberately doesn't match the body's real MD5.
		let content_key = ContentHash::from_bytes([0x11u8; 16]);
		let encoding_key = ContentHash::from_bytes([0x22u8; 16]);

		seed_loose_cache(cache_dir.path(), "wow", encoding_key, &plaintext);
		let resolver = resolver_over(cache_dir.path(), single_entry_encoding_file(content_key, encoding_key));

		let err = resolver.open_by_content_key(content_key, true).await.unwrap_err();
		assert!(matches!(err.downcast_ref::<ScanError>(), Some(ScanError::IntegrityError { .. })));
	}

	#[tokio::test]
	async fn validate_false_does_not_check_the_body_hash() {
		let cache_dir = tempfile::tempdir().unwrap();
		let plaintext = b"a catalog body, never hash-checked".to_vec();
		let content_key = ContentHash::from_bytes([0x11u8; 16]);
		let encoding_key = ContentHash::from_bytes([0x22u8; 16]);

		seed_loose_cache(cache_dir.path(), "wow", encoding_key, &plaintext);
		let resolver = resolver_over(cache_dir.path(), single_entry_encoding_file(content_key, encoding_key));

		let body = resolver.open_by_content_key(content_key, false).await.unwrap();
		assert_eq!(body.as_slice(), plaintext.as_slice());
	}
}
