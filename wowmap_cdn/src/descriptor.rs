//! `ResourceDescriptor` — the opaque handle the filesystem resolver (§4.D)
//! hands to the locator, and the cache-path derivation rule from §4.B.

use std::path::PathBuf;
use wowmap_core::ContentHash;

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum ResourceKind {
	Config,
	Data,
	Indice,
	/// Produced by [`crate::ResourceLocator::open_compressed_handle`]: the
	/// body is already BLTE-decoded.
	Decompressed,
}

#[derive(Clone, Debug)]
pub struct ResourceDescriptor {
	pub product: String,
	pub kind: ResourceKind,
	pub encoding_key: Option<ContentHash>,
	pub content_key: Option<ContentHash>,
	pub offset: Option<u64>,
	pub length: Option<u64>,
	pub remote_path: Option<String>,
	pub local_path: Option<PathBuf>,
}

impl ResourceDescriptor {
	pub fn config(product: &str, content_key: ContentHash) -> Self {
		Self {
			product: product.to_string(),
			kind: ResourceKind::Config,
			encoding_key: None,
			content_key: Some(content_key),
			offset: None,
			length: None,
			remote_path: None,
			local_path: None,
		}
	}

	pub fn data(product: &str, encoding_key: ContentHash) -> Self {
		Self {
			product: product.to_string(),
			kind: ResourceKind::Data,
			encoding_key: Some(encoding_key),
			content_key: None,
			offset: None,
			length: None,
			remote_path: None,
			local_path: None,
		}
	}

	pub fn ranged(product: &str, encoding_key: ContentHash, offset: u64, length: u64) -> Self {
		Self {
			offset: Some(offset),
			length: Some(length),
			..Self::data(product, encoding_key)
		}
	}

	pub fn indice(product: &str, encoding_key: ContentHash) -> Self {
		Self {
			kind: ResourceKind::Indice,
			..Self::data(product, encoding_key)
		}
	}

	pub fn is_ranged(&self) -> bool {
		self.offset.is_some() || self.length.is_some()
	}

	/// The remote path to request from a CDN host, relative to its `dataStem`
	/// (§6). Config/Indice entries hang off the config stem implicitly by way
	/// of their own `remote_path`.
	pub fn remote_suffix(&self) -> String {
		if let Some(path) = &self.remote_path {
			return path.clone();
		}
		let hex = self
			.content_key
			.or(self.encoding_key)
			.expect("descriptor must carry a content or encoding key when remote_path is unset")
			.to_hex();
		format!("{}/{}/{}", &hex[0..2], &hex[2..4], hex)
	}

	/// Computes the cache-relative path per the derivation rule in §4.B:
	/// content key wins over a ranged encoding key, which wins over a bare
	/// encoding key, which wins over a verbatim local path.
	pub fn cache_path(&self) -> PathBuf {
		if let Some(key) = self.content_key {
			if !key.to_bytes().iter().all(|b| *b == 0) {
				return content_addressed_path("content", key);
			}
		}
		if let Some(key) = self.encoding_key {
			if self.is_ranged() {
				let offset = self.offset.unwrap_or(0);
				let length = self.length.unwrap_or(0);
				let hex = key.to_hex();
				return PathBuf::from("segments")
					.join(&hex[0..2])
					.join(&hex[2..4])
					.join(format!("{hex}_{offset:016x}_{length:016x}"));
			}
			return content_addressed_path("data", key);
		}
		self
			.local_path
			.clone()
			.expect("descriptor must carry a content key, encoding key, or local path")
	}
}

fn content_addressed_path(bucket: &str, key: ContentHash) -> PathBuf {
	let hex = key.to_hex();
	PathBuf::from(bucket).join(&hex[0..2]).join(&hex[2..4]).join(hex)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn hash(byte: u8) -> ContentHash {
		let mut bytes = [0u8; 16];
		bytes[0] = byte;
		ContentHash::from_bytes(bytes)
	}

	#[test]
	fn content_key_wins_and_uses_content_bucket() {
		let d = ResourceDescriptor::config("wow", hash(0xab));
		let path = d.cache_path();
		assert!(path.starts_with("content"));
		assert!(path.to_string_lossy().ends_with(&hash(0xab).to_hex()));
	}

	#[test]
	fn ranged_encoding_key_uses_segments_bucket_with_offset_and_length() {
		let d = ResourceDescriptor::ranged("wow", hash(0x12), 100, 200);
		let path = d.cache_path();
		assert!(path.starts_with("segments"));
		let name = path.file_name().unwrap().to_string_lossy().into_owned();
		assert!(name.contains(&format!("{:016x}", 100u64)));
		assert!(name.contains(&format!("{:016x}", 200u64)));
	}

	#[test]
	fn unranged_encoding_key_uses_data_bucket() {
		let d = ResourceDescriptor::data("wow", hash(0x34));
		assert!(d.cache_path().starts_with("data"));
	}

	#[test]
	fn local_path_used_verbatim_when_no_keys_present() {
		let d = ResourceDescriptor {
			product: "wow".into(),
			kind: ResourceKind::Config,
			encoding_key: None,
			content_key: None,
			offset: None,
			length: None,
			remote_path: None,
			local_path: Some(PathBuf::from("TACTKeys.txt")),
		};
		assert_eq!(d.cache_path(), PathBuf::from("TACTKeys.txt"));
	}
}
