//! A simple wrapper around [`Vec<u8>`] used for file bodies moving through the
//! locator, BLTE codec, and tile encoder.

use super::ByteRange;
use anyhow::{Result, bail};
use std::fmt::Debug;
use std::path::Path;

#[derive(Clone, PartialEq, Eq)]
pub struct Blob(Vec<u8>);

impl Blob {
	#[must_use]
	pub fn new_empty() -> Blob {
		Blob(Vec::new())
	}

	#[must_use]
	pub fn as_slice(&self) -> &[u8] {
		self.0.as_ref()
	}

	#[must_use]
	pub fn into_vec(self) -> Vec<u8> {
		self.0
	}

	#[must_use]
	pub fn len(&self) -> u64 {
		self.0.len() as u64
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Returns the bytes in the given [`ByteRange`], bounds-checked.
	pub fn read_range(&self, range: &ByteRange) -> Result<Blob> {
		if range.offset + range.length > self.0.len() as u64 {
			bail!("read outside range: blob has {} bytes, range is {range:?}", self.0.len());
		}
		Ok(Blob::from(&self.0[range.as_range_usize()]))
	}

	pub fn save_to_file(&self, path: &Path) -> Result<()> {
		std::fs::write(path, &self.0)?;
		Ok(())
	}

	pub fn load_from_file(path: &Path) -> Result<Self> {
		Ok(Blob::from(std::fs::read(path)?))
	}

	/// MD5 of the underlying bytes, used both for content-key validation
	/// (§4.D) and for the tile encoder's output hash (§4.H).
	#[must_use]
	pub fn md5(&self) -> ContentHash {
		ContentHash::of(&self.0)
	}
}

use super::ContentHash;

impl From<Vec<u8>> for Blob {
	fn from(item: Vec<u8>) -> Self {
		Blob(item)
	}
}

impl From<&[u8]> for Blob {
	fn from(item: &[u8]) -> Self {
		Blob(item.to_vec())
	}
}

impl<const N: usize> From<&[u8; N]> for Blob {
	fn from(item: &[u8; N]) -> Self {
		Blob(item.to_vec())
	}
}

impl Debug for Blob {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "Blob({} bytes)", self.0.len())
	}
}

impl Default for Blob {
	fn default() -> Self {
		Self::new_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn read_range_bounds_checked() {
		let blob = Blob::from(b"abcdef".as_slice());
		let ok = blob.read_range(&ByteRange::new(2, 3)).unwrap();
		assert_eq!(ok.as_slice(), b"cde");

		let err = blob.read_range(&ByteRange::new(4, 10));
		assert!(err.is_err());
	}

	#[test]
	fn save_and_load_round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("blob.bin");
		let original = Blob::from(vec![1u8, 2, 3, 4]);
		original.save_to_file(&path).unwrap();
		let loaded = Blob::load_from_file(&path).unwrap();
		assert_eq!(loaded, original);
	}

	#[test]
	fn md5_is_deterministic() {
		let a = Blob::from(b"hello".as_slice());
		let b = Blob::from(b"hello".as_slice());
		assert_eq!(a.md5(), b.md5());
	}
}
