//! An opaque 16-byte MD5 digest (§3), used for content keys, encoding keys,
//! tile identity, and composition hashes alike.
//!
//! Stored as two `u64` halves rather than `[u8; 16]` so equality and ordering
//! compile down to a couple of integer comparisons instead of a byte-by-byte
//! loop, per the value-type design notes (§9).

use anyhow::{Result, bail};
use md5::{Digest, Md5};
use std::fmt;

#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ContentHash {
	hi: u64,
	lo: u64,
}

impl ContentHash {
	#[must_use]
	pub fn from_bytes(bytes: [u8; 16]) -> Self {
		let hi = u64::from_be_bytes(bytes[0..8].try_into().unwrap());
		let lo = u64::from_be_bytes(bytes[8..16].try_into().unwrap());
		Self { hi, lo }
	}

	#[must_use]
	pub fn to_bytes(self) -> [u8; 16] {
		let mut out = [0u8; 16];
		out[0..8].copy_from_slice(&self.hi.to_be_bytes());
		out[8..16].copy_from_slice(&self.lo.to_be_bytes());
		out
	}

	/// Computes the MD5 digest of `data`.
	#[must_use]
	pub fn of(data: &[u8]) -> Self {
		let mut hasher = Md5::new();
		hasher.update(data);
		let digest: [u8; 16] = hasher.finalize().into();
		Self::from_bytes(digest)
	}

	/// Parses a 32-character hex string (either case) into a `ContentHash`.
	pub fn parse_hex(hex_str: &str) -> Result<Self> {
		if hex_str.len() != 32 {
			bail!("content hash must be 32 hex chars, got {}", hex_str.len());
		}
		let mut bytes = [0u8; 16];
		hex::decode_to_slice(hex_str, &mut bytes)?;
		Ok(Self::from_bytes(bytes))
	}

	/// Renders as 32-char lowercase hex, per the wire format in §3/§6.
	#[must_use]
	pub fn to_hex(self) -> String {
		hex::encode(self.to_bytes())
	}
}

impl fmt::Debug for ContentHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "ContentHash({})", self.to_hex())
	}
}

impl fmt::Display for ContentHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.to_hex())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn hex_round_trips() {
		let bytes = [0xde, 0xad, 0xbe, 0xef, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 0xa, 0xb];
		let hash = ContentHash::from_bytes(bytes);
		let parsed = ContentHash::parse_hex(&hash.to_hex()).unwrap();
		assert_eq!(parsed, hash);
		assert_eq!(parsed.to_bytes(), bytes);
	}

	#[test]
	fn hex_is_always_lowercase() {
		let hash = ContentHash::of(b"hello world");
		assert_eq!(hash.to_hex(), hash.to_hex().to_lowercase());
	}

	#[test]
	fn parse_accepts_uppercase_but_round_trips_lowercase() {
		let lower = ContentHash::of(b"abc").to_hex();
		let upper = lower.to_uppercase();
		assert_eq!(ContentHash::parse_hex(&upper).unwrap().to_hex(), lower);
	}

	#[test]
	fn parse_rejects_wrong_length() {
		assert!(ContentHash::parse_hex("abcd").is_err());
	}

	#[test]
	fn ordering_is_over_raw_bytes() {
		let a = ContentHash::from_bytes([0; 16]);
		let mut max = [0u8; 16];
		max[0] = 0xff;
		let b = ContentHash::from_bytes(max);
		assert!(a < b);
	}

	#[test]
	fn of_is_deterministic_md5() {
		// MD5("") = d41d8cd98f00b204e9800998ecf8427e
		assert_eq!(ContentHash::of(b"").to_hex(), "d41d8cd98f00b204e9800998ecf8427e");
	}
}
