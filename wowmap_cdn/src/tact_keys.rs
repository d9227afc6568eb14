//! The TACT decryption key registry (§3 `TACTKey`, §5, §9): process-wide,
//! written through a single entry point, read without blocking writers on
//! the hot BLTE-decode path.

use dashmap::DashMap;
use std::fmt;

/// `key_name` is the 16-hex-char (8-byte) name from the upstream key list
/// (§6); `key` is the 16-byte AES key itself.
#[derive(Default)]
pub struct TactKeyRegistry {
	keys: DashMap<u64, [u8; 16]>,
}

impl TactKeyRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set(&self, key_name: u64, key: [u8; 16]) {
		self.keys.insert(key_name, key);
	}

	pub fn lookup(&self, key_name: u64) -> Option<[u8; 16]> {
		self.keys.get(&key_name).map(|entry| *entry.value())
	}

	pub fn contains(&self, key_name: u64) -> bool {
		self.keys.contains_key(&key_name)
	}

	pub fn len(&self) -> usize {
		self.keys.len()
	}

	pub fn is_empty(&self) -> bool {
		self.keys.is_empty()
	}
}

impl fmt::Debug for TactKeyRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "TactKeyRegistry({} keys)", self.keys.len())
	}
}

/// Parses one line of the upstream key list (§6): a 16-hex-char key name at
/// byte offsets `0..16`, a space, then a 32-hex-char key at `17..49`. Trailing
/// fields are ignored, but the fixed offsets are load-bearing.
pub fn parse_key_list_line(line: &str) -> Option<(u64, [u8; 16])> {
	if line.len() < 49 {
		return None;
	}
	let bytes = line.as_bytes();
	if bytes[16] != b' ' {
		return None;
	}
	let name_hex = &line[0..16];
	let key_hex = &line[17..49];
	let key_name = u64::from_str_radix(name_hex, 16).ok()?;
	let mut key = [0u8; 16];
	hex::decode_to_slice(key_hex, &mut key).ok()?;
	Some((key_name, key))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn set_then_lookup_round_trips() {
		let registry = TactKeyRegistry::new();
		assert!(registry.lookup(0x1234).is_none());
		registry.set(0x1234, [7u8; 16]);
		assert_eq!(registry.lookup(0x1234), Some([7u8; 16]));
	}

	#[test]
	fn parses_key_list_line_at_fixed_offsets() {
		let line = "1234567890ABCDEF 00112233445566778899AABBCCDDEEFF extra ignored";
		let (name, key) = parse_key_list_line(line).unwrap();
		assert_eq!(name, 0x1234567890ABCDEFu64);
		assert_eq!(key, [0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
	}

	#[test]
	fn rejects_short_or_malformed_lines() {
		assert!(parse_key_list_line("short").is_none());
		assert!(parse_key_list_line(&"x".repeat(60)).is_none());
	}
}
