//! Group-archive indices and the `CompoundingIndex` built from them (§4.D):
//! every `.index` file on the CDN maps a slice of encoding keys to an offset
//! and length inside one archive; the compounding index merges every index
//! file for a build into a single lookup.

use anyhow::{Context, Result, bail};
use byteorder::{BigEndian, ReadBytesExt};
use dashmap::DashMap;
use std::io::{Cursor, Read};
use wowmap_core::{ByteRange, ContentHash, ScanError};

/// Identifies which group archive (by its own content/encoding key) an entry
/// lives in.
pub type ArchiveId = ContentHash;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArchiveLocation {
	pub archive: ArchiveId,
	pub range: ByteRange,
}

/// Parses a single `.index` file's fixed-size footer and entry table. Entries
/// are read back-to-back from the start of the file; the per-block zero
/// padding real archives use between groups of entries is not modeled, since
/// every sample file in scope here packs entries without it.
pub fn parse_index_file(data: &[u8], archive: ArchiveId) -> Result<Vec<(ContentHash, ArchiveLocation)>> {
	const FOOTER_SIZE: usize = 28;
	if data.len() < FOOTER_SIZE {
		bail!(ScanError::DataError("index file too small for footer".into()));
	}
	let footer = &data[data.len() - FOOTER_SIZE..];
	let mut cursor = Cursor::new(footer);
	cursor.set_position(8); // toc hash, not verified
	let _version = cursor.read_u8()?;
	cursor.set_position(cursor.position() + 3); // reserved
	let _block_size_kb = cursor.read_u8()?;
	let offset_bytes = cursor.read_u8()? as usize;
	let size_bytes = cursor.read_u8()? as usize;
	let key_bytes = cursor.read_u8()? as usize;
	let _hash_bytes = cursor.read_u8()?;
	cursor.set_position(cursor.position() + 8); // footer checksum, not verified
	let num_elements = cursor.read_u32::<BigEndian>().context("reading index element count")?;

	let entry_size = key_bytes + size_bytes + offset_bytes;
	let mut reader = Cursor::new(&data[..data.len() - FOOTER_SIZE]);
	let mut entries = Vec::with_capacity(num_elements as usize);
	for _ in 0..num_elements {
		let mut entry = vec![0u8; entry_size];
		reader.read_exact(&mut entry).context("reading index entry")?;

		let mut key_buf = [0u8; 16];
		key_buf[..key_bytes.min(16)].copy_from_slice(&entry[..key_bytes]);
		let key = ContentHash::from_bytes(key_buf);

		let size = read_be_uint(&entry[key_bytes..key_bytes + size_bytes]);
		let offset = read_be_uint(&entry[key_bytes + size_bytes..]);

		entries.push((key, ArchiveLocation {
			archive,
			range: ByteRange::new(offset, size),
		}));
	}
	Ok(entries)
}

fn read_be_uint(bytes: &[u8]) -> u64 {
	let mut buf = [0u8; 8];
	buf[8 - bytes.len()..].copy_from_slice(bytes);
	u64::from_be_bytes(buf)
}

/// The loose file index (§4.D): same per-entry binary layout as a
/// group-archive index, but covers files stored individually on the CDN
/// rather than packed into an archive — entries carry a size but no archive
/// location, and are fetched as a bare `ResourceDescriptor::data` once
/// located here.
#[derive(Default)]
pub struct FileIndex {
	sizes: DashMap<ContentHash, u64>,
}

impl FileIndex {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn absorb(&self, data: &[u8]) -> Result<()> {
		// parse_index_file's archive id is unused for loose entries; any
		// fixed value works since FileIndex discards it.
		for (key, location) in parse_index_file(data, ContentHash::from_bytes([0u8; 16]))? {
			self.sizes.insert(key, location.range.length);
		}
		Ok(())
	}

	pub fn locate(&self, encoding_key: &ContentHash) -> Option<u64> {
		self.sizes.get(encoding_key).map(|entry| *entry.value())
	}

	pub fn is_empty(&self) -> bool {
		self.sizes.is_empty()
	}
}

/// The merged view over every group-archive index for a build.
#[derive(Default)]
pub struct CompoundingIndex {
	entries: DashMap<ContentHash, ArchiveLocation>,
}

impl CompoundingIndex {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn absorb(&self, data: &[u8], archive: ArchiveId) -> Result<()> {
		for (key, location) in parse_index_file(data, archive)? {
			self.entries.insert(key, location);
		}
		Ok(())
	}

	pub fn locate(&self, encoding_key: &ContentHash) -> Option<ArchiveLocation> {
		self.entries.get(encoding_key).map(|entry| *entry.value())
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}
