//! The encoding file (§4.D): maps a content key to the encoding key(s) that
//! store it on the CDN, and an encoding key to its archived size. Only the
//! content-key table is decoded in full; the encoding-key table exists in
//! every real encoding file but nothing here currently needs it, so its
//! bytes are skipped rather than parsed.

use anyhow::{Context, Result, bail};
use byteorder::{BigEndian, ReadBytesExt};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use wowmap_core::{ContentHash, ScanError};

#[derive(Debug, Clone)]
struct ContentKeyEntry {
	encoding_keys: Vec<ContentHash>,
	file_size: u64,
}

#[derive(Debug, Default)]
pub struct EncodingFile {
	by_content_key: HashMap<ContentHash, ContentKeyEntry>,
}

impl EncodingFile {
	pub fn parse(data: &[u8]) -> Result<Self> {
		let mut cursor = Cursor::new(data);
		let mut magic = [0u8; 2];
		cursor.read_exact(&mut magic).context("reading encoding file magic")?;
		if &magic != b"EN" {
			bail!(ScanError::DataError("encoding file missing EN magic".into()));
		}

		let _version = cursor.read_u8()?;
		let hash_size_ckey = cursor.read_u8()? as usize;
		let hash_size_ekey = cursor.read_u8()? as usize;
		let ckey_page_size_kb = cursor.read_u16::<BigEndian>()? as usize;
		let _ekey_page_size_kb = cursor.read_u16::<BigEndian>()? as usize;
		let ckey_page_count = cursor.read_u32::<BigEndian>()? as usize;
		let _ekey_page_count = cursor.read_u32::<BigEndian>()?;
		let _unk = cursor.read_u8()?;
		let espec_block_size = cursor.read_u32::<BigEndian>()? as usize;

		// ESpec string block: not interpreted here, only skipped.
		cursor.set_position(cursor.position() + espec_block_size as u64);

		// Page index: one (first_key, page_md5) pair per page, both
		// `hash_size_ckey`/16 bytes, used for binary search in the real
		// client. We read every page sequentially instead, so the index is
		// skipped over rather than consulted.
		let page_index_entry_size = hash_size_ckey + 16;
		cursor.set_position(cursor.position() + (page_index_entry_size * ckey_page_count) as u64);

		let page_size_bytes = ckey_page_size_kb * 1024;
		let mut by_content_key = HashMap::new();
		for _ in 0..ckey_page_count {
			let page_start = cursor.position();
			parse_ckey_page(&mut cursor, hash_size_ckey, hash_size_ekey, &mut by_content_key)?;
			cursor.set_position(page_start + page_size_bytes as u64);
		}

		Ok(Self { by_content_key })
	}

	pub fn resolve(&self, content_key: &ContentHash) -> Option<(ContentHash, u64)> {
		let entry = self.by_content_key.get(content_key)?;
		let encoding_key = *entry.encoding_keys.first()?;
		Some((encoding_key, entry.file_size))
	}

	pub fn len(&self) -> usize {
		self.by_content_key.len()
	}

	pub fn is_empty(&self) -> bool {
		self.by_content_key.is_empty()
	}
}

fn parse_ckey_page(cursor: &mut Cursor<&[u8]>, hash_size_ckey: usize, hash_size_ekey: usize, out: &mut HashMap<ContentHash, ContentKeyEntry>) -> Result<()> {
	loop {
		let key_count = match cursor.read_u8() {
			Ok(0) => break, // padding
			Ok(n) => n as usize,
			Err(_) => break,
		};
		let mut size_buf = [0u8; 8];
		cursor.read_exact(&mut size_buf[3..8]).context("reading encoding entry file size")?;
		let file_size = u64::from_be_bytes(size_buf);

		let content_key = read_hash(cursor, hash_size_ckey)?;
		let mut encoding_keys = Vec::with_capacity(key_count);
		for _ in 0..key_count {
			encoding_keys.push(read_hash(cursor, hash_size_ekey)?);
		}
		out.insert(content_key, ContentKeyEntry { encoding_keys, file_size });
	}
	Ok(())
}

fn read_hash(cursor: &mut Cursor<&[u8]>, size: usize) -> Result<ContentHash> {
	let mut buf = [0u8; 16];
	cursor.read_exact(&mut buf[..size.min(16)]).context("reading encoding hash")?;
	Ok(ContentHash::from_bytes(buf))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_key(byte: u8) -> [u8; 16] {
		let mut key = [0u8; 16];
		key[0] = byte;
		key
	}

	fn build_sample(page_size_kb: u16) -> Vec<u8> {
		let ckey = sample_key(0x11);
		let ekey = sample_key(0x22);

		let mut page = Vec::new();
		page.push(1u8); // key_count
		page.extend_from_slice(&1234u64.to_be_bytes()[3..8]); // file_size (5 bytes)
		page.extend_from_slice(&ckey);
		page.extend_from_slice(&ekey);
		page.resize(page_size_kb as usize * 1024, 0);

		let page_index_entry = [ckey.as_slice(), &[0u8; 16]].concat();

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
		data
	}

	#[test]
	fn resolves_content_key_to_encoding_key_and_size() {
		let data = build_sample(1);
		let encoding = EncodingFile::parse(&data).unwrap();
		let content_key = ContentHash::from_bytes(sample_key(0x11));
		let (encoding_key, size) = encoding.resolve(&content_key).unwrap();
		assert_eq!(encoding_key, ContentHash::from_bytes(sample_key(0x22)));
		assert_eq!(size, 1234);
	}

	#[test]
	fn rejects_wrong_magic() {
		assert!(EncodingFile::parse(b"XXnotanencoding").is_err());
	}

	#[test]
	fn unknown_content_key_resolves_to_none() {
		let data = build_sample(1);
		let encoding = EncodingFile::parse(&data).unwrap();
		let missing = ContentHash::from_bytes(sample_key(0xFF));
		assert!(encoding.resolve(&missing).is_none());
	}
}
