//! The root file (§4.D): maps a FileDataID to a content key, one locale- and
//! content-flagged block at a time. Minimap and WDT lookups only ever need
//! the "default" locale entry, but the block structure is kept general since
//! the file format requires reading every block's entries regardless.

use anyhow::{Context, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use wowmap_core::ContentHash;

/// `enUS` in the locale bitmask used by every root block.
pub const LOCALE_EN_US: u32 = 0x2;

#[derive(Debug, Default)]
pub struct RootFile {
	by_file_id: HashMap<u32, ContentHash>,
}

impl RootFile {
	/// Parses a root file, keeping only entries whose locale mask matches
	/// `locale_mask` (or carries no locale restriction at all).
	pub fn parse(data: &[u8], locale_mask: u32) -> Result<Self> {
		let mut cursor = Cursor::new(data);
		let mut by_file_id = HashMap::new();

		while (cursor.position() as usize) < data.len() {
			let num_records = cursor.read_u32::<LittleEndian>().context("reading root block record count")?;
			let _content_flags = cursor.read_u32::<LittleEndian>()?;
			let locale_flags = cursor.read_u32::<LittleEndian>()?;

			let mut file_ids = Vec::with_capacity(num_records as usize);
			let mut running_id: i64 = -1;
			for _ in 0..num_records {
				let delta = cursor.read_i32::<LittleEndian>()?;
				running_id += delta as i64 + 1;
				file_ids.push(running_id as u32);
			}

			let matches_locale = locale_flags == 0 || (locale_flags & locale_mask) != 0;
			for &file_id in &file_ids {
				let mut content_key = [0u8; 16];
				cursor.read_exact(&mut content_key)?;
				let _name_hash = cursor.read_u64::<LittleEndian>()?;
				if matches_locale {
					by_file_id.insert(file_id, ContentHash::from_bytes(content_key));
				}
			}
		}

		Ok(Self { by_file_id })
	}

	pub fn content_key_for_file_id(&self, file_id: u32) -> Option<ContentHash> {
		self.by_file_id.get(&file_id).copied()
	}

	pub fn len(&self) -> usize {
		self.by_file_id.len()
	}

	pub fn is_empty(&self) -> bool {
		self.by_file_id.is_empty()
	}
}
