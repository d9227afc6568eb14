//! The install file (§4.D): maps a path (not a FileDataID) to a content key.
//! Tags are parsed far enough to skip their bitmasks correctly but are not
//! otherwise exposed — nothing downstream filters by install tag today.

use anyhow::{Context, Result, bail};
use byteorder::{BigEndian, ReadBytesExt};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use wowmap_core::{ContentHash, ScanError};

#[derive(Debug, Default)]
pub struct InstallFile {
	by_path: HashMap<String, ContentHash>,
}

impl InstallFile {
	pub fn parse(data: &[u8]) -> Result<Self> {
		let mut cursor = Cursor::new(data);
		let mut magic = [0u8; 2];
		cursor.read_exact(&mut magic).context("reading install file magic")?;
		if &magic != b"IN" {
			bail!(ScanError::DataError("install file missing IN magic".into()));
		}

		let _version = cursor.read_u8()?;
		let hash_size = cursor.read_u8()? as usize;
		let num_tags = cursor.read_u16::<BigEndian>()?;
		let num_entries = cursor.read_u32::<BigEndian>()?;
		let bitmask_bytes = num_entries.div_ceil(8) as u64;

		for _ in 0..num_tags {
			read_cstring(&mut cursor)?;
			let _tag_type = cursor.read_u16::<BigEndian>()?;
			cursor.set_position(cursor.position() + bitmask_bytes);
		}

		let mut by_path = HashMap::new();
		for _ in 0..num_entries {
			let path = read_cstring(&mut cursor)?;
			let mut key = [0u8; 16];
			cursor.read_exact(&mut key[..hash_size.min(16)])?;
			let _size = cursor.read_u32::<BigEndian>()?;
			by_path.insert(path, ContentHash::from_bytes(key));
		}

		Ok(Self { by_path })
	}

	pub fn content_key_for_path(&self, path: &str) -> Option<ContentHash> {
		self.by_path.get(path).copied()
	}

	pub fn len(&self) -> usize {
		self.by_path.len()
	}
}

fn read_cstring(cursor: &mut Cursor<&[u8]>) -> Result<String> {
	let mut bytes = Vec::new();
	loop {
		let byte = cursor.read_u8().context("reading install file string")?;
		if byte == 0 {
			break;
		}
		bytes.push(byte);
	}
	Ok(String::from_utf8_lossy(&bytes).into_owned())
}
