//! WDT parser (§4.F): walks the chunk stream for the `MAID` chunk, the
//! per-tile FileDataID table that replaced listfile-path lookups. Chunk tags
//! are stored reversed on disk (`MAID` is written as the bytes `DIAM`),
//! which is why [`MAID_TAG_ON_DISK`] looks backwards.

use anyhow::{Context, Result, bail};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use wowmap_core::{ScanError, TileCoord};

const MAID_TAG_ON_DISK: &[u8; 4] = b"DIAM";
const GRID_SIZE: usize = 64;

#[derive(Debug, Default)]
pub struct WdtParser;

impl WdtParser {
	/// Returns the FileDataID for every occupied tile of a 64x64 WDT grid
	/// (§9 — a WDT with no `MAID` chunk is a pre-FileDataID client format
	/// this scanner does not support and is reported as [`ScanError::DataError`]
	/// rather than silently skipped).
	pub fn parse(data: &[u8]) -> Result<Vec<(TileCoord, u32)>> {
		let mut cursor = Cursor::new(data);
		while (cursor.position() as usize) + 8 <= data.len() {
			let mut tag = [0u8; 4];
			cursor.read_exact(&mut tag).context("reading WDT chunk tag")?;
			let size = cursor.read_u32::<LittleEndian>().context("reading WDT chunk size")? as usize;

			let start = cursor.position() as usize;
			let end = start.checked_add(size).filter(|&e| e <= data.len()).ok_or_else(|| ScanError::DataError("WDT chunk size exceeds file length".into()))?;

			if &tag == MAID_TAG_ON_DISK {
				return parse_maid(&data[start..end]);
			}
			cursor.set_position(end as u64);
		}
		bail!(ScanError::DataError("WDT file has no MAID chunk".into()))
	}
}

fn parse_maid(body: &[u8]) -> Result<Vec<(TileCoord, u32)>> {
	// Each tile entry carries seven FileDataIDs (root ADT, obj0 ADT, tex0,
	// lod, map texture, map texture n, minimap); only the last is the
	// minimap tile id a scan keys off of.
	const FIELDS_PER_ENTRY: usize = 7;
	const ENTRY_SIZE: usize = FIELDS_PER_ENTRY * 4;
	let expected_len = GRID_SIZE * GRID_SIZE * ENTRY_SIZE;
	if body.len() < expected_len {
		bail!(ScanError::DataError(format!("MAID chunk too short: {} bytes, expected {expected_len}", body.len())));
	}

	let mut tiles = Vec::new();
	let mut cursor = Cursor::new(body);
	for y in 0..GRID_SIZE {
		for x in 0..GRID_SIZE {
			for _ in 0..FIELDS_PER_ENTRY - 1 {
				cursor.read_u32::<LittleEndian>()?;
			}
			let minimap_file_id = cursor.read_u32::<LittleEndian>()?;
			if minimap_file_id != 0 {
				tiles.push((TileCoord::new(x as i32, y as i32), minimap_file_id));
			}
		}
	}
	Ok(tiles)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn wdt_with_maid(tiles: &[(usize, usize, u32)]) -> Vec<u8> {
		let mut maid_body = vec![0u8; 64 * 64 * 28];
		for &(x, y, file_id) in tiles {
			let offset = (y * 64 + x) * 28 + 24; // 7th u32 of the entry
			maid_body[offset..offset + 4].copy_from_slice(&file_id.to_le_bytes());
		}

		let mut data = Vec::new();
		// an unrelated leading chunk, to exercise the skip-forward path
		data.extend_from_slice(b"REVM");
		data.extend_from_slice(&4u32.to_le_bytes());
		data.extend_from_slice(&[0u8; 4]);

		data.extend_from_slice(MAID_TAG_ON_DISK);
		data.extend_from_slice(&(maid_body.len() as u32).to_le_bytes());
		data.extend_from_slice(&maid_body);
		data
	}

	#[test]
	fn extracts_occupied_tiles_from_the_maid_chunk() {
		let data = wdt_with_maid(&[(3, 4, 775971), (0, 0, 1)]);
		let tiles = WdtParser::parse(&data).unwrap();
		assert_eq!(tiles.len(), 2);
		assert!(tiles.contains(&(TileCoord::new(3, 4), 775971)));
		assert!(tiles.contains(&(TileCoord::new(0, 0), 1)));
	}

	#[test]
	fn missing_maid_chunk_is_a_data_error() {
		let mut data = Vec::new();
		data.extend_from_slice(b"REVM");
		data.extend_from_slice(&4u32.to_le_bytes());
		data.extend_from_slice(&[0u8; 4]);
		assert!(WdtParser::parse(&data).is_err());
	}
}
