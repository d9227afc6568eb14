//! BLP2 texture decoder (§4.G). Only the formats actually used for minimap
//! tiles are supported: paletted-with-alpha (`compression == 1`) and raw
//! BGRA (`compression == 3`). DXT-compressed BLPs never show up as minimap
//! tiles in practice, so block decompression isn't implemented.

use anyhow::{Result, bail};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use wowmap_core::ScanError;

#[derive(Debug, Clone)]
pub struct RgbaImage {
	pub width: u32,
	pub height: u32,
	/// Tightly packed RGBA8, row-major, top-left origin.
	pub pixels: Vec<u8>,
}

const MIP_COUNT: usize = 16;

/// Decodes mip level 0 of a BLP2 texture. `allow_mips` gates textures that
/// carry more than one mip level (§9): when false, a texture with a second
/// mip present is rejected outright rather than silently dropping the extra
/// levels.
pub fn decode_blp(data: &[u8], allow_mips: bool) -> Result<RgbaImage> {
	let mut cursor = Cursor::new(data);
	let mut magic = [0u8; 4];
	cursor.read_exact(&mut magic)?;
	if &magic != b"BLP2" {
		bail!(ScanError::DataError("missing BLP2 magic".into()));
	}

	let _kind = cursor.read_u32::<LittleEndian>()?;
	let compression = cursor.read_u8()?;
	let alpha_depth = cursor.read_u8()?;
	let _alpha_type = cursor.read_u8()?;
	let _has_mips = cursor.read_u8()?;
	let width = cursor.read_u32::<LittleEndian>()?;
	let height = cursor.read_u32::<LittleEndian>()?;

	let mut mip_offsets = [0u32; MIP_COUNT];
	for slot in mip_offsets.iter_mut() {
		*slot = cursor.read_u32::<LittleEndian>()?;
	}
	let mut mip_sizes = [0u32; MIP_COUNT];
	for slot in mip_sizes.iter_mut() {
		*slot = cursor.read_u32::<LittleEndian>()?;
	}

	if !allow_mips && mip_offsets[1] != 0 {
		bail!(ScanError::DataError("mipped BLP texture rejected (allow_mips is false)".into()));
	}

	let mip0_start = mip_offsets[0] as usize;
	let mip0_len = mip_sizes[0] as usize;
	let mip0 = data
		.get(mip0_start..mip0_start + mip0_len)
		.ok_or_else(|| ScanError::DataError("BLP mip 0 range out of bounds".into()))?;

	let pixels = match compression {
		1 => decode_paletted(&mut Cursor::new(data), mip0, width, height, alpha_depth)?,
		3 => decode_raw_bgra(mip0, width, height)?,
		other => bail!(ScanError::DataError(format!("unsupported BLP compression mode {other}"))),
	};

	Ok(RgbaImage { width, height, pixels })
}

fn decode_paletted(full_cursor: &mut Cursor<&[u8]>, mip0: &[u8], width: u32, height: u32, alpha_depth: u8) -> Result<Vec<u8>> {
	// The 256-entry BGRA palette immediately follows the fixed BLP2 header.
	full_cursor.set_position(4 + 4 + 1 + 1 + 1 + 1 + 4 + 4 + (MIP_COUNT * 4 * 2) as u64);
	let mut palette = [[0u8; 4]; 256];
	for entry in palette.iter_mut() {
		full_cursor.read_exact(entry)?;
	}

	let pixel_count = (width * height) as usize;
	if mip0.len() < pixel_count {
		bail!(ScanError::DataError("BLP paletted mip 0 shorter than width*height".into()));
	}
	let alpha_bytes = match alpha_depth {
		0 => 0,
		1 => pixel_count.div_ceil(8),
		8 => pixel_count,
		other => bail!(ScanError::DataError(format!("unsupported BLP alpha depth {other}"))),
	};
	if mip0.len() < pixel_count + alpha_bytes {
		bail!(ScanError::DataError("BLP paletted mip 0 missing alpha map".into()));
	}

	let indices = &mip0[..pixel_count];
	let alpha_map = &mip0[pixel_count..pixel_count + alpha_bytes];

	let mut out = Vec::with_capacity(pixel_count * 4);
	for (i, &index) in indices.iter().enumerate() {
		let [b, g, r, _] = palette[index as usize];
		let alpha = match alpha_depth {
			0 => 255,
			1 => {
				if (alpha_map[i / 8] >> (i % 8)) & 1 == 1 {
					255
				} else {
					0
				}
			}
			8 => alpha_map[i],
			_ => unreachable!(),
		};
		out.extend_from_slice(&[r, g, b, alpha]);
	}
	Ok(out)
}

fn decode_raw_bgra(mip0: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
	let pixel_count = (width * height) as usize;
	if mip0.len() < pixel_count * 4 {
		bail!(ScanError::DataError("BLP raw BGRA mip 0 shorter than width*height*4".into()));
	}
	let mut out = Vec::with_capacity(pixel_count * 4);
	for chunk in mip0.chunks_exact(4).take(pixel_count) {
		out.extend_from_slice(&[chunk[2], chunk[1], chunk[0], chunk[3]]);
	}
	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn header(compression: u8, alpha_depth: u8, width: u32, height: u32, mip0_offset: u32, mip0_size: u32, second_mip: bool) -> Vec<u8> {
		let mut data = Vec::new();
		data.extend_from_slice(b"BLP2");
		data.extend_from_slice(&1u32.to_le_bytes()); // kind
		data.push(compression);
		data.push(alpha_depth);
		data.push(0); // alpha_type
		data.push(if second_mip { 1 } else { 0 }); // has_mips
		data.extend_from_slice(&width.to_le_bytes());
		data.extend_from_slice(&height.to_le_bytes());

		let mut offsets = [0u32; MIP_COUNT];
		offsets[0] = mip0_offset;
		if second_mip {
			offsets[1] = mip0_offset + mip0_size;
		}
		for offset in offsets {
			data.extend_from_slice(&offset.to_le_bytes());
		}
		let mut sizes = [0u32; MIP_COUNT];
		sizes[0] = mip0_size;
		if second_mip {
			sizes[1] = 4;
		}
		for size in sizes {
			data.extend_from_slice(&size.to_le_bytes());
		}
		data
	}

	#[test]
	fn decodes_raw_bgra_mip0() {
		let width = 2;
		let height = 1;
		let pixels_bgra = [0u8, 0, 255, 255, 0, 255, 0, 255]; // red then green, BGRA on disk
		let mut data = header(3, 8, width, height, 0, 0, false);
		let mip0_offset = data.len() as u32;
		data[4 + 4 + 1 + 1 + 1 + 1 + 4 + 4..4 + 4 + 1 + 1 + 1 + 1 + 4 + 4 + 4].copy_from_slice(&mip0_offset.to_le_bytes());
		data.extend_from_slice(&pixels_bgra);
		let offset_in_sizes = 4 + 4 + 1 + 1 + 1 + 1 + 4 + 4 + MIP_COUNT * 4;
		data[offset_in_sizes..offset_in_sizes + 4].copy_from_slice(&(pixels_bgra.len() as u32).to_le_bytes());

		let image = decode_blp(&data, false).unwrap();
		assert_eq!(image.width, 2);
		assert_eq!(image.pixels, vec![255, 0, 0, 255, 0, 255, 0, 255]);
	}

	#[test]
	fn mipped_texture_rejected_without_allow_mips() {
		let data = header(3, 8, 1, 1, 0, 4, true);
		assert!(decode_blp(&data, false).is_err());
	}

	#[test]
	fn unsupported_compression_mode_is_rejected() {
		let data = header(2, 0, 1, 1, 0, 0, false);
		assert!(decode_blp(&data, false).is_err());
	}
}
