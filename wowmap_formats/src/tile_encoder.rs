//! Tile encoder (§4.H): every published minimap tile is lossless WebP, which
//! keeps flat color regions (the vast majority of a minimap) essentially
//! free while still compressing the occasional photographic cliff texture.

use crate::RgbaImage;
use anyhow::{Result, bail};
use wowmap_core::ScanError;

pub fn encode_tile_webp(image: &RgbaImage) -> Result<Vec<u8>> {
	let expected_len = (image.width * image.height * 4) as usize;
	if image.pixels.len() != expected_len {
		bail!(ScanError::DataError(format!(
			"tile pixel buffer is {} bytes, expected {expected_len} for a {}x{} RGBA image",
			image.pixels.len(),
			image.width,
			image.height
		)));
	}

	let encoder = webp::Encoder::from_rgba(&image.pixels, image.width, image.height);
	let memory = encoder.encode_lossless();
	if memory.is_empty() {
		bail!("webp encoder produced an empty buffer");
	}
	Ok(memory.to_vec())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn encodes_a_solid_tile_to_a_nonempty_webp_buffer() {
		let image = RgbaImage {
			width: 4,
			height: 4,
			pixels: vec![10u8, 20, 30, 255].repeat(16),
		};
		let encoded = encode_tile_webp(&image).unwrap();
		assert!(!encoded.is_empty());
		assert_eq!(&encoded[0..4], b"RIFF");
	}

	#[test]
	fn mismatched_buffer_size_is_rejected() {
		let image = RgbaImage {
			width: 4,
			height: 4,
			pixels: vec![0u8; 3],
		};
		assert!(encode_tile_webp(&image).is_err());
	}
}
