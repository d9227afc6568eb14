//! Data model entities (§3). DTOs that cross the publish protocol (§4.L, §6)
//! are `serde`-derived with camelCase field names; the store module maps
//! these onto SQLite rows.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use wowmap_core::{BuildVersion, ContentHash, TileCoord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScanState {
	Pending,
	Exception,
	EncryptedBuild,
	EncryptedMapDatabase,
	PartialDecrypt,
	FullDecrypt,
}

impl ScanState {
	pub fn as_str(&self) -> &'static str {
		match self {
			ScanState::Pending => "pending",
			ScanState::Exception => "exception",
			ScanState::EncryptedBuild => "encrypted_build",
			ScanState::EncryptedMapDatabase => "encrypted_map_database",
			ScanState::PartialDecrypt => "partial_decrypt",
			ScanState::FullDecrypt => "full_decrypt",
		}
	}

	pub fn parse(value: &str) -> Option<Self> {
		Some(match value {
			"pending" => ScanState::Pending,
			"exception" => ScanState::Exception,
			"encrypted_build" => ScanState::EncryptedBuild,
			"encrypted_map_database" => ScanState::EncryptedMapDatabase,
			"partial_decrypt" => ScanState::PartialDecrypt,
			"full_decrypt" => ScanState::FullDecrypt,
			_ => return None,
		})
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Build {
	pub id: i64,
	pub version: BuildVersion,
	pub build_config_key: String,
	pub cdn_config_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredBuild {
	pub product_name: String,
	pub region: String,
	pub version: BuildVersion,
	pub build_config_key: String,
	pub cdn_config_key: String,
	pub product_config_key: String,
	/// Carried through for completeness; the catalog never decrypts with it.
	#[serde(default)]
	pub key_ring: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
	pub id: i64,
	pub build_id: i64,
	pub product_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSource {
	pub id: i64,
	pub product_id: i64,
	pub region: String,
	pub build_config_key: String,
	pub cdn_config_key: String,
	pub product_config_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductScan {
	pub product_id: i64,
	pub state: ScanState,
	pub last_scanned: Option<i64>,
	pub scan_time: Option<i64>,
	pub exception: Option<String>,
	pub encrypted_key: Option<String>,
	/// key-name -> set of map ids still blocked on that key.
	pub encrypted_maps: BTreeMap<String, BTreeSet<i64>>,
}

impl ProductScan {
	pub fn pending(product_id: i64) -> Self {
		Self {
			product_id,
			state: ScanState::Pending,
			last_scanned: None,
			scan_time: None,
			exception: None,
			encrypted_key: None,
			encrypted_maps: BTreeMap::new(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Map {
	pub id: i64,
	pub directory: String,
	pub wdt_file_id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildMap {
	pub product_id: i64,
	pub map_id: i64,
	pub tiles: u32,
	pub composition_hash: Option<String>,
	/// Tile coordinates the WDT's MAID chunk names but whose content could
	/// not be resolved through the filesystem (known to exist, unobtainable).
	pub missing: BTreeSet<TileCoord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Composition {
	pub hash: String,
	/// Sorted by `(x, y)`, matching the tile-hash list a composition hash is
	/// derived from — required for the hash to be deterministic.
	pub tiles: Vec<(i32, i32, String)>,
	pub missing: BTreeSet<TileCoord>,
}

impl Composition {
	/// Hashes the sorted `(x, y, hash)` triples as raw bytes: little-endian
	/// `x`, little-endian `y`, then the tile hash's 32-byte lowercase hex
	/// ASCII, with no separators. Changing this byte layout breaks every
	/// previously computed composition hash.
	pub fn from_tiles(mut tiles: Vec<(i32, i32, ContentHash)>, missing: BTreeSet<TileCoord>) -> Self {
		tiles.sort_by_key(|(x, y, _)| (*x, *y));
		let tiles: Vec<(i32, i32, String)> = tiles.into_iter().map(|(x, y, hash)| (x, y, hash.to_hex())).collect();
		let mut buffer = Vec::new();
		for (x, y, hash) in &tiles {
			buffer.extend_from_slice(&x.to_le_bytes());
			buffer.extend_from_slice(&y.to_le_bytes());
			buffer.extend_from_slice(hash.as_bytes());
		}
		let hash = ContentHash::of(&buffer).to_hex();
		Self { hash, tiles, missing }
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinimapTile {
	pub hash: String,
	pub width: u32,
	pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TactKey {
	pub key_name: String,
	pub key: String,
}
