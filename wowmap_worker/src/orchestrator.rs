//! The scan orchestrator state machine (§4.I): `Pending` advances to
//! `EncryptedBuild`/`EncryptedMapDatabase` when a decryption key is missing,
//! otherwise to `PartialDecrypt` or the terminal `FullDecrypt`. The state
//! machine itself never reads the wall clock — `last_scanned`/`scan_time`
//! are stamped by the caller so the algorithm stays unit-testable.

use crate::publish_client::PublishClient;
use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use log::{info, warn};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use wildmatch::WildMatch;
use wowmap_catalog::{BuildMap, CatalogStore, Composition, Map, MinimapTile, ProductScan, ScanState, TileBlobStore};
use wowmap_core::{ContentHash, ScanError, TileCoord};
use wowmap_formats::{Db2MapTableReader, RgbaImage, TsvTableSource, WdtParser, decode_blp, encode_tile_webp};
use wowmap_tact::BuildResolver;

/// The map table's fixed FileDataID.
pub const MAP_TABLE_FILE_ID: u32 = 1_349_477;

pub struct ScanConfig {
	pub map_table_file_id: u32,
	/// `--filter-id`: a glob matched against each map's numeric id, a dev aid
	/// never exercised in production operation.
	pub map_id_filter: Option<WildMatch>,
	pub allow_mips: bool,
	pub concurrency: usize,
}

impl Default for ScanConfig {
	fn default() -> Self {
		Self {
			map_table_file_id: MAP_TABLE_FILE_ID,
			map_id_filter: None,
			allow_mips: false,
			concurrency: num_cpus::get().max(1),
		}
	}
}

struct MapPlan {
	map: Map,
	tiles: HashMap<ContentHash, Vec<(i32, i32)>>,
	missing: BTreeSet<TileCoord>,
}

enum MapOutcome {
	NoTiles,
	EncryptedWdt(String),
	Tiles(HashMap<ContentHash, Vec<(i32, i32)>>, BTreeSet<TileCoord>),
	Error(anyhow::Error),
}

/// Runs one scan for `product_id` and returns the `ProductScan` row to
/// upsert. `now` is the caller-supplied timestamp for `last_scanned`/
/// `scan_time`.
pub async fn run_scan(
	product_id: i64,
	resolver: Arc<BuildResolver>,
	publish: &PublishClient,
	local_tiles: &dyn TileBlobStore,
	local_catalog: &dyn CatalogStore,
	config: &ScanConfig,
	now: i64,
) -> Result<ProductScan> {
	let mut scan = ProductScan::pending(product_id);
	scan.last_scanned = Some(now);

	// Step 1: MapDB.
	let map_table_bytes = match resolver.open_by_file_id(config.map_table_file_id).await {
		Ok(blob) => blob,
		Err(err) => {
			if let Some(ScanError::DecryptionKeyMissing(key)) = err.downcast_ref::<ScanError>() {
				scan.state = ScanState::EncryptedMapDatabase;
				scan.encrypted_key = Some(key.clone());
				return Ok(scan);
			}
			return Err(err).context("opening map table");
		}
	};
	let text = String::from_utf8(map_table_bytes.into_vec()).context("map table is not valid UTF-8")?;
	let source = TsvTableSource::parse(&text)?;
	let rows = Db2MapTableReader::read_rows(&source)?;

	// Step 2: dev-only map-id filter.
	let rows: Vec<_> = rows
		.into_iter()
		.filter(|row| config.map_id_filter.as_ref().is_none_or(|glob| glob.matches(&row.map_id.to_string())))
		.collect();

	// Step 3: per-map phase, bounded parallelism via spawn-then-buffer_unordered.
	let mut encrypted_maps: BTreeMap<String, BTreeSet<i64>> = BTreeMap::new();
	let mut plans = Vec::new();
	let per_map_results = stream::iter(rows.into_iter().filter(|row| row.wdt_file_id != 0))
		.map(|row| {
			let resolver = resolver.clone();
			tokio::spawn(async move {
				let outcome = scan_one_map(&resolver, row.map_id, &row.directory, row.wdt_file_id).await;
				(i64::from(row.map_id), row.directory, row.wdt_file_id, outcome)
			})
		})
		.buffer_unordered(config.concurrency)
		.collect::<Vec<_>>()
		.await;

	for joined in per_map_results {
		let (map_id, directory, wdt_file_id, outcome) = joined.context("per-map scan task panicked")?;
		match outcome {
			MapOutcome::EncryptedWdt(key) => {
				encrypted_maps.entry(key).or_default().insert(map_id);
			}
			MapOutcome::NoTiles => {}
			MapOutcome::Tiles(tiles, missing) => plans.push(MapPlan {
				map: Map { id: map_id, directory, wdt_file_id },
				tiles,
				missing,
			}),
			MapOutcome::Error(err) => warn!("scanning map {map_id} ({directory}): {err:#}"),
		}
	}

	// Step 4: global dedup, purely local, then ask the catalog's Tiles
	// endpoint which of the deduped *source* content hashes it's missing —
	// this is the same identity Composition entries reference, so a tile
	// stored under it is always findable from a composition later on.
	let mut by_content: HashMap<ContentHash, Vec<(i64, i32, i32)>> = HashMap::new();
	for plan in &plans {
		for (&content_key, coords) in &plan.tiles {
			let entry = by_content.entry(content_key).or_default();
			entry.extend(coords.iter().map(|&(x, y)| (plan.map.id, x, y)));
		}
	}
	let content_hashes: Vec<String> = by_content.keys().map(|key| key.to_hex()).collect();
	let missing_hashes: HashSet<String> = publish
		.missing_tiles(&content_hashes)
		.await
		.unwrap_or_else(|err| {
			warn!("checking missing tiles: {err:#}");
			content_hashes.clone()
		})
		.into_iter()
		.collect();

	// Step 5: tile encode phase, only for hashes the catalog doesn't have,
	// same bounded-parallelism pattern as the per-map phase above.
	let allow_mips = config.allow_mips;
	let to_encode: Vec<ContentHash> = by_content.keys().copied().filter(|key| missing_hashes.contains(key.to_hex().as_str())).collect();
	let encoded = stream::iter(to_encode)
		.map(|content_key| {
			let resolver = resolver.clone();
			tokio::spawn(async move {
				let result = encode_one_tile(&resolver, content_key, allow_mips).await;
				(content_key, result)
			})
		})
		.buffer_unordered(config.concurrency)
		.collect::<Vec<_>>()
		.await;

	for joined in encoded {
		let (content_key, result) = joined.context("tile encode task panicked")?;
		let (image, bytes) = match result {
			Ok(encoded) => encoded,
			Err(err) => {
				warn!("encoding tile {}: {err:#}", content_key.to_hex());
				continue;
			}
		};
		// Cached locally under the source content hash regardless of the
		// remote outcome below, so a failed publish can be retried later
		// without re-decoding (`sync-tiles`).
		if let Err(err) = local_tiles.put(content_key, &bytes).await {
			warn!("caching tile {} locally: {err:#}", content_key.to_hex());
		}
		if let Err(err) = local_catalog.upsert_tile(&MinimapTile { hash: content_key.to_hex(), width: image.width, height: image.height }) {
			warn!("recording tile {} in local catalog: {err:#}", content_key.to_hex());
		}
		if let Err(err) = publish.put_tile(content_key, image.width, image.height, bytes).await {
			warn!("publishing tile for content key {}: {err:#}", content_key.to_hex());
		}
	}

	// Step 6: composition build, per map. Tile identity is the source
	// content hash throughout, not the re-encoded output's own hash.
	for plan in &plans {
		let tile_count = plan.tiles.values().map(Vec::len).sum::<usize>() as u32;
		let tiles: Vec<(i32, i32, ContentHash)> = plan.tiles.iter().flat_map(|(&hash, coords)| coords.iter().map(move |&(x, y)| (x, y, hash))).collect();
		let composition = Composition::from_tiles(tiles, plan.missing.clone());
		let build_map = BuildMap {
			product_id,
			map_id: plan.map.id,
			tiles: tile_count,
			composition_hash: Some(composition.hash),
			missing: plan.missing.clone(),
		};
		if let Err(err) = publish.publish_build_map(&plan.map, &build_map).await {
			warn!("publishing build map for {}: {err:#}", plan.map.directory);
		}
	}

	// Step 7: terminal state.
	scan.scan_time = Some(now);
	scan.encrypted_maps = encrypted_maps;
	scan.state = if scan.encrypted_maps.is_empty() { ScanState::FullDecrypt } else { ScanState::PartialDecrypt };
	info!("scan for product {product_id} finished in state {:?}", scan.state);
	Ok(scan)
}

async fn scan_one_map(resolver: &BuildResolver, map_id: u32, directory: &str, wdt_file_id: u32) -> MapOutcome {
	let wdt_bytes = match resolver.open_by_file_id(wdt_file_id).await {
		Ok(blob) => blob,
		Err(err) => {
			return match err.downcast_ref::<ScanError>() {
				Some(ScanError::DecryptionKeyMissing(key)) => MapOutcome::EncryptedWdt(key.clone()),
				_ => MapOutcome::Error(err.context(format!("opening WDT for map {map_id} ({directory})"))),
			};
		}
	};

	let entries = match WdtParser::parse(wdt_bytes.as_slice()) {
		Ok(entries) => entries,
		Err(err) => return MapOutcome::Error(err),
	};
	if entries.is_empty() {
		return MapOutcome::NoTiles;
	}

	let mut tiles: HashMap<ContentHash, Vec<(i32, i32)>> = HashMap::new();
	let mut missing: BTreeSet<TileCoord> = BTreeSet::new();
	for (coord, tile_file_id) in entries {
		match resolver.root().content_key_for_file_id(tile_file_id) {
			Some(content_key) => tiles.entry(content_key).or_default().push((coord.x, coord.y)),
			None => {
				missing.insert(coord);
			}
		}
	}
	MapOutcome::Tiles(tiles, missing)
}

async fn encode_one_tile(resolver: &BuildResolver, content_key: ContentHash, allow_mips: bool) -> Result<(RgbaImage, Vec<u8>)> {
	let blp = resolver.open_by_content_key(content_key, true).await.with_context(|| format!("opening tile body for content key {}", content_key.to_hex()))?;
	let image = decode_blp(blp.as_slice(), allow_mips)?;
	let bytes = encode_tile_webp(&image)?;
	Ok((image, bytes))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_concurrency_is_at_least_one() {
		assert!(ScanConfig::default().concurrency >= 1);
	}

	#[test]
	fn map_id_filter_matches_against_numeric_id() {
		let glob = WildMatch::new("0*");
		assert!(glob.matches("001"));
		assert!(!glob.matches("1"));
	}
}
