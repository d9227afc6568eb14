//! The relational catalog store (§4.J): SQLite behind a connection pool,
//! reached only through [`CatalogStore`] so the publish server and the
//! worker's own local tests never depend on `rusqlite` directly.

use crate::model::{BuildMap, DiscoveredBuild, Map, MinimapTile, ProductScan, ScanState};
use anyhow::{Context, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OptionalExtension;
use std::collections::{BTreeMap, BTreeSet};

pub trait CatalogStore: Send + Sync {
	/// Inserts `Build`/`Product`/`ProductSource`/`ProductScan` rows for every
	/// discovered build that isn't already known, idempotently. Returns the
	/// subset of `builds` the catalog has not yet terminally processed
	/// (§4.L `POST /publish/discovered`).
	fn publish_discovered(&self, builds: &[DiscoveredBuild]) -> Result<Vec<DiscoveredBuild>>;

	fn get_scan(&self, product_id: i64) -> Result<Option<ProductScan>>;
	fn upsert_scan(&self, scan: &ProductScan) -> Result<()>;

	fn upsert_map(&self, map: &Map) -> Result<i64>;
	fn upsert_build_map(&self, build_map: &BuildMap) -> Result<()>;
	fn upsert_tile(&self, tile: &MinimapTile) -> Result<()>;
	/// Of `hashes`, those not already present in `minimap_tiles` (§4.L
	/// `POST /publish/tiles`), used by the scan orchestrator's global dedup
	/// step to skip re-encoding tiles the catalog already has.
	fn missing_tiles(&self, hashes: &[String]) -> Result<Vec<String>>;
	/// Every tile row the catalog knows about, used by `sync-tiles` to find
	/// locally cached blobs that never reached the remote tile store.
	fn list_tiles(&self) -> Result<Vec<MinimapTile>>;

	fn get_setting(&self, key: &str) -> Result<Option<String>>;
	fn put_setting(&self, key: &str, value: &str) -> Result<()>;

	fn insert_tact_key(&self, key_name: &str, key: &str) -> Result<()>;
	/// ProductScans in `PartialDecrypt` or an `Encrypted*` state that
	/// reference `key_name`, re-queued as `Pending` (§9 key-discovery rescan).
	fn rescan_targets_for_key(&self, key_name: &str) -> Result<Vec<i64>>;
}

pub struct SqliteCatalogStore {
	pool: Pool<SqliteConnectionManager>,
}

impl SqliteCatalogStore {
	pub fn open(connection_string: &str) -> Result<Self> {
		let manager = SqliteConnectionManager::file(connection_string);
		let pool = Pool::new(manager).context("creating sqlite connection pool")?;
		let store = Self { pool };
		store.migrate()?;
		Ok(store)
	}

	pub fn open_in_memory() -> Result<Self> {
		let manager = SqliteConnectionManager::memory();
		let pool = Pool::new(manager).context("creating in-memory sqlite connection pool")?;
		let store = Self { pool };
		store.migrate()?;
		Ok(store)
	}

	/// Re-runs the schema's `CREATE TABLE IF NOT EXISTS` statements; this is
	/// all the `migrate` CLI subcommand does too.
	pub fn migrate(&self) -> Result<()> {
		let conn = self.pool.get().context("checking out sqlite connection")?;
		conn.execute_batch(
			"
			CREATE TABLE IF NOT EXISTS builds (
				id INTEGER PRIMARY KEY,
				version TEXT NOT NULL UNIQUE
			);
			CREATE TABLE IF NOT EXISTS products (
				id INTEGER PRIMARY KEY,
				build_id INTEGER NOT NULL REFERENCES builds(id),
				product_name TEXT NOT NULL,
				UNIQUE(build_id, product_name)
			);
			CREATE TABLE IF NOT EXISTS product_sources (
				id INTEGER PRIMARY KEY,
				product_id INTEGER NOT NULL REFERENCES products(id),
				region TEXT NOT NULL,
				build_config_key TEXT NOT NULL,
				cdn_config_key TEXT NOT NULL,
				product_config_key TEXT NOT NULL,
				UNIQUE(product_id, region)
			);
			CREATE TABLE IF NOT EXISTS product_scans (
				product_id INTEGER PRIMARY KEY REFERENCES products(id),
				state TEXT NOT NULL,
				last_scanned INTEGER,
				scan_time INTEGER,
				exception TEXT,
				encrypted_key TEXT,
				encrypted_maps TEXT NOT NULL DEFAULT '{}'
			);
			CREATE TABLE IF NOT EXISTS maps (
				id INTEGER PRIMARY KEY,
				directory TEXT NOT NULL,
				wdt_file_id INTEGER NOT NULL
			);
			CREATE TABLE IF NOT EXISTS build_maps (
				product_id INTEGER NOT NULL REFERENCES products(id),
				map_id INTEGER NOT NULL REFERENCES maps(id),
				tiles INTEGER NOT NULL,
				composition_hash TEXT,
				missing TEXT NOT NULL DEFAULT '[]',
				PRIMARY KEY (product_id, map_id)
			);
			CREATE TABLE IF NOT EXISTS minimap_tiles (
				hash TEXT PRIMARY KEY,
				width INTEGER NOT NULL,
				height INTEGER NOT NULL
			);
			CREATE TABLE IF NOT EXISTS tact_keys (
				key_name TEXT PRIMARY KEY,
				key TEXT NOT NULL
			);
			CREATE TABLE IF NOT EXISTS settings (
				key TEXT PRIMARY KEY,
				value TEXT NOT NULL
			);
			",
		)
		.context("running catalog schema migration")?;
		Ok(())
	}
}

impl CatalogStore for SqliteCatalogStore {
	fn publish_discovered(&self, builds: &[DiscoveredBuild]) -> Result<Vec<DiscoveredBuild>> {
		let mut conn = self.pool.get().context("checking out sqlite connection")?;
		let tx = conn.transaction().context("starting publish_discovered transaction")?;
		let mut pending = Vec::new();

		for build in builds {
			tx.execute(
				"INSERT INTO builds (version) VALUES (?1) ON CONFLICT(version) DO NOTHING",
				rusqlite::params![build.version.to_string()],
			)
			.context("upserting build")?;
			let build_id: i64 = tx
				.query_row("SELECT id FROM builds WHERE version = ?1", rusqlite::params![build.version.to_string()], |row| row.get(0))
				.context("looking up build id")?;

			tx.execute(
				"INSERT INTO products (build_id, product_name) VALUES (?1, ?2)
				 ON CONFLICT(build_id, product_name) DO NOTHING",
				rusqlite::params![build_id, build.product_name],
			)
			.context("upserting product")?;
			let product_id: i64 = tx
				.query_row(
					"SELECT id FROM products WHERE build_id = ?1 AND product_name = ?2",
					rusqlite::params![build_id, build.product_name],
					|row| row.get(0),
				)
				.context("looking up product id")?;

			// DO UPDATE rather than DO NOTHING: a later poll reporting a changed
			// config for the same (product, region) must not be silently dropped.
			tx.execute(
				"INSERT INTO product_sources (product_id, region, build_config_key, cdn_config_key, product_config_key) VALUES (?1, ?2, ?3, ?4, ?5)
				 ON CONFLICT(product_id, region) DO UPDATE SET
					build_config_key = excluded.build_config_key,
					cdn_config_key = excluded.cdn_config_key,
					product_config_key = excluded.product_config_key",
				rusqlite::params![product_id, build.region, build.build_config_key, build.cdn_config_key, build.product_config_key],
			)
			.context("upserting product source")?;

			tx.execute(
				"INSERT INTO product_scans (product_id, state, encrypted_maps) VALUES (?1, 'pending', '{}')
				 ON CONFLICT(product_id) DO NOTHING",
				rusqlite::params![product_id],
			)
			.context("upserting pending scan")?;

			let state: String = tx
				.query_row("SELECT state FROM product_scans WHERE product_id = ?1", rusqlite::params![product_id], |row| row.get(0))
				.context("reading scan state")?;
			if state != ScanState::FullDecrypt.as_str() {
				pending.push(build.clone());
			}
		}

		tx.commit().context("committing publish_discovered transaction")?;
		Ok(pending)
	}

	fn get_scan(&self, product_id: i64) -> Result<Option<ProductScan>> {
		let conn = self.pool.get().context("checking out sqlite connection")?;
		let result = conn.query_row(
			"SELECT state, last_scanned, scan_time, exception, encrypted_key, encrypted_maps FROM product_scans WHERE product_id = ?1",
			rusqlite::params![product_id],
			|row| {
				let state: String = row.get(0)?;
				let encrypted_maps: String = row.get(5)?;
				Ok((state, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, encrypted_maps))
			},
		);

		match result {
			Ok((state, last_scanned, scan_time, exception, encrypted_key, encrypted_maps)) => Ok(Some(ProductScan {
				product_id,
				state: ScanState::parse(&state).context("decoding scan state")?,
				last_scanned,
				scan_time,
				exception,
				encrypted_key,
				encrypted_maps: serde_json::from_str::<BTreeMap<String, BTreeSet<i64>>>(&encrypted_maps).context("decoding encrypted_maps JSON")?,
			})),
			Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
			Err(err) => Err(err).context("reading product scan"),
		}
	}

	fn upsert_scan(&self, scan: &ProductScan) -> Result<()> {
		let conn = self.pool.get().context("checking out sqlite connection")?;
		let encrypted_maps = serde_json::to_string(&scan.encrypted_maps).context("encoding encrypted_maps JSON")?;
		conn.execute(
			"INSERT INTO product_scans (product_id, state, last_scanned, scan_time, exception, encrypted_key, encrypted_maps)
			 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
			 ON CONFLICT(product_id) DO UPDATE SET
				state = excluded.state,
				last_scanned = excluded.last_scanned,
				scan_time = excluded.scan_time,
				exception = excluded.exception,
				encrypted_key = excluded.encrypted_key,
				encrypted_maps = excluded.encrypted_maps",
			rusqlite::params![scan.product_id, scan.state.as_str(), scan.last_scanned, scan.scan_time, scan.exception, scan.encrypted_key, encrypted_maps],
		)
		.context("upserting product scan")?;
		Ok(())
	}

	fn upsert_map(&self, map: &Map) -> Result<i64> {
		let conn = self.pool.get().context("checking out sqlite connection")?;
		conn.execute(
			"INSERT INTO maps (id, directory, wdt_file_id) VALUES (?1, ?2, ?3)
			 ON CONFLICT(id) DO UPDATE SET directory = excluded.directory, wdt_file_id = excluded.wdt_file_id",
			rusqlite::params![map.id, map.directory, map.wdt_file_id],
		)
		.context("upserting map")?;
		Ok(map.id)
	}

	fn upsert_build_map(&self, build_map: &BuildMap) -> Result<()> {
		let conn = self.pool.get().context("checking out sqlite connection")?;
		let missing = serde_json::to_string(&build_map.missing).context("encoding build map missing-tiles JSON")?;
		conn.execute(
			"INSERT INTO build_maps (product_id, map_id, tiles, composition_hash, missing) VALUES (?1, ?2, ?3, ?4, ?5)
			 ON CONFLICT(product_id, map_id) DO UPDATE SET tiles = excluded.tiles, composition_hash = excluded.composition_hash, missing = excluded.missing",
			rusqlite::params![build_map.product_id, build_map.map_id, build_map.tiles, build_map.composition_hash, missing],
		)
		.context("upserting build map")?;
		Ok(())
	}

	fn upsert_tile(&self, tile: &MinimapTile) -> Result<()> {
		let conn = self.pool.get().context("checking out sqlite connection")?;
		conn.execute(
			"INSERT INTO minimap_tiles (hash, width, height) VALUES (?1, ?2, ?3) ON CONFLICT(hash) DO NOTHING",
			rusqlite::params![tile.hash, tile.width, tile.height],
		)
		.context("upserting minimap tile")?;
		Ok(())
	}

	fn missing_tiles(&self, hashes: &[String]) -> Result<Vec<String>> {
		let conn = self.pool.get().context("checking out sqlite connection")?;
		let mut missing = Vec::new();
		for hash in hashes {
			let exists: bool = conn
				.query_row("SELECT 1 FROM minimap_tiles WHERE hash = ?1", rusqlite::params![hash], |_| Ok(true))
				.optional()
				.context("checking minimap tile existence")?
				.unwrap_or(false);
			if !exists {
				missing.push(hash.clone());
			}
		}
		Ok(missing)
	}

	fn list_tiles(&self) -> Result<Vec<MinimapTile>> {
		let conn = self.pool.get().context("checking out sqlite connection")?;
		let mut statement = conn.prepare("SELECT hash, width, height FROM minimap_tiles").context("preparing minimap tile listing")?;
		let rows = statement
			.query_map([], |row| {
				Ok(MinimapTile {
					hash: row.get(0)?,
					width: row.get(1)?,
					height: row.get(2)?,
				})
			})
			.context("listing minimap tiles")?;
		rows.collect::<rusqlite::Result<Vec<_>>>().context("reading minimap tile rows")
	}

	fn get_setting(&self, key: &str) -> Result<Option<String>> {
		let conn = self.pool.get().context("checking out sqlite connection")?;
		match conn.query_row("SELECT value FROM settings WHERE key = ?1", rusqlite::params![key], |row| row.get(0)) {
			Ok(value) => Ok(Some(value)),
			Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
			Err(err) => Err(err).context("reading setting"),
		}
	}

	fn put_setting(&self, key: &str, value: &str) -> Result<()> {
		let conn = self.pool.get().context("checking out sqlite connection")?;
		conn.execute(
			"INSERT INTO settings (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
			rusqlite::params![key, value],
		)
		.context("writing setting")?;
		Ok(())
	}

	fn insert_tact_key(&self, key_name: &str, key: &str) -> Result<()> {
		let conn = self.pool.get().context("checking out sqlite connection")?;
		conn.execute(
			"INSERT INTO tact_keys (key_name, key) VALUES (?1, ?2) ON CONFLICT(key_name) DO NOTHING",
			rusqlite::params![key_name, key],
		)
		.context("inserting tact key")?;
		Ok(())
	}

	fn rescan_targets_for_key(&self, key_name: &str) -> Result<Vec<i64>> {
		let conn = self.pool.get().context("checking out sqlite connection")?;
		let mut statement = conn
			.prepare(
				"SELECT product_id, encrypted_key, encrypted_maps FROM product_scans
				 WHERE state IN ('partial_decrypt', 'encrypted_build', 'encrypted_map_database')",
			)
			.context("preparing rescan target query")?;
		let rows = statement
			.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?, row.get::<_, String>(2)?)))
			.context("querying rescan targets")?;

		let mut targets = Vec::new();
		for row in rows {
			let (product_id, encrypted_key, encrypted_maps) = row.context("reading rescan target row")?;
			if encrypted_key.as_deref() == Some(key_name) {
				targets.push(product_id);
				continue;
			}
			let encrypted_maps: BTreeMap<String, BTreeSet<i64>> = serde_json::from_str(&encrypted_maps).context("decoding encrypted_maps JSON")?;
			if encrypted_maps.contains_key(key_name) {
				targets.push(product_id);
			}
		}
		Ok(targets)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::DiscoveredBuild;
	use wowmap_core::BuildVersion;

	fn sample_build() -> DiscoveredBuild {
		DiscoveredBuild {
			product_name: "wow".into(),
			region: "us".into(),
			version: BuildVersion::new(1, 14, 3, 12345).unwrap(),
			build_config_key: "a".repeat(32),
			cdn_config_key: "b".repeat(32),
			product_config_key: "c".repeat(32),
			key_ring: None,
		}
	}

	#[test]
	fn publish_discovered_is_idempotent() {
		let store = SqliteCatalogStore::open_in_memory().unwrap();
		let build = sample_build();
		let first = store.publish_discovered(&[build.clone()]).unwrap();
		let second = store.publish_discovered(&[build]).unwrap();
		assert_eq!(first.len(), 1);
		assert_eq!(second.len(), 1);
	}

	#[test]
	fn full_decrypt_builds_are_not_returned_as_pending() {
		let store = SqliteCatalogStore::open_in_memory().unwrap();
		let build = sample_build();
		store.publish_discovered(&[build.clone()]).unwrap();

		let conn = store.pool.get().unwrap();
		let product_id: i64 = conn.query_row("SELECT id FROM products", [], |row| row.get(0)).unwrap();
		store
			.upsert_scan(&ProductScan {
				state: ScanState::FullDecrypt,
				..ProductScan::pending(product_id)
			})
			.unwrap();

		let still_pending = store.publish_discovered(&[build]).unwrap();
		assert!(still_pending.is_empty());
	}

	#[test]
	fn rescan_targets_match_encrypted_key_and_encrypted_maps() {
		let store = SqliteCatalogStore::open_in_memory().unwrap();
		let build = sample_build();
		store.publish_discovered(&[build]).unwrap();
		let conn = store.pool.get().unwrap();
		let product_id: i64 = conn.query_row("SELECT id FROM products", [], |row| row.get(0)).unwrap();

		let mut encrypted_maps = BTreeMap::new();
		encrypted_maps.insert("AABBCCDD".to_string(), BTreeSet::from([269]));
		store
			.upsert_scan(&ProductScan {
				state: ScanState::PartialDecrypt,
				encrypted_maps,
				..ProductScan::pending(product_id)
			})
			.unwrap();

		let targets = store.rescan_targets_for_key("AABBCCDD").unwrap();
		assert_eq!(targets, vec![product_id]);
		assert!(store.rescan_targets_for_key("00000000").unwrap().is_empty());
	}

	#[test]
	fn a_changed_config_for_the_same_product_and_region_is_not_silently_dropped() {
		let store = SqliteCatalogStore::open_in_memory().unwrap();
		let build = sample_build();
		store.publish_discovered(&[build.clone()]).unwrap();

		let changed = DiscoveredBuild {
			cdn_config_key: "d".repeat(32),
			product_config_key: "e".repeat(32),
			..build
		};
		store.publish_discovered(&[changed.clone()]).unwrap();

		let conn = store.pool.get().unwrap();
		let (cdn_config_key, product_config_key): (String, String) =
			conn.query_row("SELECT cdn_config_key, product_config_key FROM product_sources", [], |row| Ok((row.get(0)?, row.get(1)?))).unwrap();
		assert_eq!(cdn_config_key, changed.cdn_config_key);
		assert_eq!(product_config_key, changed.product_config_key);
	}

	#[test]
	fn settings_round_trip() {
		let store = SqliteCatalogStore::open_in_memory().unwrap();
		assert_eq!(store.get_setting("etag").unwrap(), None);
		store.put_setting("etag", "\"abc123\"").unwrap();
		assert_eq!(store.get_setting("etag").unwrap(), Some("\"abc123\"".to_string()));
	}

	#[test]
	fn missing_tiles_excludes_already_stored_hashes() {
		let store = SqliteCatalogStore::open_in_memory().unwrap();
		store
			.upsert_tile(&MinimapTile {
				hash: "a".repeat(32),
				width: 256,
				height: 256,
			})
			.unwrap();

		let missing = store.missing_tiles(&["a".repeat(32), "b".repeat(32)]).unwrap();
		assert_eq!(missing, vec!["b".repeat(32)]);
	}

	#[test]
	fn list_tiles_returns_every_stored_row() {
		let store = SqliteCatalogStore::open_in_memory().unwrap();
		store
			.upsert_tile(&MinimapTile {
				hash: "a".repeat(32),
				width: 256,
				height: 128,
			})
			.unwrap();

		let tiles = store.list_tiles().unwrap();
		assert_eq!(tiles.len(), 1);
		assert_eq!(tiles[0].width, 256);
		assert_eq!(tiles[0].height, 128);
	}
}
