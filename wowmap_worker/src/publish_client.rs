//! The worker's half of the publish protocol (§4.L, §6): a thin `reqwest`
//! wrapper over the catalog's `axum` router, using `camelCase` JSON DTOs to
//! match the policy named in §6.

use anyhow::{Context, Result, bail};
use serde::Serialize;
use wowmap_catalog::{BuildMap, DiscoveredBuild, Map};
use wowmap_core::ContentHash;

pub struct PublishClient {
	client: reqwest::Client,
	base_url: String,
}

impl PublishClient {
	pub fn new(base_url: impl Into<String>) -> Self {
		Self {
			client: reqwest::Client::new(),
			base_url: base_url.into(),
		}
	}

	pub async fn publish_discovered(&self, builds: &[DiscoveredBuild]) -> Result<Vec<DiscoveredBuild>> {
		let url = format!("{}/publish/discovered", self.base_url.trim_end_matches('/'));
		let response = self.client.post(&url).json(builds).send().await.with_context(|| format!("POST {url}"))?;
		response.error_for_status_ref().with_context(|| format!("POST {url}"))?;
		response.json().await.context("decoding publish_discovered response")
	}

	/// Of `hashes`, returns those the catalog doesn't already have.
	pub async fn missing_tiles(&self, hashes: &[String]) -> Result<Vec<String>> {
		let url = format!("{}/publish/tiles", self.base_url.trim_end_matches('/'));
		let response = self.client.post(&url).json(hashes).send().await.with_context(|| format!("POST {url}"))?;
		response.error_for_status_ref().with_context(|| format!("POST {url}"))?;
		response.json().await.context("decoding publish_tiles response")
	}

	/// `hash` is the tile's source content hash, the URL path identity under
	/// which the catalog stores and keys it. The re-encoded `body`'s own MD5
	/// is sent separately via `X-Expected-Hash` so the server can verify the
	/// upload wasn't corrupted in transit without conflating it with the tile's
	/// real identity.
	pub async fn put_tile(&self, hash: ContentHash, width: u32, height: u32, body: Vec<u8>) -> Result<()> {
		let url = format!("{}/publish/tile/{}?width={width}&height={height}", self.base_url.trim_end_matches('/'), hash.to_hex());
		let expected_hash = ContentHash::of(&body).to_hex();
		let response = self
			.client
			.put(&url)
			.header("Content-Type", "image/webp")
			.header("X-Expected-Hash", expected_hash)
			.body(body)
			.send()
			.await
			.with_context(|| format!("PUT {url}"))?;
		if !response.status().is_success() {
			bail!("PUT {url} returned {}", response.status());
		}
		Ok(())
	}

	pub async fn publish_build_map(&self, map: &Map, build_map: &BuildMap) -> Result<()> {
		#[derive(Serialize)]
		#[serde(rename_all = "camelCase")]
		struct Request<'a> {
			map: &'a Map,
			build_map: &'a BuildMap,
		}
		let url = format!("{}/publish/build-map", self.base_url.trim_end_matches('/'));
		let response = self.client.post(&url).json(&Request { map, build_map }).send().await.with_context(|| format!("POST {url}"))?;
		if !response.status().is_success() {
			bail!("POST {url} returned {}", response.status());
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;
	use wowmap_catalog::publish_server::{PublishState, build_router};
	use wowmap_catalog::{LocalTileStore, SqliteCatalogStore};

	async fn spawn_test_server() -> String {
		let state = Arc::new(PublishState {
			catalog: Arc::new(SqliteCatalogStore::open_in_memory().unwrap()),
			tiles: Arc::new(LocalTileStore::new(tempfile::tempdir().unwrap().into_path())),
		});
		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		tokio::spawn(async move {
			axum::serve(listener, build_router(state)).await.unwrap();
		});
		format!("http://{addr}")
	}

	#[tokio::test]
	async fn missing_tiles_reports_an_unseeded_hash_as_missing() {
		let client = PublishClient::new(spawn_test_server().await);
		let hash = ContentHash::of(b"tile bytes").to_hex();

		let missing = client.missing_tiles(&[hash.clone()]).await.unwrap();
		assert_eq!(missing, vec![hash]);
	}

	#[tokio::test]
	async fn put_tile_then_missing_tiles_no_longer_reports_it() {
		let client = PublishClient::new(spawn_test_server().await);
		let body = b"tile bytes".to_vec();
		let hash = ContentHash::of(&body);

		client.put_tile(hash, 256, 256, body).await.unwrap();
		let missing = client.missing_tiles(&[hash.to_hex()]).await.unwrap();
		assert!(missing.is_empty());
	}

	#[tokio::test]
	async fn publish_discovered_round_trips_through_the_router() {
		let client = PublishClient::new(spawn_test_server().await);
		let build = DiscoveredBuild {
			product_name: "wow".into(),
			region: "us".into(),
			version: wowmap_core::BuildVersion::new(1, 2, 3, 4).unwrap(),
			build_config_key: "a".repeat(32),
			cdn_config_key: "b".repeat(32),
			product_config_key: "c".repeat(32),
			key_ring: None,
		};

		let accepted = client.publish_discovered(std::slice::from_ref(&build)).await.unwrap();
		assert_eq!(accepted.len(), 1);
		assert_eq!(accepted[0].product_name, "wow");
	}

	#[tokio::test]
	async fn publish_build_map_succeeds() {
		let client = PublishClient::new(spawn_test_server().await);
		let map = Map { id: 1, directory: "Azeroth".into(), wdt_file_id: 1 };
		let build_map = BuildMap { product_id: 1, map_id: 1, tiles: 4, composition_hash: None, missing: std::collections::BTreeSet::new() };

		client.publish_build_map(&map, &build_map).await.unwrap();
	}
}
