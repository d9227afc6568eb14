//! The worker-facing publish protocol (§4.L, §6): `POST /publish/discovered`
//! registers builds, `POST /publish/tiles` reports which of a hash list the
//! catalog is missing, `PUT /publish/tile/{hash}` stores one encoded tile,
//! and `POST /publish/build-map` persists a scan's per-map tile grouping
//! once encoding is done (an internal addition the three-endpoint summary in
//! §4.L doesn't name, needed because `CatalogStore::upsert_map`/
//! `upsert_build_map` must be reachable from the worker over HTTP too).

use crate::blob_store::TileBlobStore;
use crate::model::{BuildMap, DiscoveredBuild, Map, MinimapTile};
use crate::store::CatalogStore;
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{post, put};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use wowmap_core::ContentHash;

const EXPECTED_HASH_HEADER: &str = "x-expected-hash";
const TILE_CONTENT_TYPE: &str = "image/webp";

pub struct PublishState {
	pub catalog: Arc<dyn CatalogStore>,
	pub tiles: Arc<dyn TileBlobStore>,
}

pub fn build_router(state: Arc<PublishState>) -> Router {
	Router::new()
		.route("/publish/discovered", post(publish_discovered))
		.route("/publish/tiles", post(publish_tiles))
		.route("/publish/tile/{hash}", put(publish_tile))
		.route("/publish/build-map", post(publish_build_map))
		.with_state(state)
}

async fn publish_discovered(State(state): State<Arc<PublishState>>, Json(builds): Json<Vec<DiscoveredBuild>>) -> Result<Json<Vec<DiscoveredBuild>>, (StatusCode, String)> {
	state.catalog.publish_discovered(&builds).map(Json).map_err(internal_error)
}

async fn publish_tiles(State(state): State<Arc<PublishState>>, Json(hashes): Json<Vec<String>>) -> Result<Json<Vec<String>>, (StatusCode, String)> {
	state.catalog.missing_tiles(&hashes).map(Json).map_err(internal_error)
}

#[derive(Debug, Deserialize)]
struct TileQuery {
	width: u32,
	height: u32,
}

/// `{hash}` is the tile's source content hash — the same identity a
/// `Composition` entry references — not the hash of the re-encoded body on
/// the wire. Upload integrity for that body is carried separately via
/// `X-Expected-Hash` (hex MD5 of the bytes actually sent) and verified here
/// before the tile is stored under the path hash.
async fn publish_tile(
	State(state): State<Arc<PublishState>>,
	AxumPath(hash): AxumPath<String>,
	Query(query): Query<TileQuery>,
	headers: HeaderMap,
	body: axum::body::Bytes,
) -> Result<StatusCode, (StatusCode, String)> {
	let hash = ContentHash::parse_hex(&hash).map_err(|err| (StatusCode::BAD_REQUEST, err.to_string()))?;

	let content_type = headers.get(axum::http::header::CONTENT_TYPE).and_then(|v| v.to_str().ok()).unwrap_or_default();
	if content_type != TILE_CONTENT_TYPE {
		return Err((StatusCode::BAD_REQUEST, format!("expected Content-Type {TILE_CONTENT_TYPE}, got '{content_type}'")));
	}

	let expected_hash = headers
		.get(EXPECTED_HASH_HEADER)
		.and_then(|v| v.to_str().ok())
		.ok_or_else(|| (StatusCode::BAD_REQUEST, format!("missing {EXPECTED_HASH_HEADER} header")))?;
	let expected_hash = ContentHash::parse_hex(expected_hash).map_err(|err| (StatusCode::BAD_REQUEST, err.to_string()))?;
	let actual_hash = ContentHash::of(&body);
	if actual_hash != expected_hash {
		return Err((StatusCode::BAD_REQUEST, format!("uploaded bytes hash to {}, not the declared {}", actual_hash.to_hex(), expected_hash.to_hex())));
	}

	state.tiles.put(hash, &body).await.map_err(internal_error)?;
	state
		.catalog
		.upsert_tile(&MinimapTile {
			hash: hash.to_hex(),
			width: query.width,
			height: query.height,
		})
		.map_err(internal_error)?;
	Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishBuildMapRequest {
	map: Map,
	build_map: BuildMap,
}

async fn publish_build_map(State(state): State<Arc<PublishState>>, Json(request): Json<PublishBuildMapRequest>) -> Result<StatusCode, (StatusCode, String)> {
	state.catalog.upsert_map(&request.map).map_err(internal_error)?;
	state.catalog.upsert_build_map(&request.build_map).map_err(internal_error)?;
	Ok(StatusCode::NO_CONTENT)
}

fn internal_error(err: anyhow::Error) -> (StatusCode, String) {
	(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}
