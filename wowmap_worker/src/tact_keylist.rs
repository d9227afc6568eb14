//! Refreshes the process-wide [`TactKeyRegistry`] from the upstream
//! decryption-key list (§6), ETag-cached so a poll tick that finds nothing
//! new costs one conditional `GET`.

use anyhow::{Context, Result};
use wowmap_catalog::CatalogStore;
use wowmap_cdn::{TactKeyRegistry, parse_key_list_line};

pub struct KeyListClient {
	client: reqwest::Client,
	url: String,
}

const ETAG_SETTING: &str = "tact_keylist_etag";

impl KeyListClient {
	pub fn new(url: impl Into<String>) -> Self {
		Self {
			client: reqwest::Client::new(),
			url: url.into(),
		}
	}

	/// Fetches the key list if its ETag changed since the last call,
	/// registers every new key in `registry`, persists the parsed entries in
	/// `catalog` (so a later-discovered key can be matched back against
	/// already-scanned products — §9 rescan trigger), and returns the
	/// key names that were newly learned this call.
	pub async fn refresh(&self, registry: &TactKeyRegistry, catalog: &dyn CatalogStore) -> Result<Vec<String>> {
		let mut request = self.client.get(&self.url);
		if let Some(etag) = catalog.get_setting(ETAG_SETTING)? {
			request = request.header(reqwest::header::IF_NONE_MATCH, etag);
		}

		let response = request.send().await.with_context(|| format!("GET {}", self.url))?;
		if response.status() == reqwest::StatusCode::NOT_MODIFIED {
			return Ok(Vec::new());
		}
		let etag = response.headers().get(reqwest::header::ETAG).and_then(|v| v.to_str().ok()).map(str::to_string);
		let body = response.error_for_status().with_context(|| format!("GET {}", self.url))?.text().await?;

		let mut newly_learned = Vec::new();
		for line in body.lines() {
			let Some((key_name, key)) = parse_key_list_line(line) else {
				continue;
			};
			if !registry.contains(key_name) {
				let key_name_hex = format!("{key_name:016X}");
				catalog.insert_tact_key(&key_name_hex, &hex::encode(key))?;
				newly_learned.push(key_name_hex);
			}
			registry.set(key_name, key);
		}

		if let Some(etag) = etag {
			catalog.put_setting(ETAG_SETTING, &etag)?;
		}
		Ok(newly_learned)
	}
}

/// For each newly learned key, re-queues every `ProductScan` blocked on it
/// (§9). Idempotent: rescanning a build whose content is already fully
/// resolved just re-derives the same composition hashes.
pub fn rescan_targets(catalog: &dyn CatalogStore, newly_learned: &[String]) -> Result<Vec<i64>> {
	let mut targets = Vec::new();
	for key_name in newly_learned {
		targets.extend(catalog.rescan_targets_for_key(key_name)?);
	}
	targets.sort_unstable();
	targets.dedup();
	Ok(targets)
}

#[cfg(test)]
mod tests {
	use super::*;
	use wowmap_catalog::SqliteCatalogStore;

	#[test]
	fn rescan_targets_are_deduplicated_across_keys() {
		let store = SqliteCatalogStore::open_in_memory().unwrap();
		let targets = rescan_targets(&store, &["AABBCCDD".to_string(), "11223344".to_string()]).unwrap();
		assert!(targets.is_empty());
	}
}
