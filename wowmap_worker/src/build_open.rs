//! Wires a [`DiscoveredBuild`] to a ready [`BuildResolver`]: fetch the build
//! and CDN configs, then the Encoding table, Root file, and every
//! group-archive index they name, per §4.D's filesystem-resolver
//! construction order.

use anyhow::{Context, Result, bail};
use std::sync::Arc;
use wowmap_catalog::DiscoveredBuild;
use wowmap_cdn::{ResourceDescriptor, ResourceLocator, TactKeyRegistry};
use wowmap_core::io::DataReaderTrait;
use wowmap_core::{ContentHash, ScanError};
use wowmap_tact::root::LOCALE_EN_US;
use wowmap_tact::{BuildResolver, CompoundingIndex, Config, EncodingFile, FileIndex, RootFile};

pub const DEFAULT_CDN_HOSTS: &[&str] = &["level3.blizzard.com", "cdn.blizzard.com"];

pub struct BuildOpenConfig {
	pub product: String,
	pub cache_dir: std::path::PathBuf,
	/// Hard-coded defaults plus `--additional-cdn` overrides (§9).
	pub cdn_hosts: Vec<String>,
	pub cdn_path: String,
}

pub async fn open_build(config: &BuildOpenConfig, build: &DiscoveredBuild, keys: Arc<TactKeyRegistry>) -> Result<BuildResolver> {
	let locator_config = wowmap_cdn::LocatorConfig::new(config.cache_dir.clone(), config.cdn_hosts.clone(), config.cdn_path.clone());
	let locator = Arc::new(ResourceLocator::new(locator_config, keys)?);

	let build_config_key = ContentHash::parse_hex(&build.build_config_key).context("parsing build config key")?;
	let build_config_text = fetch_config(&locator, &config.product, build_config_key).await?;
	let build_config = Config::parse(&build_config_text);

	let cdn_config_key = ContentHash::parse_hex(&build.cdn_config_key).context("parsing cdn config key")?;
	let cdn_config_text = fetch_config(&locator, &config.product, cdn_config_key).await?;
	let cdn_config = Config::parse(&cdn_config_text);

	let encoding_key = build_config
		.get_last_token("encoding")
		.ok_or_else(|| ScanError::SchemaError("build config missing 'encoding' entry".into()))?;
	let encoding_key = ContentHash::parse_hex(encoding_key)?;
	let encoding_bytes = locator
		.open_compressed_handle(&ResourceDescriptor::data(&config.product, encoding_key))
		.await
		.context("opening encoding file")?
		.read_all()
		.await?;
	let encoding = EncodingFile::parse(encoding_bytes.as_slice())?;

	let root_key = build_config.get_last_token("root").ok_or_else(|| ScanError::SchemaError("build config missing 'root' entry".into()))?;
	let root_content_key = ContentHash::parse_hex(root_key)?;
	let (root_encoding_key, _size) = encoding
		.resolve(&root_content_key)
		.ok_or_else(|| ScanError::MissingResource(format!("root content key {}", root_content_key.to_hex())))?;
	let root_bytes = locator
		.open_compressed_handle(&ResourceDescriptor::data(&config.product, root_encoding_key))
		.await
		.context("opening root file")?
		.read_all()
		.await?;
	let root = RootFile::parse(root_bytes.as_slice(), LOCALE_EN_US)?;

	let compounding = CompoundingIndex::new();
	let archives = cdn_config.get_tokens("archives").unwrap_or_default();
	for archive_hex in archives {
		let archive_key = ContentHash::parse_hex(archive_hex)?;
		let index_bytes = locator
			.open_stream(&ResourceDescriptor::indice(&config.product, archive_key))
			.await
			.with_context(|| format!("opening archive index {archive_hex}"))?;
		compounding.absorb(index_bytes.as_slice(), archive_key)?;
	}
	if compounding.is_empty() && !cdn_config.get_tokens("archives").unwrap_or_default().is_empty() {
		bail!(ScanError::DataError("every archive index failed to parse".into()));
	}

	let file_index = FileIndex::new();
	if let Some(file_index_hex) = cdn_config.get_last_token("file-index") {
		let file_index_key = ContentHash::parse_hex(file_index_hex)?;
		let file_index_bytes = locator
			.open_stream(&ResourceDescriptor::indice(&config.product, file_index_key))
			.await
			.with_context(|| format!("opening file index {file_index_hex}"))?;
		file_index.absorb(file_index_bytes.as_slice())?;
	}

	Ok(BuildResolver::new(config.product.clone(), locator, encoding, root, compounding, file_index))
}

async fn fetch_config(locator: &ResourceLocator, product: &str, content_key: ContentHash) -> Result<String> {
	let blob = locator
		.open_stream(&ResourceDescriptor::config(product, content_key))
		.await
		.with_context(|| format!("fetching config {}", content_key.to_hex()))?;
	String::from_utf8(blob.into_vec()).context("config is not valid UTF-8")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_cdn_hosts_are_non_empty() {
		assert!(!DEFAULT_CDN_HOSTS.is_empty());
	}
}
