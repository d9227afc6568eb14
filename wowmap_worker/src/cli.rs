//! Command-line surface (§6): `migrate`, `generate`, `service`, `sync-tiles`,
//! `generate-heightmaps`, matching the flags and exit codes named there.
//! `--connection-string` only appears on the two subcommands that touch a
//! catalog database directly; `generate`/`service` reach the remote catalog
//! over HTTP through `BACKEND_URL` (§6 Environment), per the decision
//! recorded in `DESIGN.md`. They also keep their own small local catalog
//! (under `Blizztrack:CachePath`) purely to remember which tiles they've
//! cached locally; `sync-tiles --connection-string` pointed at that same
//! path is how a later run reconciles it against the remote catalog.

use crate::build_open::{BuildOpenConfig, DEFAULT_CDN_HOSTS, open_build};
use crate::env_config;
use crate::orchestrator::{self, ScanConfig};
use crate::publish_client::PublishClient;
use crate::ribbit::{RibbitClient, poll_once};
use crate::tact_keylist::{self, KeyListClient};
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{ErrorLevel, Verbosity};
use log::{info, warn};
use std::sync::Arc;
use wildmatch::WildMatch;
use wowmap_catalog::{CatalogStore, SqliteCatalogStore};
use wowmap_cdn::TactKeyRegistry;

const DEFAULT_RIBBIT_URL: &str = "http://us.patch.battle.net:1119";
const DEFAULT_KEYLIST_URL: &str = "https://raw.githubusercontent.com/wowdev/TACTKeys/master/WoW.txt";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, propagate_version = true, disable_help_subcommand = true)]
pub struct Cli {
	#[command(subcommand)]
	command: Commands,

	#[command(flatten)]
	verbose: Verbosity<ErrorLevel>,
}

impl Cli {
	pub fn log_level_filter(&self) -> log::LevelFilter {
		self.verbose.log_level_filter()
	}
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Apply catalog schema migrations
	Migrate(MigrateArgs),
	/// Run one scan for a product/region and publish its results
	Generate(GenerateArgs),
	/// Poll for new builds continuously, scanning each as it's discovered
	Service(ServiceArgs),
	/// Re-push locally cached tiles a remote catalog hasn't seen yet
	SyncTiles(SyncTilesArgs),
	/// Generate heightmap tiles
	GenerateHeightmaps(GenerateHeightmapsArgs),
}

#[derive(clap::Args, Debug)]
pub struct MigrateArgs {
	#[arg(long)]
	connection_string: String,
}

#[derive(clap::Args, Debug)]
pub struct GenerateArgs {
	#[arg(long)]
	product: String,
	#[arg(long)]
	casc_region: String,
	/// Glob over map directory ids, a dev aid to scope a scan during testing.
	#[arg(long)]
	filter_id: Option<String>,
	#[arg(long = "additional-cdn")]
	additional_cdn: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct ServiceArgs {
	#[arg(long)]
	product: Vec<String>,
	#[arg(long)]
	casc_region: String,
	#[arg(long = "additional-cdn")]
	additional_cdn: Vec<String>,
	#[arg(long, default_value_t = 300)]
	interval_secs: u64,
}

#[derive(clap::Args, Debug)]
pub struct SyncTilesArgs {
	#[arg(long)]
	connection_string: String,
}

#[derive(clap::Args, Debug)]
pub struct GenerateHeightmapsArgs {
	#[arg(long)]
	product: String,
}

pub fn run(cli: Cli) -> Result<()> {
	let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build().context("building tokio runtime")?;
	match &cli.command {
		Commands::Migrate(args) => migrate(args),
		Commands::Generate(args) => runtime.block_on(generate(args)),
		Commands::Service(args) => runtime.block_on(service(args)),
		Commands::SyncTiles(args) => runtime.block_on(sync_tiles(args)),
		Commands::GenerateHeightmaps(args) => generate_heightmaps(args),
	}
}

fn migrate(args: &MigrateArgs) -> Result<()> {
	let store = SqliteCatalogStore::open(&args.connection_string)?;
	store.migrate()?;
	info!("migrated catalog at {}", args.connection_string);
	Ok(())
}

fn cdn_hosts(additional: &[String]) -> Vec<String> {
	let mut hosts: Vec<String> = DEFAULT_CDN_HOSTS.iter().map(|s| s.to_string()).collect();
	hosts.extend(additional.iter().cloned());
	hosts
}

async fn discover_one(product: &str, region: &str) -> Result<wowmap_catalog::DiscoveredBuild> {
	let client = RibbitClient::new(DEFAULT_RIBBIT_URL);
	let products = vec![product.to_string()];
	let discovered = poll_once(&client, &products).await;
	discovered
		.into_iter()
		.find(|build| build.region == region)
		.ok_or_else(|| anyhow::anyhow!("no build discovered for product {product} region {region}"))
}

async fn refresh_keys(registry: &TactKeyRegistry) -> Result<()> {
	// The worker's own ETag/key-registry persistence is a performance cache,
	// not the system of record, so a process-local in-memory catalog is
	// enough here (see DESIGN.md).
	let local_state = SqliteCatalogStore::open_in_memory()?;
	let key_list = KeyListClient::new(DEFAULT_KEYLIST_URL);
	let newly_learned = key_list.refresh(registry, &local_state).await?;
	if !newly_learned.is_empty() {
		let targets = tact_keylist::rescan_targets(&local_state, &newly_learned)?;
		info!("learned {} new decryption keys, {} scans queued for rescan", newly_learned.len(), targets.len());
	}
	Ok(())
}

async fn generate(args: &GenerateArgs) -> Result<()> {
	let backend_url = env_config::backend_url()?;
	let publish = PublishClient::new(backend_url);
	let local_tiles = env_config::tile_store()?;
	let local_catalog = SqliteCatalogStore::open(&env_config::local_catalog_path().to_string_lossy())?;

	let build = discover_one(&args.product, &args.casc_region).await?;
	let registry = Arc::new(TactKeyRegistry::new());
	refresh_keys(&registry).await?;

	let open_config = BuildOpenConfig {
		product: args.product.clone(),
		cache_dir: env_config::cache_dir(),
		cdn_hosts: cdn_hosts(&args.additional_cdn),
		cdn_path: format!("tpr/{}", args.product),
	};
	let resolver = Arc::new(open_build(&open_config, &build, registry).await?);

	let scan_config = ScanConfig {
		map_id_filter: args.filter_id.as_deref().map(WildMatch::new),
		..ScanConfig::default()
	};
	let scan = orchestrator::run_scan(1, resolver, &publish, local_tiles.as_ref(), &local_catalog, &scan_config, 0).await?;
	info!("scan finished in state {:?}", scan.state);
	if !scan.encrypted_maps.is_empty() {
		bail!("scan left {} key(s) blocking map decryption", scan.encrypted_maps.len());
	}
	Ok(())
}

async fn service(args: &ServiceArgs) -> Result<()> {
	let backend_url = env_config::backend_url()?;
	let publish = PublishClient::new(backend_url);
	let local_tiles = env_config::tile_store()?;
	let local_catalog = SqliteCatalogStore::open(&env_config::local_catalog_path().to_string_lossy())?;
	let registry = Arc::new(TactKeyRegistry::new());
	let ribbit = RibbitClient::new(DEFAULT_RIBBIT_URL);

	let mut interval = tokio::time::interval(std::time::Duration::from_secs(args.interval_secs));
	interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

	let mut next_product_id = 1i64;
	loop {
		interval.tick().await;
		let discovered = poll_once(&ribbit, &args.product).await;
		let accepted = match publish.publish_discovered(&discovered).await {
			Ok(accepted) => accepted,
			Err(err) => {
				warn!("publishing discovered builds: {err:#}");
				continue;
			}
		};
		if let Err(err) = refresh_keys(&registry).await {
			warn!("refreshing decryption keys: {err:#}");
		}

		for build in accepted.into_iter().filter(|b| b.region == args.casc_region) {
			let open_config = BuildOpenConfig {
				product: build.product_name.clone(),
				cache_dir: env_config::cache_dir(),
				cdn_hosts: cdn_hosts(&args.additional_cdn),
				cdn_path: format!("tpr/{}", build.product_name),
			};
			let resolver = match open_build(&open_config, &build, registry.clone()).await {
				Ok(resolver) => Arc::new(resolver),
				Err(err) => {
					warn!("opening build for {}: {err:#}", build.product_name);
					continue;
				}
			};
			let product_id = next_product_id;
			next_product_id += 1;
			let scan_config = ScanConfig::default();
			match orchestrator::run_scan(product_id, resolver, &publish, local_tiles.as_ref(), &local_catalog, &scan_config, 0).await {
				Ok(scan) => info!("scan for {} finished in state {:?}", build.product_name, scan.state),
				Err(err) => warn!("scanning {}: {err:#}", build.product_name),
			}
		}
	}
}

async fn sync_tiles(args: &SyncTilesArgs) -> Result<()> {
	let store = SqliteCatalogStore::open(&args.connection_string)?;
	let backend_url = env_config::backend_url()?;
	let publish = PublishClient::new(backend_url);
	let local_tiles = env_config::tile_store()?;

	let tiles = store.list_tiles()?;
	let hashes: Vec<String> = tiles.iter().map(|tile| tile.hash.clone()).collect();
	let missing = publish.missing_tiles(&hashes).await?;
	info!("{} of {} locally known tiles are missing remotely", missing.len(), tiles.len());

	for tile in tiles.iter().filter(|t| missing.contains(&t.hash)) {
		let hash = wowmap_core::ContentHash::parse_hex(&tile.hash)?;
		let Some(body) = local_tiles.get(hash).await? else {
			warn!("tile {} is recorded but not cached locally, skipping", tile.hash);
			continue;
		};
		publish.put_tile(hash, tile.width, tile.height, body).await?;
	}
	Ok(())
}

fn generate_heightmaps(_args: &GenerateHeightmapsArgs) -> Result<()> {
	bail!("generate-heightmaps is not implemented: no heightmap data model exists in this scan pipeline")
}

#[cfg(test)]
mod tests {
	use super::*;

	fn run_command(arg_vec: Vec<&str>) -> Result<String> {
		let cli = Cli::try_parse_from(arg_vec)?;
		Ok(format!("{cli:?}"))
	}

	#[test]
	fn help() {
		let err = Cli::try_parse_from(["wowmap-worker"]).unwrap_err().to_string();
		assert!(err.contains("Usage: wowmap-worker"));
	}

	#[test]
	fn version() {
		let err = Cli::try_parse_from(["wowmap-worker", "-V"]).unwrap_err().to_string();
		assert!(err.starts_with("wowmap-worker "));
	}

	#[test]
	fn migrate_subcommand_requires_connection_string() {
		assert!(run_command(vec!["wowmap-worker", "migrate"]).is_err());
		assert!(run_command(vec!["wowmap-worker", "migrate", "--connection-string", "db.sqlite"]).is_ok());
	}

	#[test]
	fn generate_subcommand_parses_repeatable_additional_cdn() {
		let cli = Cli::try_parse_from([
			"wowmap-worker",
			"generate",
			"--product",
			"wow",
			"--casc-region",
			"us",
			"--additional-cdn",
			"a.example.com",
			"--additional-cdn",
			"b.example.com",
		])
		.unwrap();
		match cli.command {
			Commands::Generate(args) => assert_eq!(args.additional_cdn, vec!["a.example.com", "b.example.com"]),
			_ => panic!("expected Generate"),
		}
	}

	#[test]
	fn generate_heightmaps_is_an_explicit_error() {
		let err = generate_heightmaps(&GenerateHeightmapsArgs { product: "wow".into() }).unwrap_err();
		assert!(err.to_string().contains("not implemented"));
	}
}
