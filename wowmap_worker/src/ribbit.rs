//! The Ribbit-style version poller (§4.A, §6): a small `reqwest` client for
//! the upstream pipe-delimited tables, plus the per-tick grouping logic that
//! turns raw version rows into deduplicated [`DiscoveredBuild`]s.

use anyhow::{Context, Result, bail};
use log::warn;
use std::collections::HashMap;
use wowmap_catalog::DiscoveredBuild;
use wowmap_core::{BuildVersion, ScanError};

/// One column of a Ribbit schema header, e.g. `Region!STRING:0`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldSpec {
	name: String,
}

/// A parsed pipe-delimited Ribbit table: schema header, `seqn`, data rows.
#[derive(Debug, Clone)]
pub struct RibbitTable {
	fields: Vec<FieldSpec>,
	pub seqn: u64,
	rows: Vec<Vec<String>>,
}

impl RibbitTable {
	pub fn row_count(&self) -> usize {
		self.rows.len()
	}

	pub fn get(&self, row: usize, field_name: &str) -> Option<&str> {
		let index = self.fields.iter().position(|f| f.name == field_name)?;
		self.rows.get(row)?.get(index).map(String::as_str)
	}
}

/// Parses one `Name!TYPE:WIDTH` schema column. Only the name and the
/// `TYPE:WIDTH` shape need to be present, not any particular type or width.
fn parse_field_spec(column: &str) -> Result<FieldSpec> {
	let (name, type_width) = column.split_once('!').ok_or_else(|| ScanError::SchemaError(format!("schema column '{column}' missing '!TYPE:WIDTH'")))?;
	if type_width.split_once(':').is_none() {
		bail!(ScanError::SchemaError(format!("schema column '{column}' missing ':WIDTH'")));
	}
	Ok(FieldSpec { name: name.to_string() })
}

/// Parses a full Ribbit response: line 1 is the schema header, line 2 is
/// `## seqn = <uint>`, the rest are pipe-delimited data rows. Any deviation
/// from this exact shape is a hard [`ScanError::SchemaError`] per §6.
pub fn parse_table(text: &str) -> Result<RibbitTable> {
	let mut lines = text.lines();
	let header = lines.next().ok_or_else(|| ScanError::SchemaError("empty Ribbit response".into()))?;
	let fields: Vec<FieldSpec> = header.split('|').map(parse_field_spec).collect::<Result<_>>().context("parsing Ribbit schema header")?;
	if fields.is_empty() {
		bail!(ScanError::SchemaError("Ribbit schema header has no columns".into()));
	}

	let seqn_line = lines.next().ok_or_else(|| ScanError::SchemaError("Ribbit response missing seqn line".into()))?;
	let seqn_text = seqn_line
		.strip_prefix("## seqn = ")
		.ok_or_else(|| ScanError::SchemaError(format!("expected '## seqn = <uint>', got '{seqn_line}'")))?;
	let seqn: u64 = seqn_text.trim().parse().with_context(|| format!("parsing seqn value '{seqn_text}'"))?;

	let rows: Vec<Vec<String>> = lines
		.filter(|line| !line.is_empty())
		.map(|line| line.split('|').map(str::to_string).collect())
		.collect();
	for row in &rows {
		if row.len() != fields.len() {
			bail!(ScanError::SchemaError(format!("row has {} columns, schema declares {}", row.len(), fields.len())));
		}
	}

	Ok(RibbitTable { fields, seqn, rows })
}

#[derive(Debug, Clone)]
pub struct SummaryRow {
	pub product: String,
	pub seqn: u64,
	pub flags: String,
}

pub fn parse_summary(text: &str) -> Result<Vec<SummaryRow>> {
	let table = parse_table(text)?;
	(0..table.row_count())
		.map(|row| {
			let product = table.get(row, "Product").ok_or_else(|| ScanError::SchemaError("summary row missing Product column".into()))?.to_string();
			let seqn: u64 = table
				.get(row, "Seqn")
				.ok_or_else(|| ScanError::SchemaError("summary row missing Seqn column".into()))?
				.parse()
				.context("parsing summary seqn")?;
			let flags = table.get(row, "Flags").unwrap_or_default().to_string();
			Ok(SummaryRow { product, seqn, flags })
		})
		.collect()
}

#[derive(Debug, Clone)]
pub struct VersionsRow {
	pub region: String,
	pub build_config: String,
	pub cdn_config: String,
	pub key_ring: Option<String>,
	pub versions_name: String,
	pub product_config: String,
}

pub fn parse_versions(text: &str) -> Result<Vec<VersionsRow>> {
	let table = parse_table(text)?;
	(0..table.row_count())
		.map(|row| {
			let field = |name: &str| -> Result<String> { Ok(table.get(row, name).ok_or_else(|| ScanError::SchemaError(format!("versions row missing {name} column")))?.to_string()) };
			let key_ring = table.get(row, "KeyRing").map(str::to_string).filter(|s| !s.is_empty());
			Ok(VersionsRow {
				region: field("Region")?,
				build_config: field("BuildConfig")?,
				cdn_config: field("CDNConfig")?,
				key_ring,
				versions_name: field("VersionsName")?,
				product_config: field("ProductConfig")?,
			})
		})
		.collect()
}

/// `GET /v2/summary` and `GET /v2/products/{product}/versions` (§6).
pub struct RibbitClient {
	client: reqwest::Client,
	base_url: String,
}

impl RibbitClient {
	pub fn new(base_url: impl Into<String>) -> Self {
		Self {
			client: reqwest::Client::new(),
			base_url: base_url.into(),
		}
	}

	pub async fn fetch_summary(&self) -> Result<Vec<SummaryRow>> {
		let url = format!("{}/v2/summary", self.base_url.trim_end_matches('/'));
		let body = self.client.get(&url).send().await.with_context(|| format!("GET {url}"))?.error_for_status().with_context(|| format!("GET {url}"))?.text().await?;
		parse_summary(&body)
	}

	/// A `404` maps to [`ScanError::MissingResource`] (upstream's
	/// `ProductNotFoundException`), distinguishing "this product doesn't
	/// exist upstream" from a transport failure.
	pub async fn fetch_versions(&self, product: &str) -> Result<Vec<VersionsRow>> {
		let url = format!("{}/v2/products/{product}/versions", self.base_url.trim_end_matches('/'));
		let response = self.client.get(&url).send().await.with_context(|| format!("GET {url}"))?;
		if response.status() == reqwest::StatusCode::NOT_FOUND {
			bail!(ScanError::MissingResource(format!("product {product}")));
		}
		let body = response.error_for_status().with_context(|| format!("GET {url}"))?.text().await?;
		parse_versions(&body)
	}
}

/// Groups `product`'s version rows by `(product, BuildVersion)`, validates
/// that the three config hashes agree across regions in each group, and
/// unions regions — emitting one [`DiscoveredBuild`] per surviving region
/// (§4.A). A bad group (disagreeing config hashes) fails the whole call,
/// since that breaks the catalog's dedup assumption.
fn group_versions(product: &str, rows: Vec<VersionsRow>) -> Result<Vec<DiscoveredBuild>> {
	struct Group {
		build_config: String,
		cdn_config: String,
		product_config: String,
		key_ring: Option<String>,
		regions: Vec<String>,
	}

	let mut groups: HashMap<BuildVersion, Group> = HashMap::new();
	for row in rows {
		let version = BuildVersion::parse(&row.versions_name).with_context(|| format!("parsing versions name '{}' for product {product}", row.versions_name))?;
		match groups.get_mut(&version) {
			Some(group) => {
				if group.build_config != row.build_config || group.cdn_config != row.cdn_config || group.product_config != row.product_config {
					bail!(ScanError::SchemaError(format!(
						"product {product} version {version} has disagreeing config hashes across regions"
					)));
				}
				group.regions.push(row.region);
				if group.key_ring.is_none() {
					group.key_ring = row.key_ring;
				}
			}
			None => {
				groups.insert(
					version,
					Group {
						build_config: row.build_config,
						cdn_config: row.cdn_config,
						product_config: row.product_config,
						key_ring: row.key_ring,
						regions: vec![row.region],
					},
				);
			}
		}
	}

	let mut discovered = Vec::new();
	for (version, group) in groups {
		for region in group.regions {
			discovered.push(DiscoveredBuild {
				product_name: product.to_string(),
				region,
				version,
				build_config_key: group.build_config.clone(),
				cdn_config_key: group.cdn_config.clone(),
				product_config_key: group.product_config.clone(),
				key_ring: group.key_ring.clone(),
			});
		}
	}
	Ok(discovered)
}

/// One poll tick (§4.A): fetch the summary (logged only, failures don't stop
/// the tick), then versions for each configured product. An unrecognized
/// product or an unreachable service for one product is logged and skipped;
/// the rest of the tick continues.
pub async fn poll_once(client: &RibbitClient, products: &[String]) -> Vec<DiscoveredBuild> {
	if let Err(err) = client.fetch_summary().await {
		warn!("fetching Ribbit summary: {err:#}");
	}

	let mut discovered = Vec::new();
	for product in products {
		let rows = match client.fetch_versions(product).await {
			Ok(rows) => rows,
			Err(err) => {
				warn!("fetching versions for product {product}: {err:#}");
				continue;
			}
		};
		match group_versions(product, rows) {
			Ok(mut builds) => discovered.append(&mut builds),
			Err(err) => warn!("grouping versions for product {product}: {err:#}"),
		}
	}
	discovered
}
