//! The map table reader (§4.E). The real client stores this as a columnar
//! DB2/WDC-family file; parsing that family in full is out of scope here, so
//! it's treated as a black box behind [`ColumnarTableSource`] and
//! [`Db2MapTableReader`] only understands the handful of columns a scan
//! needs (id, directory name, WDT FileDataID).

use anyhow::{Context, Result};
use wowmap_core::ScanError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapRow {
	pub map_id: u32,
	pub directory: String,
	pub wdt_file_id: u32,
}

/// A source of named columns, one row at a time. A real DB2/WDC reader would
/// implement this over the on-disk column layout; tests and the minimal
/// reader below implement it over something simpler.
pub trait ColumnarTableSource {
	fn row_count(&self) -> usize;
	fn column(&self, row: usize, name: &str) -> Option<&str>;
}

/// Reads `id` / `directory` / `wdtFileDataID` columns out of any
/// [`ColumnarTableSource`]. Deliberately ignorant of everything else the map
/// table carries (expansion ID, flags, minimap icon scale, ...).
pub struct Db2MapTableReader;

impl Db2MapTableReader {
	pub fn read_rows(source: &dyn ColumnarTableSource) -> Result<Vec<MapRow>> {
		let mut rows = Vec::with_capacity(source.row_count());
		for row in 0..source.row_count() {
			let map_id = parse_column(source, row, "id")?;
			let directory = source
				.column(row, "directory")
				.ok_or_else(|| ScanError::SchemaError(format!("map table row {row} missing directory column")))?
				.to_string();
			let wdt_file_id = parse_column(source, row, "wdtFileDataID")?;
			rows.push(MapRow {
				map_id,
				directory,
				wdt_file_id,
			});
		}
		Ok(rows)
	}
}

fn parse_column(source: &dyn ColumnarTableSource, row: usize, name: &str) -> Result<u32> {
	let raw = source
		.column(row, name)
		.ok_or_else(|| ScanError::SchemaError(format!("map table row {row} missing {name} column")))?;
	raw.parse::<u32>().with_context(|| format!("map table row {row} column {name} is not a u32: {raw:?}"))
}

/// A [`ColumnarTableSource`] backed by a tab-separated text blob, one header
/// row naming the columns followed by one data row per line. Good enough for
/// the minimal table extraction this crate performs; not a DB2/WDC parser.
pub struct TsvTableSource {
	header: Vec<String>,
	rows: Vec<Vec<String>>,
}

impl TsvTableSource {
	pub fn parse(text: &str) -> Result<Self> {
		let mut lines = text.lines();
		let header: Vec<String> = lines
			.next()
			.ok_or_else(|| ScanError::SchemaError("map table is empty".into()))?
			.split('\t')
			.map(str::to_string)
			.collect();
		let rows = lines
			.filter(|line| !line.is_empty())
			.map(|line| line.split('\t').map(str::to_string).collect())
			.collect();
		Ok(Self { header, rows })
	}
}

impl ColumnarTableSource for TsvTableSource {
	fn row_count(&self) -> usize {
		self.rows.len()
	}

	fn column(&self, row: usize, name: &str) -> Option<&str> {
		let index = self.header.iter().position(|h| h == name)?;
		self.rows.get(row)?.get(index).map(String::as_str)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn reads_rows_from_a_tsv_table() {
		let text = "id\tdirectory\twdtFileDataID\n0\tAzeroth\t775971\n1\tKalimdor\t775976\n";
		let source = TsvTableSource::parse(text).unwrap();
		let rows = Db2MapTableReader::read_rows(&source).unwrap();
		assert_eq!(rows.len(), 2);
		assert_eq!(rows[0], MapRow { map_id: 0, directory: "Azeroth".into(), wdt_file_id: 775971 });
		assert_eq!(rows[1].directory, "Kalimdor");
	}

	#[test]
	fn missing_column_is_a_schema_error() {
		let source = TsvTableSource::parse("id\n0\n").unwrap();
		assert!(Db2MapTableReader::read_rows(&source).is_err());
	}

	#[test]
	fn non_numeric_id_is_a_schema_error() {
		let source = TsvTableSource::parse("id\tdirectory\twdtFileDataID\nnotanumber\tAzeroth\t1\n").unwrap();
		assert!(Db2MapTableReader::read_rows(&source).is_err());
	}
}
