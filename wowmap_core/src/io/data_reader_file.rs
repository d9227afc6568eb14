use super::DataReaderTrait;
use crate::{Blob, ByteRange};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Reads from a file already resolved to local disk — the terminal case for
/// every resource the locator hands back (§4.B).
#[derive(Debug)]
pub struct DataReaderFile {
	path: PathBuf,
	name: String,
}

impl DataReaderFile {
	pub fn from_path(path: &Path) -> Result<Box<DataReaderFile>> {
		Ok(Box::new(DataReaderFile {
			path: path.to_path_buf(),
			name: path.display().to_string(),
		}))
	}
}

#[async_trait]
impl DataReaderTrait for DataReaderFile {
	async fn read_range(&self, range: &ByteRange) -> Result<Blob> {
		let blob = self.read_all().await?;
		blob.read_range(range)
			.with_context(|| format!("while reading range {range} of {}", self.name))
	}

	async fn read_all(&self) -> Result<Blob> {
		Blob::load_from_file(&self.path).with_context(|| format!("while reading {}", self.name))
	}

	fn get_name(&self) -> &str {
		&self.name
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn reads_full_and_ranged_bytes() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("data.bin");
		std::fs::write(&path, b"0123456789").unwrap();

		let reader = DataReaderFile::from_path(&path).unwrap();
		assert_eq!(reader.read_all().await.unwrap().as_slice(), b"0123456789");
		assert_eq!(
			reader.read_range(&ByteRange::new(2, 3)).await.unwrap().as_slice(),
			b"234"
		);
	}

	#[tokio::test]
	async fn missing_file_is_an_error() {
		let reader = DataReaderFile::from_path(Path::new("/nonexistent/path/x")).unwrap();
		assert!(reader.read_all().await.is_err());
	}
}
