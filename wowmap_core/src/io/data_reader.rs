//! A small trait for reading byte ranges from a data source, independent of
//! whether the source is a local file, an HTTP endpoint, or (in tests) a
//! plain in-memory buffer.

use crate::{Blob, ByteRange};
use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;

pub type DataReader = Box<dyn DataReaderTrait>;

#[async_trait]
pub trait DataReaderTrait: Debug + Send + Sync {
	async fn read_range(&self, range: &ByteRange) -> Result<Blob>;
	async fn read_all(&self) -> Result<Blob>;
	fn get_name(&self) -> &str;
}
