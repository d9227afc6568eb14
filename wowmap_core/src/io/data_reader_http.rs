use super::DataReaderTrait;
use crate::{Blob, ByteRange};
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use reqwest::{Client, Method, Request, StatusCode, Url};
use std::time::Duration;

/// Reads from an HTTP(S) endpoint, used by the resource locator (§4.B) before
/// a download is cached to disk. Range requests are issued with `Range:
/// bytes=off-end` and the server's `206` + `Content-Range` response is
/// cross-checked against the requested range.
#[derive(Debug)]
pub struct DataReaderHttp {
	client: Client,
	name: String,
	url: Url,
}

impl DataReaderHttp {
	pub fn from_url(url: Url) -> Result<Box<DataReaderHttp>> {
		match url.scheme() {
			"http" | "https" => (),
			_ => bail!("url has wrong scheme {url}"),
		}
		let client = Client::builder().tcp_keepalive(Duration::from_secs(600)).build()?;
		Ok(Box::new(DataReaderHttp {
			client,
			name: url.to_string(),
			url,
		}))
	}
}

#[async_trait]
impl DataReaderTrait for DataReaderHttp {
	async fn read_range(&self, range: &ByteRange) -> Result<Blob> {
		let ctx = || format!("while reading range {range} of {}", self.url);

		let mut request = Request::new(Method::GET, self.url.clone());
		let header_value = format!("bytes={}-{}", range.offset, range.offset + range.length - 1);
		request.headers_mut().append("range", header_value.parse().with_context(ctx)?);

		let response = self.client.execute(request).await.with_context(ctx)?;
		if response.status() != StatusCode::PARTIAL_CONTENT {
			bail!("expected 206, got {}, {}", response.status(), ctx());
		}

		let content_range = response
			.headers()
			.get("content-range")
			.ok_or_else(|| anyhow!("content-range header missing, {}", ctx()))?
			.to_str()
			.with_context(ctx)?
			.to_string();

		let (start, _end) = parse_content_range(&content_range).with_context(ctx)?;
		if start != range.offset {
			bail!("content-range start {start} does not match requested offset, {}", ctx());
		}

		let bytes = response.bytes().await.with_context(ctx)?;
		Ok(Blob::from(&*bytes))
	}

	async fn read_all(&self) -> Result<Blob> {
		let ctx = || format!("while reading all of {}", self.url);
		let response = self.client.get(self.url.clone()).send().await.with_context(ctx)?;
		if !response.status().is_success() {
			bail!("expected successful response, got {}, {}", response.status(), ctx());
		}
		let bytes = response.bytes().await.with_context(ctx)?;
		Ok(Blob::from(&*bytes))
	}

	fn get_name(&self) -> &str {
		&self.name
	}
}

/// Parses `"bytes start-end/total"` into `(start, end)`.
fn parse_content_range(header: &str) -> Result<(u64, u64)> {
	let rest = header
		.strip_prefix("bytes ")
		.ok_or_else(|| anyhow!("invalid content-range header: {header}"))?;
	let (range_part, _total) = rest
		.split_once('/')
		.ok_or_else(|| anyhow!("invalid content-range header: {header}"))?;
	let (start, end) = range_part
		.split_once('-')
		.ok_or_else(|| anyhow!("invalid content-range header: {header}"))?;
	Ok((start.parse()?, end.parse()?))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn scheme_is_validated() {
		let https = Url::parse("https://example.com/data.bin").unwrap();
		assert!(DataReaderHttp::from_url(https).is_ok());

		let ftp = Url::parse("ftp://example.com/data.bin").unwrap();
		assert!(DataReaderHttp::from_url(ftp).is_err());
	}

	#[test]
	fn get_name_is_the_url() {
		let url = Url::parse("https://example.com/x").unwrap();
		let reader = DataReaderHttp::from_url(url).unwrap();
		assert_eq!(reader.get_name(), "https://example.com/x");
	}

	#[test]
	fn parses_content_range_header() {
		assert_eq!(parse_content_range("bytes 10-19/1000").unwrap(), (10, 19));
		assert!(parse_content_range("garbage").is_err());
	}
}
