//! Build/CDN/product config parsing (§4.D): both are the same simple text
//! format, one `key = value` pair per line, values being a single token or a
//! space-separated list.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct Config {
	fields: HashMap<String, String>,
}

impl Config {
	pub fn parse(text: &str) -> Self {
		let mut fields = HashMap::new();
		for line in text.lines() {
			let line = line.trim();
			if line.is_empty() || line.starts_with('#') {
				continue;
			}
			if let Some((key, value)) = line.split_once('=') {
				fields.insert(key.trim().to_string(), value.trim().to_string());
			}
		}
		Self { fields }
	}

	pub fn get(&self, key: &str) -> Option<&str> {
		self.fields.get(key).map(String::as_str)
	}

	/// Splits a value into its space-separated tokens, e.g. `root`'s
	/// `content-key encoding-key` pair or `encoding`'s two-hash form.
	pub fn get_tokens(&self, key: &str) -> Option<Vec<&str>> {
		self.get(key).map(|v| v.split_whitespace().collect())
	}

	/// Most fields carry a single content hash; the last token is the
	/// encoding key when both are present (content first, encoding second).
	pub fn get_last_token(&self, key: &str) -> Option<&str> {
		self.get_tokens(key).and_then(|tokens| tokens.last().copied())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_key_value_lines_and_ignores_comments() {
		let text = "# comment\nroot = aaaa bbbb\nencoding = cccc dddd\n\nbuild-name = WOW-12345patch1\n";
		let config = Config::parse(text);
		assert_eq!(config.get("build-name"), Some("WOW-12345patch1"));
		assert_eq!(config.get_tokens("root"), Some(vec!["aaaa", "bbbb"]));
		assert_eq!(config.get_last_token("encoding"), Some("dddd"));
	}

	#[test]
	fn missing_key_returns_none() {
		let config = Config::parse("a = b\n");
		assert_eq!(config.get("missing"), None);
	}
}
