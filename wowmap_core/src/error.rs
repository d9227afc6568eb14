//! Error taxonomy shared by the locator, BLTE codec, filesystem resolver, and
//! orchestrator (see §7 of the design doc).
//!
//! Most call sites propagate through `anyhow::Result`, but a few callers need
//! to branch on *which* failure happened (a missing decryption key moves a
//! scan into a different state than a malformed WDT does), so those cases are
//! a typed enum instead of an opaque `anyhow::Error`.

use std::fmt;

/// The non-transient error taxonomy from §7. Transient failures (timeouts,
/// 5xx, 429) never reach this type — they're retried inside the locator and
/// only escalate here once retries are exhausted, at which point they show up
/// as `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
	/// The resource could not be found (404, or an empty locator response).
	/// Not retried.
	MissingResource(String),
	/// A BLTE `E` block referenced a key name absent from the TACT key
	/// registry. Carries the key name so callers can record it.
	DecryptionKeyMissing(String),
	/// Configs themselves could not be decoded because a key is missing.
	EncryptedBuild(String),
	/// An MD5 validation mismatch. Fatal for the containing operation.
	IntegrityError { expected: String, actual: String },
	/// Upstream responded with an unexpected shape (schema mismatch).
	SchemaError(String),
	/// Malformed domain data: a bad WDT, a missing `MAID` chunk, a BLTE
	/// stream handed to a raw-bytes parser.
	DataError(String),
}

impl fmt::Display for ScanError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ScanError::MissingResource(what) => write!(f, "resource not found: {what}"),
			ScanError::DecryptionKeyMissing(key) => write!(f, "missing decryption key {key}"),
			ScanError::EncryptedBuild(key) => write!(f, "build configs encrypted, missing key {key}"),
			ScanError::IntegrityError { expected, actual } => {
				write!(f, "integrity check failed: expected {expected}, got {actual}")
			}
			ScanError::SchemaError(msg) => write!(f, "unexpected upstream schema: {msg}"),
			ScanError::DataError(msg) => write!(f, "malformed data: {msg}"),
		}
	}
}

impl std::error::Error for ScanError {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn display_includes_key_name() {
		let err = ScanError::DecryptionKeyMissing("1234567890ABCDEF".into());
		assert_eq!(err.to_string(), "missing decryption key 1234567890ABCDEF");
	}
}
