//! A `(expansion, major, minor, build)` version tuple bit-packed into a
//! sortable, non-negative `i64` (§3):
//!
//! ```text
//! bit 63       62            52            42            32             0
//!  +---+----------------+-----------+-----------+------------------------+
//!  | 0 | expansion (11) | major(10) | minor(10) |        build (32)      |
//!  +---+----------------+-----------+-----------+------------------------+
//! ```
//!
//! The leading sign bit is always zero, which is what lets two `BuildVersion`s
//! compare correctly as plain signed integers (and keeps them representable
//! in JS's 53-bit-safe-integer clients when rendered as a string, per §6).

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt;

const EXPANSION_BITS: u32 = 11;
const MAJOR_BITS: u32 = 10;
const MINOR_BITS: u32 = 10;
const BUILD_BITS: u32 = 32;

const EXPANSION_MAX: u32 = (1 << EXPANSION_BITS) - 1;
const MAJOR_MAX: u32 = (1 << MAJOR_BITS) - 1;
const MINOR_MAX: u32 = (1 << MINOR_BITS) - 1;

const BUILD_SHIFT: u32 = 0;
const MINOR_SHIFT: u32 = BUILD_SHIFT + BUILD_BITS;
const MAJOR_SHIFT: u32 = MINOR_SHIFT + MINOR_BITS;
const EXPANSION_SHIFT: u32 = MAJOR_SHIFT + MAJOR_BITS;

#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct BuildVersion {
	expansion: u32,
	major: u32,
	minor: u32,
	build: u32,
}

impl BuildVersion {
	pub fn new(expansion: u32, major: u32, minor: u32, build: u32) -> Result<Self> {
		if expansion > EXPANSION_MAX {
			bail!("expansion {expansion} exceeds {EXPANSION_BITS}-bit range");
		}
		if major > MAJOR_MAX {
			bail!("major {major} exceeds {MAJOR_BITS}-bit range");
		}
		if minor > MINOR_MAX {
			bail!("minor {minor} exceeds {MINOR_BITS}-bit range");
		}
		Ok(Self { expansion, major, minor, build })
	}

	/// Parses the dotted `"a.b.c.d"` form used in Ribbit version responses.
	pub fn parse(text: &str) -> Result<Self> {
		let parts: Vec<&str> = text.trim().split('.').collect();
		if parts.len() != 4 {
			bail!("expected 4 dot-separated components in version string '{text}'");
		}
		let mut nums = [0u32; 4];
		for (i, part) in parts.iter().enumerate() {
			nums[i] = part
				.parse::<u32>()
				.with_context(|| format!("invalid numeric component '{part}' in '{text}'"))?;
		}
		Self::new(nums[0], nums[1], nums[2], nums[3])
	}

	/// Packs into the sortable non-negative `i64` described above.
	#[must_use]
	pub fn encode(self) -> i64 {
		let packed = (u64::from(self.expansion) << EXPANSION_SHIFT)
			| (u64::from(self.major) << MAJOR_SHIFT)
			| (u64::from(self.minor) << MINOR_SHIFT)
			| u64::from(self.build);
		packed as i64
	}

	/// Inverse of [`encode`](Self::encode).
	pub fn decode(encoded: i64) -> Result<Self> {
		if encoded < 0 {
			bail!("encoded build version must be non-negative, got {encoded}");
		}
		let packed = encoded as u64;
		let expansion = ((packed >> EXPANSION_SHIFT) & u64::from(EXPANSION_MAX)) as u32;
		let major = ((packed >> MAJOR_SHIFT) & u64::from(MAJOR_MAX)) as u32;
		let minor = ((packed >> MINOR_SHIFT) & u64::from(MINOR_MAX)) as u32;
		let build = (packed & u64::from(u32::MAX)) as u32;
		Ok(Self { expansion, major, minor, build })
	}

	#[must_use]
	pub fn expansion(self) -> u32 {
		self.expansion
	}

	#[must_use]
	pub fn build(self) -> u32 {
		self.build
	}
}

impl fmt::Display for BuildVersion {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}.{}.{}", self.expansion, self.major, self.minor, self.build)
	}
}

impl fmt::Debug for BuildVersion {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "BuildVersion({self})")
	}
}

impl From<BuildVersion> for String {
	fn from(version: BuildVersion) -> Self {
		version.to_string()
	}
}

impl TryFrom<String> for BuildVersion {
	type Error = anyhow::Error;

	fn try_from(text: String) -> Result<Self> {
		Self::parse(&text)
	}
}
