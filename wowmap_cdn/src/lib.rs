//! The CDN-backed content-addressed resource locator (§4.B) and the BLTE
//! block codec (§4.C) that sits on top of it.

mod blte;
mod descriptor;
mod locator;
mod rate_limiter;
mod retry;
mod tact_keys;

pub use blte::{BLTE_MAX_RECURSION_DEPTH, parse_blte};
pub use descriptor::{ResourceDescriptor, ResourceKind};
pub use locator::{LocatorConfig, ResourceLocator};
pub use rate_limiter::RateLimiter;
pub use tact_keys::{TactKeyRegistry, parse_key_list_line};
