//! The TACT filesystem resolver (§4.D): turns the build's config files,
//! encoding table, root file, and group-archive indices into a single
//! `OpenByFileId` / `OpenByContentKey` surface for the scanner.

pub mod config;
pub mod encoding;
pub mod index;
pub mod install;
pub mod resolver;
pub mod root;

pub use config::Config;
pub use encoding::EncodingFile;
pub use index::{ArchiveId, ArchiveLocation, CompoundingIndex, FileIndex};
pub use install::InstallFile;
pub use resolver::BuildResolver;
pub use root::RootFile;
