//! Decoders for the map-table (§4.E), WDT (§4.F), and texture (§4.G) formats
//! a scan reads, plus the tile encoder (§4.H) that writes what a scan
//! publishes.

pub mod map_table;
pub mod texture;
pub mod tile_encoder;
pub mod wdt;

pub use map_table::{ColumnarTableSource, Db2MapTableReader, MapRow, TsvTableSource};
pub use texture::{RgbaImage, decode_blp};
pub use tile_encoder::encode_tile_webp;
pub use wdt::WdtParser;
