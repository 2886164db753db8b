pub mod chunk;
pub mod database;
pub mod error;
pub mod pef;
pub mod pics;
pub mod pmv;
pub mod tables;

pub use chunk::{ChunkHeader, ChunkLayout, ChunkReader, Tag};
pub use database::{FormatVersion, GameDatabase, ObjectData, PropertyWrite};
pub use error::{Error, Result};
pub use pef::{SectionDescriptor, decompress_segment, unpack_pattern_data};
pub use pics::{PictureArchive, PictureEntry, PictureKind};
pub use pmv::{AudioBuffer, BlockRasterDecompressor, PmvDecoder, PmvFrame, PmvHeader, RasterDecompressor, Surface};
pub use tables::{ConditionalScript, Hotspot, Node, ResourceTables, Script, ScriptOpcode, TableLayout};
