//! Collaborator interfaces: chunk storage and tile decoding.
//!
//! The cubing pipeline never touches a storage format or an image codec
//! directly. It works through two narrow traits:
//!
//! - [`ChunkStore`] / [`ChunkWriter`]: `ensure`, `open`, header, `write`
//! - [`TileDecoder`]: dimensions, channel count, raw samples
//!
//! [`RawCubeStore`] and [`ImageTileDecoder`] are the local implementations
//! used by the binary.

mod decoder;
mod image_decoder;
mod raw_store;
mod sample;
mod storage;

pub use decoder::{DecodedTile, TileDecoder};
pub use image_decoder::{ImageTileDecoder, MAX_CHANNELS};
pub use raw_store::{RawCubeStore, RawCubeWriter, HEADER_FILE_NAME};
pub use sample::Sample;
pub use storage::{ChunkStore, ChunkWriter, StoreHeader, DEFAULT_CUBE_LENGTH};
