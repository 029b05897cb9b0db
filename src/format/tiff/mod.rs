//! TIFF structure for slide files.
//!
//! Aperio SVS and Hamamatsu NDPI are both TIFF containers. De-identification
//! needs three things from them: walk the directory chain, read an
//! associated image out of a directory, and drop a directory from the chain
//! in place.
//!
//! # Key Concepts
//!
//! - **Byte order**: TIFF files declare their endianness (II = little-endian, MM = big-endian)
//!   in the header. All multi-byte values must be read respecting this order.
//!
//! - **Classic TIFF vs BigTIFF**: Classic TIFF uses 32-bit offsets (max 4GB files),
//!   while BigTIFF uses 64-bit offsets. The parser handles both transparently.
//!
//! - **Directory chain**: each IFD ends with the offset of the next one. A
//!   [`Directory`] records where the pointer that links to it lives, so
//!   [`unlink_directory`] only has to rewrite that pointer.
//!
//! - **Inline vs offset values**: Small values are stored inline in the IFD entry,
//!   larger values are stored at an offset pointed to by the entry.

mod directory;
mod edit;
mod extract;
mod parser;
mod tags;
mod values;
mod writer;

pub use directory::{DataSegment, Directory, TiffDirectoryChain, MAX_DIRECTORIES};
pub use edit::{erase_directory, unlink_directory};
pub use extract::{capture_directory_image, MAX_ASSOCIATED_IMAGE_BYTES};
pub use parser::{ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
pub use tags::{Compression, FieldType, TiffTag};
pub use values::ValueReader;
pub use writer::{DirectoryBuilder, TagValue, TiffWriter};
