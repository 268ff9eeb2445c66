//! quill-container: the `.book` file format
//!
//! Save chain: `Document → codec::serialize → Compressor → seal (AES-256-GCM,
//! header as AAD) → header::frame`. Opening runs the chain backwards and
//! dispatches on the format version; version 1 files are upgraded on read.

pub mod codec;
pub mod compress;
pub mod header;
pub mod legacy;
pub mod seal;

pub use compress::Compressor;
pub use header::{frame, inspect, unframe, ContainerHeader, ContainerInfo, FormatVersion};
pub use seal::{open, seal, Opened, SealOptions};
