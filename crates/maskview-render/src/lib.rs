//! # maskview renderer
//!
//! Everything between processed layer geometry and the WebGL viewer: the
//! batched variable-length integer codecs, per-layer render records and the
//! data script / page emission.

pub mod assembler;
pub mod codec;
pub mod document;
pub mod record;

pub use assembler::{assemble_layer, assemble_stack, AssembleError};
pub use codec::{decode, encode, DecodeError, EncodedBuffer, EncodingRangeError, Format};
pub use document::{write_data, write_page};
pub use record::LayerRecord;
