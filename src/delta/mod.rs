//! Delta encoding: the wire format for object mutations.
//!
//! Per DELTA_FORMAT.md:
//! - One tagged value codec shared by broadcast and replication payloads
//! - Strings in three binary forms (raw, compressed, either one interned)
//! - Storage-mode decoding defers string and type decisions to the caller;
//!   applicator-mode decoding materializes them through injected
//!   collaborators
//! - Delta records replay through a forward-only, visit-once cursor

mod codec;
mod errors;
mod reader;
mod record;
mod resolver;
mod value;
mod writer;

pub use codec::{CodecMode, DeltaCodec, DEFAULT_STRING_COMPRESSION_MIN};
pub use errors::{DeltaError, DeltaResult};
pub use reader::DeltaReader;
pub use record::{
    DeltaAction, DeltaRecord, LogicalAction, LogicalOp, PhysicalAction, NULL_ARRAY_LENGTH,
    NULL_VERSION,
};
pub use resolver::{
    CachingResolver, FailingResolver, LocalResolver, PassthroughInterner, PoolInterner,
    StringInterner, TypeDescriptor, TypeResolver,
};
pub use value::{ArrayValue, ClassSpec, CompressedMeta, Utf8Bytes, Value};
pub use writer::{encode_record, DeltaWriter};
