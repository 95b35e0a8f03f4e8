//! Reference [`EventWriter`](crate::EventWriter) implementations.

mod log;
mod object;
#[cfg(feature = "s3")]
mod s3;

pub use self::log::LogWriter;
pub use object::{
    MemoryObjectStore, ObjectStorageConfig, ObjectStorageWriter, ObjectStore, ObjectStoreError,
    PutObject, PutReceipt,
};
#[cfg(feature = "s3")]
pub use s3::S3ObjectStore;
