//! # Byte-Stream Bridge
//!
//! Adapters that present caller-owned byte streams as platform
//! [`ByteStream`](bridge_traits::ByteStream)s, so decode and encode pipelines
//! can read from and write to them.
//!
//! ## Architecture
//!
//! ```text
//! caller InputStream  ──▶ InputByteStream  ──▶ DecodePipeline
//! caller OutputStream ◀── OutputByteStream ◀── EncodePipeline
//!                               │
//!                               └─ begin_write ─▶ WorkQueue ─▶ invoke
//! ```
//!
//! Each adapter wraps exactly one caller stream, shared through an
//! `Arc<Mutex<..>>` the caller keeps a clone of. Adapters carry an attribute
//! bag whose MIME type and origin name are fixed at construction; pipelines
//! read them to pick a container parser.

mod input;
mod output;

pub use input::InputByteStream;
pub use output::{AsyncWriteRequest, OutputByteStream};

use bridge_traits::{
    attributes::{AttributeKey, AttributeStore, AttributeValue, Attributes},
    error::{BridgeError, Result},
};
use tracing::debug;

/// Construction parameters shared by both adapters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamDescriptor {
    /// MIME type of the stream's bytes (e.g. `audio/mp4`).
    pub content_type: Option<String>,
    /// File name or URL the bytes came from.
    pub origin_name: Option<String>,
    /// The stream is backed by a network resource.
    pub is_remote: bool,
}

impl StreamDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_origin_name(mut self, origin_name: impl Into<String>) -> Self {
        self.origin_name = Some(origin_name.into());
        self
    }

    pub fn with_remote(mut self, is_remote: bool) -> Self {
        self.is_remote = is_remote;
        self
    }
}

/// Attribute bag of an adapter. Content type and origin name are set once
/// and cannot be changed or removed afterwards.
#[derive(Debug)]
pub struct StreamAttributes {
    store: AttributeStore,
}

impl StreamAttributes {
    pub fn new(descriptor: &StreamDescriptor) -> Self {
        let fixed = [
            (AttributeKey::CONTENT_TYPE, descriptor.content_type.as_ref()),
            (AttributeKey::ORIGIN_NAME, descriptor.origin_name.as_ref()),
        ];
        let store = AttributeStore::from_items(fixed.into_iter().filter_map(|(key, value)| {
            value.map(|v| (key, AttributeValue::String(v.clone())))
        }));
        Self { store }
    }

    fn is_fixed(key: &AttributeKey) -> bool {
        *key == AttributeKey::CONTENT_TYPE || *key == AttributeKey::ORIGIN_NAME
    }

    fn reject_fixed(key: &AttributeKey) -> Result<()> {
        if Self::is_fixed(key) {
            return Err(BridgeError::AttributeReadOnly(key.to_string()));
        }
        Ok(())
    }
}

impl Attributes for StreamAttributes {
    fn get_item(&self, key: &AttributeKey) -> Result<AttributeValue> {
        self.store.get_item(key)
    }

    fn set_item(&self, key: AttributeKey, value: AttributeValue) -> Result<()> {
        Self::reject_fixed(&key)?;
        self.store.set_item(key, value)
    }

    fn delete_item(&self, key: &AttributeKey) -> Result<()> {
        Self::reject_fixed(key)?;
        self.store.delete_item(key)
    }

    fn delete_all_items(&self) -> Result<()> {
        let removable: Vec<AttributeKey> = (0..self.store.count())
            .filter_map(|index| self.store.item_by_index(index).ok())
            .map(|(key, _)| key)
            .filter(|key| !Self::is_fixed(key))
            .collect();
        for key in removable {
            self.store.delete_item(&key)?;
        }
        Ok(())
    }

    fn count(&self) -> usize {
        self.store.count()
    }

    fn item_by_index(&self, index: usize) -> Result<(AttributeKey, AttributeValue)> {
        self.store.item_by_index(index)
    }
}

/// Log and report an operation the adapter does not support.
pub(crate) fn not_implemented<T>(operation: &'static str) -> Result<T> {
    debug!(operation, "Byte stream operation not implemented");
    Err(BridgeError::NotImplemented(operation))
}
