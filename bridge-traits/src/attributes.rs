//! Attribute Bags
//!
//! GUID-keyed property bags attached to platform objects. The decode
//! pipeline's resolver reads [`AttributeKey::CONTENT_TYPE`] and
//! [`AttributeKey::ORIGIN_NAME`] from a byte stream to pick a container
//! parser; pipeline creation reads its own configuration keys.

use std::fmt;

use bytes::Bytes;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{BridgeError, Result};

/// GUID identifying an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeKey(pub Uuid);

impl AttributeKey {
    /// MIME type of the bytes behind a stream.
    pub const CONTENT_TYPE: AttributeKey =
        AttributeKey(Uuid::from_u128(0xfc358288_3cb6_460c_a424_b6681260375a));

    /// Original URL or file name of a stream.
    pub const ORIGIN_NAME: AttributeKey =
        AttributeKey(Uuid::from_u128(0xfc358289_3cb6_460c_a424_b6681260375a));

    /// Allow hardware codecs when building a pipeline.
    pub const ENABLE_HARDWARE_TRANSFORMS: AttributeKey =
        AttributeKey(Uuid::from_u128(0xa634a91c_822b_41b9_a494_4de4643612b0));

    /// Container requested from a sink pipeline.
    pub const TRANSCODE_CONTAINER_TYPE: AttributeKey =
        AttributeKey(Uuid::from_u128(0x150ff23f_4abc_478b_ac4f_e1916fba1cca));

    pub const fn new(id: Uuid) -> Self {
        Self(id)
    }
}

const WELL_KNOWN_KEYS: [(AttributeKey, &str); 4] = [
    (AttributeKey::CONTENT_TYPE, "content-type"),
    (AttributeKey::ORIGIN_NAME, "origin-name"),
    (AttributeKey::ENABLE_HARDWARE_TRANSFORMS, "enable-hardware-transforms"),
    (AttributeKey::TRANSCODE_CONTAINER_TYPE, "transcode-container-type"),
];

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match WELL_KNOWN_KEYS.iter().find(|(key, _)| key == self) {
            Some((_, name)) => f.write_str(name),
            None => write!(f, "{{{}}}", self.0),
        }
    }
}

/// Typed attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    U32(u32),
    U64(u64),
    F64(f64),
    Guid(Uuid),
    String(String),
    Blob(Bytes),
}

impl AttributeValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::U32(_) => "u32",
            AttributeValue::U64(_) => "u64",
            AttributeValue::F64(_) => "f64",
            AttributeValue::Guid(_) => "guid",
            AttributeValue::String(_) => "string",
            AttributeValue::Blob(_) => "blob",
        }
    }
}

/// Property bag interface shared by platform objects.
///
/// Typed getters fail with [`BridgeError::AttributeNotFound`] for missing keys
/// and [`BridgeError::AttributeTypeMismatch`] when the stored value has a
/// different type.
pub trait Attributes: Send + Sync {
    fn get_item(&self, key: &AttributeKey) -> Result<AttributeValue>;

    fn set_item(&self, key: AttributeKey, value: AttributeValue) -> Result<()>;

    fn delete_item(&self, key: &AttributeKey) -> Result<()>;

    fn delete_all_items(&self) -> Result<()>;

    fn count(&self) -> usize;

    /// Key and value at `index`, in insertion order.
    fn item_by_index(&self, index: usize) -> Result<(AttributeKey, AttributeValue)>;

    fn contains(&self, key: &AttributeKey) -> bool {
        self.get_item(key).is_ok()
    }

    /// True when `key` is present and equal to `value`.
    fn compare_item(&self, key: &AttributeKey, value: &AttributeValue) -> bool {
        self.get_item(key).map(|v| &v == value).unwrap_or(false)
    }

    /// Copy every item into `dest`, overwriting keys it already has.
    fn copy_all_items(&self, dest: &dyn Attributes) -> Result<()> {
        for index in 0..self.count() {
            let (key, value) = self.item_by_index(index)?;
            dest.set_item(key, value)?;
        }
        Ok(())
    }

    fn get_u32(&self, key: &AttributeKey) -> Result<u32> {
        match self.get_item(key)? {
            AttributeValue::U32(v) => Ok(v),
            other => Err(mismatch(key, "u32", &other)),
        }
    }

    fn set_u32(&self, key: AttributeKey, value: u32) -> Result<()> {
        self.set_item(key, AttributeValue::U32(value))
    }

    fn get_u64(&self, key: &AttributeKey) -> Result<u64> {
        match self.get_item(key)? {
            AttributeValue::U64(v) => Ok(v),
            other => Err(mismatch(key, "u64", &other)),
        }
    }

    fn get_guid(&self, key: &AttributeKey) -> Result<Uuid> {
        match self.get_item(key)? {
            AttributeValue::Guid(v) => Ok(v),
            other => Err(mismatch(key, "guid", &other)),
        }
    }

    fn get_string(&self, key: &AttributeKey) -> Result<String> {
        match self.get_item(key)? {
            AttributeValue::String(v) => Ok(v),
            other => Err(mismatch(key, "string", &other)),
        }
    }

    fn set_string(&self, key: AttributeKey, value: &str) -> Result<()> {
        self.set_item(key, AttributeValue::String(value.to_string()))
    }

    fn get_blob(&self, key: &AttributeKey) -> Result<Bytes> {
        match self.get_item(key)? {
            AttributeValue::Blob(v) => Ok(v),
            other => Err(mismatch(key, "blob", &other)),
        }
    }
}

fn mismatch(key: &AttributeKey, expected: &str, found: &AttributeValue) -> BridgeError {
    BridgeError::AttributeTypeMismatch(format!(
        "{} holds {}, expected {}",
        key,
        found.type_name(),
        expected
    ))
}

/// In-memory attribute bag preserving insertion order.
#[derive(Debug, Default)]
pub struct AttributeStore {
    items: RwLock<Vec<(AttributeKey, AttributeValue)>>,
}

impl AttributeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with `items`; later duplicates of a key win.
    pub fn from_items(items: impl IntoIterator<Item = (AttributeKey, AttributeValue)>) -> Self {
        let mut seeded: Vec<(AttributeKey, AttributeValue)> = Vec::new();
        for (key, value) in items {
            match seeded.iter_mut().find(|(k, _)| *k == key) {
                Some((_, existing)) => *existing = value,
                None => seeded.push((key, value)),
            }
        }
        Self {
            items: RwLock::new(seeded),
        }
    }
}

impl Attributes for AttributeStore {
    fn get_item(&self, key: &AttributeKey) -> Result<AttributeValue> {
        self.items
            .read()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| BridgeError::AttributeNotFound(key.to_string()))
    }

    fn set_item(&self, key: AttributeKey, value: AttributeValue) -> Result<()> {
        let mut items = self.items.write();
        match items.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => items.push((key, value)),
        }
        Ok(())
    }

    fn delete_item(&self, key: &AttributeKey) -> Result<()> {
        self.items.write().retain(|(k, _)| k != key);
        Ok(())
    }

    fn delete_all_items(&self) -> Result<()> {
        self.items.write().clear();
        Ok(())
    }

    fn count(&self) -> usize {
        self.items.read().len()
    }

    fn item_by_index(&self, index: usize) -> Result<(AttributeKey, AttributeValue)> {
        self.items
            .read()
            .get(index)
            .cloned()
            .ok_or_else(|| BridgeError::InvalidArgument(format!("attribute index {}", index)))
    }
}
