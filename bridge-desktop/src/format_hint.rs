//! # Probe Hints
//!
//! Builds Symphonia probe hints from the content type and origin name a
//! byte stream carries.

use std::path::Path;

use bridge_traits::attributes::{AttributeKey, Attributes};
use symphonia::core::probe::Hint;
use tracing::debug;

/// Hint for probing the stream described by `attributes`.
///
/// Missing attributes leave the probe to auto-detect the container.
pub fn hint_for_stream(attributes: &dyn Attributes) -> Hint {
    let mut hint = Hint::new();

    if let Ok(content_type) = attributes.get_string(&AttributeKey::CONTENT_TYPE) {
        debug!(%content_type, "Setting probe hint MIME type");
        hint.mime_type(&content_type);
    }

    if let Some(extension) = attributes
        .get_string(&AttributeKey::ORIGIN_NAME)
        .ok()
        .and_then(|name| extension_of(&name))
    {
        debug!(%extension, "Setting probe hint extension");
        hint.with_extension(&extension);
    }

    hint
}

/// Lowercase extension of a file name or URL, without the dot.
pub fn extension_of(name: &str) -> Option<String> {
    let name = name.split(['?', '#']).next().unwrap_or(name);
    Path::new(name)
        .extension()
        .and_then(|extension| extension.to_str())
        .filter(|extension| !extension.is_empty())
        .map(|extension| extension.to_lowercase())
}
