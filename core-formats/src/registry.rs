//! # Format Registry
//!
//! Holds the formats a host knows about and picks one by file name.

use std::path::Path;
use std::sync::Arc;

use bridge_traits::stream::SharedInputStream;
use tracing::{debug, info};

use crate::{
    error::{FormatError, Result},
    traits::{AudioFormat, AudioFormatReader},
};

/// Ordered collection of [`AudioFormat`]s; earlier registrations win.
#[derive(Default)]
pub struct FormatRegistry {
    formats: Vec<Arc<dyn AudioFormat>>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, format: Arc<dyn AudioFormat>) {
        info!(format = format.name(), "Registered audio format");
        self.formats.push(format);
    }

    pub fn formats(&self) -> &[Arc<dyn AudioFormat>] {
        &self.formats
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    pub fn find_format_for_file(&self, path: &Path) -> Option<Arc<dyn AudioFormat>> {
        self.formats
            .iter()
            .find(|format| format.can_handle_file(path))
            .cloned()
    }

    /// Semicolon-separated glob list of every registered extension, e.g.
    /// `*.mp4;*.aac;*.3gp`.
    pub fn wildcard_for_all_formats(&self) -> String {
        let mut patterns: Vec<String> = Vec::new();
        for format in &self.formats {
            for extension in format.file_extensions() {
                let pattern = format!("*{}", extension);
                if !patterns.contains(&pattern) {
                    patterns.push(pattern);
                }
            }
        }
        patterns.join(";")
    }

    /// Open a reader with the first format that claims `path`.
    pub fn create_reader_for_file(
        &self,
        path: &Path,
        stream: SharedInputStream,
    ) -> Result<Box<dyn AudioFormatReader>> {
        let format = self
            .find_format_for_file(path)
            .ok_or_else(|| FormatError::NoMatchingFormat(path.display().to_string()))?;
        debug!(format = format.name(), path = %path.display(), "Opening reader");
        format.create_reader_for(stream)
    }
}
