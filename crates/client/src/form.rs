//! Multipart payload for a job submission.
//!
//! The server expects the evolution parameters as form fields and the
//! reaction, reactant, receptor and anchor files as file parts. A
//! [`JobForm`] can be built in code or loaded from a JSON manifest:
//!
//! ```json
//! {
//!   "fields": { "generationSize": 50, "selectionMethod": "Truncated" },
//!   "files": { "reactantFiles": ["amines.smi", "acids.smi"] }
//! }
//! ```
//!
//! Relative file paths are resolved against the manifest's directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        bytes: Vec<u8>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobForm {
    parts: Vec<FormPart>,
}

/// Errors from loading a form manifest.
#[derive(Debug, thiserror::Error)]
pub enum FormError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid form manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct FormManifest {
    #[serde(default)]
    fields: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    files: BTreeMap<String, Vec<PathBuf>>,
}

impl JobForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(FormPart::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        self.parts.push(FormPart::File {
            name: name.into(),
            file_name: file_name.into(),
            bytes,
        });
        self
    }

    pub fn parts(&self) -> &[FormPart] {
        &self.parts
    }

    /// Load a form from a JSON manifest, reading every referenced file.
    pub async fn from_manifest(path: &Path) -> Result<Self, FormError> {
        let raw = tokio::fs::read(path).await.map_err(|source| FormError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest: FormManifest = serde_json::from_slice(&raw)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));

        let mut form = Self::new();
        for (name, value) in manifest.fields {
            form = form.text(name, field_text(value));
        }
        for (name, files) in manifest.files {
            for file in files {
                let full = base.join(&file);
                let bytes = tokio::fs::read(&full).await.map_err(|source| FormError::Io {
                    path: full.clone(),
                    source,
                })?;
                let file_name = file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| name.clone());
                form = form.file(name.clone(), file_name, bytes);
            }
        }
        Ok(form)
    }

    /// Build the multipart body. A new body is needed per request.
    pub fn to_multipart(&self) -> reqwest::multipart::Form {
        self.parts
            .iter()
            .fold(reqwest::multipart::Form::new(), |form, part| match part {
                FormPart::Text { name, value } => form.text(name.clone(), value.clone()),
                FormPart::File {
                    name,
                    file_name,
                    bytes,
                } => form.part(
                    name.clone(),
                    reqwest::multipart::Part::bytes(bytes.clone()).file_name(file_name.clone()),
                ),
            })
    }
}

/// Strings go through verbatim; everything else as its JSON text.
fn field_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text,
        other => other.to_string(),
    }
}
