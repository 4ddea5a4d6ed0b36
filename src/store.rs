//! Document store boundary.
//!
//! The pipeline hands finished assets to a key-value document store through
//! [`DocumentStore`]: put a [`StoredRecord`], get it back by opaque id,
//! delete it. The bundled [`FsStore`] keeps one pretty-printed JSON document
//! per record in a directory.
//!
//! ## Content addressing
//!
//! `FsStore` ids are the SHA-256 hex of the serialized document. Storing an
//! identical record twice keeps one document; two products that share a
//! photo but differ in title, description or file name get one each.
//!
//! ```text
//! store/
//! ├── 3f8a…c1.json
//! └── 9b02…7e.json
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid document id: {0:?}")]
    InvalidId(String),
}

/// What gets persisted for one accepted asset.
///
/// Field names are camelCase on the wire to match the document schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    /// Data URL of the encoded image.
    pub binary_encoded_as_text: String,
    pub width: u32,
    pub height: u32,
    /// Final encode quality, 0.0–1.0.
    pub quality: f64,
    pub original_file_name: String,
    pub original_byte_size: u64,
    pub converted_from_legacy_format: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Binary size of the encoded image.
    pub byte_size: u64,
    pub passes: u32,
    pub within_budget: bool,
}

pub trait DocumentStore: Send + Sync {
    /// Persist a record and return its id.
    fn put(&self, record: &StoredRecord) -> Result<String, StoreError>;

    fn get(&self, id: &str) -> Result<Option<StoredRecord>, StoreError>;

    /// Remove a record. Returns whether anything was there.
    fn delete(&self, id: &str) -> Result<bool, StoreError>;
}

/// SHA-256 of a serialized document, as a hex string.
fn document_id(json: &str) -> String {
    format!("{:x}", Sha256::digest(json.as_bytes()))
}

fn is_valid_id(id: &str) -> bool {
    id.len() == 64 && id.bytes().all(|b| b.is_ascii_hexdigit())
}

/// JSON-file document store rooted at a directory.
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Open (creating if needed) a store at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, StoreError> {
        if !is_valid_id(id) {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        Ok(self.root.join(format!("{id}.json")))
    }
}

impl DocumentStore for FsStore {
    fn put(&self, record: &StoredRecord) -> Result<String, StoreError> {
        let json = serde_json::to_string_pretty(record)?;
        let id = document_id(&json);
        let path = self.path_for(&id)?;
        if path.exists() {
            tracing::warn!(%id, file = %record.original_file_name, "identical record already stored");
        }
        std::fs::write(path, json)?;
        Ok(id)
    }

    fn get(&self, id: &str) -> Result<Option<StoredRecord>, StoreError> {
        let content = match std::fs::read_to_string(self.path_for(id)?) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        match std::fs::remove_file(self.path_for(id)?) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
