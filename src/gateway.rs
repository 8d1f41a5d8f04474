mod dir;
mod memory;

pub use dir::DirGateway;
pub use memory::MemoryGateway;

use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use uuid::Uuid;

use crate::model::{DiagramData, Tree, TreeSummary};

pub const ALLOWED_PHOTO_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];

static EXTENSION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.([A-Za-z0-9]+)$").unwrap());

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("tree not found: {0}")]
    NotFound(String),

    #[error("no file selected")]
    EmptyFileName,

    #[error("invalid file type: {0}")]
    InvalidFileType(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed tree record {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl GatewayError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Storage for trees and their uploaded photos.
pub trait TreeGateway {
    /// Summaries of every stored tree, most recently updated first.
    fn list_trees(&self) -> Result<Vec<TreeSummary>, GatewayError>;

    /// Creates an empty tree; `None` uses the default name.
    fn create_tree(&mut self, name: Option<&str>) -> Result<Tree, GatewayError>;

    fn fetch_tree(&self, id: &str) -> Result<Tree, GatewayError>;

    /// Replaces the stored name and document of an existing tree.
    fn replace_tree(&mut self, id: &str, name: &str, data: &DiagramData) -> Result<(), GatewayError>;

    fn delete_tree(&mut self, id: &str) -> Result<(), GatewayError>;

    /// Stores a photo for a tree and returns the url to put in `photoRef`.
    fn upload_photo(&mut self, tree_id: &str, file_name: &str, bytes: &[u8]) -> Result<String, GatewayError>;
}

/// Validates an upload's file name and returns its lower-cased extension.
pub fn photo_extension(file_name: &str) -> Result<String, GatewayError> {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name).trim();
    if base.is_empty() {
        return Err(GatewayError::EmptyFileName);
    }
    let extension = EXTENSION_RE
        .captures(base)
        .and_then(|captures| captures.get(1))
        .map(|found| found.as_str().to_ascii_lowercase())
        .ok_or_else(|| GatewayError::InvalidFileType(base.to_string()))?;
    if ALLOWED_PHOTO_EXTENSIONS.contains(&extension.as_str()) {
        Ok(extension)
    } else {
        Err(GatewayError::InvalidFileType(base.to_string()))
    }
}

/// Random collision-free file name for an upload, keeping its extension.
pub(crate) fn upload_file_name(extension: &str) -> String {
    format!("{}.{extension}", Uuid::new_v4().simple())
}

pub(crate) fn upload_url(tree_id: &str, file: &str) -> String {
    format!("/uploads/{tree_id}/{file}")
}

pub(crate) fn new_tree_id() -> String {
    Uuid::new_v4().to_string()
}
