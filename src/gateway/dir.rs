use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{GatewayError, TreeGateway, new_tree_id, photo_extension, upload_file_name, upload_url};
use crate::model::{DEFAULT_TREE_NAME, DiagramData, Tree, TreeSummary};

static TREE_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

const UPLOADS_DIR: &str = "uploads";

/// On-disk record of one tree.
#[derive(Debug, Serialize, Deserialize)]
struct TreeRecord {
    id: String,
    name: String,
    #[serde(default)]
    data: DiagramData,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TreeRecord {
    fn into_tree(self) -> Tree {
        Tree {
            id: self.id,
            name: self.name,
            data: self.data,
            updated_at: Some(self.updated_at),
        }
    }
}

/// Directory-backed store: `<root>/<id>.json` per tree, photos under
/// `<root>/uploads/<tree_id>/`.
#[derive(Debug, Clone)]
pub struct DirGateway {
    root: PathBuf,
}

impl DirGateway {
    /// Opens (and creates if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, GatewayError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|err| GatewayError::io(&root, err))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join(UPLOADS_DIR)
    }

    /// Resolves a url returned by `upload_photo` to its file.
    pub fn photo_path(&self, url: &str) -> Option<PathBuf> {
        let rest = url.strip_prefix("/uploads/")?;
        let (tree_id, file) = rest.split_once('/')?;
        if !TREE_ID_RE.is_match(tree_id) || file.contains(['/', '\\']) || file.starts_with('.') {
            return None;
        }
        Some(self.uploads_dir().join(tree_id).join(file))
    }

    fn record_path(&self, id: &str) -> Result<PathBuf, GatewayError> {
        // Ids become file names; anything else cannot name a stored tree.
        if !TREE_ID_RE.is_match(id) {
            return Err(GatewayError::NotFound(id.to_string()));
        }
        Ok(self.root.join(format!("{id}.json")))
    }

    fn read_record(&self, path: &Path, id: &str) -> Result<TreeRecord, GatewayError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(GatewayError::NotFound(id.to_string()));
            }
            Err(err) => return Err(GatewayError::io(path, err)),
        };
        serde_json::from_str(&contents).map_err(|source| GatewayError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }

    fn write_record(&self, record: &TreeRecord) -> Result<(), GatewayError> {
        let path = self.record_path(&record.id)?;
        let staging = path.with_extension("json.tmp");
        let file = fs::File::create(&staging).map_err(|err| GatewayError::io(&staging, err))?;
        serde_json::to_writer_pretty(file, record).map_err(|source| GatewayError::Malformed {
            path: staging.clone(),
            source,
        })?;
        fs::rename(&staging, &path).map_err(|err| GatewayError::io(&path, err))
    }
}

impl TreeGateway for DirGateway {
    fn list_trees(&self) -> Result<Vec<TreeSummary>, GatewayError> {
        let entries = fs::read_dir(&self.root).map_err(|err| GatewayError::io(&self.root, err))?;
        let mut summaries = Vec::new();
        for entry in entries {
            let path = entry.map_err(|err| GatewayError::io(&self.root, err))?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let id = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or_default()
                .to_string();
            match self.read_record(&path, &id) {
                Ok(record) => summaries.push(TreeSummary {
                    id: record.id,
                    name: record.name,
                    updated_at: record.updated_at,
                }),
                Err(err) => warn!(
                    "event=list_trees module=gateway status=skipped path={} error={err}",
                    path.display()
                ),
            }
        }
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        Ok(summaries)
    }

    fn create_tree(&mut self, name: Option<&str>) -> Result<Tree, GatewayError> {
        let now = Utc::now();
        let record = TreeRecord {
            id: new_tree_id(),
            name: name.unwrap_or(DEFAULT_TREE_NAME).to_string(),
            data: DiagramData::default(),
            created_at: now,
            updated_at: now,
        };
        self.write_record(&record)?;
        info!("event=create_tree module=gateway status=ok id={}", record.id);
        Ok(record.into_tree())
    }

    fn fetch_tree(&self, id: &str) -> Result<Tree, GatewayError> {
        let path = self.record_path(id)?;
        Ok(self.read_record(&path, id)?.into_tree())
    }

    fn replace_tree(&mut self, id: &str, name: &str, data: &DiagramData) -> Result<(), GatewayError> {
        let path = self.record_path(id)?;
        let existing = self.read_record(&path, id)?;
        let record = TreeRecord {
            id: existing.id,
            name: name.to_string(),
            data: data.clone(),
            created_at: existing.created_at,
            updated_at: Utc::now(),
        };
        self.write_record(&record)?;
        info!(
            "event=replace_tree module=gateway status=ok id={id} nodes={} edges={}",
            data.nodes.len(),
            data.edges.len()
        );
        Ok(())
    }

    fn delete_tree(&mut self, id: &str) -> Result<(), GatewayError> {
        let path = self.record_path(id)?;
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(GatewayError::NotFound(id.to_string()));
            }
            Err(err) => return Err(GatewayError::io(&path, err)),
        }
        let uploads = self.uploads_dir().join(id);
        match fs::remove_dir_all(&uploads) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(GatewayError::io(&uploads, err)),
        }
        info!("event=delete_tree module=gateway status=ok id={id}");
        Ok(())
    }

    fn upload_photo(&mut self, tree_id: &str, file_name: &str, bytes: &[u8]) -> Result<String, GatewayError> {
        let record_path = self.record_path(tree_id)?;
        if !record_path.is_file() {
            return Err(GatewayError::NotFound(tree_id.to_string()));
        }
        let extension = photo_extension(file_name)?;
        let dir = self.uploads_dir().join(tree_id);
        fs::create_dir_all(&dir).map_err(|err| GatewayError::io(&dir, err))?;
        let file = upload_file_name(&extension);
        let path = dir.join(&file);
        fs::write(&path, bytes).map_err(|err| GatewayError::io(&path, err))?;
        info!(
            "event=upload_photo module=gateway status=ok tree={tree_id} bytes={}",
            bytes.len()
        );
        Ok(upload_url(tree_id, &file))
    }
}
