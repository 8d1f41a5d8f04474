use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::{GatewayError, TreeGateway, new_tree_id, photo_extension, upload_file_name, upload_url};
use crate::model::{DEFAULT_TREE_NAME, DiagramData, Tree, TreeSummary};

#[derive(Debug, Clone)]
struct Entry {
    tree: Tree,
    updated_at: DateTime<Utc>,
    /// Write order, breaks ties between equal timestamps.
    seq: u64,
}

/// In-process tree store. Can be switched offline to exercise failure paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryGateway {
    trees: HashMap<String, Entry>,
    photos: HashMap<String, Vec<u8>>,
    seq: u64,
    offline: bool,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every call fails with [`GatewayError::Unavailable`].
    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    /// Bytes of an uploaded photo, by the url `upload_photo` returned.
    pub fn photo(&self, url: &str) -> Option<&[u8]> {
        self.photos.get(url).map(Vec::as_slice)
    }

    /// Stores a tree record handed in from outside, replacing any tree with
    /// the same id. Later saves of that id then succeed.
    pub fn insert_tree(&mut self, mut tree: Tree) {
        let now = Utc::now();
        let updated_at = *tree.updated_at.get_or_insert(now);
        let seq = self.next_seq();
        self.trees.insert(
            tree.id.clone(),
            Entry {
                tree,
                updated_at,
                seq,
            },
        );
    }

    fn check_online(&self) -> Result<(), GatewayError> {
        if self.offline {
            Err(GatewayError::Unavailable("memory store is offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }
}

impl TreeGateway for MemoryGateway {
    fn list_trees(&self) -> Result<Vec<TreeSummary>, GatewayError> {
        self.check_online()?;
        let mut entries: Vec<&Entry> = self.trees.values().collect();
        entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.seq.cmp(&a.seq)));
        Ok(entries
            .into_iter()
            .map(|entry| TreeSummary {
                id: entry.tree.id.clone(),
                name: entry.tree.name.clone(),
                updated_at: entry.updated_at,
            })
            .collect())
    }

    fn create_tree(&mut self, name: Option<&str>) -> Result<Tree, GatewayError> {
        self.check_online()?;
        let now = Utc::now();
        let mut tree = Tree::new(new_tree_id(), name.unwrap_or(DEFAULT_TREE_NAME));
        tree.updated_at = Some(now);
        let seq = self.next_seq();
        self.trees.insert(
            tree.id.clone(),
            Entry {
                tree: tree.clone(),
                updated_at: now,
                seq,
            },
        );
        Ok(tree)
    }

    fn fetch_tree(&self, id: &str) -> Result<Tree, GatewayError> {
        self.check_online()?;
        self.trees
            .get(id)
            .map(|entry| entry.tree.clone())
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))
    }

    fn replace_tree(&mut self, id: &str, name: &str, data: &DiagramData) -> Result<(), GatewayError> {
        self.check_online()?;
        let seq = self.next_seq();
        let entry = self
            .trees
            .get_mut(id)
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))?;
        let now = Utc::now();
        entry.tree.name = name.to_string();
        entry.tree.data = data.clone();
        entry.tree.updated_at = Some(now);
        entry.updated_at = now;
        entry.seq = seq;
        Ok(())
    }

    fn delete_tree(&mut self, id: &str) -> Result<(), GatewayError> {
        self.check_online()?;
        self.trees
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))?;
        let prefix = upload_url(id, "");
        self.photos.retain(|url, _| !url.starts_with(&prefix));
        Ok(())
    }

    fn upload_photo(&mut self, tree_id: &str, file_name: &str, bytes: &[u8]) -> Result<String, GatewayError> {
        self.check_online()?;
        if !self.trees.contains_key(tree_id) {
            return Err(GatewayError::NotFound(tree_id.to_string()));
        }
        let extension = photo_extension(file_name)?;
        let url = upload_url(tree_id, &upload_file_name(&extension));
        self.photos.insert(url.clone(), bytes.to_vec());
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Person;

    #[test]
    fn create_fetch_replace_delete() {
        let mut store = MemoryGateway::new();
        let tree = store.create_tree(None).unwrap();
        assert_eq!(tree.name, DEFAULT_TREE_NAME);
        assert!(tree.data.nodes.is_empty());

        let mut data = tree.data.clone();
        data.add_person(Person::new("p1", 1.0, 2.0, "Ada"));
        store.replace_tree(&tree.id, "Lovelace", &data).unwrap();
        let fetched = store.fetch_tree(&tree.id).unwrap();
        assert_eq!(fetched.name, "Lovelace");
        assert_eq!(fetched.data.nodes.len(), 1);

        store.delete_tree(&tree.id).unwrap();
        assert!(matches!(store.fetch_tree(&tree.id), Err(GatewayError::NotFound(_))));
        assert!(matches!(store.delete_tree(&tree.id), Err(GatewayError::NotFound(_))));
    }

    #[test]
    fn list_is_most_recent_first() {
        let mut store = MemoryGateway::new();
        let first = store.create_tree(Some("first")).unwrap();
        let second = store.create_tree(Some("second")).unwrap();
        let names: Vec<_> = store.list_trees().unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["second", "first"]);

        store
            .replace_tree(&first.id, "first", &DiagramData::default())
            .unwrap();
        let ids: Vec<_> = store.list_trees().unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[test]
    fn inserted_trees_accept_saves() {
        let mut store = MemoryGateway::new();
        assert!(matches!(
            store.replace_tree("t1", "Family", &DiagramData::default()),
            Err(GatewayError::NotFound(_))
        ));

        let mut tree = Tree::new("t1", "Family");
        tree.data.add_person(Person::new("a", 0.0, 0.0, "Ada"));
        store.insert_tree(tree);
        assert_eq!(store.fetch_tree("t1").unwrap().data.nodes.len(), 1);

        store.replace_tree("t1", "Renamed", &DiagramData::default()).unwrap();
        let fetched = store.fetch_tree("t1").unwrap();
        assert_eq!(fetched.name, "Renamed");
        assert!(fetched.data.nodes.is_empty());
        assert_eq!(store.list_trees().unwrap().len(), 1);
    }

    #[test]
    fn offline_store_fails_every_call() {
        let mut store = MemoryGateway::new();
        let tree = store.create_tree(None).unwrap();
        store.set_offline(true);
        assert!(matches!(
            store.replace_tree(&tree.id, "x", &DiagramData::default()),
            Err(GatewayError::Unavailable(_))
        ));
        assert!(store.list_trees().is_err());
        store.set_offline(false);
        assert_eq!(store.list_trees().unwrap().len(), 1);
    }

    #[test]
    fn uploads_are_scoped_to_tree() {
        let mut store = MemoryGateway::new();
        let tree = store.create_tree(None).unwrap();
        let url = store.upload_photo(&tree.id, "me.png", b"\x89PNG").unwrap();
        assert!(url.starts_with(&format!("/uploads/{}/", tree.id)));
        assert_eq!(store.photo(&url), Some(&b"\x89PNG"[..]));
        assert!(matches!(
            store.upload_photo("missing", "me.png", b""),
            Err(GatewayError::NotFound(_))
        ));
        assert!(matches!(
            store.upload_photo(&tree.id, "me.bmp", b""),
            Err(GatewayError::InvalidFileType(_))
        ));
        store.delete_tree(&tree.id).unwrap();
        assert!(store.photo(&url).is_none());
    }
}
