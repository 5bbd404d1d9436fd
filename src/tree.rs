//! Recursive directory listing producing a nested tree of entries.

use futures_util::future::BoxFuture;
use serde::Serialize;
use std::cmp::Ordering;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::fs;

use crate::storage::{Storage, StorageError, download_url, format_timestamp};

/// A single listing entry. Built fresh on every request, never persisted.
#[derive(Serialize, Debug)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TreeNode {
    #[serde(rename_all = "camelCase")]
    Directory {
        name: String,
        path: String,
        children: Vec<TreeNode>,
    },
    #[serde(rename_all = "camelCase")]
    File {
        name: String,
        path: String,
        size: u64,
        modified_at: Option<String>,
        download_url: String,
    },
}

impl TreeNode {
    pub fn name(&self) -> &str {
        match self {
            TreeNode::Directory { name, .. } | TreeNode::File { name, .. } => name,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, TreeNode::Directory { .. })
    }
}

impl Storage {
    /// Walks the directory at `relative` and returns its nested contents.
    ///
    /// Hidden entries (leading `.`) are skipped entirely and never recursed
    /// into; symlinks and other non-regular entries are skipped as well,
    /// which also keeps the walk cycle-free. Entries are sorted directories
    /// first, then by case-insensitive name, so the output is stable across
    /// platforms. The walk is live: a concurrent mutation may be partially
    /// visible, which is accepted.
    pub async fn list_tree(&self, relative: &str) -> Result<Vec<TreeNode>, StorageError> {
        let target = self.resolve_checked(relative, false).await?;
        let metadata = fs::metadata(&target).await?;
        if !metadata.is_dir() {
            return Err(StorageError::InvalidTarget);
        }
        walk(self.root_path(), target).await
    }
}

fn walk(root: &Path, dir: PathBuf) -> BoxFuture<'_, Result<Vec<TreeNode>, StorageError>> {
    Box::pin(async move {
        let mut nodes = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let file_type = entry.file_type().await?;
            let path = entry.path();
            let relative = path
                .strip_prefix(root)
                .map_err(|_| StorageError::InvalidPath)?
                .to_string_lossy()
                .replace(std::path::MAIN_SEPARATOR, "/");

            if file_type.is_dir() {
                let children = walk(root, path).await?;
                nodes.push(TreeNode::Directory {
                    name,
                    path: relative,
                    children,
                });
            } else if file_type.is_file() {
                let metadata = entry.metadata().await?;
                nodes.push(TreeNode::File {
                    download_url: download_url(&relative),
                    name,
                    path: relative,
                    size: metadata.len(),
                    modified_at: file_timestamp(&metadata),
                });
            }
            // symlinks, sockets and devices never enter the tree
        }

        nodes.sort_by(|a, b| match (a.is_dir(), b.is_dir()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => a.name().to_lowercase().cmp(&b.name().to_lowercase()),
        });

        Ok(nodes)
    })
}

/// Creation time when the platform exposes it, last-modified otherwise.
fn file_timestamp(metadata: &Metadata) -> Option<String> {
    metadata
        .created()
        .or_else(|_| metadata.modified())
        .ok()
        .and_then(|ts| ts.duration_since(UNIX_EPOCH).ok())
        .map(format_timestamp)
}

#[cfg(test)]
mod tests {
    use super::TreeNode;
    use crate::storage::{Storage, StorageError};
    use tempfile::tempdir;

    fn make_storage() -> (tempfile::TempDir, Storage) {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("storage");
        std::fs::create_dir_all(&root).expect("create storage root");
        (temp, Storage::new(root, 0))
    }

    #[tokio::test]
    async fn list_tree_skips_hidden_and_nests_children() {
        let (_temp, storage) = make_storage();
        std::fs::write(storage.root_path().join("a.txt"), b"0123456789").expect("write");
        std::fs::write(storage.root_path().join(".hidden"), b"x").expect("write");
        std::fs::create_dir_all(storage.root_path().join("b")).expect("mkdir");
        std::fs::write(storage.root_path().join("b/c.txt"), b"abc").expect("write");

        let nodes = storage.list_tree("").await.expect("list");
        assert_eq!(nodes.len(), 2);

        // directories sort first
        let TreeNode::Directory { name, children, .. } = &nodes[0] else {
            panic!("expected directory first");
        };
        assert_eq!(name, "b");
        assert_eq!(children.len(), 1);
        let TreeNode::File { name, path, size, .. } = &children[0] else {
            panic!("expected file child");
        };
        assert_eq!(name, "c.txt");
        assert_eq!(path, "b/c.txt");
        assert_eq!(*size, 3);

        let TreeNode::File { name, size, .. } = &nodes[1] else {
            panic!("expected file second");
        };
        assert_eq!(name, "a.txt");
        assert_eq!(*size, 10);
    }

    #[tokio::test]
    async fn list_tree_missing_path_is_not_found() {
        let (_temp, storage) = make_storage();
        let result = storage.list_tree("absent").await;
        assert!(matches!(result, Err(StorageError::NotFound)));
    }

    #[tokio::test]
    async fn file_nodes_carry_encoded_download_urls() {
        let (_temp, storage) = make_storage();
        std::fs::create_dir_all(storage.root_path().join("dir")).expect("mkdir");
        std::fs::write(storage.root_path().join("dir/my file.txt"), b"x").expect("write");

        let nodes = storage.list_tree("dir").await.expect("list");
        let TreeNode::File { download_url, modified_at, .. } = &nodes[0] else {
            panic!("expected file");
        };
        assert_eq!(download_url, "/uploads/dir/my%20file.txt");
        assert!(modified_at.is_some());
    }

    #[tokio::test]
    async fn tree_node_serializes_with_tagged_shape() {
        let (_temp, storage) = make_storage();
        std::fs::write(storage.root_path().join("a.txt"), b"x").expect("write");

        let nodes = storage.list_tree("").await.expect("list");
        let value = serde_json::to_value(&nodes).expect("serialize");
        assert_eq!(value[0]["type"], "file");
        assert_eq!(value[0]["downloadUrl"], "/uploads/a.txt");
        assert_eq!(value[0]["size"], 1);
    }
}
