//! Storage root, path sanitization and filesystem operations.
//!
//! Every client-supplied path goes through [`sanitize`] first and is then
//! re-validated against the storage root by [`Storage::resolve_checked`]
//! before any filesystem call touches it. The second check is independent
//! of the sanitizer on purpose.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};
use tokio::fs;
use tokio::io::ErrorKind;

/// Directory under the storage root where uploads are staged before the
/// final rename. Hidden name, so it never shows up in listings or archives.
pub const STAGING_DIR_NAME: &str = ".staging";

/// Normalizes a raw client path into a safe path relative to the storage
/// root. Never fails: degenerate input (empty string, only `..` segments)
/// collapses to the empty path, which addresses the root itself.
///
/// Backslashes are treated as separators, empty/`.`/`..` segments are
/// dropped outright, and any character outside `[A-Za-z0-9._-]` inside a
/// segment is replaced with `_`.
pub fn sanitize(raw: &str) -> String {
    raw.replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .map(|segment| {
            segment
                .chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                        c
                    } else {
                        '_'
                    }
                })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Drops empty, `.` and `..` segments but leaves segment characters
/// untouched. For paths that must match names already on disk (downloads
/// of listed files, which may contain characters outside the upload-safe
/// set); [`Storage::resolve_checked`] still confines the result to the
/// root.
pub fn strip_traversal(raw: &str) -> String {
    raw.split('/')
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .collect::<Vec<_>>()
        .join("/")
}

/// Builds the download URL for a stored file: each segment is
/// percent-encoded, `/` stays a literal separator.
pub fn download_url(relative: &str) -> String {
    let encoded = relative
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    format!("/uploads/{encoded}")
}

#[derive(Clone, Debug)]
pub struct Storage {
    root: PathBuf,
    max_upload_size: u64,
}

impl Storage {
    pub fn new(root: PathBuf, max_upload_size: u64) -> Self {
        Self {
            root,
            max_upload_size,
        }
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    pub fn max_upload_size(&self) -> u64 {
        self.max_upload_size
    }

    /// Directory where upload bodies are staged before the commit rename.
    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR_NAME)
    }

    /// Resolves a sanitized relative path to an absolute path under the
    /// root and verifies it stays there. Also walks each existing component
    /// and rejects symlinks, so a link inside the root cannot point the
    /// operation outside of it.
    pub async fn resolve_checked(
        &self,
        relative: &str,
        allow_missing_leaf: bool,
    ) -> Result<PathBuf, StorageError> {
        // the staging area is internal; no client path may address it
        if relative.split('/').next() == Some(STAGING_DIR_NAME) {
            return Err(StorageError::InvalidPath);
        }
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(StorageError::InvalidPath);
                }
            }
        }
        let target = self.root.join(relative);
        if !target.starts_with(&self.root) {
            return Err(StorageError::InvalidPath);
        }
        self.ensure_no_symlink_components(&target, allow_missing_leaf)
            .await?;
        Ok(target)
    }

    async fn ensure_no_symlink_components(
        &self,
        target: &Path,
        allow_missing_leaf: bool,
    ) -> Result<(), StorageError> {
        let relative = target
            .strip_prefix(&self.root)
            .map_err(|_| StorageError::InvalidPath)?;
        let mut current = PathBuf::from(&self.root);
        let mut components = relative.components().peekable();

        while let Some(component) = components.next() {
            current.push(component.as_os_str());
            match fs::symlink_metadata(&current).await {
                Ok(metadata) => {
                    if metadata.file_type().is_symlink() {
                        return Err(StorageError::InvalidPath);
                    }
                    if components.peek().is_some() && !metadata.is_dir() {
                        return Err(StorageError::NotFound);
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    if allow_missing_leaf {
                        return Ok(());
                    }
                    return Err(StorageError::NotFound);
                }
                Err(err) => return Err(StorageError::Io(err)),
            }
        }

        Ok(())
    }

    /// Commits an already-staged upload: verifies the size cap, creates
    /// parent directories and renames the staged file into place. The size
    /// check runs before anything is written under the visible tree.
    pub async fn save_upload(
        &self,
        relative: &str,
        staged: &Path,
        size: u64,
    ) -> Result<SavedFile, StorageError> {
        if self.max_upload_size > 0 && size > self.max_upload_size {
            return Err(StorageError::TooLarge {
                size,
                limit: self.max_upload_size,
            });
        }
        if relative.is_empty() {
            return Err(StorageError::InvalidPath);
        }
        let target = self.resolve_checked(relative, true).await?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(staged, &target).await?;

        let name = target
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(SavedFile {
            name,
            path: relative.to_string(),
            size,
            url: download_url(relative),
        })
    }

    /// Removes a file, or a directory with all of its contents.
    pub async fn delete_path(&self, relative: &str) -> Result<(), StorageError> {
        if relative.is_empty() {
            return Err(StorageError::InvalidPath);
        }
        let target = self.resolve_checked(relative, false).await?;
        let metadata = fs::metadata(&target).await?;
        if metadata.is_dir() {
            fs::remove_dir_all(target).await?;
        } else {
            fs::remove_file(target).await?;
        }
        Ok(())
    }

    /// Creates a directory and any missing parents. Idempotent.
    pub async fn create_dir(&self, relative: &str) -> Result<(), StorageError> {
        if relative.is_empty() {
            return Err(StorageError::InvalidPath);
        }
        let target = self.resolve_checked(relative, true).await?;
        fs::create_dir_all(target).await?;
        Ok(())
    }

    /// Renames `from` to `to`, creating the destination's parents first.
    /// Same-volume rename semantics; a cross-volume move is not atomic and
    /// not supported.
    pub async fn move_path(&self, from: &str, to: &str) -> Result<(), StorageError> {
        if from.is_empty() || to.is_empty() {
            return Err(StorageError::InvalidPath);
        }
        let source = self.resolve_checked(from, false).await?;
        let target = self.resolve_checked(to, true).await?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&source, &target).await?;
        Ok(())
    }
}

pub(crate) fn format_timestamp(duration: Duration) -> String {
    let timestamp = UNIX_EPOCH + duration;
    let datetime: DateTime<Utc> = timestamp.into();
    datetime.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[derive(Debug)]
pub enum StorageError {
    InvalidPath,
    NotFound,
    InvalidTarget,
    TooLarge { size: u64, limit: u64 },
    Io(io::Error),
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        if err.kind() == ErrorKind::NotFound {
            StorageError::NotFound
        } else {
            StorageError::Io(err)
        }
    }
}

/// Descriptor returned after a successful upload.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SavedFile {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::{Storage, StorageError, download_url, sanitize, strip_traversal};
    use std::path::Path;
    use tempfile::tempdir;

    fn make_storage() -> (tempfile::TempDir, Storage) {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("storage");
        std::fs::create_dir_all(&root).expect("create storage root");
        (temp, Storage::new(root, 1024))
    }

    #[test]
    fn sanitize_drops_traversal_segments() {
        assert_eq!(sanitize("../../etc/passwd"), "etc/passwd");
        assert_eq!(sanitize("a/../../../b"), "a/b");
        assert_eq!(sanitize("..\\..\\win\\path"), "win/path");
        assert!(!sanitize("x/../../y/..z/..").contains("/../"));
    }

    #[test]
    fn sanitize_degenerate_input_is_root() {
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize("../.."), "");
        assert_eq!(sanitize("/./.."), "");
    }

    #[test]
    fn strip_traversal_keeps_segment_characters() {
        assert_eq!(strip_traversal("my file.txt"), "my file.txt");
        assert_eq!(strip_traversal("../a/./b c"), "a/b c");
        assert_eq!(strip_traversal("../.."), "");
    }

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize("a b/c*d.txt"), "a_b/c_d.txt");
        assert_eq!(sanitize("nested/we?ird#name"), "nested/we_ird_name");
    }

    #[test]
    fn sanitized_output_stays_under_root() {
        let root = Path::new("/srv/storage");
        for raw in ["../../etc/passwd", "a/../../..", "..", "\\\\host\\share"] {
            let clean = sanitize(raw);
            assert!(root.join(&clean).starts_with(root), "escaped: {raw:?}");
        }
    }

    #[test]
    fn download_url_encodes_segments_keeps_slashes() {
        assert_eq!(download_url("a b/c.txt"), "/uploads/a%20b/c.txt");
        assert_eq!(download_url("plain.txt"), "/uploads/plain.txt");
    }

    #[tokio::test]
    async fn delete_missing_path_is_not_found() {
        let (_temp, storage) = make_storage();
        let result = storage.delete_path("nope.txt").await;
        assert!(matches!(result, Err(StorageError::NotFound)));
    }

    #[tokio::test]
    async fn delete_directory_removes_descendants() {
        let (_temp, storage) = make_storage();
        let dir = storage.root_path().join("docs/deep");
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(dir.join("a.txt"), b"a").expect("write");

        storage.delete_path("docs").await.expect("delete");
        assert!(!storage.root_path().join("docs").exists());
    }

    #[tokio::test]
    async fn create_dir_is_idempotent() {
        let (_temp, storage) = make_storage();
        storage.create_dir("sub/dir").await.expect("first mkdir");
        std::fs::write(storage.root_path().join("sub/dir/x.txt"), b"x").expect("write");
        storage.create_dir("sub/dir").await.expect("second mkdir");

        assert!(storage.root_path().join("sub/dir/x.txt").exists());
    }

    #[tokio::test]
    async fn move_creates_destination_parents() {
        let (_temp, storage) = make_storage();
        std::fs::create_dir_all(storage.root_path().join("folder")).expect("mkdir");
        std::fs::write(storage.root_path().join("folder/old.txt"), b"payload").expect("write");

        storage
            .move_path("folder/old.txt", "folder2/new.txt")
            .await
            .expect("move");

        assert!(!storage.root_path().join("folder/old.txt").exists());
        let moved = std::fs::read(storage.root_path().join("folder2/new.txt")).expect("read");
        assert_eq!(moved, b"payload");
    }

    #[tokio::test]
    async fn move_missing_source_is_not_found() {
        let (_temp, storage) = make_storage();
        let result = storage.move_path("ghost.txt", "dest.txt").await;
        assert!(matches!(result, Err(StorageError::NotFound)));
    }

    #[tokio::test]
    async fn save_upload_rejects_oversized_before_commit() {
        let (_temp, storage) = make_storage();
        let staged = storage.root_path().join(".staged-part");
        std::fs::write(&staged, b"data").expect("write staged");

        let result = storage.save_upload("big.bin", &staged, 4096).await;
        assert!(matches!(result, Err(StorageError::TooLarge { .. })));
        assert!(!storage.root_path().join("big.bin").exists());
    }

    #[tokio::test]
    async fn save_upload_rejects_empty_target() {
        let (_temp, storage) = make_storage();
        let staged = storage.root_path().join(".staged-part");
        std::fs::write(&staged, b"data").expect("write staged");

        let result = storage.save_upload("", &staged, 4).await;
        assert!(matches!(result, Err(StorageError::InvalidPath)));
    }

    #[tokio::test]
    async fn staging_area_is_not_client_addressable() {
        let (_temp, storage) = make_storage();
        std::fs::create_dir_all(storage.staging_dir()).expect("mkdir staging");
        std::fs::write(storage.staging_dir().join("inflight.part"), b"x").expect("write");

        let delete = storage.delete_path(".staging").await;
        assert!(matches!(delete, Err(StorageError::InvalidPath)));
        let moved = storage.move_path(".staging/inflight.part", "stolen").await;
        assert!(matches!(moved, Err(StorageError::InvalidPath)));
        let mkdir = storage.create_dir(".staging/extra").await;
        assert!(matches!(mkdir, Err(StorageError::InvalidPath)));
        assert!(storage.staging_dir().join("inflight.part").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn resolve_checked_rejects_symlink() {
        use std::os::unix::fs::symlink;

        let (temp, storage) = make_storage();
        let outside = temp.path().join("outside.txt");
        std::fs::write(&outside, b"secret").expect("write outside file");
        symlink(&outside, storage.root_path().join("link")).expect("symlink");

        let result = storage.resolve_checked("link", false).await;
        assert!(matches!(result, Err(StorageError::InvalidPath)));
    }
}
