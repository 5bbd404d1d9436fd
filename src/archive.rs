//! Streaming zip archives of storage subtrees.
//!
//! The archive is written incrementally to the sink, entry by entry, so
//! memory use stays bounded regardless of subtree size. Backpressure from
//! the sink suspends the writer between chunks. A read failure mid-stream
//! is terminal: the sink is dropped and the partial archive is invalid.

use async_zip::tokio::write::ZipFileWriter;
use async_zip::{Compression, ZipEntryBuilder};
use std::io;
use tokio::fs::{self, File};
use tokio::io::AsyncWrite;
use tokio_util::compat::FuturesAsyncWriteCompatExt;

use crate::storage::{Storage, StorageError};

impl Storage {
    /// Resolves `relative` and verifies it is a directory fit for
    /// archiving. A file target is [`StorageError::InvalidTarget`].
    pub async fn resolve_archive_dir(
        &self,
        relative: &str,
    ) -> Result<std::path::PathBuf, StorageError> {
        let target = self.resolve_checked(relative, false).await?;
        let metadata = fs::metadata(&target).await?;
        if !metadata.is_dir() {
            return Err(StorageError::InvalidTarget);
        }
        Ok(target)
    }
}

/// Streams a deflate-compressed zip of every regular file under `dir`
/// (recursively) into `sink`. Entry names are the paths relative to `dir`
/// with `/` separators. Hidden entries and non-regular files are skipped,
/// matching the listing rules.
pub async fn stream_zip<W>(dir: &std::path::Path, sink: W) -> Result<(), StorageError>
where
    W: AsyncWrite + Unpin,
{
    let mut writer = ZipFileWriter::with_tokio(sink);
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let mut entries = fs::read_dir(&current).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                let entry_name = entry
                    .path()
                    .strip_prefix(dir)
                    .map_err(|_| StorageError::InvalidPath)?
                    .to_string_lossy()
                    .replace(std::path::MAIN_SEPARATOR, "/");
                let builder = ZipEntryBuilder::new(entry_name.into(), Compression::Deflate);
                let entry_writer = writer
                    .write_entry_stream(builder)
                    .await
                    .map_err(zip_error)?;
                let mut entry_writer = entry_writer.compat_write();
                let mut file = File::open(entry.path()).await?;
                tokio::io::copy(&mut file, &mut entry_writer).await?;
                entry_writer.into_inner().close().await.map_err(zip_error)?;
            }
        }
    }

    writer.close().await.map_err(zip_error)?;
    Ok(())
}

fn zip_error(err: async_zip::error::ZipError) -> StorageError {
    StorageError::Io(io::Error::other(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::stream_zip;
    use crate::storage::{Storage, StorageError};
    use std::io::{Cursor, Read};
    use tempfile::tempdir;

    fn make_storage() -> (tempfile::TempDir, Storage) {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("storage");
        std::fs::create_dir_all(&root).expect("create storage root");
        (temp, Storage::new(root, 0))
    }

    #[tokio::test]
    async fn archive_round_trips_file_contents() {
        let (_temp, storage) = make_storage();
        std::fs::write(storage.root_path().join("a.txt"), b"alpha contents").expect("write");
        std::fs::create_dir_all(storage.root_path().join("sub")).expect("mkdir");
        std::fs::write(storage.root_path().join("sub/b.bin"), vec![7u8; 4096]).expect("write");
        std::fs::write(storage.root_path().join(".hidden"), b"never").expect("write");

        let mut sink = Cursor::new(Vec::new());
        stream_zip(storage.root_path(), &mut sink)
            .await
            .expect("stream zip");

        let mut archive = zip::ZipArchive::new(Cursor::new(sink.into_inner())).expect("open zip");
        assert_eq!(archive.len(), 2);

        let mut a = Vec::new();
        archive
            .by_name("a.txt")
            .expect("a.txt present")
            .read_to_end(&mut a)
            .expect("read a.txt");
        assert_eq!(a, b"alpha contents");

        let mut b = Vec::new();
        archive
            .by_name("sub/b.bin")
            .expect("sub/b.bin present")
            .read_to_end(&mut b)
            .expect("read b.bin");
        assert_eq!(b, vec![7u8; 4096]);

        assert!(archive.by_name(".hidden").is_err());
    }

    #[tokio::test]
    async fn resolve_archive_dir_rejects_files() {
        let (_temp, storage) = make_storage();
        std::fs::write(storage.root_path().join("plain.txt"), b"x").expect("write");

        let result = storage.resolve_archive_dir("plain.txt").await;
        assert!(matches!(result, Err(StorageError::InvalidTarget)));
    }

    #[tokio::test]
    async fn resolve_archive_dir_missing_is_not_found() {
        let (_temp, storage) = make_storage();
        let result = storage.resolve_archive_dir("ghost").await;
        assert!(matches!(result, Err(StorageError::NotFound)));
    }
}
