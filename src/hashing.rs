//! Content identity of files on disk.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use filevault_core::identity::ContentIdentity;

use crate::error::VaultError;

/// Hash the bytes of `path`. Streams the file; memory use is constant.
pub fn hash_file(path: &Path) -> Result<ContentIdentity, VaultError> {
    let file = File::open(path).map_err(|e| VaultError::io(path, e))?;
    ContentIdentity::from_reader(BufReader::new(file)).map_err(|e| VaultError::io(path, e))
}

/// [`hash_file`] on the blocking pool, for callers on an async worker.
pub async fn hash_file_async(path: &Path) -> anyhow::Result<ContentIdentity> {
    let owned = path.to_path_buf();
    Ok(tokio::task::spawn_blocking(move || hash_file(&owned)).await??)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_bytes_hash_equal_regardless_of_name() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.txt");
        let b = tmp.path().join("renamed.md");
        std::fs::write(&a, "same bytes").unwrap();
        std::fs::write(&b, "same bytes").unwrap();
        assert_eq!(hash_file(&a).unwrap(), hash_file(&b).unwrap());
        assert_eq!(hash_file(&a).unwrap(), ContentIdentity::from_bytes(b"same bytes"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = hash_file(&tmp.path().join("nope.txt")).unwrap_err();
        assert!(matches!(err, VaultError::Io { .. }));
    }

    #[tokio::test]
    async fn async_hash_matches_and_keeps_error_kind() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.md");
        std::fs::write(&a, "pooled").unwrap();
        assert_eq!(hash_file_async(&a).await.unwrap(), hash_file(&a).unwrap());

        let err = hash_file_async(&tmp.path().join("gone.md")).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<VaultError>(), Some(VaultError::Io { .. })));
    }
}
