//! Key-value persistence behind the credential store
//!
//! `KeyValueStore` is the seam between the client and whatever durable storage
//! the host has. Methods return boxed futures so the store can be shared as
//! `Arc<dyn KeyValueStore>` and so backends that genuinely suspend (files,
//! keychains, remote stores) fit the same contract as in-memory ones.
//!
//! `FileStore` keeps a flat JSON object on disk. Every mutation rewrites the
//! file atomically (temp file + rename) while holding the in-memory lock, so
//! concurrent writers are serialized and a crash never leaves a torn file.
//! The in-memory map only changes once the file write has succeeded.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Boxed future returned by `KeyValueStore` methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Persistent string key-value store scoped to one client.
///
/// Last write wins. Implementations report an unreachable backend as
/// `Error::Storage`; callers decide whether that is fatal.
pub trait KeyValueStore: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

    fn set<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()>;

    /// Removing an absent key is not an error.
    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;
}

/// In-process store. Survives nothing; used by tests and ephemeral hosts.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with existing entries.
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: Mutex::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// Copy of every entry currently held.
    pub async fn snapshot(&self) -> HashMap<String, String> {
        self.entries.lock().await.clone()
    }
}

impl KeyValueStore for MemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move { Ok(self.entries.lock().await.get(key).cloned()) })
    }

    fn set<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.entries.lock().await.insert(key.to_owned(), value);
            Ok(())
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.entries.lock().await.remove(key);
            Ok(())
        })
    }
}

/// JSON-file store, written with owner-only permissions.
pub struct FileStore {
    path: PathBuf,
    state: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`.
    ///
    /// A missing file is a cold start: it is created as `{}` so the next
    /// open takes the normal path.
    pub async fn open(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading store file: {e}")))?;
            let entries: HashMap<String, String> = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing store file: {e}")))?;
            info!(path = %path.display(), entries = entries.len(), "opened credential store");
            entries
        } else {
            info!(path = %path.display(), "store file not found, starting empty");
            let entries = HashMap::new();
            write_atomic(&path, &entries).await?;
            entries
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for FileStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move { Ok(self.state.lock().await.get(key).cloned()) })
    }

    fn set<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let mut next = state.clone();
            next.insert(key.to_owned(), value);
            write_atomic(&self.path, &next).await?;
            *state = next;
            debug!(key, "stored entry");
            Ok(())
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if state.contains_key(key) {
                let mut next = state.clone();
                next.remove(key);
                write_atomic(&self.path, &next).await?;
                *state = next;
                debug!(key, "removed entry");
            }
            Ok(())
        })
    }
}

/// Hidden sibling of `path`, unique per store file and process.
fn temp_path(path: &Path) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Io("store path has no file name".into()))?;
    let mut tmp_name = std::ffi::OsString::from(".");
    tmp_name.push(file_name);
    tmp_name.push(format!(".tmp.{}", std::process::id()));
    Ok(path.with_file_name(tmp_name))
}

/// Write the store to `path` via a sibling temp file and rename.
async fn write_atomic(path: &Path, data: &HashMap<String, String>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::CredentialParse(format!("serializing store: {e}")))?;

    let tmp_path = temp_path(path)?;

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp store file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting store file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp store file: {e}")))?;

    debug!(path = %path.display(), "persisted store");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_set_get_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("authToken").await.unwrap(), None);

        store.set("authToken", "A1".into()).await.unwrap();
        assert_eq!(store.get("authToken").await.unwrap().as_deref(), Some("A1"));

        store.set("authToken", "A2".into()).await.unwrap();
        assert_eq!(store.get("authToken").await.unwrap().as_deref(), Some("A2"));

        store.remove("authToken").await.unwrap();
        store.remove("authToken").await.unwrap();
        assert!(store.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn memory_store_seeded_entries() {
        let store = MemoryStore::with_entries([("authToken", "A1"), ("refreshToken", "R1")]);
        assert_eq!(store.snapshot().await.len(), 2);
        assert_eq!(store.get("refreshToken").await.unwrap().as_deref(), Some("R1"));
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = FileStore::open(path.clone()).await.unwrap();
        store.set("refreshToken", "R1".into()).await.unwrap();
        store.set("username", "tanaka".into()).await.unwrap();
        drop(store);

        let reopened = FileStore::open(path).await.unwrap();
        assert_eq!(
            reopened.get("refreshToken").await.unwrap().as_deref(),
            Some("R1")
        );
        assert_eq!(
            reopened.get("username").await.unwrap().as_deref(),
            Some("tanaka")
        );
    }

    #[tokio::test]
    async fn file_store_cold_start_writes_empty_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        assert!(!path.exists());
        let store = FileStore::open(path.clone()).await.unwrap();
        assert_eq!(store.path(), path.as_path());

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: HashMap<String, String> = serde_json::from_str(&contents).unwrap();
        assert!(parsed.is_empty());
    }

    #[tokio::test]
    async fn file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let result = FileStore::open(path).await;
        assert!(matches!(result, Err(Error::CredentialParse(_))));
    }

    #[tokio::test]
    async fn file_store_remove_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = FileStore::open(path.clone()).await.unwrap();
        store.set("authToken", "A1".into()).await.unwrap();
        store.remove("authToken").await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(!contents.contains("A1"));
    }

    #[tokio::test]
    async fn failed_write_leaves_entries_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = FileStore::open(path).await.unwrap();
        store.set("refreshToken", "R1".into()).await.unwrap();
        std::fs::remove_dir_all(dir.path()).unwrap();

        assert!(matches!(
            store.set("authToken", "A1".into()).await,
            Err(Error::Io(_))
        ));
        assert!(store.remove("refreshToken").await.is_err());

        assert_eq!(store.get("authToken").await.unwrap(), None);
        assert_eq!(
            store.get("refreshToken").await.unwrap().as_deref(),
            Some("R1")
        );
    }

    #[test]
    fn temp_files_are_distinct_per_store_file() {
        let dir = Path::new("/var/lib/kippo");
        let a = temp_path(&dir.join("session.json")).unwrap();
        let b = temp_path(&dir.join("other.json")).unwrap();

        assert_ne!(a, b);
        assert_eq!(a.parent(), Some(dir));
        assert!(
            a.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(".session.json.tmp.")
        );
    }

    #[tokio::test]
    async fn stores_sharing_a_directory_write_concurrently() {
        let dir = tempfile::tempdir().unwrap();
        let first = FileStore::open(dir.path().join("first.json")).await.unwrap();
        let second = FileStore::open(dir.path().join("second.json")).await.unwrap();

        let (a, b) = tokio::join!(
            first.set("username", "tanaka".into()),
            second.set("username", "suzuki".into())
        );
        a.unwrap();
        b.unwrap();

        let first = FileStore::open(dir.path().join("first.json")).await.unwrap();
        let second = FileStore::open(dir.path().join("second.json")).await.unwrap();
        assert_eq!(first.get("username").await.unwrap().as_deref(), Some("tanaka"));
        assert_eq!(second.get("username").await.unwrap().as_deref(), Some("suzuki"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = FileStore::open(path.clone()).await.unwrap();
        store.set("authToken", "A1".into()).await.unwrap();

        let metadata = tokio::fs::metadata(&path).await.unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "store file must be 0600, got {mode:o}");
    }
}
