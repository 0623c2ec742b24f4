//! Document persistence.
//!
//! Every collection lives in one JSON document that is loaded and rewritten
//! whole. [`Repository`] serialises access per document: an update holds the
//! document's lock across load, mutate and store, and a [`Transaction`] takes
//! the locks of several documents in [`Document`] order so two transactions
//! can never deadlock each other. Nothing is written unless the mutation
//! closure returns `Ok`.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, Context};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::core::errors::ApiResult;

/// Raw byte storage underneath the repository.
pub trait KeyValue: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()>;

    /// Writes several documents. Backends that can stage writes override this
    /// so a failure leaves every document as it was.
    fn set_many(&self, entries: &[(&str, &[u8])]) -> anyhow::Result<()> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }
}

/// One `<key>.json` file per document inside a data directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create data directory '{}'", dir.display()))?;
        info!(path = %dir.display(), "File store initialized");
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn tmp_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json.tmp"))
    }
}

impl KeyValue for FileStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        match fs::read(self.path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to read document '{key}'")),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.set_many(&[(key, value)])
    }

    /// Writes every temp file first and only then renames them into place, so
    /// readers never see a torn file and a failed write replaces nothing.
    fn set_many(&self, entries: &[(&str, &[u8])]) -> anyhow::Result<()> {
        for (i, (key, value)) in entries.iter().enumerate() {
            if let Err(e) = fs::write(self.tmp_path(key), value) {
                for (written, _) in &entries[..i] {
                    let _ = fs::remove_file(self.tmp_path(written));
                }
                return Err(e).with_context(|| format!("failed to write document '{key}'"));
            }
        }
        for (key, _) in entries {
            fs::rename(self.tmp_path(key), self.path(key))
                .with_context(|| format!("failed to replace document '{key}'"))?;
        }
        Ok(())
    }
}

/// The Spin key-value store, opened per call the way components do.
#[cfg(target_arch = "wasm32")]
#[derive(Debug, Clone, Copy, Default)]
pub struct SpinStore;

#[cfg(target_arch = "wasm32")]
impl SpinStore {
    fn open() -> anyhow::Result<spin_sdk::key_value::Store> {
        spin_sdk::key_value::Store::open_default()
            .map_err(|e| anyhow!("failed to open key-value store: {e:?}"))
    }
}

#[cfg(target_arch = "wasm32")]
impl KeyValue for SpinStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Self::open()?
            .get(key)
            .map_err(|e| anyhow!("failed to read document '{key}': {e:?}"))
    }

    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        Self::open()?
            .set(key, value)
            .map_err(|e| anyhow!("failed to write document '{key}': {e:?}"))
    }
}

/// The documents the application keeps. Declaration order is lock order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Document {
    Users,
    Posts,
    Messages,
    Sessions,
    Notifications,
}

impl Document {
    pub const ALL: [Document; 5] = [
        Document::Users,
        Document::Posts,
        Document::Messages,
        Document::Sessions,
        Document::Notifications,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Document::Users => "users",
            Document::Posts => "posts",
            Document::Messages => "messages",
            Document::Sessions => "sessions",
            Document::Notifications => "notifications",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

fn load<T: DeserializeOwned + Default>(backend: &dyn KeyValue, doc: Document) -> anyhow::Result<T> {
    match backend.get(doc.key())? {
        Some(bytes) if !bytes.is_empty() => serde_json::from_slice(&bytes)
            .with_context(|| format!("document '{}' is corrupt", doc.key())),
        _ => Ok(T::default()),
    }
}

fn encode<T: Serialize>(doc: Document, value: &T) -> anyhow::Result<Vec<u8>> {
    serde_json::to_vec_pretty(value).with_context(|| format!("failed to encode '{}'", doc.key()))
}

pub struct Repository {
    backend: Box<dyn KeyValue>,
    locks: [Mutex<()>; Document::ALL.len()],
}

impl Repository {
    pub fn new(backend: impl KeyValue + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            locks: Default::default(),
        }
    }

    fn lock(&self, doc: Document) -> MutexGuard<'_, ()> {
        // A panicking handler leaves the document as it was on disk.
        self.locks[doc.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Loads a whole document; a missing document reads as its default.
    pub fn read<T: DeserializeOwned + Default>(&self, doc: Document) -> anyhow::Result<T> {
        let _guard = self.lock(doc);
        debug!(document = doc.key(), "read");
        load(self.backend.as_ref(), doc)
    }

    /// Read-modify-write of one document under its lock.
    pub fn update<T, R, F>(&self, doc: Document, f: F) -> ApiResult<R>
    where
        T: DeserializeOwned + Serialize + Default,
        F: FnOnce(&mut T) -> ApiResult<R>,
    {
        let _guard = self.lock(doc);
        let mut value: T = load(self.backend.as_ref(), doc)?;
        let out = f(&mut value)?;
        self.backend.set(doc.key(), &encode(doc, &value)?)?;
        debug!(document = doc.key(), "updated");
        Ok(out)
    }

    /// Runs `f` with every document in `docs` locked. Writes staged through
    /// the transaction are committed only when `f` succeeds.
    ///
    /// Calling [`Repository::read`] or [`Repository::update`] on a locked
    /// document from inside `f` deadlocks; go through the transaction.
    pub fn transaction<R, F>(&self, docs: &[Document], f: F) -> ApiResult<R>
    where
        F: FnOnce(&mut Transaction<'_>) -> ApiResult<R>,
    {
        let mut locked = docs.to_vec();
        locked.sort();
        locked.dedup();
        let _guards: Vec<_> = locked.iter().map(|doc| self.lock(*doc)).collect();

        let mut tx = Transaction {
            backend: self.backend.as_ref(),
            locked,
            staged: BTreeMap::new(),
        };
        let out = f(&mut tx)?;
        tx.commit()?;
        Ok(out)
    }
}

pub struct Transaction<'a> {
    backend: &'a dyn KeyValue,
    locked: Vec<Document>,
    staged: BTreeMap<Document, Vec<u8>>,
}

impl Transaction<'_> {
    fn ensure_locked(&self, doc: Document) -> anyhow::Result<()> {
        if self.locked.contains(&doc) {
            Ok(())
        } else {
            Err(anyhow!("document '{}' is not part of this transaction", doc.key()))
        }
    }

    /// Loads a document, seeing any value already staged in this transaction.
    pub fn load<T: DeserializeOwned + Default>(&self, doc: Document) -> anyhow::Result<T> {
        self.ensure_locked(doc)?;
        match self.staged.get(&doc) {
            Some(bytes) => serde_json::from_slice(bytes)
                .with_context(|| format!("staged '{}' is corrupt", doc.key())),
            None => load(self.backend, doc),
        }
    }

    pub fn stage<T: Serialize>(&mut self, doc: Document, value: &T) -> anyhow::Result<()> {
        self.ensure_locked(doc)?;
        self.staged.insert(doc, encode(doc, value)?);
        Ok(())
    }

    fn commit(self) -> anyhow::Result<()> {
        let entries: Vec<(&str, &[u8])> = self
            .staged
            .iter()
            .map(|(doc, bytes)| (doc.key(), bytes.as_slice()))
            .collect();
        self.backend.set_many(&entries)?;
        if !self.staged.is_empty() {
            debug!(documents = self.staged.len(), "transaction committed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ApiError;
    use std::collections::BTreeMap;

    fn repo() -> (tempfile::TempDir, Repository) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        (dir, Repository::new(store))
    }

    #[test]
    fn missing_document_reads_as_default() {
        let (_dir, repo) = repo();
        let users: BTreeMap<String, u32> = repo.read(Document::Users).unwrap();
        assert!(users.is_empty());
    }

    #[test]
    fn update_persists_whole_document() {
        let (dir, repo) = repo();
        repo.update(Document::Messages, |list: &mut Vec<String>| {
            list.push("hello".to_string());
            Ok(())
        })
        .unwrap();

        let raw = fs::read_to_string(dir.path().join("messages.json")).unwrap();
        assert!(raw.contains("hello"));
        let list: Vec<String> = repo.read(Document::Messages).unwrap();
        assert_eq!(list, vec!["hello".to_string()]);
    }

    #[test]
    fn failed_update_writes_nothing() {
        let (dir, repo) = repo();
        let result = repo.update(Document::Posts, |list: &mut Vec<String>| -> ApiResult<()> {
            list.push("never stored".to_string());
            Err(ApiError::bad_request("nope"))
        });
        assert!(result.is_err());
        assert!(!dir.path().join("posts.json").exists());
    }

    #[test]
    fn transaction_sees_its_own_writes_and_commits_all() {
        let (_dir, repo) = repo();
        repo.transaction(&[Document::Sessions, Document::Users], |tx| {
            let mut users: BTreeMap<String, u32> = tx.load(Document::Users)?;
            users.insert("alice".to_string(), 1);
            tx.stage(Document::Users, &users)?;

            let again: BTreeMap<String, u32> = tx.load(Document::Users)?;
            assert_eq!(again.get("alice"), Some(&1));

            tx.stage(Document::Sessions, &vec!["token".to_string()])?;
            Ok(())
        })
        .unwrap();

        let users: BTreeMap<String, u32> = repo.read(Document::Users).unwrap();
        let sessions: Vec<String> = repo.read(Document::Sessions).unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(sessions, vec!["token".to_string()]);
    }

    #[test]
    fn failed_transaction_leaves_documents_untouched() {
        let (_dir, repo) = repo();
        repo.update(Document::Users, |users: &mut BTreeMap<String, u32>| {
            users.insert("bob".to_string(), 7);
            Ok(())
        })
        .unwrap();

        let result: ApiResult<()> = repo.transaction(&[Document::Users, Document::Posts], |tx| {
            let mut users: BTreeMap<String, u32> = tx.load(Document::Users)?;
            users.clear();
            tx.stage(Document::Users, &users)?;
            Err(ApiError::Conflict("abort".to_string()))
        });
        assert!(result.is_err());

        let users: BTreeMap<String, u32> = repo.read(Document::Users).unwrap();
        assert_eq!(users.get("bob"), Some(&7));
    }

    #[test]
    fn failed_batch_write_replaces_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.set("users", b"old").unwrap();

        let result = store.set_many(&[("users", &b"new"[..]), ("missing/notifications", &b"x"[..])]);
        assert!(result.is_err());
        assert_eq!(store.get("users").unwrap().as_deref(), Some(&b"old"[..]));
        assert!(!dir.path().join("users.json.tmp").exists());
    }

    #[test]
    fn transaction_rejects_unlocked_documents() {
        let (_dir, repo) = repo();
        let result: ApiResult<()> = repo.transaction(&[Document::Users], |tx| {
            let _: Vec<String> = tx.load(Document::Messages)?;
            Ok(())
        });
        assert!(matches!(result, Err(ApiError::Internal(_))));
    }
}
