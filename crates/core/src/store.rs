//! File-backed document store.
//!
//! One directory per collection, one YAML document per record, sharded by record id:
//!
//! ```text
//! <data_dir>/
//!   requisitions/
//!     <s1>/
//!       <s2>/
//!         <id>/
//!           document.yaml
//! ```
//!
//! Writes go to a sibling temporary file that is then renamed over the document, so a reader
//! never sees a half-written record. Read-modify-write sequences go through
//! [`DocumentStore::modify`], and checks that must hold until a write lands go through
//! [`DocumentStore::transaction`]; both serialise writers within the process.

use crate::constants::DOCUMENT_FILENAME;
use crate::error::{CoreError, CoreResult};
use reqtrack_uuid::RecordId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// The collections held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Units,
    Agents,
    ProcedureGroups,
    Procedures,
    Requisitions,
    Drafts,
}

impl Collection {
    pub const ALL: [Collection; 7] = [
        Collection::Users,
        Collection::Units,
        Collection::Agents,
        Collection::ProcedureGroups,
        Collection::Procedures,
        Collection::Requisitions,
        Collection::Drafts,
    ];

    /// Directory name of the collection under the data dir.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Units => "units",
            Collection::Agents => "agents",
            Collection::ProcedureGroups => "procedure_groups",
            Collection::Procedures => "procedures",
            Collection::Requisitions => "requisitions",
            Collection::Drafts => "drafts",
        }
    }
}

/// A record type stored in exactly one collection.
pub trait Document: Serialize + DeserializeOwned {
    const COLLECTION: Collection;

    fn id(&self) -> RecordId;
}

#[derive(Debug)]
pub struct DocumentStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl DocumentStore {
    /// Opens a store rooted at `root`, creating the collection directories.
    pub fn open(root: &Path) -> CoreResult<Self> {
        for collection in Collection::ALL {
            fs::create_dir_all(root.join(collection.dir_name()))
                .map_err(CoreError::StorageDirCreation)?;
        }
        Ok(Self {
            root: root.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_dir(&self, collection: Collection) -> PathBuf {
        self.root.join(collection.dir_name())
    }

    fn document_path(&self, collection: Collection, id: &RecordId) -> PathBuf {
        id.sharded_dir(&self.collection_dir(collection))
            .join(DOCUMENT_FILENAME)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        // Writes are rename-based and never leave a partial document behind.
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs `work` with the write lock held for its whole duration.
    ///
    /// Every read and write made through the [`StoreTxn`] sees and changes the store without
    /// another writer interleaving, so a uniqueness or reference check stays true until the
    /// write that depends on it lands.
    pub fn transaction<R, F>(&self, work: F) -> CoreResult<R>
    where
        F: FnOnce(&StoreTxn<'_>) -> CoreResult<R>,
    {
        let _guard = self.lock();
        work(&StoreTxn { store: self })
    }

    fn unlocked(&self) -> StoreTxn<'_> {
        StoreTxn { store: self }
    }

    pub fn exists<T: Document>(&self, id: &RecordId) -> bool {
        self.unlocked().exists::<T>(id)
    }

    /// Stores a new document.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Conflict`] if a document with the same id already exists.
    pub fn insert<T: Document>(&self, doc: &T) -> CoreResult<()> {
        self.transaction(|tx| tx.insert(doc))
    }

    /// Replaces an existing document.
    pub fn update<T: Document>(&self, doc: &T) -> CoreResult<()> {
        self.transaction(|tx| tx.update(doc))
    }

    /// Loads a document, applies `change` and writes it back while holding the write lock.
    ///
    /// Nothing is written if `change` returns an error.
    pub fn modify<T, F>(&self, id: &RecordId, change: F) -> CoreResult<T>
    where
        T: Document,
        F: FnOnce(&mut T) -> CoreResult<()>,
    {
        self.transaction(|tx| tx.modify(id, change))
    }

    pub fn get<T: Document>(&self, id: &RecordId) -> CoreResult<T> {
        self.unlocked().get(id)
    }

    pub fn find<T: Document>(&self, id: &RecordId) -> CoreResult<Option<T>> {
        self.unlocked().find(id)
    }

    /// Deletes a document and prunes shard directories it leaves empty.
    pub fn delete<T: Document>(&self, id: &RecordId) -> CoreResult<()> {
        self.transaction(|tx| tx.delete::<T>(id))
    }

    /// Lists every document in the collection.
    ///
    /// Documents that cannot be read or parsed are logged and skipped, so one corrupt record
    /// does not take a listing down.
    pub fn list<T: Document>(&self) -> Vec<T> {
        self.unlocked().list()
    }
}

/// Store access inside [`DocumentStore::transaction`]. The write lock is already held.
pub struct StoreTxn<'a> {
    store: &'a DocumentStore,
}

impl StoreTxn<'_> {
    pub fn exists<T: Document>(&self, id: &RecordId) -> bool {
        self.store.document_path(T::COLLECTION, id).is_file()
    }

    pub fn insert<T: Document>(&self, doc: &T) -> CoreResult<()> {
        let path = self.store.document_path(T::COLLECTION, &doc.id());
        if path.exists() {
            return Err(CoreError::Conflict(format!(
                "{} record {} already exists",
                T::COLLECTION.dir_name(),
                doc.id()
            )));
        }
        write_document(&path, doc)
    }

    pub fn update<T: Document>(&self, doc: &T) -> CoreResult<()> {
        let path = self.store.document_path(T::COLLECTION, &doc.id());
        if !path.is_file() {
            return Err(not_found::<T>(&doc.id()));
        }
        write_document(&path, doc)
    }

    pub fn modify<T, F>(&self, id: &RecordId, change: F) -> CoreResult<T>
    where
        T: Document,
        F: FnOnce(&mut T) -> CoreResult<()>,
    {
        let path = self.store.document_path(T::COLLECTION, id);
        let mut doc: T = read_document(&path)?.ok_or_else(|| not_found::<T>(id))?;
        change(&mut doc)?;
        write_document(&path, &doc)?;
        Ok(doc)
    }

    pub fn get<T: Document>(&self, id: &RecordId) -> CoreResult<T> {
        self.find(id)?.ok_or_else(|| not_found::<T>(id))
    }

    pub fn find<T: Document>(&self, id: &RecordId) -> CoreResult<Option<T>> {
        read_document(&self.store.document_path(T::COLLECTION, id))
    }

    pub fn delete<T: Document>(&self, id: &RecordId) -> CoreResult<()> {
        let collection_dir = self.store.collection_dir(T::COLLECTION);
        let record_dir = id.sharded_dir(&collection_dir);
        if !record_dir.join(DOCUMENT_FILENAME).is_file() {
            return Err(not_found::<T>(id));
        }
        fs::remove_dir_all(&record_dir).map_err(CoreError::FileWrite)?;

        let mut dir = record_dir.parent();
        while let Some(shard) = dir {
            if shard == collection_dir || fs::remove_dir(shard).is_err() {
                break;
            }
            dir = shard.parent();
        }
        Ok(())
    }

    pub fn list<T: Document>(&self) -> Vec<T> {
        let mut docs = Vec::new();

        let s1_iter = match fs::read_dir(self.store.collection_dir(T::COLLECTION)) {
            Ok(it) => it,
            Err(_) => return docs,
        };
        for s1 in s1_iter.flatten() {
            let s1_path = s1.path();
            if !s1_path.is_dir() {
                continue;
            }

            let s2_iter = match fs::read_dir(&s1_path) {
                Ok(it) => it,
                Err(_) => continue,
            };

            for s2 in s2_iter.flatten() {
                let id_iter = match fs::read_dir(s2.path()) {
                    Ok(it) => it,
                    Err(_) => continue,
                };

                for id_ent in id_iter.flatten() {
                    let doc_path = id_ent.path().join(DOCUMENT_FILENAME);
                    if !doc_path.is_file() {
                        continue;
                    }
                    match read_document::<T>(&doc_path) {
                        Ok(Some(doc)) => docs.push(doc),
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!("skipping unreadable document: {}", e);
                        }
                    }
                }
            }
        }

        docs
    }
}

fn not_found<T: Document>(id: &RecordId) -> CoreError {
    CoreError::NotFound {
        collection: T::COLLECTION.dir_name(),
        id: id.to_string(),
    }
}

fn read_document<T: DeserializeOwned>(path: &Path) -> CoreResult<Option<T>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CoreError::FileRead(e)),
    };

    let deserializer = serde_yaml::Deserializer::from_str(&contents);
    match serde_path_to_error::deserialize::<_, T>(deserializer) {
        Ok(doc) => Ok(Some(doc)),
        Err(err) => {
            let field = err.path().to_string();
            let field = if field.is_empty() {
                "<root>".to_string()
            } else {
                field
            };
            Err(CoreError::DocumentSchema {
                path: path.to_path_buf(),
                message: format!("at {}: {}", field, err.into_inner()),
            })
        }
    }
}

fn write_document<T: Serialize>(path: &Path, doc: &T) -> CoreResult<()> {
    let yaml = serde_yaml::to_string(doc).map_err(CoreError::YamlSerialization)?;
    let dir = path
        .parent()
        .ok_or_else(|| CoreError::InvalidInput(format!("bad document path {}", path.display())))?;
    fs::create_dir_all(dir).map_err(CoreError::StorageDirCreation)?;

    let staging = dir.join(format!("{}.tmp", DOCUMENT_FILENAME));
    fs::write(&staging, yaml).map_err(CoreError::FileWrite)?;
    fs::rename(&staging, path).map_err(CoreError::FileWrite)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: RecordId,
        text: String,
        count: u32,
    }

    impl Document for Note {
        const COLLECTION: Collection = Collection::Units;

        fn id(&self) -> RecordId {
            self.id
        }
    }

    fn note(text: &str) -> Note {
        Note {
            id: RecordId::new(),
            text: text.into(),
            count: 0,
        }
    }

    #[test]
    fn test_open_creates_collection_dirs() {
        let temp = TempDir::new().unwrap();
        let _store = DocumentStore::open(temp.path()).unwrap();
        for collection in Collection::ALL {
            assert!(temp.path().join(collection.dir_name()).is_dir());
        }
    }

    #[test]
    fn test_insert_then_get() {
        let temp = TempDir::new().unwrap();
        let store = DocumentStore::open(temp.path()).unwrap();
        let doc = note("hello");

        store.insert(&doc).unwrap();

        let path = doc.id.sharded_dir(&temp.path().join("units")).join(DOCUMENT_FILENAME);
        assert!(path.is_file());
        assert_eq!(store.get::<Note>(&doc.id).unwrap(), doc);
    }

    #[test]
    fn test_insert_twice_conflicts() {
        let temp = TempDir::new().unwrap();
        let store = DocumentStore::open(temp.path()).unwrap();
        let doc = note("hello");
        store.insert(&doc).unwrap();
        assert!(matches!(store.insert(&doc), Err(CoreError::Conflict(_))));
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let temp = TempDir::new().unwrap();
        let store = DocumentStore::open(temp.path()).unwrap();
        let err = store.get::<Note>(&RecordId::new()).unwrap_err();
        assert!(matches!(err, CoreError::NotFound { collection: "units", .. }));
    }

    #[test]
    fn test_update_requires_existing() {
        let temp = TempDir::new().unwrap();
        let store = DocumentStore::open(temp.path()).unwrap();
        let err = store.update(&note("ghost")).unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[test]
    fn test_modify_is_all_or_nothing() {
        let temp = TempDir::new().unwrap();
        let store = DocumentStore::open(temp.path()).unwrap();
        let doc = note("counter");
        store.insert(&doc).unwrap();

        let updated = store
            .modify::<Note, _>(&doc.id, |n| {
                n.count += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(updated.count, 1);

        let err = store.modify::<Note, _>(&doc.id, |n| {
            n.count = 100;
            Err(CoreError::Conflict("no".into()))
        });
        assert!(err.is_err());
        assert_eq!(store.get::<Note>(&doc.id).unwrap().count, 1);
    }

    #[test]
    fn test_transaction_serialises_check_then_write() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(DocumentStore::open(temp.path()).unwrap());

        // Each thread inserts only while no note with its text exists yet.
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store.transaction(|tx| {
                        if tx.list::<Note>().iter().any(|n| n.text == "only") {
                            return Err(CoreError::Conflict("taken".into()));
                        }
                        std::thread::sleep(std::time::Duration::from_millis(5));
                        tx.insert(&note("only"))
                    })
                })
            })
            .collect();
        let inserted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(Result::is_ok)
            .count();

        assert_eq!(inserted, 1);
        assert_eq!(store.list::<Note>().len(), 1);
    }

    #[test]
    fn test_transaction_error_keeps_earlier_writes() {
        let temp = TempDir::new().unwrap();
        let store = DocumentStore::open(temp.path()).unwrap();
        let kept = note("kept");

        let result: CoreResult<()> = store.transaction(|tx| {
            tx.insert(&kept)?;
            Err(CoreError::Conflict("stop".into()))
        });

        assert!(result.is_err());
        assert!(store.exists::<Note>(&kept.id));
    }

    #[test]
    fn test_delete_prunes_shards() {
        let temp = TempDir::new().unwrap();
        let store = DocumentStore::open(temp.path()).unwrap();
        let doc = note("bye");
        store.insert(&doc).unwrap();

        store.delete::<Note>(&doc.id).unwrap();

        assert!(!store.exists::<Note>(&doc.id));
        let units = temp.path().join("units");
        assert!(units.is_dir());
        assert_eq!(fs::read_dir(&units).unwrap().count(), 0);
        assert!(matches!(
            store.delete::<Note>(&doc.id),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_list_skips_corrupt_documents() {
        let temp = TempDir::new().unwrap();
        let store = DocumentStore::open(temp.path()).unwrap();
        store.insert(&note("one")).unwrap();
        store.insert(&note("two")).unwrap();

        let bad_id = RecordId::new();
        let bad_dir = bad_id.sharded_dir(&temp.path().join("units"));
        fs::create_dir_all(&bad_dir).unwrap();
        fs::write(bad_dir.join(DOCUMENT_FILENAME), "id: [[[").unwrap();

        let mut texts: Vec<_> = store.list::<Note>().into_iter().map(|n| n.text).collect();
        texts.sort();
        assert_eq!(texts, vec!["one", "two"]);
    }

    #[test]
    fn test_schema_error_names_field() {
        let temp = TempDir::new().unwrap();
        let store = DocumentStore::open(temp.path()).unwrap();
        let doc = note("typed");
        store.insert(&doc).unwrap();

        let path = doc.id.sharded_dir(&temp.path().join("units")).join(DOCUMENT_FILENAME);
        fs::write(
            &path,
            format!("id: {}\ntext: typed\ncount: lots\n", doc.id),
        )
        .unwrap();

        match store.get::<Note>(&doc.id) {
            Err(CoreError::DocumentSchema { message, .. }) => {
                assert!(message.contains("count"), "message was {message}");
            }
            other => panic!("expected schema error, got {other:?}"),
        }
    }
}
