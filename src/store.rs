//! Dataset persistence.
//!
//! Every dataset is one document; analyses live inside it. A write replaces
//! the whole document, so concurrent edits to the same dataset are
//! last-writer-wins.

use crate::dataset::{Dataset, UserId};
use crate::error::{Error, Result};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::collections::HashMap;
use std::fs::{self, File, create_dir_all};
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

const DOCUMENT_EXTENSION: &str = "json.gz";

/// Document store for datasets
pub trait DatasetStore: Send + Sync {
    fn create(&self, dataset: &Dataset) -> Result<()>;

    fn find_by_id(&self, id: Uuid) -> Result<Option<Dataset>>;

    /// All datasets of one owner, newest first. Documents that cannot be
    /// read are left out of the listing.
    fn find_by_owner(&self, owner: &UserId) -> Result<Vec<Dataset>>;

    /// Replace a stored dataset. Fails with `NotFound` if it is gone.
    fn update(&self, dataset: &Dataset) -> Result<()>;

    fn delete(&self, id: Uuid) -> Result<()>;
}

fn newest_first(datasets: &mut [Dataset]) {
    datasets.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
}

/// Datasets kept in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    datasets: RwLock<HashMap<Uuid, Dataset>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.datasets.read().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::Storage("dataset store lock poisoned".to_string())
}

impl DatasetStore for MemoryStore {
    fn create(&self, dataset: &Dataset) -> Result<()> {
        let mut datasets = self.datasets.write().map_err(poisoned)?;
        if datasets.contains_key(&dataset.id) {
            return Err(Error::Storage(format!("dataset {} already exists", dataset.id)));
        }
        datasets.insert(dataset.id, dataset.clone());
        Ok(())
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<Dataset>> {
        let datasets = self.datasets.read().map_err(poisoned)?;
        Ok(datasets.get(&id).cloned())
    }

    fn find_by_owner(&self, owner: &UserId) -> Result<Vec<Dataset>> {
        let datasets = self.datasets.read().map_err(poisoned)?;
        let mut owned: Vec<Dataset> = datasets
            .values()
            .filter(|d| d.is_owned_by(owner))
            .cloned()
            .collect();
        newest_first(&mut owned);
        Ok(owned)
    }

    fn update(&self, dataset: &Dataset) -> Result<()> {
        let mut datasets = self.datasets.write().map_err(poisoned)?;
        match datasets.get_mut(&dataset.id) {
            Some(slot) => {
                *slot = dataset.clone();
                Ok(())
            }
            None => Err(Error::dataset_not_found(dataset.id)),
        }
    }

    fn delete(&self, id: Uuid) -> Result<()> {
        let mut datasets = self.datasets.write().map_err(poisoned)?;
        datasets
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::dataset_not_found(id))
    }
}

/// Datasets stored as gzip-compressed JSON, one file per dataset
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `dir`
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.{}", id, DOCUMENT_EXTENSION))
    }

    fn write_document(&self, dataset: &Dataset) -> Result<()> {
        let path = self.path_for(dataset.id);
        let tmp = path.with_extension("gz.tmp");
        let written = Self::write_compressed(&tmp, dataset)
            .and_then(|()| fs::rename(&tmp, &path).map_err(Error::from));
        if written.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        written
    }

    fn write_compressed(path: &Path, dataset: &Dataset) -> Result<()> {
        let file = File::create(path)?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut writer = BufWriter::new(encoder);
        serde_json::to_writer(&mut writer, dataset)?;
        let encoder = writer
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))?;
        encoder.finish()?.sync_all()?;
        Ok(())
    }

    fn read_document(path: &Path) -> Result<Dataset> {
        let file = File::open(path)?;
        let reader = BufReader::new(GzDecoder::new(file));
        Ok(serde_json::from_reader(reader)?)
    }
}

impl DatasetStore for FileStore {
    fn create(&self, dataset: &Dataset) -> Result<()> {
        if self.path_for(dataset.id).exists() {
            return Err(Error::Storage(format!("dataset {} already exists", dataset.id)));
        }
        self.write_document(dataset)
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<Dataset>> {
        match Self::read_document(&self.path_for(id)) {
            Ok(dataset) => Ok(Some(dataset)),
            Err(Error::Io(e)) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn find_by_owner(&self, owner: &UserId) -> Result<Vec<Dataset>> {
        let suffix = format!(".{}", DOCUMENT_EXTENSION);
        let mut owned = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_document = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(&suffix));
            if !is_document {
                continue;
            }

            match Self::read_document(&path) {
                Ok(dataset) if dataset.is_owned_by(owner) => owned.push(dataset),
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "skipping unreadable dataset document"
                    );
                }
            }
        }

        newest_first(&mut owned);
        Ok(owned)
    }

    fn update(&self, dataset: &Dataset) -> Result<()> {
        if !self.path_for(dataset.id).exists() {
            return Err(Error::dataset_not_found(dataset.id));
        }
        self.write_document(dataset)
    }

    fn delete(&self, id: Uuid) -> Result<()> {
        match fs::remove_file(self.path_for(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::dataset_not_found(id)),
            Err(e) => Err(e.into()),
        }
    }
}
