use crate::error::{Error, Result};
use crate::loader::{IngestMode, MAX_UPLOAD_BYTES};
use std::path::PathBuf;

pub const ENV_DATA_DIR: &str = "CHARTBOOK_DATA_DIR";
pub const ENV_MAX_UPLOAD_BYTES: &str = "CHARTBOOK_MAX_UPLOAD_BYTES";
pub const ENV_INGEST_MODE: &str = "CHARTBOOK_INGEST_MODE";
pub const ENV_PAGE_SIZE: &str = "CHARTBOOK_PAGE_SIZE";
pub const ENV_LOG: &str = "CHARTBOOK_LOG";

const DATABASE_DIR: &str = "database";
const USERS_FILE: &str = "users.json";
const DATASETS_DIR: &str = "datasets";

/// Runtime settings. Defaults match the hosted upload service.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Root for the dataset documents and the usage ledger
    pub data_dir: PathBuf,
    /// Upload limit, never above [`MAX_UPLOAD_BYTES`]
    pub max_upload_bytes: u64,
    pub ingest_mode: IngestMode,
    /// Default history page size
    pub page_size: usize,
    /// `tracing_subscriber::EnvFilter` directive
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DATABASE_DIR),
            max_upload_bytes: MAX_UPLOAD_BYTES,
            ingest_mode: IngestMode::Object,
            page_size: 10,
            log_filter: "info".to_string(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup; unset or empty keys keep defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut settings = Settings::default();

        if let Some(dir) = get(ENV_DATA_DIR) {
            settings.data_dir = PathBuf::from(dir);
        }
        if let Some(raw) = get(ENV_MAX_UPLOAD_BYTES) {
            let max: u64 = parse_number(ENV_MAX_UPLOAD_BYTES, &raw)?;
            if max == 0 || max > MAX_UPLOAD_BYTES {
                return Err(Error::Config(format!(
                    "{} must be between 1 and {}",
                    ENV_MAX_UPLOAD_BYTES, MAX_UPLOAD_BYTES
                )));
            }
            settings.max_upload_bytes = max;
        }
        if let Some(raw) = get(ENV_INGEST_MODE) {
            settings.ingest_mode = raw.parse()?;
        }
        if let Some(raw) = get(ENV_PAGE_SIZE) {
            let size: usize = parse_number(ENV_PAGE_SIZE, &raw)?;
            if size == 0 {
                return Err(Error::Config(format!("{} must be positive", ENV_PAGE_SIZE)));
            }
            settings.page_size = size;
        }
        if let Some(filter) = get(ENV_LOG) {
            settings.log_filter = filter;
        }

        Ok(settings)
    }

    pub fn datasets_dir(&self) -> PathBuf {
        self.data_dir.join(DATASETS_DIR)
    }

    pub fn users_file(&self) -> PathBuf {
        self.data_dir.join(USERS_FILE)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} is not a number: {:?}", key, raw)))
}
