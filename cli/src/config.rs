//! Dotenv-backed configuration for the `sarufi` binary.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use parking_lot::RwLock;
use sarufi_core::DEFAULT_BASE_URL;
use tracing::{debug, warn};

pub const USERNAME_KEY: &str = "SARUFI_PLATFORM_USERNAME";
pub const PASSWORD_KEY: &str = "SARUFI_PLATFORM_PASSWORD";
pub const API_KEY_KEY: &str = "SARUFI_API_KEY";
pub const API_SECRET_KEY: &str = "SARUFI_API_SECRET";
pub const TOKEN_KEY: &str = "SARUFI_TOKEN";
pub const BASE_URL_KEY: &str = "SARUFI_BASE_URL";
pub const TIMEOUT_KEY: &str = "SARUFI_TIMEOUT_SECS";

const DEFAULT_FILE_NAME: &str = "sarufi.env";

/// Key/value settings read from a dotenv file.
///
/// `add`, `update` and `set` write the whole file back; `delete` only forgets the
/// key until the next write.
#[derive(Debug)]
pub struct DotEnvReader {
    path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
}

impl DotEnvReader {
    /// Read `path`. A missing file yields an empty reader that will create
    /// the file on the first write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut values = BTreeMap::new();
        if path.exists() {
            let entries = dotenvy::from_path_iter(&path)
                .with_context(|| format!("reading env file {}", path.display()))?;
            for entry in entries {
                let (key, value) =
                    entry.with_context(|| format!("parsing env file {}", path.display()))?;
                values.insert(key, value);
            }
            debug!(path = %path.display(), keys = values.len(), "loaded env file");
        } else {
            debug!(path = %path.display(), "env file not found, starting empty");
        }
        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    /// `sarufi.env` in the directory holding the running executable.
    pub fn default_path() -> Result<PathBuf> {
        let exe = std::env::current_exe().context("locating the executable")?;
        let dir = exe.parent().unwrap_or_else(|| Path::new("."));
        Ok(dir.join(DEFAULT_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    pub fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    pub fn int(&self, key: &str, default: i64) -> i64 {
        self.parsed(key, default)
    }

    pub fn float(&self, key: &str, default: f64) -> f64 {
        self.parsed(key, default)
    }

    /// `true` and `1` are true, anything else present is false.
    pub fn bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(value) => value == "true" || value == "1",
            None => default,
        }
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        let Some(raw) = self.get(key) else {
            return default;
        };
        match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, value = %raw, "ignoring unparsable setting");
                default
            }
        }
    }

    /// Add a new key and persist. Fails if the key is already set.
    pub fn add(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.write();
        if values.contains_key(key) {
            bail!("key {key} already exists");
        }
        values.insert(key.to_string(), value.to_string());
        self.persist(&values)
    }

    /// Replace an existing key and persist. Fails if the key is not set.
    pub fn update(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.write();
        match values.get_mut(key) {
            Some(existing) => *existing = value.to_string(),
            None => bail!("key {key} does not exist"),
        }
        self.persist(&values)
    }

    /// Add or replace `key`, whichever applies.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.write();
        values.insert(key.to_string(), value.to_string());
        self.persist(&values)
    }

    pub fn delete(&self, key: &str) -> Option<String> {
        self.values.write().remove(key)
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<()> {
        let mut out = String::new();
        for (key, value) in values {
            out.push_str(key);
            out.push_str("=\"");
            for c in value.chars() {
                match c {
                    '"' => out.push_str("\\\""),
                    '\\' => out.push_str("\\\\"),
                    '$' => out.push_str("\\$"),
                    '\n' => out.push_str("\\n"),
                    c => out.push(c),
                }
            }
            out.push_str("\"\n");
        }
        fs::write(&self.path, out)
            .with_context(|| format!("writing env file {}", self.path.display()))?;
        debug!(path = %self.path.display(), keys = values.len(), "saved env file");
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn from_reader(reader: &DotEnvReader) -> Self {
        Self {
            username: reader.string(USERNAME_KEY, ""),
            password: reader.string(PASSWORD_KEY, ""),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

/// Settings after merging command-line flags over the env file.
#[derive(Debug, Clone)]
pub struct Settings {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Option<Duration>,
    pub credentials: Credentials,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
}

impl Settings {
    pub fn resolve(reader: &DotEnvReader, base_url: Option<String>, token: Option<String>) -> Self {
        let non_empty = |value: Option<String>| value.filter(|v| !v.is_empty());
        let timeout = match reader.int(TIMEOUT_KEY, 0) {
            secs if secs > 0 => Some(Duration::from_secs(secs as u64)),
            _ => None,
        };
        Self {
            base_url: non_empty(base_url)
                .unwrap_or_else(|| reader.string(BASE_URL_KEY, DEFAULT_BASE_URL)),
            token: non_empty(token).or_else(|| non_empty(reader.get(TOKEN_KEY))),
            timeout,
            credentials: Credentials::from_reader(reader),
            api_key: non_empty(reader.get(API_KEY_KEY)),
            api_secret: non_empty(reader.get(API_SECRET_KEY)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn reader_with(contents: &str) -> (tempfile::TempDir, DotEnvReader) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sarufi.env");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        let reader = DotEnvReader::open(&path).unwrap();
        (dir, reader)
    }

    #[test]
    fn typed_getters_fall_back_to_defaults() {
        let (_dir, reader) = reader_with("RETRIES=3\nRATIO=0.5\nDEBUG=1\nBROKEN=abc\n");
        assert_eq!(reader.int("RETRIES", 0), 3);
        assert_eq!(reader.float("RATIO", 0.0), 0.5);
        assert!(reader.bool("DEBUG", false));
        assert_eq!(reader.int("BROKEN", 7), 7);
        assert_eq!(reader.string("MISSING", "fallback"), "fallback");
        assert!(reader.bool("MISSING", true));
    }

    #[test]
    fn bool_only_accepts_true_or_one() {
        let (_dir, reader) = reader_with("A=true\nB=yes\nC=0\n");
        assert!(reader.bool("A", false));
        assert!(!reader.bool("B", true));
        assert!(!reader.bool("C", true));
    }

    #[test]
    fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let reader = DotEnvReader::open(dir.path().join("absent.env")).unwrap();
        assert!(reader.get(USERNAME_KEY).is_none());
        assert!(!Credentials::from_reader(&reader).is_complete());
    }

    #[test]
    fn add_persists_and_rejects_duplicates() {
        let (_dir, reader) = reader_with("");
        reader.add(TOKEN_KEY, "abc \"quoted\"").unwrap();
        assert!(reader.add(TOKEN_KEY, "other").is_err());

        let reopened = DotEnvReader::open(reader.path()).unwrap();
        assert_eq!(reopened.get(TOKEN_KEY).as_deref(), Some("abc \"quoted\""));
    }

    #[test]
    fn update_requires_existing_key() {
        let (_dir, reader) = reader_with("SARUFI_TOKEN=old\n");
        assert!(reader.update("NOPE", "x").is_err());
        reader.update(TOKEN_KEY, "new").unwrap();

        let reopened = DotEnvReader::open(reader.path()).unwrap();
        assert_eq!(reopened.get(TOKEN_KEY).as_deref(), Some("new"));
    }

    #[test]
    fn delete_is_in_memory_only() {
        let (_dir, reader) = reader_with("SARUFI_TOKEN=keep\n");
        assert_eq!(reader.delete(TOKEN_KEY).as_deref(), Some("keep"));
        assert!(reader.get(TOKEN_KEY).is_none());

        let reopened = DotEnvReader::open(reader.path()).unwrap();
        assert_eq!(reopened.get(TOKEN_KEY).as_deref(), Some("keep"));
    }

    #[test]
    fn set_adds_then_updates() {
        let (_dir, reader) = reader_with("");
        reader.set(TOKEN_KEY, "one").unwrap();
        reader.set(TOKEN_KEY, "two").unwrap();
        assert_eq!(reader.get(TOKEN_KEY).as_deref(), Some("two"));
    }

    #[test]
    fn concurrent_sets_all_reach_the_file() {
        let (_dir, reader) = reader_with("");
        let reader = std::sync::Arc::new(reader);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let reader = reader.clone();
                std::thread::spawn(move || reader.set(&format!("KEY_{i}"), &i.to_string()).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let reopened = DotEnvReader::open(reader.path().to_path_buf()).unwrap();
        for i in 0..8 {
            assert_eq!(reopened.get(&format!("KEY_{i}")), Some(i.to_string()));
        }
    }

    #[test]
    fn flags_take_precedence_over_file() {
        let (_dir, reader) = reader_with(
            "SARUFI_BASE_URL=http://file\nSARUFI_TOKEN=file-token\nSARUFI_TIMEOUT_SECS=9\n\
             SARUFI_PLATFORM_USERNAME=jane\nSARUFI_PLATFORM_PASSWORD=secret\n",
        );

        let settings = Settings::resolve(&reader, Some("http://flag".into()), Some("flag-token".into()));
        assert_eq!(settings.base_url, "http://flag");
        assert_eq!(settings.token.as_deref(), Some("flag-token"));
        assert_eq!(settings.timeout, Some(Duration::from_secs(9)));
        assert!(settings.credentials.is_complete());

        let settings = Settings::resolve(&reader, None, Some(String::new()));
        assert_eq!(settings.base_url, "http://file");
        assert_eq!(settings.token.as_deref(), Some("file-token"));
    }

    #[test]
    fn defaults_without_file_or_flags() {
        let (_dir, reader) = reader_with("");
        let settings = Settings::resolve(&reader, None, None);
        assert_eq!(settings.base_url, DEFAULT_BASE_URL);
        assert!(settings.token.is_none());
        assert!(settings.timeout.is_none());
    }
}
