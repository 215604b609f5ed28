use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::batch::PartialFailurePolicy;
use crate::enrich::{
    EnrichField, DEFAULT_REQUESTS_PER_SECOND, MAX_FETCH_IDS, MAX_REQUESTS_PER_SECOND,
};
use crate::hierarchy::DEFAULT_ROOT_PREFIX;
use crate::pubmed::DEFAULT_EUTILS_URL;
use crate::zotero::MAX_BATCH_SIZE;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub destination: DestinationConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// Path to `Database.papersdb`.
    pub database: PathBuf,
    /// Directory PDF paths are relative to. Defaults to the database's
    /// directory.
    #[serde(default)]
    pub attachments_root: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DestinationConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Zotero data directory. PDFs are not copied when unset.
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,
    #[serde(default = "default_root_prefix")]
    pub root_prefix: String,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            storage_dir: None,
            root_prefix: default_root_prefix(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.zotero.org".to_string()
}

fn default_root_prefix() -> String {
    DEFAULT_ROOT_PREFIX.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub on_partial_failure: PartialFailurePolicy,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            on_partial_failure: PartialFailurePolicy::default(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_batch_size() -> usize {
    MAX_BATCH_SIZE
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct EnrichmentConfig {
    #[serde(default = "default_eutils_url")]
    pub api_url: String,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
    #[serde(default = "default_max_fetch_ids")]
    pub max_fetch_ids: usize,
    #[serde(default = "default_fields")]
    pub fields: Vec<EnrichField>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            api_url: default_eutils_url(),
            requests_per_second: default_requests_per_second(),
            max_fetch_ids: default_max_fetch_ids(),
            fields: default_fields(),
        }
    }
}

fn default_eutils_url() -> String {
    DEFAULT_EUTILS_URL.to_string()
}

fn default_requests_per_second() -> u32 {
    DEFAULT_REQUESTS_PER_SECOND
}

fn default_max_fetch_ids() -> usize {
    MAX_FETCH_IDS
}

fn default_fields() -> Vec<EnrichField> {
    vec![EnrichField::Journal, EnrichField::Abstract]
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.upload.batch_size == 0 || config.upload.batch_size > MAX_BATCH_SIZE {
        anyhow::bail!("upload.batch_size must be between 1 and {}", MAX_BATCH_SIZE);
    }

    if config.upload.timeout_secs == 0 {
        anyhow::bail!("upload.timeout_secs must be > 0");
    }

    if !(1..=MAX_REQUESTS_PER_SECOND).contains(&config.enrichment.requests_per_second) {
        anyhow::bail!(
            "enrichment.requests_per_second must be between 1 and {}",
            MAX_REQUESTS_PER_SECOND
        );
    }

    if config.enrichment.max_fetch_ids == 0 || config.enrichment.max_fetch_ids > MAX_FETCH_IDS {
        anyhow::bail!("enrichment.max_fetch_ids must be between 1 and {}", MAX_FETCH_IDS);
    }

    if config.destination.root_prefix.trim().is_empty() {
        anyhow::bail!("destination.root_prefix must not be empty");
    }

    for (name, url) in [
        ("destination.api_url", &config.destination.api_url),
        ("enrichment.api_url", &config.enrichment.api_url),
    ] {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            anyhow::bail!("{} must be an http(s) URL, got '{}'", name, url);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let file = write_config(
            r#"
[source]
database = "/tmp/Database.papersdb"
"#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.destination.api_url, "https://api.zotero.org");
        assert_eq!(config.destination.root_prefix, "passport-import");
        assert_eq!(config.upload.batch_size, 50);
        assert_eq!(config.upload.on_partial_failure, PartialFailurePolicy::Abort);
        assert_eq!(config.enrichment.requests_per_second, 3);
        assert_eq!(config.enrichment.max_fetch_ids, 10_000);
        assert_eq!(
            config.enrichment.fields,
            vec![EnrichField::Journal, EnrichField::Abstract]
        );
    }

    #[test]
    fn test_full_config_parses() {
        let file = write_config(
            r#"
[source]
database = "/lib/Database.papersdb"
attachments_root = "/lib"

[destination]
storage_dir = "/home/me/Zotero"
root_prefix = "papers"

[upload]
batch_size = 10
on_partial_failure = "continue"

[enrichment]
requests_per_second = 2
fields = ["abstract"]
"#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.source.attachments_root, Some(PathBuf::from("/lib")));
        assert_eq!(config.upload.on_partial_failure, PartialFailurePolicy::Continue);
        assert_eq!(config.enrichment.fields, vec![EnrichField::Abstract]);
    }

    #[test]
    fn test_batch_size_over_limit_rejected() {
        let file = write_config(
            r#"
[source]
database = "/tmp/db"

[upload]
batch_size = 51
"#,
        );
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_rate_above_ceiling_rejected() {
        let file = write_config(
            r#"
[source]
database = "/tmp/db"

[enrichment]
requests_per_second = 4
"#,
        );
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("requests_per_second"));

        let file = write_config(
            r#"
[source]
database = "/tmp/db"

[enrichment]
requests_per_second = 10
"#,
        );
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_missing_source_rejected() {
        let file = write_config("[upload]\nbatch_size = 5\n");
        assert!(load_config(file.path()).is_err());
    }
}
