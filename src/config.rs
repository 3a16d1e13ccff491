//! Job file loading and validation
//!
//! Jobs are read from a YAML file (by default `.dynamoutil.yaml`) holding lists of named
//! `copy`, `dump` and `rename` jobs plus optional tuning `settings`. `${VAR}` placeholders
//! are substituted from the environment before parsing so credentials can stay out of the
//! file.

use crate::client::MAX_BATCH_SIZE;
use crate::error::{Error, Result};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_yaml::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

/// Name of the job file looked up in the working and home directories
pub const DEFAULT_CONFIG_FILE: &str = ".dynamoutil.yaml";

/// Job name used when none is given on the command line
pub const DEFAULT_SERVICE: &str = "default";

/// Connection details for one table
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TableEndpoint {
    pub region: String,

    #[serde(rename = "table")]
    pub table_name: String,

    /// Endpoint override, required for DynamoDB local
    pub endpoint: String,

    #[serde(rename = "accessKeyID")]
    pub access_key_id: String,

    #[serde(rename = "secretAccessKey")]
    pub secret_access_key: String,
}

impl TableEndpoint {
    pub fn new(region: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            table_name: table_name.into(),
            ..Self::default()
        }
    }

    /// The endpoint override, if one is configured
    pub fn endpoint_url(&self) -> Option<&str> {
        let url = self.endpoint.trim();
        (!url.is_empty()).then_some(url)
    }

    /// Static credentials, if both halves are configured
    pub fn static_credentials(&self) -> Option<(&str, &str)> {
        if self.access_key_id.is_empty() || self.secret_access_key.is_empty() {
            None
        } else {
            Some((&self.access_key_id, &self.secret_access_key))
        }
    }

    fn validate(&self, what: &str) -> Result<()> {
        if self.region.trim().is_empty() {
            return Err(Error::Config(format!("{}: region is required", what)));
        }
        if self.table_name.trim().is_empty() {
            return Err(Error::Config(format!("{}: table is required", what)));
        }
        if self.access_key_id.is_empty() != self.secret_access_key.is_empty() {
            return Err(Error::Config(format!(
                "{}: accessKeyID and secretAccessKey must be given together",
                what
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for TableEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "region: {} table: {} endpoint: {}",
            self.region, self.table_name, self.endpoint
        )
    }
}

/// A COPY job
#[derive(Debug, Clone, Deserialize)]
pub struct CopyJob {
    pub service: String,
    pub origin: TableEndpoint,
    pub target: TableEndpoint,
}

/// Output serialization of a DUMP job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// A single JSON array
    Json,
    /// One JSON object per line
    #[default]
    JsonRaw,
}

impl<'de> Deserialize<'de> for OutputFormat {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = Option::<String>::deserialize(deserializer)?;
        Ok(OutputFormat::from_name(name.as_deref().unwrap_or_default()))
    }
}

impl OutputFormat {
    /// Maps a configured output name; an empty or unrecognised name selects `jsonRaw`
    pub fn from_name(name: &str) -> Self {
        match name {
            "json" => OutputFormat::Json,
            "jsonRaw" | "" => OutputFormat::JsonRaw,
            other => {
                log::warn!("unknown output format '{}', using jsonRaw", other);
                OutputFormat::JsonRaw
            }
        }
    }

    pub fn prefix(&self) -> &'static [u8] {
        match self {
            OutputFormat::Json => b"[",
            OutputFormat::JsonRaw => b"",
        }
    }

    pub fn delimiter(&self) -> &'static [u8] {
        match self {
            OutputFormat::Json => b",",
            OutputFormat::JsonRaw => b"\n",
        }
    }

    pub fn suffix(&self) -> &'static [u8] {
        match self {
            OutputFormat::Json => b"]",
            OutputFormat::JsonRaw => b"",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::JsonRaw => write!(f, "jsonRaw"),
        }
    }
}

/// A DUMP job
#[derive(Debug, Clone, Deserialize)]
pub struct DumpJob {
    pub service: String,

    #[serde(rename = "db")]
    pub table: TableEndpoint,

    #[serde(rename = "filename")]
    pub file_name: PathBuf,

    #[serde(default)]
    pub output: OutputFormat,
}

/// One attribute rename
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RenameRule {
    pub before: String,
    pub after: String,
}

impl RenameRule {
    pub fn new(before: impl Into<String>, after: impl Into<String>) -> Self {
        Self {
            before: before.into(),
            after: after.into(),
        }
    }

    /// Label used in metrics and the final report
    pub fn label(&self) -> String {
        format!("{} -> {}", self.before, self.after)
    }
}

/// A RENAME job
#[derive(Debug, Clone, Deserialize)]
pub struct RenameJob {
    pub service: String,
    pub target: TableEndpoint,

    #[serde(rename = "rename")]
    pub rules: Vec<RenameRule>,
}

/// Tuning knobs shared by all jobs
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Records requested per scan call
    pub scan_page_size: i32,

    /// Operations per batch-write call, at most 25
    pub batch_size: usize,

    /// Page write units allowed in flight at once
    pub max_in_flight: usize,

    /// Batch-write calls per chunk before giving up on its unprocessed operations
    pub max_write_attempts: u32,

    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,

    /// Timeout of a single store call
    pub request_timeout_ms: u64,

    pub progress_interval_ms: u64,

    /// Describe-table polls while waiting for a created table to become active
    pub table_active_polls: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            scan_page_size: 2500,
            batch_size: MAX_BATCH_SIZE,
            max_in_flight: 32,
            max_write_attempts: 10,
            retry_base_delay_ms: 50,
            retry_max_delay_ms: 5_000,
            request_timeout_ms: 30_000,
            progress_interval_ms: 100,
            table_active_polls: 60,
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    /// Batch size clamped to what the store accepts
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.clamp(1, MAX_BATCH_SIZE)
    }

    fn validate(&self) -> Result<()> {
        if self.scan_page_size < 1 {
            return Err(Error::Config("settings.scanPageSize must be positive".into()));
        }
        if self.max_in_flight == 0 {
            return Err(Error::Config("settings.maxInFlight must be positive".into()));
        }
        if self.max_write_attempts == 0 {
            return Err(Error::Config(
                "settings.maxWriteAttempts must be positive".into(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::Config(
                "settings.requestTimeoutMs must be positive".into(),
            ));
        }
        if self.batch_size > MAX_BATCH_SIZE {
            log::warn!(
                "settings.batchSize {} exceeds the store limit, using {}",
                self.batch_size,
                MAX_BATCH_SIZE
            );
        }
        Ok(())
    }
}

/// Everything a job file can hold
///
/// Job entries stay raw YAML until their service is selected, so one malformed entry only
/// fails lookups of that entry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub settings: Settings,
    copy: Vec<Value>,
    dump: Vec<Value>,
    rename: Vec<Value>,
}

fn env_var_regex() -> &'static Regex {
    static ENV_VAR_RE: OnceLock<Regex> = OnceLock::new();
    ENV_VAR_RE.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex")
    })
}

/// Substitute `${VAR_NAME}` patterns with environment variable values
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut missing = Vec::new();

    let result = env_var_regex().replace_all(input, |caps: &regex::Captures<'_>| {
        match std::env::var(&caps[1]) {
            Ok(value) => value,
            Err(_) => {
                missing.push(caps[1].to_string());
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        return Err(Error::Config(format!(
            "missing environment variable(s): {}",
            missing.join(", ")
        )));
    }

    Ok(result.into_owned())
}

impl Config {
    /// Parses a job file's contents
    pub fn from_yaml_str(input: &str) -> Result<Self> {
        let substituted = substitute_env_vars(input)?;
        let config: Config = serde_yaml::from_str(&substituted)?;
        config.settings.validate()?;
        Ok(config)
    }

    /// Reads and parses a job file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("couldn't read the config file {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Finds the job file: the explicit path, else the working directory, else `$HOME`
    pub fn locate(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }

        let mut candidates = vec![PathBuf::from(DEFAULT_CONFIG_FILE)];
        if let Some(home) = std::env::var_os("HOME") {
            candidates.push(PathBuf::from(home).join(DEFAULT_CONFIG_FILE));
        }

        candidates
            .into_iter()
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| {
                Error::Config(format!(
                    "no {} found in the working or home directory",
                    DEFAULT_CONFIG_FILE
                ))
            })
    }

    /// Looks up a COPY job by service name and validates it
    pub fn copy_job(&self, service: &str) -> Result<CopyJob> {
        let job: CopyJob = find_job(&self.copy, "copy", service)?;
        job.origin.validate("copy.origin")?;
        job.target.validate("copy.target")?;
        Ok(job)
    }

    /// Looks up a DUMP job by service name and validates it
    pub fn dump_job(&self, service: &str) -> Result<DumpJob> {
        let job: DumpJob = find_job(&self.dump, "dump", service)?;
        job.table.validate("dump.db")?;
        if job.file_name.as_os_str().is_empty() {
            return Err(Error::Config("dump.filename is required".into()));
        }
        Ok(job)
    }

    /// Looks up a RENAME job by service name and validates it
    pub fn rename_job(&self, service: &str) -> Result<RenameJob> {
        let job: RenameJob = find_job(&self.rename, "rename", service)?;
        job.target.validate("rename.target")?;
        validate_rules(&job.rules)?;
        Ok(job)
    }
}

/// Decodes the first entry of `entries` whose `service` is `service`
fn find_job<T: DeserializeOwned>(entries: &[Value], kind: &str, service: &str) -> Result<T> {
    let entry = entries
        .iter()
        .find(|entry| entry.get("service").and_then(Value::as_str) == Some(service))
        .ok_or_else(|| unknown_service(service))?;

    serde_yaml::from_value(entry.clone())
        .map_err(|e| Error::Config(format!("{} job '{}' is malformed: {}", kind, service, e)))
}

fn unknown_service(service: &str) -> Error {
    Error::Config(format!("'{}' is not a valid service", service))
}

/// Checks that rename rules are well formed on their own
pub fn validate_rules(rules: &[RenameRule]) -> Result<()> {
    if rules.is_empty() {
        return Err(Error::Config("rename: at least one rule is required".into()));
    }

    let mut seen = HashSet::new();
    for rule in rules {
        if rule.before.is_empty() || rule.after.is_empty() {
            return Err(Error::Config(format!(
                "rename: empty attribute name in '{}'",
                rule.label()
            )));
        }
        if rule.before == rule.after {
            return Err(Error::Config(format!(
                "rename: '{}' renames an attribute to itself",
                rule.label()
            )));
        }
        if !seen.insert(rule.before.as_str()) {
            return Err(Error::Config(format!(
                "rename: '{}' is renamed more than once",
                rule.before
            )));
        }
    }
    Ok(())
}
