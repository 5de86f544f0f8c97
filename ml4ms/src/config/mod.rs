// Run control - which databases to open and how configuration layers combine.
// Each layer is an RcPatch whose fields are all optional; an absent field
// leaves the current value alone. RcUpdaters decides how a present field is
// combined with the current one.

use crate::error::{Ml4msError, Result};
use crate::schema::update_schemas;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the run control file looked up in the working directory.
pub const RC_FILE_NAME: &str = "ml4msrc.json";

/// Descriptor of one physical database: a directory of collection files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_true")]
    pub local: bool,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub whitelist: Vec<String>,
    #[serde(default)]
    pub blacklist: Vec<String>,
}

fn default_path() -> String {
    ".".to_string()
}

fn default_true() -> bool {
    true
}

impl DatabaseConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        DatabaseConfig {
            name: name.into(),
            url: url.into(),
            path: default_path(),
            local: true,
            public: false,
            whitelist: Vec::new(),
            blacklist: Vec::new(),
        }
    }

    /// Directory holding this database's collection files (`url / path`).
    pub fn location(&self) -> PathBuf {
        expand_home(&self.url).join(&self.path)
    }

    /// Whether collection `name` is loaded from this database. A non-empty
    /// whitelist takes precedence over the blacklist.
    pub fn includes(&self, name: &str) -> bool {
        if !self.whitelist.is_empty() {
            return self.whitelist.iter().any(|w| w == name);
        }
        !self.blacklist.iter().any(|b| b == name)
    }
}

/// Backend that serves the databases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    #[default]
    Fs,
    #[serde(alias = "mongodb")]
    Mongo,
}

/// Combines the current value of a field with a newly specified one.
pub type Updater<T> = fn(T, T) -> T;

/// Per-field update strategies, fixed when the run control is built.
#[derive(Clone, Copy)]
pub struct RcUpdaters {
    pub databases: Updater<Vec<DatabaseConfig>>,
    pub schemas: Updater<serde_json::Value>,
}

fn replace<T>(_current: T, new: T) -> T {
    new
}

impl Default for RcUpdaters {
    fn default() -> Self {
        RcUpdaters {
            databases: replace,
            schemas: |current, user| update_schemas(&current, &user),
        }
    }
}

impl std::fmt::Debug for RcUpdaters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RcUpdaters").finish_non_exhaustive()
    }
}

/// One configuration layer. `None` means "not specified".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RcPatch {
    #[serde(default)]
    pub databases: Option<Vec<DatabaseConfig>>,
    #[serde(default)]
    pub client: Option<ClientKind>,
    #[serde(default)]
    pub schemas: Option<serde_json::Value>,
    #[serde(default)]
    pub user_config: Option<PathBuf>,
}

/// The assembled configuration.
#[derive(Debug, Clone)]
pub struct RunControl {
    /// Databases in priority order; the first one is the primary.
    pub databases: Vec<DatabaseConfig>,
    pub client: ClientKind,
    /// User schema overrides, deep-merged over the bundled defaults.
    pub schemas: serde_json::Value,
    pub user_config: PathBuf,
    updaters: RcUpdaters,
}

impl Default for RunControl {
    fn default() -> Self {
        RunControl {
            databases: Vec::new(),
            client: ClientKind::Fs,
            schemas: serde_json::Value::Object(serde_json::Map::new()),
            user_config: expand_home("~/.config/ml4ms/user.json"),
            updaters: RcUpdaters::default(),
        }
    }
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_updaters(mut self, updaters: RcUpdaters) -> Self {
        self.updaters = updaters;
        self
    }

    /// Apply one configuration layer.
    pub fn update(&mut self, patch: RcPatch) {
        if let Some(databases) = patch.databases {
            let current = std::mem::take(&mut self.databases);
            self.databases = (self.updaters.databases)(current, databases);
        }
        if let Some(schemas) = patch.schemas {
            let current = std::mem::take(&mut self.schemas);
            self.schemas = (self.updaters.schemas)(current, schemas);
        }
        if let Some(client) = patch.client {
            self.client = client;
        }
        if let Some(user_config) = patch.user_config {
            self.user_config = user_config;
        }
    }

    /// Defaults, then the user config file, then `rc_file` (or
    /// [`RC_FILE_NAME`] in the working directory). Missing files are skipped
    /// unless named explicitly.
    pub fn load_layered(rc_file: Option<&Path>) -> Result<Self> {
        let mut rc = RunControl::new();

        if rc.user_config.exists() {
            let patch = load_rcfile(&rc.user_config)?;
            rc.update(patch);
        }

        match rc_file {
            Some(path) => rc.update(load_rcfile(path)?),
            None => {
                let local = Path::new(RC_FILE_NAME);
                if local.exists() {
                    rc.update(load_rcfile(local)?);
                }
            }
        }

        log::debug!("Run control: {} database(s)", rc.databases.len());
        Ok(rc)
    }

    pub fn primary_database(&self) -> Option<&DatabaseConfig> {
        self.databases.first()
    }
}

/// Load a run control file. JSON and YAML are recognized by extension.
pub fn load_rcfile(path: &Path) -> Result<RcPatch> {
    let content = std::fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Ok(serde_json::from_str(&content)?),
        Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&content)?),
        _ => Err(Ml4msError::Config(format!(
            "could not determine run control file type from extension: {}",
            path.display()
        ))),
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => return PathBuf::from(path),
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => PathBuf::from(path),
    }
}
