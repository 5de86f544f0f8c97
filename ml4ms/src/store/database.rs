use crate::codec::{self, CollectionFormat, FileType};
use crate::config::DatabaseConfig;
use crate::document::Collection;
use crate::error::{Ml4msError, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Recognized collection file patterns, in load order. YAML is loaded last
/// and wins when a directory holds both `x.json` and `x.yaml`.
const COLLECTION_PATTERNS: [&str; 3] = ["*.json", "*.yaml", "*.yml"];

/// One loaded physical database: its descriptor, its collections, and the
/// format each collection was read from.
#[derive(Debug, Clone)]
pub struct Database {
    config: DatabaseConfig,
    collections: BTreeMap<String, Collection>,
    formats: HashMap<String, CollectionFormat>,
}

impl Database {
    /// An empty database for `config`, nothing read from disk.
    pub fn new(config: DatabaseConfig) -> Self {
        Database {
            config,
            collections: BTreeMap::new(),
            formats: HashMap::new(),
        }
    }

    /// Scan the database directory and load every included collection file.
    pub fn load(config: &DatabaseConfig) -> Result<Self> {
        if !config.local {
            return Err(Ml4msError::Unsupported(format!(
                "remote database '{}' at {}",
                config.name, config.url
            )));
        }

        let dir = config.location();
        if !dir.is_dir() {
            return Err(Ml4msError::Config(format!(
                "Do not know how to load this kind of database: {} ({})",
                config.name,
                dir.display()
            )));
        }

        let mut db = Database::new(config.clone());
        for file in collection_files(&dir)? {
            let Some(name) = file.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            if !config.includes(&name) {
                log::debug!("Skipping excluded collection {}", file.display());
                continue;
            }

            let format = CollectionFormat::of_path(&file)?;
            log::debug!("Loading {}", file.display());
            let collection = codec::load_collection_as(&file, format.file_type)?;

            if db.collections.contains_key(&name) {
                log::warn!(
                    "Collection '{name}' defined twice in database '{}'; using {}",
                    config.name,
                    file.display()
                );
            }
            db.collections.insert(name.clone(), collection);
            db.formats.insert(name, format);
        }

        log::info!(
            "Loaded database '{}' from {}: {} collection(s)",
            config.name,
            dir.display(),
            db.collections.len()
        );
        Ok(db)
    }

    /// Write every collection back in the format it was loaded with.
    /// Collections created in memory are written as JSON.
    pub fn dump(&self) -> Result<Vec<PathBuf>> {
        let base = crate::config::expand_home(&self.config.url);
        if !base.exists() {
            return Err(Ml4msError::Config(format!(
                "Do not know how to dump this kind of database: {} ({})",
                self.config.name,
                base.display()
            )));
        }

        let dir = self.config.location();
        std::fs::create_dir_all(&dir)?;

        let mut written = Vec::new();
        for (name, collection) in &self.collections {
            let format = self.format_of(name);
            let path = dir.join(format.file_name(name));
            log::debug!("Dumping {} ({})", path.display(), format.file_type);
            codec::dump_collection_as(&path, collection, format.file_type)?;
            written.push(path);
        }

        log::info!(
            "Dumped database '{}': {} collection(s)",
            self.config.name,
            written.len()
        );
        Ok(written)
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn collection(&self, name: &str) -> Option<&Collection> {
        self.collections.get(name)
    }

    pub fn collection_names(&self) -> impl Iterator<Item = &String> {
        self.collections.keys()
    }

    pub fn collections(&self) -> impl Iterator<Item = (&String, &Collection)> {
        self.collections.iter()
    }

    /// Format recorded at load time, JSON for collections created since.
    pub fn format_of(&self, name: &str) -> CollectionFormat {
        self.formats
            .get(name)
            .cloned()
            .unwrap_or_else(|| CollectionFormat::new(FileType::Json))
    }

    pub(crate) fn collection_mut(&mut self, name: &str) -> Option<&mut Collection> {
        self.collections.get_mut(name)
    }

    /// Mutable access to a collection, creating it when missing. The flag
    /// tells whether it was created.
    pub(crate) fn collection_entry(&mut self, name: &str) -> (&mut Collection, bool) {
        let created = !self.collections.contains_key(name);
        let collection = self.collections.entry(name.to_string()).or_default();
        (collection, created)
    }
}

/// Collection files directly inside `dir`, JSON first, each group sorted.
fn collection_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let base = glob::Pattern::escape(&dir.to_string_lossy());
    let mut files = Vec::new();
    for ext_pattern in COLLECTION_PATTERNS {
        let pattern = format!("{base}/{ext_pattern}");
        let mut group: Vec<PathBuf> = glob::glob(&pattern)
            .map_err(|e| Ml4msError::Config(format!("Glob error: {e}")))?
            .filter_map(|r| r.ok())
            .filter(|p| p.is_file())
            .collect();
        group.sort();
        files.extend(group);
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_for(tmp: &TempDir) -> DatabaseConfig {
        DatabaseConfig::new("local", tmp.path().to_str().unwrap())
    }

    #[test]
    fn test_load_records_formats() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("people.json"), r#"{"a": {"name": "A"}}"#).unwrap();
        std::fs::write(tmp.path().join("materials.yml"), "mp-1:\n  formula: Si\n").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();

        let db = Database::load(&config_for(&tmp)).unwrap();
        let names: Vec<_> = db.collection_names().cloned().collect();
        assert_eq!(names, vec!["materials", "people"]);
        assert_eq!(db.format_of("people").file_type, FileType::Json);
        assert_eq!(db.format_of("materials").file_name("materials"), "materials.yml");
        assert_eq!(db.format_of("new").file_type, FileType::Json);
    }

    #[test]
    fn test_yaml_wins_over_json() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("x.json"), r#"{"a": {"from": "json"}}"#).unwrap();
        std::fs::write(tmp.path().join("x.yaml"), "a:\n  from: yaml\n").unwrap();

        let db = Database::load(&config_for(&tmp)).unwrap();
        let doc = db.collection("x").unwrap().get("a").unwrap();
        assert_eq!(doc.get("from").and_then(|v| v.as_str()), Some("yaml"));
        assert_eq!(db.format_of("x").file_type, FileType::Yaml);
    }

    #[test]
    fn test_whitelist_and_blacklist() {
        let tmp = TempDir::new().unwrap();
        for name in ["a", "b", "c"] {
            std::fs::write(tmp.path().join(format!("{name}.json")), "{}").unwrap();
        }

        let mut config = config_for(&tmp);
        config.blacklist = vec!["b".into()];
        let db = Database::load(&config).unwrap();
        assert_eq!(db.collection_names().cloned().collect::<Vec<_>>(), vec!["a", "c"]);

        config.whitelist = vec!["b".into()];
        let db = Database::load(&config).unwrap();
        assert_eq!(db.collection_names().cloned().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn test_missing_directory_is_config_error() {
        let config = DatabaseConfig::new("gone", "/definitely/not/here");
        assert!(matches!(Database::load(&config), Err(Ml4msError::Config(_))));
    }

    #[test]
    fn test_remote_database_unsupported() {
        let mut config = DatabaseConfig::new("remote", "mongodb://localhost");
        config.local = false;
        assert!(matches!(
            Database::load(&config),
            Err(Ml4msError::Unsupported(_))
        ));
    }

    #[test]
    fn test_dump_writes_back_same_files() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("materials.yml"), "mp-1:\n  formula: Si\n").unwrap();

        let mut db = Database::load(&config_for(&tmp)).unwrap();
        let (created, is_new) = db.collection_entry("fresh");
        assert!(is_new);
        created.insert("z", crate::document::Document::with_id("z"));

        let mut written = db.dump().unwrap();
        written.sort();
        assert_eq!(
            written,
            vec![tmp.path().join("fresh.json"), tmp.path().join("materials.yml")]
        );

        let reloaded = Database::load(&config_for(&tmp)).unwrap();
        assert_eq!(reloaded.collection("materials"), db.collection("materials"));
        assert_eq!(reloaded.collection("fresh"), db.collection("fresh"));
    }
}
