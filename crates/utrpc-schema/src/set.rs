use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use utrpc_wire::Validator;

use crate::config::ValidationConfig;
use crate::error::{Result, SchemaError};
use crate::schema::JsonSchema;

/// Which side of a method contract a schema validates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bound {
    In,
    Out,
}

/// Method-keyed collection of compiled schemas.
///
/// File naming: `<method>.in.schema.json` validates a method's input,
/// `<method>.out.schema.json` its output. Built once when the router is
/// assembled; lookups hand out shared validator handles.
#[derive(Default)]
pub struct SchemaSet {
    schemas: HashMap<(String, Bound), Arc<JsonSchema>>,
}

impl SchemaSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a compiled schema for a method bound.
    pub fn insert(&mut self, method: &str, bound: Bound, schema: JsonSchema) {
        self.schemas
            .insert((method.to_string(), bound), Arc::new(schema));
    }

    /// Input validator for a method, if one is registered.
    pub fn input(&self, method: &str) -> Option<Arc<dyn Validator>> {
        self.get(method, Bound::In)
    }

    /// Output validator for a method, if one is registered.
    pub fn output(&self, method: &str) -> Option<Arc<dyn Validator>> {
        self.get(method, Bound::Out)
    }

    fn get(&self, method: &str, bound: Bound) -> Option<Arc<dyn Validator>> {
        self.schemas
            .get(&(method.to_string(), bound))
            .map(|schema| Arc::clone(schema) as Arc<dyn Validator>)
    }

    /// Methods that have at least one registered schema, sorted.
    pub fn methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self
            .schemas
            .keys()
            .map(|(method, _)| method.clone())
            .collect();
        methods.sort_unstable();
        methods.dedup();
        methods
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Load schemas from a directory with default configuration.
    pub fn from_directory(path: &Path) -> Result<Self> {
        Self::from_directory_with_config(path, ValidationConfig::default())
    }

    /// Load schemas from a directory.
    ///
    /// Only regular files matching the naming pattern are accepted; a
    /// `.schema.json` file whose name does not parse is an error, symlinks
    /// to schema files are refused, and the configured size and count
    /// limits apply.
    pub fn from_directory_with_config(path: &Path, config: ValidationConfig) -> Result<Self> {
        let mut set = Self::new();
        let mut loaded = 0usize;

        let entries = std::fs::read_dir(path)
            .map_err(|err| SchemaError::LoadFailed(format!("{}: {err}", path.display())))?;

        for entry in entries {
            let entry = entry.map_err(|err| SchemaError::LoadFailed(err.to_string()))?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            let is_schema_file = file_name.ends_with(".schema.json");

            let entry_path = entry.path();
            let metadata = std::fs::symlink_metadata(&entry_path)
                .map_err(|err| SchemaError::LoadFailed(err.to_string()))?;

            if metadata.file_type().is_symlink() {
                if is_schema_file {
                    return Err(SchemaError::LoadFailed(format!(
                        "refusing to load schema symlink: {file_name}"
                    )));
                }
                continue;
            }
            if !metadata.file_type().is_file() {
                continue;
            }
            if !is_schema_file {
                continue;
            }

            let (method, bound) = match parse_schema_file_name(&file_name) {
                Some(parsed) => parsed,
                None => {
                    return Err(SchemaError::LoadFailed(format!(
                        "unrecognized schema filename: {file_name}"
                    )));
                }
            };

            loaded += 1;
            if loaded > config.max_schemas_from_directory {
                return Err(SchemaError::LoadFailed(format!(
                    "schema count exceeds configured max ({})",
                    config.max_schemas_from_directory
                )));
            }
            if metadata.len() > config.max_schema_file_size as u64 {
                return Err(SchemaError::LoadFailed(format!(
                    "schema file too large ({} bytes): {file_name}",
                    metadata.len()
                )));
            }

            let file = std::fs::File::open(&entry_path).map_err(|err| {
                SchemaError::LoadFailed(format!("failed opening {}: {err}", entry_path.display()))
            })?;
            let mut content = String::new();
            file.take(config.max_schema_file_size as u64 + 1)
                .read_to_string(&mut content)
                .map_err(|err| {
                    SchemaError::LoadFailed(format!(
                        "failed reading {}: {err}",
                        entry_path.display()
                    ))
                })?;
            if content.len() > config.max_schema_file_size {
                return Err(SchemaError::LoadFailed(format!(
                    "schema file too large while reading: {file_name}"
                )));
            }

            let schema = JsonSchema::parse_with(&content, &config)?;
            tracing::debug!(method = %method, ?bound, "loaded schema");
            set.insert(&method, bound, schema);
        }

        Ok(set)
    }
}

impl std::fmt::Debug for SchemaSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaSet")
            .field("schemas", &self.schemas.len())
            .finish()
    }
}

fn parse_schema_file_name(file_name: &str) -> Option<(String, Bound)> {
    let stem = file_name.strip_suffix(".schema.json")?;
    if let Some(method) = stem.strip_suffix(".in") {
        if !method.is_empty() {
            return Some((method.to_string(), Bound::In));
        }
    }
    if let Some(method) = stem.strip_suffix(".out") {
        if !method.is_empty() {
            return Some((method.to_string(), Bound::Out));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use serde_json::json;

    use super::*;

    const OBJECT_SCHEMA: &str = r#"{
        "type": "object",
        "properties": { "x": { "type": "integer" } },
        "required": ["x"]
    }"#;

    fn make_temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "utrpc-schema-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_schema(dir: &Path, file_name: &str, contents: &str) {
        std::fs::write(dir.join(file_name), contents.as_bytes()).unwrap();
    }

    #[test]
    fn parses_method_and_bound_from_file_name() {
        assert_eq!(
            parse_schema_file_name("echo.in.schema.json"),
            Some(("echo".to_string(), Bound::In))
        );
        assert_eq!(
            parse_schema_file_name("lobby.out.schema.json"),
            Some(("lobby".to_string(), Bound::Out))
        );
        assert_eq!(parse_schema_file_name("echo.schema.json"), None);
        assert_eq!(parse_schema_file_name(".in.schema.json"), None);
        assert_eq!(parse_schema_file_name("echo.in.json"), None);
    }

    #[test]
    fn loads_and_validates_from_directory() {
        let dir = make_temp_dir("load");
        write_schema(&dir, "echo.in.schema.json", OBJECT_SCHEMA);
        write_schema(
            &dir,
            "echo.out.schema.json",
            r#"{"type": "array", "items": {"type": "integer"}}"#,
        );

        let set = SchemaSet::from_directory(&dir).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.methods(), vec!["echo"]);

        let input = set.input("echo").unwrap();
        assert!(input.validate(&json!({"x": 1})).is_ok());
        assert!(input.validate(&json!({"x": "no"})).is_err());

        let output = set.output("echo").unwrap();
        assert!(output.validate(&json!([1, 2])).is_ok());

        assert!(set.input("ghost").is_none());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn ignores_files_without_schema_extension() {
        let dir = make_temp_dir("ignore");
        write_schema(&dir, "echo.in.schema.json", OBJECT_SCHEMA);
        write_schema(&dir, "notes.json", OBJECT_SCHEMA);
        write_schema(&dir, "README.md", "hello");

        let set = SchemaSet::from_directory(&dir).unwrap();
        assert_eq!(set.len(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn unrecognized_schema_name_errors() {
        let dir = make_temp_dir("badname");
        write_schema(&dir, "echo.schema.json", OBJECT_SCHEMA);

        assert!(matches!(
            SchemaSet::from_directory(&dir),
            Err(SchemaError::LoadFailed(_))
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn file_size_limit_is_enforced() {
        let dir = make_temp_dir("size");
        write_schema(&dir, "echo.in.schema.json", OBJECT_SCHEMA);

        let config = ValidationConfig {
            max_schema_file_size: 8,
            ..ValidationConfig::default()
        };
        assert!(matches!(
            SchemaSet::from_directory_with_config(&dir, config),
            Err(SchemaError::LoadFailed(_))
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn schema_count_limit_is_enforced() {
        let dir = make_temp_dir("count");
        write_schema(&dir, "a.in.schema.json", OBJECT_SCHEMA);
        write_schema(&dir, "b.in.schema.json", OBJECT_SCHEMA);

        let config = ValidationConfig {
            max_schemas_from_directory: 1,
            ..ValidationConfig::default()
        };
        assert!(matches!(
            SchemaSet::from_directory_with_config(&dir, config),
            Err(SchemaError::LoadFailed(_))
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_schema_is_rejected() {
        let dir = make_temp_dir("symlink");
        let target = dir.join("target.json");
        std::fs::write(&target, OBJECT_SCHEMA.as_bytes()).unwrap();
        std::os::unix::fs::symlink(&target, dir.join("echo.in.schema.json")).unwrap();

        assert!(matches!(
            SchemaSet::from_directory(&dir),
            Err(SchemaError::LoadFailed(_))
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
