//! Configuration loading from disk.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_yaml::Value;
use thiserror::Error;

use crate::config::schema::ValidatedConfig;
use crate::config::validation::{validate, ValidationError};

/// Location of the configuration file, relative to the process root.
pub const DEFAULT_CONFIG_PATH: &str = "conf.yaml";

/// Position of a syntax error inside a configuration document (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {}{}: {message}", path.display(), display_position(position))]
    Parse {
        path: PathBuf,
        position: Option<Position>,
        message: String,
    },

    #[error("invalid configuration in {}: {}", path.display(), join_violations(errors))]
    Validation {
        path: PathBuf,
        errors: Vec<ValidationError>,
    },
}

fn display_position(position: &Option<Position>) -> String {
    position.map(|p| format!(":{p}")).unwrap_or_default()
}

fn join_violations(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Untyped configuration tree, exactly as parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct RawConfig {
    source: PathBuf,
    root: Value,
}

impl RawConfig {
    pub fn new(source: impl Into<PathBuf>, root: Value) -> Self {
        Self {
            source: source.into(),
            root,
        }
    }

    /// Parse a YAML document.
    pub fn from_yaml(source: impl Into<PathBuf>, text: &str) -> Result<Self, ConfigError> {
        let source = source.into();
        match serde_yaml::from_str::<Value>(text) {
            Ok(root) => Ok(Self::new(source, root)),
            Err(e) => Err(ConfigError::Parse {
                position: e.location().map(|loc| Position {
                    line: loc.line(),
                    column: loc.column(),
                }),
                message: e.to_string(),
                path: source,
            }),
        }
    }

    /// Parse a TOML document into the same untyped tree.
    pub fn from_toml(source: impl Into<PathBuf>, text: &str) -> Result<Self, ConfigError> {
        let source = source.into();
        match toml::from_str::<Value>(text) {
            Ok(root) => Ok(Self::new(source, root)),
            Err(e) => Err(ConfigError::Parse {
                position: e.span().map(|span| offset_to_position(text, span.start)),
                message: e.message().to_string(),
                path: source,
            }),
        }
    }

    /// Path the document was read from.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Root node of the document.
    pub fn root(&self) -> &Value {
        &self.root
    }
}

fn offset_to_position(text: &str, offset: usize) -> Position {
    let before = &text[..offset.min(text.len())];
    let line = before.matches('\n').count() + 1;
    let column = before
        .rsplit('\n')
        .next()
        .map_or(0, |tail| tail.chars().count())
        + 1;
    Position { line, column }
}

/// Read and parse the configuration file at `path`.
///
/// Files ending in `.toml` are parsed as TOML; everything else as YAML.
pub fn load_config(path: &Path) -> Result<RawConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

    let raw = if is_toml {
        RawConfig::from_toml(path, &content)?
    } else {
        RawConfig::from_yaml(path, &content)?
    };

    tracing::debug!(path = %path.display(), "Configuration document parsed");
    Ok(raw)
}

/// Load and validate configuration in one step.
pub fn load_and_validate(path: &Path) -> Result<ValidatedConfig, ConfigError> {
    let raw = load_config(path)?;
    validate(&raw).map_err(|errors| ConfigError::Validation {
        path: path.to_path_buf(),
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf.yaml");

        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
        assert!(err.to_string().contains("conf.yaml"));
    }

    #[test]
    fn test_yaml_syntax_error_has_position() {
        let err = RawConfig::from_yaml("conf.yaml", "system:\n  host: [unclosed\n").unwrap_err();
        match err {
            ConfigError::Parse { position, .. } => {
                let position = position.expect("yaml errors carry a location");
                assert!(position.line >= 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_toml_syntax_error_has_position() {
        let err = RawConfig::from_toml("conf.toml", "[system]\nhost = \n").unwrap_err();
        match err {
            ConfigError::Parse { position, .. } => {
                assert_eq!(position.map(|p| p.line), Some(2));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_loader_preserves_absent_keys() {
        let raw = RawConfig::from_yaml("conf.yaml", "system:\n  host: localhost\n").unwrap();
        let system = raw.root().get("system").unwrap();
        assert!(system.get("port").is_none());
    }

    #[test]
    fn test_toml_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "[system]\nhost = \"0.0.0.0\"\nport = 12393").unwrap();

        let raw = load_config(&path).unwrap();
        assert_eq!(raw.source(), path.as_path());
        assert_eq!(
            raw.root().get("system").and_then(|s| s.get("port")).and_then(Value::as_u64),
            Some(12393)
        );
    }

    #[test]
    fn test_offset_to_position() {
        let text = "a\nbc\ndef";
        assert_eq!(offset_to_position(text, 0), Position { line: 1, column: 1 });
        assert_eq!(offset_to_position(text, 3), Position { line: 2, column: 2 });
        assert_eq!(offset_to_position(text, 7), Position { line: 3, column: 3 });
    }
}
