//! Configuration validation.
//!
//! # Responsibilities
//! - Turn the untyped [`RawConfig`] tree into a [`ValidatedConfig`]
//! - Check presence, types and value ranges of known fields
//! - Reject unknown keys inside known sections
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Pure function: RawConfig → Result<ValidatedConfig, Vec<ValidationError>>
//! - No coercion: `"8000"` is a string, not a port

use std::collections::BTreeMap;
use std::fmt;

use serde_yaml::Value;

use crate::config::loader::RawConfig;
use crate::config::schema::{ServerConfig, ValidatedConfig, DEFAULT_CONFIG_ALTS_DIR};

const SYSTEM: &str = "system";
const CHARACTER: &str = "character";

/// Why a field was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    /// Required field is absent.
    Missing,
    /// Field is present with the wrong type.
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
    /// Field has the right type but an unacceptable value.
    InvalidValue { detail: String },
    /// Field is not part of the schema.
    UnknownField,
}

impl Reason {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Reason::Missing => "missing",
            Reason::TypeMismatch { .. } => "type_mismatch",
            Reason::InvalidValue { .. } => "invalid_value",
            Reason::UnknownField => "unknown_field",
        }
    }
}

/// A single schema violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field (e.g., `system.port`).
    pub field: String,
    pub reason: Reason,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason.code())?;
        match &self.reason {
            Reason::TypeMismatch { expected, actual } => {
                write!(f, " (expected {expected}, found {actual})")
            }
            Reason::InvalidValue { detail } => write!(f, " ({detail})"),
            Reason::Missing | Reason::UnknownField => Ok(()),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Name of a YAML node's type as shown in diagnostics.
fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

#[derive(Default)]
struct Violations(Vec<ValidationError>);

impl Violations {
    fn push(&mut self, field: impl Into<String>, reason: Reason) {
        self.0.push(ValidationError {
            field: field.into(),
            reason,
        });
    }

    fn missing(&mut self, field: impl Into<String>) {
        self.push(field, Reason::Missing);
    }

    fn mismatch(&mut self, field: impl Into<String>, expected: &'static str, found: &Value) {
        self.push(
            field,
            Reason::TypeMismatch {
                expected,
                actual: kind_of(found),
            },
        );
    }

    fn invalid(&mut self, field: impl Into<String>, detail: impl Into<String>) {
        self.push(
            field,
            Reason::InvalidValue {
                detail: detail.into(),
            },
        );
    }

    fn string(&mut self, field: &str, value: &Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s.clone()),
            other => {
                self.mismatch(field, "string", other);
                None
            }
        }
    }
}

/// Validate a raw configuration tree against the schema.
pub fn validate(raw: &RawConfig) -> Result<ValidatedConfig, Vec<ValidationError>> {
    let mut violations = Violations::default();

    let root = match raw.root() {
        Value::Mapping(map) => map,
        // An empty document has no sections at all.
        Value::Null => {
            violations.missing(SYSTEM);
            return Err(violations.0);
        }
        other => {
            violations.mismatch("<root>", "mapping", other);
            return Err(violations.0);
        }
    };

    let mut system = None;
    let mut system_seen = false;
    let mut sections = BTreeMap::new();

    for (key, value) in root {
        let Some(name) = key.as_str() else {
            violations.invalid(
                format!("<root>.{}", scalar_repr(key)),
                "section names must be strings",
            );
            continue;
        };

        match name {
            SYSTEM => {
                system_seen = true;
                system = validate_system(value, &mut violations);
            }
            CHARACTER => {
                if !value.is_mapping() {
                    violations.mismatch(CHARACTER, "mapping", value);
                }
                sections.insert(name.to_string(), value.clone());
            }
            _ => {
                sections.insert(name.to_string(), value.clone());
            }
        }
    }

    if !system_seen {
        violations.missing(SYSTEM);
    }

    match system {
        Some(system) if violations.0.is_empty() => Ok(ValidatedConfig { system, sections }),
        _ => Err(violations.0),
    }
}

fn validate_system(value: &Value, violations: &mut Violations) -> Option<ServerConfig> {
    let Value::Mapping(map) = value else {
        violations.mismatch(SYSTEM, "mapping", value);
        return None;
    };

    let before = violations.0.len();
    let mut host = None;
    let mut port = None;
    let mut conf_version = None;
    let mut config_alts_dir = None;
    let mut tool_prompts = BTreeMap::new();

    for (key, value) in map {
        let Some(name) = key.as_str() else {
            violations.invalid(
                format!("{SYSTEM}.{}", scalar_repr(key)),
                "field names must be strings",
            );
            continue;
        };
        let field = format!("{SYSTEM}.{name}");

        match name {
            "host" => {
                host = violations.string(&field, value).and_then(|h| {
                    if h.trim().is_empty() {
                        violations.invalid(&field, "must not be empty");
                        None
                    } else {
                        Some(h)
                    }
                });
            }
            "port" => port = validate_port(&field, value, violations),
            "conf_version" => conf_version = violations.string(&field, value),
            "config_alts_dir" => config_alts_dir = violations.string(&field, value),
            "tool_prompts" => {
                if let Some(prompts) = validate_prompts(&field, value, violations) {
                    tool_prompts = prompts;
                }
            }
            _ => violations.push(field, Reason::UnknownField),
        }
    }

    if !map.contains_key("host") {
        violations.missing(format!("{SYSTEM}.host"));
    }
    if !map.contains_key("port") {
        violations.missing(format!("{SYSTEM}.port"));
    }

    if violations.0.len() != before {
        return None;
    }

    Some(ServerConfig {
        host: host?,
        port: port?,
        conf_version,
        config_alts_dir: config_alts_dir.unwrap_or_else(|| DEFAULT_CONFIG_ALTS_DIR.to_string()),
        tool_prompts,
    })
}

fn validate_port(field: &str, value: &Value, violations: &mut Violations) -> Option<u16> {
    let Value::Number(n) = value else {
        violations.mismatch(field, "integer", value);
        return None;
    };

    let parsed = if let Some(i) = n.as_i64() {
        u16::try_from(i).ok().filter(|p| *p != 0)
    } else if n.is_u64() {
        // Above i64::MAX, certainly out of range.
        None
    } else {
        violations.mismatch(field, "integer", value);
        return None;
    };

    if parsed.is_none() {
        violations.invalid(field, format!("must be between 1 and 65535, got {n}"));
    }
    parsed
}

fn validate_prompts(
    field: &str,
    value: &Value,
    violations: &mut Violations,
) -> Option<BTreeMap<String, String>> {
    let Value::Mapping(map) = value else {
        violations.mismatch(field, "mapping", value);
        return None;
    };

    let mut prompts = BTreeMap::new();
    for (key, prompt) in map {
        let name = scalar_repr(key);
        if let Some(text) = violations.string(&format!("{field}.{name}"), prompt) {
            prompts.insert(name, text);
        }
    }
    Some(prompts)
}

fn scalar_repr(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => format!("<{}>", kind_of(other)),
    }
}
