//! Typed setting lookup for a single configuration section.
//!
//! # Responsibilities
//! - Read typed values (string, list, bool, int) with defaults
//! - Enforce required settings
//! - Resolve and validate file-path settings against the config directory

use std::path::{Path, PathBuf};

use crate::config::loader::ConfigError;

/// A value type that can be read from a configuration section.
pub trait SettingValue: Sized {
    /// Convert a raw TOML value, returning a description of the mismatch on failure.
    fn from_toml(value: &toml::Value) -> Result<Self, String>;

    /// Whether the value counts as "not set" for required settings.
    fn is_blank(&self) -> bool {
        false
    }
}

impl SettingValue for String {
    fn from_toml(value: &toml::Value) -> Result<Self, String> {
        match value {
            toml::Value::String(s) => Ok(s.trim().to_string()),
            toml::Value::Integer(i) => Ok(i.to_string()),
            other => Err(format!("expected a string, found {}", other.type_str())),
        }
    }

    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl SettingValue for Vec<String> {
    fn from_toml(value: &toml::Value) -> Result<Self, String> {
        match value {
            toml::Value::String(s) => Ok(s
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()),
            toml::Value::Array(items) => {
                let mut list = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        toml::Value::String(s) if !s.trim().is_empty() => {
                            list.push(s.trim().to_string())
                        }
                        toml::Value::String(_) => {}
                        other => {
                            return Err(format!(
                                "expected a list of strings, found {} item",
                                other.type_str()
                            ))
                        }
                    }
                }
                Ok(list)
            }
            other => Err(format!("expected a list, found {}", other.type_str())),
        }
    }

    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl SettingValue for bool {
    fn from_toml(value: &toml::Value) -> Result<Self, String> {
        match value {
            toml::Value::Boolean(b) => Ok(*b),
            toml::Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "yes" | "true" | "on" => Ok(true),
                "0" | "no" | "false" | "off" => Ok(false),
                _ => Err(format!("not a boolean: {}", s)),
            },
            other => Err(format!("expected a boolean, found {}", other.type_str())),
        }
    }
}

impl SettingValue for i64 {
    fn from_toml(value: &toml::Value) -> Result<Self, String> {
        match value {
            toml::Value::Integer(i) => Ok(*i),
            toml::Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|e| format!("invalid integer '{}': {}", s, e)),
            other => Err(format!("expected an integer, found {}", other.type_str())),
        }
    }
}

impl SettingValue for u16 {
    fn from_toml(value: &toml::Value) -> Result<Self, String> {
        let raw = i64::from_toml(value)?;
        u16::try_from(raw).map_err(|_| format!("{} is out of range for a port", raw))
    }
}

impl SettingValue for u64 {
    fn from_toml(value: &toml::Value) -> Result<Self, String> {
        let raw = i64::from_toml(value)?;
        u64::try_from(raw).map_err(|_| format!("{} must not be negative", raw))
    }
}

/// Resolves settings from one named section of a parsed configuration file.
pub struct SettingResolver<'a> {
    section_name: &'a str,
    section: Option<&'a toml::Table>,
    base_dir: &'a Path,
}

impl<'a> SettingResolver<'a> {
    /// Create a resolver for `section_name` within `document`.
    ///
    /// Relative file paths are resolved against `base_dir`.
    pub fn new(document: &'a toml::Table, section_name: &'a str, base_dir: &'a Path) -> Self {
        let section = document.get(section_name).and_then(toml::Value::as_table);
        Self {
            section_name,
            section,
            base_dir,
        }
    }

    /// Name of the section this resolver reads.
    pub fn section_name(&self) -> &str {
        self.section_name
    }

    fn raw(&self, name: &str) -> Option<&'a toml::Value> {
        self.section.and_then(|table| table.get(name))
    }

    fn convert<T: SettingValue>(&self, name: &str, value: &toml::Value) -> Result<T, ConfigError> {
        T::from_toml(value).map_err(|reason| ConfigError::UnexpectedValue {
            setting: name.to_string(),
            section: self.section_name.to_string(),
            reason,
        })
    }

    /// Read a setting that may be absent.
    pub fn optional<T: SettingValue>(&self, name: &str) -> Result<Option<T>, ConfigError> {
        self.raw(name)
            .map(|value| self.convert(name, value))
            .transpose()
    }

    /// Read a setting, falling back to `default` when absent.
    pub fn with_default<T: SettingValue>(&self, name: &str, default: T) -> Result<T, ConfigError> {
        Ok(self.optional(name)?.unwrap_or(default))
    }

    /// Read a setting that must be present and non-empty.
    pub fn required<T: SettingValue>(&self, name: &str) -> Result<T, ConfigError> {
        let value: T = self
            .optional(name)?
            .ok_or_else(|| ConfigError::MissingSetting {
                setting: name.to_string(),
                section: self.section_name.to_string(),
            })?;

        if value.is_blank() {
            return Err(ConfigError::EmptySetting {
                setting: name.to_string(),
                section: self.section_name.to_string(),
            });
        }
        Ok(value)
    }

    /// Read an optional file-path setting.
    ///
    /// An empty value counts as unset. A set value must name an existing file.
    pub fn file_path(&self, name: &str) -> Result<Option<PathBuf>, ConfigError> {
        let value = match self.optional::<String>(name)? {
            Some(value) if !value.is_empty() => value,
            _ => return Ok(None),
        };

        let path = self.base_dir.join(&value);
        if !path.is_file() {
            return Err(ConfigError::FileNotFound {
                setting: name.to_string(),
                section: self.section_name.to_string(),
                path,
            });
        }
        Ok(Some(path))
    }
}
