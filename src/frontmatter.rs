//! Pluggable header (frontmatter) codecs.
//!
//! Header values are represented uniformly as [`serde_json::Value`] regardless
//! of source syntax, the way the teacher's config layer normalizes TOML file
//! config and environment overrides into one `Config` shape before anything
//! downstream has to care where a value came from.

use crate::error::{FolioError, Result};
use indexmap::IndexMap;
use serde_json::Value;

/// Header syntax recognized by the fenced-delimiter rule in spec.md §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderSyntax {
    Yaml,
    Toml,
}

impl HeaderSyntax {
    pub fn delimiter(self) -> &'static str {
        match self {
            HeaderSyntax::Yaml => "---",
            HeaderSyntax::Toml => "+++",
        }
    }
}

/// A parsed/serializable mapping header, preserving insertion order.
pub type Header = IndexMap<String, Value>;

/// Adapter contract for (de)serializing a header mapping to/from one syntax.
///
/// Callers may substitute their own implementation (a different YAML
/// engine, a schema-aware TOML writer, …); [`YamlFrontmatter`] and
/// [`TomlFrontmatter`] are the defaults shipped with the crate.
pub trait FrontmatterAdapter: Send + Sync {
    fn syntax(&self) -> HeaderSyntax;
    fn parse(&self, text: &str) -> Result<Header>;
    /// `sorted` requests lexicographic key order; otherwise insertion order is kept.
    fn serialize(&self, header: &Header, sorted: bool) -> Result<String>;
}

/// Default YAML header codec.
pub struct YamlFrontmatter;

impl FrontmatterAdapter for YamlFrontmatter {
    fn syntax(&self) -> HeaderSyntax {
        HeaderSyntax::Yaml
    }

    fn parse(&self, text: &str) -> Result<Header> {
        if text.trim().is_empty() {
            return Ok(Header::new());
        }
        let value: Value = serde_yaml::from_str(text)
            .map_err(|e| FolioError::parse_failed(0, format!("invalid yaml header: {e}")))?;
        value_to_header(value)
    }

    fn serialize(&self, header: &Header, sorted: bool) -> Result<String> {
        let value = header_to_value(header, sorted);
        serde_yaml::to_string(&value)
            .map_err(|e| FolioError::internal(format!("failed to serialize yaml header: {e}")))
    }
}

/// Default TOML header codec.
pub struct TomlFrontmatter;

impl FrontmatterAdapter for TomlFrontmatter {
    fn syntax(&self) -> HeaderSyntax {
        HeaderSyntax::Toml
    }

    fn parse(&self, text: &str) -> Result<Header> {
        if text.trim().is_empty() {
            return Ok(Header::new());
        }
        let value: Value = toml::from_str(text)
            .map_err(|e| FolioError::parse_failed(0, format!("invalid toml header: {e}")))?;
        value_to_header(value)
    }

    fn serialize(&self, header: &Header, sorted: bool) -> Result<String> {
        let value = header_to_value(header, sorted);
        toml::to_string(&value)
            .map_err(|e| FolioError::internal(format!("failed to serialize toml header: {e}")))
    }
}

fn value_to_header(value: Value) -> Result<Header> {
    match value {
        Value::Object(map) => Ok(map.into_iter().collect()),
        Value::Null => Ok(Header::new()),
        _ => Err(FolioError::parse_failed(
            0,
            "header must be a mapping".to_string(),
        )),
    }
}

fn header_to_value(header: &Header, sorted: bool) -> Value {
    if sorted {
        let mut entries: Vec<_> = header.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        Value::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    } else {
        Value::Object(header.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

/// Registry resolving a [`HeaderSyntax`] to its adapter.
pub struct FrontmatterRegistry {
    yaml: Box<dyn FrontmatterAdapter>,
    toml: Box<dyn FrontmatterAdapter>,
}

impl Default for FrontmatterRegistry {
    fn default() -> Self {
        Self {
            yaml: Box::new(YamlFrontmatter),
            toml: Box::new(TomlFrontmatter),
        }
    }
}

impl FrontmatterRegistry {
    /// Build a registry with caller-supplied adapters for either syntax.
    pub fn with_adapters(
        yaml: Box<dyn FrontmatterAdapter>,
        toml: Box<dyn FrontmatterAdapter>,
    ) -> Self {
        Self { yaml, toml }
    }

    pub fn adapter(&self, syntax: HeaderSyntax) -> &dyn FrontmatterAdapter {
        match syntax {
            HeaderSyntax::Yaml => self.yaml.as_ref(),
            HeaderSyntax::Toml => self.toml.as_ref(),
        }
    }
}
