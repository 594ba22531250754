//! YAML front matter parsing.
//!
//! A document may open with a block fenced by `---` lines holding a YAML
//! mapping. The block becomes the document's metadata and everything after
//! the closing fence is the body.

use kbsync_core::{AppError, AppResult};
use serde_yaml::Value;
use std::collections::BTreeMap;

/// Fence token that opens and closes a front matter block.
pub const DELIMITER: &str = "---";

/// Key holding the last-modified timestamp.
pub const DATE_KEY: &str = "date";

/// Key holding the validity flag.
pub const VALIDITY_KEY: &str = "isValid";

/// Metadata parsed from a front matter block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentMetadata {
    fields: BTreeMap<String, Value>,
}

impl DocumentMetadata {
    /// Parse the text between the fences.
    pub fn from_yaml(block: &str) -> AppResult<Self> {
        if block.trim().is_empty() {
            return Ok(Self::default());
        }

        let value: Value = serde_yaml::from_str(block)
            .map_err(|e| AppError::FrontMatter(format!("Malformed front matter: {}", e)))?;

        let mapping = match value {
            Value::Null => return Ok(Self::default()),
            Value::Mapping(mapping) => mapping,
            other => {
                return Err(AppError::FrontMatter(format!(
                    "Front matter must be a mapping, found {}",
                    kind_of(&other)
                )))
            }
        };

        let mut fields = BTreeMap::new();
        for (key, value) in mapping {
            let key = scalar_to_string(&key).ok_or_else(|| {
                AppError::FrontMatter(format!(
                    "Front matter keys must be scalars, found {}",
                    kind_of(&key)
                ))
            })?;
            fields.insert(key, value);
        }

        Ok(Self { fields })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Scalar value rendered as a string, if the key holds a scalar.
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.fields.get(key).and_then(scalar_to_string)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Whether the validity flag marks the document as invalid.
    ///
    /// Absent flags mean valid. `false`, `0`, `"false"`, `"0"` and `"no"`
    /// mean invalid.
    pub fn is_marked_invalid(&self) -> bool {
        match self.fields.get(VALIDITY_KEY) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(flag)) => !flag,
            Some(Value::Number(n)) => n.as_f64() == Some(0.0),
            Some(Value::String(s)) => {
                matches!(s.trim().to_lowercase().as_str(), "false" | "0" | "no")
            }
            Some(_) => false,
        }
    }

    /// Re-serialize the metadata as a JSON object for the index.
    ///
    /// Scalars keep their original values; strings are never coerced.
    pub fn to_index_metadata(&self) -> AppResult<serde_json::Map<String, serde_json::Value>> {
        let mut map = serde_json::Map::with_capacity(self.fields.len());
        for (key, value) in &self.fields {
            map.insert(key.clone(), serde_json::to_value(value)?);
        }
        Ok(map)
    }
}

/// Split a document into `(metadata, body)`.
///
/// Returns `None` metadata and the untouched text when the document does not
/// open with a fenced block.
pub fn parse_front_matter(text: &str) -> AppResult<(Option<DocumentMetadata>, &str)> {
    if !text.starts_with(DELIMITER) {
        return Ok((None, text));
    }

    let parts: Vec<&str> = text.splitn(3, DELIMITER).collect();
    if parts.len() < 3 {
        return Ok((None, text));
    }

    let metadata = DocumentMetadata::from_yaml(parts[1])?;
    Ok((Some(metadata), parts[2]))
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOG_POST: &str = "---
category: ''
title: 'My Blog Post'
date: '2023-05-23T14:57:07.322Z'
author: 'John Doe'
isValid: 1
---

Here's the content of the blog post.";

    #[test]
    fn test_parse_full_front_matter() {
        let (metadata, body) = parse_front_matter(BLOG_POST).unwrap();
        let metadata = metadata.unwrap();

        assert_eq!(metadata.len(), 5);
        assert_eq!(metadata.get_str("title").unwrap(), "My Blog Post");
        assert_eq!(metadata.get_str("date").unwrap(), "2023-05-23T14:57:07.322Z");
        assert_eq!(metadata.get_str("author").unwrap(), "John Doe");
        assert_eq!(metadata.get_str("category").unwrap(), "");
        assert_eq!(metadata.get_str("isValid").unwrap(), "1");
        assert_eq!(body, "\n\nHere's the content of the blog post.");
    }

    #[test]
    fn test_no_front_matter_returns_text_unmodified() {
        let text = "# Title\n\nJust a body.\n---\nwith a rule";
        let (metadata, body) = parse_front_matter(text).unwrap();
        assert!(metadata.is_none());
        assert_eq!(body, text);
    }

    #[test]
    fn test_unclosed_block_is_not_metadata() {
        let text = "---\ntitle: dangling\n";
        let (metadata, body) = parse_front_matter(text).unwrap();
        assert!(metadata.is_none());
        assert_eq!(body, text);
    }

    #[test]
    fn test_malformed_yaml_is_an_error() {
        let text = "---\ntitle: [unclosed\n---\nbody";
        let result = parse_front_matter(text);
        assert!(matches!(result, Err(AppError::FrontMatter(_))));
    }

    #[test]
    fn test_non_mapping_block_is_an_error() {
        let text = "---\n- one\n- two\n---\nbody";
        let result = parse_front_matter(text);
        assert!(matches!(result, Err(AppError::FrontMatter(_))));
    }

    #[test]
    fn test_empty_block_is_empty_metadata() {
        let (metadata, body) = parse_front_matter("---\n---\nbody").unwrap();
        assert!(metadata.unwrap().is_empty());
        assert_eq!(body, "\nbody");
    }

    #[test]
    fn test_body_keeps_later_delimiters() {
        let text = "---\ntitle: t\n---\nintro\n---\noutro";
        let (_, body) = parse_front_matter(text).unwrap();
        assert_eq!(body, "\nintro\n---\noutro");
    }

    #[test]
    fn test_index_metadata_preserves_scalars() {
        let text = "---
title: '007'
description: \"Leading zeros and: colons\"
date: '2023-05-23T14:57:07.322Z'
github: https://github.com/example/repo
link: ''
isValid: 1
---
body";
        let (metadata, _) = parse_front_matter(text).unwrap();
        let map = metadata.unwrap().to_index_metadata().unwrap();

        assert_eq!(map["title"], serde_json::json!("007"));
        assert_eq!(map["description"], serde_json::json!("Leading zeros and: colons"));
        assert_eq!(map["date"], serde_json::json!("2023-05-23T14:57:07.322Z"));
        assert_eq!(map["github"], serde_json::json!("https://github.com/example/repo"));
        assert_eq!(map["link"], serde_json::json!(""));
        assert_eq!(map["isValid"], serde_json::json!(1));
    }

    #[test]
    fn test_validity_flag() {
        let parse = |flag: &str| {
            DocumentMetadata::from_yaml(&format!("isValid: {}", flag))
                .unwrap()
                .is_marked_invalid()
        };

        assert!(!DocumentMetadata::default().is_marked_invalid());
        assert!(!parse("1"));
        assert!(!parse("true"));
        assert!(parse("0"));
        assert!(parse("false"));
        assert!(parse("'false'"));
        assert!(parse("'no'"));
    }
}
