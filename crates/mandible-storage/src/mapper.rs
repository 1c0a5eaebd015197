//! Deterministic rewrite from object identity to backend storage key.

use regex::Regex;

use crate::object::StoreObject;
use crate::traits::{StoreError, StoreResult};

const NAME_VAR: &str = "${ImageName}";
const SIZE_VAR: &str = "${ImageSize}";

/// Maps a [`StoreObject`] to the key a backend stores it under.
///
/// The template substitutes `${ImageName}` with the object id and
/// `${ImageSize}` with its size class. When a regex is configured, the
/// substituted template becomes the replacement string of a regex
/// replacement applied against the object id.
#[derive(Debug, Clone)]
pub struct NamePathMapper {
    template: String,
    regex: Option<Regex>,
}

impl NamePathMapper {
    pub fn new(template: impl Into<String>, expr: Option<&str>) -> StoreResult<NamePathMapper> {
        let regex = match expr {
            Some(expr) if !expr.is_empty() => Some(
                Regex::new(expr)
                    .map_err(|e| StoreError::Config(format!("invalid name path regex: {}", e)))?,
            ),
            _ => None,
        };

        Ok(NamePathMapper {
            template: template.into(),
            regex,
        })
    }

    /// The identity layout: objects land under their id, so originals map to
    /// `{hash}` and thumbs to `{hash}/{thumbName}`.
    pub fn identity() -> NamePathMapper {
        NamePathMapper {
            template: NAME_VAR.to_string(),
            regex: None,
        }
    }

    /// Build from the optional config pair; a missing template falls back to
    /// the identity layout.
    pub fn from_config(
        template: Option<&str>,
        expr: Option<&str>,
    ) -> StoreResult<NamePathMapper> {
        match template {
            Some(template) if !template.is_empty() => NamePathMapper::new(template, expr),
            _ => Ok(NamePathMapper::identity()),
        }
    }

    pub fn map_to_path(&self, obj: &StoreObject) -> String {
        let substituted = self
            .template
            .replace(NAME_VAR, &obj.id)
            .replace(SIZE_VAR, &obj.size_class);

        match &self.regex {
            Some(regex) => regex.replace_all(&obj.id, substituted.as_str()).into_owned(),
            None => substituted,
        }
    }
}

impl Default for NamePathMapper {
    fn default() -> Self {
        NamePathMapper::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_name_and_size() {
        let mapper = NamePathMapper::new("${ImageSize}/${ImageName}", None).unwrap();
        let obj = StoreObject::original("abc1234", "image/png");
        assert_eq!(mapper.map_to_path(&obj), "original/abc1234");
    }

    #[test]
    fn identity_keeps_thumb_ids_nested() {
        let mapper = NamePathMapper::identity();
        let obj = StoreObject::thumbnail("abc1234/small", "image/png");
        assert_eq!(mapper.map_to_path(&obj), "abc1234/small");
    }

    #[test]
    fn regex_replacement_runs_against_the_id() {
        // shard ids by their first two characters
        let mapper = NamePathMapper::new("$1/$0", Some("^(..).*$")).unwrap();
        let obj = StoreObject::original("abc1234", "image/png");
        assert_eq!(mapper.map_to_path(&obj), "ab/abc1234");
    }

    #[test]
    fn invalid_regex_is_a_config_error() {
        assert!(matches!(
            NamePathMapper::new("${ImageName}", Some("([")),
            Err(StoreError::Config(_))
        ));
    }
}
