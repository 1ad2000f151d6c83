//! Session context and entity extraction.
//!
//! A session context maps entity names (`projectId`, `customerId`) to the
//! values discovered in the conversation. Keys are write-once: the first
//! value recorded for a key is kept for the lifetime of the session.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Context key for the project identifier.
pub const PROJECT_ID: &str = "projectId";

/// Context key for the customer identifier.
pub const CUSTOMER_ID: &str = "customerId";

/// Entities extracted from a session's conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionContext(BTreeMap<String, String>);

impl SessionContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `value` under `key` unless the key is already present.
    ///
    /// Returns whether the value was recorded.
    pub fn insert_if_absent(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        if self.0.contains_key(&key) {
            return false;
        }
        self.0.insert(key, value.into());
        true
    }

    /// Returns the value recorded for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns whether `key` has a value.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Iterates over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether the context is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

struct EntityPattern {
    key: &'static str,
    patterns: Vec<Regex>,
}

fn entity_pattern(key: &'static str, noun: &str) -> EntityPattern {
    let id_form = format!(r"(?i)\b{noun}[-_ ]?id[:=]?\s*([A-Za-z0-9][A-Za-z0-9_-]*)");
    let for_form = format!(r"(?i)\bfor\s+{noun}[-:=\s]\s*([A-Za-z0-9][A-Za-z0-9_-]*)");
    EntityPattern {
        key,
        patterns: [id_form, for_form]
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect(),
    }
}

static ENTITY_PATTERNS: LazyLock<Vec<EntityPattern>> = LazyLock::new(|| {
    vec![
        entity_pattern(PROJECT_ID, "project"),
        entity_pattern(CUSTOMER_ID, "customer"),
    ]
});

/// Extracts entity mentions from free text.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntityExtractor;

impl EntityExtractor {
    /// Returns every entity mentioned in `text`, first pattern match per key.
    #[must_use]
    pub fn extract(&self, text: &str) -> Vec<(&'static str, String)> {
        ENTITY_PATTERNS
            .iter()
            .filter_map(|entity| {
                entity
                    .patterns
                    .iter()
                    .find_map(|re| re.captures(text))
                    .and_then(|caps| caps.get(1))
                    .map(|m| (entity.key, m.as_str().trim_end_matches('-').to_string()))
            })
            .filter(|(_, value)| !value.is_empty())
            .collect()
    }

    /// Records entities from `text` into `context`, keeping existing values.
    ///
    /// Returns the keys that were newly recorded.
    pub fn apply(&self, text: &str, context: &mut SessionContext) -> Vec<&'static str> {
        self.extract(text)
            .into_iter()
            .filter_map(|(key, value)| context.insert_if_absent(key, value).then_some(key))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project_of(text: &str) -> Option<String> {
        EntityExtractor
            .extract(text)
            .into_iter()
            .find(|(k, _)| *k == PROJECT_ID)
            .map(|(_, v)| v)
    }

    #[test]
    fn extracts_for_project_form() {
        assert_eq!(
            project_of("Create a voucher for project-abc123").as_deref(),
            Some("abc123")
        );
        assert_eq!(project_of("status for project: p42").as_deref(), Some("p42"));
    }

    #[test]
    fn extracts_project_id_form() {
        assert_eq!(project_of("projectId: alpha-7").as_deref(), Some("alpha-7"));
        assert_eq!(project_of("the project id 99 please").as_deref(), Some("99"));
        assert_eq!(project_of("PROJECT-ID=xyz.").as_deref(), Some("xyz"));
    }

    #[test]
    fn ignores_unqualified_mentions() {
        assert_eq!(project_of("the project is done"), None);
        assert_eq!(project_of("hello"), None);
    }

    #[test]
    fn extracts_customer() {
        let entities = EntityExtractor.extract("voucher for customer C77 for project p1");
        assert!(entities.contains(&(CUSTOMER_ID, "C77".to_string())));
        assert!(entities.contains(&(PROJECT_ID, "p1".to_string())));
    }

    #[test]
    fn context_keys_are_write_once() {
        let mut context = SessionContext::new();
        let recorded = EntityExtractor.apply("for project first", &mut context);
        assert_eq!(recorded, vec![PROJECT_ID]);

        let recorded = EntityExtractor.apply("for project second", &mut context);
        assert!(recorded.is_empty());
        assert_eq!(context.get(PROJECT_ID), Some("first"));
    }

    #[test]
    fn insert_if_absent_reports_outcome() {
        let mut context = SessionContext::new();
        assert!(context.insert_if_absent("k", "v1"));
        assert!(!context.insert_if_absent("k", "v2"));
        assert_eq!(context.get("k"), Some("v1"));
        assert_eq!(context.len(), 1);
    }
}
