//! Rule-based intent recognition.
//!
//! Recognition scans the utterance for entities, records new ones in the
//! session context, then picks the first tool (in catalog order) whose name
//! words all appear in the utterance, or whose description contains the
//! utterance as a run of whole words. An utterance made only of filler words
//! never matches a description. Recognition and execution never fail: every
//! path ends in an [`Intent`] or a reply string.

use crate::context::{EntityExtractor, SessionContext};
use crate::tool::{ToolDefinition, ToolInvoker, ToolOutcome};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Name reported for intents that do not target a tool.
pub const NO_TOOL: &str = "none";

/// Reply used when no tool matches the utterance.
pub const FALLBACK_REPLY: &str =
    "I'm not sure which action to take for that. Could you rephrase or add more detail?";

/// Schema property that receives the raw utterance.
const TEXT_PARAM: &str = "text";

/// Words too common to select a tool by description on their own.
const FILLER_WORDS: &[&str] = &[
    "a", "an", "the", "of", "to", "for", "and", "or", "in", "on", "is", "it", "up", "back",
];

/// The recognized target of an utterance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    /// Target tool, `None` for the no-tool intent.
    pub tool: Option<String>,
    /// Arguments for the tool.
    pub params: BTreeMap<String, String>,
}

impl Intent {
    /// Creates the no-tool intent.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Creates an intent targeting `tool`.
    #[must_use]
    pub fn tool(tool: impl Into<String>, params: BTreeMap<String, String>) -> Self {
        Self {
            tool: Some(tool.into()),
            params,
        }
    }

    /// Returns the tool name, or [`NO_TOOL`].
    #[must_use]
    pub fn name(&self) -> &str {
        self.tool.as_deref().unwrap_or(NO_TOOL)
    }

    /// Returns whether this intent targets a tool.
    #[must_use]
    pub fn is_tool(&self) -> bool {
        self.tool.is_some()
    }

    /// Merges caller-supplied parameters, overriding recognized ones.
    #[must_use]
    pub fn with_params(mut self, params: &BTreeMap<String, String>) -> Self {
        self.params
            .extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Returns the parameters as a JSON object string.
    #[must_use]
    pub fn arguments_json(&self) -> String {
        let object: serde_json::Map<String, JsonValue> = self
            .params
            .iter()
            .map(|(k, v)| (k.clone(), JsonValue::String(v.clone())))
            .collect();
        JsonValue::Object(object).to_string()
    }
}

/// Builds the user-facing reply for a tool outcome.
#[must_use]
pub fn reply_for_outcome(tool: &str, outcome: &ToolOutcome) -> String {
    if outcome.is_error() {
        format!("Sorry, I couldn't complete \"{tool}\": {}", outcome.error)
    } else {
        outcome.content.clone()
    }
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn contains_run(haystack: &[String], needle: &[String]) -> bool {
    !needle.is_empty()
        && needle.len() <= haystack.len()
        && haystack.windows(needle.len()).any(|window| window == needle)
}

/// Maps utterances to tool invocations.
#[derive(Debug, Clone)]
pub struct IntentRecognizer {
    catalog: Vec<ToolDefinition>,
    extractor: EntityExtractor,
}

impl IntentRecognizer {
    /// Creates a recognizer over a tool catalog.
    #[must_use]
    pub fn new(catalog: Vec<ToolDefinition>) -> Self {
        Self {
            catalog,
            extractor: EntityExtractor,
        }
    }

    /// Returns the first tool matching `text`.
    #[must_use]
    pub fn match_tool(&self, text: &str) -> Option<&ToolDefinition> {
        let query_words = words(text);
        if query_words.is_empty() {
            return None;
        }
        let query_set: HashSet<&str> = query_words.iter().map(String::as_str).collect();
        let has_content_word = query_words
            .iter()
            .any(|w| !FILLER_WORDS.contains(&w.as_str()));

        self.catalog.iter().find(|tool| {
            let name_words = words(&tool.name);
            let by_name =
                !name_words.is_empty() && name_words.iter().all(|w| query_set.contains(w.as_str()));
            by_name || (has_content_word && contains_run(&words(&tool.description), &query_words))
        })
    }

    /// Recognizes the intent of `text`, recording new entities in `context`.
    pub fn recognize_intent(&self, text: &str, context: &mut SessionContext) -> Intent {
        let recorded = self.extractor.apply(text, context);
        if !recorded.is_empty() {
            debug!(keys = ?recorded, "recorded context entities");
        }

        let Some(tool) = self.match_tool(text) else {
            return Intent::none();
        };

        let mut params = BTreeMap::new();
        for property in tool.schema_properties() {
            if let Some(value) = context.get(property) {
                params.insert(property.to_string(), value.to_string());
            } else if property == TEXT_PARAM {
                params.insert(property.to_string(), text.to_string());
            }
        }

        debug!(tool = %tool.name, params = params.len(), "recognized intent");
        Intent::tool(tool.name.clone(), params)
    }

    /// Executes `intent` and returns the reply text.
    #[must_use]
    pub fn execute_tool(&self, intent: &Intent, invoker: &dyn ToolInvoker) -> String {
        let Some(tool) = intent.tool.as_deref() else {
            return FALLBACK_REPLY.to_string();
        };
        let outcome = invoker.call_tool(tool, &intent.arguments_json());
        reply_for_outcome(tool, &outcome)
    }
}
