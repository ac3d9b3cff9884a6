//! Local editing of a chatbot's intents and flows.
//!
//! Edits only touch the `Chatbot` value; push them with
//! `Sarufi::update_bot(bot.id, &bot.to_update())`.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::{ApiError, LoadError};
use crate::types::{Chatbot, Flow, Flows, Intents, UpdateBotRequest};

impl Chatbot {
    /// Replace all intents with the JSON object in `json`.
    pub fn set_intents_json(&mut self, json: &str) -> Result<(), serde_json::Error> {
        self.intents = serde_json::from_str(json)?;
        Ok(())
    }

    /// Replace all flows with the JSON object in `json`.
    pub fn set_flows_json(&mut self, json: &str) -> Result<(), serde_json::Error> {
        self.flows = serde_json::from_str(json)?;
        Ok(())
    }

    /// Add an intent, replacing any existing intent with the same name.
    pub fn add_intent(&mut self, name: impl Into<String>, examples: Vec<String>) {
        self.intents.insert(name.into(), examples);
    }

    pub fn remove_intent(&mut self, name: &str) -> Option<Vec<String>> {
        self.intents.remove(name)
    }

    /// Add a flow node, replacing any existing node with the same name.
    pub fn add_flow(&mut self, node: impl Into<String>, flow: Flow) {
        self.flows.insert(node.into(), flow);
    }

    pub fn remove_flow(&mut self, node: &str) -> Option<Flow> {
        self.flows.remove(node)
    }

    pub fn to_update(&self) -> UpdateBotRequest {
        UpdateBotRequest {
            name: self.name.clone(),
            description: self.description.clone(),
            intents: self.intents.clone(),
            flows: self.flows.clone(),
            industry: self.industry.clone(),
            visible_on_community: self.visible_on_community,
            webhook_url: self.webhook_url.clone(),
            webhook_trigger_intents: self.webhook_trigger_intents.clone(),
        }
    }
}

/// Read intents from a JSON file.
pub fn load_intents(path: impl AsRef<Path>) -> Result<Intents, ApiError> {
    load_json("load intents", path.as_ref())
}

/// Read flows from a JSON file.
pub fn load_flows(path: impl AsRef<Path>) -> Result<Flows, ApiError> {
    load_json("load flows", path.as_ref())
}

fn load_json<T: DeserializeOwned>(operation: &'static str, path: &Path) -> Result<T, ApiError> {
    let load = || -> Result<T, LoadError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    };
    load().map_err(|source| ApiError::Load {
        operation,
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn bot() -> Chatbot {
        Chatbot {
            id: 1,
            name: "pizza".into(),
            ..Default::default()
        }
    }

    #[test]
    fn set_intents_replaces_everything() {
        let mut bot = bot();
        bot.add_intent("old", vec!["x".into()]);
        bot.set_intents_json(r#"{"greets": ["hi", "hello"], "goodbye": ["bye"]}"#)
            .unwrap();
        assert_eq!(bot.intents.len(), 2);
        assert!(!bot.intents.contains_key("old"));
    }

    #[test]
    fn invalid_intents_json_leaves_bot_untouched() {
        let mut bot = bot();
        bot.add_intent("greets", vec!["hi".into()]);
        assert!(bot.set_intents_json("[1, 2]").is_err());
        assert_eq!(bot.intents["greets"], vec!["hi"]);
    }

    #[test]
    fn add_and_remove_flow() {
        let mut bot = bot();
        bot.add_flow("greets", Flow::message(vec!["Hi!".into()], "end"));
        assert_eq!(bot.flows["greets"].next_state(), Some("end"));
        assert!(bot.remove_flow("greets").is_some());
        assert!(bot.remove_flow("greets").is_none());
    }

    #[test]
    fn to_update_carries_current_definition() {
        let mut bot = bot();
        bot.add_intent("greets", vec!["hi".into()]);
        bot.webhook_url = Some("https://example.com/hook".into());
        let update = bot.to_update();
        assert_eq!(update.name, "pizza");
        assert_eq!(update.intents["greets"], vec!["hi"]);
        assert_eq!(update.webhook_url.as_deref(), Some("https://example.com/hook"));
    }

    #[test]
    fn load_intents_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"order_pizza": ["I need pizza", "I want pizza"]}}"#).unwrap();
        let intents = load_intents(file.path()).unwrap();
        assert_eq!(intents["order_pizza"].len(), 2);
    }

    #[test]
    fn load_flows_reports_operation_and_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = load_flows(file.path()).unwrap_err();
        assert_eq!(err.operation(), "load flows");
        assert!(matches!(err, ApiError::Load { source: LoadError::Json(_), .. }));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = load_intents("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ApiError::Load { source: LoadError::Io(_), .. }));
    }
}
