//! Request and response bodies exchanged with the Sarufi platform.
//!
//! # Design
//! Field names follow the platform's JSON contract. Fields the platform only
//! sometimes returns are `Option` and skipped when absent, so a decoded
//! `Chatbot` serializes back to the same document. Maps use `BTreeMap` to
//! keep output stable.

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterResponse {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub token: String,
}

/// Exchange an API key pair for a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenRequest {
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

/// The authenticated user's account. Fields beyond the common ones are kept
/// in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Intent name to example utterances.
pub type Intents = BTreeMap<String, Vec<String>>;

/// Node name to flow node.
pub type Flows = BTreeMap<String, Flow>;

/// A node that sends messages and moves the chat to `next_state`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFlow {
    #[serde(default)]
    pub message: Vec<String>,
    pub next_state: String,
}

/// A conversation node.
///
/// Nodes carrying `next_state` decode as `Message`; anything else (branching
/// nodes such as `{"1": "confirm", "2": "cancel", "fallback_message": [..]}`)
/// is kept as a free-form `Choice` map.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Flow {
    Message(MessageFlow),
    Choice(serde_json::Map<String, serde_json::Value>),
}

impl Flow {
    pub fn message(message: Vec<String>, next_state: impl Into<String>) -> Self {
        Flow::Message(MessageFlow {
            message,
            next_state: next_state.into(),
        })
    }

    pub fn next_state(&self) -> Option<&str> {
        match self {
            Flow::Message(flow) => Some(&flow.next_state),
            Flow::Choice(_) => None,
        }
    }

    /// The state a choice node moves to for `option`.
    pub fn choice_target(&self, option: &str) -> Option<&str> {
        match self {
            Flow::Choice(choices) => choices.get(option).and_then(|v| v.as_str()),
            Flow::Message(_) => None,
        }
    }
}

impl<'de> Deserialize<'de> for Flow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let node = serde_json::Map::<String, serde_json::Value>::deserialize(deserializer)?;
        if node.contains_key("next_state") {
            serde_json::from_value(serde_json::Value::Object(node))
                .map(Flow::Message)
                .map_err(D::Error::custom)
        } else {
            Ok(Flow::Choice(node))
        }
    }
}

/// Request body for creating a chatbot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateBotRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub intents: Intents,
    #[serde(default)]
    pub flows: Flows,
    #[serde(default)]
    pub industry: String,
    #[serde(default)]
    pub visible_on_community: bool,
}

/// Request body for replacing a chatbot's definition. The id travels in the
/// URL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateBotRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub intents: Intents,
    #[serde(default)]
    pub flows: Flows,
    #[serde(default)]
    pub industry: String,
    #[serde(default)]
    pub visible_on_community: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_trigger_intents: Option<Vec<String>>,
}

/// A chatbot as returned by the platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chatbot {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub industry: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default)]
    pub visible_on_community: bool,
    #[serde(default)]
    pub intents: Intents,
    #[serde(default)]
    pub flows: Flows,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_trigger_intents: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_metrics: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Channel a conversation turn is sent through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    #[default]
    General,
    Whatsapp,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::General => "general",
            Channel::Whatsapp => "whatsapp",
        }
    }
}

impl std::str::FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "general" => Ok(Channel::General),
            "whatsapp" => Ok(Channel::Whatsapp),
            other => Err(format!("unknown channel: {other}")),
        }
    }
}

/// One conversation turn sent to a bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRequest {
    pub chat_id: String,
    pub bot_id: i64,
    pub message: String,
    #[serde(default = "default_message_type")]
    pub message_type: String,
    #[serde(default)]
    pub channel: Channel,
    /// Reply language, when the bot supports more than one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

fn default_message_type() -> String {
    "text".to_string()
}

impl ConversationRequest {
    /// A text message on the general channel. An empty `chat_id` is replaced
    /// with a fresh one when the message is sent.
    pub fn text(bot_id: i64, chat_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            bot_id,
            message: message.into(),
            message_type: default_message_type(),
            channel: Channel::General,
            language: None,
        }
    }
}

/// A single message in a bot reply: plain text, or a structured payload
/// such as a WhatsApp interactive message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Rich(serde_json::Map<String, serde_json::Value>),
}

impl MessageContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(text) => Some(text),
            MessageContent::Rich(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationResponse {
    #[serde(default)]
    pub message: Vec<MessageContent>,
    #[serde(default)]
    pub memory: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub next_state: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationStatusRequest {
    pub chat_id: String,
    pub bot_id: i64,
}

/// Where a chat currently sits in the bot's flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_state: Option<String>,
    #[serde(default)]
    pub memory: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictRequest {
    pub message: String,
    pub bot_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub status: bool,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatUser {
    pub chat_id: String,
    #[serde(default)]
    pub received_time: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryResponse {
    #[serde(default)]
    pub send_message: Vec<String>,
}

/// One stored message of a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub message: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub response: Vec<HistoryResponse>,
    #[serde(default)]
    pub received_time: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const CREATE_BOT_RESPONSE: &str = r#"{
        "intents": {
            "version": ["What is go version", "Is go 2 out", "Is this stable"],
            "maintainer": ["who wrote this code", "who is a maintainer", "I want to contribute"]
        },
        "user_id": 74,
        "user_name": "jane",
        "description": "PUT DESCRIPTION HERE",
        "industry": "general",
        "created_at": "2022-11-23T16:44:38.633418",
        "name": "go-sdk-bot",
        "flows": {
            "version": {
                "message": ["the current version is 1.19", "run go version in cmd"],
                "next_state": "end"
            },
            "maintainer": {"message": ["see our github repository"], "next_state": "end"}
        },
        "id": 139,
        "model_name": "models/42faa73dcef83f9c89f4c8e2c45aa015.pkl",
        "visible_on_community": true,
        "updated_at": "2022-11-23T16:44:38.633430"
    }"#;

    #[test]
    fn chatbot_response_roundtrips_without_loss() {
        let original: serde_json::Value = serde_json::from_str(CREATE_BOT_RESPONSE).unwrap();
        let bot: Chatbot = serde_json::from_str(CREATE_BOT_RESPONSE).unwrap();
        assert_eq!(bot.id, 139);
        assert_eq!(bot.user_id, Some(74));
        assert_eq!(bot.user_name.as_deref(), Some("jane"));
        assert_eq!(bot.flows["version"].next_state(), Some("end"));
        assert_eq!(serde_json::to_value(&bot).unwrap(), original);
    }

    #[test]
    fn create_request_serializes_contract_fields() {
        let bot: Chatbot = serde_json::from_str(CREATE_BOT_RESPONSE).unwrap();
        let request = CreateBotRequest {
            name: bot.name.clone(),
            description: bot.description.clone(),
            intents: bot.intents.clone(),
            flows: bot.flows.clone(),
            industry: bot.industry.clone(),
            visible_on_community: bot.visible_on_community,
        };
        let json = serde_json::to_value(&request).unwrap();
        let original: serde_json::Value = serde_json::from_str(CREATE_BOT_RESPONSE).unwrap();
        for field in ["name", "description", "intents", "flows", "industry", "visible_on_community"] {
            assert_eq!(json[field], original[field], "{field}");
        }
    }

    #[test]
    fn choice_nodes_decode_as_choice() {
        let flows: Flows = serde_json::from_str(
            r#"{
                "confirm_order": {"message": ["Confirm? 1 yes, 2 no"], "next_state": "choice_order"},
                "choice_order": {"1": "order_confirmed", "2": "order_cancelled", "fallback_message": ["Pick 1 or 2"]}
            }"#,
        )
        .unwrap();
        assert!(matches!(flows["confirm_order"], Flow::Message(_)));
        assert_eq!(flows["choice_order"].choice_target("1"), Some("order_confirmed"));
        assert_eq!(flows["choice_order"].choice_target("fallback_message"), None);
        assert_eq!(flows["choice_order"].next_state(), None);
    }

    #[test]
    fn message_node_with_bad_shape_is_rejected() {
        let result: Result<Flow, _> = serde_json::from_str(r#"{"message": "not a list", "next_state": "end"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn channel_serializes_lowercase() {
        let request = ConversationRequest {
            channel: Channel::Whatsapp,
            ..ConversationRequest::text(1, "chat", "hi")
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["channel"], "whatsapp");
        assert_eq!(json["message_type"], "text");
        assert_eq!("WhatsApp".parse::<Channel>().unwrap(), Channel::Whatsapp);
        assert!("sms".parse::<Channel>().is_err());
    }

    #[test]
    fn language_is_sent_only_when_set() {
        let mut request = ConversationRequest::text(1, "chat", "habari");
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("language").is_none());

        request.language = Some("swahili".into());
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["language"], "swahili");

        let decoded: ConversationRequest = serde_json::from_value(json).unwrap();
        assert_eq!(decoded.language.as_deref(), Some("swahili"));
    }

    #[test]
    fn conversation_response_mixes_text_and_rich_messages() {
        let response: ConversationResponse = serde_json::from_str(
            r#"{"message": ["Hi", {"type": "button", "body": "Pick"}], "memory": {"greets": "hello"}, "next_state": "menu"}"#,
        )
        .unwrap();
        assert_eq!(response.message[0].as_text(), Some("Hi"));
        assert!(matches!(response.message[1], MessageContent::Rich(_)));
        assert_eq!(response.memory["greets"], "hello");
    }

    #[test]
    fn profile_keeps_unknown_fields() {
        let profile: Profile =
            serde_json::from_str(r#"{"id": 7, "username": "jane", "plan": "free"}"#).unwrap();
        assert_eq!(profile.id, Some(7));
        assert_eq!(profile.extra["plan"], "free");
    }
}
