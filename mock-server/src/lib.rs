//! In-memory stand-in for the Sarufi platform.
//!
//! Serves the same routes and status-code contract as the real service:
//! 422 validation lists for malformed input, 400 for bad credentials, 401 for
//! missing or unknown bearer tokens, 404 for unknown bots or chats and 409 for
//! duplicate usernames. Conversations match the incoming message against the
//! bot's intent examples and walk its flows.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};
use uuid::Uuid;

const FALLBACK_MESSAGE: &str = "Sorry, I did not get that.";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Bot {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub industry: String,
    pub user_id: i64,
    pub visible_on_community: bool,
    pub intents: BTreeMap<String, Vec<String>>,
    pub flows: Map<String, Value>,
    pub model_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_trigger_intents: Option<Vec<String>>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct KeyPair {
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Deserialize)]
pub struct BotInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub industry: String,
    #[serde(default)]
    pub visible_on_community: bool,
    #[serde(default)]
    pub intents: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub flows: Map<String, Value>,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub webhook_trigger_intents: Option<Vec<String>>,
}

#[derive(Deserialize)]
pub struct Turn {
    pub chat_id: String,
    pub bot_id: i64,
    pub message: String,
}

#[derive(Deserialize)]
pub struct ChatRef {
    pub chat_id: String,
    pub bot_id: i64,
}

#[derive(Deserialize)]
pub struct PredictInput {
    pub message: String,
    pub bot_id: i64,
}

struct User {
    id: i64,
    password: String,
    api_key: String,
    api_secret: String,
}

#[derive(Default)]
struct Chat {
    current_state: Option<String>,
    next_state: Option<String>,
    memory: Map<String, Value>,
    history: Vec<Value>,
    started_at: String,
}

/// Everything the platform remembers.
#[derive(Default)]
pub struct Platform {
    users: HashMap<String, User>,
    tokens: HashMap<String, String>,
    bots: BTreeMap<i64, Bot>,
    chats: BTreeMap<(i64, String), Chat>,
    next_user_id: i64,
    next_bot_id: i64,
    next_message_id: i64,
}

pub type Db = Arc<RwLock<Platform>>;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Platform::default()));
    Router::new()
        .route("/users/register", post(register))
        .route("/users/login", post(login))
        .route("/api/access_token", post(access_token))
        .route("/api/profile", get(profile))
        .route("/chatbot", post(create_bot))
        .route("/chatbots", get(list_bots))
        .route("/chatbot/{id}", get(get_bot).put(update_bot).delete(delete_bot))
        .route("/chatbot/{id}/users", get(chat_users))
        .route("/conversation/", post(converse))
        .route("/conversation/whatsapp", post(converse_whatsapp))
        .route("/conversation/status", post(conversation_status))
        .route("/conversation/history/{bot_id}/{chat_id}", get(history))
        .route("/predict/intent", post(predict))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "mock platform listening");
    }
    axum::serve(listener, app()).await
}

/// An error response in one of the platform's JSON shapes.
#[derive(Debug)]
pub struct Failure {
    status: StatusCode,
    body: Value,
}

impl Failure {
    fn validation(loc: &[&str], msg: &str, kind: &str) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            body: json!({"detail": [{"loc": loc, "msg": msg, "type": kind}]}),
        }
    }

    fn bad_request(detail: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: json!({"detail": detail}),
        }
    }

    fn unauthorized(message: &str) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            body: json!({"message": message}),
        }
    }

    fn not_found(message: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: json!({"message": message}),
        }
    }

    fn conflict(loc: &[&str], msg: &str) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            body: json!({"detail": {"loc": loc, "msg": msg, "type": "value_error.conflict"}}),
        }
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        debug!(status = %self.status, body = %self.body, "request failed");
        (self.status, Json(self.body)).into_response()
    }
}

impl From<JsonRejection> for Failure {
    fn from(rejection: JsonRejection) -> Self {
        Failure::validation(&["body"], &rejection.body_text(), "value_error.jsondecode")
    }
}

impl From<PathRejection> for Failure {
    fn from(rejection: PathRejection) -> Self {
        Failure::validation(&["path"], &rejection.body_text(), "type_error")
    }
}

type Reply = Result<Response, Failure>;

fn now() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
        .to_string()
}

fn require_field(name: &str, value: &str) -> Result<(), Failure> {
    if value.trim().is_empty() {
        return Err(Failure::validation(&["body", name], "field required", "value_error.missing"));
    }
    Ok(())
}

impl Platform {
    /// Resolve the bearer token in `headers` to a user id.
    fn caller(&self, headers: &HeaderMap) -> Result<i64, Failure> {
        let token = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| Failure::unauthorized("Not authenticated"))?;
        self.tokens
            .get(token)
            .and_then(|username| self.users.get(username))
            .map(|user| user.id)
            .ok_or_else(|| Failure::unauthorized("Invalid token"))
    }

    fn issue_token(&mut self, username: &str) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.tokens.insert(token.clone(), username.to_string());
        token
    }

    fn owned_bot(&self, owner: i64, id: i64) -> Result<&Bot, Failure> {
        self.bots
            .get(&id)
            .filter(|bot| bot.user_id == owner)
            .ok_or_else(|| Failure::not_found("bot not found"))
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

async fn register(
    State(db): State<Db>,
    input: Result<Json<Credentials>, JsonRejection>,
) -> Reply {
    let Json(input) = input?;
    require_field("username", &input.username)?;
    require_field("password", &input.password)?;

    let mut platform = db.write().await;
    if platform.users.contains_key(&input.username) {
        return Err(Failure::conflict(&["body", "username"], "username already exists"));
    }
    platform.next_user_id += 1;
    let user = User {
        id: platform.next_user_id,
        password: input.password,
        api_key: Uuid::new_v4().simple().to_string(),
        api_secret: Uuid::new_v4().simple().to_string(),
    };
    platform.users.insert(input.username, user);
    Ok(Json(json!({"message": "User registered successfully"})).into_response())
}

async fn login(State(db): State<Db>, input: Result<Json<Credentials>, JsonRejection>) -> Reply {
    let Json(input) = input?;
    require_field("username", &input.username)?;
    require_field("password", &input.password)?;

    let mut platform = db.write().await;
    match platform.users.get(&input.username) {
        Some(user) if user.password == input.password => {}
        _ => return Err(Failure::bad_request("Invalid username or password")),
    }
    let token = platform.issue_token(&input.username);
    Ok(Json(json!({"message": "Login successful", "token": token})).into_response())
}

async fn access_token(State(db): State<Db>, input: Result<Json<KeyPair>, JsonRejection>) -> Reply {
    let Json(input) = input?;
    let mut platform = db.write().await;
    let username = platform
        .users
        .iter()
        .find(|(_, user)| user.api_key == input.api_key && user.api_secret == input.api_secret)
        .map(|(name, _)| name.clone())
        .ok_or_else(|| Failure::unauthorized("Invalid API key or secret"))?;
    let token = platform.issue_token(&username);
    Ok(Json(json!({"access_token": token, "token_type": "bearer", "expires_in": 3600})).into_response())
}

async fn profile(State(db): State<Db>, headers: HeaderMap) -> Reply {
    let platform = db.read().await;
    let id = platform.caller(&headers)?;
    let (username, user) = platform
        .users
        .iter()
        .find(|(_, user)| user.id == id)
        .ok_or_else(|| Failure::not_found("user not found"))?;
    Ok(Json(json!({
        "id": user.id,
        "username": username,
        "api_key": user.api_key,
        "api_secret": user.api_secret,
    }))
    .into_response())
}

// ---------------------------------------------------------------------------
// Chatbots
// ---------------------------------------------------------------------------

async fn create_bot(
    State(db): State<Db>,
    headers: HeaderMap,
    input: Result<Json<BotInput>, JsonRejection>,
) -> Reply {
    let mut platform = db.write().await;
    let owner = platform.caller(&headers)?;
    let Json(input) = input?;
    require_field("name", &input.name)?;

    platform.next_bot_id += 1;
    let id = platform.next_bot_id;
    let stamp = now();
    let bot = Bot {
        id,
        name: input.name,
        description: input.description,
        industry: input.industry,
        user_id: owner,
        visible_on_community: input.visible_on_community,
        intents: input.intents,
        flows: input.flows,
        model_name: format!("models/{}.pkl", Uuid::new_v4().simple()),
        webhook_url: input.webhook_url,
        webhook_trigger_intents: input.webhook_trigger_intents,
        created_at: stamp.clone(),
        updated_at: stamp,
    };
    platform.bots.insert(id, bot.clone());
    Ok((StatusCode::CREATED, Json(bot)).into_response())
}

async fn list_bots(State(db): State<Db>, headers: HeaderMap) -> Reply {
    let platform = db.read().await;
    let owner = platform.caller(&headers)?;
    let bots: Vec<&Bot> = platform.bots.values().filter(|bot| bot.user_id == owner).collect();
    Ok(Json(bots).into_response())
}

async fn get_bot(
    State(db): State<Db>,
    headers: HeaderMap,
    id: Result<Path<i64>, PathRejection>,
) -> Reply {
    let platform = db.read().await;
    let owner = platform.caller(&headers)?;
    let Path(id) = id?;
    Ok(Json(platform.owned_bot(owner, id)?).into_response())
}

async fn update_bot(
    State(db): State<Db>,
    headers: HeaderMap,
    id: Result<Path<i64>, PathRejection>,
    input: Result<Json<BotInput>, JsonRejection>,
) -> Reply {
    let mut platform = db.write().await;
    let owner = platform.caller(&headers)?;
    let Path(id) = id?;
    platform.owned_bot(owner, id)?;
    let Json(input) = input?;
    require_field("name", &input.name)?;

    let bot = platform
        .bots
        .get_mut(&id)
        .ok_or_else(|| Failure::not_found("bot not found"))?;
    bot.name = input.name;
    bot.description = input.description;
    bot.industry = input.industry;
    bot.visible_on_community = input.visible_on_community;
    bot.intents = input.intents;
    bot.flows = input.flows;
    bot.webhook_url = input.webhook_url;
    bot.webhook_trigger_intents = input.webhook_trigger_intents;
    bot.updated_at = now();
    Ok(Json(bot.clone()).into_response())
}

async fn delete_bot(
    State(db): State<Db>,
    headers: HeaderMap,
    id: Result<Path<i64>, PathRejection>,
) -> Reply {
    let mut platform = db.write().await;
    let owner = platform.caller(&headers)?;
    let Path(id) = id?;
    platform.owned_bot(owner, id)?;
    platform.bots.remove(&id);
    platform.chats.retain(|(bot_id, _), _| *bot_id != id);
    Ok(Json(json!({"message": "Chatbot deleted successfully"})).into_response())
}

async fn chat_users(
    State(db): State<Db>,
    headers: HeaderMap,
    id: Result<Path<i64>, PathRejection>,
) -> Reply {
    let platform = db.read().await;
    let owner = platform.caller(&headers)?;
    let Path(id) = id?;
    platform.owned_bot(owner, id)?;
    let users: Vec<Value> = platform
        .chats
        .iter()
        .filter(|((bot_id, _), _)| *bot_id == id)
        .map(|((_, chat_id), chat)| json!({"chat_id": chat_id, "received_time": chat.started_at}))
        .collect();
    Ok(Json(users).into_response())
}

// ---------------------------------------------------------------------------
// Conversations
// ---------------------------------------------------------------------------

async fn converse(
    State(db): State<Db>,
    headers: HeaderMap,
    input: Result<Json<Turn>, JsonRejection>,
) -> Reply {
    turn(db, headers, input, false).await
}

async fn converse_whatsapp(
    State(db): State<Db>,
    headers: HeaderMap,
    input: Result<Json<Turn>, JsonRejection>,
) -> Reply {
    turn(db, headers, input, true).await
}

async fn turn(
    db: Db,
    headers: HeaderMap,
    input: Result<Json<Turn>, JsonRejection>,
    whatsapp: bool,
) -> Reply {
    let mut platform = db.write().await;
    let owner = platform.caller(&headers)?;
    let Json(input) = input?;
    require_field("chat_id", &input.chat_id)?;
    require_field("message", &input.message)?;
    let bot = platform.owned_bot(owner, input.bot_id)?.clone();

    platform.next_message_id += 1;
    let message_id = platform.next_message_id;
    let chat = platform
        .chats
        .entry((bot.id, input.chat_id.clone()))
        .or_insert_with(|| Chat {
            started_at: now(),
            ..Chat::default()
        });

    let (node, messages, next_state) = respond(&bot, chat, &input.message);
    if let Some(node) = &node {
        chat.memory.insert(node.clone(), Value::String(input.message.clone()));
    }
    chat.current_state = node;
    chat.next_state = Some(next_state.clone());
    chat.history.push(json!({
        "id": message_id,
        "message": input.message,
        "sender": "user",
        "response": [{"send_message": messages}],
        "received_time": now(),
    }));

    let rendered: Vec<Value> = messages
        .into_iter()
        .map(|text| {
            if whatsapp {
                json!({"type": "text", "text": {"body": text}})
            } else {
                Value::String(text)
            }
        })
        .collect();
    Ok(Json(json!({
        "message": rendered,
        "memory": chat.memory,
        "next_state": next_state,
    }))
    .into_response())
}

/// Work out the reply to `message`: the node that handled it, the messages
/// to send and the state to move to.
fn respond(bot: &Bot, chat: &Chat, message: &str) -> (Option<String>, Vec<String>, String) {
    let pending = chat.next_state.as_deref().unwrap_or("start");

    // A pending choice node consumes the message as an option key.
    if let Some(Value::Object(choices)) = bot.flows.get(pending) {
        if !choices.contains_key("next_state") {
            if let Some(target) = choices.get(message.trim()).and_then(Value::as_str) {
                let (messages, next) = flow_node(bot, target);
                return (Some(target.to_string()), messages, next);
            }
            let fallback = choices
                .get("fallback_message")
                .and_then(|v| serde_json::from_value::<Vec<String>>(v.clone()).ok())
                .unwrap_or_else(|| vec![FALLBACK_MESSAGE.to_string()]);
            return (Some(pending.to_string()), fallback, pending.to_string());
        }
    }

    match match_intent(bot, message) {
        Some(intent) => {
            let (messages, next) = flow_node(bot, &intent);
            (Some(intent), messages, next)
        }
        None => (None, vec![FALLBACK_MESSAGE.to_string()], pending.to_string()),
    }
}

fn flow_node(bot: &Bot, node: &str) -> (Vec<String>, String) {
    let flow = bot.flows.get(node).and_then(Value::as_object);
    let messages = flow
        .and_then(|f| f.get("message"))
        .and_then(|m| serde_json::from_value::<Vec<String>>(m.clone()).ok())
        .unwrap_or_default();
    let next = flow
        .and_then(|f| f.get("next_state"))
        .and_then(Value::as_str)
        .unwrap_or("end")
        .to_string();
    (messages, next)
}

fn match_intent(bot: &Bot, message: &str) -> Option<String> {
    let wanted = message.trim().to_lowercase();
    bot.intents
        .iter()
        .find(|(_, examples)| examples.iter().any(|e| e.to_lowercase() == wanted))
        .map(|(name, _)| name.clone())
}

async fn conversation_status(
    State(db): State<Db>,
    headers: HeaderMap,
    input: Result<Json<ChatRef>, JsonRejection>,
) -> Reply {
    let platform = db.read().await;
    let owner = platform.caller(&headers)?;
    let Json(input) = input?;
    platform.owned_bot(owner, input.bot_id)?;
    let chat = platform
        .chats
        .get(&(input.bot_id, input.chat_id))
        .ok_or_else(|| Failure::not_found("chat not found"))?;
    Ok(Json(json!({
        "current_state": chat.current_state,
        "next_state": chat.next_state,
        "memory": chat.memory,
    }))
    .into_response())
}

async fn history(
    State(db): State<Db>,
    headers: HeaderMap,
    ids: Result<Path<(i64, String)>, PathRejection>,
) -> Reply {
    let platform = db.read().await;
    let owner = platform.caller(&headers)?;
    let Path((bot_id, chat_id)) = ids?;
    platform.owned_bot(owner, bot_id)?;
    let entries = platform
        .chats
        .get(&(bot_id, chat_id))
        .map(|chat| chat.history.clone())
        .unwrap_or_default();
    Ok(Json(entries).into_response())
}

async fn predict(
    State(db): State<Db>,
    headers: HeaderMap,
    input: Result<Json<PredictInput>, JsonRejection>,
) -> Reply {
    let platform = db.read().await;
    let owner = platform.caller(&headers)?;
    let Json(input) = input?;
    require_field("message", &input.message)?;
    let bot = platform.owned_bot(owner, input.bot_id)?;
    let body = match match_intent(bot, &input.message) {
        Some(intent) => json!({"message": input.message, "intent": intent, "status": true, "confidence": 1.0}),
        None => json!({"message": input.message, "intent": "unknown", "status": false, "confidence": 0.0}),
    };
    Ok(Json(body).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pizza_bot() -> Bot {
        let flows = json!({
            "order_pizza": {"message": ["How many pizzas?"], "next_state": "number_of_pizzas"},
            "number_of_pizzas": {"message": ["Confirm? 1 yes, 2 no"], "next_state": "choice_confirm"},
            "choice_confirm": {"1": "confirmed", "2": "cancelled", "fallback_message": ["Pick 1 or 2"]},
            "confirmed": {"message": ["Order placed"], "next_state": "end"},
            "cancelled": {"message": ["Order cancelled"], "next_state": "end"}
        });
        Bot {
            id: 1,
            name: "pizza".into(),
            description: String::new(),
            industry: "food".into(),
            user_id: 1,
            visible_on_community: false,
            intents: BTreeMap::from([("order_pizza".to_string(), vec!["I want pizza".to_string()])]),
            flows: flows.as_object().cloned().unwrap(),
            model_name: String::new(),
            webhook_url: None,
            webhook_trigger_intents: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn intent_match_is_case_insensitive() {
        assert_eq!(match_intent(&pizza_bot(), "  i WANT pizza "), Some("order_pizza".into()));
        assert_eq!(match_intent(&pizza_bot(), "hello"), None);
    }

    #[test]
    fn matched_intent_runs_its_flow() {
        let (node, messages, next) = respond(&pizza_bot(), &Chat::default(), "I want pizza");
        assert_eq!(node.as_deref(), Some("order_pizza"));
        assert_eq!(messages, vec!["How many pizzas?"]);
        assert_eq!(next, "number_of_pizzas");
    }

    #[test]
    fn choice_node_picks_option() {
        let chat = Chat {
            next_state: Some("choice_confirm".into()),
            ..Chat::default()
        };
        let (node, messages, next) = respond(&pizza_bot(), &chat, "1");
        assert_eq!(node.as_deref(), Some("confirmed"));
        assert_eq!(messages, vec!["Order placed"]);
        assert_eq!(next, "end");
    }

    #[test]
    fn choice_node_falls_back_on_unknown_option() {
        let chat = Chat {
            next_state: Some("choice_confirm".into()),
            ..Chat::default()
        };
        let (_, messages, next) = respond(&pizza_bot(), &chat, "7");
        assert_eq!(messages, vec!["Pick 1 or 2"]);
        assert_eq!(next, "choice_confirm");
    }

    #[test]
    fn unmatched_message_gets_fallback() {
        let (node, messages, _) = respond(&pizza_bot(), &Chat::default(), "what?");
        assert!(node.is_none());
        assert_eq!(messages, vec![FALLBACK_MESSAGE]);
    }

    #[test]
    fn validation_failure_shape() {
        let failure = Failure::validation(&["body", "username"], "field required", "value_error.missing");
        assert_eq!(failure.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(failure.body["detail"][0]["loc"], json!(["body", "username"]));
        assert_eq!(failure.body["detail"][0]["type"], "value_error.missing");
    }
}
