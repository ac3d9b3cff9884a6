//! Endpoint catalogue for the Sarufi API.
//!
//! # Design
//! `SarufiClient` holds only the base URL, the bearer token and the request
//! context. Each operation is split into a `build_*` method that produces an
//! `HttpRequest` and a `parse_*` method that consumes an `HttpResponse`, so
//! the client itself never touches the network. `Sarufi` pairs a client with
//! a `Transport` and runs build, execute and dispatch in one call, prefixing
//! any failure with the operation name.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::dispatch::{dispatch, dispatch_empty};
use crate::error::{ApiError, BuildError, DispatchError};
use crate::http::{bearer, HttpMethod, HttpRequest, HttpResponse, RequestContext};
use crate::transport::Transport;
use crate::types::{
    AccessTokenRequest, AccessTokenResponse, Channel, ChatUser, Chatbot, ConversationRequest,
    ConversationResponse, ConversationState, ConversationStatusRequest, CreateBotRequest,
    HistoryEntry, LoginRequest, LoginResponse, PredictRequest, Prediction, Profile,
    RegisterRequest, RegisterResponse, UpdateBotRequest,
};

pub const DEFAULT_BASE_URL: &str = "https://api.sarufi.io";

const NO_BODY: Option<&()> = None;

/// Request builder and response parser for every platform endpoint.
#[derive(Debug, Clone)]
pub struct SarufiClient {
    base_url: String,
    token: Option<String>,
    context: RequestContext,
}

impl Default for SarufiClient {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl SarufiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            context: RequestContext::default(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.set_token(token);
        self
    }

    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }

    pub fn clear_token(&mut self) {
        self.token = None;
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    pub fn set_context(&mut self, context: RequestContext) {
        self.context = context;
    }

    fn request<B>(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&B>,
        authenticated: bool,
    ) -> Result<HttpRequest, BuildError>
    where
        B: Serialize + ?Sized,
    {
        let url = format!("{}{path}", self.base_url);
        self.request_to(method, &url, body, authenticated)
    }

    fn request_to<B>(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<&B>,
        authenticated: bool,
    ) -> Result<HttpRequest, BuildError>
    where
        B: Serialize + ?Sized,
    {
        let authorization = self.token.as_deref().filter(|_| authenticated).map(bearer);

        let mut headers = Vec::with_capacity(2);
        if body.is_some() {
            headers.push(("Content-Type", "application/json"));
        }
        if let Some(value) = authorization.as_deref() {
            headers.push(("Authorization", value));
        }
        HttpRequest::build(&self.context, method, url, body, &headers)
    }

    /// `path` under the base URL with `segment` appended as one escaped
    /// path segment.
    fn url_with_segment(&self, path: &str, segment: &str) -> Result<Url, BuildError> {
        let raw = format!("{}{path}", self.base_url);
        let invalid = |source: url::ParseError| BuildError::InvalidUrl {
            url: raw.clone(),
            source,
        };
        let mut parsed = Url::parse(&raw).map_err(invalid)?;
        parsed
            .path_segments_mut()
            .map_err(|()| invalid(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .push(segment);
        Ok(parsed)
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    pub fn build_register(&self, input: &RegisterRequest) -> Result<HttpRequest, BuildError> {
        self.request(HttpMethod::Post, "/users/register", Some(input), false)
    }

    pub fn parse_register(&self, response: &HttpResponse) -> Result<RegisterResponse, DispatchError> {
        dispatch(response)
    }

    pub fn build_login(&self, input: &LoginRequest) -> Result<HttpRequest, BuildError> {
        self.request(HttpMethod::Post, "/users/login", Some(input), false)
    }

    pub fn parse_login(&self, response: &HttpResponse) -> Result<LoginResponse, DispatchError> {
        dispatch(response)
    }

    pub fn build_access_token(&self, input: &AccessTokenRequest) -> Result<HttpRequest, BuildError> {
        self.request(HttpMethod::Post, "/api/access_token", Some(input), false)
    }

    pub fn parse_access_token(
        &self,
        response: &HttpResponse,
    ) -> Result<AccessTokenResponse, DispatchError> {
        dispatch(response)
    }

    pub fn build_profile(&self) -> Result<HttpRequest, BuildError> {
        self.request(HttpMethod::Get, "/api/profile", NO_BODY, true)
    }

    pub fn parse_profile(&self, response: &HttpResponse) -> Result<Profile, DispatchError> {
        dispatch(response)
    }

    // -----------------------------------------------------------------------
    // Chatbots
    // -----------------------------------------------------------------------

    pub fn build_create_bot(&self, input: &CreateBotRequest) -> Result<HttpRequest, BuildError> {
        self.request(HttpMethod::Post, "/chatbot", Some(input), true)
    }

    pub fn parse_create_bot(&self, response: &HttpResponse) -> Result<Chatbot, DispatchError> {
        dispatch(response)
    }

    pub fn build_get_bot(&self, id: i64) -> Result<HttpRequest, BuildError> {
        self.request(HttpMethod::Get, &format!("/chatbot/{id}"), NO_BODY, true)
    }

    pub fn parse_get_bot(&self, response: &HttpResponse) -> Result<Chatbot, DispatchError> {
        dispatch(response)
    }

    pub fn build_list_bots(&self) -> Result<HttpRequest, BuildError> {
        self.request(HttpMethod::Get, "/chatbots", NO_BODY, true)
    }

    pub fn parse_list_bots(&self, response: &HttpResponse) -> Result<Vec<Chatbot>, DispatchError> {
        dispatch(response)
    }

    pub fn build_update_bot(
        &self,
        id: i64,
        input: &UpdateBotRequest,
    ) -> Result<HttpRequest, BuildError> {
        self.request(HttpMethod::Put, &format!("/chatbot/{id}"), Some(input), true)
    }

    pub fn parse_update_bot(&self, response: &HttpResponse) -> Result<Chatbot, DispatchError> {
        dispatch(response)
    }

    pub fn build_delete_bot(&self, id: i64) -> Result<HttpRequest, BuildError> {
        self.request(HttpMethod::Delete, &format!("/chatbot/{id}"), NO_BODY, true)
    }

    pub fn parse_delete_bot(&self, response: &HttpResponse) -> Result<(), DispatchError> {
        dispatch_empty(response)
    }

    pub fn build_chat_users(&self, bot_id: i64) -> Result<HttpRequest, BuildError> {
        self.request(HttpMethod::Get, &format!("/chatbot/{bot_id}/users"), NO_BODY, true)
    }

    pub fn parse_chat_users(&self, response: &HttpResponse) -> Result<Vec<ChatUser>, DispatchError> {
        dispatch(response)
    }

    // -----------------------------------------------------------------------
    // Conversations
    // -----------------------------------------------------------------------

    pub fn build_send_message(&self, input: &ConversationRequest) -> Result<HttpRequest, BuildError> {
        let path = match input.channel {
            Channel::General => "/conversation/",
            Channel::Whatsapp => "/conversation/whatsapp",
        };
        self.request(HttpMethod::Post, path, Some(input), true)
    }

    pub fn parse_send_message(
        &self,
        response: &HttpResponse,
    ) -> Result<ConversationResponse, DispatchError> {
        dispatch(response)
    }

    pub fn build_conversation_status(
        &self,
        input: &ConversationStatusRequest,
    ) -> Result<HttpRequest, BuildError> {
        self.request(HttpMethod::Post, "/conversation/status", Some(input), true)
    }

    pub fn parse_conversation_status(
        &self,
        response: &HttpResponse,
    ) -> Result<ConversationState, DispatchError> {
        dispatch(response)
    }

    pub fn build_predict_intent(&self, input: &PredictRequest) -> Result<HttpRequest, BuildError> {
        self.request(HttpMethod::Post, "/predict/intent", Some(input), true)
    }

    pub fn parse_predict_intent(&self, response: &HttpResponse) -> Result<Prediction, DispatchError> {
        dispatch(response)
    }

    pub fn build_conversation_history(
        &self,
        bot_id: i64,
        chat_id: &str,
    ) -> Result<HttpRequest, BuildError> {
        let url = self.url_with_segment(&format!("/conversation/history/{bot_id}"), chat_id)?;
        self.request_to(HttpMethod::Get, url.as_str(), NO_BODY, true)
    }

    pub fn parse_conversation_history(
        &self,
        response: &HttpResponse,
    ) -> Result<Vec<HistoryEntry>, DispatchError> {
        dispatch(response)
    }
}

impl ConversationRequest {
    /// Assign a fresh chat id when none is set and return the id in use.
    pub fn ensure_chat_id(&mut self) -> &str {
        if self.chat_id.is_empty() {
            self.chat_id = Uuid::new_v4().to_string();
        }
        &self.chat_id
    }
}

/// A `SarufiClient` bound to a transport.
///
/// Holds no state besides the client (base URL, token, context) and the
/// transport handle; concurrent callers sharing one value through `&self`
/// only need to serialize their own `set_token` calls.
#[derive(Debug, Clone)]
pub struct Sarufi<T> {
    client: SarufiClient,
    transport: T,
}

impl<T: Transport> Sarufi<T> {
    pub fn new(client: SarufiClient, transport: T) -> Self {
        Self { client, transport }
    }

    pub fn client(&self) -> &SarufiClient {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut SarufiClient {
        &mut self.client
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn set_transport(&mut self, transport: T) {
        self.transport = transport;
    }

    pub fn set_token(&mut self, token: impl Into<String>) {
        self.client.set_token(token);
    }

    fn call<R>(
        &self,
        operation: &'static str,
        request: Result<HttpRequest, BuildError>,
        parse: impl FnOnce(&HttpResponse) -> Result<R, DispatchError>,
    ) -> Result<R, ApiError> {
        let request = request.map_err(|source| ApiError::Build { operation, source })?;
        debug!(operation, method = request.method.as_str(), url = %request.url, "calling platform");
        let response = self
            .transport
            .execute(request)
            .map_err(|source| ApiError::Transport { operation, source })?;
        parse(&response).map_err(|source| ApiError::Dispatch { operation, source })
    }

    fn fetch<R: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: Result<HttpRequest, BuildError>,
    ) -> Result<R, ApiError> {
        self.call(operation, request, dispatch)
    }

    pub fn register(&self, input: &RegisterRequest) -> Result<RegisterResponse, ApiError> {
        self.fetch("register", self.client.build_register(input))
    }

    pub fn login(&self, input: &LoginRequest) -> Result<LoginResponse, ApiError> {
        self.fetch("login", self.client.build_login(input))
    }

    /// Log in and keep the returned token for subsequent calls.
    pub fn authenticate(&mut self, username: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let response = self.login(&LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        })?;
        self.client.set_token(response.token.clone());
        Ok(response)
    }

    pub fn access_token(&self, input: &AccessTokenRequest) -> Result<AccessTokenResponse, ApiError> {
        self.fetch("access token", self.client.build_access_token(input))
    }

    pub fn profile(&self) -> Result<Profile, ApiError> {
        self.fetch("profile", self.client.build_profile())
    }

    pub fn create_bot(&self, input: &CreateBotRequest) -> Result<Chatbot, ApiError> {
        self.fetch("create bot", self.client.build_create_bot(input))
    }

    pub fn get_bot(&self, id: i64) -> Result<Chatbot, ApiError> {
        self.fetch("get bot", self.client.build_get_bot(id))
    }

    pub fn list_bots(&self) -> Result<Vec<Chatbot>, ApiError> {
        self.fetch("list bots", self.client.build_list_bots())
    }

    pub fn update_bot(&self, id: i64, input: &UpdateBotRequest) -> Result<Chatbot, ApiError> {
        self.fetch("update bot", self.client.build_update_bot(id, input))
    }

    pub fn delete_bot(&self, id: i64) -> Result<(), ApiError> {
        self.call("delete bot", self.client.build_delete_bot(id), dispatch_empty)
    }

    pub fn chat_users(&self, bot_id: i64) -> Result<Vec<ChatUser>, ApiError> {
        self.fetch("chat users", self.client.build_chat_users(bot_id))
    }

    /// Send one conversation turn. An empty `chat_id` is replaced with a new
    /// one before sending, so the caller can continue the same chat.
    pub fn send_message(&self, input: &mut ConversationRequest) -> Result<ConversationResponse, ApiError> {
        input.ensure_chat_id();
        self.fetch("send message", self.client.build_send_message(input))
    }

    pub fn conversation_status(
        &self,
        input: &ConversationStatusRequest,
    ) -> Result<ConversationState, ApiError> {
        self.fetch("conversation status", self.client.build_conversation_status(input))
    }

    pub fn predict_intent(&self, input: &PredictRequest) -> Result<Prediction, ApiError> {
        self.fetch("predict intent", self.client.build_predict_intent(input))
    }

    pub fn conversation_history(
        &self,
        bot_id: i64,
        chat_id: &str,
    ) -> Result<Vec<HistoryEntry>, ApiError> {
        self.fetch(
            "conversation history",
            self.client.build_conversation_history(bot_id, chat_id),
        )
    }
}
