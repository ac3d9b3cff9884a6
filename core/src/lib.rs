//! Client core for the Sarufi conversational-bot platform.
//!
//! # Overview
//! `SarufiClient` builds `HttpRequest` values and parses `HttpResponse`
//! values without touching the network. `Sarufi` binds a client to a
//! `Transport` (by default the blocking `UreqTransport`) and runs each
//! operation end to end.
//!
//! # Design
//! - Every response goes through one status-code table in `dispatch`:
//!   success payloads decode into the caller's type, known error statuses
//!   decode into structured payloads, anything else keeps its raw body.
//! - Failures surface as `ApiError`, prefixed with the operation name.
//!   Nothing in this crate retries, caches or exits the process.
//! - The bearer token is a field of the client value; there is no global
//!   state.
//!
//! ```no_run
//! use sarufi_core::{Sarufi, SarufiClient, UreqTransport};
//!
//! # fn main() -> Result<(), sarufi_core::ApiError> {
//! let mut api = Sarufi::new(SarufiClient::default(), UreqTransport::new());
//! api.authenticate("jane", "secret")?;
//! for bot in api.list_bots()? {
//!     println!("{}: {}", bot.id, bot.name);
//! }
//! # Ok(())
//! # }
//! ```

pub mod bot;
pub mod client;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod transport;
pub mod types;

pub use bot::{load_flows, load_intents};
pub use client::{Sarufi, SarufiClient, DEFAULT_BASE_URL};
pub use dispatch::{dispatch, dispatch_empty};
pub use error::{
    ApiError, BuildError, ConflictError, DispatchError, DispatchKind, LoadError, NotFoundError,
    RequestError, TransportError, Unauthorized, ValidationError, ValidationErrorDetail,
};
pub use http::{bearer, HttpMethod, HttpRequest, HttpResponse, RequestContext};
pub use transport::{Transport, UreqTransport};
pub use types::*;
