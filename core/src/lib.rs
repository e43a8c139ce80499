//! Synchronous client for the Appcelerator Cloud Services (ACS) REST API.
//!
//! # Overview
//! `AcsClient` logs in with an app key, username and password, keeps the
//! session cookie in a file, and exposes the user query/search/show and push
//! notification endpoints. Every response is a `{meta, response}` envelope,
//! decoded into `Envelope<T>` and checked before it reaches the caller.
//!
//! # Design
//! - Session state is injected: a `SessionStore` supplies the cached session
//!   at construction and receives the new one after a login.
//! - The network is injected too: a `Transport` turns an `HttpRequest` into the
//!   raw response stream. `UreqTransport` is the default; tests script
//!   responses as plain strings.
//! - Every operation returns `Result<_, AcsError>`; nothing is retried.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use acs_core::{AcsClient, ClientConfig, MemorySessionStore, Params, UreqTransport};
//!
//! # fn main() -> Result<(), acs_core::AcsError> {
//! let config = ClientConfig::builder()
//!     .app_key("my-app-key")
//!     .username("admin")
//!     .password("secret")
//!     .build()?;
//! let client = AcsClient::connect(config, UreqTransport::new(), Arc::new(MemorySessionStore::new()))?;
//! let reply = client.users_query(&Params::new().set("limit", 10))?;
//! for user in reply.into_response().map(|r| r.users).unwrap_or_default() {
//!     println!("{}", user.id);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod cookie;
pub mod error;
pub mod http;
pub mod session;
pub mod transport;
pub mod types;

pub use client::{AcsClient, SharedSessionStore, DEFAULT_RESPONSE_JSON_DEPTH};
pub use config::{ClientConfig, ClientConfigBuilder, DEFAULT_BASE_URI};
pub use cookie::CookieJar;
pub use error::{AcsError, Result};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Params};
pub use session::{JsonFileSessionStore, MemorySessionStore, Session, SessionStore, SESSION_KEY};
pub use transport::{Transport, TransportError, UreqTransport};
pub use types::{Envelope, Meta, RawEnvelope, Reply, Status, User, UserIds, UsersResponse};
