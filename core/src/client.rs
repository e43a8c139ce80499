//! The ACS API client.
//!
//! # Design
//! `AcsClient` resolves a session once, at construction: a session found in
//! the `SessionStore` is reused (its cookie file touched), otherwise the client
//! logs in and stores the new one. After that every resource call goes through
//! `execute`. It signs the URL with the app key, attaches the stored cookies
//! read-only, runs the request on the transport and unwraps the envelope.
//! Login is the only request that writes cookies and the only one that never
//! sends them.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::cookie::CookieJar;
use crate::error::{AcsError, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Params};
use crate::session::{Session, SessionStore, SESSION_KEY};
use crate::transport::{Transport, UreqTransport};
use crate::types::{Envelope, RawEnvelope, Reply, User, UserIds, UsersResponse};

/// Default `response_json_depth` for `users_show`.
pub const DEFAULT_RESPONSE_JSON_DEPTH: u32 = 3;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Shared handle to the store a client resolves its session from.
pub type SharedSessionStore = Arc<dyn SessionStore + Send + Sync>;

/// Synchronous client for the ACS REST API.
///
/// One client owns one transport and one cookie file. It does no locking of
/// its own: concurrent callers must serialize their calls or use separate
/// clients.
pub struct AcsClient<T: Transport = UreqTransport> {
    config: ClientConfig,
    transport: T,
    store: SharedSessionStore,
    cookie_jar: CookieJar,
    current_user: Option<User>,
}

impl AcsClient<UreqTransport> {
    /// Connect with `ACS_*` environment configuration and the default transport.
    pub fn from_env(store: SharedSessionStore) -> Result<Self> {
        Self::connect(ClientConfig::from_env()?, UreqTransport::new(), store)
    }
}

impl<T: Transport> AcsClient<T> {
    /// Build a client and resolve its session.
    ///
    /// Reuses the session cached in `store` if there is one; otherwise
    /// allocates a cookie file and logs in. A failed login, including one whose
    /// session cannot be stored, removes the cookie file again.
    pub fn connect(config: ClientConfig, transport: T, store: SharedSessionStore) -> Result<Self> {
        config.validate()?;
        if let Some(session) = store.get(SESSION_KEY) {
            let cookie_jar = CookieJar::open(session.cookie_jar);
            cookie_jar.touch()?;
            info!(user = %session.current_user.id, "reusing cached ACS session");
            return Ok(Self {
                config,
                transport,
                store,
                cookie_jar,
                current_user: Some(session.current_user),
            });
        }

        let cookie_jar = CookieJar::create_in(&config.cookie_dir)?;
        let mut client = Self {
            config,
            transport,
            store,
            cookie_jar,
            current_user: None,
        };
        if let Err(e) = client.login() {
            if let Err(cleanup) = client.cookie_jar.remove() {
                warn!(path = %client.cookie_jar.path().display(), error = %cleanup, "cannot remove cookie file");
            }
            return Err(e);
        }
        Ok(client)
    }

    /// Log in with the configured credentials.
    ///
    /// The response cookies are written to the cookie file and the session is
    /// stored before the decoded envelope is returned.
    pub fn login(&mut self) -> Result<Envelope<UsersResponse>> {
        let url = self.endpoint("users/login.json")?;
        let form = Params::new()
            .set("login", &self.config.username)
            .set("password", &self.config.password);
        let request = HttpRequest {
            method: HttpMethod::Post,
            url: url.into(),
            headers: vec![("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string())],
            body: Some(form.to_form()),
        };
        info!(username = %self.config.username, "logging in to ACS");

        let response = HttpResponse::parse(&self.transport.execute(&request)?);
        let envelope = RawEnvelope::decode(&response.body)?
            .into_result()
            .map_err(|e| match e {
                AcsError::Api { message, .. } => AcsError::Authentication { message },
                other => other,
            })?;
        let envelope: Envelope<UsersResponse> = envelope.typed()?;
        let user = envelope
            .response
            .as_ref()
            .and_then(|r| r.users.first())
            .cloned()
            .ok_or_else(|| AcsError::Deserialization("login response carried no user".to_string()))?;

        let stored = self.cookie_jar.record(response.header_values("set-cookie"))?;
        debug!(cookies = stored, "recorded login cookies");
        self.store.put(
            SESSION_KEY,
            Session {
                cookie_jar: self.cookie_jar.path().to_path_buf(),
                current_user: user.clone(),
            },
        )?;
        info!(user = %user.id, "ACS login succeeded");
        self.current_user = Some(user);
        Ok(envelope)
    }

    pub fn users_query(&self, filter: &Params) -> Result<Reply<UsersResponse>> {
        self.execute(HttpMethod::Get, "users/query.json", filter)
    }

    pub fn users_search(&self, search: &Params) -> Result<Reply<UsersResponse>> {
        self.execute(HttpMethod::Get, "users/search.json", search)
    }

    /// Show one user or several, at the default JSON depth.
    pub fn users_show(&self, ids: impl Into<UserIds>) -> Result<Reply<UsersResponse>> {
        self.users_show_with_depth(ids, DEFAULT_RESPONSE_JSON_DEPTH)
    }

    /// A collection of ids is sent as `user_ids=a,b,c`, a single id as `user_id`.
    pub fn users_show_with_depth(&self, ids: impl Into<UserIds>, depth: u32) -> Result<Reply<UsersResponse>> {
        let mut params = Params::new().set("response_json_depth", depth);
        match ids.into() {
            UserIds::Many(ids) => params.insert("user_ids", ids.join(",")),
            UserIds::One(id) => params.insert("user_id", id),
        }
        self.execute(HttpMethod::Get, "users/show.json", &params)
    }

    /// Send a push notification to `channel`.
    ///
    /// `payload` travels as a JSON string. `ids` are comma-joined; `friends`
    /// is passed through unchanged.
    pub fn push_notification_notify<P>(
        &self,
        channel: &str,
        payload: &P,
        ids: Option<&[&str]>,
        friends: Option<&str>,
    ) -> Result<Reply<Value>>
    where
        P: Serialize + ?Sized,
    {
        let payload = serde_json::to_string(payload).map_err(|e| AcsError::Serialization(e.to_string()))?;
        let mut params = Params::new().set("channel", channel).set("payload", payload);
        if let Some(ids) = ids {
            params.insert("ids", ids.join(","));
        }
        if let Some(friends) = friends {
            params.insert("friends", friends);
        }
        self.execute(HttpMethod::Post, "push_notification/notify.json", &params)
    }

    /// `{base_uri}/{path}?key={app_key}`.
    fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.config.base_uri.trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}/{path}"))
            .map_err(|e| AcsError::Configuration(format!("invalid base URI {base:?}: {e}")))?;
        url.query_pairs_mut().append_pair("key", &self.config.app_key);
        Ok(url)
    }

    /// Run an authenticated request and unwrap its envelope.
    ///
    /// Parameters go in the query string for GET, DELETE and CONNECT and in a
    /// form body for POST and PUT.
    fn execute<R: DeserializeOwned>(&self, method: HttpMethod, path: &str, params: &Params) -> Result<Reply<R>> {
        let mut url = self.endpoint(path)?;
        let mut headers = Vec::new();
        if let Some(cookie) = self.cookie_jar.header_value()? {
            headers.push(("Cookie".to_string(), cookie));
        }
        let body = if method.carries_body() {
            headers.push(("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string()));
            Some(params.to_form())
        } else {
            if !params.is_empty() {
                url.query_pairs_mut().extend_pairs(params.iter());
            }
            None
        };

        debug!(method = %method, path = url.path(), "ACS request");
        let request = HttpRequest {
            method,
            url: url.into(),
            headers,
            body,
        };
        let raw = self.transport.execute(&request).inspect_err(|e| {
            warn!(method = %method, path, error = %e, "ACS transport failure");
        })?;

        let response = HttpResponse::parse(&raw);
        let body = RawEnvelope::decode(&response.body)?.into_result()?.typed()?;
        Ok(Reply {
            headers: self.config.return_headers.then_some(response.headers),
            body,
        })
    }

    pub fn app_key(&self) -> &str {
        &self.config.app_key
    }

    pub fn set_app_key(&mut self, app_key: impl Into<String>) {
        self.config.app_key = app_key.into();
    }

    pub fn username(&self) -> &str {
        &self.config.username
    }

    pub fn set_username(&mut self, username: impl Into<String>) {
        self.config.username = username.into();
    }

    pub fn password(&self) -> &str {
        &self.config.password
    }

    pub fn set_password(&mut self, password: impl Into<String>) {
        self.config.password = password.into();
    }

    pub fn base_uri(&self) -> &str {
        &self.config.base_uri
    }

    pub fn set_base_uri(&mut self, base_uri: impl Into<String>) {
        self.config.base_uri = base_uri.into().trim_end_matches('/').to_string();
    }

    pub fn return_headers(&self) -> bool {
        self.config.return_headers
    }

    pub fn set_return_headers(&mut self, return_headers: bool) {
        self.config.return_headers = return_headers;
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The user of the resolved session.
    pub fn current_user(&self) -> Option<&User> {
        self.current_user.as_ref()
    }

    /// The transport used for every request.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn cookie_jar(&self) -> &CookieJar {
        &self.cookie_jar
    }
}

impl<T: Transport> fmt::Debug for AcsClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcsClient")
            .field("config", &self.config)
            .field("cookie_jar", &self.cookie_jar)
            .field("current_user", &self.current_user)
            .finish_non_exhaustive()
    }
}
