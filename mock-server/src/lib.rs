//! In-process stand-in for the ACS REST endpoints the client consumes.
//!
//! Every answer is an ACS envelope. Login checks the app key and credentials
//! and issues a `_session_id` cookie. The resource endpoints reject requests
//! that carry no known session cookie.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};
use uuid::Uuid;

pub const APP_KEY: &str = "test-app-key";
pub const USERNAME: &str = "admin";
pub const PASSWORD: &str = "secret";
pub const SESSION_COOKIE: &str = "_session_id";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Account {
    pub user: Value,
    pub password: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub channel: String,
    pub payload: Value,
    pub ids: Vec<String>,
    pub friends: Option<String>,
}

#[derive(Debug)]
pub struct Backend {
    pub app_key: String,
    pub accounts: Vec<Account>,
    pub sessions: HashSet<String>,
    pub notifications: Vec<Notification>,
    pub logins: usize,
}

impl Default for Backend {
    fn default() -> Self {
        let account = |id: &str, username: &str, first: &str, password: &str| Account {
            user: json!({
                "id": id,
                "username": username,
                "email": format!("{username}@example.com"),
                "first_name": first,
                "role": "user",
            }),
            password: password.to_string(),
        };
        Self {
            app_key: APP_KEY.to_string(),
            accounts: vec![
                account("u1", USERNAME, "Ada", PASSWORD),
                account("u2", "alice", "Alice", "alice-pw"),
                account("u3", "bob", "Bob", "bob-pw"),
            ],
            sessions: HashSet::new(),
            notifications: Vec::new(),
            logins: 0,
        }
    }
}

pub type Db = Arc<RwLock<Backend>>;

pub fn app() -> Router {
    app_with(Arc::new(RwLock::new(Backend::default())))
}

/// Router over caller-owned state, so tests can inspect it.
pub fn app_with(db: Db) -> Router {
    Router::new()
        .route("/v1/users/login.json", post(login))
        .route("/v1/users/query.json", get(query_users))
        .route("/v1/users/search.json", get(search_users))
        .route("/v1/users/show.json", get(show_users))
        .route("/v1/push_notification/notify.json", post(notify))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with(listener: TcpListener, db: Db) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with(db)).await
}

type Params = HashMap<String, String>;

fn ok(method_name: &str, response: Option<Value>) -> Response {
    let mut body = json!({"meta": {"status": "ok", "code": 200, "method_name": method_name}});
    if let Some(response) = response {
        body["response"] = response;
    }
    Json(body).into_response()
}

fn fail(code: StatusCode, message: &str) -> Response {
    let body = json!({"meta": {"status": "fail", "code": code.as_u16(), "message": message}});
    (code, Json(body)).into_response()
}

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

/// App key and session checks shared by the resource endpoints.
fn authorize(backend: &Backend, params: &Params, headers: &HeaderMap) -> Result<(), Response> {
    if params.get("key") != Some(&backend.app_key) {
        return Err(fail(StatusCode::UNAUTHORIZED, "Invalid key"));
    }
    match session_id(headers) {
        Some(id) if backend.sessions.contains(&id) => Ok(()),
        _ => Err(fail(StatusCode::UNAUTHORIZED, "You need to sign in or sign up before continuing.")),
    }
}

async fn login(
    State(db): State<Db>,
    Query(query): Query<Params>,
    Form(form): Form<Params>,
) -> Response {
    let mut backend = db.write().await;
    if query.get("key") != Some(&backend.app_key) {
        return fail(StatusCode::UNAUTHORIZED, "Invalid key");
    }
    let login = form.get("login").map(String::as_str).unwrap_or_default();
    let password = form.get("password").map(String::as_str).unwrap_or_default();
    let account = backend.accounts.iter().find(|a| {
        a.password == password && (a.user["username"] == login || a.user["email"] == login)
    });
    let Some(user) = account.map(|a| a.user.clone()) else {
        return fail(StatusCode::UNAUTHORIZED, "Invalid email/username or password");
    };

    let session = Uuid::new_v4().simple().to_string();
    backend.sessions.insert(session.clone());
    backend.logins += 1;
    info!(user = %user["id"], "login");

    let cookie = format!("{SESSION_COOKIE}={session}; path=/; HttpOnly");
    let mut response = ok("loginUser", Some(json!({"users": [user]})));
    if let Ok(value) = cookie.parse() {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    response
}

async fn query_users(State(db): State<Db>, Query(params): Query<Params>, headers: HeaderMap) -> Response {
    let backend = db.read().await;
    if let Err(denied) = authorize(&backend, &params, &headers) {
        return denied;
    }
    let filter: Option<serde_json::Map<String, Value>> = match params.get("where") {
        Some(raw) => match serde_json::from_str(raw) {
            Ok(filter) => Some(filter),
            Err(_) => return fail(StatusCode::BAD_REQUEST, "Invalid where clause"),
        },
        None => None,
    };
    let limit = params.get("limit").and_then(|l| l.parse().ok()).unwrap_or(10);
    let users: Vec<Value> = backend
        .accounts
        .iter()
        .map(|a| &a.user)
        .filter(|user| {
            filter
                .as_ref()
                .map_or(true, |f| f.iter().all(|(k, v)| &user[k.as_str()] == v))
        })
        .take(limit)
        .cloned()
        .collect();
    debug!(count = users.len(), "query");
    ok("queryUsers", Some(json!({"users": users})))
}

async fn search_users(State(db): State<Db>, Query(params): Query<Params>, headers: HeaderMap) -> Response {
    let backend = db.read().await;
    if let Err(denied) = authorize(&backend, &params, &headers) {
        return denied;
    }
    let q = params.get("q").map(|q| q.to_lowercase()).unwrap_or_default();
    let users: Vec<Value> = backend
        .accounts
        .iter()
        .map(|a| &a.user)
        .filter(|user| {
            ["username", "first_name"].iter().any(|field| {
                user[*field]
                    .as_str()
                    .is_some_and(|v| v.to_lowercase().contains(&q))
            })
        })
        .cloned()
        .collect();
    ok("searchUsers", Some(json!({"users": users})))
}

async fn show_users(State(db): State<Db>, Query(params): Query<Params>, headers: HeaderMap) -> Response {
    let backend = db.read().await;
    if let Err(denied) = authorize(&backend, &params, &headers) {
        return denied;
    }
    let ids: Vec<&str> = match (params.get("user_ids"), params.get("user_id")) {
        (Some(ids), _) => ids.split(',').collect(),
        (None, Some(id)) => vec![id.as_str()],
        (None, None) => return fail(StatusCode::BAD_REQUEST, "Required parameter user_id is missing"),
    };
    let mut users = Vec::with_capacity(ids.len());
    for id in ids {
        match backend.accounts.iter().find(|a| a.user["id"] == id) {
            Some(account) => users.push(account.user.clone()),
            None => return fail(StatusCode::NOT_FOUND, &format!("Invalid user id: {id}")),
        }
    }
    ok("showUser", Some(json!({"users": users})))
}

async fn notify(
    State(db): State<Db>,
    Query(query): Query<Params>,
    headers: HeaderMap,
    Form(form): Form<Params>,
) -> Response {
    let mut backend = db.write().await;
    if let Err(denied) = authorize(&backend, &query, &headers) {
        return denied;
    }
    let Some(channel) = form.get("channel").filter(|c| !c.is_empty()) else {
        return fail(StatusCode::BAD_REQUEST, "Required parameter channel is missing");
    };
    let payload = match form.get("payload").map(|p| serde_json::from_str::<Value>(p)) {
        Some(Ok(payload)) => payload,
        _ => return fail(StatusCode::BAD_REQUEST, "Invalid payload"),
    };
    let notification = Notification {
        channel: channel.clone(),
        payload,
        ids: form
            .get("ids")
            .map(|ids| ids.split(',').map(str::to_string).collect())
            .unwrap_or_default(),
        friends: form.get("friends").cloned(),
    };
    info!(channel = %notification.channel, "push notification");
    backend.notifications.push(notification);
    ok("Notify", None)
}
