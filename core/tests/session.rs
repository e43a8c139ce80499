//! Session resolution and error behaviour against a scripted transport.
//!
//! The transport replays raw response strings and counts login calls, so the
//! tests can assert exactly which requests a client issued.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::sync::Arc;

use acs_core::{
    AcsClient, AcsError, ClientConfig, Envelope, HttpRequest, JsonFileSessionStore, MemorySessionStore, Params,
    RawEnvelope, Session, SessionStore, SharedSessionStore, Transport, TransportError, UsersResponse, SESSION_KEY,
};
use serde_json::json;

const LOGIN_OK: &str = "HTTP/1.1 200 OK\r\nSet-Cookie: _session_id=s1; path=/\r\n\r\n\
    {\"meta\":{\"status\":\"ok\"},\"response\":{\"users\":[{\"id\":\"u1\"}]}}";
const BAD_KEY: &str =
    "HTTP/1.1 401 Unauthorized\r\n\r\n{\"meta\":{\"status\":\"error\",\"message\":\"bad key\"}}";

#[derive(Default)]
struct Scripted {
    responses: RefCell<VecDeque<String>>,
    fallback: String,
    logins: Cell<usize>,
    calls: Cell<usize>,
}

impl Scripted {
    fn new(responses: &[&str], fallback: &str) -> Self {
        Self {
            responses: RefCell::new(responses.iter().map(|r| r.to_string()).collect()),
            fallback: fallback.to_string(),
            ..Self::default()
        }
    }
}

impl Transport for Scripted {
    fn execute(&self, request: &HttpRequest) -> Result<String, TransportError> {
        self.calls.set(self.calls.get() + 1);
        if request.url.contains("/users/login.json") {
            self.logins.set(self.logins.get() + 1);
        }
        Ok(self
            .responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone()))
    }
}

fn config(dir: &tempfile::TempDir) -> ClientConfig {
    ClientConfig::builder()
        .app_key("k")
        .username("admin")
        .password("secret")
        .base_uri("http://acs.test/v1")
        .cookie_dir(dir.path())
        .build()
        .unwrap()
}

fn store() -> Arc<MemorySessionStore> {
    Arc::new(MemorySessionStore::new())
}

#[test]
fn each_missing_credential_is_a_configuration_error() {
    let builds = [
        ClientConfig::builder().username("u").password("p").build(),
        ClientConfig::builder().app_key("k").password("p").build(),
        ClientConfig::builder().app_key("k").username("u").build(),
    ];
    for result in builds {
        assert!(matches!(result, Err(AcsError::Configuration(_))));
    }
}

#[test]
fn literal_config_with_empty_credentials_is_rejected_before_any_request() {
    let dir = tempfile::tempdir().unwrap();
    let literal = ClientConfig {
        app_key: String::new(),
        username: String::new(),
        password: String::new(),
        base_uri: "http://acs.test/v1".to_string(),
        return_headers: false,
        cookie_dir: dir.path().to_path_buf(),
    };
    let transport = Scripted::new(&[LOGIN_OK], "");

    let err = AcsClient::connect(literal, &transport, store()).unwrap_err();
    assert!(matches!(err, AcsError::Configuration(_)));
    assert_eq!(transport.calls.get(), 0);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn unwritable_session_store_fails_the_login() {
    let dir = tempfile::tempdir().unwrap();
    let cookies = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileSessionStore::new(dir.path().join("missing-dir").join("sessions.json")));
    let mut config = config(&dir);
    config.cookie_dir = cookies.path().to_path_buf();

    let err = AcsClient::connect(config, Scripted::new(&[LOGIN_OK], ""), store.clone()).unwrap_err();
    assert!(matches!(err, AcsError::CookieStorage(_)));
    assert!(store.get(SESSION_KEY).is_none());
    assert_eq!(std::fs::read_dir(cookies.path()).unwrap().count(), 0, "cookie file left behind");
}

#[test]
fn fresh_login_caches_user_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = store();
    let client = AcsClient::connect(config(&dir), Scripted::new(&[LOGIN_OK], ""), store.clone()).unwrap();

    let session = store.get(SESSION_KEY).unwrap();
    assert_eq!(serde_json::to_value(&session.current_user).unwrap(), json!({"id": "u1"}));
    assert_eq!(client.config().app_key, "k");
    assert_eq!(session.cookie_jar, client.cookie_jar().path());
    assert!(session.cookie_jar.starts_with(dir.path()));
    assert_eq!(client.transport().logins.get(), 1);
    assert_eq!(
        client.cookie_jar().header_value().unwrap().as_deref(),
        Some("_session_id=s1")
    );
}

#[test]
fn cached_session_skips_login() {
    let dir = tempfile::tempdir().unwrap();
    let store = store();
    AcsClient::connect(config(&dir), Scripted::new(&[LOGIN_OK], ""), store.clone()).unwrap();
    let cached = store.get(SESSION_KEY).unwrap();

    let again = AcsClient::connect(config(&dir), Scripted::new(&[], ""), store.clone()).unwrap();
    assert_eq!(again.transport().logins.get(), 0);
    assert_eq!(again.transport().calls.get(), 0);
    assert_eq!(store.get(SESSION_KEY).unwrap(), cached);
    assert_eq!(again.current_user(), Some(&cached.current_user));
    assert_eq!(again.cookie_jar().path(), cached.cookie_jar);
}

#[test]
fn cached_session_recreates_reaped_cookie_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = store();
    let first = AcsClient::connect(config(&dir), Scripted::new(&[LOGIN_OK], ""), store.clone()).unwrap();
    first.cookie_jar().remove().unwrap();

    let again = AcsClient::connect(config(&dir), Scripted::new(&[], ""), store.clone()).unwrap();
    assert!(again.cookie_jar().path().exists());
}

#[test]
fn rejected_login_is_an_authentication_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = store();
    let shared: SharedSessionStore = store.clone();
    let rejected = "HTTP/1.1 401 Unauthorized\r\n\r\n\
        {\"meta\":{\"status\":\"fail\",\"code\":401,\"message\":\"Invalid email/username or password\"}}";

    let err = AcsClient::connect(config(&dir), Scripted::new(&[rejected], ""), shared).unwrap_err();
    match err {
        AcsError::Authentication { message } => assert_eq!(message, "Invalid email/username or password"),
        other => panic!("expected Authentication, got {other:?}"),
    }
    assert!(store.is_empty());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0, "cookie file left behind");
}

#[test]
fn login_without_user_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = store();
    let empty = "HTTP/1.1 200 OK\r\n\r\n{\"meta\":{\"status\":\"ok\"},\"response\":{\"users\":[]}}";
    let err = AcsClient::connect(config(&dir), Scripted::new(&[empty], ""), store.clone()).unwrap_err();
    assert!(matches!(err, AcsError::Deserialization(_)));
    assert!(store.is_empty());
}

#[test]
fn explicit_login_returns_envelope_and_refreshes_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = store();
    let relogin = "HTTP/1.1 200 OK\r\nSet-Cookie: _session_id=s2\r\n\r\n\
        {\"meta\":{\"status\":\"ok\",\"method_name\":\"loginUser\"},\"response\":{\"users\":[{\"id\":\"u9\"}]}}";
    let mut client =
        AcsClient::connect(config(&dir), Scripted::new(&[LOGIN_OK, relogin], ""), store.clone()).unwrap();

    let envelope = client.login().unwrap();
    assert!(envelope.is_ok());
    assert_eq!(envelope.meta.method_name.as_deref(), Some("loginUser"));
    assert_eq!(envelope.response.unwrap().users[0].id, "u9");
    assert_eq!(store.get(SESSION_KEY).unwrap().current_user.id, "u9");
    assert_eq!(client.current_user().unwrap().id, "u9");
    assert_eq!(
        client.cookie_jar().header_value().unwrap().as_deref(),
        Some("_session_id=s2")
    );
}

#[test]
fn api_failure_fails_every_resource_method() {
    let dir = tempfile::tempdir().unwrap();
    let store = store();
    let client = AcsClient::connect(config(&dir), Scripted::new(&[LOGIN_OK], BAD_KEY), store.clone()).unwrap();
    let before = store.get(SESSION_KEY).unwrap();
    let cookies_before = client.cookie_jar().cookies().unwrap();

    let results = [
        client.users_query(&Params::new()).map(|_| ()),
        client.users_search(&Params::new().set("q", "x")).map(|_| ()),
        client.users_show(["1", "2"]).map(|_| ()),
        client.users_show("1").map(|_| ()),
        client
            .push_notification_notify("ch1", &json!({"a": 1}), None, None)
            .map(|_| ()),
    ];
    for result in results {
        match result {
            Err(AcsError::Api { message, .. }) => assert_eq!(message, "bad key"),
            other => panic!("expected Api error, got {other:?}"),
        }
    }
    assert_eq!(store.get(SESSION_KEY).unwrap(), before);
    assert_eq!(client.cookie_jar().cookies().unwrap(), cookies_before);
    assert_eq!(client.current_user().unwrap().id, "u1");
}

#[test]
fn continue_preamble_decodes_like_plain_response() {
    let body = r#"{"meta":{"status":"ok"},"response":{"users":[{"id":"u2","username":"alice"}]}}"#;
    let plain = format!("HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{body}");
    let continued = format!("HTTP/1.1 100 Continue\r\n\r\n{plain}");

    let dir = tempfile::tempdir().unwrap();
    let client = AcsClient::connect(
        config(&dir),
        Scripted::new(&[LOGIN_OK, plain.as_str(), continued.as_str()], ""),
        store(),
    )
    .unwrap();

    let a = client.users_query(&Params::new()).unwrap();
    let b = client.users_query(&Params::new()).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.response().unwrap().users[0].id, "u2");
    let expected: Envelope<UsersResponse> = RawEnvelope::decode(body).unwrap().typed().unwrap();
    assert_eq!(a.body, expected);
}

#[test]
fn store_written_once_per_fresh_client() {
    #[derive(Default)]
    struct Counting {
        inner: MemorySessionStore,
        gets: std::sync::atomic::AtomicUsize,
        puts: std::sync::atomic::AtomicUsize,
    }
    impl SessionStore for Counting {
        fn get(&self, key: &str) -> Option<Session> {
            self.gets.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.get(key)
        }
        fn put(&self, key: &str, session: Session) -> acs_core::Result<()> {
            self.puts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.put(key, session)
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Counting::default());
    let client = AcsClient::connect(config(&dir), Scripted::new(&[LOGIN_OK], ""), store.clone()).unwrap();
    client.users_query(&Params::new()).ok();
    assert_eq!(store.gets.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(store.puts.load(std::sync::atomic::Ordering::SeqCst), 1);
}
