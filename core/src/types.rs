//! Wire types for the ACS API.
//!
//! # Design
//! Every ACS response is a `{meta, response}` envelope. `Envelope<T>` models
//! it generically; `Status` turns the stringly `meta.status` into a
//! discriminated value so the `ok` / failure split is checked once, in
//! `Envelope::into_result`, rather than probed by every caller.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AcsError, Result};

/// Outcome reported in `meta.status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Status {
    Ok,
    /// Any status other than the literal `"ok"`.
    Failed(String),
}

impl From<String> for Status {
    fn from(s: String) -> Self {
        if s == "ok" {
            Status::Ok
        } else {
            Status::Failed(s)
        }
    }
}

impl From<Status> for String {
    fn from(status: Status) -> Self {
        match status {
            Status::Ok => "ok".to_string(),
            Status::Failed(s) => s,
        }
    }
}

/// The `meta` object of an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_name: Option<String>,
}

/// An envelope whose payload has not been given a type yet.
pub type RawEnvelope = Envelope<Value>;

/// A decoded `{meta, response}` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub meta: Meta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<T>,
}

impl RawEnvelope {
    /// Parse a response body without committing to a payload shape.
    pub fn decode(body: &str) -> Result<Self> {
        serde_json::from_str(body).map_err(|e| AcsError::Deserialization(e.to_string()))
    }

    /// Decode the payload into its endpoint-specific type.
    pub fn typed<T: DeserializeOwned>(self) -> Result<Envelope<T>> {
        let response = self
            .response
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| AcsError::Deserialization(e.to_string()))?;
        Ok(Envelope {
            meta: self.meta,
            response,
        })
    }
}

impl<T> Envelope<T> {
    pub fn is_ok(&self) -> bool {
        self.meta.status == Status::Ok
    }

    /// `Err(Api)` unless `meta.status` is `"ok"`.
    pub fn into_result(self) -> Result<Self> {
        if let Status::Failed(status) = &self.meta.status {
            return Err(AcsError::Api {
                code: self.meta.code,
                message: self.meta.message.clone().unwrap_or_else(|| status.clone()),
            });
        }
        Ok(self)
    }
}

/// What a resource operation hands back.
///
/// `headers` is only populated when the client is configured to return them.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply<T> {
    pub headers: Option<Vec<(String, String)>>,
    pub body: Envelope<T>,
}

impl<T> Reply<T> {
    pub fn response(&self) -> Option<&T> {
        self.body.response.as_ref()
    }

    pub fn into_response(self) -> Option<T> {
        self.body.response
    }
}

/// An ACS user record.
///
/// Fields the client does not name are kept in `extra`, so a stored record
/// serializes back to what the server sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload of the `users/*` endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsersResponse {
    #[serde(default)]
    pub users: Vec<User>,
}

/// Argument of `users_show`: one id or a collection of ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserIds {
    One(String),
    Many(Vec<String>),
}

impl From<&str> for UserIds {
    fn from(id: &str) -> Self {
        UserIds::One(id.to_string())
    }
}

impl From<String> for UserIds {
    fn from(id: String) -> Self {
        UserIds::One(id)
    }
}

impl From<Vec<String>> for UserIds {
    fn from(ids: Vec<String>) -> Self {
        UserIds::Many(ids)
    }
}

impl From<Vec<&str>> for UserIds {
    fn from(ids: Vec<&str>) -> Self {
        UserIds::Many(ids.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for UserIds {
    fn from(ids: &[&str]) -> Self {
        UserIds::Many(ids.iter().map(|id| id.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for UserIds {
    fn from(ids: [&str; N]) -> Self {
        UserIds::Many(ids.iter().map(|id| id.to_string()).collect())
    }
}
