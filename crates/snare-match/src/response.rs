//! HTTP response matching.
//!
//! Status, reason, headers and body are compared independently, each with its
//! own inversion flag, and their captures are merged.

use crate::adapter::match_json;
use crate::condition::{Condition, Conditions};
use crate::error::{invert, labelled, MatchError};
use crate::flow::match_value;
use crate::text::match_text;
use crate::value::{Captures, Value};
use serde::Deserialize;
use serde_json::{json, Map, Value as Json};
use std::fmt;

/// Accepted JSON layout, shown when parsing fails.
pub const RESPONSE_FORMAT: &str = r#"{
  "status": 200,
  "reason": "OK",
  "headers": [{"Content-Type": "application/json"}],
  "body": <any JSON value, or a string holding text, JSON or XML>
}"#;

/// A response-like record. Absent expected fields are not compared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpResponse {
    pub status: Option<String>,
    pub reason: Option<String>,
    pub headers: Option<Vec<(String, String)>>,
    pub body: Option<Value>,
}

/// Wire form accepting a numeric or textual status and single-entry header objects.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct HttpResponseRaw {
    #[serde(default, deserialize_with = "deserialize_status")]
    status: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default, deserialize_with = "deserialize_headers")]
    headers: Option<Vec<(String, String)>>,
    #[serde(default)]
    body: Option<Json>,
}

/// Deserialize a status from either a number or a string
fn deserialize_status<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    match Json::deserialize(deserializer)? {
        Json::Null => Ok(None),
        Json::Number(n) => Ok(Some(n.to_string())),
        Json::String(s) => Ok(Some(s)),
        other => Err(D::Error::custom(format!(
            "status must be a number or string, got {}",
            other
        ))),
    }
}

/// Deserialize headers from an array of single-entry objects
fn deserialize_headers<'de, D>(deserializer: D) -> Result<Option<Vec<(String, String)>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let entries = match Json::deserialize(deserializer)? {
        Json::Null => return Ok(None),
        Json::Array(entries) => entries,
        other => {
            return Err(D::Error::custom(format!(
                "headers must be an array of single-entry objects, got {}",
                other
            )))
        }
    };
    let mut headers = Vec::with_capacity(entries.len());
    for entry in entries {
        let pair = match entry {
            Json::Object(map) if map.len() == 1 => map.into_iter().next(),
            _ => None,
        };
        match pair {
            Some((name, Json::String(value))) => headers.push((name, value)),
            Some((name, value @ (Json::Number(_) | Json::Bool(_)))) => {
                headers.push((name, value.to_string()))
            }
            _ => {
                return Err(D::Error::custom(
                    "each header must be an object with exactly one string, number or boolean value",
                ))
            }
        }
    }
    Ok(Some(headers))
}

impl From<HttpResponseRaw> for HttpResponse {
    fn from(raw: HttpResponseRaw) -> Self {
        HttpResponse {
            status: raw.status,
            reason: raw.reason,
            headers: raw.headers,
            body: raw.body.map(|body| match body {
                Json::String(text) => Value::Text(text),
                other => Value::Json(other),
            }),
        }
    }
}

impl HttpResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: impl ToString) -> Self {
        self.status = Some(status.to_string());
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(Vec::new)
            .push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Value>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Parse the JSON layout described by [`RESPONSE_FORMAT`].
    pub fn from_json(text: &str) -> Result<HttpResponse, MatchError> {
        let json: Json = serde_json::from_str(text).map_err(|e| invalid_format(&e))?;
        Self::from_json_value(json)
    }

    pub fn from_json_value(json: Json) -> Result<HttpResponse, MatchError> {
        let raw: HttpResponseRaw = serde_json::from_value(json).map_err(|e| invalid_format(&e))?;
        Ok(raw.into())
    }

    /// Headers as a JSON array of single-entry objects.
    pub fn headers_json(&self) -> Json {
        let entries = self
            .headers
            .iter()
            .flatten()
            .map(|(name, value)| {
                let mut entry = Map::new();
                entry.insert(name.clone(), Json::String(value.clone()));
                Json::Object(entry)
            })
            .collect();
        Json::Array(entries)
    }

    pub fn to_json(&self) -> Json {
        let mut out = Map::new();
        if let Some(status) = &self.status {
            let status = status
                .parse::<u16>()
                .map(Json::from)
                .unwrap_or_else(|_| Json::String(status.clone()));
            out.insert("status".to_string(), status);
        }
        if let Some(reason) = &self.reason {
            out.insert("reason".to_string(), json!(reason));
        }
        if self.headers.is_some() {
            out.insert("headers".to_string(), self.headers_json());
        }
        if let Some(body) = &self.body {
            let body = match body {
                Value::Json(json) => json.clone(),
                Value::Null => Json::Null,
                other => Json::String(other.to_text()),
            };
            out.insert("body".to_string(), body);
        }
        Json::Object(out)
    }
}

fn invalid_format(error: &dyn fmt::Display) -> MatchError {
    MatchError::InvalidRepresentation(format!(
        "invalid HTTP response: {}\nExpected format:\n{}",
        error, RESPONSE_FORMAT
    ))
}

impl fmt::Display for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<HttpResponse> for Value {
    fn from(response: HttpResponse) -> Self {
        Value::Json(response.to_json())
    }
}

/// Apply a field-level inversion flag to a field outcome.
fn field_outcome(
    outcome: Result<Captures, MatchError>,
    inverted: bool,
    message: Option<&str>,
    field: &str,
    expected: &dyn fmt::Display,
    actual: &dyn fmt::Display,
) -> Result<Captures, MatchError> {
    if !inverted {
        return outcome;
    }
    invert(outcome, || {
        MatchError::mismatch(
            labelled(message, &format!("HTTP Response {} match!", field)),
            expected.to_string(),
            actual.to_string(),
        )
    })
}

/// Match an actual response against an expected one.
///
/// The global `Condition::Invert` is ignored; use the `Not*` flags to invert
/// individual fields.
pub fn match_http_response(
    message: Option<&str>,
    expected: &HttpResponse,
    actual: &HttpResponse,
    conditions: &Conditions,
) -> Result<Captures, MatchError> {
    let conditions = conditions.without(&[Condition::Invert]);
    let field_conditions = conditions.without(&Condition::RESPONSE_SCOPED);
    let mut captures = Captures::new();

    if let Some(status) = &expected.status {
        let label = labelled(message, "HTTP Response statuses do not match!");
        let expected_status = Value::from(status.as_str());
        let actual_status = Value::from(actual.status.clone());
        let outcome = match_text(Some(&label), &expected_status, &actual_status, &field_conditions);
        captures.extend(field_outcome(
            outcome,
            conditions.contains(Condition::NotStatus),
            message,
            "statuses",
            &expected_status,
            &actual_status,
        )?);
    }

    if let Some(reason) = &expected.reason {
        let label = labelled(message, "HTTP Response reasons do not match!");
        let expected_reason = Value::from(reason.as_str());
        let actual_reason = Value::from(actual.reason.clone());
        let outcome = match_text(Some(&label), &expected_reason, &actual_reason, &field_conditions);
        captures.extend(field_outcome(
            outcome,
            conditions.contains(Condition::NotReason),
            message,
            "reasons",
            &expected_reason,
            &actual_reason,
        )?);
    }

    if expected.headers.is_some() {
        let label = labelled(message, "HTTP Response headers do not match!");
        let expected_headers = Value::Json(expected.headers_json());
        let actual_headers = Value::Json(actual.headers_json());
        let header_conditions = field_conditions.without(&Condition::JSON_STRUCTURE);
        let outcome = match_json(Some(&label), &expected_headers, &actual_headers, &header_conditions);
        captures.extend(field_outcome(
            outcome,
            conditions.contains(Condition::NotHeaders),
            message,
            "headers",
            &expected_headers,
            &actual_headers,
        )?);
    }

    if let Some(body) = &expected.body {
        let label = labelled(message, "HTTP Response bodies do not match!");
        let actual_body = actual.body.clone().unwrap_or_default();
        let outcome = match_value(Some(&label), body, &actual_body, &field_conditions);
        captures.extend(field_outcome(
            outcome,
            conditions.contains(Condition::NotBody),
            message,
            "bodies",
            body,
            &actual_body,
        )?);
    }

    Ok(captures)
}
