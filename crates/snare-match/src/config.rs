//! Declarative assertions loaded from YAML or JSON files.
//!
//! ```yaml
//! assertions:
//!   - name: order created
//!     kind: json
//!     expected: { id: "~[order_id]", status: "created|pending" }
//!     conditions: [object-closed]
//!     poll: { duration_ms: 10000, interval_ms: 500, backoff: 1.5 }
//! ```

use crate::adapter::{match_json, match_xml};
use crate::condition::{Condition, Conditions};
use crate::error::MatchError;
use crate::flow::match_value;
use crate::polling::{poll_until_match, Poller};
use crate::response::{match_http_response, HttpResponse};
use crate::text::match_text;
use crate::value::{Captures, Value};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Retry settings for an assertion.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PollSettings {
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_backoff")]
    pub backoff: f64,
}

fn default_duration_ms() -> u64 {
    30_000
}

fn default_interval_ms() -> u64 {
    3_000
}

fn default_backoff() -> f64 {
    1.0
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            duration_ms: default_duration_ms(),
            interval_ms: default_interval_ms(),
            backoff: default_backoff(),
        }
    }
}

impl PollSettings {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.duration_ms == 0 {
            anyhow::bail!("poll.duration_ms must be greater than zero");
        }
        if self.interval_ms == 0 {
            anyhow::bail!("poll.interval_ms must be greater than zero");
        }
        if !self.backoff.is_finite() || self.backoff < 0.0 {
            anyhow::bail!(
                "poll.backoff must be a non-negative number, got {}",
                self.backoff
            );
        }
        Ok(())
    }
}

impl From<&PollSettings> for Poller {
    fn from(settings: &PollSettings) -> Self {
        Poller::new()
            .duration(Duration::from_millis(settings.duration_ms))
            .interval(Duration::from_millis(settings.interval_ms))
            .backoff(settings.backoff)
    }
}

/// Which matcher an assertion runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssertionKind {
    Text,
    Json,
    Xml,
    /// JSON, then XML, then text
    #[default]
    Any,
    HttpResponse,
}

impl std::str::FromStr for AssertionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(AssertionKind::Text),
            "json" => Ok(AssertionKind::Json),
            "xml" => Ok(AssertionKind::Xml),
            "any" => Ok(AssertionKind::Any),
            "http-response" | "http" | "response" => Ok(AssertionKind::HttpResponse),
            other => Err(format!(
                "unknown kind '{}', expected one of: text, json, xml, any, http-response",
                other
            )),
        }
    }
}

/// One expected pattern with its matching options.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Assertion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Label prefixed onto failure messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub kind: AssertionKind,
    pub expected: serde_json::Value,
    #[serde(default)]
    pub conditions: Conditions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll: Option<PollSettings>,
}

impl Assertion {
    /// Display name: the configured name or the assertion's position.
    pub fn label(&self, index: usize) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("assertion #{}", index + 1))
    }

    pub fn expected_value(&self) -> Value {
        Value::from_json_normalized(self.expected.clone())
    }

    pub fn expected_response(&self) -> Result<HttpResponse, MatchError> {
        HttpResponse::from_json_value(self.expected.clone())
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if let Some(poll) = &self.poll {
            poll.validate()?;
        }
        match self.kind {
            AssertionKind::HttpResponse => {
                self.expected_response()
                    .map_err(|e| anyhow::anyhow!("expected response does not parse: {}", e))?;
            }
            kind => {
                if let Some(flag) = self.conditions.iter().find(Condition::is_response_scoped) {
                    anyhow::bail!(
                        "condition '{}' only applies to http-response assertions, not {:?}",
                        flag,
                        kind
                    );
                }
            }
        }
        Ok(())
    }

    /// Run the assertion once against `actual`.
    pub fn evaluate(&self, actual: &Value) -> Result<Captures, MatchError> {
        let message = self.message.as_deref();
        let conditions = &self.conditions;
        match self.kind {
            AssertionKind::Text => match_text(message, &self.expected_value(), actual, conditions),
            AssertionKind::Json => match_json(message, &self.expected_value(), actual, conditions),
            AssertionKind::Xml => match_xml(message, &self.expected_value(), actual, conditions),
            AssertionKind::Any => match_value(message, &self.expected_value(), actual, conditions),
            AssertionKind::HttpResponse => {
                let expected = self.expected_response()?;
                let actual = response_from_value(actual)?;
                match_http_response(message, &expected, &actual, conditions)
            }
        }
    }

    /// Run the assertion against values from `supplier`, polling when configured.
    pub fn evaluate_with(
        &self,
        mut supplier: impl FnMut() -> Value,
    ) -> Result<Captures, MatchError> {
        match &self.poll {
            Some(settings) => {
                poll_until_match(&Poller::from(settings), supplier, |actual| self.evaluate(actual))
            }
            None => self.evaluate(&supplier()),
        }
    }
}

fn response_from_value(value: &Value) -> Result<HttpResponse, MatchError> {
    match value {
        Value::Text(text) => HttpResponse::from_json(text),
        Value::Json(json) => HttpResponse::from_json_value(json.clone()),
        other => Err(MatchError::InvalidRepresentation(format!(
            "a {} value is not an HTTP response",
            other.kind()
        ))),
    }
}

/// A file of assertions.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssertionFile {
    pub assertions: Vec<Assertion>,
}

impl AssertionFile {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_str(&contents)
    }

    /// Parse YAML (or JSON, which YAML accepts) and validate.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, anyhow::Error> {
        let file: AssertionFile = serde_yaml::from_str(contents)?;
        file.validate()?;
        Ok(file)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.assertions.is_empty() {
            anyhow::bail!("assertion file contains no assertions");
        }
        for (index, assertion) in self.assertions.iter().enumerate() {
            assertion
                .validate()
                .map_err(|e| anyhow::anyhow!("{}: {}", assertion.label(index), e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
assertions:
  - name: order created
    kind: json
    expected: { id: "~[order_id]", status: "created|pending" }
    conditions: [object-closed]
  - kind: http-response
    expected:
      status: 200
      headers:
        - Content-Type: application/json
    conditions: [not-body]
  - expected: "plain ~[word]"
    poll: { duration_ms: 500 }
"#;

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let loaded = AssertionFile::from_file(file.path()).unwrap();
        assert_eq!(loaded.assertions.len(), 3);
        assert_eq!(loaded.assertions[0].kind, AssertionKind::Json);
        assert!(loaded.assertions[0].conditions.contains(Condition::ObjectClosed));
        assert_eq!(loaded.assertions[2].kind, AssertionKind::Any);
        assert_eq!(loaded.assertions[2].label(2), "assertion #3");

        let poll = loaded.assertions[2].poll.as_ref().unwrap();
        assert_eq!(poll.duration_ms, 500);
        assert_eq!(poll.interval_ms, 3_000);
        assert_eq!(poll.backoff, 1.0);
    }

    #[test]
    fn test_evaluate_assertions() {
        let file = AssertionFile::from_str(SAMPLE).unwrap();

        let caps = file.assertions[0]
            .evaluate(&Value::from(r#"{"id": 12, "status": "pending"}"#))
            .unwrap();
        assert_eq!(caps["order_id"], Value::from("12"));
        assert!(file.assertions[0]
            .evaluate(&Value::from(r#"{"id": 12, "status": "pending", "x": 1}"#))
            .is_err());

        let response = r#"{"status": 200, "headers": [{"Content-Type": "application/json"}], "body": "x"}"#;
        assert!(file.assertions[1].evaluate(&Value::from(response)).is_ok());

        let caps = file.assertions[2].evaluate(&Value::from("plain text")).unwrap();
        assert_eq!(caps["word"], Value::from("text"));
    }

    #[test]
    fn test_evaluate_with_polling() {
        let assertion = Assertion {
            name: None,
            message: None,
            kind: AssertionKind::Text,
            expected: serde_json::json!("done"),
            conditions: Conditions::empty(),
            poll: Some(PollSettings {
                duration_ms: 500,
                interval_ms: 5,
                backoff: 1.0,
            }),
        };
        let mut calls = 0;
        let outcome = assertion.evaluate_with(|| {
            calls += 1;
            Value::from(if calls < 3 { "busy" } else { "done" })
        });
        assert!(outcome.is_ok());
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_validation_errors() {
        let err = AssertionFile::from_str("assertions: []").unwrap_err();
        assert!(err.to_string().contains("no assertions"));

        let err = AssertionFile::from_str(
            "assertions:\n  - name: bad poll\n    expected: x\n    poll: { interval_ms: 0 }\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("bad poll: poll.interval_ms"));

        let err = AssertionFile::from_str(
            "assertions:\n  - expected: x\n    conditions: [not-status]\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("only applies to http-response"));

        let err = AssertionFile::from_str(
            "assertions:\n  - kind: http-response\n    expected: { status: [1] }\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("expected response does not parse"));

        assert!(AssertionFile::from_str("assertions:\n  - expected: x\n    conditions: [nope]\n").is_err());
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("http".parse::<AssertionKind>(), Ok(AssertionKind::HttpResponse));
        assert_eq!("XML".parse::<AssertionKind>(), Ok(AssertionKind::Xml));
        assert!("yaml".parse::<AssertionKind>().is_err());
    }
}
