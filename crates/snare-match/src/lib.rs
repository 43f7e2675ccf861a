//! Snare: placeholder-aware matching of text, JSON, XML and HTTP responses.
//!
//! Expected values are patterns. Strings may be regular expressions and may
//! contain `~[name]` placeholders that capture the corresponding part of the
//! actual value. Structured documents are compared tree-wise, with a bounded
//! backtracking search when several actual nodes could satisfy the same
//! expected node. Every matcher returns the captured placeholder values on
//! success.
//!
//! ```ignore
//! use snare_match::{match_value, Conditions, Value};
//!
//! let captures = match_value(
//!     None,
//!     &Value::from(r#"{"id": "~[id]", "state": "done|ready"}"#),
//!     &Value::from(r#"{"id": 42, "state": "ready", "extra": true}"#),
//!     &Conditions::empty(),
//! )?;
//! assert_eq!(captures["id"], Value::from("42"));
//! ```

pub mod adapter;
pub mod condition;
pub mod config;
pub mod error;
pub mod flow;
pub mod pattern;
pub mod placeholder;
pub mod polling;
pub mod response;
pub mod text;
pub mod tree;
pub mod value;

pub use adapter::{match_json, match_xml};
pub use condition::{Condition, Conditions};
pub use config::{Assertion, AssertionFile, AssertionKind, PollSettings};
pub use error::MatchError;
pub use flow::match_value;
pub use polling::{
    poll_and_match, poll_and_match_http_response, poll_until_match, PollTimeout, Poller,
};
pub use response::{match_http_response, HttpResponse};
pub use text::match_text;
pub use tree::xml::XmlElement;
pub use value::{Captures, Value};
