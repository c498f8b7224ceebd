//! Request-scoped state threaded through every engine call.
//!
//! One external request owns one [`RequestContext`]. It carries the current
//! hosted entity, the HTTP input, the internal message store used by the
//! Internal binding, and the output produced by a sender.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::message::Message;

/// The HTTP input of the current request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpInput {
    query: String,
    form: Vec<(String, String)>,
}

impl HttpInput {
    /// Creates an empty input.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an input from a raw query string, without the leading `?`.
    #[must_use]
    pub fn from_query(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            form: Vec::new(),
        }
    }

    /// Creates an input from decoded form fields.
    #[must_use]
    pub fn from_form<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            query: String::new(),
            form: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Adds decoded form fields, builder style.
    #[must_use]
    pub fn with_form<K, V>(mut self, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.form
            .extend(fields.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Returns the raw query string.
    #[must_use]
    pub fn raw_query(&self) -> &str {
        &self.query
    }

    /// Returns a query parameter exactly as it appeared on the wire.
    #[must_use]
    pub fn raw_query_param(&self, name: &str) -> Option<&str> {
        self.query
            .split('&')
            .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }

    /// Returns a percent-decoded query parameter.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<String> {
        url::form_urlencoded::parse(self.query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    /// Returns a form field.
    #[must_use]
    pub fn form_param(&self, name: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// What a sender produced for the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutput {
    /// Redirect the user agent.
    Redirect {
        /// Target URL including the query string.
        location: String,
    },
    /// Serve an HTML page.
    Html {
        /// The rendered page.
        body: String,
    },
}

/// Messages handed from an Internal send to a later receive.
#[derive(Debug, Clone, Default)]
pub struct InternalStore {
    messages: HashMap<String, Message>,
}

impl InternalStore {
    /// Stores a message under its parameter name, replacing an earlier one.
    pub fn insert(&mut self, param_name: impl Into<String>, message: Message) {
        self.messages.insert(param_name.into(), message);
    }

    /// Returns the message stored under a parameter name.
    #[must_use]
    pub fn get(&self, param_name: &str) -> Option<&Message> {
        self.messages.get(param_name)
    }

    /// Removes and returns the message stored under a parameter name.
    pub fn remove(&mut self, param_name: &str) -> Option<Message> {
        self.messages.remove(param_name)
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// State of one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Code of the hosted entity acting for this request.
    pub hosted_entity: String,
    /// Remote IdP selector taken from an internal destination.
    pub remote_idp: Option<String>,
    /// HTTP input.
    pub input: HttpInput,
    /// Internal binding store.
    pub internal: InternalStore,
    /// Instant timing validation is evaluated at.
    pub now: DateTime<Utc>,
    /// Output of the last sender, for the HTTP layer.
    pub output: Option<ResponseOutput>,
}

impl RequestContext {
    /// Creates a context for the given hosted entity and input.
    #[must_use]
    pub fn new(hosted_entity: impl Into<String>, input: HttpInput) -> Self {
        Self {
            hosted_entity: hosted_entity.into(),
            remote_idp: None,
            input,
            internal: InternalStore::default(),
            now: Utc::now(),
            output: None,
        }
    }

    /// Fixes the evaluation instant, builder style.
    #[must_use]
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Switches the acting hosted entity.
    pub fn set_current_entity(&mut self, code: impl Into<String>, remote_idp: Option<String>) {
        self.hosted_entity = code.into();
        self.remote_idp = remote_idp;
    }
}
