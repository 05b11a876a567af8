//! The request model.
//!
//! A [`Request`] is the immutable description of one call (verb, target,
//! query parameters, headers, sealed body) plus the little mutable state the
//! pipeline tracks while it is in flight. It is owned by exactly one pipeline
//! call for its whole life and rebuilt into a fresh [`PreparedRequest`] on
//! every send attempt.
//!
//! ## Query strings
//!
//! Each `key=value` pair is passed whole through
//! [`PayloadCipher::encrypt_query`], percent-escaped (everything outside the
//! RFC 3986 unreserved set, `=` included), and the pairs are joined with `&`
//! behind a leading `?`:
//!
//! ```text
//! {"a": "1", "b": "x y"}  ──▶  ?a%3D1&b%3Dx%20y
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::{Method, PayloadCipher, PreparedRequest, RequestId, WireFormat};

/// Characters escaped in query segments: everything but `A-Z a-z 0-9 - _ . ~`.
const QUERY_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Supplies key/value pairs that are merged into every send attempt.
pub type DefaultsProvider = Arc<dyn Fn() -> Vec<(String, String)> + Send + Sync>;

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

/// Ordered query parameters with unique keys.
///
/// Iteration order is insertion order. Inserting an existing key replaces its
/// value in place, so the wire output stays deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl fmt::Display) {
        let key = key.into();
        let value = value.to_string();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Builds the encoded query string, including the leading `?`.
    ///
    /// Returns an empty string when there are no parameters.
    pub fn encode(&self, cipher: &dyn PayloadCipher) -> String {
        let mut query = String::new();
        for (i, (key, value)) in self.0.iter().enumerate() {
            query.push(if i == 0 { '?' } else { '&' });
            let pair = cipher.encrypt_query(&format!("{key}={value}"));
            query.extend(utf8_percent_encode(&pair, QUERY_SEGMENT));
        }
        query
    }
}

impl<K: Into<String>, V: fmt::Display> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// Joins a base URL and a path with exactly one `/` between them.
pub fn combine_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{path}")
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Providers evaluated on every send attempt.
#[derive(Clone, Default)]
pub struct RequestDefaults {
    /// Always-present headers; request headers override them.
    pub headers: Option<DefaultsProvider>,
    /// Always-present query parameters; request parameters override them.
    pub url_params: Option<DefaultsProvider>,
}

impl fmt::Debug for RequestDefaults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDefaults")
            .field("headers", &self.headers.is_some())
            .field("url_params", &self.url_params.is_some())
            .finish()
    }
}

/// One described network call and its in-flight state.
#[derive(Debug, Clone)]
pub struct Request {
    id: RequestId,
    method: Method,
    base_url: String,
    path: String,
    resolved_url: Option<String>,
    headers: BTreeMap<String, String>,
    url_params: QueryParams,
    format: WireFormat,
    compress: bool,
    timeout: Duration,
    body: Option<Vec<u8>>,
    connecting: bool,
    attempts: u32,
}

impl Request {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        method: Method,
        base_url: &str,
        path: &str,
        headers: BTreeMap<String, String>,
        url_params: QueryParams,
        format: WireFormat,
        compress: bool,
        timeout: Duration,
        body: Option<Vec<u8>>,
    ) -> Self {
        Self {
            id: RequestId::new_random(),
            method,
            base_url: base_url.to_string(),
            path: path.to_string(),
            resolved_url: None,
            headers,
            url_params,
            format,
            compress,
            timeout,
            body,
            connecting: false,
            attempts: 0,
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// URL of the most recent send attempt, query string included.
    pub fn resolved_url(&self) -> Option<&str> {
        self.resolved_url.as_deref()
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn url_params(&self) -> &QueryParams {
        &self.url_params
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    pub fn compress(&self) -> bool {
        self.compress
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// `true` while an exchange for this request is in progress.
    pub fn is_connecting(&self) -> bool {
        self.connecting
    }

    /// Number of send attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub(crate) fn set_connecting(&mut self, connecting: bool) {
        self.connecting = connecting;
    }

    /// Builds the exchange for the next send attempt.
    ///
    /// Default providers are evaluated here, so values such as timestamps or
    /// nonces are fresh on every retry.
    pub(crate) fn prepare(
        &mut self,
        defaults: &RequestDefaults,
        cipher: &dyn PayloadCipher,
    ) -> PreparedRequest {
        let mut params: QueryParams = defaults
            .url_params
            .as_ref()
            .map(|provider| provider().into_iter().collect())
            .unwrap_or_default();
        for (key, value) in self.url_params.iter() {
            params.insert(key, value);
        }

        let mut headers: BTreeMap<String, String> = defaults
            .headers
            .as_ref()
            .map(|provider| provider().into_iter().collect())
            .unwrap_or_default();
        headers.extend(self.headers.clone());

        let url = format!(
            "{}{}",
            combine_url(&self.base_url, &self.path),
            params.encode(cipher)
        );

        self.resolved_url = Some(url.clone());
        self.attempts += 1;

        PreparedRequest {
            id: self.id,
            method: self.method,
            url,
            headers: headers
                .into_iter()
                .map(|(k, v)| {
                    (
                        k.trim_end_matches('\0').to_string(),
                        v.trim_end_matches('\0').to_string(),
                    )
                })
                .collect(),
            body: self.body.clone(),
            timeout: self.timeout,
        }
    }
}
