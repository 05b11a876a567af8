//! Payload encryption hooks.
//!
//! A deployment supplies a [`PayloadCipher`] to protect query strings,
//! request bodies, and response bodies. The pipeline calls it at fixed points:
//!
//! - each `key=value` query pair goes through [`PayloadCipher::encrypt_query`]
//!   before percent-escaping;
//! - the serialised (and possibly compressed) body goes through
//!   [`PayloadCipher::encrypt_body`] last;
//! - raw response bytes go through [`PayloadCipher::decrypt_response`] first.

use crate::PipelineError;

/// Encryption hooks applied to every request and response.
pub trait PayloadCipher: Send + Sync {
    /// Transforms one `key=value` query pair.
    fn encrypt_query(&self, query: &str) -> String;

    /// Transforms the outgoing body after serialisation and compression.
    fn encrypt_body(&self, body: Vec<u8>) -> Result<Vec<u8>, PipelineError>;

    /// Transforms the incoming body before decompression and deserialisation.
    fn decrypt_response(&self, body: Vec<u8>) -> Result<Vec<u8>, PipelineError>;
}

/// A [`PayloadCipher`] that leaves everything untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainText;

impl PayloadCipher for PlainText {
    fn encrypt_query(&self, query: &str) -> String {
        query.to_string()
    }

    fn encrypt_body(&self, body: Vec<u8>) -> Result<Vec<u8>, PipelineError> {
        Ok(body)
    }

    fn decrypt_response(&self, body: Vec<u8>) -> Result<Vec<u8>, PipelineError> {
        Ok(body)
    }
}
