//! Payload codec integration.
//!
//! [`PayloadCodec`] binds a [`WireFormat`] and a compression flag once, when
//! the pipeline is built, and then applies the fixed payload pipeline:
//!
//! ```text
//! outgoing:  serialize ─▶ [gzip] ─▶ encrypt_body
//! incoming:  decrypt_response ─▶ [gunzip] ─▶ deserialize
//! ```
//!
//! JSON is handled by `serde_json`; the compact binary format by `bincode`
//! in serde mode with its standard configuration. Compression is gzip via
//! `flate2` for both formats.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{PayloadCipher, PipelineError, WireFormat};

/// Compresses `data` with gzip.
pub fn compress(data: &[u8]) -> Result<Vec<u8>, PipelineError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| PipelineError::Compression(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| PipelineError::Compression(e.to_string()))
}

/// Reverses [`compress`].
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, PipelineError> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| PipelineError::Compression(e.to_string()))?;
    Ok(out)
}

/// Serialises and deserialises payloads for one wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadCodec {
    format: WireFormat,
    compress: bool,
}

impl PayloadCodec {
    pub fn new(format: WireFormat, compress: bool) -> Self {
        Self { format, compress }
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    pub fn compresses(&self) -> bool {
        self.compress
    }

    /// Serialises `content` and compresses it if enabled.
    pub fn encode<C>(&self, content: &C) -> Result<Vec<u8>, PipelineError>
    where
        C: Serialize + ?Sized,
    {
        let bytes = match self.format {
            WireFormat::Json => serde_json::to_vec(content).map_err(|e| PipelineError::Encode {
                format: self.format.as_str(),
                message: e.to_string(),
            })?,
            WireFormat::BinaryPack => {
                bincode::serde::encode_to_vec(content, bincode::config::standard()).map_err(|e| {
                    PipelineError::Encode {
                        format: self.format.as_str(),
                        message: e.to_string(),
                    }
                })?
            }
        };

        if self.compress {
            compress(&bytes)
        } else {
            Ok(bytes)
        }
    }

    /// Decompresses (if enabled) and deserialises `bytes`.
    ///
    /// Returns `Ok(None)` when there is nothing to decode.
    pub fn decode<T>(&self, bytes: &[u8]) -> Result<Option<T>, PipelineError>
    where
        T: DeserializeOwned,
    {
        if bytes.is_empty() {
            return Ok(None);
        }

        let decompressed;
        let bytes = if self.compress {
            decompressed = decompress(bytes)?;
            decompressed.as_slice()
        } else {
            bytes
        };

        if bytes.is_empty() {
            return Ok(None);
        }

        let value = match self.format {
            WireFormat::Json => serde_json::from_slice(bytes).map_err(|e| PipelineError::Decode {
                format: self.format.as_str(),
                message: e.to_string(),
            })?,
            WireFormat::BinaryPack => {
                let (value, _read) =
                    bincode::serde::decode_from_slice(bytes, bincode::config::standard()).map_err(
                        |e| PipelineError::Decode {
                            format: self.format.as_str(),
                            message: e.to_string(),
                        },
                    )?;
                value
            }
        };
        Ok(Some(value))
    }

    /// Produces the upload payload: serialise, compress, then encrypt.
    pub fn seal_body<C>(
        &self,
        content: &C,
        cipher: &dyn PayloadCipher,
    ) -> Result<Vec<u8>, PipelineError>
    where
        C: Serialize + ?Sized,
    {
        cipher.encrypt_body(self.encode(content)?)
    }

    /// Reads a response payload: decrypt, decompress, then deserialise.
    ///
    /// Empty response bytes short-circuit to `Ok(None)` without touching the
    /// cipher.
    pub fn open_response<T>(
        &self,
        bytes: Vec<u8>,
        cipher: &dyn PayloadCipher,
    ) -> Result<Option<T>, PipelineError>
    where
        T: DeserializeOwned,
    {
        if bytes.is_empty() {
            return Ok(None);
        }
        let plain = cipher.decrypt_response(bytes).map_err(|e| match e {
            PipelineError::Cipher(message) => PipelineError::Decrypt(message),
            other => other,
        })?;
        self.decode(&plain)
    }
}
