//! Shared Key authorization for the Azure Blob service.
//!
//! Every request is signed with an HMAC-SHA256 over a canonical representation of the request,
//! keyed with the storage account key. See
//! <https://learn.microsoft.com/en-us/rest/api/storageservices/authorize-with-shared-key>.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use reqwest::Method;
use sha2::Sha256;

use crate::Result;

/// The Blob service REST API version sent with every request.
pub(crate) const API_VERSION: &str = "2021-08-06";

/// Prefix of the headers that take part in the canonicalized headers.
const MS_HEADER_PREFIX: &str = "x-ms-";

/// The parts of a request that the Shared Key signature covers.
#[derive(Debug)]
pub(crate) struct CanonicalRequest<'a> {
    pub method: &'a Method,
    /// The percent-encoded URL path, starting with `/`.
    pub path: &'a str,
    pub query: &'a [(&'a str, String)],
    pub headers: &'a [(&'static str, String)],
    pub content_length: u64,
}

impl CanonicalRequest<'_> {
    /// Builds the string-to-sign for the given storage account.
    ///
    /// Only `Content-Length` and the `x-ms-*` headers are populated, as the client never sends any
    /// of the other standard headers.
    pub fn string_to_sign(&self, account: &str) -> String {
        // Since version 2015-02-21 a zero length must be signed as an empty string.
        let content_length = match self.content_length {
            0 => String::new(),
            len => len.to_string(),
        };

        let mut signed = format!("{}\n\n\n{content_length}\n\n\n\n\n\n\n\n\n", self.method);

        let mut headers: Vec<_> = self
            .headers
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value.trim()))
            .filter(|(name, _)| name.starts_with(MS_HEADER_PREFIX))
            .collect();
        headers.sort();
        for (name, value) in headers {
            signed.push_str(&name);
            signed.push(':');
            signed.push_str(value);
            signed.push('\n');
        }

        signed.push('/');
        signed.push_str(account);
        signed.push_str(self.path);

        let mut query: Vec<_> = self
            .query
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value.as_str()))
            .collect();
        query.sort();
        for (name, value) in query {
            signed.push('\n');
            signed.push_str(&name);
            signed.push(':');
            signed.push_str(value);
        }

        signed
    }
}

/// A storage account name together with its decoded account key.
#[derive(Clone)]
pub(crate) struct SharedKey {
    account: String,
    key: Vec<u8>,
}

impl SharedKey {
    /// Creates a new credential from the base64-encoded account key.
    pub fn new(account: &str, key: &str) -> Result<Self> {
        Ok(Self {
            account: account.to_owned(),
            key: STANDARD.decode(key.trim())?,
        })
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// Returns the value of the `Authorization` header for the given request.
    pub fn authorization(&self, request: &CanonicalRequest<'_>) -> String {
        let signature = self.sign(&request.string_to_sign(&self.account));
        format!("SharedKey {}:{signature}", self.account)
    }

    fn sign(&self, string_to_sign: &str) -> String {
        let mut mac =
            Hmac::<Sha256>::new_from_slice(&self.key).expect("HMAC accepts keys of any length");
        mac.update(string_to_sign.as_bytes());
        STANDARD.encode(mac.finalize().into_bytes())
    }
}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedKey")
            .field("account", &self.account)
            .field("key", &"[redacted]")
            .finish()
    }
}
