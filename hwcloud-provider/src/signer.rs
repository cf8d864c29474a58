//! AK/SK request signing (SDK-HMAC-SHA256)

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha2::{Digest, Sha256};
use url::Url;

pub const ALGORITHM: &str = "SDK-HMAC-SHA256";
pub const HEADER_DATE: &str = "X-Sdk-Date";
const DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

type HmacSha256 = Hmac<Sha256>;

/// Signs requests with an access key pair
#[derive(Clone)]
pub struct Signer {
    access_key: String,
    secret_key: String,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("access_key", &self.access_key)
            .finish_non_exhaustive()
    }
}

impl Signer {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Sign a request
    ///
    /// `headers` must already contain every header that will be sent except
    /// `Host` and `X-Sdk-Date`, which are added here. Returns the value of
    /// the `Authorization` header.
    pub fn sign(
        &self,
        method: &str,
        url: &Url,
        headers: &mut BTreeMap<String, String>,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> String {
        let date = now.format(DATE_FORMAT).to_string();
        headers.insert(HEADER_DATE.to_string(), date.clone());
        if !headers.keys().any(|k| k.eq_ignore_ascii_case("host")) {
            headers.insert("Host".to_string(), host_header(url));
        }

        let signed = signed_headers(headers);
        let canonical = canonical_request(method, url, headers, &signed, body);
        let string_to_sign = format!(
            "{}\n{}\n{}",
            ALGORITHM,
            date,
            hex::encode(Sha256::digest(canonical.as_bytes()))
        );
        let signature = self.signature(&string_to_sign);

        format!(
            "{} Access={}, SignedHeaders={}, Signature={}",
            ALGORITHM,
            self.access_key,
            signed.join(";"),
            signature
        )
    }

    fn signature(&self, string_to_sign: &str) -> String {
        // HMAC accepts keys of any length
        let mut mac = match HmacSha256::new_from_slice(self.secret_key.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return String::new(),
        };
        mac.update(string_to_sign.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

fn signed_headers(headers: &BTreeMap<String, String>) -> Vec<String> {
    let mut names: Vec<String> = headers.keys().map(|k| k.to_ascii_lowercase()).collect();
    names.sort();
    names.dedup();
    names
}

fn canonical_request(
    method: &str,
    url: &Url,
    headers: &BTreeMap<String, String>,
    signed: &[String],
    body: &[u8],
) -> String {
    let lowered: BTreeMap<String, &str> = headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.trim()))
        .collect();
    let canonical_headers: String = signed
        .iter()
        .map(|name| format!("{}:{}\n", name, lowered.get(name).copied().unwrap_or_default()))
        .collect();

    format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method.to_ascii_uppercase(),
        canonical_uri(url),
        canonical_query(url),
        canonical_headers,
        signed.join(";"),
        hex::encode(Sha256::digest(body))
    )
}

fn canonical_uri(url: &Url) -> String {
    let path = url.path();
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    }
}

fn canonical_query(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (escape(&k), escape(&v)))
        .collect();
    pairs.sort();
    pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// RFC 3986 unreserved characters stay as they are
const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn escape(input: &str) -> String {
    utf8_percent_encode(input, UNRESERVED).to_string()
}
