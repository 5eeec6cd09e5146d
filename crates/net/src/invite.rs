//! Session join links
//!
//! Link format: `<base url>?session=<percent-encoded session id>`
//!
//! A parsed link only supplies the session id to pre-fill the join
//! prompt; connecting is always a separate step.

use std::str::FromStr;

use crate::error::{Error, Result};

const SESSION_PARAM: &str = "session";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinLink {
    pub base_url: String,
    pub session_id: String,
}

impl JoinLink {
    pub fn new(base_url: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            session_id: session_id.into(),
        }
    }

    /// Format as URL string
    pub fn to_url(&self) -> String {
        let base = self.base_url.split('?').next().unwrap_or_default();
        format!(
            "{}?{}={}",
            base,
            SESSION_PARAM,
            percent_encode(&self.session_id)
        )
    }

    /// Parse a full link
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (base, query) = s
            .split_once('?')
            .ok_or_else(|| Error::Protocol("Invalid join link: missing query".into()))?;
        let query = query.split('#').next().unwrap_or_default();

        let raw = query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == SESSION_PARAM)
            .map(|(_, value)| value)
            .ok_or_else(|| Error::Protocol("Invalid join link: no session parameter".into()))?;

        let session_id = percent_decode(raw)?;
        if session_id.is_empty() {
            return Err(Error::Protocol("Invalid join link: empty session".into()));
        }

        Ok(Self {
            base_url: base.to_string(),
            session_id,
        })
    }

    /// Session id from either a full link or a bare id
    pub fn session_from_input(input: &str) -> Result<String> {
        let input = input.trim();
        if input.contains('?') {
            return Self::parse(input).map(|link| link.session_id);
        }
        if input.is_empty() {
            return Err(Error::Protocol("Empty session id".into()));
        }
        Ok(input.to_string())
    }
}

impl std::fmt::Display for JoinLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_url())
    }
}

impl FromStr for JoinLink {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Escape everything outside the URL unreserved set
fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

fn percent_decode(s: &str) -> Result<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = bytes
                    .get(i + 1..i + 3)
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| Error::Protocol(format!("Invalid escape in '{}'", s)))?;
                out.push(hex);
                i += 3;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8(out).map_err(|_| Error::Protocol(format!("Invalid UTF-8 in '{}'", s)))
}
