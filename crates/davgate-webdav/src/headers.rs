//! Typed parsing for the WebDAV request headers.
//!
//! `Depth`, `Overwrite`, `Timeout`, `If`, `Lock-Token` and `Destination` all
//! arrive as free-form header text; everything past this module works with
//! the parsed forms only.

use crate::error::{DavError, DavResult};
use davgate_core::DavPath;
use http::HeaderMap;
use std::fmt;
use std::str::FromStr;

/// The `Depth` request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Zero,
    One,
    Infinity,
}

impl FromStr for Depth {
    type Err = DavError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "0" => Ok(Depth::Zero),
            "1" => Ok(Depth::One),
            s if s.eq_ignore_ascii_case("infinity") => Ok(Depth::Infinity),
            _ => Err(DavError::BadRequest),
        }
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Depth::Zero => f.write_str("0"),
            Depth::One => f.write_str("1"),
            Depth::Infinity => f.write_str("infinity"),
        }
    }
}

/// Parse `Depth`, falling back to `default` when the header is absent.
pub fn depth(headers: &HeaderMap, default: Depth) -> DavResult<Depth> {
    match header_str(headers, "depth")? {
        Some(value) => value.parse(),
        None => Ok(default),
    }
}

/// Parse `Overwrite` (`T`/`F`); absent means overwrite allowed.
pub fn overwrite(headers: &HeaderMap) -> DavResult<bool> {
    match header_str(headers, "overwrite")? {
        None => Ok(true),
        Some(v) if v.eq_ignore_ascii_case("t") => Ok(true),
        Some(v) if v.eq_ignore_ascii_case("f") => Ok(false),
        Some(_) => Err(DavError::BadRequest),
    }
}

/// A requested lock duration from the `Timeout` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockTimeout {
    Seconds(u64),
    Infinite,
}

/// Parse `Timeout: Second-n, Infinite`; the first understood entry wins.
/// Absent or unintelligible values fall back to the lock manager default.
pub fn timeout(headers: &HeaderMap) -> Option<LockTimeout> {
    let value = headers.get("timeout")?.to_str().ok()?;
    for entry in value.split(',') {
        let entry = entry.trim();
        if entry.eq_ignore_ascii_case("infinite") {
            return Some(LockTimeout::Infinite);
        }
        if let Some(seconds) = entry
            .strip_prefix("Second-")
            .and_then(|s| s.parse::<u64>().ok())
        {
            return Some(LockTimeout::Seconds(seconds));
        }
    }
    None
}

/// Extract every lock token referenced by the `If` header.
///
/// The full conditional grammar allows tagged lists, `Not`, and etag
/// conditions; lock enforcement only needs the set of submitted tokens, so
/// everything between `<` and `>` inside a parenthesized list is collected.
pub fn if_tokens(headers: &HeaderMap) -> Vec<String> {
    let Some(value) = headers.get("if").and_then(|v| v.to_str().ok()) else {
        return Vec::new();
    };
    let mut tokens = Vec::new();
    let mut in_list = false;
    let mut rest = value;
    while let Some(pos) = rest.find(['(', ')', '<']) {
        match rest.as_bytes()[pos] {
            b'(' => {
                in_list = true;
                rest = &rest[pos + 1..];
            }
            b')' => {
                in_list = false;
                rest = &rest[pos + 1..];
            }
            _ => {
                let tail = &rest[pos + 1..];
                let Some(end) = tail.find('>') else { break };
                if in_list {
                    tokens.push(tail[..end].to_string());
                }
                rest = &tail[end + 1..];
            }
        }
    }
    tokens
}

/// Parse the `Lock-Token` header (`<token>`).
pub fn lock_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get("lock-token")?.to_str().ok()?.trim();
    let value = value.strip_prefix('<').unwrap_or(value);
    let value = value.strip_suffix('>').unwrap_or(value);
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Parse the `Destination` header into a normalized engine path.
///
/// Accepts an absolute URL (host part ignored) or an absolute path.
pub fn destination(headers: &HeaderMap) -> DavResult<Option<DavPath>> {
    let Some(value) = header_str(headers, "destination")? else {
        return Ok(None);
    };
    let raw_path = match url::Url::parse(value) {
        Ok(parsed) => parsed.path().to_string(),
        Err(url::ParseError::RelativeUrlWithoutBase) if value.starts_with('/') => {
            value.to_string()
        }
        Err(_) => return Err(DavError::BadRequest),
    };
    let decoded = percent_decode(&raw_path)?;
    let path = DavPath::parse(&decoded).map_err(|_| DavError::BadRequest)?;
    Ok(Some(path))
}

/// Percent-decode a URL path.
pub fn percent_decode(raw: &str) -> DavResult<String> {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = raw.get(i + 1..i + 3).ok_or(DavError::BadRequest)?;
            let byte = u8::from_str_radix(hex, 16).map_err(|_| DavError::BadRequest)?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| DavError::BadRequest)
}

/// Percent-encode a path for use in an `href` element.
///
/// Keeps the characters URI path segments allow unencoded and encodes the
/// UTF-8 bytes of everything else.
pub fn percent_encode_path(path: &str) -> String {
    let mut result = String::with_capacity(path.len());
    for c in path.chars() {
        if c.is_ascii_alphanumeric()
            || matches!(
                c,
                '-' | '_'
                    | '.'
                    | '~'
                    | '/'
                    | ':'
                    | '@'
                    | '!'
                    | '$'
                    | '&'
                    | '\''
                    | '('
                    | ')'
                    | '*'
                    | '+'
                    | ','
                    | ';'
                    | '='
            )
        {
            result.push(c);
        } else {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).as_bytes() {
                result.push_str(&format!("%{byte:02X}"));
            }
        }
    }
    result
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> DavResult<Option<&'h str>> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(Some)
            .map_err(|_| DavError::BadRequest),
    }
}
