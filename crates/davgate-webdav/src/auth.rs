//! Authentication negotiation: HTTP Basic and HTTP Digest.
//!
//! Basic credentials are verified by constant-time comparison of SHA-256
//! hashes; plaintext secrets are dropped at construction time. Digest
//! verification follows RFC 2617 (MD5, `qop="auth"`) with a process-wide
//! nonce table providing replay resistance: each nonce carries the highest
//! `nc` value seen, and a request that does not advance it is rejected even
//! when its digest is correct.
//!
//! A failed or absent credential always produces the same 401 carrying one
//! `WWW-Authenticate` header per enabled scheme; the response never says
//! which part of the credential was wrong.

use crate::config::{AccountConfig, EngineError};
use crate::request::DavRequest;
use crate::response::DavResponse;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use dashmap::DashMap;
use davgate_core::DavPath;
use http::header::WWW_AUTHENTICATE;
use rand::RngCore;
use sha2::{Digest as _, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use subtle::ConstantTimeEq;
use tracing::{debug, trace};

/// How long an issued nonce stays valid.
const NONCE_TTL: Duration = Duration::from_secs(300);

/// When the nonce table grows past this, expired entries are swept on the
/// next issuance.
const NONCE_SWEEP_THRESHOLD: usize = 10_000;

/// The authenticated principal attached to a request.
#[derive(Debug, Clone)]
pub struct Identity {
    pub username: String,
    permissions: Vec<DavPath>,
}

impl Identity {
    /// Whether this account may touch `path` (segment-boundary prefix test).
    pub fn allows(&self, path: &DavPath) -> bool {
        self.permissions.iter().any(|prefix| path.starts_with(prefix))
    }
}

/// Outcome of credential extraction and validation.
#[derive(Debug)]
pub enum AuthOutcome {
    /// Credentials check out.
    Granted(Identity),
    /// Absent, malformed, stale, or wrong credentials; challenge the client.
    Denied,
}

struct StoredCredential {
    /// SHA-256 of the account secret, for Basic verification.
    secret_sha256: [u8; 32],
    /// MD5(username:realm:secret) in hex, for Digest verification.
    ha1_hex: String,
    permissions: Vec<DavPath>,
}

struct NonceEntry {
    expires: Instant,
    /// Highest `nc` value accepted so far; the next request must exceed it.
    last_nc: u32,
}

/// The authentication negotiator.
pub struct DavAuth {
    realm: String,
    basic_enabled: bool,
    digest_enabled: bool,
    opaque: String,
    accounts: HashMap<String, StoredCredential>,
    nonces: DashMap<String, NonceEntry>,
}

impl DavAuth {
    /// Build the credential store from configuration.
    pub fn new(
        realm: &str,
        basic_enabled: bool,
        digest_enabled: bool,
        accounts: &[AccountConfig],
    ) -> Result<Self, EngineError> {
        let mut table = HashMap::new();
        for account in accounts {
            let mut permissions = Vec::new();
            for prefix in &account.permissions {
                let parsed =
                    DavPath::parse(prefix).map_err(|source| EngineError::InvalidPermission {
                        username: account.username.clone(),
                        prefix: prefix.clone(),
                        source,
                    })?;
                permissions.push(parsed);
            }
            let ha1 = md5_hex(format!(
                "{}:{}:{}",
                account.username, realm, account.password
            ));
            table.insert(
                account.username.clone(),
                StoredCredential {
                    secret_sha256: Sha256::digest(account.password.as_bytes()).into(),
                    ha1_hex: ha1,
                    permissions,
                },
            );
        }
        Ok(DavAuth {
            realm: realm.to_string(),
            basic_enabled,
            digest_enabled,
            opaque: random_hex(16),
            accounts: table,
            nonces: DashMap::new(),
        })
    }

    /// Validate the request's credentials.
    pub fn authenticate(&self, request: &DavRequest) -> AuthOutcome {
        self.authenticate_at(request, Instant::now())
    }

    fn authenticate_at(&self, request: &DavRequest, now: Instant) -> AuthOutcome {
        let Some(authorization) = request.authorization() else {
            return AuthOutcome::Denied;
        };
        if self.basic_enabled
            && let Some(encoded) = strip_scheme(authorization, "Basic")
        {
            return self.verify_basic(encoded);
        }
        if self.digest_enabled
            && let Some(params) = strip_scheme(authorization, "Digest")
        {
            return self.verify_digest_at(request, params, now);
        }
        AuthOutcome::Denied
    }

    /// The 401 response carrying one challenge per enabled scheme.
    pub fn challenge(&self) -> DavResponse {
        self.challenge_at(Instant::now())
    }

    fn challenge_at(&self, now: Instant) -> DavResponse {
        let mut response = DavResponse::empty(http::StatusCode::UNAUTHORIZED);
        if self.basic_enabled {
            response.append_header(
                WWW_AUTHENTICATE,
                &format!("Basic realm=\"{}\", charset=\"UTF-8\"", self.realm),
            );
        }
        if self.digest_enabled {
            let nonce = self.issue_nonce_at(now);
            response.append_header(
                WWW_AUTHENTICATE,
                &format!(
                    "Digest realm=\"{}\", qop=\"auth\", algorithm=MD5, nonce=\"{}\", opaque=\"{}\"",
                    self.realm, nonce, self.opaque
                ),
            );
        }
        response
    }

    /// Drop expired nonce entries. Expiry is otherwise checked lazily on
    /// use, so calling this is optional and only bounds table growth.
    pub fn sweep_expired(&self) {
        self.sweep_expired_at(Instant::now());
    }

    fn sweep_expired_at(&self, now: Instant) {
        self.nonces.retain(|_, entry| entry.expires > now);
    }

    fn verify_basic(&self, encoded: &str) -> AuthOutcome {
        let Ok(decoded) = BASE64.decode(encoded.trim()) else {
            return AuthOutcome::Denied;
        };
        let Ok(decoded) = String::from_utf8(decoded) else {
            return AuthOutcome::Denied;
        };
        let Some((username, password)) = decoded.split_once(':') else {
            return AuthOutcome::Denied;
        };
        let Some(stored) = self.accounts.get(username) else {
            return AuthOutcome::Denied;
        };
        let presented: [u8; 32] = Sha256::digest(password.as_bytes()).into();
        if bool::from(presented.ct_eq(&stored.secret_sha256)) {
            trace!(username, "basic credentials accepted");
            AuthOutcome::Granted(Identity {
                username: username.to_string(),
                permissions: stored.permissions.clone(),
            })
        } else {
            debug!(username, "basic credentials rejected");
            AuthOutcome::Denied
        }
    }

    fn verify_digest_at(&self, request: &DavRequest, params: &str, now: Instant) -> AuthOutcome {
        let params = parse_digest_params(params);
        let (Some(username), Some(nonce), Some(uri), Some(response)) = (
            params.get("username"),
            params.get("nonce"),
            params.get("uri"),
            params.get("response"),
        ) else {
            return AuthOutcome::Denied;
        };
        let Some(stored) = self.accounts.get(username.as_str()) else {
            return AuthOutcome::Denied;
        };

        // qop="auth" is required; without it there is no counter to advance
        // and no replay resistance.
        if params.get("qop").map(String::as_str) != Some("auth") {
            return AuthOutcome::Denied;
        }
        let (Some(nc), Some(cnonce)) = (params.get("nc"), params.get("cnonce")) else {
            return AuthOutcome::Denied;
        };
        let Ok(nc_value) = u32::from_str_radix(nc, 16) else {
            return AuthOutcome::Denied;
        };

        // One table entry per nonce; the DashMap shard lock makes the
        // counter check-and-advance atomic.
        let Some(mut entry) = self.nonces.get_mut(nonce.as_str()) else {
            debug!(username, "digest with unknown nonce");
            return AuthOutcome::Denied;
        };
        if entry.expires <= now {
            drop(entry);
            self.nonces.remove(nonce.as_str());
            debug!(username, "digest with expired nonce");
            return AuthOutcome::Denied;
        }
        if nc_value <= entry.last_nc {
            // A replayed counter burns the nonce: the next attempt has to
            // start over from a fresh challenge.
            drop(entry);
            self.nonces.remove(nonce.as_str());
            debug!(username, nc = nc_value, "digest replay detected");
            return AuthOutcome::Denied;
        }

        let ha2 = md5_hex(format!("{}:{}", request.method.as_str(), uri));
        let expected = md5_hex(format!(
            "{}:{}:{}:{}:auth:{}",
            stored.ha1_hex, nonce, nc, cnonce, ha2
        ));
        if !bool::from(expected.as_bytes().ct_eq(response.as_bytes())) {
            debug!(username, "digest response mismatch");
            return AuthOutcome::Denied;
        }

        entry.last_nc = nc_value;
        trace!(username, nc = nc_value, "digest credentials accepted");
        AuthOutcome::Granted(Identity {
            username: username.to_string(),
            permissions: stored.permissions.clone(),
        })
    }

    fn issue_nonce_at(&self, now: Instant) -> String {
        if self.nonces.len() > NONCE_SWEEP_THRESHOLD {
            self.sweep_expired_at(now);
        }
        let nonce = random_hex(16);
        self.nonces.insert(
            nonce.clone(),
            NonceEntry {
                expires: now + NONCE_TTL,
                last_nc: 0,
            },
        );
        nonce
    }
}

fn strip_scheme<'a>(header: &'a str, scheme: &str) -> Option<&'a str> {
    let (head, tail) = header.split_once(' ')?;
    if head.eq_ignore_ascii_case(scheme) {
        Some(tail.trim_start())
    } else {
        None
    }
}

/// Parse `key=value` pairs from a Digest authorization header, honoring
/// quoted values with embedded commas.
fn parse_digest_params(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut rest = input.trim();
    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else { break };
        let key = rest[..eq].trim().to_ascii_lowercase();
        rest = rest[eq + 1..].trim_start();
        let value;
        if let Some(stripped) = rest.strip_prefix('"') {
            let Some(end) = stripped.find('"') else { break };
            value = stripped[..end].to_string();
            rest = stripped[end + 1..].trim_start().trim_start_matches(',');
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            value = rest[..end].trim().to_string();
            rest = &rest[(end + 1).min(rest.len())..];
        }
        params.insert(key, value);
        rest = rest.trim_start();
    }
    params
}

fn md5_hex(input: String) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rng().fill_bytes(&mut buf);
    buf.iter().map(|b| format!("{b:02x}")).collect()
}
