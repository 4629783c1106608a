//! WebDAV protocol dispatch engine.
//!
//! This crate turns parsed HTTP requests into storage operations and
//! protocol-correct responses. It owns the four shared subsystems a WebDAV
//! server needs to get right:
//!
//! 1. **Authentication**: HTTP Basic and Digest with nonce replay
//!    resistance ([`DavAuth`])
//! 2. **Mount resolution**: longest-segment-prefix routing to storage
//!    providers ([`MountTable`])
//! 3. **Locking**: exclusive/shared locks with depth semantics and lazy
//!    expiry ([`LockManager`])
//! 4. **Properties**: live properties computed on read, dead properties
//!    with atomic PROPPATCH batches ([`PropStore`])
//!
//! [`DavEngine::dispatch`] sequences them per request and assembles single-
//! or Multi-Status responses.
//!
//! # Example
//!
//! ```
//! use davgate_core::{DavPath, MemoryProvider};
//! use davgate_webdav::{AccountConfig, DavConfig, DavEngine};
//! use std::sync::Arc;
//!
//! let config = DavConfig {
//!     accounts: vec![AccountConfig {
//!         username: "alice".to_string(),
//!         password: "secret".to_string(),
//!         permissions: vec!["/".to_string()],
//!     }],
//!     ..DavConfig::default()
//! };
//! let engine = DavEngine::with_mounts(
//!     &config,
//!     vec![(DavPath::parse("/dav").unwrap(), Arc::new(MemoryProvider::new()) as _)],
//! )
//! .expect("engine construction");
//! # let _ = engine;
//! ```
//!
//! The transport, TLS, process bootstrap, and UI rendering are external
//! collaborators: transports hand over a [`DavRequest`] and write back the
//! returned [`DavResponse`], the admin UI plugs in through [`AdminPage`],
//! and configuration arrives as one immutable [`DavConfig`] value.

mod admin;
mod auth;
mod config;
mod dispatch;
mod error;
mod headers;
mod lock;
mod mount;
mod prop;
mod request;
mod response;
mod xml;

pub use admin::{ADMIN_MARKER, AdminFuture, AdminPage};
pub use auth::{AuthOutcome, DavAuth, Identity};
pub use config::{AccountConfig, DavConfig, EngineError, MountConfig};
pub use dispatch::DavEngine;
pub use error::{DavError, DavResult};
pub use headers::{Depth, LockTimeout};
pub use lock::{
    DEFAULT_TIMEOUT_SECS, DavLock, LockConflict, LockManager, LockScope, MAX_TIMEOUT_SECS,
    ReleaseOutcome,
};
pub use prop::{
    LIVE_PROP_NAMES, LivePropContext, PropName, PropOutcome, PropPatch, PropStore,
    all_live_props, live_prop_value,
};
pub use request::{DavMethod, DavRequest, MAX_XML_BODY};
pub use response::{DavBody, DavResponse};
pub use xml::{LockRequestBody, MultiStatus, PropfindSpec, PropstatGroup, RenderedProp};
