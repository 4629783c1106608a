//! The administrative page collaborator.
//!
//! Requests whose first path segment is [`ADMIN_MARKER`] are handed to this
//! collaborator after the same credential check every other request gets.
//! What it renders is its own business; the dispatcher returns its status
//! and body verbatim.

use crate::request::DavRequest;
use http::StatusCode;
use std::pin::Pin;

/// Reserved first path segment routed to the admin collaborator.
pub const ADMIN_MARKER: &str = "_";

/// Boxed future returned by [`AdminPage::enter`].
pub type AdminFuture<'a> = Pin<Box<dyn Future<Output = (StatusCode, String)> + Send + 'a>>;

/// An administrative UI backend.
pub trait AdminPage: Send + Sync {
    /// Handle an admin request, returning status and body.
    fn enter<'a>(&'a self, request: &'a DavRequest) -> AdminFuture<'a>;
}
