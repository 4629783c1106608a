//! The lock manager.
//!
//! Owns every active lock, keyed by resource path. All check-then-mutate
//! sequences (conflict check plus insert, counter checks plus release) run
//! under one table mutex, so two exclusive LOCK requests can never both
//! observe "no conflict". The mutex is never held across an await point.
//!
//! Expiry is lazy: every entry point prunes expired locks before it looks at
//! the table, so an expired lock is indistinguishable from an absent one.
//! The `*_at` variants take an explicit clock reading; the plain variants
//! use `Instant::now()`.

use crate::headers::LockTimeout;
use davgate_core::DavPath;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, trace};
use uuid::Uuid;

/// Lock duration granted when the client does not ask for one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Longest lock duration the engine will grant; `Infinite` clamps to this.
pub const MAX_TIMEOUT_SECS: u64 = 86_400;

/// Lock scope per RFC 4918: one exclusive holder, or many shared holders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockScope {
    Exclusive,
    Shared,
}

/// One active lock.
#[derive(Debug, Clone)]
pub struct DavLock {
    /// Process-wide unique token (`opaquelocktoken:` URI).
    pub token: String,
    pub scope: LockScope,
    /// Depth-infinity locks cover every descendant path.
    pub deep: bool,
    /// Opaque owner description from the LOCK body.
    pub owner: Option<String>,
    /// The locked path (engine-absolute).
    pub path: DavPath,
    /// Absolute expiry.
    pub expires: Instant,
    /// Granted duration in seconds, for the `Timeout` response field.
    pub timeout_secs: u64,
}

impl DavLock {
    fn is_active_at(&self, now: Instant) -> bool {
        self.expires > now
    }

    /// Whether this lock covers `path` for conflict purposes.
    pub fn covers(&self, path: &DavPath) -> bool {
        self.path == *path || (self.deep && self.path.is_ancestor_of(path))
    }
}

/// A conflicting lock blocked the operation.
#[derive(Debug, Clone)]
pub struct LockConflict {
    /// Path holding the conflicting lock.
    pub path: DavPath,
    pub scope: LockScope,
}

/// Outcome of a release attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    /// The resource holds no lock at all.
    NoLock,
    /// The resource is locked, but not by the presented token.
    TokenMismatch,
}

/// The process-wide lock table.
pub struct LockManager {
    table: Mutex<HashMap<DavPath, Vec<DavLock>>>,
}

impl LockManager {
    pub fn new() -> Self {
        LockManager {
            table: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire a new lock on `path`.
    pub fn acquire(
        &self,
        path: &DavPath,
        scope: LockScope,
        deep: bool,
        owner: Option<String>,
        requested: Option<LockTimeout>,
    ) -> Result<DavLock, LockConflict> {
        self.acquire_at(Instant::now(), path, scope, deep, owner, requested)
    }

    /// [`acquire`](Self::acquire) with an explicit clock reading.
    pub fn acquire_at(
        &self,
        now: Instant,
        path: &DavPath,
        scope: LockScope,
        deep: bool,
        owner: Option<String>,
        requested: Option<LockTimeout>,
    ) -> Result<DavLock, LockConflict> {
        let mut table = self.lock_table();
        Self::prune_expired(&mut table, now);

        // Eager conflict detection over ancestors and, because a new lock
        // covers its subtree when deep, over descendants as well.
        if let Some(conflict) = Self::find_scope_conflict(&table, path, scope, deep) {
            debug!(path = %path, conflict = %conflict.path, "lock conflict");
            return Err(conflict);
        }

        let timeout_secs = clamp_timeout(requested);
        let lock = DavLock {
            token: format!("opaquelocktoken:{}", Uuid::new_v4()),
            scope,
            deep,
            owner,
            path: path.clone(),
            expires: now + Duration::from_secs(timeout_secs),
            timeout_secs,
        };
        trace!(path = %path, token = %lock.token, deep, "lock granted");
        table.entry(path.clone()).or_default().push(lock.clone());
        Ok(lock)
    }

    /// Extend the expiry of an existing lock, identified by token.
    pub fn refresh(&self, token: &str, requested: Option<LockTimeout>) -> Option<DavLock> {
        self.refresh_at(Instant::now(), token, requested)
    }

    /// [`refresh`](Self::refresh) with an explicit clock reading.
    pub fn refresh_at(
        &self,
        now: Instant,
        token: &str,
        requested: Option<LockTimeout>,
    ) -> Option<DavLock> {
        let mut table = self.lock_table();
        Self::prune_expired(&mut table, now);
        for locks in table.values_mut() {
            if let Some(lock) = locks.iter_mut().find(|l| l.token == token) {
                let timeout_secs = match requested {
                    Some(_) => clamp_timeout(requested),
                    None => lock.timeout_secs,
                };
                lock.timeout_secs = timeout_secs;
                lock.expires = now + Duration::from_secs(timeout_secs);
                trace!(token, timeout_secs, "lock refreshed");
                return Some(lock.clone());
            }
        }
        None
    }

    /// Release the lock on `path` held under `token`.
    pub fn release(&self, path: &DavPath, token: &str) -> ReleaseOutcome {
        self.release_at(Instant::now(), path, token)
    }

    /// [`release`](Self::release) with an explicit clock reading.
    pub fn release_at(&self, now: Instant, path: &DavPath, token: &str) -> ReleaseOutcome {
        let mut table = self.lock_table();
        Self::prune_expired(&mut table, now);
        let Some(locks) = table.get_mut(path) else {
            return ReleaseOutcome::NoLock;
        };
        let Some(index) = locks.iter().position(|l| l.token == token) else {
            return ReleaseOutcome::TokenMismatch;
        };
        locks.remove(index);
        if locks.is_empty() {
            table.remove(path);
        }
        trace!(path = %path, token, "lock released");
        ReleaseOutcome::Released
    }

    /// Check whether a mutation on `path` may proceed.
    ///
    /// Any active covering lock blocks the operation unless its token was
    /// presented, shared locks included: a shared lock only co-exists with
    /// other locks, it does not let strangers write.
    pub fn check(
        &self,
        path: &DavPath,
        covers_descendants: bool,
        tokens: &[String],
    ) -> Result<(), LockConflict> {
        self.check_at(Instant::now(), path, covers_descendants, tokens)
    }

    /// [`check`](Self::check) with an explicit clock reading.
    pub fn check_at(
        &self,
        now: Instant,
        path: &DavPath,
        covers_descendants: bool,
        tokens: &[String],
    ) -> Result<(), LockConflict> {
        let mut table = self.lock_table();
        Self::prune_expired(&mut table, now);
        for (lock_path, locks) in table.iter() {
            let applicable = covers_descendants && path.is_ancestor_of(lock_path);
            for lock in locks {
                if (applicable || lock.covers(path))
                    && !tokens.contains(&lock.token)
                {
                    return Err(LockConflict {
                        path: lock_path.clone(),
                        scope: lock.scope,
                    });
                }
            }
        }
        Ok(())
    }

    /// Every active lock covering `path` (direct plus inherited deep locks).
    pub fn locks_for(&self, path: &DavPath) -> Vec<DavLock> {
        let mut table = self.lock_table();
        Self::prune_expired(&mut table, Instant::now());
        let mut found = Vec::new();
        for locks in table.values() {
            for lock in locks {
                if lock.covers(path) {
                    found.push(lock.clone());
                }
            }
        }
        found
    }

    /// Whether any presented token names an active lock.
    pub fn any_token_active(&self, tokens: &[String]) -> bool {
        let mut table = self.lock_table();
        Self::prune_expired(&mut table, Instant::now());
        table
            .values()
            .flatten()
            .any(|lock| tokens.contains(&lock.token))
    }

    /// Drop every lock on `path` and its descendants (DELETE, MOVE source).
    pub fn purge_subtree(&self, path: &DavPath) {
        let mut table = self.lock_table();
        table.retain(|lock_path, _| lock_path != path && !path.is_ancestor_of(lock_path));
    }

    /// Drop expired locks. Optional: every entry point prunes lazily.
    pub fn sweep_expired(&self) {
        let mut table = self.lock_table();
        Self::prune_expired(&mut table, Instant::now());
    }

    fn lock_table(&self) -> MutexGuard<'_, HashMap<DavPath, Vec<DavLock>>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn prune_expired(table: &mut HashMap<DavPath, Vec<DavLock>>, now: Instant) {
        table.retain(|_, locks| {
            locks.retain(|lock| lock.is_active_at(now));
            !locks.is_empty()
        });
    }

    /// Scope conflict scan for a new lock: ancestors, the path itself, and
    /// (for the subtree a deep lock would cover) descendants.
    fn find_scope_conflict(
        table: &HashMap<DavPath, Vec<DavLock>>,
        path: &DavPath,
        scope: LockScope,
        deep: bool,
    ) -> Option<LockConflict> {
        for (lock_path, locks) in table {
            let applicable_down = deep && path.is_ancestor_of(lock_path);
            for lock in locks {
                let applicable = applicable_down || lock.covers(path);
                if applicable
                    && (scope == LockScope::Exclusive || lock.scope == LockScope::Exclusive)
                {
                    return Some(LockConflict {
                        path: lock_path.clone(),
                        scope: lock.scope,
                    });
                }
            }
        }
        None
    }
}

impl Default for LockManager {
    fn default() -> Self {
        LockManager::new()
    }
}

fn clamp_timeout(requested: Option<LockTimeout>) -> u64 {
    match requested {
        None => DEFAULT_TIMEOUT_SECS,
        Some(LockTimeout::Infinite) => MAX_TIMEOUT_SECS,
        Some(LockTimeout::Seconds(s)) => s.min(MAX_TIMEOUT_SECS),
    }
}
