//! The dispatcher: one request in, one response out.
//!
//! Every request walks the same states: authenticate, route to a mount,
//! check locks, execute against the provider, respond. Any step may
//! short-circuit straight to the response with an error status; provider
//! errors are translated into the engine taxonomy here and nowhere else.
//!
//! Methods that touch several resources (recursive DELETE, COPY, MOVE,
//! PROPFIND, PROPPATCH) collect per-resource outcomes and answer with a
//! Multi-Status body instead of failing the request as a whole.

use crate::admin::{ADMIN_MARKER, AdminPage};
use crate::auth::{AuthOutcome, DavAuth, Identity};
use crate::config::{self, DavConfig, EngineError};
use crate::error::{DavError, DavResult};
use crate::headers::Depth;
use crate::lock::{LockManager, LockScope};
use crate::mount::{Mount, MountTable, Resolved};
use crate::prop::{self, LivePropContext, PropStore};
use crate::request::{DavMethod, DavRequest};
use crate::response::DavResponse;
use crate::xml::{self, MultiStatus, PropfindSpec, PropstatGroup, RenderedProp};
use davgate_core::{DavPath, DavProvider, ResourceMeta, StorageError};
use http::StatusCode;
use http::header::{ALLOW, ETAG, HeaderName, LAST_MODIFIED};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, instrument, trace};

/// The WebDAV protocol engine.
///
/// One instance serves every request; all mutable state (locks, dead
/// properties, nonces) lives behind its own synchronization, so the engine
/// is shared as-is across request tasks.
pub struct DavEngine {
    auth: DavAuth,
    mounts: MountTable,
    locks: LockManager,
    props: PropStore,
    admin: Option<Arc<dyn AdminPage>>,
}

impl DavEngine {
    /// Build an engine from configuration, constructing one provider per
    /// mount. Any failure here is fatal to process bootstrap.
    pub fn new(config: &DavConfig) -> Result<Self, EngineError> {
        let mut mounts = Vec::new();
        for mount in &config.mounts {
            let prefix = config::parse_prefix(&mount.prefix)?;
            let provider = config::build_provider(mount)?;
            mounts.push(Mount { prefix, provider });
        }
        Self::from_parts(config, mounts)
    }

    /// Build an engine with pre-constructed providers (embedding, tests).
    pub fn with_mounts(
        config: &DavConfig,
        mounts: Vec<(DavPath, Arc<dyn DavProvider>)>,
    ) -> Result<Self, EngineError> {
        let mounts = mounts
            .into_iter()
            .map(|(prefix, provider)| Mount { prefix, provider })
            .collect();
        Self::from_parts(config, mounts)
    }

    fn from_parts(config: &DavConfig, mounts: Vec<Mount>) -> Result<Self, EngineError> {
        let auth = DavAuth::new(
            &config.realm,
            config.auth_basic,
            config.auth_digest,
            &config.accounts,
        )?;
        Ok(DavEngine {
            auth,
            mounts: MountTable::new(mounts)?,
            locks: LockManager::new(),
            props: PropStore::new(),
            admin: None,
        })
    }

    /// Attach the administrative page collaborator.
    pub fn set_admin(&mut self, admin: Arc<dyn AdminPage>) {
        self.admin = Some(admin);
    }

    /// The lock manager (for embedding-level sweeps and inspection).
    pub fn lock_manager(&self) -> &LockManager {
        &self.locks
    }

    /// Reclaim expired locks and nonces. Correctness does not require this;
    /// both tables also expire entries lazily on access.
    pub fn sweep_expired(&self) {
        self.locks.sweep_expired();
        self.auth.sweep_expired();
    }

    /// Serve one request. Never panics, never errors: every failure becomes
    /// a status code.
    #[instrument(level = "debug", skip_all, fields(method = request.method.as_str(), path = %request.path))]
    pub async fn dispatch(&self, mut request: DavRequest) -> DavResponse {
        // Unauthenticated -> Authenticated.
        let identity = match self.auth.authenticate(&request) {
            AuthOutcome::Granted(identity) => identity,
            AuthOutcome::Denied => {
                debug!("credentials absent or rejected");
                return self.auth.challenge();
            }
        };

        // Reserved admin marker routes past WebDAV handling.
        if request.path.segments().first().map(String::as_str) == Some(ADMIN_MARKER) {
            return match &self.admin {
                Some(admin) => {
                    let (status, body) = admin.enter(&request).await;
                    DavResponse::with_body(status, "text/html; charset=utf-8", body.into())
                }
                None => DavResponse::error(DavError::NotFound),
            };
        }

        // Authenticated -> Routed.
        let Some(route) = self.mounts.resolve(&request.path) else {
            debug!("no mount covers path");
            return DavResponse::error(DavError::NotFound);
        };
        if !identity.allows(&request.path) {
            debug!(username = %identity.username, "path outside account permissions");
            return DavResponse::error(DavError::Forbidden);
        }
        if request.method.mutates_storage() && route.provider.read_only() {
            return DavResponse::error(DavError::Forbidden);
        }

        // An If header that names no active lock is a failed precondition.
        let tokens = request.if_tokens();
        if !tokens.is_empty() && !self.locks.any_token_active(&tokens) {
            return DavResponse::error(DavError::PreconditionFailed);
        }

        // Routed -> LockChecked -> Executed -> Responded.
        match self.handle(&identity, &route, &mut request).await {
            Ok(response) => response,
            Err(e) => {
                debug!(error = %e, "request failed");
                DavResponse::error(e)
            }
        }
    }

    async fn handle(
        &self,
        identity: &Identity,
        route: &Resolved,
        request: &mut DavRequest,
    ) -> DavResult<DavResponse> {
        match request.method {
            DavMethod::Options => Ok(Self::handle_options()),
            DavMethod::Get => self.handle_get(route, false).await,
            DavMethod::Head => self.handle_get(route, true).await,
            DavMethod::Put => self.handle_put(route, request).await,
            DavMethod::Delete => self.handle_delete(route, request).await,
            DavMethod::MkCol => self.handle_mkcol(route, request).await,
            DavMethod::Copy => self.handle_copy_move(identity, route, request, false).await,
            DavMethod::Move => self.handle_copy_move(identity, route, request, true).await,
            DavMethod::PropFind => self.handle_propfind(route, request).await,
            DavMethod::PropPatch => self.handle_proppatch(route, request).await,
            DavMethod::Lock => self.handle_lock(route, request).await,
            DavMethod::Unlock => self.handle_unlock(request),
            DavMethod::Unknown => Err(DavError::MethodNotAllowed),
        }
    }

    fn handle_options() -> DavResponse {
        let allow = DavMethod::SUPPORTED
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let mut response = DavResponse::empty(StatusCode::OK);
        response.set_header(ALLOW, &allow);
        response.set_header(HeaderName::from_static("dav"), "1, 2");
        response
    }

    async fn handle_get(&self, route: &Resolved, head_only: bool) -> DavResult<DavResponse> {
        let meta = self.meta_of(route, &route.relative).await?;

        if meta.is_collection {
            // A minimal plain-text listing; anything fancier is the UI
            // collaborator's job.
            let entries = route.provider.list(&route.relative).await?;
            let mut listing = String::new();
            for entry in entries {
                listing.push_str(&entry.name);
                if entry.meta.is_collection {
                    listing.push('/');
                }
                listing.push('\n');
            }
            let mut response = DavResponse::text(StatusCode::OK, listing);
            if head_only {
                response.body = crate::response::DavBody::Empty;
            }
            return Ok(response);
        }

        let content_type = meta
            .content_type
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let mut response = if head_only {
            let mut response = DavResponse::empty(StatusCode::OK);
            response.set_header(http::header::CONTENT_TYPE, &content_type);
            response.set_header(http::header::CONTENT_LENGTH, &meta.len.to_string());
            response
        } else {
            let (meta, body) = route.provider.read(&route.relative).await?;
            DavResponse::stream(StatusCode::OK, &content_type, meta.len, body)
        };
        response.set_header(ETAG, &meta.etag());
        response.set_header(LAST_MODIFIED, &prop::http_date(meta.modified));
        Ok(response)
    }

    async fn handle_put(&self, route: &Resolved, request: &mut DavRequest) -> DavResult<DavResponse> {
        self.require_unlocked(&request.path, false, request)?;
        let body = request.take_body_stream();
        let outcome = route.provider.write(&route.relative, body).await?;
        trace!(outcome = ?outcome, "put complete");
        Ok(DavResponse::empty(match outcome {
            davgate_core::WriteOutcome::Created => StatusCode::CREATED,
            davgate_core::WriteOutcome::Replaced => StatusCode::NO_CONTENT,
        }))
    }

    async fn handle_delete(&self, route: &Resolved, request: &DavRequest) -> DavResult<DavResponse> {
        let meta = self.meta_of(route, &route.relative).await?;
        self.require_unlocked(&request.path, meta.is_collection, request)?;

        if !meta.is_collection {
            route.provider.delete(&route.relative).await?;
            self.props.remove_resource(&request.path);
            self.locks.purge_subtree(&request.path);
            return Ok(DavResponse::empty(StatusCode::NO_CONTENT));
        }

        let failures = self.delete_tree(route, &route.relative).await;
        if failures.is_empty() {
            return Ok(DavResponse::empty(StatusCode::NO_CONTENT));
        }

        // Per-child failures, each with its own status; successfully
        // deleted descendants are not listed.
        let mut ms = MultiStatus::new();
        for (rel, error) in failures {
            let abs = route.prefix.join(&rel);
            ms.push_status(&abs.as_url(), error.status());
        }
        ms.into_response()
    }

    /// Delete a subtree, deepest entries first, collecting per-resource
    /// failures. An entry whose descendant failed is skipped (it cannot
    /// empty out) and not reported as its own failure.
    async fn delete_tree(
        &self,
        route: &Resolved,
        rel_root: &DavPath,
    ) -> Vec<(DavPath, DavError)> {
        let mut failures: Vec<(DavPath, DavError)> = Vec::new();
        let mut all: Vec<DavPath> = vec![rel_root.clone()];
        let mut queue: VecDeque<DavPath> = VecDeque::from([rel_root.clone()]);

        while let Some(dir) = queue.pop_front() {
            match route.provider.list(&dir).await {
                Ok(entries) => {
                    for entry in entries {
                        let child = dir.child(&entry.name);
                        all.push(child.clone());
                        if entry.meta.is_collection {
                            queue.push_back(child);
                        }
                    }
                }
                Err(e) => failures.push((dir.clone(), e.into())),
            }
        }

        all.sort_by(|a, b| b.depth().cmp(&a.depth()));
        for rel in all {
            let blocked = failures
                .iter()
                .any(|(failed, _)| *failed == rel || rel.is_ancestor_of(failed));
            if blocked {
                continue;
            }
            match route.provider.delete(&rel).await {
                Ok(()) => {
                    let abs = route.prefix.join(&rel);
                    self.props.remove_resource(&abs);
                    self.locks.purge_subtree(&abs);
                }
                Err(e) => failures.push((rel, e.into())),
            }
        }
        failures
    }

    async fn handle_mkcol(&self, route: &Resolved, request: &mut DavRequest) -> DavResult<DavResponse> {
        let body = request.take_body().await?;
        if !body.is_empty() {
            return Err(DavError::UnsupportedMediaType);
        }
        self.require_unlocked(&request.path, false, request)?;
        route.provider.make_collection(&route.relative).await?;
        Ok(DavResponse::empty(StatusCode::CREATED))
    }

    async fn handle_copy_move(
        &self,
        identity: &Identity,
        route: &Resolved,
        request: &DavRequest,
        is_move: bool,
    ) -> DavResult<DavResponse> {
        let depth = request.depth(Depth::Infinity)?;
        if depth == Depth::One || (is_move && depth != Depth::Infinity) {
            return Err(DavError::BadRequest);
        }

        let dst_abs = request.destination()?.ok_or(DavError::BadRequest)?;
        let overwrite = request.overwrite()?;
        let src_meta = self.meta_of(route, &route.relative).await?;

        // The destination resolves through the same mount table; a
        // destination on a different provider is a recorded 409 decision.
        let dst_route = self.mounts.resolve(&dst_abs).ok_or(DavError::Conflict)?;
        if !identity.allows(&dst_abs) {
            return Err(DavError::Forbidden);
        }
        if !Arc::ptr_eq(&route.provider, &dst_route.provider) {
            debug!(destination = %dst_abs, "destination crosses providers");
            return Err(DavError::Conflict);
        }
        if dst_route.provider.read_only() {
            return Err(DavError::Forbidden);
        }

        let src_abs = &request.path;
        if *src_abs == dst_abs {
            return Err(DavError::Forbidden);
        }
        if src_abs.is_ancestor_of(&dst_abs) || dst_abs.is_ancestor_of(src_abs) {
            return Err(DavError::Conflict);
        }

        let dst_meta = match dst_route.provider.metadata(&dst_route.relative).await {
            Ok(meta) => Some(meta),
            Err(StorageError::NotFound) => None,
            Err(e) => return Err(e.into()),
        };
        if dst_meta.is_some() && !overwrite {
            return Err(DavError::PreconditionFailed);
        }

        if is_move {
            self.require_unlocked(src_abs, src_meta.is_collection, request)?;
        }
        self.require_unlocked(&dst_abs, true, request)?;

        // Overwrite means: remove the destination, then transfer.
        if let Some(dst_meta) = &dst_meta {
            if dst_meta.is_collection {
                let failures = self.delete_tree(&dst_route, &dst_route.relative).await;
                if let Some((_, error)) = failures.into_iter().next() {
                    return Err(error);
                }
            } else {
                dst_route.provider.delete(&dst_route.relative).await?;
            }
            self.props.remove_resource(&dst_abs);
            self.locks.purge_subtree(&dst_abs);
        }

        let success_status = if dst_meta.is_some() {
            StatusCode::NO_CONTENT
        } else {
            StatusCode::CREATED
        };

        if is_move {
            self.execute_move(route, &dst_route, src_abs, &dst_abs, &src_meta, success_status)
                .await
        } else {
            self.execute_copy(route, &dst_route, src_abs, &dst_abs, &src_meta, depth, success_status)
                .await
        }
    }

    async fn execute_copy(
        &self,
        route: &Resolved,
        dst_route: &Resolved,
        src_abs: &DavPath,
        dst_abs: &DavPath,
        src_meta: &ResourceMeta,
        depth: Depth,
        success_status: StatusCode,
    ) -> DavResult<DavResponse> {
        if !src_meta.is_collection {
            route
                .provider
                .copy_leaf(&route.relative, &dst_route.relative)
                .await?;
            self.props.copy_one(src_abs, dst_abs);
            return Ok(DavResponse::empty(success_status));
        }

        if depth == Depth::Zero {
            dst_route.provider.make_collection(&dst_route.relative).await?;
            self.props.copy_one(src_abs, dst_abs);
            return Ok(DavResponse::empty(success_status));
        }

        let failures = self.copy_tree(route, dst_route).await?;
        if failures.is_empty() {
            return Ok(DavResponse::empty(success_status));
        }
        let mut ms = MultiStatus::new();
        for (abs, error) in failures {
            ms.push_status(&abs.as_url(), error.status());
        }
        ms.into_response()
    }

    /// Copy a collection subtree, collecting per-resource failures keyed by
    /// destination path. Subtrees under a failed collection are skipped.
    async fn copy_tree(
        &self,
        route: &Resolved,
        dst_route: &Resolved,
    ) -> DavResult<Vec<(DavPath, DavError)>> {
        let provider = &route.provider;
        let mut failures: Vec<(DavPath, DavError)> = Vec::new();

        // Root collection first; without it there is nothing to recurse into.
        provider.make_collection(&dst_route.relative).await?;
        self.props.copy_one(
            &route.prefix.join(&route.relative),
            &dst_route.prefix.join(&dst_route.relative),
        );

        let mut queue: VecDeque<(DavPath, DavPath)> =
            VecDeque::from([(route.relative.clone(), dst_route.relative.clone())]);
        while let Some((src_dir, dst_dir)) = queue.pop_front() {
            let entries = match provider.list(&src_dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    failures.push((dst_route.prefix.join(&dst_dir), e.into()));
                    continue;
                }
            };
            for entry in entries {
                let src_child = src_dir.child(&entry.name);
                let dst_child = dst_dir.child(&entry.name);
                let dst_child_abs = dst_route.prefix.join(&dst_child);
                let result = if entry.meta.is_collection {
                    provider.make_collection(&dst_child).await
                } else {
                    provider.copy_leaf(&src_child, &dst_child).await
                };
                match result {
                    Ok(()) => {
                        self.props
                            .copy_one(&route.prefix.join(&src_child), &dst_child_abs);
                        if entry.meta.is_collection {
                            queue.push_back((src_child, dst_child));
                        }
                    }
                    Err(e) => failures.push((dst_child_abs, e.into())),
                }
            }
        }
        Ok(failures)
    }

    async fn execute_move(
        &self,
        route: &Resolved,
        dst_route: &Resolved,
        src_abs: &DavPath,
        dst_abs: &DavPath,
        src_meta: &ResourceMeta,
        success_status: StatusCode,
    ) -> DavResult<DavResponse> {
        match route
            .provider
            .rename(&route.relative, &dst_route.relative)
            .await
        {
            Ok(()) => {
                self.props.move_resource(src_abs, dst_abs);
                // Locks do not travel with the resource.
                self.locks.purge_subtree(src_abs);
                return Ok(DavResponse::empty(success_status));
            }
            Err(StorageError::NotSupported) => {
                trace!("provider cannot rename, falling back to copy+delete");
            }
            Err(e) => return Err(e.into()),
        }

        // Copy-then-delete fallback, aggregating failures from both halves.
        let mut failures = if src_meta.is_collection {
            self.copy_tree(route, dst_route).await?
        } else {
            route
                .provider
                .copy_leaf(&route.relative, &dst_route.relative)
                .await?;
            self.props.copy_one(src_abs, dst_abs);
            Vec::new()
        };

        if failures.is_empty() {
            if src_meta.is_collection {
                let delete_failures = self.delete_tree(route, &route.relative).await;
                failures.extend(
                    delete_failures
                        .into_iter()
                        .map(|(rel, error)| (route.prefix.join(&rel), error)),
                );
            } else {
                match route.provider.delete(&route.relative).await {
                    Ok(()) => self.props.remove_resource(src_abs),
                    Err(e) => failures.push((src_abs.clone(), e.into())),
                }
            }
        }

        if failures.is_empty() {
            self.locks.purge_subtree(src_abs);
            return Ok(DavResponse::empty(success_status));
        }
        let mut ms = MultiStatus::new();
        for (abs, error) in failures {
            ms.push_status(&abs.as_url(), error.status());
        }
        ms.into_response()
    }

    async fn handle_propfind(&self, route: &Resolved, request: &mut DavRequest) -> DavResult<DavResponse> {
        let depth = request.depth(Depth::Infinity)?;
        let body = request.take_body().await?;
        let spec = xml::parse_propfind(&body)?;

        let root_meta = self.meta_of(route, &route.relative).await?;
        let (resources, failures) = self.enumerate(route, &root_meta, depth).await;

        let mut ms = MultiStatus::new();
        for (rel, meta) in &resources {
            if failures.iter().any(|(failed, _)| failed == rel) {
                continue;
            }
            let abs = route.prefix.join(rel);
            let groups = self.propstat_groups(&route.provider, &abs, meta, &spec);
            ms.push_propstat(&href_for(&abs, meta.is_collection), groups);
        }
        for (rel, error) in &failures {
            let abs = route.prefix.join(rel);
            ms.push_status(&abs.as_url(), error.status());
        }
        ms.into_response()
    }

    /// Enumerate the resources a Depth-governed operation covers.
    async fn enumerate(
        &self,
        route: &Resolved,
        root_meta: &ResourceMeta,
        depth: Depth,
    ) -> (Vec<(DavPath, ResourceMeta)>, Vec<(DavPath, DavError)>) {
        let mut resources = vec![(route.relative.clone(), root_meta.clone())];
        let mut failures = Vec::new();
        if !root_meta.is_collection || depth == Depth::Zero {
            return (resources, failures);
        }

        let mut queue: VecDeque<DavPath> = VecDeque::from([route.relative.clone()]);
        while let Some(dir) = queue.pop_front() {
            match route.provider.list(&dir).await {
                Ok(entries) => {
                    for entry in entries {
                        let child = dir.child(&entry.name);
                        if entry.meta.is_collection && depth == Depth::Infinity {
                            queue.push_back(child.clone());
                        }
                        resources.push((child, entry.meta));
                    }
                }
                Err(e) => failures.push((dir, e.into())),
            }
        }
        (resources, failures)
    }

    /// Resolve one resource's properties into propstat groups.
    fn propstat_groups(
        &self,
        provider: &Arc<dyn DavProvider>,
        abs: &DavPath,
        meta: &ResourceMeta,
        spec: &PropfindSpec,
    ) -> Vec<PropstatGroup> {
        let lockdiscovery = xml::render_lockdiscovery(&self.locks.locks_for(abs));
        let ctx = LivePropContext {
            path: abs,
            meta,
            lockdiscovery: &lockdiscovery,
            supports_locking: provider.supports_locking(),
        };

        match spec {
            PropfindSpec::AllProp => {
                let mut props: Vec<RenderedProp> = prop::all_live_props(&ctx)
                    .into_iter()
                    .map(|(name, inner)| RenderedProp { name, inner })
                    .collect();
                props.extend(self.props.read(abs).into_iter().map(|(name, value)| {
                    RenderedProp {
                        name,
                        inner: Some(value),
                    }
                }));
                vec![PropstatGroup {
                    status: StatusCode::OK,
                    props,
                }]
            }
            PropfindSpec::Names => {
                let mut props: Vec<RenderedProp> = prop::all_live_props(&ctx)
                    .into_iter()
                    .map(|(name, _)| RenderedProp { name, inner: None })
                    .collect();
                props.extend(
                    self.props
                        .read(abs)
                        .into_iter()
                        .map(|(name, _)| RenderedProp { name, inner: None }),
                );
                vec![PropstatGroup {
                    status: StatusCode::OK,
                    props,
                }]
            }
            PropfindSpec::Props(names) => {
                let mut found = Vec::new();
                let mut missing = Vec::new();
                for name in names {
                    if name.ns == prop::DAV_NS {
                        match prop::live_prop_value(&name.name, &ctx) {
                            Some(inner) => found.push(RenderedProp {
                                name: name.clone(),
                                inner,
                            }),
                            // DAV: names are never dead properties.
                            None => missing.push(name.clone()),
                        }
                        continue;
                    }
                    match self.props.get(abs, name) {
                        Some(value) => found.push(RenderedProp {
                            name: name.clone(),
                            inner: Some(value),
                        }),
                        None => missing.push(name.clone()),
                    }
                }
                let mut groups = Vec::new();
                if !found.is_empty() {
                    groups.push(PropstatGroup {
                        status: StatusCode::OK,
                        props: found,
                    });
                }
                if !missing.is_empty() {
                    groups.push(PropstatGroup {
                        status: StatusCode::NOT_FOUND,
                        props: missing
                            .into_iter()
                            .map(|name| RenderedProp { name, inner: None })
                            .collect(),
                    });
                }
                groups
            }
        }
    }

    async fn handle_proppatch(&self, route: &Resolved, request: &mut DavRequest) -> DavResult<DavResponse> {
        self.meta_of(route, &route.relative).await?;
        self.require_unlocked(&request.path, false, request)?;

        let body = request.take_body().await?;
        let patch = xml::parse_proppatch(&body)?;
        let outcomes = self.props.apply(&request.path, &patch);

        // Group outcomes by status; order: 200, then 403, then 424.
        let mut statuses: Vec<StatusCode> = Vec::new();
        for outcome in &outcomes {
            if !statuses.contains(&outcome.status) {
                statuses.push(outcome.status);
            }
        }
        statuses.sort();
        let groups = statuses
            .into_iter()
            .map(|status| PropstatGroup {
                status,
                props: outcomes
                    .iter()
                    .filter(|o| o.status == status)
                    .map(|o| RenderedProp {
                        name: o.name.clone(),
                        inner: None,
                    })
                    .collect(),
            })
            .collect();

        let mut ms = MultiStatus::new();
        ms.push_propstat(&href_for(&request.path, false), groups);
        ms.into_response()
    }

    async fn handle_lock(&self, route: &Resolved, request: &mut DavRequest) -> DavResult<DavResponse> {
        if !route.provider.supports_locking() {
            return Err(DavError::MethodNotAllowed);
        }
        let depth = request.depth(Depth::Infinity)?;
        if depth == Depth::One {
            return Err(DavError::BadRequest);
        }
        let timeout = request.timeout();
        let body = request.take_body().await?;

        match xml::parse_lockinfo(&body)? {
            None => {
                // Bodyless LOCK refreshes the lock named by the If header.
                let tokens = request.if_tokens();
                let token = tokens.first().ok_or(DavError::BadRequest)?;
                let lock = self
                    .locks
                    .refresh(token, timeout)
                    .filter(|lock| lock.covers(&request.path))
                    .ok_or(DavError::PreconditionFailed)?;
                Ok(DavResponse::xml(StatusCode::OK, xml::lock_response_body(&lock)))
            }
            Some(info) => {
                let scope = if info.exclusive {
                    LockScope::Exclusive
                } else {
                    LockScope::Shared
                };
                let lock = self
                    .locks
                    .acquire(
                        &request.path,
                        scope,
                        depth == Depth::Infinity,
                        info.owner,
                        timeout,
                    )
                    .map_err(|conflict| {
                        debug!(conflict = %conflict.path, "lock request conflicts");
                        DavError::Locked
                    })?;
                let mut response =
                    DavResponse::xml(StatusCode::OK, xml::lock_response_body(&lock));
                response.set_header(
                    HeaderName::from_static("lock-token"),
                    &format!("<{}>", lock.token),
                );
                Ok(response)
            }
        }
    }

    fn handle_unlock(&self, request: &DavRequest) -> DavResult<DavResponse> {
        let token = request.lock_token().ok_or(DavError::Conflict)?;
        match self.locks.release(&request.path, &token) {
            crate::lock::ReleaseOutcome::Released => Ok(DavResponse::empty(StatusCode::NO_CONTENT)),
            crate::lock::ReleaseOutcome::NoLock => Err(DavError::Conflict),
            crate::lock::ReleaseOutcome::TokenMismatch => Err(DavError::Forbidden),
        }
    }

    /// The lock-check precondition shared by every mutating method: a
    /// conflicting lock without a presented covering token stops the
    /// request before the provider is touched.
    fn require_unlocked(&self, abs: &DavPath, deep: bool, request: &DavRequest) -> DavResult<()> {
        let tokens = request.if_tokens();
        self.locks.check(abs, deep, &tokens).map_err(|conflict| {
            debug!(path = %abs, conflict = %conflict.path, "blocked by lock");
            DavError::Locked
        })
    }

    async fn meta_of(&self, route: &Resolved, rel: &DavPath) -> DavResult<ResourceMeta> {
        route.provider.metadata(rel).await.map_err(DavError::from)
    }
}

/// Collection hrefs carry a trailing slash; the root already is one.
fn href_for(abs: &DavPath, is_collection: bool) -> String {
    let url = abs.as_url();
    if is_collection && !abs.is_root() {
        format!("{url}/")
    } else {
        url
    }
}
