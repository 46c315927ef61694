//! The per-environment module graph for unbundled dev serving.
//!
//! Tracks one [`ModuleNode`] per resolved URL, addressable by url, id
//! (resolved identifier including query), file path, and etag. Nodes carry
//! enough HMR bookkeeping (importers/imported modules, accepted deps,
//! self-accepting state, invalidation state) for [`crate::dev::hmr`] to
//! compute update boundaries without re-walking the filesystem.
//!
//! Mirrors the arena-plus-lookup-table shape already used by
//! [`crate::bundler::graph::ModuleGraph`], generalized to four index tables
//! and mutable edges instead of one static post-hoc dependency list.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tokio::sync::Mutex as AsyncMutex;

/// Arena index for a [`ModuleNode`].
pub type ModuleNodeId = usize;

/// Strip a raw request url down to the key the graph indexes nodes under.
///
/// Per the data model, `ensureEntryFromUrl`/`getModuleByUrl` strip the HMR
/// cache-busting query (`?t=...`) and the asset/raw import marker
/// (`?import`) before consulting the url index, so repeated HMR re-fetches
/// of the same module (which only differ by `?t=`) resolve to the same
/// node instead of minting a new one per request. This implementation's
/// query strings are always one of those two (or the `?v=<browserHash>`
/// suffix used on `/@modules/...` urls, which are served by a separate
/// route and never reach the graph), so stripping the whole query string
/// is equivalent to stripping just those two and is simpler.
#[must_use]
pub fn normalize_url(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

/// Module type, used to decide the `?v=` query/etag indexing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Js,
    Css,
}

/// Tri-state self-accepting flag.
///
/// Not collapsed to `Option<bool>`: `Unknown` means "not yet determined by
/// a transform pass", which is a distinct state from "determined to be
/// `false`" during propagation (an `Unknown` node is treated as non-accepting
/// for boundary purposes, but a later transform can still promote it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfAccepting {
    Unknown,
    True,
    False,
}

/// Cached transform output attached to a node.
#[derive(Debug, Clone)]
pub struct TransformResult {
    pub code: String,
    pub map: Option<String>,
    pub etag: String,
}

/// A node's invalidation state.
///
/// `Stale` carries the previous transform result so a soft invalidation
/// (dependency changed but this module's own contract didn't) can keep
/// serving the last known-good output until the next request re-transforms
/// it, per the soft/hard invalidation split.
#[derive(Debug, Clone)]
pub enum InvalidationState {
    Fresh,
    Hard,
    Stale(TransformResult),
}

/// One module in the graph.
#[derive(Debug, Clone)]
pub struct ModuleNode {
    pub url: String,
    pub id: String,
    pub file: PathBuf,
    pub kind: ModuleKind,
    pub importers: HashSet<ModuleNodeId>,
    pub imported_modules: HashSet<ModuleNodeId>,
    pub static_imported_urls: HashSet<String>,
    pub accepted_hmr_deps: HashSet<ModuleNodeId>,
    pub accepted_hmr_exports: Option<HashSet<String>>,
    pub imported_bindings: HashMap<ModuleNodeId, HashSet<String>>,
    pub is_self_accepting: SelfAccepting,
    pub transform_result: Option<TransformResult>,
    pub invalidation_state: InvalidationState,
    pub last_hmr_timestamp: u64,
    pub last_invalidation_timestamp: u64,
    pub meta: HashMap<String, serde_json::Value>,
}

impl ModuleNode {
    fn new(url: String, id: String, file: PathBuf, kind: ModuleKind) -> Self {
        Self {
            url,
            id,
            file,
            kind,
            importers: HashSet::new(),
            imported_modules: HashSet::new(),
            static_imported_urls: HashSet::new(),
            accepted_hmr_deps: HashSet::new(),
            accepted_hmr_exports: None,
            imported_bindings: HashMap::new(),
            is_self_accepting: SelfAccepting::Unknown,
            transform_result: None,
            invalidation_state: InvalidationState::Hard,
            last_hmr_timestamp: 0,
            last_invalidation_timestamp: 0,
            meta: HashMap::new(),
        }
    }
}

/// Resolved identifier returned by a [`Resolver`].
#[derive(Debug, Clone)]
pub struct ResolvedId {
    pub id: String,
    pub file: PathBuf,
    pub kind: ModuleKind,
}

/// Error resolving a specifier to a module.
#[derive(Debug)]
pub struct ResolveError {
    pub specifier: String,
    pub importer: Option<String>,
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.importer {
            Some(importer) => write!(
                f,
                "failed to resolve '{}' from '{}'",
                self.specifier, importer
            ),
            None => write!(f, "failed to resolve '{}'", self.specifier),
        }
    }
}

impl std::error::Error for ResolveError {}

/// The resolver contract the graph delegates url → file resolution to.
///
/// Implementations typically wrap [`crate::bundler::plugin::PluginContainer::resolve_id`]
/// plus the crate's default [`crate::bundler::resolve::Resolver`].
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve_id(&self, url: &str) -> Result<Option<ResolvedId>, ResolveError>;
}


/// Per-environment module graph.
///
/// Index tables are guarded by a synchronous [`RwLock`] (short critical
/// sections, never held across an `.await`); concurrent `ensure_entry_from_url`
/// calls for the same URL single-flight through the `pending` map instead of
/// triggering duplicate resolver invocations.
pub struct ModuleGraph {
    environment: String,
    track_etag: bool,
    nodes: RwLock<Vec<ModuleNode>>,
    by_url: RwLock<HashMap<String, ModuleNodeId>>,
    by_id: RwLock<HashMap<String, ModuleNodeId>>,
    by_file: RwLock<HashMap<PathBuf, Vec<ModuleNodeId>>>,
    by_etag: RwLock<HashMap<String, ModuleNodeId>>,
    /// Single-flight lock: a resolver call for any url holds this for its
    /// duration, so a burst of requests for a not-yet-resolved url collapses
    /// into one `resolve_id` call (later callers re-check the index under
    /// the same lock and find the node the leader already inserted).
    resolve_lock: AsyncMutex<()>,
    clock: AtomicU64,
}

impl ModuleGraph {
    /// Create a new empty graph for the named environment.
    ///
    /// Etag indexing is only meaningful for the `client` environment (the
    /// browser is the only consumer that round-trips an etag back to the
    /// server), matching the scope note in the data model.
    #[must_use]
    pub fn new(environment: impl Into<String>) -> Self {
        let environment = environment.into();
        let track_etag = environment == "client";
        Self {
            environment,
            track_etag,
            nodes: RwLock::new(Vec::new()),
            by_url: RwLock::new(HashMap::new()),
            by_id: RwLock::new(HashMap::new()),
            by_file: RwLock::new(HashMap::new()),
            by_etag: RwLock::new(HashMap::new()),
            resolve_lock: AsyncMutex::new(()),
            clock: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Allocate the next monotonic timestamp (used for HMR/invalidation bookkeeping).
    pub fn next_timestamp(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    #[must_use]
    pub fn get_module_by_url(&self, url: &str) -> Option<ModuleNode> {
        let url = normalize_url(url);
        let by_url = self.by_url.read().unwrap();
        let id = *by_url.get(url)?;
        self.nodes.read().unwrap().get(id).cloned()
    }

    #[must_use]
    pub fn get_module_by_id(&self, id: &str) -> Option<ModuleNode> {
        let by_id = self.by_id.read().unwrap();
        let node_id = *by_id.get(id)?;
        self.nodes.read().unwrap().get(node_id).cloned()
    }

    #[must_use]
    pub fn get_modules_by_file(&self, file: &std::path::Path) -> Vec<ModuleNode> {
        let by_file = self.by_file.read().unwrap();
        let Some(ids) = by_file.get(file) else {
            return Vec::new();
        };
        let nodes = self.nodes.read().unwrap();
        ids.iter().filter_map(|&id| nodes.get(id).cloned()).collect()
    }

    #[must_use]
    pub fn get_module_by_etag(&self, etag: &str) -> Option<ModuleNode> {
        if !self.track_etag {
            return None;
        }
        let by_etag = self.by_etag.read().unwrap();
        let id = *by_etag.get(etag)?;
        self.nodes.read().unwrap().get(id).cloned()
    }

    fn get_by_id_raw(&self, id: ModuleNodeId) -> Option<ModuleNode> {
        self.nodes.read().unwrap().get(id).cloned()
    }

    fn id_for_url(&self, url: &str) -> Option<ModuleNodeId> {
        let url = normalize_url(url);
        self.by_url.read().unwrap().get(url).copied()
    }

    fn insert_node(&self, node: ModuleNode) -> ModuleNodeId {
        let mut nodes = self.nodes.write().unwrap();
        let id = nodes.len();
        self.by_url.write().unwrap().insert(node.url.clone(), id);
        self.by_id.write().unwrap().insert(node.id.clone(), id);
        self.by_file
            .write()
            .unwrap()
            .entry(node.file.clone())
            .or_default()
            .push(id);
        nodes.push(node);
        id
    }

    /// Ensure a node exists for `url`, resolving it via `resolver` if needed.
    ///
    /// Concurrent calls for the same URL single-flight through `resolve_lock`,
    /// so a burst of requests for a module that hasn't been served yet
    /// triggers exactly one `resolve_id` call.
    pub async fn ensure_entry_from_url(
        &self,
        raw_url: &str,
        resolver: &(dyn Resolver + Sync),
    ) -> Result<ModuleNode, ResolveError> {
        let url = normalize_url(raw_url);
        if let Some(id) = self.id_for_url(url) {
            if let Some(node) = self.get_by_id_raw(id) {
                return Ok(node);
            }
        }

        // Hold the single-flight lock for the whole resolve+insert. A
        // concurrent caller blocked on this lock re-checks the index first
        // thing once it acquires it, so it observes the node the lock
        // holder just inserted instead of calling the resolver again.
        let _guard = self.resolve_lock.lock().await;

        if let Some(id) = self.id_for_url(url) {
            if let Some(node) = self.get_by_id_raw(id) {
                return Ok(node);
            }
        }

        match resolver.resolve_id(url).await {
            Ok(Some(resolved)) => {
                let id = if let Some(id) = self.id_for_url(url) {
                    id
                } else if let Some(&existing_id) = self.by_id.read().unwrap().get(&resolved.id) {
                    // Another url already resolved to the same id (e.g. an
                    // extensionless specifier and its resolved-with-extension
                    // form). Alias this url to that node rather than minting
                    // a second one, per the "at most one node per resolved
                    // id" invariant.
                    self.by_url
                        .write()
                        .unwrap()
                        .insert(url.to_string(), existing_id);
                    existing_id
                } else {
                    let node =
                        ModuleNode::new(url.to_string(), resolved.id, resolved.file, resolved.kind);
                    self.insert_node(node)
                };
                Ok(self.get_by_id_raw(id).expect("node just inserted"))
            }
            Ok(None) => Err(ResolveError {
                specifier: url.to_string(),
                importer: None,
            }),
            Err(e) => Err(e),
        }
    }

    /// Update a node's static import edges, maintaining importer back-edges.
    ///
    /// Every entry in `imported_urls` is resolved via `ensure_entry_from_url`
    /// first (creating a node for it if none exists yet) rather than only
    /// matched against the already-populated url index, since a module is
    /// routinely transformed before any of its children have been requested.
    ///
    /// Returns the urls of previously-imported nodes that lost their last
    /// importer as a result of this update (the set a `prune` HMR payload
    /// would name), empty if the import set only grew or its removals all
    /// still have another importer.
    pub async fn update_module_info(
        &self,
        url: &str,
        imported_urls: &[String],
        imported_bindings: HashMap<String, HashSet<String>>,
        resolver: &(dyn Resolver + Sync),
    ) -> Vec<String> {
        let Some(id) = self.id_for_url(url) else {
            return Vec::new();
        };

        // A parent is routinely transformed before any of its children have
        // ever been requested, so `by_url` alone can't be trusted to already
        // hold a node for each import: resolve (and create, if missing) one
        // for every entry first, in parallel, preserving input order.
        let resolved = futures::future::join_all(
            imported_urls
                .iter()
                .map(|imported_url| self.ensure_entry_from_url(imported_url, resolver)),
        )
        .await;

        let mut nodes = self.nodes.write().unwrap();
        let old_imports: Vec<ModuleNodeId> = nodes[id].imported_modules.iter().copied().collect();
        for old in &old_imports {
            if let Some(old_node) = nodes.get_mut(*old) {
                old_node.importers.remove(&id);
            }
        }

        let mut new_imports = HashSet::new();
        let mut bindings_by_id = HashMap::new();
        for (imported_url, result) in imported_urls.iter().zip(resolved.iter()) {
            let Ok(target_node) = result else { continue };
            let Some(target) = self.id_for_url(&target_node.url) else {
                continue;
            };
            new_imports.insert(target);
            if let Some(names) = imported_bindings.get(imported_url) {
                bindings_by_id.insert(target, names.clone());
            }
        }

        for &target in &new_imports {
            if let Some(target_node) = nodes.get_mut(target) {
                target_node.importers.insert(id);
            }
        }

        let pruned: Vec<String> = old_imports
            .iter()
            .filter(|old| !new_imports.contains(old))
            .filter_map(|&old| nodes.get(old))
            .filter(|old_node| old_node.importers.is_empty())
            .map(|old_node| old_node.url.clone())
            .collect();

        let node = &mut nodes[id];
        node.static_imported_urls = imported_urls.iter().cloned().collect();
        node.imported_modules = new_imports;
        node.imported_bindings = bindings_by_id;

        pruned
    }

    /// Record a fresh transform result, clearing the node's invalidation state.
    ///
    /// Each entry in `accepted_deps` is resolved via `ensure_entry_from_url`
    /// first, for the same reason as in [`Self::update_module_info`]: an
    /// `accept()` call can name a dependency that hasn't been fetched yet.
    pub async fn update_module_transform_result(
        &self,
        url: &str,
        result: TransformResult,
        self_accepting: SelfAccepting,
        accepted_deps: &[String],
        accepted_exports: Option<HashSet<String>>,
        resolver: &(dyn Resolver + Sync),
    ) {
        let Some(id) = self.id_for_url(url) else {
            return;
        };

        // Same reasoning as `update_module_info`: an `accept()` call can name
        // a dep that hasn't been fetched yet, so resolve/create rather than
        // only consulting `by_url`.
        let resolved = futures::future::join_all(
            accepted_deps
                .iter()
                .map(|dep_url| self.ensure_entry_from_url(dep_url, resolver)),
        )
        .await;
        let accepted_ids: HashSet<ModuleNodeId> = resolved
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .filter_map(|node| self.id_for_url(&node.url))
            .collect();

        let mut nodes = self.nodes.write().unwrap();
        if self.track_etag {
            let old_etag = nodes[id].transform_result.as_ref().map(|r| r.etag.clone());
            if let Some(old) = old_etag {
                self.by_etag.write().unwrap().remove(&old);
            }
            self.by_etag
                .write()
                .unwrap()
                .insert(result.etag.clone(), id);
        }

        let node = &mut nodes[id];
        node.is_self_accepting = self_accepting;
        node.accepted_hmr_deps = accepted_ids;
        node.accepted_hmr_exports = accepted_exports;
        node.transform_result = Some(result);
        node.invalidation_state = InvalidationState::Fresh;
    }

    /// Invalidate one module, cascading to its importers.
    ///
    /// `hard` forces the node to re-resolve and re-transform from scratch on
    /// next request (used when the module's own identity may have changed,
    /// e.g. a dependency it imports bare-specifier-style was re-optimized).
    /// A soft invalidation keeps the node's previous transform result
    /// available as [`InvalidationState::Stale`] so in-flight readers who
    /// grabbed a reference before the invalidation still see consistent
    /// output, per the soft-invalidation contract.
    ///
    /// Per the data model's core policy, invalidation is not confined to
    /// `mod` itself: every importer that hasn't explicitly HMR-accepted it
    /// is invalidated too (soft if the importer statically imports `mod`,
    /// hard otherwise), recursively. This is what lets an importer's cached
    /// transform result rewrite its import timestamps on next request
    /// without a full re-transform, rather than only the originally changed
    /// module ever losing its cache.
    pub fn invalidate_module(&self, url: &str, hard: bool, timestamp: u64) {
        self.invalidate_module_ex(url, hard, timestamp, false);
    }

    /// Same as [`Self::invalidate_module`], but records the invalidation as
    /// HMR-triggered (`lastHMRTimestamp` instead of `lastInvalidationTimestamp`),
    /// matching the `isHmr` flag on the spec's `invalidateModule`.
    pub fn invalidate_module_hmr(&self, url: &str, hard: bool, timestamp: u64) {
        self.invalidate_module_ex(url, hard, timestamp, true);
    }

    fn invalidate_module_ex(&self, url: &str, hard: bool, timestamp: u64, is_hmr: bool) {
        let Some(id) = self.id_for_url(url) else {
            return;
        };
        let mut seen = HashSet::new();
        self.invalidate_node(id, &mut seen, timestamp, is_hmr, !hard);
    }

    /// Recursive core of [`Self::invalidate_module`]. `soft` is this call's
    /// own softness; a node already `Hard` stays `Hard` even under a soft
    /// call ("hard dominates soft"). Recursion stops once a node has
    /// already been visited in this pass, bounding depth by `|V|` even
    /// across import cycles.
    fn invalidate_node(
        &self,
        id: ModuleNodeId,
        seen: &mut HashSet<ModuleNodeId>,
        timestamp: u64,
        is_hmr: bool,
        soft: bool,
    ) {
        if !seen.insert(id) {
            return;
        }

        let (importers, node_url): (Vec<ModuleNodeId>, String) = {
            let mut nodes = self.nodes.write().unwrap();
            let Some(node) = nodes.get_mut(id) else {
                return;
            };

            if is_hmr {
                node.last_hmr_timestamp = timestamp;
            } else {
                node.last_invalidation_timestamp = timestamp;
            }

            let already_hard = matches!(node.invalidation_state, InvalidationState::Hard);
            if !soft || already_hard {
                node.invalidation_state = InvalidationState::Hard;
                node.transform_result = None;
            } else {
                match node.transform_result.take() {
                    Some(prev) => node.invalidation_state = InvalidationState::Stale(prev),
                    None => node.invalidation_state = InvalidationState::Hard,
                }
            }

            let importers: Vec<ModuleNodeId> = node.importers.iter().copied().collect();
            (importers, node.url.clone())
        };

        if self.track_etag {
            // The etag entry for this node's (just-cleared) transform result
            // is stale regardless of hard/soft; drop it eagerly rather than
            // leaving a dangling etag -> node mapping.
            let mut by_etag = self.by_etag.write().unwrap();
            by_etag.retain(|_, &mut nid| nid != id);
        }

        for importer_id in importers {
            // An importer that explicitly declared `accept([mod, ...])`
            // handles this dependency's update itself and needn't be
            // invalidated in turn (its own transform result, including the
            // accept() call site, is still valid).
            let (importer_accepts, importer_soft) = {
                let nodes = self.nodes.read().unwrap();
                let Some(importer) = nodes.get(importer_id) else {
                    continue;
                };
                let accepts = importer.accepted_hmr_deps.contains(&id);
                let statically_imports = importer.static_imported_urls.contains(&node_url);
                (accepts, statically_imports || soft)
            };
            if importer_accepts {
                continue;
            }
            self.invalidate_node(importer_id, seen, timestamp, is_hmr, importer_soft);
        }
    }

    /// Invalidate every module in the graph (used on full reload or config change).
    pub fn invalidate_all(&self) {
        let timestamp = self.next_timestamp();
        let mut nodes = self.nodes.write().unwrap();
        for node in nodes.iter_mut() {
            node.last_invalidation_timestamp = timestamp;
            node.invalidation_state = InvalidationState::Hard;
        }
    }

    /// Invalidate every node whose file matches `file`, returning their urls.
    ///
    /// This is the entry point the filesystem watcher calls. `hard` mirrors
    /// the `invalidate_module` policy; file changes are hard invalidations
    /// unless the caller has already determined the change is soft-safe
    /// (e.g. only the module's exports' runtime values changed, not its
    /// public shape) via the HMR propagator.
    pub fn on_file_change(&self, file: &std::path::Path, hard: bool) -> Vec<String> {
        let timestamp = self.next_timestamp();
        let ids = self
            .by_file
            .read()
            .unwrap()
            .get(file)
            .cloned()
            .unwrap_or_default();
        let urls: Vec<String> = {
            let nodes = self.nodes.read().unwrap();
            ids.iter().filter_map(|&id| nodes.get(id).map(|n| n.url.clone())).collect()
        };
        for url in &urls {
            self.invalidate_module(url, hard, timestamp);
        }
        urls
    }

    /// Create a node for a file with no corresponding served URL (e.g. a
    /// `.d.ts` or a file outside the graph that the watcher still needs to
    /// track for HMR purposes). Returns the synthetic URL assigned.
    pub fn create_file_only_entry(&self, file: PathBuf, kind: ModuleKind) -> String {
        let url = format!("/@fs{}", file.display());
        if self.id_for_url(&url).is_some() {
            return url;
        }
        let id_str = url.clone();
        let node = ModuleNode::new(url.clone(), id_str, file, kind);
        self.insert_node(node);
        url
    }

    /// Look up a node by its arena id (used by the HMR propagator, which
    /// walks the graph by id to avoid repeated url hashing).
    #[must_use]
    pub fn node(&self, id: ModuleNodeId) -> Option<ModuleNode> {
        self.get_by_id_raw(id)
    }

    /// Look up a node's arena id by url.
    #[must_use]
    pub fn id_of_url(&self, url: &str) -> Option<ModuleNodeId> {
        self.id_for_url(url)
    }

    /// Snapshot the importers of a node by url (used by the HMR propagator).
    #[must_use]
    pub fn importer_urls(&self, url: &str) -> Vec<String> {
        let Some(id) = self.id_for_url(url) else {
            return Vec::new();
        };
        let nodes = self.nodes.read().unwrap();
        let Some(node) = nodes.get(id) else {
            return Vec::new();
        };
        node.importers
            .iter()
            .filter_map(|&iid| nodes.get(iid).map(|n| n.url.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticResolver {
        root: PathBuf,
    }

    #[async_trait]
    impl Resolver for StaticResolver {
        async fn resolve_id(&self, url: &str) -> Result<Option<ResolvedId>, ResolveError> {
            if url == "/missing.ts" {
                return Ok(None);
            }
            let file = self.root.join(url.trim_start_matches('/'));
            let kind = if url.ends_with(".css") {
                ModuleKind::Css
            } else {
                ModuleKind::Js
            };
            Ok(Some(ResolvedId {
                id: url.to_string(),
                file,
                kind,
            }))
        }
    }

    #[tokio::test]
    async fn ensure_entry_from_url_inserts_and_reuses() {
        let graph = ModuleGraph::new("client");
        let resolver = StaticResolver {
            root: PathBuf::from("/project"),
        };

        let a = graph.ensure_entry_from_url("/src/App.tsx", &resolver).await.unwrap();
        let b = graph.ensure_entry_from_url("/src/App.tsx", &resolver).await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(graph.get_module_by_url("/src/App.tsx").unwrap().url, "/src/App.tsx");
    }

    #[tokio::test]
    async fn ensure_entry_from_url_reports_resolve_error() {
        let graph = ModuleGraph::new("client");
        let resolver = StaticResolver {
            root: PathBuf::from("/project"),
        };

        let err = graph.ensure_entry_from_url("/missing.ts", &resolver).await.unwrap_err();
        assert_eq!(err.specifier, "/missing.ts");
    }

    #[tokio::test]
    async fn update_module_info_maintains_importer_edges() {
        let graph = ModuleGraph::new("client");
        let resolver = StaticResolver {
            root: PathBuf::from("/project"),
        };
        graph.ensure_entry_from_url("/src/main.tsx", &resolver).await.unwrap();
        graph.ensure_entry_from_url("/src/App.tsx", &resolver).await.unwrap();

        graph
            .update_module_info(
                "/src/main.tsx",
                &["/src/App.tsx".to_string()],
                HashMap::new(),
                &resolver,
            )
            .await;

        assert_eq!(graph.importer_urls("/src/App.tsx"), vec!["/src/main.tsx".to_string()]);
    }

    #[tokio::test]
    async fn update_module_info_creates_nodes_for_not_yet_requested_children() {
        // A parent is routinely transformed (and has update_module_info
        // called on it) before any of its children have ever been fetched
        // by the browser; the graph must still wire up the importer edge
        // rather than silently dropping it because `by_url` doesn't have
        // App.tsx yet.
        let graph = ModuleGraph::new("client");
        let resolver = StaticResolver {
            root: PathBuf::from("/project"),
        };
        graph.ensure_entry_from_url("/src/main.tsx", &resolver).await.unwrap();

        assert!(graph.get_module_by_url("/src/App.tsx").is_none());

        graph
            .update_module_info(
                "/src/main.tsx",
                &["/src/App.tsx".to_string()],
                HashMap::new(),
                &resolver,
            )
            .await;

        assert!(graph.get_module_by_url("/src/App.tsx").is_some());
        assert_eq!(graph.importer_urls("/src/App.tsx"), vec!["/src/main.tsx".to_string()]);
    }

    #[tokio::test]
    async fn update_module_info_reports_nodes_that_lost_their_last_importer() {
        let graph = ModuleGraph::new("client");
        let resolver = StaticResolver {
            root: PathBuf::from("/project"),
        };
        graph.ensure_entry_from_url("/src/main.tsx", &resolver).await.unwrap();
        graph.ensure_entry_from_url("/src/App.tsx", &resolver).await.unwrap();
        graph.ensure_entry_from_url("/src/util.ts", &resolver).await.unwrap();

        graph
            .update_module_info(
                "/src/main.tsx",
                &["/src/App.tsx".to_string(), "/src/util.ts".to_string()],
                HashMap::new(),
                &resolver,
            )
            .await;

        // Dropping /src/util.ts from main's imports; App.tsx doesn't import it
        // elsewhere, so it should be reported as pruned.
        let pruned = graph
            .update_module_info(
                "/src/main.tsx",
                &["/src/App.tsx".to_string()],
                HashMap::new(),
                &resolver,
            )
            .await;
        assert_eq!(pruned, vec!["/src/util.ts".to_string()]);

        // App.tsx still has an importer, so a no-op update reports nothing.
        let pruned_again = graph
            .update_module_info(
                "/src/main.tsx",
                &["/src/App.tsx".to_string()],
                HashMap::new(),
                &resolver,
            )
            .await;
        assert!(pruned_again.is_empty());
    }

    #[tokio::test]
    async fn soft_invalidation_preserves_previous_transform_result() {
        let graph = ModuleGraph::new("client");
        let resolver = StaticResolver {
            root: PathBuf::from("/project"),
        };
        graph.ensure_entry_from_url("/src/App.tsx", &resolver).await.unwrap();
        graph
            .update_module_transform_result(
                "/src/App.tsx",
                TransformResult {
                    code: "export default 1;".into(),
                    map: None,
                    etag: "abc".into(),
                },
                SelfAccepting::True,
                &[],
                None,
                &resolver,
            )
            .await;

        graph.invalidate_module("/src/App.tsx", false, 42);
        let node = graph.get_module_by_url("/src/App.tsx").unwrap();
        match node.invalidation_state {
            InvalidationState::Stale(result) => assert_eq!(result.code, "export default 1;"),
            other => panic!("expected Stale, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn hard_invalidation_drops_transform_result() {
        let graph = ModuleGraph::new("client");
        let resolver = StaticResolver {
            root: PathBuf::from("/project"),
        };
        graph.ensure_entry_from_url("/src/App.tsx", &resolver).await.unwrap();
        graph.invalidate_module("/src/App.tsx", true, 1);
        let node = graph.get_module_by_url("/src/App.tsx").unwrap();
        assert!(matches!(node.invalidation_state, InvalidationState::Hard));
    }

    #[tokio::test]
    async fn hard_invalidation_cascades_soft_to_static_importer() {
        // main.tsx statically imports util.ts; invalidating util.ts hard
        // must soft-invalidate main.tsx too (its cached output only needs
        // its import timestamp rewritten, not a full re-transform), per the
        // core invalidateModule policy.
        let graph = ModuleGraph::new("client");
        let resolver = StaticResolver {
            root: PathBuf::from("/project"),
        };
        graph.ensure_entry_from_url("/src/util.ts", &resolver).await.unwrap();
        graph.ensure_entry_from_url("/src/main.tsx", &resolver).await.unwrap();
        graph
            .update_module_info(
                "/src/main.tsx",
                &["/src/util.ts".to_string()],
                HashMap::new(),
                &resolver,
            )
            .await;
        for url in ["/src/util.ts", "/src/main.tsx"] {
            graph
                .update_module_transform_result(
                    url,
                    TransformResult {
                        code: format!("/* {url} */"),
                        map: None,
                        etag: format!("etag-{url}"),
                    },
                    SelfAccepting::False,
                    &[],
                    None,
                    &resolver,
                )
                .await;
        }

        graph.invalidate_module("/src/util.ts", true, 7);

        let util = graph.get_module_by_url("/src/util.ts").unwrap();
        assert!(matches!(util.invalidation_state, InvalidationState::Hard));

        let main = graph.get_module_by_url("/src/main.tsx").unwrap();
        match main.invalidation_state {
            InvalidationState::Stale(result) => assert!(result.code.contains("main.tsx")),
            other => panic!("expected main.tsx to be soft-invalidated, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn importer_accepting_dep_is_not_cascaded_into() {
        // main.tsx declares `import.meta.hot.accept(['./util.ts'], ...)`, so
        // invalidating util.ts must not touch main.tsx's own cached result.
        let graph = ModuleGraph::new("client");
        let resolver = StaticResolver {
            root: PathBuf::from("/project"),
        };
        graph.ensure_entry_from_url("/src/util.ts", &resolver).await.unwrap();
        graph.ensure_entry_from_url("/src/main.tsx", &resolver).await.unwrap();
        graph
            .update_module_info(
                "/src/main.tsx",
                &["/src/util.ts".to_string()],
                HashMap::new(),
                &resolver,
            )
            .await;
        graph
            .update_module_transform_result(
                "/src/main.tsx",
                TransformResult {
                    code: "main".into(),
                    map: None,
                    etag: "main-etag".into(),
                },
                SelfAccepting::False,
                &["/src/util.ts".to_string()],
                None,
                &resolver,
            )
            .await;

        graph.invalidate_module("/src/util.ts", true, 3);

        let main = graph.get_module_by_url("/src/main.tsx").unwrap();
        assert!(matches!(main.invalidation_state, InvalidationState::Fresh));
        assert!(main.transform_result.is_some());
    }

    #[tokio::test]
    async fn invalidation_terminates_through_import_cycle() {
        let graph = ModuleGraph::new("client");
        let resolver = StaticResolver {
            root: PathBuf::from("/project"),
        };
        graph.ensure_entry_from_url("/src/a.ts", &resolver).await.unwrap();
        graph.ensure_entry_from_url("/src/b.ts", &resolver).await.unwrap();
        graph
            .update_module_info("/src/a.ts", &["/src/b.ts".to_string()], HashMap::new(), &resolver)
            .await;
        graph
            .update_module_info("/src/b.ts", &["/src/a.ts".to_string()], HashMap::new(), &resolver)
            .await;

        // Must terminate rather than loop forever between a <-> b.
        graph.invalidate_module("/src/a.ts", true, 1);

        assert!(matches!(
            graph.get_module_by_url("/src/a.ts").unwrap().invalidation_state,
            InvalidationState::Hard
        ));
        assert!(matches!(
            graph.get_module_by_url("/src/b.ts").unwrap().invalidation_state,
            InvalidationState::Hard
        ));
    }

    #[tokio::test]
    async fn etag_index_only_tracked_for_client_environment() {
        let ssr_graph = ModuleGraph::new("ssr");
        let resolver = StaticResolver {
            root: PathBuf::from("/project"),
        };
        ssr_graph.ensure_entry_from_url("/src/App.tsx", &resolver).await.unwrap();
        ssr_graph
            .update_module_transform_result(
                "/src/App.tsx",
                TransformResult {
                    code: "x".into(),
                    map: None,
                    etag: "etag1".into(),
                },
                SelfAccepting::Unknown,
                &[],
                None,
                &resolver,
            )
            .await;
        assert!(ssr_graph.get_module_by_etag("etag1").is_none());
    }

    struct AliasResolver {
        root: PathBuf,
    }

    #[async_trait]
    impl Resolver for AliasResolver {
        async fn resolve_id(&self, url: &str) -> Result<Option<ResolvedId>, ResolveError> {
            // Both the extensionless specifier and its resolved form name
            // the same underlying file and must land on the same node.
            let id = if url == "/src/util" {
                "/src/util.ts".to_string()
            } else {
                url.to_string()
            };
            Ok(Some(ResolvedId {
                id: id.clone(),
                file: self.root.join(id.trim_start_matches('/')),
                kind: ModuleKind::Js,
            }))
        }
    }

    #[tokio::test]
    async fn ensure_entry_from_url_aliases_distinct_urls_resolving_to_same_id() {
        let graph = ModuleGraph::new("client");
        let resolver = AliasResolver {
            root: PathBuf::from("/project"),
        };

        let via_extension = graph
            .ensure_entry_from_url("/src/util.ts", &resolver)
            .await
            .unwrap();
        let via_bare_specifier = graph
            .ensure_entry_from_url("/src/util", &resolver)
            .await
            .unwrap();

        assert_eq!(via_extension.id, via_bare_specifier.id);
        assert!(graph.get_module_by_url("/src/util.ts").is_some());
        assert!(graph.get_module_by_url("/src/util").is_some());

        // Only one node was created for the shared id: invalidating through
        // one url must be visible through the other.
        graph.invalidate_module("/src/util", true, 1);
        assert!(matches!(
            graph.get_module_by_url("/src/util.ts").unwrap().invalidation_state,
            InvalidationState::Hard
        ));
    }

    #[tokio::test]
    async fn on_file_change_invalidates_all_urls_for_file() {
        let graph = ModuleGraph::new("client");
        let resolver = StaticResolver {
            root: PathBuf::from("/project"),
        };
        graph.ensure_entry_from_url("/src/App.tsx", &resolver).await.unwrap();
        let urls = graph.on_file_change(&PathBuf::from("/project/src/App.tsx"), true);
        assert_eq!(urls, vec!["/src/App.tsx".to_string()]);
    }
}
