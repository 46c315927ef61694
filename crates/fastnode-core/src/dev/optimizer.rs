//! Dependency pre-bundling optimizer for dev serving.
//!
//! Keeps a cache of pre-bundled third-party dependencies current while the
//! dev server is running. Tracks three dep categories (`optimized`, `chunks`,
//! `discovered`), debounces missing-dependency discovery coming off the
//! transform pipeline, and decides per re-bundle whether the result is
//! reload-safe (existing `?v=` URLs in the browser stay valid) or requires a
//! full page reload.
//!
//! Its `scan_entries` discovery step walks the entry graph for bare import
//! specifiers; the bundling-and-commit loop builds each dependency's
//! virtual entry and bundles it through [`crate::bundler::Bundler`] as a
//! debounced, batched, cancellable state machine.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;

use crate::bundler::{BundleFormat, BundleOptions, Bundler};
use crate::dev::graph::ModuleGraph;
use crate::dev::hmr::HmrPayload;
use crate::dev::HmrChannel;

/// How aggressively the optimizer discovers dependencies before the first request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizeDepsStrategy {
    /// Eagerly scan entries before accepting the first request.
    PreScan,
    /// Scan in the background while the server serves.
    Scan,
    /// Discover deps only as requests arrive.
    Lazy,
    /// Also crawl dynamic imports during cold start.
    Eager,
}

impl Default for OptimizeDepsStrategy {
    fn default() -> Self {
        Self::Lazy
    }
}

impl OptimizeDepsStrategy {
    /// Parse a config file's `optimizeDeps.strategy` string. Unrecognized
    /// values fall back to the default rather than erroring, matching how
    /// the rest of config loading tolerates unknown/malformed fields.
    #[must_use]
    pub fn from_config_str(s: &str) -> Self {
        match s {
            "prescan" | "pre-scan" => Self::PreScan,
            "scan" => Self::Scan,
            "eager" => Self::Eager,
            _ => Self::Lazy,
        }
    }
}

/// State of the optimizer's single in-flight run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerState {
    Idle,
    Scanning,
    Debouncing,
    Processing,
    Committing,
}

/// Static export-shape summary the bundler infers for a dependency.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportsData {
    pub has_named_exports: bool,
    pub has_default_export: bool,
}

/// Metadata for one pre-bundled (or in-flight) dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepInfo {
    pub id: String,
    pub file: PathBuf,
    pub src: PathBuf,
    pub file_hash: String,
    pub browser_hash: String,
    pub needs_interop: bool,
    pub exports_data: ExportsData,
}

/// Outcome of the batch a [`DepInfo::processing`] future/watch resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    Committed,
    Reloaded,
    Failed,
}

/// Returned by [`DepOptimizer::register_missing_import`]: the speculative
/// `DepInfo` the caller can rewrite a URL against immediately, plus a handle
/// that resolves once the batch containing this dep lands.
#[derive(Debug, Clone)]
pub struct RegisteredDep {
    pub info: DepInfo,
    pub processing: watch::Receiver<Option<BatchOutcome>>,
}

/// Persisted, committed state of the optimizer: everything actually on disk.
///
/// `discovered` deliberately has no place here — it is live, in-flight state
/// owned by [`DepOptimizer`] and never round-tripped to the cache file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptimizerMetadata {
    pub hash: String,
    pub browser_hash: String,
    pub optimized: HashMap<String, DepInfo>,
    pub chunks: HashMap<String, DepInfo>,
}

/// The bundler's report on a batch of inputs, before `commit`/`cancel`.
#[derive(Debug, Clone)]
pub struct NewBundleMetadata {
    pub hash: String,
    pub optimized: HashMap<String, DepInfo>,
    pub chunks: HashMap<String, DepInfo>,
}

/// A pending bundler run: consumed exactly once, by `commit` or `cancel`.
#[async_trait]
pub trait BundleRun: Send {
    fn metadata(&self) -> &NewBundleMetadata;
    async fn commit(self: Box<Self>) -> Result<(), OptimizerError>;
    async fn cancel(self: Box<Self>) -> Result<(), OptimizerError>;
}

/// The bundler contract the optimizer delegates batch-bundling to.
#[async_trait]
pub trait DepBundler: Send + Sync {
    async fn bundle(
        &self,
        inputs: HashMap<String, DepInfo>,
    ) -> Result<Box<dyn BundleRun>, OptimizerError>;
}

/// Error from the optimizer or the bundler it drives.
///
/// Hand-written `Display`/`Error`, matching the struct-plus-manual-impl
/// convention already used by `PreBundleError`/`BundleError`/
/// `ModuleTransformError` in this module, rather than the crate-root
/// `thiserror` enum convention.
#[derive(Debug)]
pub struct OptimizerError {
    pub message: String,
}

impl std::fmt::Display for OptimizerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for OptimizerError {}

impl From<std::io::Error> for OptimizerError {
    fn from(e: std::io::Error) -> Self {
        Self {
            message: e.to_string(),
        }
    }
}

// ---------------------------------------------------------------------
// Sync bundler adapter
// ---------------------------------------------------------------------

/// Bundles each dependency's virtual re-export entry with the crate's
/// existing synchronous [`Bundler`], via `spawn_blocking`. Generalizes a
/// per-dependency virtual-entry bundling technique to a whole batch, made
/// atomic via a temp dir of outputs renamed into place file-by-file on
/// commit.
pub struct SyncBundlerAdapter {
    root: PathBuf,
    deps_dir: PathBuf,
}

impl SyncBundlerAdapter {
    #[must_use]
    pub fn new(root: PathBuf, cache_dir: PathBuf) -> Self {
        Self {
            root,
            deps_dir: cache_dir.join("deps"),
        }
    }

    fn bundle_sync(
        root: &Path,
        deps_dir: &Path,
        inputs: &HashMap<String, DepInfo>,
    ) -> Result<(PathBuf, NewBundleMetadata), OptimizerError> {
        let temp_dir = deps_dir
            .parent()
            .unwrap_or(deps_dir)
            .join(format!(".tmp-optimize-{}", std::process::id()));
        fs::create_dir_all(&temp_dir)?;

        let bundler = Bundler::with_cwd(root);
        let options = BundleOptions {
            format: BundleFormat::Esm,
            treeshake: false,
            minify: false,
            ..Default::default()
        };

        let mut optimized = HashMap::new();
        let mut ids: Vec<&String> = inputs.keys().collect();
        ids.sort();

        for id in &ids {
            let dep = &inputs[*id];
            let file_name = format!("{}.js", sanitize_id(id));
            let entry_path = temp_dir.join(format!("_entry_{}", file_name));
            let entry_code = format!("export * from '{}';", dep.src.display());
            fs::write(&entry_path, &entry_code)?;

            let result = bundler.bundle(&entry_path, root, &options).map_err(|e| {
                OptimizerError {
                    message: format!("failed to pre-bundle '{id}': {e}"),
                }
            })?;
            let _ = fs::remove_file(&entry_path);

            let out_path = temp_dir.join(&file_name);
            fs::write(&out_path, &result.code)?;

            let has_named_exports = result.code.contains("export {") || result.code.contains("export const") || result.code.contains("export function");
            let has_default_export = result.code.contains("export default");
            let file_hash = blake3::hash(result.code.as_bytes()).to_hex().to_string();

            optimized.insert(
                (*id).clone(),
                DepInfo {
                    id: (*id).clone(),
                    file: deps_dir.join(&file_name),
                    src: dep.src.clone(),
                    file_hash,
                    browser_hash: String::new(),
                    needs_interop: has_default_export && !has_named_exports,
                    exports_data: ExportsData {
                        has_named_exports,
                        has_default_export,
                    },
                },
            );
        }

        let hash = hash_strings(ids.iter().map(|s| s.as_str()));

        Ok((
            temp_dir,
            NewBundleMetadata {
                hash,
                optimized,
                chunks: HashMap::new(),
            },
        ))
    }
}

#[async_trait]
impl DepBundler for SyncBundlerAdapter {
    async fn bundle(
        &self,
        inputs: HashMap<String, DepInfo>,
    ) -> Result<Box<dyn BundleRun>, OptimizerError> {
        let root = self.root.clone();
        let deps_dir = self.deps_dir.clone();
        let (temp_dir, metadata) = tokio::task::spawn_blocking(move || {
            SyncBundlerAdapter::bundle_sync(&root, &deps_dir, &inputs)
        })
        .await
        .map_err(|e| OptimizerError {
            message: format!("bundler task panicked: {e}"),
        })??;

        Ok(Box::new(TempDirBundleRun {
            temp_dir,
            deps_dir: self.deps_dir.clone(),
            metadata,
        }))
    }
}

/// A bundler run whose output lives in a temp dir until `commit` renames
/// each artifact into place (or `cancel` discards the whole dir).
struct TempDirBundleRun {
    temp_dir: PathBuf,
    deps_dir: PathBuf,
    metadata: NewBundleMetadata,
}

#[async_trait]
impl BundleRun for TempDirBundleRun {
    fn metadata(&self) -> &NewBundleMetadata {
        &self.metadata
    }

    async fn commit(self: Box<Self>) -> Result<(), OptimizerError> {
        let this = *self;
        tokio::task::spawn_blocking(move || -> Result<(), OptimizerError> {
            fs::create_dir_all(&this.deps_dir)?;
            for dep in this.metadata.optimized.values().chain(this.metadata.chunks.values()) {
                let Some(file_name) = dep.file.file_name() else {
                    continue;
                };
                let temp_path = this.temp_dir.join(file_name);
                if temp_path.exists() {
                    fs::rename(&temp_path, &dep.file)?;
                }
            }
            let _ = fs::remove_dir_all(&this.temp_dir);
            Ok(())
        })
        .await
        .map_err(|e| OptimizerError {
            message: format!("commit task panicked: {e}"),
        })?
    }

    async fn cancel(self: Box<Self>) -> Result<(), OptimizerError> {
        let temp_dir = self.temp_dir.clone();
        tokio::task::spawn_blocking(move || {
            let _ = fs::remove_dir_all(&temp_dir);
        })
        .await
        .map_err(|e| OptimizerError {
            message: format!("cancel task panicked: {e}"),
        })?;
        Ok(())
    }
}

fn sanitize_id(id: &str) -> String {
    id.replace(['/', '\\', ':', '@'], "_")
}

// ---------------------------------------------------------------------
// Entry scanning
// ---------------------------------------------------------------------

/// Scan one file's source for bare import specifiers (static, re-export, and
/// dynamic `import()`), ignoring relative/absolute/virtual specifiers.
#[must_use]
pub fn scan_bare_imports(source: &str) -> HashSet<String> {
    let mut bare_imports = HashSet::new();

    for line in source.lines() {
        let trimmed = line.trim();

        if (trimmed.starts_with("import ") || trimmed.starts_with("export "))
            && trimmed.contains(" from ")
        {
            if let Some(specifier) = extract_specifier_from_line(trimmed) {
                if is_bare_specifier(&specifier) {
                    bare_imports.insert(package_name_from_specifier(&specifier));
                }
            }
        }

        if trimmed.contains("import(") {
            if let Some(specifier) = extract_dynamic_specifier(trimmed) {
                if is_bare_specifier(&specifier) {
                    bare_imports.insert(package_name_from_specifier(&specifier));
                }
            }
        }
    }

    bare_imports
}

fn relative_specifiers(source: &str) -> Vec<String> {
    let mut out = Vec::new();
    for line in source.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("import ") && trimmed.contains(" from ") {
            if let Some(specifier) = extract_specifier_from_line(trimmed) {
                if specifier.starts_with("./") || specifier.starts_with("../") {
                    out.push(specifier);
                }
            }
        }
    }
    out
}

fn extract_specifier_from_line(line: &str) -> Option<String> {
    let from_idx = line.find(" from ")?;
    let after_from = &line[from_idx + 6..];
    let trimmed = after_from.trim();
    let quote = trimmed.chars().next()?;
    if quote != '\'' && quote != '"' {
        return None;
    }
    let inner = &trimmed[1..];
    let end_idx = inner.find(quote)?;
    Some(inner[..end_idx].to_string())
}

fn extract_dynamic_specifier(line: &str) -> Option<String> {
    let start = line.find("import(")?;
    let after = &line[start + 7..];
    let trimmed = after.trim();
    let quote = trimmed.chars().next()?;
    if quote != '\'' && quote != '"' {
        return None;
    }
    let inner = &trimmed[1..];
    let end_idx = inner.find(quote)?;
    Some(inner[..end_idx].to_string())
}

fn is_bare_specifier(specifier: &str) -> bool {
    !specifier.starts_with('.')
        && !specifier.starts_with('/')
        && !specifier.starts_with('\0')
        && !specifier.starts_with("node:")
        && !specifier.starts_with("data:")
}

/// Synchronous walk driving [`DepOptimizer::scan_entries`]; runs on a
/// blocking thread since it touches the filesystem recursively.
fn scan_entries_blocking(root: &Path, entries: &[PathBuf]) -> Vec<(String, PathBuf)> {
    let mut visited = HashSet::new();
    let mut queue: Vec<PathBuf> = entries.to_vec();
    let mut bare = HashSet::new();

    while let Some(path) = queue.pop() {
        if !visited.insert(path.clone()) {
            continue;
        }
        let Ok(source) = fs::read_to_string(&path) else {
            continue;
        };
        bare.extend(scan_bare_imports(&source));

        let Some(parent) = path.parent() else {
            continue;
        };
        for rel in relative_specifiers(&source) {
            if let Some(candidate) = resolve_relative_file(parent, &rel) {
                queue.push(candidate);
            }
        }
    }

    bare.into_iter()
        .filter_map(|pkg| {
            let dir = root.join("node_modules").join(&pkg);
            dir.exists().then_some((pkg, dir))
        })
        .collect()
}

fn resolve_relative_file(base: &Path, specifier: &str) -> Option<PathBuf> {
    let joined = base.join(specifier);
    const EXTS: [&str; 5] = ["", ".ts", ".tsx", ".js", ".jsx"];
    for ext in EXTS {
        let candidate = if ext.is_empty() {
            joined.clone()
        } else {
            let mut p = joined.clone().into_os_string();
            p.push(ext);
            PathBuf::from(p)
        };
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    for ext in ["index.ts", "index.tsx", "index.js", "index.jsx"] {
        let candidate = joined.join(ext);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

fn package_name_from_specifier(specifier: &str) -> String {
    if specifier.starts_with('@') {
        let parts: Vec<&str> = specifier.splitn(3, '/').collect();
        if parts.len() >= 2 {
            format!("{}/{}", parts[0], parts[1])
        } else {
            specifier.to_string()
        }
    } else {
        specifier.split('/').next().unwrap_or(specifier).to_string()
    }
}

fn hash_strings<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    let mut hasher = blake3::Hasher::new();
    for p in parts {
        hasher.update(p.as_bytes());
        hasher.update(b"\0");
    }
    hasher.finalize().to_hex().to_string()
}

// ---------------------------------------------------------------------
// The optimizer itself
// ---------------------------------------------------------------------

struct Inner {
    state: OptimizerState,
    metadata: OptimizerMetadata,
    discovered: HashMap<String, DepInfo>,
    current_batch: Option<watch::Sender<Option<BatchOutcome>>>,
    queued_batches: Vec<watch::Sender<Option<BatchOutcome>>>,
    debounce_deadline: Option<Instant>,
    in_flight_requests: HashSet<String>,
    workers_excluded: HashSet<String>,
    gate_open: bool,
    reload_counter: u64,
}

/// Per-environment dependency pre-bundling optimizer.
///
/// Single-threaded cooperative scheduling: all state lives behind one
/// `tokio::sync::Mutex`, held only across short synchronous regions between
/// awaits, matching §5's shared-resource policy. Batches are strictly
/// serial — a new batch cannot start while one is `Processing`/`Committing` —
/// enforced simply by the fact that [`Self::run_batch`] holds the state lock
/// for its synchronous snapshot step and only one call to it is ever live at
/// a time (driven by the single debounce task spawned in
/// [`Self::spawn_debounce_task`]).
pub struct DepOptimizer {
    root: PathBuf,
    cache_dir: PathBuf,
    strategy: OptimizeDepsStrategy,
    bundler: Arc<dyn DepBundler>,
    debounce: std::time::Duration,
    idle_wait: std::time::Duration,
    session: String,
    inner: Mutex<Inner>,
    notify: tokio::sync::Notify,
}

impl DepOptimizer {
    /// Create a new optimizer, loading a persisted metadata file from
    /// `cache_dir` if its `hash` matches `input_hash` (lockfile + include/
    /// exclude config); otherwise the cache is rebuilt from scratch.
    #[must_use]
    pub fn new(
        root: PathBuf,
        cache_dir: PathBuf,
        strategy: OptimizeDepsStrategy,
        bundler: Arc<dyn DepBundler>,
        input_hash: String,
    ) -> Self {
        let metadata = Self::load_persisted(&cache_dir, &input_hash).unwrap_or_else(|| {
            let browser_hash = hash_strings(std::iter::once(input_hash.as_str()));
            OptimizerMetadata {
                hash: input_hash,
                browser_hash,
                optimized: HashMap::new(),
                chunks: HashMap::new(),
            }
        });

        // Pre-scan and scan strategies open the first-run gate immediately;
        // lazy/eager wait for a request signal or the watchdog in
        // `ensure_first_run`.
        let gate_open = matches!(strategy, OptimizeDepsStrategy::PreScan | OptimizeDepsStrategy::Scan);

        Self {
            root,
            cache_dir,
            strategy,
            bundler,
            debounce: std::time::Duration::from_millis(100),
            idle_wait: std::time::Duration::from_millis(100),
            session: format!("{}-{}", std::process::id(), std::process::id()),
            inner: Mutex::new(Inner {
                state: OptimizerState::Idle,
                metadata,
                discovered: HashMap::new(),
                current_batch: None,
                queued_batches: Vec::new(),
                debounce_deadline: None,
                in_flight_requests: HashSet::new(),
                workers_excluded: HashSet::new(),
                gate_open,
                reload_counter: 0,
            }),
            notify: tokio::sync::Notify::new(),
        }
    }

    #[must_use]
    pub fn strategy(&self) -> OptimizeDepsStrategy {
        self.strategy
    }

    /// Recursively walk `entries` and their same-project relative imports,
    /// registering every bare specifier found as a `discovered` dependency.
    ///
    /// This is the `pre-scan`/`scan` strategies' discovery step: instead of
    /// waiting for the transform pipeline to hit an unresolved bare import
    /// one request at a time, it crawls the entry graph up front so the
    /// first debounced batch already covers most of the app's third-party
    /// surface.
    pub async fn scan_entries(&self, entries: &[PathBuf]) {
        let root = self.root.clone();
        let seeds = entries.to_vec();
        let found = tokio::task::spawn_blocking(move || scan_entries_blocking(&root, &seeds))
            .await
            .unwrap_or_default();

        for (pkg, resolved) in found {
            self.register_missing_import(&pkg, resolved).await;
        }
    }

    fn metadata_path(cache_dir: &Path) -> PathBuf {
        cache_dir.join("_metadata.json")
    }

    fn load_persisted(cache_dir: &Path, expected_hash: &str) -> Option<OptimizerMetadata> {
        let data = fs::read(Self::metadata_path(cache_dir)).ok()?;
        let metadata: OptimizerMetadata = serde_json::from_slice(&data).ok()?;
        if metadata.hash == expected_hash {
            Some(metadata)
        } else {
            None
        }
    }

    async fn persist_metadata(&self, metadata: &OptimizerMetadata) -> Result<(), OptimizerError> {
        let cache_dir = self.cache_dir.clone();
        let data = serde_json::to_vec_pretty(metadata).map_err(|e| OptimizerError {
            message: format!("failed to serialize optimizer metadata: {e}"),
        })?;
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            fs::create_dir_all(&cache_dir)?;
            let tmp = cache_dir.join(format!("_metadata.json.tmp-{}", std::process::id()));
            fs::write(&tmp, &data)?;
            fs::rename(&tmp, Self::metadata_path(&cache_dir))?;
            Ok(())
        })
        .await
        .map_err(|e| OptimizerError {
            message: format!("persist task panicked: {e}"),
        })??;
        Ok(())
    }

    #[must_use]
    pub async fn state(&self) -> OptimizerState {
        self.inner.lock().await.state
    }

    #[must_use]
    pub async fn snapshot_metadata(&self) -> OptimizerMetadata {
        self.inner.lock().await.metadata.clone()
    }

    /// Compute the input hash from a lockfile's content plus the optimizer's
    /// include/exclude configuration. Used at startup to decide whether a
    /// persisted cache is still valid.
    #[must_use]
    pub fn compute_input_hash(lockfile: &Path, include: &[String], exclude: &[String]) -> String {
        let lockfile_content = fs::read_to_string(lockfile).unwrap_or_default();
        let mut hasher = blake3::Hasher::new();
        hasher.update(lockfile_content.as_bytes());
        for inc in include {
            hasher.update(b"+");
            hasher.update(inc.as_bytes());
        }
        for exc in exclude {
            hasher.update(b"-");
            hasher.update(exc.as_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }

    fn speculative_browser_hash(&self, inner: &Inner, id: &str) -> String {
        let mut ids: Vec<&str> = inner
            .metadata
            .optimized
            .keys()
            .chain(inner.metadata.chunks.keys())
            .chain(inner.discovered.keys())
            .map(String::as_str)
            .collect();
        ids.sort_unstable();

        let mut hasher = blake3::Hasher::new();
        hasher.update(inner.metadata.hash.as_bytes());
        for i in &ids {
            hasher.update(i.as_bytes());
        }
        hasher.update(id.as_bytes());
        hasher.update(self.session.as_bytes());
        hasher.finalize().to_hex()[..16].to_string()
    }

    /// Register a bare import the transform pipeline could not resolve
    /// against the current `optimized`/`chunks` sets.
    ///
    /// Returns immediately with a speculative [`DepInfo`] (so the caller can
    /// rewrite the import URL without waiting), and a `processing` watch the
    /// caller may await to learn the real outcome once the batch containing
    /// this dep commits.
    pub async fn register_missing_import(&self, id: &str, resolved_path: PathBuf) -> RegisteredDep {
        let mut inner = self.inner.lock().await;

        if let Some(existing) = inner.metadata.optimized.get(id).or_else(|| inner.metadata.chunks.get(id)) {
            let (_, rx) = watch::channel(Some(BatchOutcome::Committed));
            return RegisteredDep {
                info: existing.clone(),
                processing: rx,
            };
        }

        if let Some(existing) = inner.discovered.get(id) {
            let rx = inner
                .current_batch
                .as_ref()
                .map(|tx| tx.subscribe())
                .unwrap_or_else(|| watch::channel(None).1);
            return RegisteredDep {
                info: existing.clone(),
                processing: rx,
            };
        }

        let browser_hash = self.speculative_browser_hash(&inner, id);
        let info = DepInfo {
            id: id.to_string(),
            file: self.cache_dir.join("deps").join(format!("{}.js", sanitize_id(id))),
            src: resolved_path,
            file_hash: String::new(),
            browser_hash,
            needs_interop: false,
            exports_data: ExportsData::default(),
        };
        inner.discovered.insert(id.to_string(), info.clone());

        if inner.current_batch.is_none() {
            let (tx, _rx) = watch::channel(None);
            inner.current_batch = Some(tx);
        }
        let processing = inner.current_batch.as_ref().unwrap().subscribe();

        let gate_open = inner.gate_open;
        if gate_open {
            if inner.state == OptimizerState::Idle {
                inner.state = OptimizerState::Debouncing;
            }
            inner.debounce_deadline = Some(Instant::now() + self.debounce);
            drop(inner);
            self.notify.notify_one();
        }

        RegisteredDep { info, processing }
    }

    /// A worker bundle's own nested optimizer run must never block on the
    /// parent's first-run gate.
    pub async fn register_workers_source(&self, id: &str) {
        let mut inner = self.inner.lock().await;
        inner.workers_excluded.insert(id.to_string());
        inner.in_flight_requests.remove(id);
    }

    /// Record that a request is in flight; pairs with [`Self::end_request`].
    pub async fn begin_request(&self, id: &str) {
        let mut inner = self.inner.lock().await;
        if inner.workers_excluded.contains(id) {
            return;
        }
        inner.in_flight_requests.insert(id.to_string());
    }

    /// Record that a request has completed. Once no requests are in flight,
    /// waits an additional `idle_wait` of true idleness before opening the
    /// first-run gate (arming any pending discoveries' debounce).
    pub async fn end_request(self: &Arc<Self>, id: &str) {
        let now_idle = {
            let mut inner = self.inner.lock().await;
            inner.in_flight_requests.remove(id);
            inner.in_flight_requests.is_empty() && !inner.gate_open
        };
        if !now_idle {
            return;
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(this.idle_wait).await;
            let still_idle = {
                let inner = this.inner.lock().await;
                inner.in_flight_requests.is_empty()
            };
            if still_idle {
                this.open_gate().await;
            }
        });
    }

    /// Watchdog: if no request ever arrives, force a run after `idle_wait`
    /// (the debounce's own 100ms grace period, reused for the watchdog).
    pub fn ensure_first_run(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(this.idle_wait).await;
            this.open_gate().await;
        });
    }

    async fn open_gate(&self) {
        let should_arm = {
            let mut inner = self.inner.lock().await;
            if inner.gate_open {
                false
            } else {
                inner.gate_open = true;
                !inner.discovered.is_empty()
            }
        };
        if should_arm {
            {
                let mut inner = self.inner.lock().await;
                if inner.state == OptimizerState::Idle {
                    inner.state = OptimizerState::Debouncing;
                }
                inner.debounce_deadline = Some(Instant::now() + self.debounce);
            }
            self.notify.notify_one();
        }
    }

    /// Spawn the background task that waits out the debounce window and
    /// triggers a run. Mirrors `fastnode_daemon::watch::process_events`'s
    /// `tokio::time::timeout`-based coalescing loop, applied to the
    /// optimizer's debounce instead of filesystem-event coalescing.
    pub fn spawn_debounce_task(
        self: &Arc<Self>,
        channel: Arc<dyn HmrChannel>,
        graphs: Vec<Arc<ModuleGraph>>,
    ) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                this.notify.notified().await;
                loop {
                    let deadline = { this.inner.lock().await.debounce_deadline };
                    let Some(deadline) = deadline else { break };
                    let now = Instant::now();
                    if now >= deadline {
                        let should_run = {
                            let mut inner = this.inner.lock().await;
                            let fired = inner
                                .debounce_deadline
                                .is_some_and(|d| d <= Instant::now());
                            if fired {
                                inner.debounce_deadline = None;
                            }
                            fired && inner.state == OptimizerState::Debouncing
                        };
                        if should_run {
                            this.run_batch(channel.as_ref(), &graphs).await;
                        }
                        break;
                    }
                    tokio::time::sleep(deadline - now).await;
                }
            }
        })
    }

    /// Run exactly one batch: snapshot `optimized ∪ discovered`, bundle,
    /// decide reload-safety, commit or cancel. Callable directly (bypassing
    /// the debounce timer) for tests and for `pre-scan`'s eager first run.
    pub async fn run_batch(&self, channel: &dyn HmrChannel, graphs: &[Arc<ModuleGraph>]) {
        let (snapshot, snapshot_keys, batch_tx) = {
            let mut inner = self.inner.lock().await;
            if inner.discovered.is_empty() {
                inner.state = OptimizerState::Idle;
                return;
            }
            inner.state = OptimizerState::Processing;

            let mut snapshot = inner.metadata.optimized.clone();
            snapshot.extend(inner.discovered.iter().map(|(k, v)| (k.clone(), v.clone())));
            let snapshot_keys: HashSet<String> = snapshot.keys().cloned().collect();

            let batch_tx = inner
                .current_batch
                .take()
                .unwrap_or_else(|| watch::channel(None).0);

            (snapshot, snapshot_keys, batch_tx)
        };

        match self.bundler.bundle(snapshot).await {
            Err(e) => {
                eprintln!("howth: dependency optimizer bundling failed: {e}");
                let mut inner = self.inner.lock().await;
                inner.discovered.clear();
                inner.state = OptimizerState::Idle;
                let _ = batch_tx.send(Some(BatchOutcome::Failed));
                for tx in inner.queued_batches.drain(..) {
                    let _ = tx.send(Some(BatchOutcome::Failed));
                }
            }
            Ok(run) => {
                let new_deps_discovered = {
                    let inner = self.inner.lock().await;
                    inner.discovered.keys().any(|id| !snapshot_keys.contains(id))
                };

                let (needs_reload, new_meta) = {
                    let inner = self.inner.lock().await;
                    let new_meta = run.metadata();

                    let mismatch = inner.discovered.iter().any(|(id, old)| {
                        new_meta
                            .optimized
                            .get(id)
                            .is_some_and(|n| n.needs_interop != old.needs_interop)
                    });
                    let hash_changed = new_meta.hash != inner.metadata.hash;
                    let file_hash_changed = inner.metadata.optimized.iter().any(|(id, old)| {
                        new_meta
                            .optimized
                            .get(id)
                            .is_some_and(|n| n.file_hash != old.file_hash)
                    });

                    (mismatch || hash_changed || file_hash_changed, new_meta.clone())
                };

                if needs_reload && new_deps_discovered {
                    // Discard: the next debounce (already armed by the
                    // mid-run registration) will produce a reload-safe
                    // result that includes the new dep too.
                    let _ = run.cancel().await;
                    let mut inner = self.inner.lock().await;
                    inner.current_batch = Some(batch_tx);
                    inner.state = OptimizerState::Debouncing;
                    if inner.debounce_deadline.is_none() {
                        inner.debounce_deadline = Some(Instant::now() + self.debounce);
                    }
                    drop(inner);
                    self.notify.notify_one();
                    return;
                }

                if let Err(e) = run.commit().await {
                    eprintln!("howth: dependency optimizer commit failed: {e}");
                    let mut inner = self.inner.lock().await;
                    inner.discovered.clear();
                    inner.state = OptimizerState::Idle;
                    let _ = batch_tx.send(Some(BatchOutcome::Failed));
                    for tx in inner.queued_batches.drain(..) {
                        let _ = tx.send(Some(BatchOutcome::Failed));
                    }
                    return;
                }

                let mut inner = self.inner.lock().await;
                inner.state = OptimizerState::Committing;

                let new_browser_hash = if needs_reload {
                    inner.reload_counter += 1;
                    hash_strings(
                        [new_meta.hash.as_str(), &inner.reload_counter.to_string()].into_iter(),
                    )
                } else {
                    inner.metadata.browser_hash.clone()
                };

                let mut merged_optimized = new_meta.optimized.clone();
                for dep in merged_optimized.values_mut() {
                    dep.browser_hash = new_browser_hash.clone();
                }
                let mut merged_chunks = new_meta.chunks.clone();
                for dep in merged_chunks.values_mut() {
                    dep.browser_hash = new_browser_hash.clone();
                }

                // Port over deps that were part of this batch but which the
                // bundler's output omitted (e.g. folded into a shared chunk).
                for id in &snapshot_keys {
                    if merged_optimized.contains_key(id) || merged_chunks.contains_key(id) {
                        continue;
                    }
                    if let Some(old) = inner.discovered.get(id) {
                        let mut carried = old.clone();
                        carried.browser_hash = new_browser_hash.clone();
                        merged_optimized.insert(id.clone(), carried);
                    }
                }

                inner.metadata = OptimizerMetadata {
                    hash: new_meta.hash.clone(),
                    browser_hash: new_browser_hash,
                    optimized: merged_optimized,
                    chunks: merged_chunks,
                };
                inner.discovered.retain(|id, _| !snapshot_keys.contains(id));
                let persisted = inner.metadata.clone();
                inner.state = OptimizerState::Idle;

                let outcome = if needs_reload {
                    BatchOutcome::Reloaded
                } else {
                    BatchOutcome::Committed
                };
                let _ = batch_tx.send(Some(outcome));
                for tx in inner.queued_batches.drain(..) {
                    let _ = tx.send(Some(outcome));
                }
                drop(inner);

                if let Err(e) = self.persist_metadata(&persisted).await {
                    eprintln!("howth: failed to persist optimizer cache: {e}");
                }

                if needs_reload {
                    for graph in graphs {
                        graph.invalidate_all();
                    }
                    channel.send(HmrPayload::FullReload { path: None });
                }
            }
        }
    }
}
