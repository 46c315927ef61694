//! `howth dev` command implementation.
//!
//! Per-module development server with hot module replacement (HMR) and
//! on-demand dependency pre-bundling, instead of rebuilding one whole-app
//! bundle on every change.

use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path as AxumPath, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use fastnode_core::bundler::PluginContainer;
use fastnode_core::dev::{
    client_env_replacements, graph::ModuleGraph, hmr::propagate_update, load_config,
    load_env_files, optimizer::SyncBundlerAdapter, DepOptimizer, HmrBroadcaster, HmrChannel,
    HmrPayload, ModuleTransformer, OptimizeDepsStrategy, PropagateOutcome,
};
use miette::{IntoDiagnostic, Result};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Dev server action.
#[derive(Debug, Clone)]
pub struct DevAction {
    /// Entry point file.
    pub entry: PathBuf,
    /// Working directory.
    pub cwd: PathBuf,
    /// Port to listen on.
    pub port: u16,
    /// Host to bind to.
    pub host: String,
    /// Open browser automatically.
    pub open: bool,
}

/// Shared server state.
struct DevState {
    /// Project root / working directory.
    cwd: PathBuf,
    /// Module graph for the client environment.
    graph: Arc<ModuleGraph>,
    /// Per-request transform pipeline.
    transformer: Arc<ModuleTransformer>,
    /// Dependency pre-bundling optimizer.
    optimizer: Arc<DepOptimizer>,
    /// HMR message fan-out.
    hmr: Arc<HmrBroadcaster>,
    /// Plugin container (aliases, asset handling); empty by default.
    plugins: PluginContainer,
    /// Entry HTML file, if the project has one.
    entry: PathBuf,
}

/// Run the dev server.
pub async fn run(action: DevAction) -> Result<()> {
    let graph = Arc::new(ModuleGraph::new("client"));
    let plugins = PluginContainer::new(action.cwd.clone());

    let config = load_config(&action.cwd, None)
        .unwrap_or(None)
        .map(|(_, cfg)| cfg)
        .unwrap_or_default();

    let cache_dir = action.cwd.join(".howth").join("deps");
    let bundler = Arc::new(SyncBundlerAdapter::new(action.cwd.clone(), cache_dir.clone()));
    let lockfile = action.cwd.join("package-lock.json");
    let input_hash = DepOptimizer::compute_input_hash(
        &lockfile,
        &config.optimize_deps.include,
        &config.optimize_deps.exclude,
    );
    let strategy = config
        .optimize_deps
        .strategy
        .as_deref()
        .map(OptimizeDepsStrategy::from_config_str)
        .unwrap_or_default();
    let optimizer = Arc::new(DepOptimizer::new(
        action.cwd.clone(),
        cache_dir,
        strategy,
        bundler,
        input_hash,
    ));

    let env_vars = load_env_files(&action.cwd, "development");
    let mut define = client_env_replacements(&env_vars, "development");
    define.extend(config.define.clone());

    let hmr = Arc::new(HmrBroadcaster::new(64));

    let transformer = Arc::new(
        ModuleTransformer::new(action.cwd.clone(), Arc::clone(&graph))
            .with_optimizer(Arc::clone(&optimizer))
            .with_define(define)
            .with_hmr_channel(Arc::clone(&hmr) as Arc<dyn HmrChannel>),
    );

    let state = Arc::new(DevState {
        cwd: action.cwd.clone(),
        graph: Arc::clone(&graph),
        transformer: Arc::clone(&transformer),
        optimizer: Arc::clone(&optimizer),
        hmr: Arc::clone(&hmr),
        plugins,
        entry: action.entry.clone(),
    });

    optimizer.spawn_debounce_task(Arc::clone(&hmr) as Arc<dyn HmrChannel>, vec![Arc::clone(&graph)]);

    if matches!(strategy, OptimizeDepsStrategy::PreScan | OptimizeDepsStrategy::Scan) {
        let mut seeds = vec![action.entry.clone()];
        seeds.extend(config.optimize_deps.entries.iter().map(|e| action.cwd.join(e)));
        let scan_optimizer = Arc::clone(&optimizer);
        if strategy == OptimizeDepsStrategy::PreScan {
            scan_optimizer.scan_entries(&seeds).await;
        } else {
            tokio::spawn(async move { scan_optimizer.scan_entries(&seeds).await });
        }
    }

    optimizer.ensure_first_run();

    // Set up the file watcher; changed files run through HMR propagation,
    // falling back to a full reload for dead ends and unresolvable updates.
    let (change_tx, mut change_rx) = mpsc::channel::<HashSet<PathBuf>>(16);
    let watch_cwd = action.cwd.clone();
    std::thread::spawn(move || {
        if let Err(e) = watch_files(watch_cwd, change_tx) {
            eprintln!("  File watcher error: {}", e);
        }
    });

    let watch_state = Arc::clone(&state);
    tokio::spawn(async move {
        while let Some(changed) = change_rx.recv().await {
            for path in changed {
                handle_file_change(&watch_state, &path).await;
            }
        }
    });

    let app = Router::new()
        .route("/", get(serve_index))
        .route("/@hmr-client", get(serve_hmr_client))
        .route("/@modules/*specifier", get(serve_optimized_dep))
        .route("/__hmr", get(hmr_websocket))
        .fallback(get(serve_module))
        .with_state(state);

    let host_ip = if action.host == "localhost" {
        "127.0.0.1".to_string()
    } else {
        action.host.clone()
    };

    let addr: SocketAddr = format!("{}:{}", host_ip, action.port)
        .parse()
        .into_diagnostic()?;

    println!();
    println!("  Dev server running at http://localhost:{}", action.port);
    println!("  Hot Module Replacement enabled");
    println!();
    println!("  Press Ctrl+C to stop");
    println!();

    if action.open {
        let url = format!("http://{}:{}", action.host, action.port);
        let _ = open_browser(&url);
    }

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .into_diagnostic()?;
    axum::serve(listener, app).await.into_diagnostic()?;

    Ok(())
}

/// Serve the project's `index.html`, or a minimal fallback shell that loads
/// the configured entry as a module.
async fn serve_index(State(state): State<Arc<DevState>>) -> impl IntoResponse {
    let index_path = state.cwd.join("index.html");
    if let Ok(html) = tokio::fs::read_to_string(&index_path).await {
        return Html(html).into_response();
    }

    let entry_url = root_relative_url(&state.cwd, &state.entry);
    Html(fallback_index_html(&entry_url)).into_response()
}

/// Serve the HMR client runtime as a plain ES module.
async fn serve_hmr_client() -> impl IntoResponse {
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/javascript")
        .header("Cache-Control", "no-cache")
        .body(Body::from(fastnode_core::dev::client_runtime(0)))
        .unwrap()
}

/// Serve a pre-bundled dependency from the optimizer's cache by specifier,
/// ignoring the `?v=<browserHash>` query string used for cache-busting.
async fn serve_optimized_dep(
    AxumPath(specifier): AxumPath<String>,
    State(state): State<Arc<DevState>>,
) -> impl IntoResponse {
    let metadata = state.optimizer.snapshot_metadata().await;
    let dep = metadata
        .optimized
        .get(&specifier)
        .or_else(|| metadata.chunks.get(&specifier));

    let Some(dep) = dep else {
        return (StatusCode::NOT_FOUND, "dependency not pre-bundled").into_response();
    };

    match tokio::fs::read_to_string(&dep.file).await {
        Ok(code) => Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "application/javascript")
            .header("Cache-Control", "max-age=31536000,immutable")
            .body(Body::from(code))
            .unwrap()
            .into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "dependency bundle missing").into_response(),
    }
}

/// Serve an individual module: resolve → transform → rewrite, with the HMR
/// preamble prepended so `import.meta.hot` is wired for this module's url.
///
/// Registered as the router's fallback, so every request the three named
/// routes don't match (`/src/App.tsx`, `/src/App.tsx?t=169...`, a CSS
/// `/@style/...` url, etc.) lands here. The optimizer's request tracking
/// brackets the transform so `delayDepsOptimizerUntil`/`runOptimizerWhenIdle`
/// (§4.3) sees this as an in-flight request.
async fn serve_module(
    uri: axum::http::Uri,
    State(state): State<Arc<DevState>>,
) -> impl IntoResponse {
    let url_path = uri.path().to_string();
    if url_path == "/" || url_path == "/favicon.ico" {
        return not_found();
    }

    state.optimizer.begin_request(&url_path).await;
    let result = state
        .transformer
        .transform_module(&url_path, &state.plugins)
        .await;
    state.optimizer.end_request(&url_path).await;

    match result {
        Ok(transformed) => {
            let preamble = fastnode_core::dev::module_preamble(
                fastnode_core::dev::normalize_url(&url_path),
            );
            let body = format!("{preamble}{}", transformed.code);
            Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", transformed.content_type)
                .header("Cache-Control", "no-cache")
                .body(Body::from(body))
                .unwrap()
                .into_response()
        }
        Err(e) => {
            state.hmr.send(HmrPayload::Error {
                message: e.to_string(),
            });
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .header("Content-Type", "text/plain")
                .body(Body::from(e.to_string()))
                .unwrap()
                .into_response()
        }
    }
}

fn not_found() -> Response<Body> {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .body(Body::from("module not found"))
        .unwrap()
}

/// Handle a single changed file: invalidate the transform pipeline, run HMR
/// propagation per affected url, and dispatch the outcome.
async fn handle_file_change(state: &DevState, path: &Path) {
    let urls = state.transformer.invalidate(&path.display().to_string());
    if urls.is_empty() {
        return;
    }

    let mut updates = Vec::new();
    let mut reload = false;

    for url in &urls {
        let timestamp = state.graph.next_timestamp();
        match propagate_update(&state.graph, url, timestamp) {
            PropagateOutcome::Updates(mut u) => updates.append(&mut u),
            PropagateOutcome::FullReload { .. } => reload = true,
            PropagateOutcome::NoUpdate => {}
        }
    }

    if reload {
        state.transformer.invalidate_all();
        state.hmr.send(HmrPayload::FullReload {
            path: urls.first().cloned(),
        });
    } else if !updates.is_empty() {
        state.hmr.send(HmrPayload::Update { updates });
    }
}

/// Handle WebSocket connections for HMR.
async fn hmr_websocket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<DevState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_hmr_socket(socket, state))
}

/// Handle an HMR WebSocket connection.
async fn handle_hmr_socket(mut socket: WebSocket, state: Arc<DevState>) {
    let mut rx = state.hmr.subscribe();

    let connected = serde_json::to_string(&HmrPayload::Connected).unwrap_or_default();
    let _ = socket.send(Message::Text(connected)).await;

    while let Ok(json) = rx.recv().await {
        if socket.send(Message::Text(json)).await.is_err() {
            break;
        }
    }
}

/// Check if a path should be ignored by the file watcher.
fn should_ignore(path: &Path) -> bool {
    let path_str = path.to_string_lossy();

    if path_str.contains("/node_modules/")
        || path_str.contains("/target/")
        || path_str.contains("/.git/")
        || path_str.contains("/dist/")
        || path_str.contains("/.next/")
        || path_str.contains("/build/")
        || path_str.contains("/.howth/")
        || path_str.contains("/__pycache__/")
    {
        return true;
    }

    if let Some(name) = path.file_name() {
        if name.to_string_lossy().starts_with('.') {
            return true;
        }
    }

    false
}

const COALESCE_WINDOW_MS: u64 = 50;

/// Watch files for changes, coalescing bursts into one batch per
/// [`COALESCE_WINDOW_MS`] window before forwarding them.
fn watch_files(cwd: PathBuf, change_tx: mpsc::Sender<HashSet<PathBuf>>) -> Result<()> {
    let (tx, rx) = std::sync::mpsc::channel();

    let mut watcher = RecommendedWatcher::new(tx, Config::default()).into_diagnostic()?;
    watcher
        .watch(&cwd, RecursiveMode::Recursive)
        .into_diagnostic()?;

    let mut pending: HashSet<PathBuf> = HashSet::new();
    let mut last_event = std::time::Instant::now();

    loop {
        match rx.recv_timeout(std::time::Duration::from_millis(COALESCE_WINDOW_MS)) {
            Ok(Ok(event)) => {
                for path in event.paths {
                    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
                    if should_ignore(&path) || !matches!(ext, "ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs" | "css" | "json")
                    {
                        continue;
                    }
                    pending.insert(path);
                }
                last_event = std::time::Instant::now();
            }
            Ok(Err(e)) => {
                eprintln!("  Watch error: {}", e);
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                if !pending.is_empty() && last_event.elapsed().as_millis() >= COALESCE_WINDOW_MS as u128 {
                    let batch: HashSet<PathBuf> = pending.drain().collect();
                    if change_tx.blocking_send(batch).is_err() {
                        break;
                    }
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    Ok(())
}

/// Open a URL in the default browser.
fn open_browser(url: &str) -> std::io::Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg(url).spawn()?;
    }
    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open").arg(url).spawn()?;
    }
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/C", "start", url])
            .spawn()?;
    }
    Ok(())
}

/// Turn an absolute entry path into a root-relative dev server url
/// (`/src/main.tsx`), falling back to the path as given if it isn't under
/// `root`.
fn root_relative_url(root: &Path, entry: &Path) -> String {
    match entry.strip_prefix(root) {
        Ok(rel) => format!("/{}", rel.display()),
        Err(_) => format!("/{}", entry.display()),
    }
}

/// Minimal fallback shell used when a project has no `index.html`.
fn fallback_index_html(entry_url: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>howth dev</title>
</head>
<body>
  <div id="root"></div>
  <script type="module" src="{entry_url}"></script>
</body>
</html>
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_relative_url_strips_prefix() {
        let root = Path::new("/project");
        let entry = Path::new("/project/src/main.tsx");
        assert_eq!(root_relative_url(root, entry), "/src/main.tsx");
    }

    #[test]
    fn root_relative_url_falls_back_outside_root() {
        let root = Path::new("/project");
        let entry = Path::new("/elsewhere/main.tsx");
        assert_eq!(root_relative_url(root, entry), "/elsewhere/main.tsx");
    }

    #[test]
    fn should_ignore_filters_node_modules_and_hidden_files() {
        assert!(should_ignore(Path::new("/project/node_modules/lodash/index.js")));
        assert!(should_ignore(Path::new("/project/.git/HEAD")));
        assert!(!should_ignore(Path::new("/project/src/main.tsx")));
    }

    #[test]
    fn fallback_index_html_references_entry_url() {
        let html = fallback_index_html("/src/main.tsx");
        assert!(html.contains(r#"src="/src/main.tsx""#));
    }
}
