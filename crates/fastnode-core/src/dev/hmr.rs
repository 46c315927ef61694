//! HMR (Hot Module Replacement) propagator for Vite-compatible dev serving.
//!
//! Translates a changed file into either a set of fine-grained `update`
//! payloads or a `full-reload`, by walking [`crate::dev::graph::ModuleGraph`]
//! from the changed node towards its importers looking for an accepting
//! boundary. Also owns:
//! - the accept-call lexer that extracts `import.meta.hot.accept(...)`'s
//!   static dependency list out of transformed source,
//! - the read-retry policy for file reads that race an editor's write,
//! - the [`HmrChannel`] wire abstraction and client runtime JS.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::dev::graph::{ModuleGraph, ModuleKind, ModuleNode, ModuleNodeId, SelfAccepting};

/// One HMR update boundary found by [`propagate_update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateType {
    JsUpdate,
    CssUpdate,
}

/// A single fine-grained update to dispatch to a client.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Update {
    #[serde(rename = "type")]
    pub update_type: UpdateTypeWire,
    pub path: String,
    pub accepted_path: String,
    pub timestamp: u64,
    pub explicit_import_required: bool,
    pub is_within_circular_import: bool,
    pub ssr_invalidates: Vec<String>,
}

/// Wire representation of [`UpdateType`] (`js-update` / `css-update`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateTypeWire {
    JsUpdate,
    CssUpdate,
}

impl From<UpdateType> for UpdateTypeWire {
    fn from(value: UpdateType) -> Self {
        match value {
            UpdateType::JsUpdate => UpdateTypeWire::JsUpdate,
            UpdateType::CssUpdate => UpdateTypeWire::CssUpdate,
        }
    }
}

/// Outcome of propagating a file change through the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropagateOutcome {
    /// One or more HMR boundaries accepted the change.
    Updates(Vec<Update>),
    /// No boundary was found (or a dead end was hit); the client must
    /// reload the page in full.
    FullReload { triggered_by: String },
    /// The changed url has no node in the graph (module never served), or
    /// propagation produced neither a boundary nor a dead end. Nothing to
    /// dispatch.
    NoUpdate,
}

struct Boundary {
    boundary: ModuleNodeId,
    accepted_via: ModuleNodeId,
}

struct PropagateCtx<'g> {
    graph: &'g ModuleGraph,
    traversed: HashSet<ModuleNodeId>,
    boundaries: Vec<Boundary>,
}

fn is_css_request(node: &ModuleNode) -> bool {
    node.kind == ModuleKind::Css
}

/// Walk `node_id`'s importers looking for an HMR boundary.
///
/// Mirrors Vite's `propagateUpdate`: returns `true` when a dead end is hit
/// (a module with no importers, or a non-CSS module whose only importers
/// are all CSS), which forces the caller to fall back to a full reload.
fn walk(ctx: &mut PropagateCtx<'_>, node_id: ModuleNodeId, chain: &[ModuleNodeId]) -> bool {
    if ctx.traversed.contains(&node_id) {
        return false;
    }
    ctx.traversed.insert(node_id);

    let Some(node) = ctx.graph.node(node_id) else {
        return false;
    };

    // The module has never been transformed: its self-accepting state is
    // unknown, so there is nothing useful to propagate through it yet. The
    // next real request will get fresh code regardless.
    if matches!(node.is_self_accepting, SelfAccepting::Unknown) {
        return false;
    }

    if matches!(node.is_self_accepting, SelfAccepting::True) {
        ctx.boundaries.push(Boundary {
            boundary: node_id,
            accepted_via: node_id,
        });
        // CSS-importers of a self-accepting node are not themselves HMR
        // boundaries (a plain CSS `@import` chain has no accept call of its
        // own), so they need to be walked too rather than left stranded.
        for &importer_id in &node.importers {
            if chain.contains(&importer_id) {
                continue;
            }
            if ctx
                .graph
                .node(importer_id)
                .is_some_and(|n| is_css_request(&n))
            {
                let mut sub_chain = chain.to_vec();
                sub_chain.push(importer_id);
                walk(ctx, importer_id, &sub_chain);
            }
        }
        return false;
    }

    // Partial export acceptance: the module itself declared which exports
    // it accepts changes for. Treat it as a boundary, but keep walking its
    // importers too, since consumers of *other* exports may still need
    // invalidating.
    let has_export_boundary = match &node.accepted_hmr_exports {
        Some(exports) if !exports.is_empty() => {
            ctx.boundaries.push(Boundary {
                boundary: node_id,
                accepted_via: node_id,
            });
            true
        }
        _ => false,
    };

    if !has_export_boundary {
        if node.importers.is_empty() {
            return true;
        }
        let only_css_importers = !is_css_request(&node)
            && node
                .importers
                .iter()
                .all(|&id| ctx.graph.node(id).is_some_and(|n| is_css_request(&n)));
        if only_css_importers {
            return true;
        }
    }

    for &importer_id in &node.importers {
        let Some(importer) = ctx.graph.node(importer_id) else {
            continue;
        };

        if importer.accepted_hmr_deps.contains(&node_id) {
            ctx.boundaries.push(Boundary {
                boundary: importer_id,
                accepted_via: node_id,
            });
            continue;
        }

        if let Some(exports) = &node.accepted_hmr_exports {
            if let Some(bindings) = importer.imported_bindings.get(&node_id) {
                if bindings.is_subset(exports) {
                    continue;
                }
            }
        }

        if chain.contains(&importer_id) {
            continue;
        }

        let mut sub_chain = chain.to_vec();
        sub_chain.push(importer_id);
        if walk(ctx, importer_id, &sub_chain) {
            return true;
        }
    }

    false
}

/// Secondary DFS from a boundary node along importer edges: flags the
/// boundary if any ancestor from the original propagation chain is
/// reachable again. CSS importers are skipped and self-edges ignored.
fn is_within_circular_import(
    graph: &ModuleGraph,
    boundary_id: ModuleNodeId,
    original_chain: &[ModuleNodeId],
) -> bool {
    let mut visited = HashSet::new();
    let mut stack = vec![boundary_id];
    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        let Some(node) = graph.node(id) else {
            continue;
        };
        for &importer_id in &node.importers {
            if importer_id == id {
                continue;
            }
            if original_chain.contains(&importer_id) {
                return true;
            }
            if graph.node(importer_id).is_some_and(|n| is_css_request(&n)) {
                continue;
            }
            stack.push(importer_id);
        }
    }
    false
}

/// Collect `importedModules` transitively from `from`, keeping only nodes
/// whose HMR/invalidation timestamp matches the current pass (i.e. nodes
/// touched during this same propagation).
fn collect_ssr_invalidates(graph: &ModuleGraph, from: ModuleNodeId, timestamp: u64) -> Vec<String> {
    let mut visited = HashSet::new();
    let mut stack = vec![from];
    let mut out = Vec::new();
    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        let Some(node) = graph.node(id) else {
            continue;
        };
        if id != from
            && (node.last_hmr_timestamp == timestamp || node.last_invalidation_timestamp == timestamp)
        {
            out.push(node.url.clone());
        }
        stack.extend(node.imported_modules.iter().copied());
    }
    out
}

/// Propagate a change to `changed_url` through `graph`, producing either
/// fine-grained updates or a full-reload decision.
///
/// The changed module is hard-invalidated as part of dispatch so a later
/// request always re-transforms it, regardless of whether any boundary
/// accepted the update.
#[must_use]
pub fn propagate_update(graph: &ModuleGraph, changed_url: &str, timestamp: u64) -> PropagateOutcome {
    let Some(start_id) = graph.id_of_url(changed_url) else {
        return PropagateOutcome::FullReload {
            triggered_by: changed_url.to_string(),
        };
    };

    let mut ctx = PropagateCtx {
        graph,
        traversed: HashSet::new(),
        boundaries: Vec::new(),
    };
    let dead_end = walk(&mut ctx, start_id, &[start_id]);

    if dead_end {
        graph.invalidate_module_hmr(changed_url, true, timestamp);
        return PropagateOutcome::FullReload {
            triggered_by: changed_url.to_string(),
        };
    }

    if ctx.boundaries.is_empty() {
        return PropagateOutcome::NoUpdate;
    }

    graph.invalidate_module_hmr(changed_url, true, timestamp);

    let mut updates = Vec::new();
    for boundary in &ctx.boundaries {
        let Some(boundary_node) = graph.node(boundary.boundary) else {
            continue;
        };
        let Some(accepted_via_node) = graph.node(boundary.accepted_via) else {
            continue;
        };
        let update_type = if is_css_request(&boundary_node) {
            UpdateType::CssUpdate
        } else {
            UpdateType::JsUpdate
        };
        let explicit_import_required =
            is_css_request(&boundary_node) && boundary.boundary != boundary.accepted_via;
        let is_within_circular =
            is_within_circular_import(graph, boundary.boundary, &[start_id]);
        let ssr_invalidates = collect_ssr_invalidates(graph, boundary.accepted_via, timestamp);

        updates.push(Update {
            update_type: update_type.into(),
            path: boundary_node.url.clone(),
            accepted_path: accepted_via_node.url.clone(),
            timestamp,
            explicit_import_required,
            is_within_circular_import: is_within_circular,
            ssr_invalidates,
        });
    }

    PropagateOutcome::Updates(updates)
}

// ---------------------------------------------------------------------
// Accept-call lexer
// ---------------------------------------------------------------------

/// One statically-extracted dependency specifier from an `accept([...])`
/// call, with its byte span in the source for later URL rewriting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedDep {
    pub specifier: String,
    pub start: usize,
    pub end: usize,
}

/// Result of lexing one `import.meta.hot.accept(...)` call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptInfo {
    pub self_accepts: bool,
    pub deps: Vec<AcceptedDep>,
}

/// A lex error: the accept call's arguments could not be statically
/// resolved (e.g. a template literal with an interpolation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub message: String,
    pub offset: usize,
}

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (at byte {})", self.message, self.offset)
    }
}

impl std::error::Error for LexError {}

/// Fast pre-check: skip lexing files that don't even mention `.hot.accept`.
/// Kept as a cheap gate; no longer the source of truth for self-accepting.
#[must_use]
pub fn mentions_hot_accept(source: &str) -> bool {
    source.contains(".hot.accept")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexState {
    InArray,
    InSingleQuote,
    InDoubleQuote,
}

/// Lex the first `import.meta.hot.accept(...)` call in `source`.
///
/// Returns `Ok(None)` if no accept call is present. States: `inCall`
/// (implicit, before we've classified the first argument), `inArray`,
/// `inSingleQuote`, `inDoubleQuote`, `inTemplate` (a backtick anywhere in
/// argument position is a lex error, since interpolations can't be
/// statically resolved).
pub fn lex_accept_call(source: &str) -> Result<Option<AcceptInfo>, LexError> {
    const MARKER: &str = ".hot.accept(";
    let Some(call_byte) = source.find(MARKER) else {
        return Ok(None);
    };
    let mut pos = call_byte + MARKER.len();

    let mut skip_ws_len = 0;
    for (offset, ch) in source[pos..].char_indices() {
        if ch.is_whitespace() {
            skip_ws_len = offset + ch.len_utf8();
        } else {
            break;
        }
    }
    pos += skip_ws_len;

    let Some(first) = source[pos..].chars().next() else {
        return Err(LexError {
            message: "unterminated accept() call".into(),
            offset: pos,
        });
    };

    match first {
        // accept() / accept(cb) / accept(function(...) {...})
        ')' | '(' => Ok(Some(AcceptInfo {
            self_accepts: true,
            deps: Vec::new(),
        })),
        '`' => Err(LexError {
            message: "template literal dependency specifiers cannot be statically resolved".into(),
            offset: pos,
        }),
        '[' => lex_array(source, pos + 1),
        '\'' => lex_single_string(source, pos + 1).map(Some),
        '"' => lex_double_string(source, pos + 1).map(Some),
        _ => {
            // Anything else (an identifier, `function`, an arrow) is a
            // self-accepting call whose single argument is a callback, not
            // a dep list.
            Ok(Some(AcceptInfo {
                self_accepts: true,
                deps: Vec::new(),
            }))
        }
    }
}

fn lex_single_string(source: &str, start: usize) -> Result<AcceptInfo, LexError> {
    let dep = lex_quoted(source, start, '\'')?;
    Ok(AcceptInfo {
        self_accepts: false,
        deps: vec![dep],
    })
}

fn lex_double_string(source: &str, start: usize) -> Result<AcceptInfo, LexError> {
    let dep = lex_quoted(source, start, '"')?;
    Ok(AcceptInfo {
        self_accepts: false,
        deps: vec![dep],
    })
}

fn lex_quoted(source: &str, start: usize, quote: char) -> Result<AcceptedDep, LexError> {
    let mut value = String::new();
    let mut iter = source[start..].char_indices();
    loop {
        let Some((offset, ch)) = iter.next() else {
            return Err(LexError {
                message: "unterminated string literal in accept() call".into(),
                offset: start,
            });
        };
        if ch == '\\' {
            if let Some((_, escaped)) = iter.next() {
                value.push(escaped);
            }
            continue;
        }
        if ch == quote {
            return Ok(AcceptedDep {
                specifier: value,
                start,
                end: start + offset,
            });
        }
        value.push(ch);
    }
}

fn lex_array(source: &str, start: usize) -> Result<Option<AcceptInfo>, LexError> {
    let mut deps = Vec::new();
    let mut state = LexState::InArray;
    let mut cur = String::new();
    let mut cur_start = start;
    let mut iter = source[start..].char_indices();

    while let Some((offset, ch)) = iter.next() {
        let abs = start + offset;
        match state {
            LexState::InArray => match ch {
                ']' => {
                    return Ok(Some(AcceptInfo {
                        self_accepts: false,
                        deps,
                    }));
                }
                '\'' => {
                    state = LexState::InSingleQuote;
                    cur.clear();
                    cur_start = abs + ch.len_utf8();
                }
                '"' => {
                    state = LexState::InDoubleQuote;
                    cur.clear();
                    cur_start = abs + ch.len_utf8();
                }
                '`' => {
                    return Err(LexError {
                        message: "template literal dependency specifiers cannot be statically resolved".into(),
                        offset: abs,
                    });
                }
                _ => {}
            },
            LexState::InSingleQuote | LexState::InDoubleQuote => {
                let quote = if state == LexState::InSingleQuote {
                    '\''
                } else {
                    '"'
                };
                if ch == '\\' {
                    if let Some((_, escaped)) = iter.next() {
                        cur.push(escaped);
                    }
                    continue;
                }
                if ch == quote {
                    deps.push(AcceptedDep {
                        specifier: cur.clone(),
                        start: cur_start,
                        end: abs,
                    });
                    state = LexState::InArray;
                } else {
                    cur.push(ch);
                }
            }
        }
    }

    Err(LexError {
        message: "unterminated dependency array in accept() call".into(),
        offset: start,
    })
}

// ---------------------------------------------------------------------
// Read-retry policy
// ---------------------------------------------------------------------

/// Read `path` to a string, retrying through a truncate-then-write race.
///
/// Some editors truncate a file before writing its new content, so a read
/// triggered by the filesystem-change event can observe a zero-byte
/// snapshot. On empty content, poll `mtime` up to 10 times (10ms apart)
/// and re-read once a change is observed or the attempts are exhausted.
pub fn read_module_source_with_retry(path: &Path) -> std::io::Result<String> {
    let content = std::fs::read_to_string(path)?;
    if !content.is_empty() {
        return Ok(content);
    }

    let mut last_modified = std::fs::metadata(path)?.modified().ok();
    for _ in 0..10 {
        std::thread::sleep(Duration::from_millis(10));
        if let Ok(meta) = std::fs::metadata(path) {
            let modified = meta.modified().ok();
            if modified != last_modified {
                last_modified = modified;
                if let Ok(retry) = std::fs::read_to_string(path) {
                    if !retry.is_empty() {
                        return Ok(retry);
                    }
                }
            }
        }
    }

    std::fs::read_to_string(path)
}

// ---------------------------------------------------------------------
// HMR channel
// ---------------------------------------------------------------------

/// Discriminated union of messages sent to HMR clients.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HmrPayload {
    Connected,
    Update { updates: Vec<Update> },
    FullReload { path: Option<String> },
    Prune { paths: Vec<String> },
    Custom { event: String, data: serde_json::Value },
    Error { message: String },
}

/// Channel abstraction an environment's HMR dispatch writes into.
///
/// Promotes the ad hoc `tokio::sync::broadcast::Sender<HmrMessage>` used by
/// the dev command into a reusable, typed abstraction so the HTTP/WebSocket
/// layer stays a thin forwarder instead of owning message shape.
pub trait HmrChannel: Send + Sync {
    fn send(&self, payload: HmrPayload);
}

/// Fan-out [`HmrChannel`] over a `tokio::sync::broadcast` channel of
/// pre-serialized JSON text (the shape the WebSocket layer actually writes).
pub struct HmrBroadcaster {
    sender: tokio::sync::broadcast::Sender<String>,
}

impl HmrBroadcaster {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<String> {
        self.sender.subscribe()
    }
}

impl HmrChannel for HmrBroadcaster {
    fn send(&self, payload: HmrPayload) {
        if let Ok(json) = serde_json::to_string(&payload) {
            // No receivers yet (no client connected) is not an error.
            let _ = self.sender.send(json);
        }
    }
}

/// Generate the HMR client runtime JavaScript, served at `/@hmr-client`.
#[must_use]
pub fn client_runtime(port: u16) -> String {
    HMR_CLIENT_RUNTIME.replace("__HMR_PORT__", &port.to_string())
}

/// Generate the HMR preamble injected at the top of each served module,
/// wiring up `import.meta.hot` for that module's own url.
#[must_use]
pub fn module_preamble(module_url: &str) -> String {
    format!(
        r#"import {{ createHotContext as __vite__createHotContext }} from "/@hmr-client";
import.meta.hot = __vite__createHotContext("{module_url}");
"#
    )
}

/// The HMR client runtime JavaScript.
///
/// Provides the `import.meta.hot` API (Vite-compatible):
/// - `hot.accept()` — Self-accepting module
/// - `hot.accept(deps, cb)` — Accept specific dep updates
/// - `hot.dispose(cb)` — Cleanup before module replacement
/// - `hot.invalidate()` — Force propagation to importers
/// - `hot.data` — Persist data across updates
/// - `hot.on(event, cb)` / `hot.send(event, data)` — Custom events
const HMR_CLIENT_RUNTIME: &str = r"
// Howth HMR Client Runtime (Vite-compatible)
const hmrPort = __HMR_PORT__;
const hotModulesMap = new Map();
const disposeMap = new Map();
const dataMap = new Map();
const customListeners = new Map();
const prunedPaths = new Set();

let ws;
let isConnected = false;

function setupWebSocket() {
  ws = new WebSocket(`ws://${location.hostname}:${hmrPort}/__hmr`);

  ws.onopen = () => {
    console.log('[howth] connected.');
    isConnected = true;
  };

  ws.onmessage = (event) => {
    const msg = JSON.parse(event.data);
    handleMessage(msg);
  };

  ws.onclose = () => {
    if (isConnected) {
      console.log('[howth] server connection lost. Polling for restart...');
      isConnected = false;
      setTimeout(() => location.reload(), 1000);
    }
  };

  ws.onerror = (err) => {
    console.error('[howth] websocket error:', err);
  };
}

function handleMessage(msg) {
  switch (msg.type) {
    case 'connected':
      console.log('[howth] ready.');
      break;

    case 'update':
      for (const update of msg.updates) {
        handleUpdate(update);
      }
      break;

    case 'full-reload':
      console.log('[howth] full reload' + (msg.path ? ` (${msg.path})` : ''));
      location.reload();
      break;

    case 'prune':
      for (const path of msg.paths) {
        prunedPaths.add(path);
        hotModulesMap.delete(path);
        dataMap.delete(path);
        disposeMap.delete(path);
      }
      break;

    case 'error':
      console.error('[howth] build error:', msg.message);
      showErrorOverlay(msg.message);
      break;

    case 'custom': {
      const listeners = customListeners.get(msg.event);
      if (listeners) {
        listeners.forEach(cb => cb(msg.data));
      }
      break;
    }
  }
}

async function handleUpdate(update) {
  const { path, acceptedPath, timestamp, explicitImportRequired } = update;
  const target = acceptedPath || path;

  const hotModule = hotModulesMap.get(target);
  if (!hotModule) {
    // No HMR handler registered for the accepting module, full reload.
    location.reload();
    return;
  }

  const disposeCb = disposeMap.get(target);
  if (disposeCb) {
    disposeCb(dataMap.get(target) || {});
  }

  try {
    hideErrorOverlay();
    const importUrl = (explicitImportRequired ? path : target) + '?t=' + timestamp;
    const newModule = await import(importUrl);

    if (hotModule.selfAccepted) {
      if (hotModule.selfAcceptCb) {
        hotModule.selfAcceptCb(newModule);
      }
    }

    if (hotModule.depCallbacks) {
      for (const [deps, cb] of hotModule.depCallbacks) {
        if (deps.includes(path)) {
          cb(deps.map(d => (d === path ? newModule : undefined)));
        }
      }
    }

    console.log(`[howth] hot updated: ${target}`);
  } catch (err) {
    console.error(`[howth] HMR update failed for ${target}:`, err);
    location.reload();
  }
}

function showErrorOverlay(message) {
  let overlay = document.getElementById('__howth_error_overlay');
  if (!overlay) {
    overlay = document.createElement('div');
    overlay.id = '__howth_error_overlay';
    overlay.style.cssText = `
      position: fixed; top: 0; left: 0; right: 0; bottom: 0;
      background: rgba(0,0,0,0.9); color: #ff5555;
      padding: 32px; font-family: monospace; font-size: 16px;
      white-space: pre-wrap; overflow: auto; z-index: 999999;
    `;
    document.body.appendChild(overlay);
  }
  overlay.textContent = 'Build Error:\n\n' + message;
  overlay.style.display = 'block';
}

function hideErrorOverlay() {
  const overlay = document.getElementById('__howth_error_overlay');
  if (overlay) overlay.style.display = 'none';
}

export function createHotContext(ownerPath) {
  if (prunedPaths.has(ownerPath)) {
    prunedPaths.delete(ownerPath);
  }
  if (!dataMap.has(ownerPath)) {
    dataMap.set(ownerPath, {});
  }

  const hot = {
    get data() {
      return dataMap.get(ownerPath);
    },

    accept(deps, cb) {
      if (typeof deps === 'function' || !deps) {
        const entry = hotModulesMap.get(ownerPath) || {
          selfAccepted: false,
          depCallbacks: [],
        };
        entry.selfAccepted = true;
        entry.selfAcceptCb = typeof deps === 'function' ? deps : cb;
        hotModulesMap.set(ownerPath, entry);
        if (ws && ws.readyState === WebSocket.OPEN) {
          ws.send(JSON.stringify({ type: 'hotAccept', path: ownerPath }));
        }
      } else if (typeof deps === 'string') {
        const entry = hotModulesMap.get(ownerPath) || {
          selfAccepted: false,
          depCallbacks: [],
        };
        entry.depCallbacks.push([[deps], cb]);
        hotModulesMap.set(ownerPath, entry);
      } else if (Array.isArray(deps)) {
        const entry = hotModulesMap.get(ownerPath) || {
          selfAccepted: false,
          depCallbacks: [],
        };
        entry.depCallbacks.push([deps, cb]);
        hotModulesMap.set(ownerPath, entry);
      }
    },

    dispose(cb) {
      disposeMap.set(ownerPath, cb);
    },

    invalidate() {
      ws.send(JSON.stringify({ type: 'invalidate', path: ownerPath }));
      location.reload();
    },

    on(event, cb) {
      if (!customListeners.has(event)) {
        customListeners.set(event, []);
      }
      customListeners.get(event).push(cb);
    },

    send(event, data) {
      ws.send(JSON.stringify({ type: 'custom', event, data }));
    },
  };

  return hot;
}

setupWebSocket();
";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dev::graph::{ModuleGraph, ModuleKind, ResolveError, ResolvedId, Resolver, TransformResult};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::PathBuf;

    struct StaticResolver {
        root: PathBuf,
    }

    #[async_trait]
    impl Resolver for StaticResolver {
        async fn resolve_id(&self, url: &str) -> Result<Option<ResolvedId>, ResolveError> {
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

    async fn graph_with(urls: &[&str]) -> (ModuleGraph, StaticResolver) {
        let graph = ModuleGraph::new("client");
        let resolver = StaticResolver {
            root: PathBuf::from("/project"),
        };
        for url in urls {
            graph.ensure_entry_from_url(url, &resolver).await.unwrap();
        }
        (graph, resolver)
    }

    async fn mark_self_accepting(graph: &ModuleGraph, url: &str, resolver: &StaticResolver) {
        graph
            .update_module_transform_result(
                url,
                TransformResult {
                    code: "x".into(),
                    map: None,
                    etag: format!("etag-{url}"),
                },
                SelfAccepting::True,
                &[],
                None,
                resolver,
            )
            .await;
    }

    async fn mark_non_accepting(graph: &ModuleGraph, url: &str, resolver: &StaticResolver) {
        graph
            .update_module_transform_result(
                url,
                TransformResult {
                    code: "x".into(),
                    map: None,
                    etag: format!("etag-{url}"),
                },
                SelfAccepting::False,
                &[],
                None,
                resolver,
            )
            .await;
    }

    #[tokio::test]
    async fn self_accepting_module_is_its_own_boundary() {
        let (graph, resolver) = graph_with(&["/src/App.tsx"]).await;
        mark_self_accepting(&graph, "/src/App.tsx", &resolver).await;

        match propagate_update(&graph, "/src/App.tsx", 1) {
            PropagateOutcome::Updates(updates) => {
                assert_eq!(updates.len(), 1);
                assert_eq!(updates[0].path, "/src/App.tsx");
                assert_eq!(updates[0].accepted_path, "/src/App.tsx");
            }
            other => panic!("expected one update, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn leaf_with_no_importers_is_dead_end() {
        let (graph, resolver) = graph_with(&["/src/utils.ts"]).await;
        mark_non_accepting(&graph, "/src/utils.ts", &resolver).await;

        match propagate_update(&graph, "/src/utils.ts", 1) {
            PropagateOutcome::FullReload { triggered_by } => {
                assert_eq!(triggered_by, "/src/utils.ts");
            }
            other => panic!("expected full reload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_self_accepting_state_stops_propagation_quietly() {
        let (graph, resolver) = graph_with(&["/src/App.tsx", "/src/main.tsx"]).await;
        graph
            .update_module_info(
                "/src/main.tsx",
                &["/src/App.tsx".to_string()],
                HashMap::new(),
                &resolver,
            )
            .await;

        // App.tsx was never transformed: is_self_accepting is Unknown.
        match propagate_update(&graph, "/src/App.tsx", 1) {
            PropagateOutcome::NoUpdate => {}
            other => panic!("expected no update, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dep_accepting_importer_becomes_boundary() {
        let (graph, resolver) = graph_with(&["/src/util.ts", "/src/App.tsx"]).await;
        mark_non_accepting(&graph, "/src/util.ts", &resolver).await;
        graph
            .update_module_info(
                "/src/App.tsx",
                &["/src/util.ts".to_string()],
                HashMap::new(),
                &resolver,
            )
            .await;
        graph
            .update_module_transform_result(
                "/src/App.tsx",
                TransformResult {
                    code: "x".into(),
                    map: None,
                    etag: "app-etag".into(),
                },
                SelfAccepting::False,
                &["/src/util.ts".to_string()],
                None,
                &resolver,
            )
            .await;

        match propagate_update(&graph, "/src/util.ts", 5) {
            PropagateOutcome::Updates(updates) => {
                assert_eq!(updates.len(), 1);
                assert_eq!(updates[0].path, "/src/App.tsx");
                assert_eq!(updates[0].accepted_path, "/src/util.ts");
            }
            other => panic!("expected one update, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn partial_export_acceptance_skips_importer_using_only_accepted_names() {
        let (graph, resolver) = graph_with(&["/src/util.ts", "/src/App.tsx"]).await;
        let mut accepted = HashSet::new();
        accepted.insert("onlyThis".to_string());
        graph
            .update_module_transform_result(
                "/src/util.ts",
                TransformResult {
                    code: "x".into(),
                    map: None,
                    etag: "util-etag".into(),
                },
                SelfAccepting::False,
                &[],
                Some(accepted),
                &resolver,
            )
            .await;

        let mut bindings = HashMap::new();
        bindings.insert("/src/util.ts".to_string(), {
            let mut s = HashSet::new();
            s.insert("onlyThis".to_string());
            s
        });
        graph
            .update_module_info("/src/App.tsx", &["/src/util.ts".to_string()], bindings, &resolver)
            .await;
        mark_non_accepting(&graph, "/src/App.tsx", &resolver).await;

        // util.ts itself is a boundary (partial export acceptance); App.tsx
        // only consumes the accepted name so it is skipped, not walked
        // further (and has no importers of its own, but that no longer
        // matters since it was skipped rather than treated as a dead end).
        match propagate_update(&graph, "/src/util.ts", 9) {
            PropagateOutcome::Updates(updates) => {
                assert_eq!(updates.len(), 1);
                assert_eq!(updates[0].path, "/src/util.ts");
            }
            other => panic!("expected one update, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn css_leaf_with_only_css_importers_is_dead_end() {
        let graph = ModuleGraph::new("client");
        let resolver = StaticResolver {
            root: PathBuf::from("/project"),
        };
        graph.ensure_entry_from_url("/src/base.css", &resolver).await.unwrap();
        graph.ensure_entry_from_url("/src/theme.css", &resolver).await.unwrap();
        mark_non_accepting(&graph, "/src/base.css", &resolver).await;
        graph
            .update_module_info(
                "/src/theme.css",
                &["/src/base.css".to_string()],
                HashMap::new(),
                &resolver,
            )
            .await;

        match propagate_update(&graph, "/src/base.css", 1) {
            PropagateOutcome::FullReload { .. } => {}
            other => panic!("expected full reload, got {other:?}"),
        }
    }

    #[test]
    fn lex_self_accepting_empty_call() {
        let info = lex_accept_call("import.meta.hot.accept();").unwrap().unwrap();
        assert!(info.self_accepts);
        assert!(info.deps.is_empty());
    }

    #[test]
    fn lex_self_accepting_with_callback() {
        let info = lex_accept_call("import.meta.hot.accept((mod) => {});")
            .unwrap()
            .unwrap();
        assert!(info.self_accepts);
    }

    #[test]
    fn lex_single_dep_string() {
        let info = lex_accept_call("import.meta.hot.accept('./dep.js', () => {});")
            .unwrap()
            .unwrap();
        assert!(!info.self_accepts);
        assert_eq!(info.deps.len(), 1);
        assert_eq!(info.deps[0].specifier, "./dep.js");
    }

    #[test]
    fn lex_dep_array() {
        let info = lex_accept_call("import.meta.hot.accept(['./a.js', \"./b.js\"], () => {});")
            .unwrap()
            .unwrap();
        assert_eq!(info.deps.len(), 2);
        assert_eq!(info.deps[0].specifier, "./a.js");
        assert_eq!(info.deps[1].specifier, "./b.js");
    }

    #[test]
    fn lex_no_call_present() {
        assert!(lex_accept_call("export const x = 1;").unwrap().is_none());
    }

    #[test]
    fn lex_template_literal_is_lex_error() {
        let err = lex_accept_call("import.meta.hot.accept(`./${name}.js`);").unwrap_err();
        assert!(err.message.contains("template literal"));
    }

    #[test]
    fn lex_template_literal_inside_array_is_lex_error() {
        let err = lex_accept_call("import.meta.hot.accept([`./${name}.js`]);").unwrap_err();
        assert!(err.message.contains("template literal"));
    }

    #[test]
    fn client_runtime_interpolates_port() {
        let runtime = client_runtime(3000);
        assert!(runtime.contains("3000"));
        assert!(runtime.contains("createHotContext"));
        assert!(runtime.contains("__hmr"));
    }

    #[test]
    fn preamble_references_module_url() {
        let preamble = module_preamble("/src/App.tsx");
        assert!(preamble.contains("createHotContext"));
        assert!(preamble.contains("/src/App.tsx"));
    }

    #[test]
    fn broadcaster_serializes_update_payload() {
        let broadcaster = HmrBroadcaster::new(16);
        let mut rx = broadcaster.subscribe();
        broadcaster.send(HmrPayload::FullReload { path: Some("/src/App.tsx".into()) });
        let msg = rx.try_recv().unwrap();
        assert!(msg.contains("full-reload"));
        assert!(msg.contains("/src/App.tsx"));
    }

    #[test]
    fn read_with_retry_returns_immediately_for_nonempty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mod.ts");
        std::fs::write(&path, "export const x = 1;").unwrap();
        let content = read_module_source_with_retry(&path).unwrap();
        assert_eq!(content, "export const x = 1;");
    }
}
