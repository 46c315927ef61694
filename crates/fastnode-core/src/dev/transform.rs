//! Per-request module transformation pipeline for unbundled dev serving.
//!
//! Handles: resolve → load → transpile → plugin transform → import rewrite,
//! with results and HMR accept metadata stored on the module graph rather
//! than a private cache, and missing bare imports reported to the
//! dependency optimizer.

use crate::bundler::{LoadResult, PluginContainer};
use crate::dev::graph::{
    InvalidationState, ModuleGraph, ModuleKind, ResolveError, ResolvedId, Resolver,
    SelfAccepting, TransformResult as GraphTransformResult,
};
use crate::dev::hmr::{lex_accept_call, HmrChannel, HmrPayload};
use crate::dev::optimizer::DepOptimizer;
use crate::dev::rewrite::ImportRewriter;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Transformed module ready to serve.
#[derive(Debug, Clone)]
pub struct TransformedModule {
    /// The transformed source code (ready to serve).
    pub code: String,
    /// Content-Type to serve with.
    pub content_type: &'static str,
    /// The original file path.
    pub file_path: String,
    /// Timestamp when this was last transformed.
    pub timestamp: u64,
}

/// Resolves dev-server URL paths to files on disk, guessing common
/// extensions and index files. Used to populate
/// [`crate::dev::graph::ModuleGraph`] entries; does not consult plugin
/// `resolveId` hooks (those run ahead of it in [`ModuleTransformer::load_module`]
/// and [`ModuleTransformer::resolve_url_to_file`]).
struct FsResolver {
    root: PathBuf,
}

#[async_trait]
impl Resolver for FsResolver {
    async fn resolve_id(&self, url: &str) -> Result<Option<ResolvedId>, ResolveError> {
        // `/@style/<path>` is the CSS-injection-module url `ImportRewriter`
        // rewrites CSS imports to; unwrap it back to the real root-relative
        // file path before resolving on disk.
        let url = url.strip_prefix("/@style").unwrap_or(url);
        let stripped = url.strip_prefix('/').unwrap_or(url);
        let candidate = self.root.join(stripped);

        let resolved = if candidate.exists() && candidate.is_file() {
            Some(candidate)
        } else {
            [".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs"]
                .iter()
                .map(|ext| PathBuf::from(format!("{}{}", candidate.display(), ext)))
                .find(|p| p.exists())
                .or_else(|| {
                    ["index.ts", "index.tsx", "index.js", "index.jsx"]
                        .iter()
                        .map(|idx| candidate.join(idx))
                        .find(|p| p.exists())
                })
        };

        let Some(file) = resolved else {
            return Ok(None);
        };
        let kind = if file.extension().and_then(|e| e.to_str()) == Some("css") {
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

/// Per-request module transformation pipeline.
///
/// Results live on the [`ModuleGraph`] node's `transform_result` /
/// `invalidation_state`, not in a private cache: a `Fresh` node's result is
/// served as-is, a `Stale` node is re-transformed and the new result
/// replaces it, and a `Hard`-invalidated node always re-runs the full
/// pipeline.
pub struct ModuleTransformer {
    /// Project root.
    root: PathBuf,
    /// Import rewriter.
    rewriter: RwLock<ImportRewriter>,
    /// File → url resolver backing graph entries.
    resolver: FsResolver,
    /// Module graph this transformer populates.
    graph: Arc<ModuleGraph>,
    /// Dependency optimizer notified of bare imports missing from its cache.
    optimizer: Option<Arc<DepOptimizer>>,
    /// Literal source replacements applied before plugin transforms run —
    /// `define` config entries plus `import.meta.env.*` substitutions.
    define: std::collections::HashMap<String, String>,
    /// HMR channel notified when a re-transform drops the last importer of
    /// another node (a `prune` payload).
    hmr: Option<Arc<dyn HmrChannel>>,
}

impl ModuleTransformer {
    /// Create a new module transformer backed by `graph`.
    pub fn new(root: PathBuf, graph: Arc<ModuleGraph>) -> Self {
        Self {
            resolver: FsResolver { root: root.clone() },
            rewriter: RwLock::new(ImportRewriter::new(root.clone())),
            root,
            graph,
            optimizer: None,
            define: std::collections::HashMap::new(),
            hmr: None,
        }
    }

    /// Attach a dependency optimizer; bare imports discovered during
    /// transform are reported to it via `register_missing_import`.
    #[must_use]
    pub fn with_optimizer(mut self, optimizer: Arc<DepOptimizer>) -> Self {
        self.optimizer = Some(optimizer);
        self
    }

    /// Attach an HMR channel; modules that lose their last importer during
    /// a re-transform are announced to it as a [`HmrPayload::Prune`].
    #[must_use]
    pub fn with_hmr_channel(mut self, hmr: Arc<dyn HmrChannel>) -> Self {
        self.hmr = Some(hmr);
        self
    }

    /// Attach literal source replacements (config `define` entries and/or
    /// `import.meta.env.*` substitutions from [`crate::dev::env`]).
    #[must_use]
    pub fn with_define(mut self, define: std::collections::HashMap<String, String>) -> Self {
        self.define = define;
        self
    }

    /// Update the optimized-dep `browserHash` suffix applied to future
    /// rewrites. Called after each optimizer batch commits.
    pub fn set_browser_hash(&self, hash: Option<String>) {
        self.rewriter.write().unwrap().set_browser_hash(hash);
    }

    /// Transform a module for serving.
    ///
    /// This runs the full pipeline: resolve → load → transpile → transform → rewrite,
    /// storing the result on the module graph. A `Fresh` node short-circuits
    /// straight to its stored result; `Stale`/`Hard` nodes re-run the pipeline.
    pub async fn transform_module(
        &self,
        url_path: &str,
        plugins: &PluginContainer,
    ) -> Result<TransformedModule, ModuleTransformError> {
        let node = self
            .graph
            .ensure_entry_from_url(url_path, &self.resolver)
            .await
            .map_err(|e| ModuleTransformError {
                message: format!("failed to resolve '{}': {:?}", e.specifier, e.importer),
                file: None,
            })?;
        // The graph strips `?t=`/`?import` query strings when indexing nodes
        // (see `graph::normalize_url`); all further writes must key off the
        // node's own canonical url rather than the raw request path, or a
        // fresh HMR re-fetch (`?t=...`) would silently miss the existing node.
        let url_path = node.url.as_str();

        if let InvalidationState::Fresh = node.invalidation_state {
            if let Some(result) = &node.transform_result {
                return Ok(TransformedModule {
                    code: result.code.clone(),
                    content_type: content_type_for(&node.file),
                    file_path: node.file.display().to_string(),
                    timestamp: node.last_hmr_timestamp,
                });
            }
        }

        let file_path = node.file.clone();
        let file_path_str = file_path.display().to_string();

        let source = self.load_module(&file_path_str, plugins)?;
        let source = self.apply_define(&source);

        let ext = file_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        let (code, content_type) = match ext {
            "ts" | "tsx" | "jsx" | "mts" | "cts" => {
                let transpiled = self.transpile(&source, &file_path)?;
                let transformed =
                    self.apply_plugin_transforms(&transpiled, &file_path_str, plugins)?;
                let rewritten = self.rewrite(&transformed, &file_path, plugins).await;
                (rewritten, "application/javascript")
            }
            "js" | "mjs" | "cjs" => {
                let transformed = self.apply_plugin_transforms(&source, &file_path_str, plugins)?;
                let rewritten = self.rewrite(&transformed, &file_path, plugins).await;
                (rewritten, "application/javascript")
            }
            "css" => {
                // CSS is served as a JS module that injects a <style> tag
                let css_module = create_css_module(&source);
                (css_module, "application/javascript")
            }
            "json" => {
                let json_module = format!("export default {};", source.trim());
                (json_module, "application/javascript")
            }
            _ => {
                return Err(ModuleTransformError {
                    message: format!("Unsupported file type: .{}", ext),
                    file: Some(file_path_str),
                });
            }
        };

        let timestamp = self.graph.next_timestamp();

        let imported_urls = crate::dev::rewrite::extract_import_urls(&code);
        let pruned = self
            .graph
            .update_module_info(
                url_path,
                &imported_urls,
                std::collections::HashMap::new(),
                &self.resolver,
            )
            .await;
        if !pruned.is_empty() {
            if let Some(hmr) = &self.hmr {
                hmr.send(HmrPayload::Prune { paths: pruned });
            }
        }

        let accept_info = lex_accept_call(&code).ok().flatten();
        let self_accepting = match &accept_info {
            Some(info) if info.self_accepts => SelfAccepting::True,
            Some(_) => SelfAccepting::False,
            None => SelfAccepting::Unknown,
        };
        let accepted_deps: Vec<String> = accept_info
            .as_ref()
            .map(|info| info.deps.iter().map(|d| d.specifier.clone()).collect())
            .unwrap_or_default();

        self.graph
            .update_module_transform_result(
                url_path,
                GraphTransformResult {
                    code: code.clone(),
                    map: None,
                    etag: blake3::hash(code.as_bytes()).to_hex().to_string(),
                },
                self_accepting,
                &accepted_deps,
                None,
                &self.resolver,
            )
            .await;

        Ok(TransformedModule {
            code,
            content_type,
            file_path: file_path_str,
            timestamp,
        })
    }

    /// Rewrite imports, reporting any bare specifiers missing from the
    /// optimizer's cache so a batch can be scheduled to bundle them.
    async fn rewrite(&self, code: &str, file_path: &Path, plugins: &PluginContainer) -> String {
        let rewritten = {
            let rewriter = self.rewriter.read().unwrap();
            rewriter.rewrite(code, file_path, plugins)
        };

        if let Some(optimizer) = &self.optimizer {
            for specifier in extract_optimized_specifiers(&rewritten) {
                if let Ok(Some(resolved)) = plugins.resolve_id(&specifier, None) {
                    if !resolved.external {
                        optimizer
                            .register_missing_import(&specifier, PathBuf::from(&resolved.id))
                            .await;
                    }
                }
            }
        }

        rewritten
    }

    /// Invalidate graph entries for a changed file.
    ///
    /// Returns the list of URL paths that were invalidated.
    pub fn invalidate(&self, file_path: &str) -> Vec<String> {
        self.graph.on_file_change(Path::new(file_path), false)
    }

    /// Invalidate all graph entries.
    pub fn invalidate_all(&self) {
        self.graph.invalidate_all();
    }


    /// Load a module's source code.
    fn load_module(
        &self,
        file_path: &str,
        plugins: &PluginContainer,
    ) -> Result<String, ModuleTransformError> {
        // Try plugin load hook first
        if let Ok(Some(LoadResult { code, .. })) = plugins.load(file_path) {
            return Ok(code);
        }

        // Fall back to file system
        std::fs::read_to_string(file_path).map_err(|e| ModuleTransformError {
            message: format!("Failed to read {}: {}", file_path, e),
            file: Some(file_path.to_string()),
        })
    }

    /// Transpile TypeScript/JSX to JavaScript using SWC.
    fn transpile(
        &self,
        source: &str,
        file_path: &Path,
    ) -> Result<String, ModuleTransformError> {
        use crate::compiler::{
            CompilerBackend, JsxRuntime, ModuleKind, SourceMapKind, SwcBackend, TranspileSpec,
        };

        let backend = SwcBackend::new();
        let ext = file_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("js");

        let input_name = file_path.display().to_string();
        let mut spec = TranspileSpec::new(&input_name, &input_name);
        spec.module = ModuleKind::ESM;
        spec.sourcemaps = SourceMapKind::None;

        // Enable JSX for .tsx and .jsx files
        if ext == "tsx" || ext == "jsx" {
            spec.jsx_runtime = JsxRuntime::Automatic;
        }

        let output = backend.transpile(&spec, source).map_err(|e| {
            ModuleTransformError {
                message: format!("Transpile error: {}", e),
                file: Some(input_name),
            }
        })?;

        Ok(output.code)
    }

    /// Replace each `define`/`import.meta.env.*` key with its literal value.
    ///
    /// A plain whole-identifier string substitution, matching esbuild's
    /// `define` semantics closely enough for this server's needs — it does
    /// not parse the source, so a key that also appears inside a string
    /// literal or comment is replaced too.
    fn apply_define(&self, code: &str) -> String {
        if self.define.is_empty() {
            return code.to_string();
        }
        let mut out = code.to_string();
        for (key, value) in &self.define {
            out = out.replace(key.as_str(), value.as_str());
        }
        out
    }

    /// Apply plugin transform hooks.
    fn apply_plugin_transforms(
        &self,
        code: &str,
        id: &str,
        plugins: &PluginContainer,
    ) -> Result<String, ModuleTransformError> {
        plugins.transform(code, id).map_err(|e| {
            ModuleTransformError {
                message: format!("Plugin transform error: {}", e),
                file: Some(id.to_string()),
            }
        })
    }
}

/// Content-Type to serve a graph node's cached result under, inferred from
/// its source file extension (CSS is always re-wrapped as a JS module by
/// `create_css_module`, so it serves as JS too).
fn content_type_for(_file: &Path) -> &'static str {
    "application/javascript"
}

/// Scan rewritten code for `/@modules/<specifier>` URLs and return their
/// bare specifiers, de-duplicated. Mirrors `rewrite::extract_import_urls`'s
/// line-scan approach but targets exactly the URLs that function excludes.
fn extract_optimized_specifiers(code: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    let mut rest = code;
    while let Some(start) = rest.find("/@modules/") {
        let after = &rest[start + "/@modules/".len()..];
        let end = after
            .find(|c: char| c == '\'' || c == '"' || c == '?' || c == '`')
            .unwrap_or(after.len());
        let specifier = &after[..end];
        if !specifier.is_empty() && seen.insert(specifier.to_string()) {
            out.push(specifier.to_string());
        }
        rest = &after[end..];
    }
    out
}

/// Create a CSS-as-JS module that injects a <style> tag.
fn create_css_module(css: &str) -> String {
    let escaped = css
        .replace('\\', "\\\\")
        .replace('`', "\\`")
        .replace("${", "\\${");

    format!(
        r#"const css = `{}`;
const style = document.createElement('style');
style.setAttribute('data-howth-css', '');
style.textContent = css;
document.head.appendChild(style);

// HMR support: remove old style on update
if (import.meta.hot) {{
  import.meta.hot.accept();
  import.meta.hot.dispose(() => {{
    style.remove();
  }});
}}

export default css;
"#,
        escaped
    )
}

/// Error during module transformation.
#[derive(Debug)]
pub struct ModuleTransformError {
    /// Human-readable error message.
    pub message: String,
    /// File path (if applicable).
    pub file: Option<String>,
}

impl std::fmt::Display for ModuleTransformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{} ({})", self.message, file)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ModuleTransformError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_css_module() {
        let css = "body { color: red; }";
        let module = create_css_module(css);

        assert!(module.contains("body { color: red; }"));
        assert!(module.contains("document.createElement('style')"));
        assert!(module.contains("export default css"));
    }

    #[test]
    fn extract_optimized_specifiers_dedupes_and_stops_at_query_or_quote() {
        let code = r#"
import x from "/@modules/lodash?v=abc123";
import y from '/@modules/lodash?v=abc123';
import z from "/@modules/react-dom";
"#;
        let specifiers = extract_optimized_specifiers(code);
        assert_eq!(specifiers, vec!["lodash".to_string(), "react-dom".to_string()]);
    }

    #[tokio::test]
    async fn transform_module_populates_graph_and_short_circuits_when_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        std::fs::write(root.join("main.js"), "export const x = 1;\n").unwrap();

        let graph = Arc::new(ModuleGraph::new("client"));
        let transformer = ModuleTransformer::new(root.clone(), Arc::clone(&graph));
        let plugins = PluginContainer::new(root.clone());

        let first = transformer
            .transform_module("/main.js", &plugins)
            .await
            .unwrap();
        assert!(first.code.contains("export const x = 1"));

        let node = graph.get_module_by_url("/main.js").unwrap();
        assert!(matches!(node.invalidation_state, InvalidationState::Fresh));
        assert!(node.transform_result.is_some());

        // Second call hits the Fresh short-circuit; still returns the same code.
        let second = transformer
            .transform_module("/main.js", &plugins)
            .await
            .unwrap();
        assert_eq!(first.code, second.code);
    }

    #[tokio::test]
    async fn transform_module_records_self_accepting_from_lexer() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        std::fs::write(
            root.join("widget.js"),
            "export const x = 1;\nimport.meta.hot.accept();\n",
        )
        .unwrap();

        let graph = Arc::new(ModuleGraph::new("client"));
        let transformer = ModuleTransformer::new(root.clone(), Arc::clone(&graph));
        let plugins = PluginContainer::new(root.clone());

        transformer
            .transform_module("/widget.js", &plugins)
            .await
            .unwrap();

        let node = graph.get_module_by_url("/widget.js").unwrap();
        assert_eq!(node.is_self_accepting, SelfAccepting::True);
    }

    #[tokio::test]
    async fn invalidate_clears_graph_entry_for_changed_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let file = root.join("main.js");
        std::fs::write(&file, "export const x = 1;\n").unwrap();

        let graph = Arc::new(ModuleGraph::new("client"));
        let transformer = ModuleTransformer::new(root.clone(), Arc::clone(&graph));
        let plugins = PluginContainer::new(root.clone());

        transformer.transform_module("/main.js", &plugins).await.unwrap();
        let invalidated = transformer.invalidate(&file.display().to_string());
        assert_eq!(invalidated, vec!["/main.js".to_string()]);

        let node = graph.get_module_by_url("/main.js").unwrap();
        assert!(!matches!(node.invalidation_state, InvalidationState::Fresh));
    }

    #[tokio::test]
    async fn transform_module_applies_define_replacements() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        std::fs::write(
            root.join("main.js"),
            "console.log(import.meta.env.MODE, import.meta.env.VITE_API_URL);\n",
        )
        .unwrap();

        let graph = Arc::new(ModuleGraph::new("client"));
        let mut define = std::collections::HashMap::new();
        define.insert("import.meta.env.MODE".to_string(), "\"development\"".to_string());
        define.insert(
            "import.meta.env.VITE_API_URL".to_string(),
            "\"https://api.example.com\"".to_string(),
        );
        let transformer =
            ModuleTransformer::new(root.clone(), Arc::clone(&graph)).with_define(define);
        let plugins = PluginContainer::new(root.clone());

        let result = transformer.transform_module("/main.js", &plugins).await.unwrap();
        assert!(result.code.contains("\"development\""));
        assert!(result.code.contains("\"https://api.example.com\""));
        assert!(!result.code.contains("import.meta.env.MODE"));
    }

    struct CapturingChannel {
        sent: std::sync::Mutex<Vec<HmrPayload>>,
    }

    impl HmrChannel for CapturingChannel {
        fn send(&self, payload: HmrPayload) {
            self.sent.lock().unwrap().push(payload);
        }
    }

    #[tokio::test]
    async fn transform_module_sends_prune_when_import_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        std::fs::write(root.join("util.js"), "export const x = 1;\n").unwrap();
        std::fs::write(
            root.join("main.js"),
            "import './util.js';\nexport const y = 2;\n",
        )
        .unwrap();

        let graph = Arc::new(ModuleGraph::new("client"));
        let channel = Arc::new(CapturingChannel {
            sent: std::sync::Mutex::new(Vec::new()),
        });
        let transformer = ModuleTransformer::new(root.clone(), Arc::clone(&graph))
            .with_hmr_channel(Arc::clone(&channel) as Arc<dyn HmrChannel>);
        let plugins = PluginContainer::new(root.clone());

        transformer.transform_module("/util.js", &plugins).await.unwrap();
        transformer.transform_module("/main.js", &plugins).await.unwrap();
        assert!(channel.sent.lock().unwrap().is_empty());

        // main.js no longer imports util.js; re-transform should report it pruned.
        std::fs::write(root.join("main.js"), "export const y = 2;\n").unwrap();
        transformer.invalidate(&root.join("main.js").display().to_string());
        transformer.transform_module("/main.js", &plugins).await.unwrap();

        let sent = channel.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            HmrPayload::Prune { paths } => assert_eq!(paths, &vec!["/util.js".to_string()]),
            other => panic!("expected Prune, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn repeat_requests_with_hmr_query_resolve_to_same_node() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        std::fs::write(root.join("main.js"), "export const x = 1;\n").unwrap();

        let graph = Arc::new(ModuleGraph::new("client"));
        let transformer = ModuleTransformer::new(root.clone(), Arc::clone(&graph));
        let plugins = PluginContainer::new(root.clone());

        transformer.transform_module("/main.js", &plugins).await.unwrap();
        transformer
            .transform_module("/main.js?t=1690000000000", &plugins)
            .await
            .unwrap();

        // Both requests must resolve to the same graph node, not two.
        let first_id = graph.id_of_url("/main.js").unwrap();
        let second_id = graph.id_of_url("/main.js?t=1690000000000").unwrap();
        assert_eq!(first_id, second_id);
    }
}
