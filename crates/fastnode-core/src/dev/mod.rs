//! Vite-compatible unbundled development server.
//!
//! Serves individual ES modules on demand instead of a single bundle.
//! Each request triggers a resolve → load → transpile → transform → rewrite
//! pipeline, with results cached until the source file changes.

pub mod config;
pub mod env;
pub mod graph;
pub mod hmr;
pub mod optimizer;
pub mod rewrite;
pub mod transform;

pub use config::{
    find_config_file, load_config, load_tsconfig_paths, HowthConfig, OptimizeDepsConfig,
};
pub use env::{client_env_replacements, load_env_files};
pub use graph::{
    normalize_url, InvalidationState, ModuleGraph, ModuleKind, ModuleNode, ModuleNodeId,
    ResolveError, ResolvedId, Resolver, SelfAccepting, TransformResult,
};
pub use hmr::{
    client_runtime, lex_accept_call, module_preamble, propagate_update, AcceptInfo, AcceptedDep,
    HmrBroadcaster, HmrChannel, HmrPayload, LexError, PropagateOutcome, Update, UpdateType,
};
pub use optimizer::{
    BatchOutcome, DepBundler, DepInfo, DepOptimizer, OptimizeDepsStrategy, OptimizerError,
    OptimizerMetadata, OptimizerState, RegisteredDep, SyncBundlerAdapter,
};
pub use rewrite::{extract_import_urls, is_self_accepting_module, ImportRewriter};
pub use transform::ModuleTransformer;
