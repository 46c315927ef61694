//! Package.json dependency extraction.
//!
//! Provides utilities for reading and parsing dependencies from package.json files.

use super::error::{codes, PkgError};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Extracted dependencies from package.json.
#[derive(Debug, Clone, Default)]
pub struct PackageDeps {
    /// Valid dependencies as (name, range) pairs, sorted by name.
    pub deps: Vec<(String, String)>,
    /// Errors encountered during extraction.
    pub errors: Vec<PkgDepError>,
}

/// Error encountered while extracting a dependency.
#[derive(Debug, Clone)]
pub struct PkgDepError {
    /// Package name (if known).
    pub name: String,
    /// Error code.
    pub code: &'static str,
    /// Error message.
    pub message: String,
}

impl PkgDepError {
    /// Create a new dependency error.
    #[must_use]
    pub fn new(name: impl Into<String>, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code,
            message: message.into(),
        }
    }

    /// Create an invalid range error.
    #[must_use]
    pub fn invalid_range(name: &str, actual_type: &str) -> Self {
        Self::new(
            name,
            codes::PKG_DEP_RANGE_INVALID,
            format!("expected string, got {actual_type}"),
        )
    }

    /// Create an invalid section error.
    #[must_use]
    pub fn invalid_section(section: &str, actual_type: &str) -> Self {
        Self::new(
            section,
            codes::PKG_PACKAGE_JSON_INVALID,
            format!("'{section}' must be an object, got {actual_type}"),
        )
    }
}

/// Read and extract dependencies from a package.json file.
///
/// # Arguments
/// * `package_json_path` - Path to the package.json file
/// * `include_dev` - Whether to include devDependencies
/// * `include_optional` - Whether to include optionalDependencies
///
/// # Returns
/// A `PackageDeps` containing valid dependencies and any extraction errors.
///
/// # Errors
/// Returns `PkgError` if the file cannot be read or parsed as JSON.
pub fn read_package_deps(
    package_json_path: &Path,
    include_dev: bool,
    include_optional: bool,
) -> Result<PackageDeps, PkgError> {
    // Check file exists
    if !package_json_path.exists() {
        return Err(PkgError::package_json_not_found(package_json_path));
    }

    // Read file contents
    let content = fs::read_to_string(package_json_path)
        .map_err(|e| PkgError::package_json_invalid(format!("Failed to read: {e}")))?;

    // Parse JSON
    let pkg_json: Value = serde_json::from_str(&content)
        .map_err(|e| PkgError::package_json_invalid(format!("Invalid JSON: {e}")))?;

    // Ensure root is object
    let root = pkg_json
        .as_object()
        .ok_or_else(|| PkgError::package_json_invalid("package.json must be a JSON object"))?;

    let mut result = PackageDeps::default();

    // Use HashMap for deduplication; dependencies takes precedence
    let mut deps_map: HashMap<String, String> = HashMap::new();

    // Extract optionalDependencies first (lowest precedence)
    if include_optional {
        extract_section(
            root,
            "optionalDependencies",
            &mut deps_map,
            &mut result.errors,
        );
    }

    // Extract devDependencies (middle precedence)
    if include_dev {
        extract_section(root, "devDependencies", &mut deps_map, &mut result.errors);
    }

    // Extract dependencies last (highest precedence - overwrites others)
    extract_section(root, "dependencies", &mut deps_map, &mut result.errors);

    // Convert to sorted vec
    let mut deps_vec: Vec<(String, String)> = deps_map.into_iter().collect();
    deps_vec.sort_by(|a, b| a.0.cmp(&b.0));
    result.deps = deps_vec;

    Ok(result)
}

/// Extract dependencies from a specific section of package.json.
fn extract_section(
    root: &serde_json::Map<String, Value>,
    section: &str,
    deps_map: &mut HashMap<String, String>,
    errors: &mut Vec<PkgDepError>,
) {
    let Some(section_value) = root.get(section) else {
        return; // Section doesn't exist, that's fine
    };

    let Some(section_obj) = section_value.as_object() else {
        // Section exists but is not an object
        errors.push(PkgDepError::invalid_section(
            section,
            json_type_name(section_value),
        ));
        return;
    };

    for (name, range_value) in section_obj {
        if let Some(range) = range_value.as_str() {
            // Valid string range - insert (may overwrite from lower-precedence section)
            deps_map.insert(name.clone(), range.to_string());
        } else {
            // Invalid range type
            errors.push(PkgDepError::invalid_range(
                name,
                json_type_name(range_value),
            ));
        }
    }
}

/// Get a human-readable type name for a JSON value.
fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
