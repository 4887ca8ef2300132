//! Reading and writing schema declarations as JSON.

use std::fs;
use std::path::Path;

use schemata_core::DatabaseDeclaration;
use tracing::debug;

use crate::error::Result;

/// Loads a declaration from a JSON file.
///
/// # Errors
///
/// Fails if the file cannot be read or is not a valid declaration.
pub fn load_declaration(path: &Path) -> Result<DatabaseDeclaration> {
    let text = fs::read_to_string(path)?;
    let declaration: DatabaseDeclaration = serde_json::from_str(&text)?;
    debug!(
        path = %path.display(),
        tables = declaration.tables.len(),
        functions = declaration.functions.len(),
        "loaded schema declaration"
    );
    Ok(declaration)
}

/// Serializes a declaration as pretty-printed JSON.
///
/// # Errors
///
/// Fails only if serialization fails.
pub fn declaration_json(declaration: &DatabaseDeclaration) -> Result<String> {
    Ok(serde_json::to_string_pretty(declaration)?)
}
