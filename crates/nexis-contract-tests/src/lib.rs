#![warn(missing_docs)]
//! Helpers for validating wire fixtures against the frozen JSON schemas in
//! the workspace `contracts/` directory.

use std::path::PathBuf;

use jsonschema::JSONSchema;
use serde_json::Value;

/// Absolute path of a file under `contracts/`.
pub fn contract_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../contracts")
        .join(relative)
}

/// Reads and parses a JSON file under `contracts/`.
///
/// # Panics
/// Panics when the file is missing or not valid JSON; fixtures are part of
/// the repository.
pub fn load_contract_json(relative: &str) -> Value {
    let path = contract_path(relative);
    let raw = std::fs::read_to_string(&path)
        .unwrap_or_else(|error| panic!("{} should be readable: {error}", path.display()));
    serde_json::from_str(&raw)
        .unwrap_or_else(|error| panic!("{} should be valid JSON: {error}", path.display()))
}

/// Compiles the named schema under `contracts/`.
///
/// # Panics
/// Panics when the schema does not compile.
pub fn compile_schema(relative: &str) -> JSONSchema {
    let schema = load_contract_json(relative);
    JSONSchema::compile(&schema)
        .unwrap_or_else(|error| panic!("{relative} should compile: {error}"))
}

/// Validation error messages for `instance`; empty when valid.
pub fn schema_errors(schema: &JSONSchema, instance: &Value) -> Vec<String> {
    match schema.validate(instance) {
        Ok(()) => Vec::new(),
        Err(errors) => errors.map(|error| error.to_string()).collect(),
    }
}
