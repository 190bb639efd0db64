//! The published JSON Schema of an unresolved scope request.

use anyhow::{anyhow, Context, Result};
use jsonschema::JSONSchema;
use serde_json::Value as Json;

/// `civ:ScopeRequest:Unresolved`, version 1.
pub const UNRESOLVED_SCHEMA_V1: &str = include_str!("../schemas/ScopeRequest/v1/Unresolved.json");

pub const UNRESOLVED_SCHEMA_TITLE: &str = "civ:ScopeRequest:Unresolved";

pub fn unresolved_schema() -> Result<Json> {
    serde_json::from_str(UNRESOLVED_SCHEMA_V1).context("embedded scope request schema is not JSON")
}

/// Every violation of the unresolved request schema; empty when `document`
/// conforms.
pub fn validate_unresolved(document: &Json) -> Result<Vec<String>> {
    let schema = unresolved_schema()?;
    let validator = JSONSchema::compile(&schema)
        .map_err(|error| anyhow!("unable to compile scope request schema: {error}"))?;

    let violations = match validator.validate(document) {
        Ok(()) => Vec::new(),
        Err(errors) => errors
            .map(|error| format!("{}: {error}", error.instance_path))
            .collect(),
    };
    if !violations.is_empty() {
        tracing::debug!(count = violations.len(), "scope request violates schema");
    }
    Ok(violations)
}

pub fn is_valid_unresolved(document: &Json) -> Result<bool> {
    Ok(validate_unresolved(document)?.is_empty())
}
