//! JSON Schema checks for planner and decomposer payloads (Draft 2020-12).

use anyhow::{Context, Result};
use jsonschema::Draft;
use serde_json::Value;

pub const MANIFEST_SCHEMA: &str = include_str!("../../schemas/manifest.schema.json");
pub const TASK_LIST_SCHEMA: &str = include_str!("../../schemas/task_list.schema.json");

/// Every violation of `schema_raw` by `instance`; empty when valid.
pub fn schema_errors(instance: &Value, schema_raw: &str) -> Result<Vec<String>> {
    let schema: Value = serde_json::from_str(schema_raw).context("parse json schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile json schema")?;
    Ok(compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect())
}
