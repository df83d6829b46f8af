//! Ingestion of externally supplied ABI metadata.
//!
//! The function-signature extractor is a separate tool; we consume its
//! output in the standard Solidity ABI JSON format and reduce it to the
//! `FunctionSignature` model used by the rest of the run.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::types::{FunctionSignature, Param, ParamType};

#[derive(Debug, Deserialize)]
struct RawAbiEntry {
    #[serde(rename = "type")]
    kind: String,
    name: Option<String>,
    #[serde(default)]
    inputs: Vec<RawAbiParam>,
    #[serde(rename = "stateMutability")]
    state_mutability: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAbiParam {
    #[serde(default)]
    name: String,
    #[serde(rename = "type")]
    kind: String,
}

/// Parses a standard Solidity ABI JSON array. Events, errors, fallback
/// and receive entries are ignored; constructors are kept (the
/// synthesizer excludes them, but the signature set should reflect the
/// full metadata).
pub fn parse_abi(json: &str) -> Result<Vec<Arc<FunctionSignature>>> {
    let entries: Vec<RawAbiEntry> = serde_json::from_str(json).context("invalid ABI JSON")?;

    let mut signatures = Vec::new();
    for entry in entries {
        let is_constructor = entry.kind == "constructor";
        if entry.kind != "function" && !is_constructor {
            continue;
        }

        let name = if is_constructor {
            "constructor".to_string()
        } else {
            match entry.name {
                Some(name) => name,
                None => continue,
            }
        };

        let parameters = entry
            .inputs
            .iter()
            .map(|input| Param {
                name: input.name.clone(),
                kind: ParamType::parse(&input.kind),
            })
            .collect();

        let mutability = entry.state_mutability.as_deref().unwrap_or("nonpayable");
        signatures.push(Arc::new(FunctionSignature {
            name,
            parameters,
            is_payable: mutability == "payable",
            is_read_only: matches!(mutability, "view" | "pure"),
            is_constructor,
        }));
    }

    Ok(signatures)
}

pub fn load_abi(path: &Path) -> Result<Vec<Arc<FunctionSignature>>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read ABI file {}", path.display()))?;
    parse_abi(&json).with_context(|| format!("failed to parse ABI file {}", path.display()))
}
