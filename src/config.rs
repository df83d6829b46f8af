//! Run configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::generator::GeneratorConfig;
use crate::harness::SetupCall;
use crate::invariants::InvariantPredicate;
use crate::profiler::ProfilerConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Deployed contracts to fuzz. Each failure to set one up skips that
    /// contract only.
    pub contracts: Vec<ContractTarget>,
    /// Randomized test cases per eligible function.
    #[serde(default = "default_cases_per_function")]
    pub cases_per_function: usize,
    /// Seed for the value stream. Omitted: drawn fresh per run and
    /// logged, so any run can be reproduced.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Also synthesize one boundary case per function, so known edge
    /// values are exercised at least once per run.
    #[serde(default = "default_true")]
    pub include_boundary: bool,
    /// Shuffle each synthesized batch instead of exercising functions in
    /// declaration order.
    #[serde(default)]
    pub shuffle: bool,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub profiler: ProfilerConfig,
    #[serde(default)]
    pub senders: SenderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractTarget {
    pub name: String,
    /// Address of the already-deployed instance.
    pub address: String,
    /// Path to the ABI JSON produced by the signature extractor.
    pub abi: PathBuf,
    /// Calls executed once before randomized fuzzing begins.
    #[serde(default)]
    pub setup: Vec<SetupCall>,
    #[serde(default)]
    pub invariants: Vec<InvariantPredicate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// Sender identities. Empty: discovered from the runtime.
    pub accounts: Vec<String>,
    /// Rotate senders across calls instead of always using the deployer.
    pub rotate: bool,
    /// Percentage of rotated calls sent from a non-deployer account, to
    /// probe access control.
    pub non_deployer_bias: u8,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            accounts: Vec::new(),
            rotate: true,
            non_deployer_bias: 70,
        }
    }
}

fn default_cases_per_function() -> usize {
    50
}

fn default_true() -> bool {
    true
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::U256;

    #[test]
    fn minimal_config_uses_defaults() {
        let json = r#"{
            "contracts": [
                {"name": "Vault", "address": "0x5FbDB2315678afecb367f032d93F642f64180aa3", "abi": "abis/vault.json"}
            ]
        }"#;
        let config: RunConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.cases_per_function, 50);
        assert!(config.include_boundary);
        assert!(!config.shuffle);
        assert_eq!(config.seed, None);
        assert_eq!(config.generator.uint_ceiling, Some(U256::exp10(18)));
        assert_eq!(config.profiler.bin_count, 20);
        assert!(config.senders.rotate);
        assert_eq!(config.senders.non_deployer_bias, 70);
        assert!(config.contracts[0].setup.is_empty());
        assert!(config.contracts[0].invariants.is_empty());
    }

    #[test]
    fn full_config_round_trips_setup_and_invariants() {
        let json = r#"{
            "contracts": [
                {
                    "name": "Vault",
                    "address": "0x5FbDB2315678afecb367f032d93F642f64180aa3",
                    "abi": "abis/vault.json",
                    "setup": [
                        {"function": "deposit", "args": [], "value": "0x2386f26fc10000"}
                    ],
                    "invariants": [
                        {
                            "name": "supply_capped",
                            "query": {"accessor": "totalSupply", "args": [], "returns": {"Uint": 256}},
                            "condition": {"uint_at_most": "0xd3c21bcecceda1000000"}
                        }
                    ]
                }
            ],
            "cases_per_function": 20,
            "seed": 42,
            "shuffle": true
        }"#;
        let config: RunConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.cases_per_function, 20);
        assert_eq!(config.seed, Some(42));
        assert!(config.shuffle);

        let target = &config.contracts[0];
        assert_eq!(target.setup.len(), 1);
        assert_eq!(target.setup[0].function, "deposit");
        assert_eq!(target.setup[0].value, Some(U256::exp10(16)));
        assert_eq!(target.invariants.len(), 1);
        assert_eq!(target.invariants[0].name, "supply_capped");
    }
}
