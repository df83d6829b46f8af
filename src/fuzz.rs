//! Campaign orchestration: one fuzzing run over a batch of deployed
//! contracts.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::abi;
use crate::config::{ContractTarget, RunConfig};
use crate::generator::{GenMode, ValueGenerator};
use crate::harness::{DispatchTable, Harness, SenderPolicy};
use crate::invariants;
use crate::profiler;
use crate::report::{self, RunArtifacts};
use crate::runtime::ContractRuntime;
use crate::synthesizer::{SynthesisBatch, Synthesizer};

// Decorrelates the sender-rotation stream from the value stream.
const SENDER_SEED_SALT: u64 = 0x5eed_5a17;

#[derive(Debug, Default)]
pub struct CampaignSummary {
    pub contracts_run: usize,
    pub contracts_skipped: usize,
    pub total_success: usize,
    pub total_failed: usize,
    pub total_anomalies: usize,
    pub total_violations: usize,
}

pub struct FuzzCampaign {
    config: RunConfig,
}

impl FuzzCampaign {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    /// Fuzzes every configured contract in turn. A contract that cannot
    /// be set up (bad ABI file, no code at the address, unreachable
    /// runtime) is skipped with a warning; the run only fails if no
    /// contract could be fuzzed at all.
    pub async fn run<R: ContractRuntime>(
        &self,
        runtime: &mut R,
        out_dir: &Path,
    ) -> Result<CampaignSummary> {
        let seed = self.config.seed.unwrap_or_else(rand::random);
        info!(seed, "fuzzing campaign starting");

        let mut summary = CampaignSummary::default();
        for (index, target) in self.config.contracts.iter().enumerate() {
            // Offset the seed per contract so each gets an independent
            // but still reproducible stream.
            let contract_seed = seed.wrapping_add(index as u64);
            match self.run_contract(runtime, target, contract_seed).await {
                Ok(artifacts) => {
                    artifacts
                        .write(out_dir)
                        .with_context(|| format!("failed to write reports for {}", target.name))?;
                    artifacts.print_summary();
                    summary.contracts_run += 1;
                    summary.total_success += artifacts.successes();
                    summary.total_failed += artifacts.failures();
                    summary.total_anomalies += artifacts.anomalies();
                    summary.total_violations += artifacts.violations();
                }
                Err(e) => {
                    warn!(contract = %target.name, error = %e, "skipping contract");
                    summary.contracts_skipped += 1;
                }
            }
        }

        if summary.contracts_run == 0 {
            anyhow::bail!(
                "no contracts could be fuzzed ({} skipped)",
                summary.contracts_skipped
            );
        }
        Ok(summary)
    }

    async fn run_contract<R: ContractRuntime>(
        &self,
        runtime: &mut R,
        target: &ContractTarget,
        seed: u64,
    ) -> Result<RunArtifacts> {
        let signatures = abi::load_abi(&target.abi)?;
        runtime
            .attach(&target.name, &target.address)
            .await
            .with_context(|| format!("failed to attach {} at {}", target.name, target.address))?;

        let table = DispatchTable::from_signatures(&signatures);
        if table.is_empty() {
            anyhow::bail!("{} exposes no callable operations", target.name);
        }
        info!(
            contract = %target.name,
            functions = table.len(),
            "synthesizing test cases"
        );

        let generator = ValueGenerator::new(self.config.generator.clone(), seed);
        let mut synthesizer = Synthesizer::new(generator, self.config.shuffle);

        // Boundary cases first, so known edge values are exercised once
        // per run regardless of the randomized draw.
        let mut cases = Vec::new();
        if self.config.include_boundary {
            let boundary = synthesizer.synthesize(&signatures, 1, GenMode::Boundary);
            cases.extend(boundary.cases);
        }
        let SynthesisBatch {
            cases: randomized,
            rejected,
        } = synthesizer.synthesize(&signatures, self.config.cases_per_function, GenMode::Randomized);
        cases.extend(randomized);

        let accounts = if self.config.senders.accounts.is_empty() {
            runtime.accounts().to_vec()
        } else {
            self.config.senders.accounts.clone()
        };
        if accounts.is_empty() {
            anyhow::bail!("no sender accounts available for {}", target.name);
        }

        let policy = SenderPolicy {
            accounts,
            rotate: self.config.senders.rotate,
            non_deployer_bias: self.config.senders.non_deployer_bias,
        };
        let mut harness = Harness::new(table, policy, seed ^ SENDER_SEED_SALT);
        let records = harness
            .run(runtime, &target.name, &target.setup, cases)
            .await;

        let profiles = profiler::profile(&records, &self.config.profiler);
        let anomalies = profiler::detect_anomalies(&profiles);
        let summaries = profiler::summarize(&profiles, &anomalies);
        let violations =
            invariants::check_invariants(runtime, &target.name, &target.invariants).await;

        Ok(report::aggregate(
            &target.name,
            &records,
            &rejected,
            &profiles,
            &anomalies,
            summaries,
            &violations,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::runtime::mock::MockRuntime;

    const VAULT_ABI: &str = r#"[
        {"type": "function", "name": "deposit", "inputs": [], "stateMutability": "payable"},
        {"type": "function", "name": "withdraw",
         "inputs": [{"name": "amount", "type": "uint256"}],
         "stateMutability": "nonpayable"}
    ]"#;

    fn config_for(abi_path: &Path, cases: usize) -> RunConfig {
        let json = format!(
            r#"{{
                "contracts": [
                    {{"name": "Vault", "address": "0x5FbDB2315678afecb367f032d93F642f64180aa3", "abi": {:?}}}
                ],
                "cases_per_function": {},
                "seed": 7
            }}"#,
            abi_path.to_str().unwrap(),
            cases
        );
        serde_json::from_str(&json).unwrap()
    }

    #[tokio::test]
    async fn campaign_runs_end_to_end_against_a_mock_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let abi_path = dir.path().join("vault.json");
        let mut file = std::fs::File::create(&abi_path).unwrap();
        file.write_all(VAULT_ABI.as_bytes()).unwrap();

        let mut runtime = MockRuntime::new();
        runtime.expose("deposit");
        runtime.expose("withdraw");

        let campaign = FuzzCampaign::new(config_for(&abi_path, 10));
        let out_dir = dir.path().join("out");
        let summary = campaign.run(&mut runtime, &out_dir).await.unwrap();

        assert_eq!(summary.contracts_run, 1);
        assert_eq!(summary.contracts_skipped, 0);
        // 2 functions x (1 boundary + 10 randomized) cases
        assert_eq!(summary.total_success + summary.total_failed, 22);
        assert!(out_dir.join("Vault.gas.json").exists());
        assert!(out_dir.join("Vault.errors.json").exists());
    }

    #[tokio::test]
    async fn an_unreadable_abi_skips_the_contract_and_fails_the_empty_run() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        let mut runtime = MockRuntime::new();

        let campaign = FuzzCampaign::new(config_for(&missing, 5));
        let result = campaign.run(&mut runtime, dir.path()).await;
        assert!(result.is_err());
    }
}
