//! Result aggregation.
//!
//! Merges error records and gas records into the final reportable
//! artifact set: error log, gas usage log, per-function summary
//! statistics, and a gas-distribution dataset suitable for external
//! visualization. All stages return their results explicitly; nothing is
//! accumulated in shared state.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;

use crate::invariants::InvariantViolation;
use crate::profiler::{AnomalyRecord, GasProfile, GasSummary};
use crate::synthesizer::RejectedFunction;
use crate::types::{ExecutionRecord, Outcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Execution,
    Synthesis,
    Invariant,
}

/// One entry per Failure and per InvariantViolation.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEntry {
    pub kind: ErrorKind,
    pub function: String,
    pub arguments: Vec<String>,
    pub message: String,
    pub raw_context: Option<String>,
    pub gas_used: String,
    pub tx_id: String,
}

/// One entry per Success.
#[derive(Debug, Clone, Serialize)]
pub struct GasEntry {
    pub function: String,
    pub arguments: Vec<String>,
    pub sender: String,
    pub attached_value: Option<String>,
    pub gas_used: u64,
    pub tx_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnomalyMarker {
    pub gas_used: u64,
    pub ratio: f64,
}

/// Per-function dataset handed off for external rendering.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionDistribution {
    pub function: String,
    pub samples: Vec<u64>,
    pub bin_edges: Vec<f64>,
    pub counts: Vec<u64>,
    pub modal_range: Option<(f64, f64)>,
    pub anomalies: Vec<AnomalyMarker>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunArtifacts {
    pub contract: String,
    pub error_log: Vec<ErrorEntry>,
    pub gas_log: Vec<GasEntry>,
    pub summary: BTreeMap<String, GasSummary>,
    pub distribution: Vec<FunctionDistribution>,
}

pub fn aggregate(
    contract: &str,
    records: &[ExecutionRecord],
    rejected: &[RejectedFunction],
    profiles: &BTreeMap<String, GasProfile>,
    anomalies: &[AnomalyRecord],
    summary: BTreeMap<String, GasSummary>,
    violations: &[InvariantViolation],
) -> RunArtifacts {
    let mut error_log = Vec::new();
    let mut gas_log = Vec::new();

    for rejection in rejected {
        error_log.push(ErrorEntry {
            kind: ErrorKind::Synthesis,
            function: rejection.function.name.clone(),
            arguments: Vec::new(),
            message: rejection.error.to_string(),
            raw_context: None,
            gas_used: "N/A".to_string(),
            tx_id: "N/A".to_string(),
        });
    }

    for record in records {
        let arguments: Vec<String> = record
            .test_case
            .arguments
            .iter()
            .map(|a| a.to_string())
            .collect();
        match &record.outcome {
            Outcome::Success { gas_used, tx_id } => gas_log.push(GasEntry {
                function: record.test_case.function.name.clone(),
                arguments,
                sender: record.sender.clone(),
                attached_value: record.test_case.attached_value.map(|v| v.to_string()),
                gas_used: *gas_used,
                tx_id: tx_id.clone(),
            }),
            Outcome::Failure {
                message,
                raw_context,
                last_known_gas,
            } => {
                let (gas_used, tx_id) = match last_known_gas {
                    Some(context) => (context.gas_used.to_string(), context.tx_id.clone()),
                    None => ("N/A".to_string(), "N/A".to_string()),
                };
                error_log.push(ErrorEntry {
                    kind: ErrorKind::Execution,
                    function: record.test_case.function.name.clone(),
                    arguments,
                    message: message.clone(),
                    raw_context: raw_context.clone(),
                    gas_used,
                    tx_id,
                });
            }
        }
    }

    for violation in violations {
        error_log.push(ErrorEntry {
            kind: ErrorKind::Invariant,
            function: violation.predicate.clone(),
            arguments: Vec::new(),
            message: violation.message.clone(),
            raw_context: None,
            gas_used: "N/A".to_string(),
            tx_id: "N/A".to_string(),
        });
    }

    let distribution = profiles
        .values()
        .map(|profile| distribution_for(profile, anomalies))
        .collect();

    RunArtifacts {
        contract: contract.to_string(),
        error_log,
        gas_log,
        summary,
        distribution,
    }
}

fn distribution_for(profile: &GasProfile, anomalies: &[AnomalyRecord]) -> FunctionDistribution {
    let samples: Vec<u64> = profile.samples.iter().map(|s| s.gas_used).collect();
    let (bin_edges, counts, modal_range) = match &profile.histogram {
        Some(histogram) => {
            let width = histogram.bin_width();
            let edges: Vec<f64> = (0..=histogram.counts.len())
                .map(|i| histogram.min as f64 + i as f64 * width)
                .collect();
            (
                edges,
                histogram.counts.clone(),
                Some((histogram.modal_lower, histogram.modal_upper)),
            )
        }
        None => (Vec::new(), Vec::new(), None),
    };
    let anomalies = anomalies
        .iter()
        .filter(|a| a.function == profile.function)
        .map(|a| AnomalyMarker {
            gas_used: a.gas_used,
            ratio: a.ratio,
        })
        .collect();

    FunctionDistribution {
        function: profile.function.clone(),
        samples,
        bin_edges,
        counts,
        modal_range,
        anomalies,
    }
}

impl RunArtifacts {
    pub fn successes(&self) -> usize {
        self.gas_log.len()
    }

    pub fn failures(&self) -> usize {
        self.error_log
            .iter()
            .filter(|e| e.kind != ErrorKind::Invariant)
            .count()
    }

    pub fn violations(&self) -> usize {
        self.error_log
            .iter()
            .filter(|e| e.kind == ErrorKind::Invariant)
            .count()
    }

    pub fn anomalies(&self) -> usize {
        self.distribution.iter().map(|d| d.anomalies.len()).sum()
    }

    /// Writes the artifact set as JSON files under `out_dir`.
    pub fn write(&self, out_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(out_dir)
            .with_context(|| format!("failed to create {}", out_dir.display()))?;
        self.write_json(out_dir, "errors", &self.error_log)?;
        self.write_json(out_dir, "gas", &self.gas_log)?;
        self.write_json(out_dir, "summary", &self.summary)?;
        self.write_json(out_dir, "distribution", &self.distribution)?;
        Ok(())
    }

    fn write_json<T: Serialize>(&self, out_dir: &Path, suffix: &str, payload: &T) -> Result<()> {
        let path = out_dir.join(format!("{}.{}.json", self.contract, suffix));
        let file = File::create(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(file, payload)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn print_summary(&self) {
        println!();
        println!("{}", format!("Results for {}", self.contract).bold());
        println!("  {} {} calls succeeded", "✔".green(), self.successes());
        println!("  {} {} calls failed", "✘".red(), self.failures());
        println!("  {} {} gas anomalies", "▲".yellow(), self.anomalies());
        println!(
            "  {} {} invariant violations",
            "!".magenta(),
            self.violations()
        );
        for (function, summary) in &self.summary {
            if summary.anomaly_count > 0 {
                println!(
                    "    {} {:.2}% of calls exceeded the typical gas range (avg {:.2}x)",
                    function.bold(),
                    summary.percentage_exceeded,
                    summary.average_exceeded_ratio
                );
            }
        }
    }
}
