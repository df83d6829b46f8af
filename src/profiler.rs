//! Gas profiling and anomaly detection.
//!
//! Gas-usage distributions are frequently multi-modal (different code
//! paths), so the "expected" range is the histogram bin with the highest
//! sample count, not the mean: the dominant mode represents typical cost
//! where a mean would be skewed by rare expensive paths.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{ExecutionRecord, Outcome};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    /// Number of fixed-width histogram bins.
    pub bin_count: usize,
    /// Functions with fewer Success samples than this are skipped for
    /// anomaly detection but still reported with raw samples.
    pub min_samples: usize,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            bin_count: 20,
            min_samples: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GasSample {
    pub record_index: usize,
    pub gas_used: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GasHistogram {
    pub min: u64,
    pub max: u64,
    pub counts: Vec<u64>,
    pub modal_lower: f64,
    pub modal_upper: f64,
}

impl GasHistogram {
    pub fn bin_width(&self) -> f64 {
        if self.counts.len() <= 1 {
            (self.max - self.min) as f64
        } else {
            (self.max - self.min) as f64 / self.counts.len() as f64
        }
    }
}

/// Per-function gas distribution, computed from Success outcomes only.
#[derive(Debug, Clone, Serialize)]
pub struct GasProfile {
    pub function: String,
    pub samples: Vec<GasSample>,
    /// None when there are too few samples for a meaningful histogram.
    pub histogram: Option<GasHistogram>,
}

/// A Success record whose gas consumption exceeds the modal bin's upper
/// edge for its function.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyRecord {
    pub function: String,
    pub record_index: usize,
    pub gas_used: u64,
    pub modal_upper: f64,
    /// gas_used / modal upper bound.
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GasSummary {
    pub total_success: usize,
    pub anomaly_count: usize,
    pub percentage_exceeded: f64,
    pub average_exceeded_ratio: f64,
}

/// Aggregates per-function gas samples from Success outcomes. Failures
/// contribute to error reporting, not to the gas distribution; read-only
/// functions are excluded from gas-effect analysis entirely.
pub fn profile(
    records: &[ExecutionRecord],
    config: &ProfilerConfig,
) -> BTreeMap<String, GasProfile> {
    let mut samples_by_function: BTreeMap<String, Vec<GasSample>> = BTreeMap::new();
    for record in records {
        if record.test_case.function.is_read_only {
            continue;
        }
        if let Outcome::Success { gas_used, .. } = record.outcome {
            samples_by_function
                .entry(record.test_case.function.name.clone())
                .or_default()
                .push(GasSample {
                    record_index: record.index,
                    gas_used,
                });
        }
    }

    samples_by_function
        .into_iter()
        .map(|(function, samples)| {
            let histogram = if samples.len() >= config.min_samples {
                Some(build_histogram(&samples, config.bin_count))
            } else {
                None
            };
            (
                function.clone(),
                GasProfile {
                    function,
                    samples,
                    histogram,
                },
            )
        })
        .collect()
}

fn build_histogram(samples: &[GasSample], bin_count: usize) -> GasHistogram {
    let min = samples.iter().map(|s| s.gas_used).min().unwrap_or(0);
    let max = samples.iter().map(|s| s.gas_used).max().unwrap_or(0);

    // Degenerate distribution: every sample identical. One bin, and by
    // construction nothing can exceed its upper edge.
    if min == max {
        return GasHistogram {
            min,
            max,
            counts: vec![samples.len() as u64],
            modal_lower: min as f64,
            modal_upper: max as f64,
        };
    }

    let width = (max - min) as f64 / bin_count as f64;
    let mut counts = vec![0u64; bin_count];
    for sample in samples {
        let mut bin = (((sample.gas_used - min) as f64) / width) as usize;
        if bin >= bin_count {
            bin = bin_count - 1;
        }
        counts[bin] += 1;
    }

    // Lowest-index bin wins ties.
    let modal_index = counts
        .iter()
        .enumerate()
        .max_by(|(ia, a), (ib, b)| a.cmp(b).then(ib.cmp(ia)))
        .map(|(i, _)| i)
        .unwrap_or(0);

    GasHistogram {
        min,
        max,
        counts,
        modal_lower: min as f64 + modal_index as f64 * width,
        modal_upper: min as f64 + (modal_index + 1) as f64 * width,
    }
}

/// Flags Success records whose gas exceeds the modal bin's upper edge.
/// Functions without a histogram (too few samples, or no Success records
/// at all) are skipped.
pub fn detect_anomalies(profiles: &BTreeMap<String, GasProfile>) -> Vec<AnomalyRecord> {
    let mut anomalies = Vec::new();
    for profile in profiles.values() {
        let Some(histogram) = &profile.histogram else {
            continue;
        };
        for sample in &profile.samples {
            let gas = sample.gas_used as f64;
            if gas > histogram.modal_upper {
                anomalies.push(AnomalyRecord {
                    function: profile.function.clone(),
                    record_index: sample.record_index,
                    gas_used: sample.gas_used,
                    modal_upper: histogram.modal_upper,
                    ratio: gas / histogram.modal_upper,
                });
            }
        }
    }
    anomalies.sort_by_key(|a| a.record_index);
    anomalies
}

/// Per-function aggregate statistics over the detected anomalies. Both
/// figures are 0 when a function has no Success records or no detection
/// was performed.
pub fn summarize(
    profiles: &BTreeMap<String, GasProfile>,
    anomalies: &[AnomalyRecord],
) -> BTreeMap<String, GasSummary> {
    profiles
        .iter()
        .map(|(function, profile)| {
            let total_success = profile.samples.len();
            let exceeded: Vec<&AnomalyRecord> = anomalies
                .iter()
                .filter(|a| &a.function == function)
                .collect();
            let anomaly_count = exceeded.len();
            let percentage_exceeded = if total_success == 0 {
                0.0
            } else {
                anomaly_count as f64 / total_success as f64 * 100.0
            };
            let average_exceeded_ratio = if anomaly_count == 0 {
                0.0
            } else {
                exceeded.iter().map(|a| a.ratio).sum::<f64>() / anomaly_count as f64
            };
            (
                function.clone(),
                GasSummary {
                    total_success,
                    anomaly_count,
                    percentage_exceeded,
                    average_exceeded_ratio,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::types::{FunctionSignature, Outcome, TestCase};

    fn record(index: usize, function: &str, read_only: bool, outcome: Outcome) -> ExecutionRecord {
        ExecutionRecord {
            index,
            test_case: TestCase {
                function: Arc::new(FunctionSignature {
                    name: function.to_string(),
                    parameters: vec![],
                    is_payable: false,
                    is_read_only: read_only,
                    is_constructor: false,
                }),
                arguments: vec![],
                attached_value: None,
            },
            sender: "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".to_string(),
            outcome,
        }
    }

    fn success(index: usize, function: &str, gas_used: u64) -> ExecutionRecord {
        record(
            index,
            function,
            false,
            Outcome::Success {
                gas_used,
                tx_id: format!("0x{:064x}", index),
            },
        )
    }

    fn failure(index: usize, function: &str) -> ExecutionRecord {
        record(
            index,
            function,
            false,
            Outcome::Failure {
                message: "execution reverted".to_string(),
                raw_context: None,
                last_known_gas: None,
            },
        )
    }

    #[test]
    fn modal_cluster_flags_the_expensive_outlier() {
        let records: Vec<ExecutionRecord> = [100, 100, 100, 100, 100, 500]
            .iter()
            .enumerate()
            .map(|(i, gas)| success(i, "f", *gas))
            .collect();

        let profiles = profile(&records, &ProfilerConfig::default());
        let histogram = profiles["f"].histogram.as_ref().unwrap();
        // 20 bins over [100, 500]: width 20, the cluster lands in bin 0
        assert_eq!(histogram.modal_lower, 100.0);
        assert_eq!(histogram.modal_upper, 120.0);

        let anomalies = detect_anomalies(&profiles);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].gas_used, 500);
        assert!((anomalies[0].ratio - 500.0 / 120.0).abs() < 1e-9);

        let summary = &summarize(&profiles, &anomalies)["f"];
        assert!((summary.percentage_exceeded - 16.666).abs() < 0.01);
    }

    #[test]
    fn withdraw_scenario_flags_exactly_one_record() {
        let mut records = Vec::new();
        for i in 0..19 {
            records.push(success(i, "withdraw", 21_000 + (i as u64) * 100));
        }
        records.push(success(19, "withdraw", 90_000));

        let profiles = profile(&records, &ProfilerConfig::default());
        let anomalies = detect_anomalies(&profiles);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].record_index, 19);
        assert_eq!(anomalies[0].gas_used, 90_000);

        let summary = &summarize(&profiles, &anomalies)["withdraw"];
        assert_eq!(summary.total_success, 20);
        assert_eq!(summary.percentage_exceeded, 5.0);
    }

    #[test]
    fn failures_do_not_contribute_to_the_distribution() {
        let records = vec![
            success(0, "f", 21_000),
            failure(1, "f"),
            success(2, "f", 21_000),
            failure(3, "f"),
            success(4, "f", 21_000),
            success(5, "f", 21_000),
            success(6, "f", 21_000),
        ];
        let profiles = profile(&records, &ProfilerConfig::default());
        assert_eq!(profiles["f"].samples.len(), 5);
    }

    #[test]
    fn functions_with_no_successes_get_no_profile() {
        let records = vec![failure(0, "f"), failure(1, "f")];
        let profiles = profile(&records, &ProfilerConfig::default());
        assert!(profiles.is_empty());
        assert!(detect_anomalies(&profiles).is_empty());
    }

    #[test]
    fn too_few_samples_skip_detection_but_keep_raw_samples() {
        let records = vec![
            success(0, "f", 21_000),
            success(1, "f", 21_000),
            success(2, "f", 90_000),
        ];
        let profiles = profile(&records, &ProfilerConfig::default());
        let profile_f = &profiles["f"];
        assert!(profile_f.histogram.is_none());
        assert_eq!(profile_f.samples.len(), 3);
        assert!(detect_anomalies(&profiles).is_empty());

        let summary = &summarize(&profiles, &[])["f"];
        assert_eq!(summary.percentage_exceeded, 0.0);
        assert_eq!(summary.average_exceeded_ratio, 0.0);
    }

    #[test]
    fn read_only_functions_are_excluded_from_analysis() {
        let records: Vec<ExecutionRecord> = (0..10)
            .map(|i| {
                record(
                    i,
                    "balanceOf",
                    true,
                    Outcome::Success {
                        gas_used: 3_000,
                        tx_id: format!("0x{:064x}", i),
                    },
                )
            })
            .collect();
        let profiles = profile(&records, &ProfilerConfig::default());
        assert!(profiles.is_empty());
    }

    #[test]
    fn identical_samples_collapse_to_one_bin_with_no_anomalies() {
        let records: Vec<ExecutionRecord> =
            (0..8).map(|i| success(i, "f", 21_000)).collect();
        let profiles = profile(&records, &ProfilerConfig::default());
        let histogram = profiles["f"].histogram.as_ref().unwrap();
        assert_eq!(histogram.counts, vec![8]);
        assert_eq!(histogram.modal_upper, 21_000.0);
        assert!(detect_anomalies(&profiles).is_empty());
    }

    #[test]
    fn tied_bins_resolve_to_the_lowest_range() {
        // two samples at each extreme: bins 0 and 19 tie, bin 0 wins
        let records = vec![
            success(0, "f", 0),
            success(1, "f", 0),
            success(2, "f", 50),
            success(3, "f", 100),
            success(4, "f", 100),
        ];
        let profiles = profile(&records, &ProfilerConfig::default());
        let histogram = profiles["f"].histogram.as_ref().unwrap();
        assert_eq!(histogram.modal_lower, 0.0);
        assert_eq!(histogram.modal_upper, 5.0);
    }
}
