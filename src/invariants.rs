//! Post-run state predicates.
//!
//! Predicates are declarative data (a state query plus a condition), not
//! callable code, so the same predicate set can be shipped in a run
//! configuration and reused across heterogeneous contracts.

use ethers::types::U256;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::RuntimeError;
use crate::runtime::{ContractRuntime, StateQuery};
use crate::types::AbiValue;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    UintAtLeast(U256),
    UintAtMost(U256),
    Equals(AbiValue),
    IsTrue,
    NonZeroAddress,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantPredicate {
    pub name: String,
    pub query: StateQuery,
    pub condition: Condition,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvariantViolation {
    pub predicate: String,
    pub message: String,
}

/// Evaluates every predicate against current contract state. A predicate
/// whose accessor does not exist on the contract is skipped; a predicate
/// whose query errors unexpectedly becomes a violation carrying the
/// underlying error; a false condition becomes a violation with the
/// observed value. One predicate never prevents the rest from running.
pub async fn check_invariants<R: ContractRuntime>(
    runtime: &mut R,
    contract: &str,
    predicates: &[InvariantPredicate],
) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    for predicate in predicates {
        match runtime.read_state(contract, &predicate.query).await {
            Err(RuntimeError::MissingAccessor(accessor)) => {
                debug!(
                    "skipping predicate `{}`: accessor `{}` not present on {}",
                    predicate.name, accessor, contract
                );
            }
            Err(e) => violations.push(InvariantViolation {
                predicate: predicate.name.clone(),
                message: e.to_string(),
            }),
            Ok(value) => match holds(&predicate.condition, &value) {
                Ok(true) => {}
                Ok(false) => violations.push(InvariantViolation {
                    predicate: predicate.name.clone(),
                    message: format!(
                        "{} returned {}, violating {}",
                        predicate.query.render(),
                        value,
                        describe(&predicate.condition)
                    ),
                }),
                Err(message) => violations.push(InvariantViolation {
                    predicate: predicate.name.clone(),
                    message,
                }),
            },
        }
    }

    violations
}

fn holds(condition: &Condition, value: &AbiValue) -> Result<bool, String> {
    match (condition, value) {
        (Condition::UintAtLeast(bound), AbiValue::Uint(actual, _)) => Ok(actual >= bound),
        (Condition::UintAtMost(bound), AbiValue::Uint(actual, _)) => Ok(actual <= bound),
        (Condition::Equals(expected), actual) => Ok(expected == actual),
        (Condition::IsTrue, AbiValue::Bool(actual)) => Ok(*actual),
        (Condition::NonZeroAddress, AbiValue::Address(actual)) => Ok(!actual.is_zero()),
        (condition, value) => Err(format!(
            "{} cannot be applied to value {}",
            describe(condition),
            value
        )),
    }
}

fn describe(condition: &Condition) -> String {
    match condition {
        Condition::UintAtLeast(bound) => format!("uint >= {}", bound),
        Condition::UintAtMost(bound) => format!("uint <= {}", bound),
        Condition::Equals(expected) => format!("value == {}", expected),
        Condition::IsTrue => "value == true".to_string(),
        Condition::NonZeroAddress => "address != 0x0".to_string(),
    }
}
