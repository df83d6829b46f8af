//! Sequential, fault-isolated execution of synthesized test cases
//! against one shared contract instance.

use std::collections::BTreeMap;
use std::sync::Arc;

use ethers::types::U256;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{RuntimeError, SynthesisError};
use crate::runtime::{CallOutcome, CallRequest, ContractRuntime};
use crate::types::{
    AbiValue, ExecutionRecord, FunctionSignature, LastKnownGas, Outcome, TestCase,
};

/// Typed invocation descriptors resolved once from ABI metadata. All
/// dispatch goes through this table; a name miss is a metadata/runtime
/// mismatch, recorded as a failure for the affected case.
#[derive(Debug, Default)]
pub struct DispatchTable {
    entries: BTreeMap<String, Arc<FunctionSignature>>,
}

impl DispatchTable {
    pub fn from_signatures(signatures: &[Arc<FunctionSignature>]) -> Self {
        let mut entries = BTreeMap::new();
        for signature in signatures {
            if signature.is_constructor {
                continue;
            }
            entries.insert(signature.name.clone(), Arc::clone(signature));
        }
        Self { entries }
    }

    pub fn resolve(&self, name: &str) -> Option<&Arc<FunctionSignature>> {
        self.entries.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// One declarative pre-fuzzing call (e.g. funding a deposit), executed
/// before randomized cases so state-dependent paths are reachable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupCall {
    pub function: String,
    #[serde(default)]
    pub args: Vec<AbiValue>,
    #[serde(default)]
    pub value: Option<U256>,
}

/// Sender selection across the available accounts. Rotation is biased
/// toward non-deployer accounts to probe access control.
#[derive(Debug, Clone)]
pub struct SenderPolicy {
    pub accounts: Vec<String>,
    pub rotate: bool,
    pub non_deployer_bias: u8,
}

impl SenderPolicy {
    fn deployer(&self) -> &str {
        &self.accounts[0]
    }

    fn pick(&self, rng: &mut ChaCha8Rng) -> String {
        if !self.rotate || self.accounts.len() <= 1 {
            return self.accounts[0].clone();
        }
        if rng.gen_range(0..100) < self.non_deployer_bias as u32 {
            let index = rng.gen_range(1..self.accounts.len());
            self.accounts[index].clone()
        } else {
            self.accounts[0].clone()
        }
    }
}

pub struct Harness {
    table: DispatchTable,
    senders: SenderPolicy,
    rng: ChaCha8Rng,
    last_success: Option<LastKnownGas>,
}

impl Harness {
    pub fn new(table: DispatchTable, senders: SenderPolicy, seed: u64) -> Self {
        assert!(
            !senders.accounts.is_empty(),
            "harness requires at least one sender account"
        );
        Self {
            table,
            senders,
            rng: ChaCha8Rng::seed_from_u64(seed),
            last_success: None,
        }
    }

    /// Runs the setup sequence, then every synthesized case, strictly in
    /// order. No failure aborts the run: each case is fault-isolated and
    /// converted into a record.
    pub async fn run<R: ContractRuntime>(
        &mut self,
        runtime: &mut R,
        contract: &str,
        setup: &[SetupCall],
        cases: Vec<TestCase>,
    ) -> Vec<ExecutionRecord> {
        let mut records = Vec::with_capacity(setup.len() + cases.len());

        for call in setup {
            let case = self.setup_case(call);
            let sender = self.senders.deployer().to_string();
            let record = self
                .execute(runtime, contract, records.len(), case, sender)
                .await;
            records.push(record);
        }

        for case in cases {
            let sender = self.senders.pick(&mut self.rng);
            let record = self
                .execute(runtime, contract, records.len(), case, sender)
                .await;
            records.push(record);
        }

        records
    }

    /// Submits one test case and converts whatever happens into an
    /// `ExecutionRecord`. Failed attempts carry the gas and id of the
    /// most recent confirmed transaction to the same contract, since the
    /// attempt itself has no confirmed gas figure.
    pub async fn execute<R: ContractRuntime>(
        &mut self,
        runtime: &mut R,
        contract: &str,
        index: usize,
        case: TestCase,
        sender: String,
    ) -> ExecutionRecord {
        let outcome = if self.table.resolve(&case.function.name).is_none() {
            self.failure(
                SynthesisError::OperationNotFound(case.function.name.clone()).to_string(),
                None,
            )
        } else {
            let request = CallRequest {
                contract,
                function: &case.function,
                arguments: &case.arguments,
                value: case.attached_value,
                sender: &sender,
            };
            match runtime.invoke(&request).await {
                Ok(CallOutcome::Confirmed { gas_used, tx_id }) => {
                    self.last_success = Some(LastKnownGas {
                        gas_used,
                        tx_id: tx_id.clone(),
                    });
                    Outcome::Success { gas_used, tx_id }
                }
                Ok(CallOutcome::Reverted {
                    reason,
                    raw,
                    gas_used: _,
                }) => {
                    debug!("call to {} reverted: {}", case.function.name, reason);
                    self.failure(reason, Some(raw))
                }
                Err(RuntimeError::MissingOperation(name)) => self.failure(
                    SynthesisError::OperationNotFound(name).to_string(),
                    None,
                ),
                Err(e) => self.failure(e.to_string(), None),
            }
        };

        ExecutionRecord {
            index,
            test_case: case,
            sender,
            outcome,
        }
    }

    fn failure(&self, message: String, raw_context: Option<String>) -> Outcome {
        Outcome::Failure {
            message,
            raw_context,
            last_known_gas: self.last_success.clone(),
        }
    }

    /// Setup calls go through the same dispatch table as fuzzed calls; an
    /// unknown function name becomes an ordinary failure record.
    fn setup_case(&self, call: &SetupCall) -> TestCase {
        let function = match self.table.resolve(&call.function) {
            Some(signature) => Arc::clone(signature),
            None => Arc::new(FunctionSignature {
                name: call.function.clone(),
                parameters: Vec::new(),
                is_payable: call.value.is_some(),
                is_read_only: false,
                is_constructor: false,
            }),
        };
        TestCase {
            function,
            arguments: call.args.clone(),
            attached_value: call.value,
        }
    }
}
