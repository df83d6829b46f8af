//! Expansion of a function list into a batch of concrete test cases.

use std::sync::Arc;

use ethers::types::U256;

use crate::errors::SynthesisError;
use crate::generator::{GenMode, ValueGenerator};
use crate::types::{FunctionSignature, TestCase};

/// A function for which no calls could be synthesized, kept so the
/// aggregator can surface it in the error log instead of silently
/// dropping it.
#[derive(Debug, Clone)]
pub struct RejectedFunction {
    pub function: Arc<FunctionSignature>,
    pub error: SynthesisError,
}

#[derive(Debug, Default)]
pub struct SynthesisBatch {
    pub cases: Vec<TestCase>,
    pub rejected: Vec<RejectedFunction>,
}

pub struct Synthesizer {
    generator: ValueGenerator,
    shuffle: bool,
}

impl Synthesizer {
    pub fn new(generator: ValueGenerator, shuffle: bool) -> Self {
        Self { generator, shuffle }
    }

    /// Produces `cases_per_function` independent test cases for every
    /// non-constructor signature. Parameters are generated independently;
    /// there is no correlation between them or between cases. Functions
    /// with a parameter type we cannot synthesize are rejected whole.
    ///
    /// When shuffling is enabled the returned sequence is randomized to
    /// avoid always exercising functions in declaration order.
    pub fn synthesize(
        &mut self,
        signatures: &[Arc<FunctionSignature>],
        cases_per_function: usize,
        mode: GenMode,
    ) -> SynthesisBatch {
        let mut batch = SynthesisBatch::default();

        for signature in signatures {
            if signature.is_constructor {
                continue;
            }
            match self.cases_for(signature, cases_per_function, mode) {
                Ok(cases) => batch.cases.extend(cases),
                Err(error) => batch.rejected.push(RejectedFunction {
                    function: Arc::clone(signature),
                    error,
                }),
            }
        }

        if self.shuffle {
            self.generator.shuffle(&mut batch.cases);
        }
        batch
    }

    fn cases_for(
        &mut self,
        signature: &Arc<FunctionSignature>,
        count: usize,
        mode: GenMode,
    ) -> Result<Vec<TestCase>, SynthesisError> {
        let mut cases = Vec::with_capacity(count);
        for _ in 0..count {
            let mut arguments = Vec::with_capacity(signature.parameters.len());
            for param in &signature.parameters {
                arguments.push(self.generator.generate(&param.kind, mode)?);
            }
            let attached_value = if signature.is_payable {
                Some(match mode {
                    GenMode::Randomized => self.generator.attached_value(),
                    GenMode::Boundary => U256::zero(),
                })
            } else {
                None
            };
            cases.push(TestCase {
                function: Arc::clone(signature),
                arguments,
                attached_value,
            });
        }
        Ok(cases)
    }
}
