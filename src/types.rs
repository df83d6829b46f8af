// type definitions
use std::fmt;
use std::sync::Arc;

use ethers::types::{Address, I256, U256};
use serde::{Deserialize, Serialize};

/// Declared type of a single function parameter, as supplied by the
/// external ABI metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamType {
    Address,
    Uint(usize),
    Int(usize),
    Bool,
    FixedBytes(usize),
    Bytes,
    String,
    /// Anything we cannot synthesize values for (arrays, tuples, user
    /// structs). Carries the raw type tag for error reporting.
    Other(String),
}

impl ParamType {
    /// Parses a Solidity ABI type string ("uint256", "bytes32", ...).
    /// Unrecognized tags land in `Other` rather than failing, so that a
    /// single exotic parameter does not reject the whole ABI file.
    pub fn parse(tag: &str) -> Self {
        match tag {
            "address" => ParamType::Address,
            "bool" => ParamType::Bool,
            "string" => ParamType::String,
            "bytes" => ParamType::Bytes,
            _ => {
                if let Some(rest) = tag.strip_prefix("uint") {
                    match parse_int_width(rest) {
                        Some(width) => ParamType::Uint(width),
                        None => ParamType::Other(tag.to_string()),
                    }
                } else if let Some(rest) = tag.strip_prefix("int") {
                    match parse_int_width(rest) {
                        Some(width) => ParamType::Int(width),
                        None => ParamType::Other(tag.to_string()),
                    }
                } else if let Some(rest) = tag.strip_prefix("bytes") {
                    match rest.parse::<usize>() {
                        Ok(len) if (1..=32).contains(&len) => ParamType::FixedBytes(len),
                        _ => ParamType::Other(tag.to_string()),
                    }
                } else {
                    ParamType::Other(tag.to_string())
                }
            }
        }
    }

}

/// Bare "uint"/"int" means 256 bits; explicit widths must be a multiple
/// of 8 in [8, 256].
fn parse_int_width(rest: &str) -> Option<usize> {
    if rest.is_empty() {
        return Some(256);
    }
    match rest.parse::<usize>() {
        Ok(width) if width % 8 == 0 && (8..=256).contains(&width) => Some(width),
        _ => None,
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Address => write!(f, "address"),
            ParamType::Uint(width) => write!(f, "uint{}", width),
            ParamType::Int(width) => write!(f, "int{}", width),
            ParamType::Bool => write!(f, "bool"),
            ParamType::FixedBytes(len) => write!(f, "bytes{}", len),
            ParamType::Bytes => write!(f, "bytes"),
            ParamType::String => write!(f, "string"),
            ParamType::Other(tag) => write!(f, "{}", tag),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub kind: ParamType,
}

/// One callable operation of a contract, built once from external ABI
/// metadata and read-only for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    pub name: String,
    pub parameters: Vec<Param>,
    pub is_payable: bool,
    /// view/pure: exercised, but excluded from gas-effect analysis.
    pub is_read_only: bool,
    pub is_constructor: bool,
}

impl FunctionSignature {
    /// Canonical signature used for selector hashing,
    /// e.g. `transfer(address,uint256)`.
    pub fn canonical_signature(&self) -> String {
        let params: Vec<String> = self.parameters.iter().map(|p| p.kind.to_string()).collect();
        format!("{}({})", self.name, params.join(","))
    }
}

/// A concrete generated argument value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AbiValue {
    Address(Address),
    Uint(U256, usize),
    Int(I256, usize),
    Bool(bool),
    FixedBytes(Vec<u8>),
    Bytes(Vec<u8>),
    String(String),
}

impl AbiValue {
    /// Canonical type string of this value, for building call signatures.
    pub fn type_string(&self) -> String {
        match self {
            AbiValue::Address(_) => "address".to_string(),
            AbiValue::Uint(_, width) => format!("uint{}", width),
            AbiValue::Int(_, width) => format!("int{}", width),
            AbiValue::Bool(_) => "bool".to_string(),
            AbiValue::FixedBytes(bytes) => format!("bytes{}", bytes.len()),
            AbiValue::Bytes(_) => "bytes".to_string(),
            AbiValue::String(_) => "string".to_string(),
        }
    }
}

impl fmt::Display for AbiValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbiValue::Address(addr) => write!(f, "0x{}", hex::encode(addr.as_bytes())),
            AbiValue::Uint(value, _) => write!(f, "{}", value),
            AbiValue::Int(value, _) => write!(f, "{}", value),
            AbiValue::Bool(value) => write!(f, "{}", value),
            AbiValue::FixedBytes(bytes) | AbiValue::Bytes(bytes) => {
                if bytes.len() > 8 {
                    write!(f, "0x{}...", hex::encode(&bytes[..8]))
                } else {
                    write!(f, "0x{}", hex::encode(bytes))
                }
            }
            AbiValue::String(value) => {
                if value.len() > 30 {
                    write!(f, "\"{}...\"", &value[..27])
                } else {
                    write!(f, "\"{}\"", value)
                }
            }
        }
    }
}

/// A synthesized call: one function, one concrete argument tuple, and an
/// attached value iff the function is payable. Never mutated after
/// creation.
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub function: Arc<FunctionSignature>,
    pub arguments: Vec<AbiValue>,
    pub attached_value: Option<U256>,
}

/// Gas and id of the most recent confirmed transaction to a contract,
/// carried as diagnostic context on failures that have no confirmed gas
/// figure of their own.
#[derive(Debug, Clone, PartialEq)]
pub struct LastKnownGas {
    pub gas_used: u64,
    pub tx_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success {
        gas_used: u64,
        tx_id: String,
    },
    Failure {
        message: String,
        raw_context: Option<String>,
        last_known_gas: Option<LastKnownGas>,
    },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

/// One executed test case. Records are append-only and `index` preserves
/// submission order, which is significant: contract state accumulates
/// across calls.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub index: usize,
    pub test_case: TestCase,
    pub sender: String,
    pub outcome: Outcome,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_type_display() {
        assert_eq!(format!("{}", ParamType::Address), "address");
        assert_eq!(format!("{}", ParamType::Uint(256)), "uint256");
        assert_eq!(format!("{}", ParamType::Int(64)), "int64");
        assert_eq!(format!("{}", ParamType::Bool), "bool");
        assert_eq!(format!("{}", ParamType::FixedBytes(32)), "bytes32");
        assert_eq!(format!("{}", ParamType::Bytes), "bytes");
        assert_eq!(format!("{}", ParamType::String), "string");
    }

    #[test]
    fn param_type_parse() {
        assert_eq!(ParamType::parse("uint256"), ParamType::Uint(256));
        assert_eq!(ParamType::parse("uint"), ParamType::Uint(256));
        assert_eq!(ParamType::parse("int"), ParamType::Int(256));
        assert_eq!(ParamType::parse("uint8"), ParamType::Uint(8));
        assert_eq!(ParamType::parse("bytes32"), ParamType::FixedBytes(32));
        assert_eq!(ParamType::parse("bytes"), ParamType::Bytes);
        assert_eq!(ParamType::parse("address"), ParamType::Address);
        assert_eq!(
            ParamType::parse("uint256[]"),
            ParamType::Other("uint256[]".to_string())
        );
        assert_eq!(
            ParamType::parse("uint7"),
            ParamType::Other("uint7".to_string())
        );
        assert_eq!(
            ParamType::parse("bytes33"),
            ParamType::Other("bytes33".to_string())
        );
        assert_eq!(
            ParamType::parse("tuple"),
            ParamType::Other("tuple".to_string())
        );
    }

    #[test]
    fn canonical_signature() {
        let sig = FunctionSignature {
            name: "transfer".to_string(),
            parameters: vec![
                Param {
                    name: "to".to_string(),
                    kind: ParamType::Address,
                },
                Param {
                    name: "amount".to_string(),
                    kind: ParamType::Uint(256),
                },
            ],
            is_payable: false,
            is_read_only: false,
            is_constructor: false,
        };
        assert_eq!(sig.canonical_signature(), "transfer(address,uint256)");
    }

    #[test]
    fn value_display_elides_long_payloads() {
        let addr = AbiValue::Address(Address::zero());
        assert_eq!(
            format!("{}", addr),
            "0x0000000000000000000000000000000000000000"
        );

        let long = AbiValue::Bytes(vec![0xab; 16]);
        assert_eq!(format!("{}", long), "0xabababababababab...");

        let short = AbiValue::Bytes(vec![0x01, 0x02]);
        assert_eq!(format!("{}", short), "0x0102");
    }
}
