//! Contract runtime backends.
//!
//! The execution backend that deploys contracts is an external
//! collaborator; this module defines the invocation interface the harness
//! drives, plus one production implementation speaking JSON-RPC to an
//! Anvil-style node against already-deployed contract addresses.

use std::collections::HashMap;

use anyhow::Context;
use ethers::abi::{self, Token};
use ethers::types::{I256, U256};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::errors::RuntimeError;
use crate::types::{AbiValue, FunctionSignature, ParamType};

/// One invocation of a named operation, with a fixed-shape argument list.
/// Calls are dispatched by typed descriptor, never by evaluating
/// interpolated strings.
#[derive(Debug)]
pub struct CallRequest<'a> {
    pub contract: &'a str,
    pub function: &'a FunctionSignature,
    pub arguments: &'a [AbiValue],
    pub value: Option<U256>,
    pub sender: &'a str,
}

/// Definitive outcome of a submitted call. A revert is an expected,
/// informative outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    Confirmed {
        gas_used: u64,
        tx_id: String,
    },
    Reverted {
        reason: String,
        raw: String,
        gas_used: Option<u64>,
    },
}

/// A read of contract state through a named accessor, used by the
/// invariant checker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateQuery {
    pub accessor: String,
    #[serde(default)]
    pub args: Vec<AbiValue>,
    pub returns: ParamType,
}

impl StateQuery {
    /// Canonical rendering, e.g. `balanceOf(0x00...01)`.
    pub fn render(&self) -> String {
        let args: Vec<String> = self.args.iter().map(|a| a.to_string()).collect();
        format!("{}({})", self.accessor, args.join(","))
    }

    fn canonical_signature(&self) -> String {
        let types: Vec<String> = self.args.iter().map(|a| a.type_string()).collect();
        format!("{}({})", self.accessor, types.join(","))
    }
}

/// A deployed, stateful, executable contract instance behind an opaque
/// handle. State persists and accumulates across calls within a run; the
/// harness serializes all calls to one instance.
#[allow(async_fn_in_trait)]
pub trait ContractRuntime {
    /// Obtains a handle for an already-deployed contract. Failure here is
    /// a setup failure for that contract only.
    async fn attach(&mut self, name: &str, address: &str) -> Result<(), RuntimeError>;

    /// Submits one call and blocks until a definitive outcome.
    async fn invoke(&mut self, call: &CallRequest<'_>) -> Result<CallOutcome, RuntimeError>;

    /// Reads contract state through a view accessor without mutating it.
    async fn read_state(
        &mut self,
        contract: &str,
        query: &StateQuery,
    ) -> Result<AbiValue, RuntimeError>;

    /// Sender identities available on this runtime.
    fn accounts(&self) -> &[String];
}

/// 4-byte function selector from a canonical signature.
pub fn selector(signature: &str) -> [u8; 4] {
    use sha3::{Digest, Keccak256};
    let hash = Keccak256::digest(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn to_token(value: &AbiValue) -> Token {
    match value {
        AbiValue::Address(addr) => Token::Address(*addr),
        AbiValue::Uint(v, _) => Token::Uint(*v),
        AbiValue::Int(v, _) => Token::Int(v.into_raw()),
        AbiValue::Bool(b) => Token::Bool(*b),
        AbiValue::FixedBytes(bytes) => Token::FixedBytes(bytes.clone()),
        AbiValue::Bytes(bytes) => Token::Bytes(bytes.clone()),
        AbiValue::String(s) => Token::String(s.clone()),
    }
}

fn abi_param_type(kind: &ParamType) -> Result<abi::ParamType, RuntimeError> {
    match kind {
        ParamType::Address => Ok(abi::ParamType::Address),
        ParamType::Uint(width) => Ok(abi::ParamType::Uint(*width)),
        ParamType::Int(width) => Ok(abi::ParamType::Int(*width)),
        ParamType::Bool => Ok(abi::ParamType::Bool),
        ParamType::FixedBytes(len) => Ok(abi::ParamType::FixedBytes(*len)),
        ParamType::Bytes => Ok(abi::ParamType::Bytes),
        ParamType::String => Ok(abi::ParamType::String),
        ParamType::Other(tag) => Err(RuntimeError::UnsupportedValue(tag.clone())),
    }
}

fn from_token(token: Token, kind: &ParamType) -> Result<AbiValue, RuntimeError> {
    match (token, kind) {
        (Token::Address(addr), ParamType::Address) => Ok(AbiValue::Address(addr)),
        (Token::Uint(v), ParamType::Uint(width)) => Ok(AbiValue::Uint(v, *width)),
        (Token::Int(v), ParamType::Int(width)) => {
            Ok(AbiValue::Int(I256::from_raw(v), *width))
        }
        (Token::Bool(b), ParamType::Bool) => Ok(AbiValue::Bool(b)),
        (Token::FixedBytes(bytes), ParamType::FixedBytes(_)) => Ok(AbiValue::FixedBytes(bytes)),
        (Token::Bytes(bytes), ParamType::Bytes) => Ok(AbiValue::Bytes(bytes)),
        (Token::String(s), ParamType::String) => Ok(AbiValue::String(s)),
        (token, kind) => Err(RuntimeError::Decode(format!(
            "token {:?} does not match declared type {}",
            token, kind
        ))),
    }
}

/// selector + ABI-encoded arguments.
fn encode_calldata(signature: &str, arguments: &[AbiValue]) -> Vec<u8> {
    let tokens: Vec<Token> = arguments.iter().map(to_token).collect();
    let mut calldata = selector(signature).to_vec();
    calldata.extend_from_slice(&abi::encode(&tokens));
    calldata
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: serde_json::Value,
    id: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
    id: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct TransactionReceipt {
    status: Option<String>,
    #[serde(rename = "gasUsed")]
    gas_used: Option<String>,
}

/// JSON-RPC runtime backend for Anvil/Hardhat-style development nodes.
pub struct AnvilRuntime {
    rpc_url: String,
    client: reqwest::Client,
    contracts: HashMap<String, String>,
    accounts: Vec<String>,
    nonces: HashMap<String, u64>,
}

impl AnvilRuntime {
    pub async fn connect(rpc_url: &str) -> anyhow::Result<Self> {
        debug!("connecting to contract runtime at {}", rpc_url);
        let client = reqwest::Client::new();

        let result = Self::rpc_call(&client, rpc_url, "eth_accounts", json!([]))
            .await
            .context("failed to query runtime accounts")?;
        let accounts: Vec<String> = serde_json::from_value(result)
            .context("unexpected eth_accounts response shape")?;
        if accounts.is_empty() {
            anyhow::bail!("runtime at {} exposes no unlocked accounts", rpc_url);
        }
        debug!("found {} runtime accounts", accounts.len());

        let mut nonces = HashMap::new();
        for account in &accounts {
            let nonce = Self::transaction_count(&client, rpc_url, account)
                .await
                .unwrap_or(0);
            nonces.insert(account.clone(), nonce);
        }

        Ok(Self {
            rpc_url: rpc_url.to_string(),
            client,
            contracts: HashMap::new(),
            accounts,
            nonces,
        })
    }

    async fn rpc_call(
        client: &reqwest::Client,
        url: &str,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, RuntimeError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: 1,
        };

        let response = client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RuntimeError::Rpc(format!("failed to send request: {}", e)))?;

        let rpc_response: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| RuntimeError::Rpc(format!("failed to parse response: {}", e)))?;

        if let Some(error) = rpc_response.error {
            return Err(RuntimeError::Rpc(format!(
                "{} (code: {})",
                error.message, error.code
            )));
        }

        rpc_response
            .result
            .ok_or_else(|| RuntimeError::Rpc(format!("no result in {} response", method)))
    }

    async fn transaction_count(
        client: &reqwest::Client,
        url: &str,
        address: &str,
    ) -> Result<u64, RuntimeError> {
        let params = json!([address, "pending"]);
        let result = Self::rpc_call(client, url, "eth_getTransactionCount", params).await?;
        result
            .as_str()
            .and_then(parse_hex_u64)
            .ok_or_else(|| RuntimeError::Rpc("invalid nonce format".to_string()))
    }

    /// Polls for the receipt of a submitted transaction. A null result is
    /// valid (not mined yet).
    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<TransactionReceipt, RuntimeError> {
        let mut attempts = 0;
        loop {
            let result = Self::rpc_call(
                &self.client,
                &self.rpc_url,
                "eth_getTransactionReceipt",
                json!([tx_hash]),
            )
            .await?;

            if !result.is_null() {
                return serde_json::from_value(result)
                    .map_err(|e| RuntimeError::Rpc(format!("invalid receipt: {}", e)));
            }

            attempts += 1;
            if attempts > 100 {
                return Err(RuntimeError::Rpc(format!(
                    "transaction {} not mined after 100 attempts",
                    tx_hash
                )));
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        }
    }

    /// Simulates a reverted transaction with `eth_call` to recover its
    /// revert reason. The returned pair is (clean reason, raw error).
    async fn revert_reason(&self, to: &str, calldata_hex: &str, sender: &str) -> (String, String) {
        let call_params = json!({
            "from": sender,
            "to": to,
            "data": calldata_hex,
        });

        match Self::rpc_call(&self.client, &self.rpc_url, "eth_call", json!([call_params, "latest"]))
            .await
        {
            Ok(_) => (
                "no revert reason available".to_string(),
                "transaction reverted but eth_call simulation succeeded".to_string(),
            ),
            Err(e) => {
                let raw = e.to_string();
                let flat = raw.replace(['\n', '\r'], " ").trim().to_string();
                let clean = match flat.split("execution reverted:").nth(1) {
                    Some(reason) => reason.trim().to_string(),
                    None => flat.clone(),
                };
                (clean, raw)
            }
        }
    }

    fn nonce_hex(&self, sender: &str) -> String {
        let nonce = self.nonces.get(sender).copied().unwrap_or(0);
        format!("0x{:x}", nonce)
    }

    fn bump_nonce(&mut self, sender: &str) {
        *self.nonces.entry(sender.to_string()).or_insert(0) += 1;
    }
}

impl ContractRuntime for AnvilRuntime {
    async fn attach(&mut self, name: &str, address: &str) -> Result<(), RuntimeError> {
        let result = Self::rpc_call(
            &self.client,
            &self.rpc_url,
            "eth_getCode",
            json!([address, "latest"]),
        )
        .await?;
        let code = result.as_str().unwrap_or("0x");
        if code == "0x" || code.is_empty() {
            return Err(RuntimeError::Rpc(format!(
                "no contract code at {}",
                address
            )));
        }
        debug!("attached contract {} at {}", name, address);
        self.contracts.insert(name.to_string(), address.to_string());
        Ok(())
    }

    async fn invoke(&mut self, call: &CallRequest<'_>) -> Result<CallOutcome, RuntimeError> {
        let address = self
            .contracts
            .get(call.contract)
            .ok_or_else(|| RuntimeError::UnknownContract(call.contract.to_string()))?
            .clone();

        let signature = call.function.canonical_signature();
        let calldata = encode_calldata(&signature, call.arguments);
        let calldata_hex = format!("0x{}", hex::encode(&calldata));

        let value = call.value.unwrap_or_default();
        let tx_params = json!({
            "from": call.sender,
            "to": address,
            "data": calldata_hex,
            "value": format!("0x{:x}", value),
            "nonce": self.nonce_hex(call.sender),
            "gas": "0x1000000",
        });

        let tx_hash = match Self::rpc_call(
            &self.client,
            &self.rpc_url,
            "eth_sendTransaction",
            json!([tx_params]),
        )
        .await
        {
            Ok(value) => match value.as_str() {
                Some(hash) => hash.to_string(),
                None => {
                    return Err(RuntimeError::Rpc(
                        "invalid transaction hash format".to_string(),
                    ))
                }
            },
            // Runtime-level rejection of the submission itself; surface
            // it as a revert-style outcome so the run keeps going.
            Err(e) => {
                let raw = e.to_string();
                warn!("transaction submission rejected: {}", raw);
                return Ok(CallOutcome::Reverted {
                    reason: raw.replace(['\n', '\r'], " ").trim().to_string(),
                    raw,
                    gas_used: None,
                });
            }
        };

        let receipt = self.wait_for_receipt(&tx_hash).await?;
        self.bump_nonce(call.sender);

        let status = receipt.status.as_deref().unwrap_or("0x0");
        let gas_used = receipt.gas_used.as_deref().and_then(parse_hex_u64);

        if status == "0x1" || status == "1" {
            Ok(CallOutcome::Confirmed {
                gas_used: gas_used.unwrap_or(0),
                tx_id: tx_hash,
            })
        } else {
            let (reason, raw) = self
                .revert_reason(&address, &calldata_hex, call.sender)
                .await;
            Ok(CallOutcome::Reverted {
                reason,
                raw,
                gas_used,
            })
        }
    }

    async fn read_state(
        &mut self,
        contract: &str,
        query: &StateQuery,
    ) -> Result<AbiValue, RuntimeError> {
        let address = self
            .contracts
            .get(contract)
            .ok_or_else(|| RuntimeError::UnknownContract(contract.to_string()))?
            .clone();

        let calldata = encode_calldata(&query.canonical_signature(), &query.args);
        let call_params = json!({
            "to": address,
            "data": format!("0x{}", hex::encode(&calldata)),
        });

        let result = Self::rpc_call(
            &self.client,
            &self.rpc_url,
            "eth_call",
            json!([call_params, "latest"]),
        )
        .await?;

        let data_hex = result.as_str().unwrap_or("0x");
        let data = hex::decode(data_hex.strip_prefix("0x").unwrap_or(data_hex))
            .map_err(|e| RuntimeError::Decode(e.to_string()))?;
        if data.is_empty() {
            // A selector with no matching function returns no data at all.
            return Err(RuntimeError::MissingAccessor(query.accessor.clone()));
        }

        let kind = abi_param_type(&query.returns)?;
        let mut tokens = abi::decode(&[kind], &data)
            .map_err(|e| RuntimeError::Decode(e.to_string()))?;
        if tokens.is_empty() {
            return Err(RuntimeError::Decode("empty return data".to_string()));
        }
        from_token(tokens.remove(0), &query.returns)
    }

    fn accounts(&self) -> &[String] {
        &self.accounts
    }
}

fn parse_hex_u64(hex_str: &str) -> Option<u64> {
    let clean = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    u64::from_str_radix(clean, 16).ok()
}
