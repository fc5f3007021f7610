//! Contract invocation and queries through a JSON ABI.

use alloy::dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt};
use alloy::json_abi::{Function, JsonAbi};
use alloy::network::TransactionBuilder;
use alloy::primitives::{Bytes, TxHash, U256};
use alloy::rpc::types::TransactionRequest;

use crate::blockchain::client::parse_address;
use crate::blockchain::transaction::{TransactionIntent, TxPipeline};
use crate::blockchain::types::{BlockchainError, BlockchainResult, INVOKE_CONTRACT_OP};

fn parse_abi(abi_json: &str) -> BlockchainResult<JsonAbi> {
    serde_json::from_str(abi_json).map_err(|e| BlockchainError::InvalidInput(format!("invalid ABI: {}", e)))
}

/// The overload of `method` taking `arity` arguments.
fn find_function<'a>(abi: &'a JsonAbi, method: &str, arity: usize) -> BlockchainResult<&'a Function> {
    abi.function(method)
        .and_then(|overloads| overloads.iter().find(|f| f.inputs.len() == arity))
        .ok_or_else(|| {
            BlockchainError::InvalidInput(format!("ABI has no function {} taking {} arguments", method, arity))
        })
}

/// Selector followed by the ABI-encoded arguments.
pub fn encode_call(abi_json: &str, method: &str, args: &[DynSolValue]) -> BlockchainResult<Bytes> {
    let abi = parse_abi(abi_json)?;
    let function = find_function(&abi, method, args.len())?;
    let data = function
        .abi_encode_input(args)
        .map_err(|e| BlockchainError::InvalidInput(format!("cannot encode {} arguments: {}", method, e)))?;
    Ok(data.into())
}

impl TxPipeline {
    /// Send a zero-value call to `method` on the contract at `address`.
    pub async fn invoke_contract(
        &self,
        address: &str,
        abi_json: &str,
        nonce: u64,
        method: &str,
        args: &[DynSolValue],
    ) -> BlockchainResult<TxHash> {
        let invoke = async {
            let to = parse_address(address)?;
            let data = encode_call(abi_json, method, args)?;
            self.send(TransactionIntent::contract_call(nonce, to, U256::ZERO, data))
                .await
        };
        invoke.await.map_err(|e| e.in_operation(INVOKE_CONTRACT_OP))
    }

    /// Call `method` against the latest state and decode its outputs.
    pub async fn query_contract(
        &self,
        address: &str,
        abi_json: &str,
        method: &str,
        args: &[DynSolValue],
    ) -> BlockchainResult<Vec<DynSolValue>> {
        let to = parse_address(address)?;
        let abi = parse_abi(abi_json)?;
        let function = find_function(&abi, method, args.len())?;
        let data = function
            .abi_encode_input(args)
            .map_err(|e| BlockchainError::InvalidInput(format!("cannot encode {} arguments: {}", method, e)))?;

        let request = TransactionRequest::default().with_to(to).with_input(data);
        let output = self.client().eth_call(&request).await?;

        function.abi_decode_output(&output).map_err(|e| BlockchainError::Decode {
            method: method.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;

    const ERC20_SUBSET: &str = r#"[
        {"type":"function","name":"transfer","stateMutability":"nonpayable",
         "inputs":[{"name":"to","type":"address"},{"name":"amount","type":"uint256"}],
         "outputs":[{"name":"","type":"bool"}]},
        {"type":"function","name":"balanceOf","stateMutability":"view",
         "inputs":[{"name":"owner","type":"address"}],
         "outputs":[{"name":"","type":"uint256"}]}
    ]"#;

    #[test]
    fn test_encode_call_prefixes_selector() {
        let data = encode_call(
            ERC20_SUBSET,
            "transfer",
            &[DynSolValue::Address(Address::ZERO), DynSolValue::Uint(U256::from(1), 256)],
        )
        .unwrap();
        // transfer(address,uint256)
        assert_eq!(&data[..4], &[0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(data.len(), 4 + 64);
    }

    #[test]
    fn test_unknown_method_or_arity() {
        assert!(matches!(
            encode_call(ERC20_SUBSET, "mint", &[]),
            Err(BlockchainError::InvalidInput(_))
        ));
        assert!(matches!(
            encode_call(ERC20_SUBSET, "balanceOf", &[]),
            Err(BlockchainError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_invalid_abi() {
        assert!(matches!(
            encode_call("{not json", "transfer", &[]),
            Err(BlockchainError::InvalidInput(_))
        ));
    }
}
