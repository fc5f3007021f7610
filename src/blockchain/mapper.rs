//! Wire-to-domain normalization.
//!
//! # Responsibilities
//! - Rewrite every numeric wire field of blocks, uncles, transactions and
//!   receipts from hex to decimal, in place
//! - Merge a transaction with its receipt into a [`MixedTransaction`]
//! - Merge every transaction of a block with its receipt
//! - Classify a caller's "height or hash" block reference

use alloy::primitives::U256;

use crate::blockchain::confirmation::ReceiptFetcher;
use crate::blockchain::models::{
    Block, Header, MixedBlock, MixedTransaction, Receipt, Transaction, Uncle,
};
use crate::blockchain::quantity::{parse_quantity, to_domain_decimal, to_wire_hex};
use crate::blockchain::types::{BlockchainError, BlockchainResult};

/// Wei per whole native-currency unit.
const WEI_PER_UNIT: u64 = 1_000_000_000_000_000_000;

/// A record with numeric wire fields that can be rewritten to decimal.
///
/// Implementors list their numeric fields; containers override
/// [`Normalize::normalize`] to recurse into their children.
pub trait Normalize {
    /// Every numeric field of this record, named by its wire key.
    fn quantity_fields(&mut self) -> Vec<(&'static str, &mut String)>;

    /// Rewrite all numeric fields to base-10.
    fn normalize(&mut self) -> BlockchainResult<()> {
        normalize_fields(self.quantity_fields())
    }
}

fn normalize_fields(fields: Vec<(&'static str, &mut String)>) -> BlockchainResult<()> {
    for (field, value) in fields {
        let decimal = to_domain_decimal(value).map_err(|_| BlockchainError::MalformedQuantity {
            field,
            value: value.clone(),
        })?;
        *value = decimal;
    }
    Ok(())
}

impl Normalize for Header {
    fn quantity_fields(&mut self) -> Vec<(&'static str, &mut String)> {
        let mut fields = vec![
            ("gasLimit", &mut self.gas_limit),
            ("gasUsed", &mut self.gas_used),
            ("difficulty", &mut self.difficulty),
            ("nonce", &mut self.nonce),
            ("number", &mut self.number),
            ("timestamp", &mut self.time),
        ];
        if let Some(size) = self.size.as_mut() {
            fields.push(("size", size));
        }
        if let Some(total) = self.total_difficulty.as_mut() {
            fields.push(("totalDifficulty", total));
        }
        fields
    }
}

impl Normalize for Uncle {
    fn quantity_fields(&mut self) -> Vec<(&'static str, &mut String)> {
        match self {
            Uncle::Header(header) => header.quantity_fields(),
            Uncle::Hash(_) => Vec::new(),
        }
    }
}

impl Normalize for Transaction {
    fn quantity_fields(&mut self) -> Vec<(&'static str, &mut String)> {
        let mut fields = vec![
            ("nonce", &mut self.account_nonce),
            ("value", &mut self.amount),
            ("gas", &mut self.gas_limit),
            ("gasPrice", &mut self.price),
        ];
        if let Some(number) = self.block_number.as_mut() {
            fields.push(("blockNumber", number));
        }
        if let Some(index) = self.transaction_index.as_mut() {
            fields.push(("transactionIndex", index));
        }
        fields
    }
}

impl Normalize for MixedTransaction {
    // Status and cost are copied from an already normalized receipt.
    fn quantity_fields(&mut self) -> Vec<(&'static str, &mut String)> {
        self.tx.quantity_fields()
    }
}

impl Normalize for Receipt {
    fn quantity_fields(&mut self) -> Vec<(&'static str, &mut String)> {
        let mut fields = vec![
            ("blockNumber", &mut self.block_number),
            ("cumulativeGasUsed", &mut self.cumulative_gas_used),
            ("gasUsed", &mut self.gas_used),
            ("transactionIndex", &mut self.transaction_index),
        ];
        if let Some(status) = self.status.as_mut() {
            fields.push(("status", status));
        }
        fields
    }
}

impl<T: Normalize> Normalize for Block<T> {
    fn quantity_fields(&mut self) -> Vec<(&'static str, &mut String)> {
        self.header.quantity_fields()
    }

    fn normalize(&mut self) -> BlockchainResult<()> {
        self.header.normalize()?;
        for uncle in &mut self.uncles {
            uncle.normalize()?;
        }
        for tx in &mut self.transactions {
            tx.normalize()?;
        }
        Ok(())
    }
}

fn parse_decimal(input: &str) -> Option<U256> {
    if input.is_empty() || !input.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    U256::from_str_radix(input, 10).ok()
}

/// Format a wei amount in whole units, dropping trailing fractional zeros.
pub fn format_native_amount(wei: U256) -> String {
    let unit = U256::from(WEI_PER_UNIT);
    let whole = wei / unit;
    let frac = wei % unit;
    if frac.is_zero() {
        return whole.to_string();
    }
    let frac = format!("{:0>18}", frac.to_string());
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

/// Combine a wire-form transaction with its normalized receipt.
///
/// `tx.price` must still be hex; `receipt.gas_used` must already be decimal.
pub fn merge_transaction_receipt(
    tx: Transaction,
    receipt: &Receipt,
) -> BlockchainResult<MixedTransaction> {
    let price = parse_quantity(&tx.price).map_err(|_| BlockchainError::MalformedQuantity {
        field: "gasPrice",
        value: tx.price.clone(),
    })?;
    let gas_used = parse_decimal(&receipt.gas_used).ok_or_else(|| BlockchainError::MalformedQuantity {
        field: "gasUsed",
        value: receipt.gas_used.clone(),
    })?;
    let fee = price.checked_mul(gas_used).ok_or_else(|| BlockchainError::MalformedQuantity {
        field: "gasPrice",
        value: tx.price.clone(),
    })?;

    Ok(MixedTransaction {
        tx,
        status: receipt.recorded_status()?.to_string(),
        contract_address: receipt.contract_address.clone(),
        cost: format_native_amount(fee),
    })
}

/// Merge every transaction of a wire-form block with its receipt.
///
/// Stops at the first fetch or merge failure; no partial block is returned.
/// The result is still in wire form apart from the receipt-derived fields.
pub async fn merge_block<F>(block: Block, fetcher: &F) -> BlockchainResult<MixedBlock>
where
    F: ReceiptFetcher + ?Sized,
{
    let mut transactions = Vec::with_capacity(block.transactions.len());
    for tx in block.transactions {
        let mut receipt = fetcher
            .fetch_receipt(&tx.hash)
            .await?
            .ok_or_else(|| BlockchainError::NotFound(format!("receipt for transaction {}", tx.hash)))?;
        receipt.normalize()?;
        transactions.push(merge_transaction_receipt(tx, &receipt)?);
    }

    Ok(Block {
        header: block.header,
        transactions,
        uncles: block.uncles,
    })
}

/// How a caller identified a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockRef {
    /// Height, already converted to wire hex.
    Number(String),
    /// Block hash, passed through unchanged.
    Hash(String),
    /// `latest`, `earliest` or `pending`.
    Tag(&'static str),
}

impl BlockRef {
    /// Classify a height or hash string.
    ///
    /// No `0x` means a decimal height; exactly one means a hash; more is rejected.
    pub fn parse(input: &str) -> BlockchainResult<Self> {
        for tag in ["latest", "earliest", "pending"] {
            if input == tag {
                return Ok(BlockRef::Tag(tag));
            }
        }
        match input.matches("0x").count() {
            0 => Ok(BlockRef::Number(to_wire_hex(input)?)),
            1 => Ok(BlockRef::Hash(input.to_string())),
            _ => Err(BlockchainError::InvalidInput(format!(
                "'{}' is neither a block height nor a block hash",
                input
            ))),
        }
    }

    /// RPC method that looks this reference up.
    pub fn rpc_method(&self) -> &'static str {
        match self {
            BlockRef::Hash(_) => "eth_getBlockByHash",
            BlockRef::Number(_) | BlockRef::Tag(_) => "eth_getBlockByNumber",
        }
    }

    /// First RPC parameter for [`BlockRef::rpc_method`].
    pub fn rpc_arg(&self) -> &str {
        match self {
            BlockRef::Number(hex) => hex,
            BlockRef::Hash(hash) => hash,
            BlockRef::Tag(tag) => tag,
        }
    }
}
