use std::time::Duration;

use alloy_primitives::{Address, B256, U64, U128};
use reqwest::{Client, Url};
use serde::Deserialize;

use crate::error::ClientError;

/// Minimal execution-layer JSON-RPC client. The only call the pipeline needs
/// is `eth_getBlockReceipts`, which carries every receipt-derived field the
/// transaction rows are enriched with.
pub struct ExecutionClient {
    client: Client,
    endpoint: Url,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub transaction_hash: B256,
    pub transaction_index: U64,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub contract_address: Option<Address>,
    pub effective_gas_price: U128,
    pub gas_used: U64,
    #[serde(default)]
    pub status: Option<U64>,
}

impl ExecutionClient {
    pub fn new(endpoint: Url, request_timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            client: Client::builder().timeout(request_timeout).build()?,
            endpoint,
        })
    }

    /// Receipts for every transaction of the execution block `block_hash`.
    pub async fn block_receipts(&self, block_hash: B256) -> Result<Vec<TxReceipt>, ClientError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_getBlockReceipts",
            "params": [format!("{block_hash}")],
        });

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::RequestFailed {
                endpoint: "eth_getBlockReceipts".to_string(),
                status,
            });
        }

        let parsed: JsonRpcResponse<Vec<TxReceipt>> = response
            .json()
            .await
            .map_err(ClientError::Http)?;
        if let Some(error) = parsed.error {
            return Err(ClientError::Rpc(format!(
                "eth_getBlockReceipts failed with code {}: {}",
                error.code, error.message
            )));
        }
        Ok(parsed.result.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_decoding() {
        let json = serde_json::json!({
            "transactionHash": "0xa8ee3de535f01a6df2e117af8d7142ea811ffeeda3a1b4e604ad357db2924ec4",
            "transactionIndex": "0x0",
            "blockHash": "0xdbdb4d20266578de916de5b052f500c9d92633b7d9017e9193e4b4f90c086c89",
            "blockNumber": "0x109406b",
            "from": "0x6b333b20fbae3c5c0969dd02176e30802e2fbbdb",
            "to": null,
            "contractAddress": "0x1111111111111111111111111111111111111111",
            "effectiveGasPrice": "0x77359400",
            "gasUsed": "0x5208",
            "status": "0x1"
        });
        let receipt: TxReceipt = serde_json::from_value(json).unwrap();
        assert!(receipt.to.is_none());
        assert_eq!(receipt.gas_used, U64::from(21_000));
        assert_eq!(receipt.effective_gas_price, U128::from(2_000_000_000u64));
        assert!(receipt.contract_address.is_some());
    }
}
