use async_trait::async_trait;
use bytes::Bytes;
use ethers::{
    providers::{Http, Middleware, Provider, ProviderError},
    types::{Address, BlockId, BlockNumber, H256},
    utils::{get_contract_address, to_checksum},
};
use std::{future::Future, str::FromStr, time::Duration};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("request to {endpoint} timed out after {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },
    #[error("request to {endpoint} failed: {source}")]
    Provider {
        endpoint: String,
        #[source]
        source: ProviderError,
    },
    #[error("no rpc endpoints configured")]
    NoEndpoints,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid address: {0}")]
pub struct InvalidAddress(pub String);

/// Node operations required by verification.
#[async_trait]
pub trait RpcClient: Send + Sync {
    /// Identifies the endpoint in logs and errors.
    fn endpoint(&self) -> &str;

    /// Returns the code stored at `address`, or empty bytes if nothing is deployed.
    /// The latest block is used if `block` is not specified.
    async fn get_code(&self, address: Address, block: Option<u64>) -> Result<Bytes, RpcError>;

    async fn block_number(&self) -> Result<u64, RpcError>;

    async fn transaction_input(&self, hash: H256) -> Result<Option<Bytes>, RpcError>;

    /// Looks for the transaction in `block` which deployed a contract at `address`.
    async fn creation_transaction_input(
        &self,
        block: u64,
        address: Address,
    ) -> Result<Option<Bytes>, RpcError>;
}

/// Verifies the endpoint responds to requests.
pub async fn health_check(client: &dyn RpcClient) -> Result<(), RpcError> {
    client.block_number().await.map(|_| ())
}

pub fn parse_address(address: &str) -> Result<Address, InvalidAddress> {
    let address = address.trim();
    let hex = address.strip_prefix("0x").unwrap_or(address);
    if hex.len() != 40 {
        return Err(InvalidAddress(address.to_string()));
    }
    Address::from_str(hex).map_err(|_| InvalidAddress(address.to_string()))
}

/// Normalizes the address into its EIP-55 checksummed form.
pub fn checksum_address(address: &str) -> Result<String, InvalidAddress> {
    parse_address(address).map(|address| to_checksum(&address, None))
}

/// [`RpcClient`] implementation over JSON-RPC http transport.
pub struct EthRpcClient {
    endpoint: String,
    provider: Provider<Http>,
    timeout: Duration,
}

impl EthRpcClient {
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let provider = Provider::<Http>::try_from(endpoint)
            .map_err(|err| anyhow::anyhow!("invalid rpc url {endpoint}: {err}"))?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            provider,
            timeout,
        })
    }

    async fn call<T, F>(&self, request: F) -> Result<T, RpcError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| RpcError::Timeout {
                endpoint: self.endpoint.clone(),
                timeout: self.timeout,
            })?
            .map_err(|source| RpcError::Provider {
                endpoint: self.endpoint.clone(),
                source,
            })
    }
}

#[async_trait]
impl RpcClient for EthRpcClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn get_code(&self, address: Address, block: Option<u64>) -> Result<Bytes, RpcError> {
        let block = block.map(|number| BlockId::Number(BlockNumber::Number(number.into())));
        let code = self.call(self.provider.get_code(address, block)).await?;
        Ok(code.0)
    }

    async fn block_number(&self) -> Result<u64, RpcError> {
        let number = self.call(self.provider.get_block_number()).await?;
        Ok(number.as_u64())
    }

    async fn transaction_input(&self, hash: H256) -> Result<Option<Bytes>, RpcError> {
        let transaction = self.call(self.provider.get_transaction(hash)).await?;
        Ok(transaction.map(|transaction| transaction.input.0))
    }

    async fn creation_transaction_input(
        &self,
        block: u64,
        address: Address,
    ) -> Result<Option<Bytes>, RpcError> {
        let block = self
            .call(
                self.provider
                    .get_block_with_txs(BlockNumber::Number(block.into())),
            )
            .await?;
        let input = block.and_then(|block| {
            block
                .transactions
                .into_iter()
                .find(|transaction| {
                    transaction.to.is_none()
                        && get_contract_address(transaction.from, transaction.nonce) == address
                })
                .map(|transaction| transaction.input.0)
        });
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::{
        matchers::{body_partial_json, method},
        Mock, MockServer, ResponseTemplate,
    };

    #[test]
    fn checksum_normalizes_address() {
        assert_eq!(
            "0x027f1fe8BbC2a7E9fE97868E82c6Ec6939086c52",
            checksum_address("0x027f1fe8bbc2a7e9fe97868e82c6ec6939086c52").unwrap()
        );
        assert_eq!(
            "0x027f1fe8BbC2a7E9fE97868E82c6Ec6939086c52",
            checksum_address("027F1FE8BBC2A7E9FE97868E82C6EC6939086C52").unwrap()
        );
    }

    #[test]
    fn invalid_addresses_are_rejected() {
        for address in [
            "",
            "0x",
            "0xcafecafecafecafe",
            "0xzz7f1fe8bbc2a7e9fe97868e82c6ec6939086c52",
        ] {
            checksum_address(address).expect_err("address should be invalid");
        }
    }

    async fn mock_rpc(method_name: &str, result: serde_json::Value) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": method_name })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": result,
            })))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn get_code_returns_deployed_bytes() {
        let server = mock_rpc("eth_getCode", json!("0x6080604052")).await;
        let client = EthRpcClient::new(&server.uri(), Duration::from_secs(5)).unwrap();

        let code = client
            .get_code(Address::repeat_byte(0x11), None)
            .await
            .expect("request should succeed");
        assert_eq!(Bytes::from_static(&[0x60, 0x80, 0x60, 0x40, 0x52]), code);
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": "0x1"}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;
        let client = EthRpcClient::new(&server.uri(), Duration::from_millis(100)).unwrap();

        let error = health_check(&client).await.expect_err("should time out");
        assert!(
            matches!(error, RpcError::Timeout { .. }),
            "expected: 'Timeout', got: {error:?}"
        );
    }
}
