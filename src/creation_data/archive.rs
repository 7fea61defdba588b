use crate::rpc::{RpcClient, RpcError};
use anyhow::{anyhow, bail, Context};
use bytes::Bytes;
use ethers::types::Address;

/// Locates the creation transaction using an archive node.
///
/// The deployment block is the earliest block at which the address has code.
/// Code is assumed to stay present once deployed.
pub(super) async fn fetch(rpc: &dyn RpcClient, address: Address) -> anyhow::Result<Bytes> {
    let latest = rpc
        .block_number()
        .await
        .context("failed to get the latest block")?;
    let code = rpc
        .get_code(address, Some(latest))
        .await
        .context("failed to get code at the latest block")?;
    if code.is_empty() {
        bail!("no code at the address in the latest block {latest}");
    }

    let block = deployment_block(rpc, address, latest)
        .await
        .context("failed to search for the deployment block")?;
    rpc.creation_transaction_input(block, address)
        .await
        .with_context(|| format!("failed to get block {block}"))?
        .ok_or_else(|| anyhow!("creation transaction not found in block {block}"))
}

async fn deployment_block(
    rpc: &dyn RpcClient,
    address: Address,
    latest: u64,
) -> Result<u64, RpcError> {
    let (mut low, mut high) = (0, latest);
    while low < high {
        let middle = low + (high - low) / 2;
        if rpc.get_code(address, Some(middle)).await?.is_empty() {
            low = middle + 1;
        } else {
            high = middle;
        }
    }
    Ok(low)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::rpc::{FakeRpcClient, ADDRESS};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(1_000_000, 0)]
    #[case(1_000_000, 1)]
    #[case(1_000_000, 345_678)]
    #[case(1_000_000, 1_000_000)]
    #[case(0, 0)]
    #[tokio::test]
    async fn finds_deployment_block(#[case] latest: u64, #[case] deployed_at: u64) {
        let rpc = FakeRpcClient::deployed(latest, deployed_at, Bytes::new());
        let block = deployment_block(&rpc, ADDRESS, latest).await.unwrap();
        assert_eq!(deployed_at, block);
    }

    #[tokio::test]
    async fn returns_creation_input() {
        let input = Bytes::from_static(&[0x60, 0x80, 0x60, 0x40]);
        let rpc = FakeRpcClient::deployed(5_000, 1_234, input.clone());

        let creation_data = fetch(&rpc, ADDRESS).await.expect("should be found");

        assert_eq!(input, creation_data);
        assert!(rpc.get_code_calls() <= 15, "binary search expected");
    }

    #[tokio::test]
    async fn address_without_code_fails() {
        let rpc = FakeRpcClient::default();
        let error = fetch(&rpc, ADDRESS).await.expect_err("should fail");
        assert!(error.to_string().contains("no code"), "unexpected: {error:#}");
    }
}
