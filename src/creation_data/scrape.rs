use crate::chains::{Chain, ExplorerScrape};
use anyhow::{anyhow, Context};
use blockscout_display_bytes::Bytes as DisplayBytes;
use bytes::Bytes;
use ethers::types::H256;
use std::str::FromStr;

/// Extracts the creation data from the explorer page of the contract.
///
/// The first capture group of the pattern matches either the creation
/// transaction hash, in which case the input is fetched from the chain
/// nodes, or the creation transaction input itself.
pub(super) async fn fetch(
    client: &reqwest::Client,
    chain: &Chain,
    explorer: &ExplorerScrape,
    address: &str,
) -> anyhow::Result<Bytes> {
    let url = explorer.page_url(address);
    let page = client
        .get(&url)
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .with_context(|| format!("explorer page request failed: {url}"))?
        .text()
        .await
        .context("explorer page is not a valid text")?;

    let captured = explorer
        .creation_tx_pattern
        .captures(&page)
        .and_then(|captures| captures.get(1))
        .ok_or_else(|| anyhow!("creation transaction not found on the explorer page"))?
        .as_str();
    let value = DisplayBytes::from_str(captured)
        .with_context(|| format!("captured value is not a valid hex: {captured}"))?
        .0;

    if value.len() != H256::len_bytes() {
        return Ok(value);
    }

    let hash = H256::from_slice(&value);
    let mut last_error = None;
    for rpc in &chain.rpc {
        match rpc.transaction_input(hash).await {
            Ok(Some(input)) => return Ok(input),
            Ok(None) => {}
            Err(err) => last_error = Some(err),
        }
    }
    match last_error {
        Some(err) => Err(anyhow!(err).context(format!("failed to fetch transaction {hash:#x}"))),
        None => Err(anyhow!("transaction {hash:#x} not found")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::rpc::FakeRpcClient;
    use pretty_assertions::assert_eq;
    use regex::Regex;
    use std::sync::Arc;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    const ADDRESS: &str = "0x027f1fe8BbC2a7E9fE97868E82c6Ec6939086c52";
    const TX_HASH: &str = "0x4e6d2f3fe9cd2c10b3c5d2a6d2f6fbbd7c9e8e7b5c5f5e6d4b6a1c2d3e4f5a6b";

    async fn explorer_page(body: &str) -> (MockServer, ExplorerScrape) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/address/{ADDRESS}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;
        let explorer = ExplorerScrape {
            url_template: format!("{}/address/{{address}}", server.uri()),
            creation_tx_pattern: Regex::new("at txn <a href='/tx/(0x[0-9a-fA-F]+)'").unwrap(),
        };
        (server, explorer)
    }

    #[tokio::test]
    async fn captured_transaction_hash_is_resolved_via_rpc() {
        let (_server, explorer) =
            explorer_page(&format!("created at txn <a href='/tx/{TX_HASH}'>")).await;
        let input = Bytes::from_static(&[0x60, 0x80, 0x60, 0x40, 0x52]);
        let hash = H256::from_str(TX_HASH).unwrap();
        let rpc = FakeRpcClient::default().with_transaction(hash, input.clone());
        let chain = Chain::new("1", vec![Arc::new(FakeRpcClient::failing()), Arc::new(rpc)]);

        let creation_data = fetch(&reqwest::Client::new(), &chain, &explorer, ADDRESS)
            .await
            .expect("creation data should be found");

        assert_eq!(input, creation_data);
    }

    #[tokio::test]
    async fn captured_input_is_returned_directly() {
        let (_server, explorer) = explorer_page("created at txn <a href='/tx/0x6080604052'>").await;
        let chain = Chain::new("1", vec![]);

        let creation_data = fetch(&reqwest::Client::new(), &chain, &explorer, ADDRESS)
            .await
            .expect("creation data should be found");

        assert_eq!(
            Bytes::from_static(&[0x60, 0x80, 0x60, 0x40, 0x52]),
            creation_data
        );
    }

    #[tokio::test]
    async fn unknown_transaction_fails() {
        let (_server, explorer) =
            explorer_page(&format!("created at txn <a href='/tx/{TX_HASH}'>")).await;
        let chain = Chain::new("1", vec![Arc::new(FakeRpcClient::default())]);

        let error = fetch(&reqwest::Client::new(), &chain, &explorer, ADDRESS)
            .await
            .expect_err("transaction should not be found");

        assert!(
            error.to_string().contains("not found"),
            "unexpected error: {error:#}"
        );
    }

    #[tokio::test]
    async fn page_without_match_fails() {
        let (_server, explorer) = explorer_page("<html>nothing</html>").await;
        let chain = Chain::new("1", vec![]);

        fetch(&reqwest::Client::new(), &chain, &explorer, ADDRESS)
            .await
            .expect_err("pattern should not match");
    }
}
