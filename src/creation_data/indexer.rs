use anyhow::{anyhow, Context};
use blockscout_display_bytes::Bytes as DisplayBytes;
use bytes::Bytes;
use ethers::types::Address;
use serde::Deserialize;
use serde_json::json;
use url::Url;

#[derive(Debug, Deserialize)]
struct Response {
    data: Option<Data>,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Data {
    all_contracts: Contracts,
}

#[derive(Debug, Deserialize)]
struct Contracts {
    nodes: Vec<Contract>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Contract {
    transaction_by_creation_tx_hash: Option<Transaction>,
}

#[derive(Debug, Deserialize)]
struct Transaction {
    input: DisplayBytes,
}

fn query(address: Address) -> String {
    format!(
        r#"query {{ allContracts(filter: {{address: {{equalTo: "0x{}"}}}}, first: 1) {{ nodes {{ transactionByCreationTxHash {{ input }} }} }} }}"#,
        hex::encode(address.as_bytes())
    )
}

/// Queries the chain indexer for the input of the creation transaction.
pub(super) async fn fetch(
    client: &reqwest::Client,
    graphql_url: &Url,
    address: Address,
) -> anyhow::Result<Bytes> {
    let response: Response = client
        .post(graphql_url.clone())
        .json(&json!({ "query": query(address) }))
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .context("indexer request failed")?
        .json()
        .await
        .context("indexer response is not valid")?;

    if !response.errors.is_empty() {
        return Err(anyhow!(
            "indexer returned errors: {}",
            serde_json::Value::from(response.errors)
        ));
    }
    response
        .data
        .and_then(|data| data.all_contracts.nodes.into_iter().next())
        .and_then(|contract| contract.transaction_by_creation_tx_hash)
        .map(|transaction| transaction.input.0)
        .ok_or_else(|| anyhow!("contract is not known to the indexer"))
}
