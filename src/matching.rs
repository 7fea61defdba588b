use crate::{
    bytecode,
    chains::Chain,
    creation_data::CreationDataResolver,
    logger::{LogContext, RequestLogger},
    types::{MatchResult, MatchStatus},
};
use bytes::Bytes;
use ethers::{types::Address, utils::to_checksum};

/// State of the code deployed at a candidate address.
enum Deployed {
    Unavailable,
    Empty,
    Code(Bytes),
}

/// Result of the candidates resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CandidateMatch {
    pub result: MatchResult,
    /// Code deployed at the resulting address, if it was available.
    pub deployed_bytecode: Option<Bytes>,
}

/// Finds the first candidate address whose deployed bytecode matches the compiled one.
///
/// Candidates are tried sequentially in the given order. If none of them matches,
/// the result carries a diagnostic message only when exactly one candidate was supplied.
pub async fn resolve_match(
    chain: &Chain,
    addresses: &[Address],
    compiled_runtime: &Bytes,
    compiled_creation: &Bytes,
    resolver: &CreationDataResolver,
    logger: &RequestLogger,
) -> CandidateMatch {
    let mut result = MatchResult::none("");
    let mut deployed_bytecode = None;

    for &address in addresses {
        let checksummed = to_checksum(&address, None);
        let deployed = match chain.get_bytecode(address, logger).await {
            Ok(code) if code.is_empty() => Deployed::Empty,
            Ok(code) => Deployed::Code(code),
            Err(_) => Deployed::Unavailable,
        };
        deployed_bytecode = match &deployed {
            Deployed::Code(code) => Some(code.clone()),
            _ => None,
        };

        let comparison = bytecode::compare(
            deployed_bytecode.as_ref(),
            None,
            compiled_runtime,
            compiled_creation,
            || resolver.resolve_creation_data(chain, address, logger),
        )
        .await;

        result = MatchResult {
            address: checksummed.clone(),
            status: comparison.status,
            constructor_arguments: comparison.constructor_arguments.map(Into::into),
            message: None,
        };
        if comparison.status.is_match() {
            logger.info(
                "resolve_match",
                LogContext::new().chain(&chain.id).address(&checksummed),
                format!("{:?} match found", comparison.status),
            );
            return CandidateMatch {
                result,
                deployed_bytecode,
            };
        }

        if addresses.len() == 1 {
            let message = match deployed {
                Deployed::Unavailable => format!(
                    "Cannot fetch bytecode for chain #{} and address {checksummed}",
                    chain.id
                ),
                Deployed::Empty => format!(
                    "Chain #{} does not have a contract deployed at {checksummed}",
                    chain.id
                ),
                Deployed::Code(_) => "The deployed and recompiled bytecode don't match".to_string(),
            };
            result.message = Some(message);
        }
    }

    debug_assert!(result.status == MatchStatus::None);
    CandidateMatch {
        result,
        deployed_bytecode,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::rpc::{FakeRpcClient, ADDRESS};
    use pretty_assertions::assert_eq;
    use std::{sync::Arc, time::Duration};

    const COMPILED_RUNTIME: &[u8] = &[0x60, 0x80, 0x60, 0x40, 0x52, 0x00];
    const COMPILED_CREATION: &[u8] = &[0x60, 0x80, 0x60, 0x40, 0x52, 0x34, 0x80, 0x15];

    fn other_address() -> Address {
        Address::repeat_byte(0x11)
    }

    fn chain(rpc: Vec<FakeRpcClient>) -> Chain {
        Chain::new(
            "1",
            rpc.into_iter()
                .map(|rpc| Arc::new(rpc) as Arc<dyn crate::rpc::RpcClient>)
                .collect(),
        )
    }

    async fn resolve(chain: &Chain, addresses: &[Address]) -> MatchResult {
        let resolver = CreationDataResolver::new(Duration::from_secs(1)).unwrap();
        resolve_match(
            chain,
            addresses,
            &Bytes::from_static(COMPILED_RUNTIME),
            &Bytes::from_static(COMPILED_CREATION),
            &resolver,
            &RequestLogger::new(),
        )
        .await
        .result
    }

    #[tokio::test]
    async fn single_matching_candidate() {
        let chain = chain(vec![
            FakeRpcClient::default().with_code(Bytes::from_static(COMPILED_RUNTIME))
        ]);

        let result = resolve(&chain, &[ADDRESS]).await;

        assert_eq!(
            MatchResult {
                address: "0x027f1fe8BbC2a7E9fE97868E82c6Ec6939086c52".into(),
                status: MatchStatus::Exact,
                constructor_arguments: None,
                message: None,
            },
            result
        );
    }

    #[tokio::test]
    async fn first_matching_candidate_wins() {
        let chain = chain(vec![
            FakeRpcClient::default().with_code(Bytes::from_static(COMPILED_RUNTIME))
        ]);
        let resolver = CreationDataResolver::new(Duration::from_secs(1)).unwrap();

        let candidate = resolve_match(
            &chain,
            &[other_address(), ADDRESS],
            &Bytes::from_static(COMPILED_RUNTIME),
            &Bytes::from_static(COMPILED_CREATION),
            &resolver,
            &RequestLogger::new(),
        )
        .await;

        // the first candidate already matches
        assert_eq!(
            "0x1111111111111111111111111111111111111111",
            candidate.result.address
        );
        assert_eq!(
            Some(Bytes::from_static(COMPILED_RUNTIME)),
            candidate.deployed_bytecode
        );
    }

    #[tokio::test]
    async fn empty_code_is_reported_for_single_candidate() {
        let chain = chain(vec![FakeRpcClient::default()]);

        let result = resolve(&chain, &[ADDRESS]).await;

        assert_eq!(MatchStatus::None, result.status);
        let message = result.message.expect("diagnostic expected");
        assert!(
            message.contains("does not have a contract deployed"),
            "unexpected message: {message}"
        );
    }

    #[tokio::test]
    async fn unavailable_code_is_reported_for_single_candidate() {
        let chain = chain(vec![FakeRpcClient::failing(), FakeRpcClient::failing()]);

        let result = resolve(&chain, &[ADDRESS]).await;

        assert_eq!(MatchStatus::None, result.status);
        let message = result.message.expect("diagnostic expected");
        assert!(
            message.starts_with("Cannot fetch bytecode"),
            "unexpected message: {message}"
        );
    }

    #[tokio::test]
    async fn failing_endpoint_falls_back_to_next_one() {
        let chain = chain(vec![
            FakeRpcClient::failing(),
            FakeRpcClient::default().with_code(Bytes::from_static(COMPILED_RUNTIME)),
        ]);

        let result = resolve(&chain, &[ADDRESS]).await;

        assert_eq!(MatchStatus::Exact, result.status);
    }

    #[tokio::test]
    async fn mismatch_is_reported_for_single_candidate() {
        let chain = chain(vec![
            FakeRpcClient::default().with_code(Bytes::from_static(&[0xfe]))
        ]);

        let result = resolve(&chain, &[ADDRESS]).await;

        assert_eq!(MatchStatus::None, result.status);
        assert_eq!(
            Some("The deployed and recompiled bytecode don't match"),
            result.message.as_deref()
        );
    }

    #[tokio::test]
    async fn multiple_candidates_are_not_diagnosed() {
        let chain = chain(vec![FakeRpcClient::default()]);

        let result = resolve(&chain, &[ADDRESS, other_address()]).await;

        assert_eq!(MatchStatus::None, result.status);
        assert_eq!(None, result.message);
    }
}
