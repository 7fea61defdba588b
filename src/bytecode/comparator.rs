use super::auxdata;
use crate::{creation_data::ResolveError, types::MatchStatus};
use bytes::Bytes;
use std::future::Future;

/// Outcome of a single comparison of on-chain and compiled bytecode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Comparison {
    pub status: MatchStatus,
    /// Only set for exact matches obtained through creation data comparison.
    pub constructor_arguments: Option<Bytes>,
}

impl Comparison {
    fn new(status: MatchStatus) -> Self {
        Self {
            status,
            constructor_arguments: None,
        }
    }
}

/// Compares deployed bytecode with the result of local compilation.
///
/// The cheaper runtime code comparisons are performed first. Creation data is
/// requested through `fetch_creation_data` only if it was not supplied and the
/// trimmed runtime codes have the same length, i.e. when the programs may
/// differ only in their auxiliary data or immutable values.
///
/// A failure to fetch creation data results in [`MatchStatus::None`].
pub async fn compare<F, Fut>(
    deployed_runtime: Option<&Bytes>,
    creation_data: Option<Bytes>,
    compiled_runtime: &Bytes,
    compiled_creation: &Bytes,
    fetch_creation_data: F,
) -> Comparison
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Bytes, ResolveError>>,
{
    let deployed_runtime = match deployed_runtime {
        Some(deployed_runtime) if !deployed_runtime.is_empty() => deployed_runtime,
        _ => return Comparison::new(MatchStatus::None),
    };

    if deployed_runtime == compiled_runtime {
        return Comparison::new(MatchStatus::Exact);
    }

    let trimmed_deployed = auxdata::trim(deployed_runtime);
    let trimmed_compiled = auxdata::trim(compiled_runtime);
    if trimmed_deployed == trimmed_compiled {
        return Comparison::new(MatchStatus::Partial);
    }

    if trimmed_deployed.len() != trimmed_compiled.len() {
        return Comparison::new(MatchStatus::None);
    }

    let creation_data = match creation_data {
        Some(creation_data) => creation_data,
        None => match fetch_creation_data().await {
            Ok(creation_data) => creation_data,
            Err(err) => {
                tracing::debug!(error = %err, "creation data is not available");
                return Comparison::new(MatchStatus::None);
            }
        },
    };

    compare_creation_data(&creation_data, compiled_creation)
}

fn compare_creation_data(creation_data: &Bytes, compiled_creation: &Bytes) -> Comparison {
    if compiled_creation.is_empty() {
        return Comparison::new(MatchStatus::None);
    }

    if creation_data.starts_with(compiled_creation) {
        let constructor_arguments = creation_data.slice(compiled_creation.len()..);
        return Comparison {
            status: MatchStatus::Exact,
            constructor_arguments: (!constructor_arguments.is_empty())
                .then_some(constructor_arguments),
        };
    }

    // Constructor arguments boundary is unknown once the trailer is removed,
    // so they are not extracted for partial matches.
    let trimmed_compiled_creation = auxdata::trim(compiled_creation);
    if creation_data.starts_with(trimmed_compiled_creation) {
        return Comparison::new(MatchStatus::Partial);
    }

    Comparison::new(MatchStatus::None)
}
