//! Derives content addressed storage paths from the hashes
//! embedded into the deployed bytecode auxiliary data.

use crate::bytecode::{auxdata, AuxData};

/// Length of the hash digest stored by swarm keys.
const SWARM_HASH_LENGTH: usize = 32;

/// Returns the path the verified metadata should be stored under,
/// or [`None`] if the bytecode contains no recognized content hash.
pub fn derive_storage_path(deployed_runtime: &[u8]) -> Option<String> {
    let (_, auxdata) = auxdata::split(deployed_runtime)?;
    storage_path(&auxdata)
}

fn storage_path(auxdata: &AuxData) -> Option<String> {
    if let Some(hash) = auxdata.bzzr0.as_deref().and_then(swarm_hash) {
        return Some(format!("/swarm/bzzr0/{hash}"));
    }
    if let Some(hash) = auxdata.bzzr1.as_deref().and_then(swarm_hash) {
        return Some(format!("/swarm/bzzr1/{hash}"));
    }
    if let Some(multihash) = auxdata.ipfs.as_deref().and_then(ipfs_multihash) {
        return Some(format!("/ipfs/{multihash}"));
    }
    None
}

fn swarm_hash(hash: &[u8]) -> Option<String> {
    (hash.len() == SWARM_HASH_LENGTH).then(|| hex::encode(hash))
}

/// The value stored under the "ipfs" key is a raw multihash:
/// hash function code, digest length, and the digest itself.
fn ipfs_multihash(multihash: &[u8]) -> Option<String> {
    match multihash {
        [_code, length, digest @ ..] if *length as usize == digest.len() && !digest.is_empty() => {
            Some(bs58::encode(multihash).into_string())
        }
        _ => None,
    }
}
