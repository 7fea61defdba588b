use blockscout_display_bytes::Bytes as DisplayBytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification produced by comparing on-chain and locally compiled bytecode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Exact,
    Partial,
    None,
}

impl MatchStatus {
    pub fn is_match(&self) -> bool {
        !matches!(self, MatchStatus::None)
    }

    /// `None` has no quality tier, as nothing is stored for it.
    pub fn quality(&self) -> Option<MatchQuality> {
        match self {
            MatchStatus::Exact => Some(MatchQuality::Full),
            MatchStatus::Partial => Some(MatchQuality::Partial),
            MatchStatus::None => None,
        }
    }
}

/// Persisted confidence tier of a verified contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchQuality {
    Full,
    Partial,
}

impl MatchQuality {
    /// Name of the repository directory the quality tier is stored under.
    pub fn directory(&self) -> &'static str {
        match self {
            MatchQuality::Full => "full_match",
            MatchQuality::Partial => "partial_match",
        }
    }
}

impl fmt::Display for MatchQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchQuality::Full => f.write_str("full"),
            MatchQuality::Partial => f.write_str("partial"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub address: String,
    pub status: MatchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constructor_arguments: Option<DisplayBytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl MatchResult {
    pub fn none(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            status: MatchStatus::None,
            constructor_arguments: None,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Routes persisted bytes of one verified contract.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StorageTarget {
    pub chain: String,
    pub address: String,
    pub quality: MatchQuality,
    pub file_name: String,
}

impl StorageTarget {
    pub fn new(
        chain: impl Into<String>,
        address: impl Into<String>,
        quality: MatchQuality,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            chain: chain.into(),
            address: address.into(),
            quality,
            file_name: file_name.into(),
        }
    }
}
