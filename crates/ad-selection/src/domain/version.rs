//! Bidding logic protocol versions. The device asks for the newest version it
//! supports and the buyer's server answers with the version it actually
//! served.

use thiserror::Error;

/// Highest version that uses the legacy single-ad-list calling convention.
/// Requests for it carry no version header.
pub const LEGACY_VERSION: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptVersion {
    /// `generateBid` is called per ad with the ads listed explicitly.
    Legacy,
    /// `generateBids` is called once with the whole group.
    Versioned(u64),
}

impl ScriptVersion {
    pub fn from_number(version: u64) -> Self {
        if version <= LEGACY_VERSION {
            Self::Legacy
        } else {
            Self::Versioned(version)
        }
    }

    pub fn number(self) -> u64 {
        match self {
            Self::Legacy => LEGACY_VERSION,
            Self::Versioned(version) => version,
        }
    }

    /// Resolves the version of a fetched script. A response without a version
    /// is treated as legacy.
    pub fn negotiate(requested: u64, served: Option<u64>) -> Result<Self, TooHighVersion> {
        match served {
            None => Ok(Self::Legacy),
            Some(served) if served > requested => Err(TooHighVersion { requested, served }),
            Some(served) => Ok(Self::from_number(served)),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("server returned bidding logic version {served}, requested at most {requested}")]
pub struct TooHighVersion {
    pub requested: u64,
    pub served: u64,
}
