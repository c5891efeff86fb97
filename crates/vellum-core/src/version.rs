//! Protocol version gating

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{InvalidArgument, VellumError};

/// Version of the interoperability protocol the repository speaks.
///
/// Secondary types and type mutability only exist from 1.1 on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum ProtocolVersion {
    /// Protocol 1.0
    #[serde(rename = "1.0")]
    V1_0,
    /// Protocol 1.1
    #[default]
    #[serde(rename = "1.1")]
    V1_1,
}

impl ProtocolVersion {
    /// Whether types may be created, updated and deleted at runtime
    pub fn supports_type_mutability(self) -> bool {
        self >= Self::V1_1
    }

    /// Whether secondary types exist
    pub fn supports_secondary_types(self) -> bool {
        self >= Self::V1_1
    }

    /// Wire representation
    pub fn as_str(self) -> &'static str {
        match self {
            Self::V1_0 => "1.0",
            Self::V1_1 => "1.1",
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolVersion {
    type Err = VellumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1.0" => Ok(Self::V1_0),
            "1.1" => Ok(Self::V1_1),
            other => Err(VellumError::invalid(InvalidArgument::Other {
                message: format!("unsupported protocol version '{other}'"),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_gates() {
        assert!(!ProtocolVersion::V1_0.supports_type_mutability());
        assert!(ProtocolVersion::V1_1.supports_secondary_types());
        assert_eq!("1.0".parse::<ProtocolVersion>().unwrap(), ProtocolVersion::V1_0);
        assert!("2.0".parse::<ProtocolVersion>().is_err());
    }
}
