use compact_str::{CompactString, ToCompactString};
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

use crate::config::ConfigurationError;

/// Cryptocurrency code an invoice settles in (`BTC`, `USDT-TRC20`, ...).
///
/// Always stored trimmed and uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CryptoCode(CompactString);

impl CryptoCode {
    /// Bitcoin, the fallback when the host offers nothing else.
    pub fn btc() -> Self {
        Self(CompactString::new("BTC"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CryptoCode {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ConfigurationError::EmptyCrypto);
        }
        Ok(Self(trimmed.to_uppercase().to_compact_string()))
    }
}

impl<'de> Deserialize<'de> for CryptoCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = CompactString::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for CryptoCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-issued invoice identifier.
///
/// The API returns integer ids while the demo service issues strings, so
/// both are accepted and kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct InvoiceId(CompactString);

impl InvoiceId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().to_compact_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawInvoiceId {
    Number(u64),
    Text(CompactString),
}

impl<'de> Deserialize<'de> for InvoiceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawInvoiceId::deserialize(deserializer)? {
            RawInvoiceId::Number(n) => Ok(Self(n.to_compact_string())),
            RawInvoiceId::Text(s) if s.trim().is_empty() => {
                Err(serde::de::Error::custom("empty invoice id"))
            }
            RawInvoiceId::Text(s) => Ok(Self(s)),
        }
    }
}

impl std::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
