//! SDK credential types
//!
//! Three kinds of credential identify an environment on inbound requests:
//! server-side SDK keys, mobile keys, and environment IDs. SDK and mobile
//! keys are secrets; their `Display` and `Debug` output is masked so they
//! cannot leak through logs or error messages. Environment IDs are public.

use std::fmt;

use serde::Deserialize;

/// Masks a secret, keeping only the last four characters
fn masked(s: &str) -> String {
    if s.len() <= 4 {
        "****".into()
    } else {
        format!("****{}", &s[s.len() - 4..])
    }
}

/// Server-side SDK key (secret)
#[derive(Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(transparent)]
pub struct SdkKey(String);

impl SdkKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key, for outbound Authorization headers only
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SdkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&masked(&self.0))
    }
}

impl fmt::Debug for SdkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SdkKey({})", masked(&self.0))
    }
}

/// Mobile SDK key (secret)
#[derive(Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(transparent)]
pub struct MobileKey(String);

impl MobileKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key, for outbound Authorization headers only
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for MobileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&masked(&self.0))
    }
}

impl fmt::Debug for MobileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MobileKey({})", masked(&self.0))
    }
}

/// Environment ID used by browser SDKs (public)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentId(String);

impl EnvironmentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for EnvironmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Any credential that can identify an environment on an inbound request
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Credential {
    SdkKey(SdkKey),
    MobileKey(MobileKey),
    EnvironmentId(EnvironmentId),
}

impl From<SdkKey> for Credential {
    fn from(k: SdkKey) -> Self {
        Credential::SdkKey(k)
    }
}

impl From<MobileKey> for Credential {
    fn from(k: MobileKey) -> Self {
        Credential::MobileKey(k)
    }
}

impl From<EnvironmentId> for Credential {
    fn from(id: EnvironmentId) -> Self {
        Credential::EnvironmentId(id)
    }
}

#[cfg(test)]
#[path = "credentials_test.rs"]
mod tests;
