// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential profile metadata and rate-limit state shapes (§3, §4.B, §4.C).

use serde::{Deserialize, Serialize};

/// Metadata surfaced by `list_profiles()`, extracted from each profile's
/// stored OAuth blob plus store-level bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileMetadata {
    pub name: String,
    pub is_active: bool,
    /// Unix seconds; mtime of the profile file.
    pub saved_at: f64,
    pub subscription_type: String,
    pub rate_limit_tier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

/// Known rate-limit window kinds. Unknown types round-trip as `Other`.
///
/// Serializes as a bare string (not an externally-tagged enum) so that
/// `RateLimitType::Other("opus_weekly")` round-trips as `"opus_weekly"`
/// rather than `{"Other": "opus_weekly"}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RateLimitType {
    FiveHour,
    SevenDay,
    Other(String),
}

impl RateLimitType {
    pub fn as_str(&self) -> &str {
        match self {
            RateLimitType::FiveHour => "five_hour",
            RateLimitType::SevenDay => "seven_day",
            RateLimitType::Other(s) => s,
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "five_hour" => RateLimitType::FiveHour,
            "seven_day" => RateLimitType::SevenDay,
            other => RateLimitType::Other(other.to_string()),
        }
    }
}

impl Serialize for RateLimitType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RateLimitType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(RateLimitType::from_str(&s))
    }
}

/// Per-`(profile, limit_type)` state, persisted as a JSON map (§3, §4.C).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitWindow {
    /// `"unknown"` is only surfaced by the query layer for profiles with no
    /// record at all; a real window always stores a numeric value here.
    pub utilization: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resets_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub alerted_95: bool,
}

impl RateLimitWindow {
    pub fn fresh() -> Self {
        Self {
            utilization: 0.0,
            resets_at: None,
            alerted_95: false,
        }
    }
}

#[cfg(test)]
#[path = "profile_tests.rs"]
mod tests;
