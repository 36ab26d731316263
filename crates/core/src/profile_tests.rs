// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn fresh_window_has_zero_utilization_and_no_alert() {
    let w = RateLimitWindow::fresh();
    assert_eq!(w.utilization, 0.0);
    assert!(w.resets_at.is_none());
    assert!(!w.alerted_95);
}

#[test]
fn rate_limit_type_known_variants_as_str() {
    assert_eq!(RateLimitType::FiveHour.as_str(), "five_hour");
    assert_eq!(RateLimitType::SevenDay.as_str(), "seven_day");
}

#[test]
fn rate_limit_type_from_str_recognizes_known_kinds() {
    assert_eq!(RateLimitType::from_str("five_hour"), RateLimitType::FiveHour);
    assert_eq!(RateLimitType::from_str("seven_day"), RateLimitType::SevenDay);
}

#[test]
fn rate_limit_type_from_str_preserves_unknown_kinds() {
    let parsed = RateLimitType::from_str("opus_weekly");
    assert_eq!(parsed.as_str(), "opus_weekly");
    assert_eq!(parsed, RateLimitType::Other("opus_weekly".to_string()));
}

#[test]
fn profile_metadata_serializes_without_expires_at_when_absent() {
    let meta = ProfileMetadata {
        name: "work".to_string(),
        is_active: true,
        saved_at: 1_700_000_000.0,
        subscription_type: "max".to_string(),
        rate_limit_tier: "tier1".to_string(),
        expires_at: None,
    };
    let json = serde_json::to_string(&meta).unwrap();
    assert!(!json.contains("expires_at"));
    assert!(json.contains("\"name\":\"work\""));
}

#[test]
fn rate_limit_window_roundtrips_with_resets_at() {
    let w = RateLimitWindow {
        utilization: 0.97,
        resets_at: Some(chrono::DateTime::parse_from_rfc3339("2026-07-28T12:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc)),
        alerted_95: true,
    };
    let json = serde_json::to_string(&w).unwrap();
    let parsed: RateLimitWindow = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.utilization, 0.97);
    assert!(parsed.alerted_95);
    assert!(parsed.resets_at.is_some());
}
