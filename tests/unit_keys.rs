// Key codec tests — building storage keys and parsing state keys back.

use watchpost::keys::{KeyCodec, KeyId, KeyKind, TargetIdKind};

#[test]
fn state_key_round_trips_for_edge_ids() {
    let codec = KeyCodec::new("bilibili", TargetIdKind::Int);
    for group in [0_i64, 1, -1, i64::MIN, i64::MAX, 123_456_789] {
        for target in [0_i64, -42, 42, i64::MIN, i64::MAX] {
            let key = codec.build(KeyKind::State, &[KeyId::Int(group), KeyId::Int(target)]);
            let parsed = codec.parse_state_key(&key).unwrap();
            assert_eq!(parsed, (group, KeyId::Int(target)), "key {key}");
        }
    }
}

#[test]
fn string_targets_may_contain_separator() {
    let codec = KeyCodec::new("youtube", TargetIdKind::Str);
    let target = KeyId::from("UC:weird:id");
    let key = codec.build(KeyKind::State, &[KeyId::Int(-7), target.clone()]);
    assert_eq!(key, "youtube:concern_state:-7:UC:weird:id");
    assert_eq!(codec.parse_state_key(&key).unwrap(), (-7, target));
}

#[test]
fn key_layout_is_site_kind_ids() {
    let codec = KeyCodec::new("douyu", TargetIdKind::Int);
    assert_eq!(
        codec.build(KeyKind::Config, &[KeyId::Int(1), KeyId::Int(2)]),
        "douyu:concern_config:1:2"
    );
    assert_eq!(codec.build(KeyKind::Fresh, &[KeyId::Int(9)]), "douyu:fresh:9");
    assert_eq!(
        codec.build(KeyKind::Extra("current"), &[KeyId::Int(9)]),
        "douyu:current:9"
    );
    assert_eq!(codec.prefix(KeyKind::State), "douyu:concern_state:");
}

#[test]
fn parse_rejects_foreign_and_malformed_keys() {
    let codec = KeyCodec::new("bilibili", TargetIdKind::Int);
    // Other site
    assert!(codec.parse_state_key("douyu:concern_state:1:2").is_err());
    // Other kind
    assert!(codec.parse_state_key("bilibili:concern_config:1:2").is_err());
    // Missing target
    assert!(codec.parse_state_key("bilibili:concern_state:1").is_err());
    // Non-numeric ids on an integer site
    assert!(codec.parse_state_key("bilibili:concern_state:x:2").is_err());
    assert!(codec.parse_state_key("bilibili:concern_state:1:abc").is_err());
}

#[test]
fn empty_string_target_is_rejected() {
    let codec = KeyCodec::new("youtube", TargetIdKind::Str);
    assert!(codec.parse_state_key("youtube:concern_state:1:").is_err());
}
