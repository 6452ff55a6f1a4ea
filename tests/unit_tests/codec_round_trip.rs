// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! `deserialize(serialize(x)) == x` for nested argument/return types,
//! checked against the public API for both codecs this crate ships.

use coro_rpc_rs::protocol::codec::Codec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Nested {
    id: u64,
    tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Mixed {
    Unit,
    Tuple(i32, bool),
    Struct { value: Nested },
}

#[test]
fn bincode_round_trips_nested_structures() {
    let value = Mixed::Struct {
        value: Nested { id: 42, tags: vec!["a".into(), "b".into()] },
    };
    let bytes = Codec::Bincode.encode(&value).expect("encode");
    let decoded: Mixed = Codec::Bincode.decode(&bytes).expect("decode");
    assert_eq!(decoded, value);
}

#[test]
fn json_round_trips_nested_structures() {
    let value = Mixed::Tuple(-7, true);
    let bytes = Codec::Json.encode(&value).expect("encode");
    let decoded: Mixed = Codec::Json.decode(&bytes).expect("decode");
    assert_eq!(decoded, value);
}

#[test]
fn empty_string_round_trips_through_both_codecs() {
    let value = String::new();
    for codec in [Codec::Bincode, Codec::Json] {
        let bytes = codec.encode(&value).expect("encode");
        let decoded: String = codec.decode(&bytes).expect("decode");
        assert_eq!(decoded, value);
    }
}
