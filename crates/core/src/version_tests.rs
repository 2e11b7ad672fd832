// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    patch = { "1.0.0", "1.0.1", true },
    minor = { "1.0.9", "1.1.0", true },
    major = { "1.9.9", "2.0.0", true },
    equal = { "1.2.3", "1.2.3", false },
    greater = { "1.2.4", "1.2.3", false },
    short = { "1.0", "1.0.1", true },
    numeric_not_lexical = { "1.2.10", "1.2.9", false },
)]
fn compares_dotted_triples(a: &str, b: &str, expected: bool) {
    assert_eq!(version_lt(a, b), expected);
}

#[test]
fn malformed_segments_read_as_zero() {
    assert!(version_lt("abc", "0.0.1"));
    assert!(!version_lt("1.0.0", "abc"));
}
