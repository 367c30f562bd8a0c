//! Fuzz test for file name key parsing
//!
//! Arbitrary names must never panic, and keys that fit in an `i128` must
//! order the same way the integers do.

#![no_main]

use libfuzzer_sys::fuzz_target;
use std::cmp::Ordering;
use tandem_core::FileKey;

fn as_integer(name: &str) -> Option<i128> {
    name.strip_suffix(".log")?.parse().ok()
}

fuzz_target!(|input: (String, String, bool)| {
    let (left, right, allow_negative) = input;

    let Some(a) = FileKey::parse(&left, allow_negative) else {
        return;
    };
    let Some(b) = FileKey::parse(&right, allow_negative) else {
        return;
    };

    assert_eq!(a.name(), left);
    assert_eq!(a.cmp_value(&b), b.cmp_value(&a).reverse());
    assert_eq!(a.cmp(&b) == Ordering::Equal, left == right);

    if let (Some(x), Some(y)) = (as_integer(&left), as_integer(&right)) {
        assert_eq!(a.cmp_value(&b), x.cmp(&y));
    }
});
