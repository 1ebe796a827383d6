use ledgerscan_core::{fingerprint, fingerprint_text, query_key};
use proptest::prelude::*;

proptest! {
    #[test]
    fn fingerprint_is_stable_lowercase_hex(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        let key = fingerprint(&bytes);
        prop_assert_eq!(key.len(), 64);
        prop_assert!(key.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        prop_assert_eq!(key, fingerprint(&bytes));
    }

    #[test]
    fn distinct_inputs_get_distinct_keys(
        a in proptest::collection::vec(any::<u8>(), 0..128),
        b in proptest::collection::vec(any::<u8>(), 0..128),
    ) {
        prop_assume!(a != b);
        prop_assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn query_key_hashes_table_then_question(table in ".{0,64}", question in ".{0,32}") {
        let joined = format!("{table}{question}");
        prop_assert_eq!(query_key(&table, &question), fingerprint(joined.as_bytes()));
        prop_assert_eq!(fingerprint_text(&[&table, &question]), fingerprint(joined.as_bytes()));
    }
}
