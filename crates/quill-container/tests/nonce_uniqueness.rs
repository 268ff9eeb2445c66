use std::collections::HashSet;

use quill_container::{seal, unframe, SealOptions};
use quill_core::Document;
use secrecy::SecretString;

#[test]
fn ten_thousand_seals_never_repeat_salt_or_nonce() {
    let mut doc = Document::new("Dune", "FH");
    doc.add_chapter("Ch1", "It began...");
    let pw = SecretString::from("trial123");
    let opts = SealOptions {
        iterations: 1,
        zstd_level: 1,
    };

    let mut pairs = HashSet::new();
    let mut nonces = HashSet::new();
    for _ in 0..10_000 {
        let file = seal(&doc, &pw, &opts).unwrap();
        let (header, _) = unframe(&file).unwrap();
        pairs.insert((header.salt, header.nonce));
        nonces.insert(header.nonce);
    }
    assert_eq!(pairs.len(), 10_000);
    assert_eq!(nonces.len(), 10_000);
}
