//! Version 1 files as written by the original application: PBKDF2 at 100k
//! iterations, no associated data, zlib-compressed pretty-printed JSON.

use std::io::Write;

use quill_container::{inspect, open, seal, FormatVersion, SealOptions};
use quill_crypto::{derive_key, random_salt, seal_with_fresh_nonce, LEGACY_ITERATIONS};
use secrecy::SecretString;

const V1_JSON: &str = r#"{
  "id": "0b0f7a4e-8d0c-4a43-9b0e-3f1b2a9c6d11",
  "title": "沙丘",
  "author": "FH",
  "genre": "SF",
  "created": "2024-01-15T10:30:00.123456",
  "modified": "2024-01-15T10:30:00.123456",
  "chapters": [
    {
      "id": "6f1c9f0e-1111-4c1a-8a55-000000000001",
      "title": "Ch1",
      "content": "It began...",
      "order": 0,
      "word_count": 8,
      "created": "2024-01-15T10:30:00",
      "modified": "2024-01-15T10:30:00"
    }
  ],
  "characters": [],
  "world_building": [],
  "story_notes": [
    {
      "id": "6f1c9f0e-3333-4c1a-8a55-000000000001",
      "title": "idea",
      "content": "spice",
      "created": "2024-01-15T10:30:00",
      "modified": "2024-01-15T10:30:00"
    }
  ],
  "story_background": "",
  "plot_outline": "",
  "research_notes": "",
  "timeline": "",
  "metadata": {"language": "en", "target_audience": "", "estimated_pages": 0, "status": "draft", "tags": []}
}"#;

fn v1_file(json: &str, password: &SecretString) -> Vec<u8> {
    let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(json.as_bytes()).unwrap();
    let packed = enc.finish().unwrap();

    let salt = random_salt().unwrap();
    let key = derive_key(password, &salt, LEGACY_ITERATIONS).unwrap();
    let sealed = seal_with_fresh_nonce(&key, |_| Vec::new(), &packed).unwrap();

    let mut file = b"BOOK".to_vec();
    file.extend_from_slice(&1u32.to_le_bytes());
    file.extend_from_slice(&salt);
    file.extend_from_slice(&sealed.nonce);
    file.extend_from_slice(&sealed.ciphertext);
    file
}

#[test]
fn v1_file_opens_and_upgrades_on_save() {
    let pw = SecretString::from("trial123");
    let file = v1_file(V1_JSON, &pw);
    assert!(inspect(&file).unwrap().needs_upgrade);

    let opened = open(&file, &pw).unwrap();
    assert_eq!(opened.version, FormatVersion::V1);
    assert!(opened.needs_upgrade());
    let doc = opened.document;
    assert_eq!(doc.title, "沙丘");
    assert_eq!(doc.chapters[0].content, "It began...");
    assert_eq!(doc.story_notes.len(), 1);

    let opts = SealOptions {
        iterations: 2,
        zstd_level: 3,
    };
    let upgraded = seal(&doc, &pw, &opts).unwrap();
    let info = inspect(&upgraded).unwrap();
    assert_eq!(info.version, 2);
    assert!(!info.needs_upgrade);

    let reopened = open(&upgraded, &pw).unwrap();
    assert_eq!(reopened.version, FormatVersion::V2);
    assert_eq!(reopened.document, doc);
}

#[test]
fn v1_wrong_password_is_authentication_failure() {
    let file = v1_file(V1_JSON, &SecretString::from("trial123"));
    let err = open(&file, &SecretString::from("wrong")).unwrap_err();
    assert!(err.is_authentication_failure());
}
