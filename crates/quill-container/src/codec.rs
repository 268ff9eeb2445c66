//! Document ⇄ JSON bytes for the current format

use quill_core::{Document, QuillError, QuillResult};
use zeroize::Zeroizing;

pub fn serialize(doc: &Document) -> QuillResult<Zeroizing<Vec<u8>>> {
    serde_json::to_vec(doc)
        .map(Zeroizing::new)
        .map_err(|e| QuillError::Schema(format!("serialize document: {e}")))
}

/// Parse a document. Non-JSON input, a wrong shape and duplicate ids in a
/// keyed collection are all [`QuillError::Schema`].
pub fn deserialize(bytes: &[u8]) -> QuillResult<Document> {
    serde_json::from_slice(bytes).map_err(|e| QuillError::Schema(e.to_string()))
}
