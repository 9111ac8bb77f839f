//! Opaque external identifiers.
//!
//! An external id is the standard base64 encoding of `"{tag}:{id}"`, the same
//! shape as a Relay global id. The id never contains `:`, so decoding splits on
//! the last one and any tag, including an empty one, survives a round trip.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::{
    error::{Result, TreeError},
    types::NodeId,
};

/// Encodes an internal id under `type_tag` into an opaque external id.
pub fn encode(type_tag: &str, id: NodeId) -> String {
    STANDARD.encode(format!("{}:{}", type_tag, id))
}

/// Decodes an external id back into its tag and internal id.
///
/// When `expected_tag` is given, an id carrying any other tag is rejected.
pub fn decode(external_id: &str, expected_tag: Option<&str>) -> Result<(String, NodeId)> {
    let malformed = || TreeError::MalformedIdentifier(external_id.to_string());

    let bytes = STANDARD.decode(external_id).map_err(|_| malformed())?;
    let text = String::from_utf8(bytes).map_err(|_| malformed())?;
    let (tag, raw_id) = text.rsplit_once(':').ok_or_else(malformed)?;

    if raw_id.is_empty() || !raw_id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    let id = raw_id.parse::<NodeId>().map_err(|_| malformed())?;

    if let Some(expected) = expected_tag {
        if tag != expected {
            return Err(TreeError::MalformedIdentifier(format!(
                "{} (expected a {:?} id, got {:?})",
                external_id, expected, tag
            )));
        }
    }

    Ok((tag.to_string(), id))
}

/// Decodes an external id that must carry `type_tag`, returning only the internal id.
pub fn decode_as(external_id: &str, type_tag: &str) -> Result<NodeId> {
    decode(external_id, Some(type_tag)).map(|(_, id)| id)
}
