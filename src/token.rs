use serde::{Deserialize, Serialize};

use crate::authz::Role;
use crate::error::ApiError;

/// Public identity embedded in a scannable token. The serialized form is
/// the canonical JSON of this struct; field order is fixed by declaration,
/// so encoding the same identity always yields the same string and the
/// token can double as a directory lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityToken {
    pub external_id: String,
    pub display_name: String,
    pub role: Role,
}

pub fn encode(external_id: &str, display_name: &str, role: Role) -> String {
    let token = IdentityToken {
        external_id: external_id.to_string(),
        display_name: display_name.to_string(),
        role,
    };
    // Serialization of a fixed-field struct cannot fail.
    serde_json::to_string(&token).unwrap_or_default()
}

/// Parse a scanned token. Fails on malformed JSON, missing fields or an
/// unknown role tag; whether the identity matches a live principal is the
/// directory's concern, not the codec's.
pub fn decode(raw: &str) -> Result<IdentityToken, ApiError> {
    serde_json::from_str(raw).map_err(|e| ApiError::Parse(e.to_string()))
}

impl IdentityToken {
    /// Re-serialize to the canonical form. A token that arrived with
    /// reordered keys or extra whitespace still resolves to the same
    /// directory key.
    pub fn canonical(&self) -> String {
        encode(&self.external_id, &self.display_name, self.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let token = encode("U001", "Ada Lovelace", Role::Member);
        let parsed = decode(&token).expect("decode");
        assert_eq!(parsed.external_id, "U001");
        assert_eq!(parsed.display_name, "Ada Lovelace");
        assert_eq!(parsed.role, Role::Member);
    }

    #[test]
    fn encoding_is_deterministic() {
        let a = encode("U001", "Ada", Role::Supervisor);
        let b = encode("U001", "Ada", Role::Supervisor);
        assert_eq!(a, b);
    }

    #[test]
    fn reordered_keys_canonicalize_to_same_string() {
        let shuffled = r#"{"role":"MEMBER","display_name":"A","external_id":"U001"}"#;
        let parsed = decode(shuffled).expect("decode");
        assert_eq!(parsed.canonical(), encode("U001", "A", Role::Member));
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(decode("not json at all").unwrap_err().kind(), "parse_error");
        assert_eq!(decode("").unwrap_err().kind(), "parse_error");
    }

    #[test]
    fn rejects_missing_fields() {
        let err = decode(r#"{"external_id":"U001"}"#).unwrap_err();
        assert_eq!(err.kind(), "parse_error");
    }

    #[test]
    fn rejects_unknown_role() {
        let err =
            decode(r#"{"external_id":"U001","display_name":"A","role":"WIZARD"}"#).unwrap_err();
        assert_eq!(err.kind(), "parse_error");
    }
}
