use serde_json::Value;
use serde_json_path::JsonPath;

/// Resolves a JSONPath selector against a credential's claims envelope.
///
/// Returns every matched value in document order. A selector that matches
/// nothing resolves to an empty sequence, and so does a selector that does
/// not parse: presentation definitions are verifier-authored input, and a
/// malformed selector must never panic or error the holder evaluating it.
pub fn resolve<'a>(envelope: &'a Value, selector: &str) -> Vec<&'a Value> {
    match JsonPath::parse(selector) {
        Ok(path) => path.query(envelope).all(),
        Err(err) => {
            tracing::debug!(selector, %err, "claim path selector failed to parse");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn envelope() -> Value {
        json!({
            "issuer": "did:ex:issuer",
            "type": ["VerifiableCredential", "SiloVerificationCredential"],
            "credentialSubject": {
                "id": "did:ex:subject",
                "siloNum": "silo0_UR001",
                "address": { "city": "Ibadan", "country": "Nigeria" }
            }
        })
    }

    #[test]
    fn wildcard_resolves_every_array_element() {
        let envelope = envelope();
        let values = resolve(&envelope, "$.type[*]");
        assert_eq!(
            values,
            vec![
                &json!("VerifiableCredential"),
                &json!("SiloVerificationCredential")
            ]
        );
    }

    #[test]
    fn nested_fields_resolve() {
        let envelope = envelope();
        assert_eq!(
            resolve(&envelope, "$.credentialSubject.address.city"),
            vec![&json!("Ibadan")]
        );
    }

    #[test]
    fn missing_fields_resolve_to_nothing() {
        let envelope = envelope();
        assert!(resolve(&envelope, "$.credentialSubject.missing").is_empty());
    }

    #[test]
    fn malformed_selectors_resolve_to_nothing() {
        let envelope = envelope();
        assert!(resolve(&envelope, "$[").is_empty());
        assert!(resolve(&envelope, "not a path").is_empty());
    }
}
