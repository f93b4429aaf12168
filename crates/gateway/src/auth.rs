use async_trait::async_trait;

use roundtable_protocol::{ParticipantFrame, Profile};

use crate::{authority::AuthorityClient, error::AuthError};

// ── Verifier ─────────────────────────────────────────────────────────────────

/// Resolves a participant credential to a profile.
///
/// Implementations must not hold any gateway lock while the lookup is in
/// flight.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<Profile, AuthError>;
}

#[async_trait]
impl IdentityVerifier for AuthorityClient {
    async fn verify(&self, credential: &str) -> Result<Profile, AuthError> {
        self.verify_key(credential).await
    }
}

// ── Handshake ────────────────────────────────────────────────────────────────

/// Extract the credential from a participant's first text frame.
///
/// Anything other than a well-formed `identify` with a non-empty key is
/// refused.
pub fn parse_identify(text: &str) -> Result<String, AuthError> {
    match serde_json::from_str::<ParticipantFrame>(text) {
        Ok(ParticipantFrame::Identify { api_key }) if !api_key.is_empty() => Ok(api_key),
        _ => Err(AuthError::IdentifyRequired),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identify_frame_yields_key() {
        assert_eq!(
            parse_identify(r#"{"type":"identify","apiKey":"k-1"}"#).unwrap(),
            "k-1"
        );
    }

    #[test]
    fn empty_key_is_refused() {
        let err = parse_identify(r#"{"type":"identify","apiKey":""}"#).unwrap_err();
        assert!(matches!(err, AuthError::IdentifyRequired));
        assert_eq!(err.close_reason(), "Auth required");
    }

    #[test]
    fn other_first_frames_are_refused() {
        for text in [
            r#"{"type":"turn_response","text":"hi"}"#,
            r#"{"type":"identify"}"#,
            "not json",
        ] {
            assert!(matches!(
                parse_identify(text),
                Err(AuthError::IdentifyRequired)
            ));
        }
    }
}
