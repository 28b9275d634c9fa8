//! PKCE code challenge derivation and checking (RFC 7636 §4.2, §4.6).

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

use super::types::CodeChallengeMethod;

/// Derive the challenge a client should have sent for `code_verifier`.
///
/// `S256` is `BASE64URL-NOPAD(SHA256(verifier))`; `plain` is the verifier itself.
#[must_use]
pub fn challenge(method: CodeChallengeMethod, code_verifier: &str) -> String {
    match method {
        CodeChallengeMethod::Plain => code_verifier.to_owned(),
        CodeChallengeMethod::S256 => URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes())),
    }
}

/// Check `code_verifier` against the challenge stored with the code.
#[must_use]
pub fn verify(method: CodeChallengeMethod, code_verifier: &str, code_challenge: &str) -> bool {
    !code_verifier.is_empty() && challenge(method, code_verifier) == code_challenge
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 7636 Appendix B
    const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    #[test]
    fn test_rfc_vector() {
        assert_eq!(challenge(CodeChallengeMethod::S256, VERIFIER), CHALLENGE);
        assert!(verify(CodeChallengeMethod::S256, VERIFIER, CHALLENGE));
        assert!(!verify(CodeChallengeMethod::S256, "wrong-verifier", CHALLENGE));
    }

    #[test]
    fn test_plain_compares_verbatim() {
        assert!(verify(CodeChallengeMethod::Plain, VERIFIER, VERIFIER));
        assert!(!verify(CodeChallengeMethod::Plain, VERIFIER, CHALLENGE));
        assert!(!verify(CodeChallengeMethod::Plain, "", ""));
    }
}
