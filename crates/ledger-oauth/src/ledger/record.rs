//! Audit records mirrored into the ledger.
//!
//! Field names follow the chaincode's JSON schema, not Rust conventions.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{LedgerError, LedgerResult};

/// Identifier prefix for code records.
pub const CODE_ID_PREFIX: &str = "CI_";

/// Identifier prefix for token records.
pub const TOKEN_ID_PREFIX: &str = "TI_";

const CODE_INFO_TYPE: &str = "CodeInfo";
const TOKEN_INFO_TYPE: &str = "TokenInfo";

/// `base64(sha256(secret))` with the standard alphabet and padding.
#[must_use]
pub fn hash_secret(secret: &str) -> String {
    STANDARD.encode(Sha256::digest(secret.as_bytes()))
}

/// Ledger identifier for a raw authorization code.
#[must_use]
pub fn code_record_id(code: &str) -> String {
    format!("{CODE_ID_PREFIX}{}", hash_secret(code))
}

/// Ledger identifier for a raw access token.
#[must_use]
pub fn token_record_id(access_token: &str) -> String {
    format!("{TOKEN_ID_PREFIX}{}", hash_secret(access_token))
}

/// Lifecycle state of a mirrored code or token (`Condition` on the wire).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordStatus {
    #[default]
    Available,
    Exchanged,
    Expired,
    Revoked,
}

impl RecordStatus {
    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Available)
    }

    /// Move to `next`, refusing any transition out of a terminal state.
    ///
    /// Re-applying the current state is a no-op.
    pub fn transition(self, next: Self) -> Result<Self, StatusTransitionError> {
        if self == next {
            return Ok(self);
        }
        if self.is_terminal() || next == Self::Available {
            return Err(StatusTransitionError { from: self, to: next });
        }
        Ok(next)
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Available => "Available",
            Self::Exchanged => "Exchanged",
            Self::Expired => "Expired",
            Self::Revoked => "Revoked",
        };
        f.write_str(s)
    }
}

/// Rejected status change.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("status cannot move from {from} to {to}")]
pub struct StatusTransitionError {
    pub from: RecordStatus,
    pub to: RecordStatus,
}

/// Audit entry for an issued authorization code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeRecord {
    #[serde(rename = "InfoType")]
    pub info_type: String,
    #[serde(rename = "ID_code")]
    pub id: String,
    #[serde(rename = "DID_RO")]
    pub owner_did: String,
    #[serde(rename = "DID_client")]
    pub client_did: String,
    #[serde(rename = "Scope")]
    pub scope: String,
    #[serde(rename = "Hash_code")]
    pub code_hash: String,
    #[serde(rename = "Time_issueed", deserialize_with = "ledger_time::deserialize")]
    pub issued_at: DateTime<Utc>,
    #[serde(rename = "URI_Redirection")]
    pub redirect_uri: String,
    #[serde(rename = "Condition")]
    pub status: RecordStatus,
    /// Empty until the code is exchanged.
    #[serde(rename = "ID_token")]
    pub linked_token_id: String,
}

impl CodeRecord {
    /// Build the record for a freshly issued code. The raw code is only hashed.
    #[must_use]
    pub fn new(
        code: &str,
        owner_did: impl Into<String>,
        client_did: impl Into<String>,
        scope: impl Into<String>,
        redirect_uri: impl Into<String>,
        issued_at: DateTime<Utc>,
    ) -> Self {
        let code_hash = hash_secret(code);
        Self {
            info_type: CODE_INFO_TYPE.to_string(),
            id: format!("{CODE_ID_PREFIX}{code_hash}"),
            owner_did: owner_did.into(),
            client_did: client_did.into(),
            scope: scope.into(),
            code_hash,
            issued_at,
            redirect_uri: redirect_uri.into(),
            status: RecordStatus::Available,
            linked_token_id: String::new(),
        }
    }

    /// Whether `code` hashes to this record's stored hash.
    #[must_use]
    pub fn matches_code(&self, code: &str) -> bool {
        !self.code_hash.is_empty() && self.code_hash == hash_secret(code)
    }

    /// Record the exchange. The linked token can be set only once.
    pub fn link_token(&mut self, token_id: &str) -> LedgerResult<()> {
        if !self.linked_token_id.is_empty() {
            return Err(LedgerError::conflict(
                &self.id,
                format!("already linked to {}", self.linked_token_id),
            ));
        }
        self.status = self
            .status
            .transition(RecordStatus::Exchanged)
            .map_err(|e| LedgerError::conflict(&self.id, e.to_string()))?;
        self.linked_token_id = token_id.to_string();
        Ok(())
    }
}

/// Audit entry for an issued access token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenRecord {
    #[serde(rename = "InfoType")]
    pub info_type: String,
    #[serde(rename = "ID_token")]
    pub id: String,
    #[serde(rename = "DID_RO")]
    pub owner_did: String,
    #[serde(rename = "DID_client")]
    pub client_did: String,
    #[serde(rename = "Scope")]
    pub scope: String,
    #[serde(rename = "Hash_token", alias = "Hash_code")]
    pub token_hash: String,
    #[serde(rename = "Time_issueed", deserialize_with = "ledger_time::deserialize")]
    pub issued_at: DateTime<Utc>,
    #[serde(rename = "Time_expiration", deserialize_with = "ledger_time::deserialize")]
    pub expires_at: DateTime<Utc>,
    #[serde(rename = "URI_Redirection")]
    pub redirect_uri: String,
    #[serde(rename = "Condition")]
    pub status: RecordStatus,
}

impl TokenRecord {
    /// Build the record for a freshly issued access token.
    ///
    /// Expiration is `issued_at + lifetime`.
    #[must_use]
    pub fn new(
        access_token: &str,
        owner_did: impl Into<String>,
        client_did: impl Into<String>,
        scope: impl Into<String>,
        redirect_uri: impl Into<String>,
        issued_at: DateTime<Utc>,
        lifetime: std::time::Duration,
    ) -> Self {
        let token_hash = hash_secret(access_token);
        let lifetime = chrono::Duration::from_std(lifetime).unwrap_or(chrono::Duration::MAX);
        Self {
            info_type: TOKEN_INFO_TYPE.to_string(),
            id: format!("{TOKEN_ID_PREFIX}{token_hash}"),
            owner_did: owner_did.into(),
            client_did: client_did.into(),
            scope: scope.into(),
            token_hash,
            issued_at,
            expires_at: issued_at.checked_add_signed(lifetime).unwrap_or(DateTime::<Utc>::MAX_UTC),
            redirect_uri: redirect_uri.into(),
            status: RecordStatus::Available,
        }
    }

    /// Whether `access_token` hashes to this record's stored hash.
    #[must_use]
    pub fn matches_token(&self, access_token: &str) -> bool {
        !self.token_hash.is_empty() && self.token_hash == hash_secret(access_token)
    }

    /// Whether the token has passed its expiration instant.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Timestamps are written as RFC 3339. Records created by the Go chaincode
/// client carry `time.Time.String()` output instead, which is read too:
/// `2006-01-02 15:04:05.999999999 -0700 MST m=+0.000000001`.
mod ledger_time {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer};

    const GO_LAYOUT: &str = "%Y-%m-%d %H:%M:%S%.f %z";

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Some(DateTime::<Utc>::default());
        }
        if let Ok(time) = DateTime::parse_from_rfc3339(raw) {
            return Some(time.with_timezone(&Utc));
        }
        // Zone abbreviation and monotonic reading follow the offset; drop them.
        let head = raw.split_whitespace().take(3).collect::<Vec<_>>().join(" ");
        DateTime::parse_from_str(&head, GO_LAYOUT).ok().map(|time| time.with_timezone(&Utc))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("unrecognized timestamp {raw:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_derivation() {
        // sha256("abc") = ba7816bf...
        assert_eq!(hash_secret("abc"), "ungWv48Bz+pBQUDeXa4iI7ADYaOWF3qctBD/YfIAFa0=");
        assert_eq!(code_record_id("abc"), "CI_ungWv48Bz+pBQUDeXa4iI7ADYaOWF3qctBD/YfIAFa0=");
        assert_eq!(token_record_id("abc"), "TI_ungWv48Bz+pBQUDeXa4iI7ADYaOWF3qctBD/YfIAFa0=");
    }

    #[test]
    fn test_status_is_monotonic() {
        use RecordStatus::*;
        assert_eq!(Available.transition(Exchanged), Ok(Exchanged));
        assert_eq!(Available.transition(Revoked), Ok(Revoked));
        assert_eq!(Revoked.transition(Revoked), Ok(Revoked));
        assert!(Exchanged.transition(Available).is_err());
        assert!(Expired.transition(Revoked).is_err());
        assert!(Revoked.transition(Exchanged).is_err());
    }

    #[test]
    fn test_link_token_once() {
        let mut record = CodeRecord::new("code", "did:ro", "did:client", "read", "http://cb", Utc::now());
        assert!(record.link_token("TI_1").is_ok());
        assert_eq!(record.status, RecordStatus::Exchanged);
        assert!(record.link_token("TI_2").is_err());
        assert_eq!(record.linked_token_id, "TI_1");
    }

    #[test]
    fn test_code_record_wire_format() {
        let record = CodeRecord::new("code", "did:ro", "did:client", "read", "http://cb", Utc::now());
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["InfoType"], "CodeInfo");
        assert_eq!(json["ID_code"], code_record_id("code"));
        assert_eq!(json["DID_RO"], "did:ro");
        assert_eq!(json["Condition"], "Available");
        assert_eq!(json["ID_token"], "");
        assert!(json["Time_issueed"].is_string());
        assert!(record.matches_code("code"));
        assert!(!record.matches_code("other"));
    }

    #[test]
    fn test_token_record_accepts_hash_code_alias() {
        let json = serde_json::json!({
            "InfoType": "TokenInfo",
            "ID_token": token_record_id("tok"),
            "Hash_code": hash_secret("tok"),
            "Condition": "Available"
        });
        let record: TokenRecord = serde_json::from_value(json).unwrap();
        assert!(record.matches_token("tok"));
    }

    #[test]
    fn test_reads_go_formatted_timestamps() {
        let json = serde_json::json!({
            "ID_token": token_record_id("tok"),
            "Hash_token": hash_secret("tok"),
            "Time_issueed": "2024-03-01 10:00:00.123456789 +0900 KST m=+12.345678901",
            "Time_expiration": "2024-03-01 03:00:00 +0000 UTC",
        });
        let record: TokenRecord = serde_json::from_value(json).unwrap();

        let utc = |raw: &str| DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc);
        assert_eq!(record.issued_at, utc("2024-03-01T01:00:00.123456789Z"));
        assert_eq!(record.expires_at, utc("2024-03-01T03:00:00Z"));

        let bad = serde_json::json!({ "Time_issueed": "yesterday" });
        assert!(serde_json::from_value::<CodeRecord>(bad).is_err());
    }

    #[test]
    fn test_default_record_never_matches() {
        assert!(!TokenRecord::default().matches_token(""));
        assert!(!CodeRecord::default().matches_code(""));
    }

    #[test]
    fn test_token_expiration_is_issue_plus_lifetime() {
        let issued = Utc::now();
        let record = TokenRecord::new(
            "tok",
            "did:ro",
            "did:client",
            "",
            "",
            issued,
            std::time::Duration::from_secs(7200),
        );
        assert_eq!(record.expires_at - record.issued_at, chrono::Duration::seconds(7200));
        assert!(!record.is_expired_at(issued));
        assert!(record.is_expired_at(issued + chrono::Duration::seconds(7200)));
    }
}
