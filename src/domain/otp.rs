//! One-time code challenge
//!
//! Short-lived numeric challenge gating high-risk transfers. Only a salted
//! digest of the code is ever stored; the plaintext exists exactly once, on
//! its way to the notification sender.
//!
//! Lifecycle: none -> issued -> verified | expired | exhausted. Terminal
//! states are final; issuing a new code replaces any prior challenge.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use super::error::DomainError;

/// Fixed challenge lifetime (10 minutes)
pub const OTP_TTL_SECONDS: i64 = 600;

/// Failed verification attempts allowed before the challenge is exhausted
pub const MAX_OTP_ATTEMPTS: i32 = 5;

/// Salted SHA-256 digest, hex encoded.
///
/// Also used for transaction PIN and authorization code digests.
pub fn salted_sha256(value: &str, salt: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a random hex salt.
pub fn generate_salt() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    hex::encode(bytes)
}

/// Generate a 6-digit numeric code.
fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

/// Observable challenge state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpState {
    None,
    Issued,
    Verified,
    Expired,
    Exhausted,
}

/// A live or spent one-time code challenge attached to a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpChallenge {
    /// Digest of the outstanding code; cleared on successful verification
    code_hash: Option<String>,
    salt: String,
    expires_at: DateTime<Utc>,
    attempts: i32,
    verified: bool,
}

/// Result of issuing a challenge: the stored state plus the one-shot
/// plaintext code for delivery.
#[derive(Debug)]
pub struct IssuedOtp {
    pub challenge: OtpChallenge,
    pub code: String,
}

impl OtpChallenge {
    /// Issue a fresh challenge expiring `OTP_TTL_SECONDS` from `now`.
    ///
    /// Any previous challenge for the same transfer is superseded by
    /// storing the returned state over it.
    pub fn issue_at(now: DateTime<Utc>) -> IssuedOtp {
        let code = generate_code();
        let salt = generate_salt();
        let challenge = OtpChallenge {
            code_hash: Some(salted_sha256(&code, &salt)),
            salt,
            expires_at: now + Duration::seconds(OTP_TTL_SECONDS),
            attempts: 0,
            verified: false,
        };
        IssuedOtp { challenge, code }
    }

    /// Issue a fresh challenge expiring 10 minutes from now.
    pub fn issue() -> IssuedOtp {
        Self::issue_at(Utc::now())
    }

    /// Rehydrate a challenge from persisted fields.
    pub fn from_parts(
        code_hash: Option<String>,
        salt: String,
        expires_at: DateTime<Utc>,
        attempts: i32,
        verified: bool,
    ) -> Self {
        Self {
            code_hash,
            salt,
            expires_at,
            attempts,
            verified,
        }
    }

    pub fn code_hash(&self) -> Option<&str> {
        self.code_hash.as_deref()
    }

    pub fn salt(&self) -> &str {
        &self.salt
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn attempts(&self) -> i32 {
        self.attempts
    }

    pub fn is_verified(&self) -> bool {
        self.verified
    }

    /// Current state as of `now`.
    pub fn state_at(&self, now: DateTime<Utc>) -> OtpState {
        if self.verified {
            OtpState::Verified
        } else if self.attempts >= MAX_OTP_ATTEMPTS {
            OtpState::Exhausted
        } else if self.code_hash.is_none() {
            OtpState::None
        } else if now > self.expires_at {
            OtpState::Expired
        } else {
            OtpState::Issued
        }
    }

    /// Verify a supplied code against the stored digest as of `now`.
    ///
    /// Check order is fixed: expiry, then attempt budget, then digest
    /// comparison, so an expired challenge reports `OtpExpired` no matter
    /// what code was supplied. A successful verification clears the digest:
    /// the code is single use.
    pub fn verify_at(&mut self, code: &str, now: DateTime<Utc>) -> Result<(), DomainError> {
        let stored = match &self.code_hash {
            Some(hash) => hash.clone(),
            None => return Err(DomainError::OtpNotIssued),
        };

        if now > self.expires_at {
            return Err(DomainError::OtpExpired);
        }

        if self.attempts >= MAX_OTP_ATTEMPTS {
            return Err(DomainError::OtpExhausted);
        }

        if salted_sha256(code, &self.salt) != stored {
            self.attempts += 1;
            if self.attempts >= MAX_OTP_ATTEMPTS {
                return Err(DomainError::OtpExhausted);
            }
            return Err(DomainError::OtpMismatch);
        }

        self.code_hash = None;
        self.verified = true;
        Ok(())
    }

    /// Verify a supplied code against the stored digest.
    pub fn verify(&mut self, code: &str) -> Result<(), DomainError> {
        self.verify_at(code, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_produces_six_digit_code() {
        let issued = OtpChallenge::issue();
        assert_eq!(issued.code.len(), 6);
        assert!(issued.code.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(issued.challenge.attempts(), 0);
        assert!(issued.challenge.code_hash().is_some());
    }

    #[test]
    fn test_plaintext_code_never_stored() {
        let issued = OtpChallenge::issue();
        assert_ne!(issued.challenge.code_hash().unwrap(), issued.code);
    }

    #[test]
    fn test_expiry_is_exactly_ttl() {
        let now = Utc::now();
        let issued = OtpChallenge::issue_at(now);
        assert_eq!(
            issued.challenge.expires_at(),
            now + Duration::seconds(OTP_TTL_SECONDS)
        );
    }

    #[test]
    fn test_correct_code_verifies_once() {
        let issued = OtpChallenge::issue();
        let mut challenge = issued.challenge;

        assert!(challenge.verify(&issued.code).is_ok());
        assert!(challenge.is_verified());

        // Single use: a second verification of the same code fails
        assert_eq!(
            challenge.verify(&issued.code),
            Err(DomainError::OtpNotIssued)
        );
    }

    #[test]
    fn test_wrong_code_counts_attempt() {
        let issued = OtpChallenge::issue();
        let mut challenge = issued.challenge;

        assert_eq!(challenge.verify("000000"), Err(DomainError::OtpMismatch));
        assert_eq!(challenge.attempts(), 1);

        // Correct code still works before exhaustion
        assert!(challenge.verify(&issued.code).is_ok());
    }

    #[test]
    fn test_exhaustion_after_max_attempts() {
        let issued = OtpChallenge::issue();
        let mut challenge = issued.challenge;

        for attempt in 1..=MAX_OTP_ATTEMPTS {
            let result = challenge.verify("000000");
            if attempt < MAX_OTP_ATTEMPTS {
                assert_eq!(result, Err(DomainError::OtpMismatch));
            } else {
                assert_eq!(result, Err(DomainError::OtpExhausted));
            }
        }

        // Even the right code is rejected once exhausted
        assert_eq!(
            challenge.verify(&issued.code),
            Err(DomainError::OtpExhausted)
        );
        assert_eq!(challenge.state_at(Utc::now()), OtpState::Exhausted);
    }

    #[test]
    fn test_expired_code_rejected_regardless_of_correctness() {
        let issued_at = Utc::now() - Duration::seconds(OTP_TTL_SECONDS + 1);
        let issued = OtpChallenge::issue_at(issued_at);
        let mut challenge = issued.challenge;

        assert_eq!(
            challenge.verify(&issued.code),
            Err(DomainError::OtpExpired)
        );
        assert_eq!(challenge.state_at(Utc::now()), OtpState::Expired);
    }

    #[test]
    fn test_reissue_supersedes_previous_code() {
        let first = OtpChallenge::issue();
        let second = OtpChallenge::issue();
        let mut challenge = second.challenge;

        // Old code is useless against the replacement challenge
        if first.code != second.code {
            assert_eq!(challenge.verify(&first.code), Err(DomainError::OtpMismatch));
        }
        assert!(challenge.verify(&second.code).is_ok());
    }

    #[test]
    fn test_state_transitions() {
        let now = Utc::now();
        let issued = OtpChallenge::issue_at(now);
        let mut challenge = issued.challenge;

        assert_eq!(challenge.state_at(now), OtpState::Issued);

        challenge.verify_at(&issued.code, now).unwrap();
        assert_eq!(challenge.state_at(now), OtpState::Verified);
    }

    #[test]
    fn test_salted_sha256_is_deterministic_and_salted() {
        let a = salted_sha256("123456", "salt-a");
        let b = salted_sha256("123456", "salt-a");
        let c = salted_sha256("123456", "salt-b");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
