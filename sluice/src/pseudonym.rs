use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Secret salt for subject pseudonyms. Redacted from `Debug` output so it
/// never leaks through logs.
#[derive(Clone)]
pub struct SubjectSalt(Vec<u8>);

impl SubjectSalt {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self(secret.into())
    }
}

impl fmt::Debug for SubjectSalt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SubjectSalt(..)")
    }
}

/// Deterministic one-way pseudonyms: for a fixed salt, the same raw subject
/// identifier always maps to the same hash, across calls and restarts, so
/// warehouse rows join on `subject_hash` without ever storing the raw value.
#[derive(Debug, Clone)]
pub struct Pseudonymizer {
    salt: SubjectSalt,
}

impl Pseudonymizer {
    pub fn new(salt: SubjectSalt) -> Self {
        Self { salt }
    }

    pub fn subject_hash(&self, raw_subject_id: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.salt.0).expect("HMAC can take key of any size");
        mac.update(raw_subject_id.as_bytes());

        hex::encode(mac.finalize().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_fixed_salt() {
        let a = Pseudonymizer::new(SubjectSalt::new("tenant-salt"));
        let b = Pseudonymizer::new(SubjectSalt::new("tenant-salt"));

        assert_eq!(a.subject_hash("user-1"), b.subject_hash("user-1"));
        assert_eq!(a.subject_hash("user-1"), a.subject_hash("user-1"));
    }

    #[test]
    fn distinct_subjects_and_salts_diverge() {
        let a = Pseudonymizer::new(SubjectSalt::new("tenant-salt"));
        let b = Pseudonymizer::new(SubjectSalt::new("other-salt"));

        assert_ne!(a.subject_hash("user-1"), a.subject_hash("user-2"));
        assert_ne!(a.subject_hash("user-1"), b.subject_hash("user-1"));
    }

    #[test]
    fn debug_output_is_redacted() {
        let salt = SubjectSalt::new("super-secret");

        assert_eq!(format!("{salt:?}"), "SubjectSalt(..)");
    }
}
