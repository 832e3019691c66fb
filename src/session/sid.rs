//! Session id codec.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use uuid::{Uuid, Variant};

/// Byte holding the option flags. Its two high bits are the UUID variant.
const OPTIONS_BYTE: usize = 8;

/// Causally consistent sessions set the lowest bit of the options byte.
const CAUSALLY_CONSISTENT: u8 = 0b0000_0001;

/// Options carried inside a session id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SessionOptions {
    pub causally_consistent: bool,
}

impl SessionOptions {
    fn to_bits(self) -> u8 {
        if self.causally_consistent {
            CAUSALLY_CONSISTENT
        } else {
            0
        }
    }

    fn from_bits(bits: u8) -> Self {
        Self {
            causally_consistent: bits & CAUSALLY_CONSISTENT != 0,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SidError {
    #[error("invalid session id: {0}")]
    Malformed(String),

    #[error("session id {0} is not a random (version 4) UUID")]
    NotRandom(Uuid),
}

/// A session id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sid(Uuid);

impl Sid {
    /// Generate a random session id carrying `options`.
    pub fn random(options: SessionOptions) -> Self {
        let mut bytes = *Uuid::new_v4().as_bytes();
        bytes[OPTIONS_BYTE] = (bytes[OPTIONS_BYTE] & !CAUSALLY_CONSISTENT) | options.to_bits();
        Sid(Uuid::from_bytes(bytes))
    }

    /// Decode the options carried by this id.
    pub fn options(&self) -> SessionOptions {
        SessionOptions::from_bits(self.0.as_bytes()[OPTIONS_BYTE])
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl TryFrom<Uuid> for Sid {
    type Error = SidError;

    fn try_from(uuid: Uuid) -> Result<Self, Self::Error> {
        if uuid.get_version_num() != 4 || uuid.get_variant() != Variant::RFC4122 {
            return Err(SidError::NotRandom(uuid));
        }
        Ok(Sid(uuid))
    }
}

impl FromStr for Sid {
    type Err = SidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::parse_str(s).map_err(|_| SidError::Malformed(s.to_string()))?;
        Sid::try_from(uuid)
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_survive_generation() {
        for causally_consistent in [true, false] {
            let options = SessionOptions { causally_consistent };
            for _ in 0..10 {
                let sid = Sid::random(options);
                assert_eq!(sid.options(), options);
            }
        }
    }

    #[test]
    fn test_ids_stay_valid_v4() {
        for _ in 0..10 {
            let sid = Sid::random(SessionOptions { causally_consistent: true });
            assert_eq!(sid.as_uuid().get_version_num(), 4);
            assert_eq!(sid.as_uuid().get_variant(), Variant::RFC4122);
        }
    }

    #[test]
    fn test_text_form_round_trips() {
        let sid = Sid::random(SessionOptions { causally_consistent: true });
        let parsed: Sid = sid.to_string().parse().unwrap();
        assert_eq!(parsed, sid);
        assert!(parsed.options().causally_consistent);
    }

    #[test]
    fn test_rejects_non_random_ids() {
        assert!(matches!(
            "not-a-uuid".parse::<Sid>(),
            Err(SidError::Malformed(_))
        ));
        assert!(matches!(
            Uuid::nil().to_string().parse::<Sid>(),
            Err(SidError::NotRandom(_))
        ));
    }

    #[test]
    fn test_ids_are_distinct() {
        let a = Sid::random(SessionOptions::default());
        let b = Sid::random(SessionOptions::default());
        assert_ne!(a, b);
    }
}
