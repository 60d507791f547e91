//! Idempotency key grammar (spec §4.3): a 12-character timestamp prefix, a
//! 6-digit sequence block, a table name, and a 5-character uppercase-
//! alphanumeric suffix, at least 24 characters in total. Part of the stable
//! wire contract (spec §6) — changing this grammar is a breaking change.

use chrono::{DateTime, NaiveDateTime, Utc};
use ledger_model::{Error, Result};
use rand::RngCore;

const MIN_LEN: usize = 24;
const TIMESTAMP_LEN: usize = 12;
const SEQUENCE_LEN: usize = 6;
const SUFFIX_LEN: usize = 5;
const SUFFIX_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// A validated idempotency key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyKey {
    raw: String,
    timestamp: NaiveDateTime,
    sequence: u32,
    table_name: String,
    suffix: String,
}

impl IdempotencyKey {
    /// Parse and validate a client- or server-supplied key string,
    /// returning `Error::BadIdempotencyKey` on any grammar violation (spec
    /// §8 scenario S6: a too-short key is rejected before any row is
    /// inserted).
    pub fn parse(raw: &str) -> Result<Self> {
        if !raw.is_ascii() {
            return Err(Error::BadIdempotencyKey(format!("key {raw:?} must be ASCII")));
        }
        if raw.len() < MIN_LEN {
            return Err(Error::BadIdempotencyKey(format!(
                "key {raw:?} is {} characters, minimum is {MIN_LEN}",
                raw.len()
            )));
        }

        let (timestamp_str, rest) = raw.split_at(TIMESTAMP_LEN);
        let timestamp = NaiveDateTime::parse_from_str(timestamp_str, "%Y%m%d%H%M").map_err(|e| {
            Error::BadIdempotencyKey(format!("bad timestamp prefix {timestamp_str:?}: {e}"))
        })?;

        let (sequence_str, rest) = rest.split_at(SEQUENCE_LEN);
        let sequence: u32 = sequence_str
            .parse()
            .map_err(|_| Error::BadIdempotencyKey(format!("bad sequence block {sequence_str:?}")))?;

        if rest.len() <= SUFFIX_LEN {
            return Err(Error::BadIdempotencyKey(format!(
                "key {raw:?} leaves no room for a table name between sequence and suffix"
            )));
        }
        let split_at = rest.len() - SUFFIX_LEN;
        let (table_name, suffix) = rest.split_at(split_at);
        if !suffix.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()) {
            return Err(Error::BadIdempotencyKey(format!(
                "suffix {suffix:?} must be 5 uppercase-alphanumeric characters"
            )));
        }

        Ok(Self {
            raw: raw.to_string(),
            timestamp,
            sequence,
            table_name: table_name.to_string(),
            suffix: suffix.to_string(),
        })
    }

    /// Generate a server-side key for `table_name`. `sequence` comes from
    /// the caller (drawn from the `idempotency_sequence` counter on the
    /// dedicated shard); `rng` supplies the random suffix. The random
    /// source is injected rather than seeded internally, per spec §9's
    /// Design Notes, so tests can make generation deterministic.
    pub fn generate(table_name: &str, sequence: u32, now: DateTime<Utc>, rng: &mut dyn RngCore) -> Self {
        let timestamp_str = now.format("%Y%m%d%H%M").to_string();
        let sequence_str = format!("{:06}", sequence % 1_000_000);
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| SUFFIX_ALPHABET[(rng.next_u32() as usize) % SUFFIX_ALPHABET.len()] as char)
            .collect();
        let raw = format!("{timestamp_str}{sequence_str}{table_name}{suffix}");
        Self {
            raw,
            timestamp: now.naive_utc(),
            sequence,
            table_name: table_name.to_string(),
            suffix,
        }
    }

    /// The full key string, as stored and compared.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The table-name segment of the key.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// The sequence segment of the key.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// The timestamp prefix, parsed.
    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    #[test]
    fn parses_the_s1_scenario_key() {
        let key = IdempotencyKey::parse("202501151230000001investment_A1B2C").unwrap();
        assert_eq!(key.sequence(), 1);
        assert_eq!(key.table_name(), "investment_");
    }

    #[test]
    fn rejects_a_too_short_key() {
        assert!(matches!(
            IdempotencyKey::parse("short"),
            Err(Error::BadIdempotencyKey(_))
        ));
    }

    #[test]
    fn rejects_a_lowercase_suffix() {
        // Same shape as the S1 key but with a lowercase suffix.
        assert!(IdempotencyKey::parse("202501151230000001investment_a1b2c").is_err());
    }

    #[test]
    fn generate_is_deterministic_given_a_seeded_rng() {
        let now: DateTime<Utc> = "2025-01-15T12:30:00Z".parse().unwrap();
        let mut rng_a = StepRng::new(7, 1);
        let mut rng_b = StepRng::new(7, 1);
        let a = IdempotencyKey::generate("investments_", 42, now, &mut rng_a);
        let b = IdempotencyKey::generate("investments_", 42, now, &mut rng_b);
        assert_eq!(a.as_str(), b.as_str());
        assert!(IdempotencyKey::parse(a.as_str()).is_ok());
    }
}
