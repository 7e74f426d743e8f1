//! Hash chain over the event log
//!
//! Each event stores the SHA-256 of its own canonical bytes and the hash of
//! its predecessor, so any edit to a committed record breaks the chain.

use crate::{types::LedgerEvent, Error, Result};
use sha2::{Digest, Sha256};

/// Hash preceding the genesis event
pub const GENESIS_PREVIOUS_HASH: [u8; 32] = [0u8; 32];

/// Compute SHA-256 hash of an event's canonical bytes
pub fn hash_event(event: &LedgerEvent) -> Result<[u8; 32]> {
    let bytes = event.canonical_bytes()?;
    Ok(sha256(&bytes))
}

/// Compute SHA-256 hash
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Fill in `hash` from the event's contents
pub fn seal(mut event: LedgerEvent) -> Result<LedgerEvent> {
    event.hash = hash_event(&event)?;
    Ok(event)
}

/// Check that `event` is intact and directly follows (`sequence`, `hash`)
pub fn verify_link(
    previous_sequence: Option<u64>,
    previous_hash: &[u8; 32],
    event: &LedgerEvent,
) -> Result<()> {
    let expected_sequence = previous_sequence.map_or(0, |s| s + 1);
    if event.sequence != expected_sequence {
        return Err(Error::InvariantViolation(format!(
            "sequence gap: expected {}, found {}",
            expected_sequence, event.sequence
        )));
    }

    if &event.previous_hash != previous_hash {
        return Err(Error::InvariantViolation(format!(
            "event {} does not link to its predecessor",
            event.sequence
        )));
    }

    if hash_event(event)? != event.hash {
        return Err(Error::InvariantViolation(format!(
            "event {} hash mismatch",
            event.sequence
        )));
    }

    Ok(())
}

/// Verify a whole log from genesis
pub fn verify_chain(events: &[LedgerEvent]) -> Result<()> {
    let mut previous_sequence = None;
    let mut previous_hash = GENESIS_PREVIOUS_HASH;

    for event in events {
        verify_link(previous_sequence, &previous_hash, event)?;
        previous_sequence = Some(event.sequence);
        previous_hash = event.hash;
    }

    Ok(())
}

/// Hex rendering for logs
pub fn to_hex(hash: &[u8; 32]) -> String {
    hash.iter().map(|b| format!("{:02x}", b)).collect()
}
