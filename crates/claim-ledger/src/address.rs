//! Deterministic account addresses and name-derived discriminators.
//!
//! `address = sha256(seed_0 || ... || seed_n || program_id || "ProgramDerivedAddress")`

use crate::constants::{
    CHANNEL_CUMULATIVE_SEED, CHANNEL_STATE_SEED, EPOCH_STATE_SEED, PROTOCOL_SEED,
};
use merkle_gen::Address;
use sha2::{Digest, Sha256};

const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

/// Bump recorded in derived accounts. Derivation has no off-curve search, so
/// it is fixed.
pub const CANONICAL_BUMP: u8 = 255;

/// First 8 bytes of `sha256(namespace || ":" || name)`.
fn sighash(namespace: &str, name: &str) -> [u8; 8] {
    let digest = Sha256::new()
        .chain_update(namespace.as_bytes())
        .chain_update(b":")
        .chain_update(name.as_bytes())
        .finalize();
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

/// Opcode for an instruction named `name` (snake case).
#[must_use]
pub fn instruction_opcode(name: &str) -> [u8; 8] {
    sighash("global", name)
}

/// Discriminator prefixed to an account of type `name` (camel case).
#[must_use]
pub fn account_discriminator(name: &str) -> [u8; 8] {
    sighash("account", name)
}

#[must_use]
pub fn derive_address(seeds: &[&[u8]], program_id: &Address) -> Address {
    let mut hasher = Sha256::new();
    for seed in seeds {
        hasher.update(seed);
    }
    hasher.update(program_id);
    hasher.update(PDA_MARKER);
    Address(hasher.finalize().into())
}

#[must_use]
pub fn protocol_address(program_id: &Address, mint: &Address) -> Address {
    derive_address(&[PROTOCOL_SEED, mint.as_ref()], program_id)
}

#[must_use]
pub fn channel_state_address(program_id: &Address, mint: &Address, subject: &Address) -> Address {
    derive_address(
        &[CHANNEL_STATE_SEED, mint.as_ref(), subject.as_ref()],
        program_id,
    )
}

#[must_use]
pub fn cumulative_channel_address(
    program_id: &Address,
    mint: &Address,
    subject: &Address,
) -> Address {
    derive_address(
        &[CHANNEL_CUMULATIVE_SEED, mint.as_ref(), subject.as_ref()],
        program_id,
    )
}

/// Epoch-state address for channels that predate the mint migration.
#[must_use]
pub fn legacy_epoch_state_address(program_id: &Address, epoch: u64, subject: &Address) -> Address {
    derive_address(
        &[EPOCH_STATE_SEED, &epoch.to_le_bytes(), subject.as_ref()],
        program_id,
    )
}

/// Epoch-state address with the mint appended to the seeds.
#[must_use]
pub fn open_epoch_state_address(
    program_id: &Address,
    epoch: u64,
    subject: &Address,
    mint: &Address,
) -> Address {
    derive_address(
        &[
            EPOCH_STATE_SEED,
            &epoch.to_le_bytes(),
            subject.as_ref(),
            mint.as_ref(),
        ],
        program_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_state_discriminator() {
        assert_eq!(
            hex::encode(account_discriminator("EpochState")),
            "bf3f8bed900cdfd2"
        );
    }

    #[test]
    fn test_opcodes_are_distinct() {
        assert_ne!(instruction_opcode("claim"), instruction_opcode("claim_open"));
        assert_ne!(instruction_opcode("claim"), account_discriminator("claim"));
    }

    #[test]
    fn test_derivation_is_seed_sensitive() {
        let program = Address([1; 32]);
        let mint = Address([2; 32]);
        let subject = Address([3; 32]);

        let legacy = legacy_epoch_state_address(&program, 5, &subject);
        let open = open_epoch_state_address(&program, 5, &subject, &mint);
        assert_ne!(legacy, open);
        assert_ne!(legacy, legacy_epoch_state_address(&program, 6, &subject));
        assert_ne!(
            channel_state_address(&program, &mint, &subject),
            cumulative_channel_address(&program, &mint, &subject)
        );
        assert_ne!(
            protocol_address(&program, &mint),
            protocol_address(&Address([9; 32]), &mint)
        );
    }

    #[test]
    fn test_derivation_layout() {
        let program = Address([7; 32]);
        let mint = Address([8; 32]);
        let mut hasher = Sha256::new();
        hasher.update(b"protocol");
        hasher.update([8u8; 32]);
        hasher.update([7u8; 32]);
        hasher.update(b"ProgramDerivedAddress");
        let expected: [u8; 32] = hasher.finalize().into();

        assert_eq!(protocol_address(&program, &mint), Address(expected));
    }
}
