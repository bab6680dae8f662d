//! Merkle tree implementation for transaction commitment
//!
//! Bitcoin's construction: leaves are transaction IDs, each level hashes
//! concatenated pairs with double SHA-256, and an odd last node is paired
//! with itself.

use super::hash::Sha256Hash;

/// Calculate the merkle root from a list of transaction hashes
pub fn calculate_merkle_root(hashes: &[Sha256Hash]) -> Sha256Hash {
    if hashes.is_empty() {
        return Sha256Hash::ZERO;
    }

    let mut current_level: Vec<Sha256Hash> = hashes.to_vec();

    while current_level.len() > 1 {
        let mut next_level = Vec::with_capacity((current_level.len() + 1) / 2);

        for chunk in current_level.chunks(2) {
            let left = &chunk[0];
            // Duplicate the last hash if odd number
            let right = chunk.get(1).unwrap_or(left);
            next_level.push(hash_pair(left, right));
        }

        current_level = next_level;
    }

    current_level[0]
}

fn hash_pair(left: &Sha256Hash, right: &Sha256Hash) -> Sha256Hash {
    let mut data = [0u8; 64];
    data[..32].copy_from_slice(left.as_bytes());
    data[32..].copy_from_slice(right.as_bytes());
    Sha256Hash::of(&data)
}
