//! Export batch idempotency keys

use uuid::Uuid;

use core_kernel::{ExpenseId, UserId};

/// Namespace for batch key derivation
const BATCH_NAMESPACE: Uuid = Uuid::from_u128(0x6f2c_1a8e_4b7d_5e90_a3c1_d2f4_8b6e_0c17);

/// Prefix of every batch key
pub const BATCH_KEY_PREFIX: &str = "EXP-";

/// Hex digits kept from the derived UUID; the ledger's document number
/// field holds at most 21 characters
const KEY_DIGITS: usize = 17;

/// Derives the idempotency key for a claimant's batch
///
/// The key depends only on the claimant and the set of expense ids, so the
/// same batch always maps to the same key regardless of input order.
pub fn batch_key(claimant: UserId, expenses: &[ExpenseId]) -> String {
    let mut ids: Vec<_> = expenses.iter().map(|id| *id.as_uuid()).collect();
    ids.sort_unstable();

    let mut name = claimant.as_uuid().as_bytes().to_vec();
    for id in ids {
        name.extend_from_slice(id.as_bytes());
    }

    let digest = Uuid::new_v5(&BATCH_NAMESPACE, &name).simple().to_string();
    format!("{}{}", BATCH_KEY_PREFIX, &digest[..KEY_DIGITS])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_order_independent() {
        let claimant = UserId::new_v7();
        let a = ExpenseId::new_v7();
        let b = ExpenseId::new_v7();

        assert_eq!(batch_key(claimant, &[a, b]), batch_key(claimant, &[b, a]));
    }

    #[test]
    fn test_key_depends_on_claimant_and_set() {
        let claimant = UserId::new_v7();
        let a = ExpenseId::new_v7();
        let b = ExpenseId::new_v7();

        assert_ne!(batch_key(claimant, &[a]), batch_key(claimant, &[a, b]));
        assert_ne!(batch_key(claimant, &[a]), batch_key(UserId::new_v7(), &[a]));
    }

    #[test]
    fn test_key_fits_document_number() {
        let key = batch_key(UserId::new_v7(), &[ExpenseId::new_v7()]);
        assert_eq!(key.len(), 21);
        assert!(key.starts_with(BATCH_KEY_PREFIX));
    }
}
