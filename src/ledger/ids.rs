//! Deterministic pool identifiers.

use super::types::PoolId;
use crate::external::AccountId;
use sha2::{Digest, Sha256};

/// Length of a pool identifier in bytes.
pub const POOL_ID_LEN: usize = 20;

/// Derive a pool identifier from its creator and a salt.
///
/// The same `(creator, salt)` always yields the same id: the first 20 bytes of
/// `sha256(creator || 0x00 || salt)`.
pub fn derive_pool_id(creator: &AccountId, salt: &[u8]) -> PoolId {
    let mut hasher = Sha256::new();
    hasher.update(creator.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(salt);
    let digest = hasher.finalize();
    PoolId::encode(&digest[..POOL_ID_LEN])
}

/// Salt for a pool: strategy, asset and creation nonce.
pub(crate) fn pool_salt(strategy_id: &str, asset_id: &str, nonce: u64) -> Vec<u8> {
    let mut salt = Vec::with_capacity(strategy_id.len() + asset_id.len() + 10);
    salt.extend_from_slice(strategy_id.as_bytes());
    salt.push(0);
    salt.extend_from_slice(asset_id.as_bytes());
    salt.push(0);
    salt.extend_from_slice(&nonce.to_be_bytes());
    salt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_is_deterministic() {
        let creator = AccountId::new("controller");
        let a = derive_pool_id(&creator, &pool_salt("aave-usdc", "USDC", 0));
        let b = derive_pool_id(&creator, &pool_salt("aave-usdc", "USDC", 0));
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), POOL_ID_LEN * 2);
    }

    #[test]
    fn test_derivation_depends_on_inputs() {
        let creator = AccountId::new("controller");
        let base = derive_pool_id(&creator, &pool_salt("aave-usdc", "USDC", 0));

        assert_ne!(base, derive_pool_id(&creator, &pool_salt("aave-usdc", "USDC", 1)));
        assert_ne!(base, derive_pool_id(&creator, &pool_salt("aave-dai", "USDC", 0)));
        assert_ne!(
            base,
            derive_pool_id(&AccountId::new("other"), &pool_salt("aave-usdc", "USDC", 0))
        );
    }
}
