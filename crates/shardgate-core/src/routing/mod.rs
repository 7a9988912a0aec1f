//! Address-to-shard mapping.
//!
//! The shard of an account is derived from the low bits of the last byte of
//! its public key, against a shard count fixed at initialization. The
//! metachain holds a reserved identifier outside the numeric shard range.

use crate::errors::ProcessError;

/// Reserved identifier of the metachain.
pub const METACHAIN_SHARD_ID: u32 = u32::MAX;

/// Length in bytes of a routable account address.
pub const ADDRESS_LEN: usize = 32;

/// Maps raw address bytes to their owning shard. Pure and deterministic.
pub trait ShardRouting: Send + Sync {
    /// # Errors
    ///
    /// Returns [`ProcessError::InvalidAddress`] when the byte length is
    /// wrong.
    fn compute_shard_id(&self, address: &[u8]) -> Result<u32, ProcessError>;
}

/// Mask-based router over a fixed shard count.
///
/// Two masks are derived from the shard count: the wide mask covers the next
/// power of two, the narrow mask the previous one. The last address byte is
/// masked wide first and narrowed when the result falls outside the shard
/// range, which keeps the distribution balanced for non-power-of-two counts.
pub struct MaskShardRouter {
    shard_count: u32,
    mask_wide: u8,
    mask_narrow: u8,
}

impl MaskShardRouter {
    /// # Panics
    ///
    /// Panics if `shard_count` is zero; the shard count is validated at
    /// configuration load time.
    #[must_use]
    pub fn new(shard_count: u32) -> Self {
        assert!(shard_count > 0, "shard count must be positive");

        // Shards are addressed through the last byte, so both masks cap at
        // eight bits.
        let bits = (u32::BITS - (shard_count - 1).leading_zeros()).min(8);
        let mask_wide = ((1u16 << bits) - 1) as u8;
        let mask_narrow = if bits == 0 { 0 } else { ((1u16 << (bits - 1)) - 1) as u8 };

        Self { shard_count, mask_wide, mask_narrow }
    }

    /// System accounts live on the metachain: all-zero prefix with a
    /// non-zero tail byte.
    fn is_metachain_address(address: &[u8]) -> bool {
        let (prefix, tail) = address.split_at(address.len() - 1);
        prefix.iter().all(|b| *b == 0) && tail[0] != 0
    }
}

impl ShardRouting for MaskShardRouter {
    fn compute_shard_id(&self, address: &[u8]) -> Result<u32, ProcessError> {
        if address.len() != ADDRESS_LEN {
            return Err(ProcessError::InvalidAddress(format!(
                "expected {ADDRESS_LEN} address bytes, got {}",
                address.len()
            )));
        }

        if Self::is_metachain_address(address) {
            return Ok(METACHAIN_SHARD_ID);
        }

        let last = address[ADDRESS_LEN - 1];
        let mut shard = u32::from(last & self.mask_wide);
        if shard >= self.shard_count {
            shard = u32::from(last & self.mask_narrow);
        }

        Ok(shard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address_ending_in(last: u8) -> Vec<u8> {
        let mut address = vec![0xab; ADDRESS_LEN];
        address[ADDRESS_LEN - 1] = last;
        address
    }

    #[test]
    fn wrong_length_is_rejected() {
        let router = MaskShardRouter::new(2);
        assert!(matches!(
            router.compute_shard_id(&[1, 2, 3]),
            Err(ProcessError::InvalidAddress(_))
        ));
        assert!(matches!(router.compute_shard_id(&[]), Err(ProcessError::InvalidAddress(_))));
    }

    #[test]
    fn routing_is_deterministic() {
        let router = MaskShardRouter::new(3);
        let address = address_ending_in(0x2f);
        let first = router.compute_shard_id(&address).unwrap();
        for _ in 0..10 {
            assert_eq!(router.compute_shard_id(&address).unwrap(), first);
        }
    }

    #[test]
    fn power_of_two_count_uses_wide_mask_only() {
        let router = MaskShardRouter::new(4);
        assert_eq!(router.compute_shard_id(&address_ending_in(0x00)).unwrap(), 0);
        assert_eq!(router.compute_shard_id(&address_ending_in(0x01)).unwrap(), 1);
        assert_eq!(router.compute_shard_id(&address_ending_in(0x02)).unwrap(), 2);
        assert_eq!(router.compute_shard_id(&address_ending_in(0x07)).unwrap(), 3);
    }

    #[test]
    fn non_power_of_two_count_narrows_out_of_range_values() {
        let router = MaskShardRouter::new(3);
        // wide mask is 0b11, narrow mask is 0b1
        assert_eq!(router.compute_shard_id(&address_ending_in(0b10)).unwrap(), 2);
        // 0b11 masks wide to 3 which is out of range, narrows to 1
        assert_eq!(router.compute_shard_id(&address_ending_in(0b11)).unwrap(), 1);
    }

    #[test]
    fn every_shard_is_reachable() {
        let router = MaskShardRouter::new(3);
        let mut seen = std::collections::HashSet::new();
        for last in 0..=u8::MAX {
            seen.insert(router.compute_shard_id(&address_ending_in(last)).unwrap());
        }
        assert_eq!(seen, [0u32, 1, 2].into_iter().collect());
    }

    #[test]
    fn system_accounts_route_to_metachain() {
        let router = MaskShardRouter::new(2);
        let mut address = vec![0u8; ADDRESS_LEN];
        address[ADDRESS_LEN - 1] = 0xff;
        assert_eq!(router.compute_shard_id(&address).unwrap(), METACHAIN_SHARD_ID);

        // The all-zero address is a regular shard-0 account.
        let zero = vec![0u8; ADDRESS_LEN];
        assert_eq!(router.compute_shard_id(&zero).unwrap(), 0);
    }
}
