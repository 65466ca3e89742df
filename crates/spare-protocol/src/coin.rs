use chia_sha2::Sha256;

use crate::{Bytes32, Streamable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Streamable)]
pub struct Coin {
    pub parent_coin_info: Bytes32,
    pub puzzle_hash: Bytes32,
    pub amount: u64,
}

impl Coin {
    pub fn new(parent_coin_info: Bytes32, puzzle_hash: Bytes32, amount: u64) -> Self {
        Self {
            parent_coin_info,
            puzzle_hash,
            amount,
        }
    }

    /// The coin identifier, which commits to all three fields.
    ///
    /// The amount is hashed as a minimal big-endian two's complement integer, so an
    /// amount of zero contributes no bytes and amounts with the high bit set gain a
    /// leading zero byte.
    pub fn coin_id(&self) -> Bytes32 {
        let mut hasher = Sha256::new();
        hasher.update(self.parent_coin_info);
        hasher.update(self.puzzle_hash);
        hasher.update(amount_bytes(self.amount));
        Bytes32::new(hasher.finalize())
    }
}

fn amount_bytes(amount: u64) -> Vec<u8> {
    let bytes = amount.to_be_bytes();
    let start = bytes.iter().position(|&byte| byte != 0).unwrap_or(bytes.len());

    let mut result = Vec::with_capacity(9);
    if bytes.get(start).is_some_and(|&byte| byte & 0x80 != 0) {
        result.push(0);
    }
    result.extend_from_slice(&bytes[start..]);
    result
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0, &[])]
    #[case(1, &hex!("01"))]
    #[case(0x7f, &hex!("7f"))]
    #[case(0x80, &hex!("0080"))]
    #[case(0xffff, &hex!("00ffff"))]
    #[case(0x0100_0000, &hex!("01000000"))]
    #[case(u64::MAX, &hex!("00ffffffffffffffff"))]
    fn test_amount_bytes(#[case] amount: u64, #[case] expected: &[u8]) {
        assert_eq!(amount_bytes(amount), expected);
    }

    #[test]
    fn test_coin_id() {
        let coin = Coin::new(
            Bytes32::new([1; 32]),
            Bytes32::new([2; 32]),
            1_000,
        );

        let mut hasher = Sha256::new();
        hasher.update([1; 32]);
        hasher.update([2; 32]);
        hasher.update(hex!("03e8"));

        assert_eq!(coin.coin_id(), Bytes32::new(hasher.finalize()));
    }

    #[test]
    fn test_identical_fields_are_the_same_coin() {
        let a = Coin::new(Bytes32::default(), Bytes32::new([9; 32]), 5);
        let b = Coin::new(Bytes32::default(), Bytes32::new([9; 32]), 5);
        let c = Coin::new(Bytes32::default(), Bytes32::new([9; 32]), 6);
        assert_eq!(a.coin_id(), b.coin_id());
        assert_ne!(a.coin_id(), c.coin_id());
    }
}
