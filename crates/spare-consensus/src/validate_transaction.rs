use std::collections::HashSet;

use spare_protocol::{Bytes32, Coin, SpendBundle};

use crate::{
    required_signatures, spend_bundle_cost, standard_puzzle_hash, CoinView, ConsensusConstants,
    SignatureOracle, ValidationError,
};

/// What a spend bundle does to the coin set, once it is known to be valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTransaction {
    pub name: Bytes32,
    pub fee: u64,
    pub cost: u64,
    pub removals: Vec<Bytes32>,
    pub additions: Vec<Coin>,
}

/// Checks a spend bundle against the coin set as of some block.
///
/// Every spent coin must exist, be unspent, and be owned by the key that signs for it.
/// Created coins must descend from the coin spending them and must not already exist.
/// The outputs plus the reserve fee may not exceed the inputs, and the cost may not
/// exceed what fits in a single block. The signature is checked last.
pub fn validate_transaction<V>(
    bundle: &SpendBundle,
    coins: &V,
    constants: &ConsensusConstants,
    signatures: &dyn SignatureOracle,
) -> Result<ValidatedTransaction, ValidationError>
where
    V: CoinView + ?Sized,
{
    let validated = check_transaction(bundle, coins, constants)?;
    validate_transaction_signature(bundle, constants, signatures)?;
    Ok(validated)
}

/// Checks the aggregate signature over every spend in the bundle.
///
/// Depends on nothing but the bundle, so it can run away from the coin set.
pub fn validate_transaction_signature(
    bundle: &SpendBundle,
    constants: &ConsensusConstants,
    signatures: &dyn SignatureOracle,
) -> Result<(), ValidationError> {
    if signatures.aggregate_verify(
        &bundle.aggregated_signature,
        &required_signatures(bundle, constants),
    ) {
        Ok(())
    } else {
        Err(ValidationError::BadAggregateSignature)
    }
}

/// Every check in [`validate_transaction`] except the signature.
pub fn check_transaction<V>(
    bundle: &SpendBundle,
    coins: &V,
    constants: &ConsensusConstants,
) -> Result<ValidatedTransaction, ValidationError>
where
    V: CoinView + ?Sized,
{
    if bundle.coin_spends.is_empty() {
        return Err(ValidationError::EmptySpendBundle);
    }

    let mut removals = Vec::with_capacity(bundle.coin_spends.len());
    let mut removal_set = HashSet::new();
    let mut additions = Vec::new();
    let mut addition_set = HashSet::new();

    for spend in &bundle.coin_spends {
        let coin_id = spend.coin.coin_id();

        if !removal_set.insert(coin_id) {
            return Err(ValidationError::DoubleSpend(coin_id));
        }

        if spend.coin.amount > constants.max_coin_amount {
            return Err(ValidationError::CoinAmountExceedsMaximum(spend.coin.amount));
        }

        if spend.coin.puzzle_hash != standard_puzzle_hash(&spend.public_key) {
            return Err(ValidationError::WrongPuzzleHash(coin_id));
        }

        for created in &spend.created_coins {
            let created_id = created.coin_id();

            if created.parent_coin_info != coin_id {
                return Err(ValidationError::InvalidCoinDerivation(created_id));
            }

            if created.amount > constants.max_coin_amount {
                return Err(ValidationError::CoinAmountExceedsMaximum(created.amount));
            }

            if !addition_set.insert(created_id) {
                return Err(ValidationError::DuplicateOutput(created_id));
            }

            additions.push(*created);
        }

        removals.push(coin_id);
    }

    for coin_id in &removals {
        match coins.coin_state(coin_id) {
            None => return Err(ValidationError::UnknownCoin(*coin_id)),
            Some(state) if state.is_spent() => {
                return Err(ValidationError::DoubleSpend(*coin_id));
            }
            Some(_) => {}
        }
    }

    for coin in &additions {
        let coin_id = coin.coin_id();
        if coins.coin_state(&coin_id).is_some() {
            return Err(ValidationError::DuplicateOutput(coin_id));
        }
    }

    let fee = bundle.fee().ok_or(ValidationError::MintingCoin)?;

    if fee < u128::from(bundle.reserve_fee) {
        return Err(ValidationError::ReserveFeeNotMet {
            fee,
            reserve_fee: bundle.reserve_fee,
        });
    }

    let fee = u64::try_from(fee).map_err(|_| ValidationError::FeeOutOfRange(fee))?;

    let cost = spend_bundle_cost(bundle, constants);

    if cost > constants.max_block_cost {
        return Err(ValidationError::CostExceedsMax {
            cost,
            max: constants.max_block_cost,
        });
    }

    Ok(ValidatedTransaction {
        name: bundle.name(),
        fee,
        cost,
        removals,
        additions,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chia_bls::{sign, SecretKey, Signature};
    use spare_protocol::{Bytes, Bytes48, Bytes96, CoinSpend};

    use crate::{spend_signature_message, BlsSignatureOracle, CoinState, MAINNET_CONSTANTS};

    use super::*;

    struct Owner {
        secret_key: SecretKey,
        public_key: Bytes48,
    }

    impl Owner {
        fn new(seed: u8) -> Self {
            let secret_key = SecretKey::from_seed(&[seed; 32]);
            let public_key = Bytes48::new(secret_key.public_key().to_bytes());
            Self {
                secret_key,
                public_key,
            }
        }

        fn coin(&self, parent: u8, amount: u64) -> Coin {
            Coin::new(
                Bytes32::new([parent; 32]),
                standard_puzzle_hash(&self.public_key),
                amount,
            )
        }

        fn spend(&self, coin: Coin, outputs: &[u64]) -> CoinSpend {
            let created_coins = outputs
                .iter()
                .map(|&amount| Coin::new(coin.coin_id(), Bytes32::new([7; 32]), amount))
                .collect();
            CoinSpend::new(coin, self.public_key, Bytes::default(), created_coins)
        }

        fn bundle(&self, spends: Vec<CoinSpend>, reserve_fee: u64) -> SpendBundle {
            let mut signature = Signature::default();
            for spend in &spends {
                signature += &sign(
                    &self.secret_key,
                    spend_signature_message(spend, &MAINNET_CONSTANTS),
                );
            }
            SpendBundle::new(spends, reserve_fee, Bytes96::new(signature.to_bytes()))
        }
    }

    fn coin_set(coins: &[Coin]) -> HashMap<Bytes32, CoinState> {
        coins
            .iter()
            .map(|coin| (coin.coin_id(), CoinState::new(*coin, 1, false)))
            .collect()
    }

    fn validate(
        bundle: &SpendBundle,
        coins: &HashMap<Bytes32, CoinState>,
    ) -> Result<ValidatedTransaction, ValidationError> {
        validate_transaction(bundle, coins, &MAINNET_CONSTANTS, &BlsSignatureOracle)
    }

    #[test]
    fn test_valid_transaction() -> anyhow::Result<()> {
        let alice = Owner::new(1);
        let coin = alice.coin(1, 1000);
        let bundle = alice.bundle(vec![alice.spend(coin, &[600, 300])], 50);

        let validated = validate(&bundle, &coin_set(&[coin]))?;
        assert_eq!(validated.name, bundle.name());
        assert_eq!(validated.fee, 100);
        assert_eq!(validated.removals, vec![coin.coin_id()]);
        assert_eq!(validated.additions.len(), 2);
        assert_eq!(validated.cost, spend_bundle_cost(&bundle, &MAINNET_CONSTANTS));
        Ok(())
    }

    #[test]
    fn test_unknown_and_spent_coins() {
        let alice = Owner::new(1);
        let coin = alice.coin(1, 1000);
        let bundle = alice.bundle(vec![alice.spend(coin, &[1000])], 0);

        assert_eq!(
            validate(&bundle, &HashMap::new()),
            Err(ValidationError::UnknownCoin(coin.coin_id()))
        );

        let mut coins = coin_set(&[coin]);
        coins.get_mut(&coin.coin_id()).unwrap().spent_height = Some(2);
        assert_eq!(
            validate(&bundle, &coins),
            Err(ValidationError::DoubleSpend(coin.coin_id()))
        );
    }

    #[test]
    fn test_spending_a_coin_twice_in_one_bundle() {
        let alice = Owner::new(1);
        let coin = alice.coin(1, 1000);
        let bundle = alice.bundle(vec![alice.spend(coin, &[]), alice.spend(coin, &[])], 0);

        assert_eq!(
            validate(&bundle, &coin_set(&[coin])),
            Err(ValidationError::DoubleSpend(coin.coin_id()))
        );
    }

    #[test]
    fn test_ownership() {
        let alice = Owner::new(1);
        let bob = Owner::new(2);
        let coin = alice.coin(1, 1000);
        let bundle = bob.bundle(vec![bob.spend(coin, &[1000])], 0);

        assert_eq!(
            validate(&bundle, &coin_set(&[coin])),
            Err(ValidationError::WrongPuzzleHash(coin.coin_id()))
        );
    }

    #[test]
    fn test_output_derivation() {
        let alice = Owner::new(1);
        let coin = alice.coin(1, 1000);
        let mut spend = alice.spend(coin, &[]);
        let stray = Coin::new(Bytes32::new([9; 32]), Bytes32::default(), 5);
        spend.created_coins.push(stray);
        let bundle = alice.bundle(vec![spend], 0);

        assert_eq!(
            validate(&bundle, &coin_set(&[coin])),
            Err(ValidationError::InvalidCoinDerivation(stray.coin_id()))
        );
    }

    #[test]
    fn test_amounts() {
        let alice = Owner::new(1);
        let coin = alice.coin(1, 1000);
        let coins = coin_set(&[coin]);

        let minting = alice.bundle(vec![alice.spend(coin, &[1001])], 0);
        assert_eq!(validate(&minting, &coins), Err(ValidationError::MintingCoin));

        let reserve = alice.bundle(vec![alice.spend(coin, &[900])], 101);
        assert_eq!(
            validate(&reserve, &coins),
            Err(ValidationError::ReserveFeeNotMet {
                fee: 100,
                reserve_fee: 101
            })
        );
    }

    #[test]
    fn test_signature() {
        let alice = Owner::new(1);
        let coin = alice.coin(1, 1000);
        let mut bundle = alice.bundle(vec![alice.spend(coin, &[1000])], 0);
        bundle.coin_spends[0].created_coins[0].puzzle_hash = Bytes32::new([8; 32]);

        assert_eq!(
            validate(&bundle, &coin_set(&[coin])),
            Err(ValidationError::BadAggregateSignature)
        );
    }

    #[test]
    fn test_check_skips_signature() {
        let alice = Owner::new(1);
        let coin = alice.coin(1, 1000);
        let mut bundle = alice.bundle(vec![alice.spend(coin, &[900])], 0);
        bundle.coin_spends[0].created_coins[0].puzzle_hash = Bytes32::new([8; 32]);

        let validated = check_transaction(&bundle, &coin_set(&[coin]), &MAINNET_CONSTANTS)
            .expect("state checks pass");
        assert_eq!(validated.fee, 100);
        assert_eq!(validated.removals, vec![coin.coin_id()]);

        assert_eq!(
            validate_transaction_signature(&bundle, &MAINNET_CONSTANTS, &BlsSignatureOracle),
            Err(ValidationError::BadAggregateSignature)
        );
    }

    #[test]
    fn test_cost_ceiling() {
        let constants = ConsensusConstants {
            max_block_cost: 1,
            ..*MAINNET_CONSTANTS
        };
        let alice = Owner::new(1);
        let coin = alice.coin(1, 1000);
        let bundle = alice.bundle(vec![alice.spend(coin, &[1000])], 0);

        let result = validate_transaction(&bundle, &coin_set(&[coin]), &constants, &BlsSignatureOracle);
        assert!(matches!(result, Err(ValidationError::CostExceedsMax { max: 1, .. })));
    }
}
