use std::sync::Arc;

use spare_blockchain::{AddBlockResult, Blockchain, MemoryStore};
use spare_consensus::{simulator_constants, BlsSignatureOracle};
use spare_mempool::{Mempool, MempoolInclusion};
use spare_test::{transfer, BlockOptions, BlockTools, BlsPair, MockProofOracle, TEST_NOW};

#[test]
fn test_reorg_updates_mempool() -> anyhow::Result<()> {
    let alice = BlsPair::new(0);
    let bob = BlsPair::new(1);
    let mut tools =
        BlockTools::new(simulator_constants()).with_reward_puzzle_hash(alice.puzzle_hash);
    let constants = *tools.constants();

    let mut chain = Blockchain::new(
        constants,
        Arc::new(MemoryStore::new()),
        Arc::new(MockProofOracle::new()),
        Arc::new(BlsSignatureOracle),
    );
    let mut mempool = Mempool::new(constants);

    let main = tools.chain(3);
    let [first, second] = tools.record(&main[1].header_hash()).reward_coins(&constants);
    let [third, _] = tools.record(&main[2].header_hash()).reward_coins(&constants);

    // Confirmed on the chain that is about to be disconnected.
    let confirmed = transfer(&alice, second, &[(bob.puzzle_hash, 1)], &constants);
    let doomed = tools.create_block(
        Some(main[2].header_hash()),
        BlockOptions::with_transactions(vec![confirmed.clone()]),
    );

    for block in main.iter().chain([&doomed]) {
        assert!(chain.add_block(block, TEST_NOW)?.is_new_peak());
    }

    let pending = transfer(&alice, first, &[(alice.puzzle_hash, first.amount - 10)], &constants);
    let unrelated = transfer(&alice, third, &[(alice.puzzle_hash, third.amount - 10)], &constants);
    let peak_coins = chain.peak_spend_set();
    assert_eq!(
        mempool.try_add(pending.clone(), &peak_coins, &BlsSignatureOracle),
        MempoolInclusion::Admitted
    );
    assert_eq!(
        mempool.try_add(unrelated.clone(), &peak_coins, &BlsSignatureOracle),
        MempoolInclusion::Admitted
    );

    // The heavier fork confirms a competing spend of the pending transaction's coin.
    let competing = transfer(&alice, first, &[(bob.puzzle_hash, 5)], &constants);
    let mut fork = vec![tools.create_block(
        Some(main[2].header_hash()),
        BlockOptions {
            transactions: vec![competing],
            plot_seed: 1,
            ..Default::default()
        },
    )];
    fork.extend(tools.extend_with_seed(Some(fork[0].header_hash()), 1, 1));

    assert_eq!(chain.add_block(&fork[0], TEST_NOW)?, AddBlockResult::Accepted(None));
    let AddBlockResult::Accepted(Some(change)) = chain.add_block(&fork[1], TEST_NOW)? else {
        panic!("expected the fork to become the peak");
    };
    assert_eq!(change.disconnected, vec![doomed.header_hash()]);
    assert_eq!(change.disconnected_transactions, vec![confirmed.clone()]);

    let dropped = mempool.new_peak(
        chain.peak_height(),
        &chain.peak_spend_set(),
        change.disconnected_transactions,
        &BlsSignatureOracle,
    );

    assert_eq!(dropped, vec![pending.name()]);
    assert!(mempool.contains(&unrelated.name()));
    assert!(mempool.contains(&confirmed.name()));
    assert_eq!(mempool.len(), 2);

    Ok(())
}
