use std::{sync::Arc, time::Duration};

use spare_blockchain::{AddBlockResult, BlockStore, MemoryStore, RejectReason, WeightProofError};
use spare_consensus::ValidationError;
use spare_node::{FullNode, MempoolInclusionStatus, Network, NodeConfig, NodeError};
use spare_protocol::{
    Bytes, Bytes32, Coin, ErrorKind, FullBlock, Message, RequestWeightProof, Streamable,
    WeightProof,
};
use spare_test::{
    sign_spends, spend_coin, transfer, BlockOptions, BlockTools, BlsPair, MockProofOracle,
    TEST_NOW,
};

fn simulator_config() -> NodeConfig {
    NodeConfig {
        network: Network::Simulator,
        ..Default::default()
    }
}

fn start(
    config: NodeConfig,
    store: Arc<dyn BlockStore>,
    proofs: MockProofOracle,
) -> anyhow::Result<FullNode> {
    Ok(FullNode::with_store(config, store, Arc::new(proofs), || TEST_NOW)?)
}

fn start_simulator() -> anyhow::Result<FullNode> {
    start(
        simulator_config(),
        Arc::new(MemoryStore::new()),
        MockProofOracle::new(),
    )
}

async fn sync_blocks(node: &FullNode, blocks: &[FullBlock]) -> anyhow::Result<()> {
    for block in blocks {
        let result = node.on_block_received(&block.to_bytes()).await?;
        assert!(result.is_new_peak(), "{result:?}");
    }
    Ok(())
}

async fn weight_proof_bytes(node: &FullNode) -> anyhow::Result<Vec<u8>> {
    let Message::RespondWeightProof(proof) =
        Message::from_bytes(&node.on_weight_proof_requested().await?)?
    else {
        panic!("expected a weight proof");
    };
    Ok(proof.to_bytes())
}

#[tokio::test]
async fn test_blocks_from_bytes() -> anyhow::Result<()> {
    let node = start_simulator()?;
    let mut tools = BlockTools::new(simulator_config().constants());
    let blocks = tools.chain(5);

    sync_blocks(&node, &blocks).await?;

    assert_eq!(node.peak_height(), Some(4));
    assert_eq!(node.peak().unwrap().header_hash, blocks[4].header_hash());
    assert_eq!(node.get_block(&blocks[2].header_hash())?, Some(blocks[2].clone()));
    assert_eq!(
        node.on_block_received(&blocks[2].to_bytes()).await?,
        AddBlockResult::AlreadyHave
    );

    let orphan = tools.extend(Some(blocks[4].header_hash()), 2).pop().unwrap();
    assert_eq!(
        node.on_block_received(&orphan.to_bytes()).await?,
        AddBlockResult::Orphaned
    );
    Ok(())
}

#[tokio::test]
async fn test_malformed_payloads() -> anyhow::Result<()> {
    let node = start_simulator()?;

    let error = node.on_block_received(&[1, 2, 3]).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::MalformedEncoding);
    assert!(error.kind().should_penalize());

    let error = node.handle_message(&[42]).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::ValueOutOfRange);

    let error = node.on_transaction_received(&[]).await.unwrap_err();
    assert!(matches!(error, NodeError::Streamable(_)));
    Ok(())
}

#[tokio::test]
async fn test_invalid_block_gets_reject_reply() -> anyhow::Result<()> {
    let node = start_simulator()?;
    let mut tools = BlockTools::new(simulator_config().constants());
    let blocks = tools.chain(2);
    sync_blocks(&node, &blocks[..1]).await?;

    let mut bad = blocks[1].clone();
    bad.header.challenge_vdf_proof.witness = Bytes::new(vec![0; 32]);

    let reply = node
        .handle_message(&Message::NewBlock(bad.clone()).to_bytes())
        .await?
        .unwrap();
    let Message::Reject(reject) = Message::from_bytes(&reply)? else {
        panic!("expected a rejection");
    };
    assert!(reject.reason.contains("proof of time"), "{}", reject.reason);
    assert_eq!(node.get_block(&bad.header_hash())?, None);

    assert_eq!(
        node.handle_message(&Message::NewBlock(blocks[1].clone()).to_bytes())
            .await?,
        None
    );
    assert_eq!(node.peak_height(), Some(1));
    Ok(())
}

#[tokio::test]
async fn test_transactions() -> anyhow::Result<()> {
    let alice = BlsPair::new(0);
    let bob = BlsPair::new(1);
    let node = start_simulator()?;
    let mut tools =
        BlockTools::new(simulator_config().constants()).with_reward_puzzle_hash(alice.puzzle_hash);
    let constants = *tools.constants();

    let blocks = tools.chain(3);
    sync_blocks(&node, &blocks).await?;

    let [coin, _] = tools.record(&blocks[1].header_hash()).reward_coins(&constants);
    let bundle = transfer(&alice, coin, &[(bob.puzzle_hash, coin.amount - 10)], &constants);

    let ack = node.on_transaction_received(&bundle.to_bytes()).await?;
    assert_eq!(ack.txid, bundle.name());
    assert_eq!(ack.status, MempoolInclusionStatus::Success as u8);
    assert_eq!(ack.error, None);

    let ack = node.on_transaction_received(&bundle.to_bytes()).await?;
    assert_eq!(ack.status, MempoolInclusionStatus::Failed as u8);
    assert!(ack.error.is_some());

    let unknown = Coin::new(Bytes32::new([5; 32]), alice.puzzle_hash, 100);
    let pending = transfer(&alice, unknown, &[], &constants);
    let reply = node
        .handle_message(&Message::NewTransaction(pending).to_bytes())
        .await?
        .unwrap();
    let Message::TransactionAck(ack) = Message::from_bytes(&reply)? else {
        panic!("expected an ack");
    };
    assert_eq!(ack.status, MempoolInclusionStatus::Pending as u8);

    assert_eq!(node.mempool_len(), 1);
    assert_eq!(node.get_for_block(u64::MAX), vec![bundle.clone()]);

    let block = tools.create_block(
        Some(blocks[2].header_hash()),
        BlockOptions::with_transactions(node.get_for_block(u64::MAX)),
    );
    sync_blocks(&node, &[block]).await?;

    assert!(!node.mempool_contains(&bundle.name()));
    assert_eq!(node.get_coin_state(&coin.coin_id()).unwrap().spent_height, Some(3));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_transactions() -> anyhow::Result<()> {
    let alice = BlsPair::new(0);
    let node = start_simulator()?;
    let mut tools =
        BlockTools::new(simulator_config().constants()).with_reward_puzzle_hash(alice.puzzle_hash);
    let constants = *tools.constants();

    let blocks = tools.chain(4);
    sync_blocks(&node, &blocks).await?;

    let mut handles = Vec::new();
    for block in &blocks[1..] {
        for coin in tools.record(&block.header_hash()).reward_coins(&constants) {
            let bundle = transfer(&alice, coin, &[(alice.puzzle_hash, coin.amount - 1)], &constants);
            let node = node.clone();
            handles.push(tokio::spawn(async move { node.add_transaction(bundle).await }));
        }
    }

    for handle in handles {
        assert!(handle.await??.is_admitted());
    }
    assert_eq!(node.mempool_len(), 6);
    Ok(())
}

#[tokio::test]
async fn test_reorg_readmits_transactions() -> anyhow::Result<()> {
    let [alice, bob] = BlsPair::range::<2>();
    let node = start_simulator()?;
    let mut tools =
        BlockTools::new(simulator_config().constants()).with_reward_puzzle_hash(alice.puzzle_hash);
    let constants = *tools.constants();

    let blocks = tools.chain(3);
    sync_blocks(&node, &blocks).await?;

    let [coin, _] = tools.record(&blocks[1].header_hash()).reward_coins(&constants);
    let bundle = transfer(&alice, coin, &[(bob.puzzle_hash, coin.amount - 10)], &constants);
    let confirming = tools.create_block(
        Some(blocks[2].header_hash()),
        BlockOptions::with_transactions(vec![bundle.clone()]),
    );
    sync_blocks(&node, &[confirming]).await?;
    assert!(!node.mempool_contains(&bundle.name()));

    let fork = tools.extend_with_seed(Some(blocks[2].header_hash()), 2, 1);
    assert!(matches!(
        node.add_block(fork[0].clone()).await?,
        AddBlockResult::Accepted(_)
    ));
    assert!(node.add_block(fork[1].clone()).await?.is_new_peak());

    assert_eq!(node.peak().unwrap().header_hash, fork[1].header_hash());
    assert_eq!(node.get_coin_state(&coin.coin_id()).unwrap().spent_height, None);
    assert!(node.mempool_contains(&bundle.name()));
    Ok(())
}

#[tokio::test]
async fn test_forged_block_signature() -> anyhow::Result<()> {
    let [alice, bob] = BlsPair::range::<2>();
    let node = start_simulator()?;
    let mut tools =
        BlockTools::new(simulator_config().constants()).with_reward_puzzle_hash(alice.puzzle_hash);
    let constants = *tools.constants();

    let blocks = tools.chain(3);
    sync_blocks(&node, &blocks).await?;

    let [coin, _] = tools.record(&blocks[1].header_hash()).reward_coins(&constants);
    let forged = sign_spends(
        vec![spend_coin(&alice, coin, &[(bob.puzzle_hash, coin.amount)])],
        &[&bob],
        0,
        &constants,
    );
    let block = tools.create_block(
        Some(blocks[2].header_hash()),
        BlockOptions::with_transactions(vec![forged.clone()]),
    );

    let result = node.add_block(block.clone()).await?;
    assert!(matches!(
        result,
        AddBlockResult::Rejected(RejectReason::Validation(
            ValidationError::BadAggregateSignature
        ))
    ));
    assert_eq!(node.get_block(&block.header_hash())?, None);
    assert_eq!(node.peak_height(), Some(2));

    let ack = node.on_transaction_received(&forged.to_bytes()).await?;
    assert_eq!(ack.status, MempoolInclusionStatus::Failed as u8);
    assert_eq!(node.mempool_len(), 0);
    Ok(())
}

#[tokio::test]
async fn test_orphan_is_pre_validated_once_parent_arrives() -> anyhow::Result<()> {
    let node = start_simulator()?;
    let mut tools = BlockTools::new(simulator_config().constants());
    let blocks = tools.chain(3);
    sync_blocks(&node, &blocks[..1]).await?;

    assert_eq!(node.add_block(blocks[2].clone()).await?, AddBlockResult::Orphaned);
    assert_eq!(node.get_block(&blocks[2].header_hash())?, None);

    sync_blocks(&node, &blocks[1..]).await?;
    assert_eq!(node.peak_height(), Some(2));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_transactions_proceed_during_slow_block_checks() -> anyhow::Result<()> {
    let alice = BlsPair::new(0);
    let config = NodeConfig {
        verifier_threads: 2,
        ..simulator_config()
    };
    let node = start(
        config,
        Arc::new(MemoryStore::new()),
        MockProofOracle::with_delay(Duration::from_millis(100)),
    )?;
    let mut tools =
        BlockTools::new(simulator_config().constants()).with_reward_puzzle_hash(alice.puzzle_hash);
    let constants = *tools.constants();

    let blocks = tools.chain(3);
    sync_blocks(&node, &blocks).await?;

    let next = tools.extend(Some(blocks[2].header_hash()), 1).remove(0);
    let adding = node.clone();
    let block_task = tokio::spawn(async move { adding.add_block(next).await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let [coin, _] = tools.record(&blocks[1].header_hash()).reward_coins(&constants);
    let bundle = transfer(&alice, coin, &[(alice.puzzle_hash, coin.amount - 1)], &constants);
    assert!(node.add_transaction(bundle).await?.is_admitted());
    assert_eq!(node.peak_height(), Some(2));
    assert!(!block_task.is_finished());

    assert!(block_task.await??.is_new_peak());
    assert_eq!(node.mempool_len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_weight_proof_exchange() -> anyhow::Result<()> {
    let serving = start_simulator()?;
    let syncing = start_simulator()?;

    let reply = serving
        .handle_message(&Message::RequestWeightProof(RequestWeightProof { known_tip: None }).to_bytes())
        .await?
        .unwrap();
    assert!(matches!(Message::from_bytes(&reply)?, Message::Reject(_)));

    let mut tools = BlockTools::new(simulator_config().constants());
    sync_blocks(&serving, &tools.chain(100)).await?;
    let peak = serving.peak().unwrap();

    let reply = serving
        .handle_message(&Message::RequestWeightProof(RequestWeightProof { known_tip: None }).to_bytes())
        .await?
        .unwrap();
    assert_eq!(syncing.handle_message(&reply).await?, None);

    let target = syncing.sync_target().unwrap();
    assert_eq!(target.tip, peak.header_hash);
    assert_eq!(target.height, 99);
    assert_eq!(target.weight, peak.weight);

    let reply = serving
        .handle_message(
            &Message::RequestWeightProof(RequestWeightProof {
                known_tip: Some(peak.header_hash),
            })
            .to_bytes(),
        )
        .await?
        .unwrap();
    assert!(matches!(Message::from_bytes(&reply)?, Message::Reject(_)));
    Ok(())
}

#[tokio::test]
async fn test_tampered_weight_proof() -> anyhow::Result<()> {
    let serving = start_simulator()?;
    let syncing = start_simulator()?;
    let mut tools = BlockTools::new(simulator_config().constants());
    sync_blocks(&serving, &tools.chain(50)).await?;

    let mut proof = WeightProof::from_bytes(&weight_proof_bytes(&serving).await?)?;
    proof.samples[3].challenge_vdf_proof.witness = Bytes::new(vec![0; 32]);

    let error = syncing
        .sync_from_weight_proof(&proof.to_bytes())
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::ProtocolViolation);
    assert!(syncing.sync_target().is_none());
    Ok(())
}

#[tokio::test]
async fn test_oracle_timeout() -> anyhow::Result<()> {
    let config = NodeConfig {
        oracle_timeout_ms: 10,
        ..simulator_config()
    };
    let node = start(
        config,
        Arc::new(MemoryStore::new()),
        MockProofOracle::with_delay(Duration::from_millis(200)),
    )?;
    let mut tools = BlockTools::new(simulator_config().constants());

    let error = node
        .on_block_received(&tools.chain(1)[0].to_bytes())
        .await
        .unwrap_err();
    assert!(matches!(error, NodeError::Timeout(_)));
    assert!(error.kind().is_recoverable());
    assert_eq!(node.peak(), None);
    Ok(())
}

#[tokio::test]
async fn test_weight_proof_timeout() -> anyhow::Result<()> {
    let serving = start_simulator()?;
    let mut tools = BlockTools::new(simulator_config().constants());
    sync_blocks(&serving, &tools.chain(100)).await?;

    let config = NodeConfig {
        weight_proof_timeout_ms: 50,
        ..simulator_config()
    };
    let syncing = start(
        config,
        Arc::new(MemoryStore::new()),
        MockProofOracle::with_delay(Duration::from_millis(20)),
    )?;

    let error = syncing
        .sync_from_weight_proof(&weight_proof_bytes(&serving).await?)
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Timeout);
    assert!(syncing.sync_target().is_none());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_heavier_proof_cancels_lighter() -> anyhow::Result<()> {
    let light = start_simulator()?;
    let heavy = start_simulator()?;
    sync_blocks(&light, &BlockTools::new(simulator_config().constants()).chain(40)).await?;
    sync_blocks(&heavy, &BlockTools::new(simulator_config().constants()).chain(100)).await?;

    let syncing = start(
        simulator_config(),
        Arc::new(MemoryStore::new()),
        MockProofOracle::with_delay(Duration::from_millis(5)),
    )?;

    let light_proof = weight_proof_bytes(&light).await?;
    let heavy_proof = weight_proof_bytes(&heavy).await?;

    let first = syncing.clone();
    let light_sync =
        tokio::spawn(async move { first.sync_from_weight_proof(&light_proof).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let verified = syncing.sync_from_weight_proof(&heavy_proof).await?;
    assert_eq!(verified.height, 99);

    let error = light_sync.await?.unwrap_err();
    assert!(matches!(
        error,
        NodeError::WeightProof(WeightProofError::Cancelled)
    ));
    assert_eq!(error.kind(), ErrorKind::Cancelled);
    assert_eq!(syncing.sync_target(), Some(verified));
    Ok(())
}

#[tokio::test]
async fn test_restart_from_store() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let mut tools = BlockTools::new(simulator_config().constants());
    let blocks = tools.chain(10);

    let node = start(simulator_config(), store.clone(), MockProofOracle::new())?;
    sync_blocks(&node, &blocks).await?;
    let peak = node.peak();
    drop(node);

    let restarted = start(simulator_config(), store, MockProofOracle::new())?;
    assert_eq!(restarted.peak(), peak);
    assert_eq!(
        restarted.on_block_received(&blocks[9].to_bytes()).await?,
        AddBlockResult::AlreadyHave
    );
    Ok(())
}

#[cfg(not(feature = "sled"))]
#[tokio::test]
async fn test_database_path_requires_sled() {
    let config = NodeConfig {
        database_path: Some("/tmp/spare-node-test".into()),
        ..simulator_config()
    };
    let error = FullNode::new(config, Arc::new(MockProofOracle::new())).unwrap_err();
    assert!(matches!(error, NodeError::PersistenceUnavailable));
}
