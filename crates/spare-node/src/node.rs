use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{SystemTime, UNIX_EPOCH},
};

use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use spare_blockchain::{
    verify_weight_proof, AddBlockResult, BlockStore, Blockchain, BlockchainError, MemoryStore,
    RejectReason, VerifiedWeightProof,
};
use spare_consensus::{
    pre_validate_block, validate_transaction, BlockRecord, BlsSignatureOracle, CoinState,
    CoinView, ConsensusConstants, PreValidation, ProofOracle, ValidatedTransaction,
};
use spare_mempool::{Mempool, MempoolError, MempoolInclusion};
use spare_protocol::{
    Bytes32, FullBlock, Message, Reject, SpendBundle, Streamable, TransactionAck, WeightProof,
};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info, instrument, warn};

use crate::{NodeConfig, NodeError, VerifierPool};

/// The source of the node's local time, in seconds since the Unix epoch.
pub type Clock = fn() -> u64;

pub fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

/// The `status` of a [`TransactionAck`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MempoolInclusionStatus {
    Success = 1,
    Pending = 2,
    Failed = 3,
}

impl MempoolInclusionStatus {
    pub fn of(inclusion: &MempoolInclusion) -> Self {
        match inclusion {
            MempoolInclusion::Admitted | MempoolInclusion::ReplacesExisting(_) => Self::Success,
            MempoolInclusion::Rejected(error) if error.is_transient() => Self::Pending,
            MempoolInclusion::Rejected(_) => Self::Failed,
        }
    }
}

/// How many times a command is re-verified when the chain moves under it.
const MAX_ATTEMPTS: usize = 4;

/// The peak coin states a transaction's validation reads, keyed by coin id.
type CoinSnapshot = HashMap<Bytes32, CoinState>;

/// Work for the mutation task. Oracle checks are done before a command is sent; the
/// task answers `None` when they no longer hold against the current chain.
enum Command {
    AddBlock {
        block: FullBlock,
        /// `None` only while the parent is unknown.
        pre_validation: Option<PreValidation>,
        respond: oneshot::Sender<Option<Result<AddBlockResult, BlockchainError>>>,
    },
    AddTransaction {
        bundle: SpendBundle,
        validated: ValidatedTransaction,
        snapshot: CoinSnapshot,
        respond: oneshot::Sender<Option<MempoolInclusion>>,
    },
}

#[derive(Debug, Default)]
struct SyncState {
    target: Option<VerifiedWeightProof>,
    /// The claimed weight and cancel flag of the heaviest proof being verified.
    in_flight: Option<(u128, Arc<AtomicBool>)>,
}

/// A full node: the chain, the mempool, and the peer message surface in front of them.
///
/// Every change to the chain or the mempool goes through a single task, fed by a
/// channel, so they are applied one at a time in arrival order. Proof and signature
/// checks run on a bounded [`VerifierPool`] before a block or transaction reaches that
/// task, which never calls an oracle. Readers take a lock on the chain and always
/// observe it before or after a reorg, never partway through one.
#[derive(Debug, Clone)]
pub struct FullNode(Arc<NodeInner>);

#[derive(Debug)]
struct NodeInner {
    config: NodeConfig,
    constants: ConsensusConstants,
    blockchain: Arc<RwLock<Blockchain>>,
    mempool: Arc<Mutex<Mempool>>,
    verifier: VerifierPool,
    commands: mpsc::Sender<Command>,
    sync: Mutex<SyncState>,
    mutation_handle: JoinHandle<()>,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddBlock { block, .. } => write!(f, "AddBlock({})", block.header_hash()),
            Self::AddTransaction { bundle, .. } => write!(f, "AddTransaction({})", bundle.name()),
        }
    }
}

impl FullNode {
    /// Opens the store named by the config and starts the node. Must be called from
    /// within a Tokio runtime.
    pub fn new(config: NodeConfig, proofs: Arc<dyn ProofOracle>) -> Result<Self, NodeError> {
        let store = open_store(&config)?;
        Self::with_store(config, store, proofs, unix_time)
    }

    pub fn with_store(
        config: NodeConfig,
        store: Arc<dyn BlockStore>,
        proofs: Arc<dyn ProofOracle>,
        clock: Clock,
    ) -> Result<Self, NodeError> {
        let constants = config.constants();

        let blockchain = Blockchain::open(
            constants,
            store,
            proofs,
            Arc::new(BlsSignatureOracle),
            clock(),
        )?
        .with_max_reorg_depth(config.max_reorg_depth);

        let mempool = Mempool::new(constants).with_max_total_cost(config.mempool_max_total_cost());

        info!(
            "Starting {:?} node at peak height {:?}",
            config.network,
            blockchain.peak_height()
        );

        let blockchain = Arc::new(RwLock::new(blockchain));
        let mempool = Arc::new(Mutex::new(mempool));
        let (commands, receiver) = mpsc::channel(config.channel_capacity.max(1));

        let mutation_handle = tokio::spawn(apply_commands(
            receiver,
            blockchain.clone(),
            mempool.clone(),
            clock,
        ));

        Ok(Self(Arc::new(NodeInner {
            verifier: VerifierPool::new(config.verifier_threads),
            config,
            constants,
            blockchain,
            mempool,
            commands,
            sync: Mutex::new(SyncState::default()),
            mutation_handle,
        })))
    }

    pub fn config(&self) -> &NodeConfig {
        &self.0.config
    }

    pub fn constants(&self) -> &ConsensusConstants {
        &self.0.constants
    }

    pub fn peak(&self) -> Option<BlockRecord> {
        self.0.blockchain.read().peak().copied()
    }

    pub fn peak_height(&self) -> Option<u32> {
        self.0.blockchain.read().peak_height()
    }

    pub fn get_block(&self, header_hash: &Bytes32) -> Result<Option<FullBlock>, NodeError> {
        Ok(self.0.blockchain.read().get_block(header_hash)?)
    }

    pub fn get_coin_state(&self, coin_id: &Bytes32) -> Option<CoinState> {
        self.0.blockchain.read().get_coin_state(coin_id)
    }

    pub fn mempool_contains(&self, name: &Bytes32) -> bool {
        self.0.mempool.lock().contains(name)
    }

    pub fn mempool_len(&self) -> usize {
        self.0.mempool.lock().len()
    }

    /// Transactions for the next block, best fee rate first.
    pub fn get_for_block(&self, cost_budget: u64) -> Vec<SpendBundle> {
        self.0.mempool.lock().get_for_block(cost_budget)
    }

    /// The heaviest tip a peer's weight proof has convinced us of, if any.
    pub fn sync_target(&self) -> Option<VerifiedWeightProof> {
        self.0.sync.lock().target
    }

    /// Decodes and processes a block sent by a peer.
    pub async fn on_block_received(&self, bytes: &[u8]) -> Result<AddBlockResult, NodeError> {
        self.add_block(FullBlock::from_bytes(bytes)?).await
    }

    /// Decodes a spend bundle sent by a peer and offers it to the mempool.
    pub async fn on_transaction_received(
        &self,
        bytes: &[u8],
    ) -> Result<TransactionAck, NodeError> {
        let bundle = SpendBundle::from_bytes(bytes)?;
        let name = bundle.name();
        let inclusion = self.add_transaction(bundle).await?;
        Ok(transaction_ack(name, &inclusion))
    }

    /// An encoded weight proof of the canonical chain, or a rejection if there is none.
    pub async fn on_weight_proof_requested(&self) -> Result<Vec<u8>, NodeError> {
        let blockchain = self.0.blockchain.clone();
        let proof = self
            .0
            .verifier
            .run(self.0.config.weight_proof_timeout(), move || {
                blockchain.read().build_weight_proof()
            })
            .await??;

        let message = match proof {
            Some(proof) => Message::RespondWeightProof(proof),
            None => Message::Reject(Reject {
                reason: "No blocks yet".to_string(),
            }),
        };
        Ok(message.to_bytes())
    }

    /// Verifies a peer's encoded weight proof and, if it describes a heavier chain than
    /// any seen so far, adopts its tip as the sync target.
    pub async fn sync_from_weight_proof(
        &self,
        bytes: &[u8],
    ) -> Result<VerifiedWeightProof, NodeError> {
        self.verify_weight_proof(WeightProof::from_bytes(bytes)?)
            .await
    }

    /// Dispatches any peer message and returns the encoded reply, if one is due.
    #[instrument(skip_all)]
    pub async fn handle_message(&self, bytes: &[u8]) -> Result<Option<Vec<u8>>, NodeError> {
        match Message::from_bytes(bytes)? {
            Message::NewBlock(block) => match self.add_block(block).await? {
                AddBlockResult::Rejected(reason) => Ok(Some(
                    Message::Reject(Reject {
                        reason: reason.to_string(),
                    })
                    .to_bytes(),
                )),
                _ => Ok(None),
            },
            Message::NewTransaction(bundle) => {
                let name = bundle.name();
                let inclusion = self.add_transaction(bundle).await?;
                Ok(Some(
                    Message::TransactionAck(transaction_ack(name, &inclusion)).to_bytes(),
                ))
            }
            Message::RequestWeightProof(request) => {
                let peak = self.peak().map(|peak| peak.header_hash);
                if request.known_tip.is_some() && request.known_tip == peak {
                    return Ok(Some(
                        Message::Reject(Reject {
                            reason: "Already at this peak".to_string(),
                        })
                        .to_bytes(),
                    ));
                }
                Ok(Some(self.on_weight_proof_requested().await?))
            }
            Message::RespondWeightProof(proof) => {
                self.verify_weight_proof(proof).await?;
                Ok(None)
            }
            Message::TransactionAck(ack) => {
                debug!("Transaction {} acknowledged with status {}", ack.txid, ack.status);
                Ok(None)
            }
            Message::Reject(reject) => {
                warn!("Peer rejected our message: {}", reject.reason);
                Ok(None)
            }
        }
    }

    /// Checks a block's proofs and signatures on the verifier pool, then hands it to the
    /// mutation task. Transactions of blocks a reorg disconnected are offered back to
    /// the mempool before this returns.
    #[instrument(skip_all, fields(height = block.height()))]
    pub async fn add_block(&self, block: FullBlock) -> Result<AddBlockResult, NodeError> {
        let header_hash = block.header_hash();
        let prev_hash = block.prev_header_hash();

        for _ in 0..MAX_ATTEMPTS {
            let (already_have, prev, proofs, signatures) = {
                let chain = self.0.blockchain.read();
                (
                    chain.contains_block(&header_hash),
                    chain.get_block_record(&prev_hash).copied(),
                    chain.proof_oracle(),
                    chain.signature_oracle(),
                )
            };

            if already_have {
                return Ok(AddBlockResult::AlreadyHave);
            }

            let pre_validation =
                if prev.is_some() || prev_hash == self.0.constants.genesis_challenge {
                    let constants = self.0.constants;
                    let candidate = block.clone();
                    let outcome = self
                        .0
                        .verifier
                        .run(self.0.config.oracle_timeout(), move || {
                            pre_validate_block(
                                &candidate,
                                prev.as_ref(),
                                &constants,
                                proofs.as_ref(),
                                signatures.as_ref(),
                            )
                        })
                        .await?;

                    match outcome {
                        Ok(pre_validation) => Some(pre_validation),
                        Err(error) => {
                            warn!("Rejected block {header_hash}: {error}");
                            return Ok(AddBlockResult::Rejected(RejectReason::Validation(error)));
                        }
                    }
                } else {
                    None
                };

            let (respond, response) = oneshot::channel();
            self.send(Command::AddBlock {
                block: block.clone(),
                pre_validation,
                respond,
            })
            .await?;

            match response.await.map_err(|_| NodeError::Shutdown)? {
                Some(result) => {
                    let result = result?;
                    if let AddBlockResult::Accepted(Some(change)) = &result {
                        self.readmit(change.disconnected_transactions.clone()).await;
                    }
                    return Ok(result);
                }
                None => debug!("Parent of block {header_hash} arrived, pre-validating again"),
            }
        }

        Err(NodeError::ChainMoved)
    }

    /// Validates a transaction on the verifier pool against a snapshot of the peak's
    /// coins, then hands it to the mutation task, which admits it only if those coins
    /// are unchanged.
    pub async fn add_transaction(&self, bundle: SpendBundle) -> Result<MempoolInclusion, NodeError> {
        let name = bundle.name();

        for _ in 0..MAX_ATTEMPTS {
            if self.mempool_contains(&name) {
                return Ok(MempoolInclusion::Rejected(MempoolError::AlreadyIncluded(name)));
            }

            let (snapshot, signatures) = {
                let chain = self.0.blockchain.read();
                (coin_snapshot(&chain, &bundle), chain.signature_oracle())
            };

            let constants = self.0.constants;
            let candidate = bundle.clone();
            let (snapshot, outcome) = self
                .0
                .verifier
                .run(self.0.config.oracle_timeout(), move || {
                    let outcome = validate_transaction(
                        &candidate,
                        &snapshot,
                        &constants,
                        signatures.as_ref(),
                    );
                    (snapshot, outcome)
                })
                .await?;

            let validated = match outcome {
                Ok(validated) => validated,
                Err(error) => {
                    debug!("Rejected transaction {name}: {error}");
                    return Ok(MempoolInclusion::Rejected(error.into()));
                }
            };

            let (respond, response) = oneshot::channel();
            self.send(Command::AddTransaction {
                bundle: bundle.clone(),
                validated,
                snapshot,
                respond,
            })
            .await?;

            match response.await.map_err(|_| NodeError::Shutdown)? {
                Some(inclusion) => return Ok(inclusion),
                None => debug!("Coins of transaction {name} changed, validating again"),
            }
        }

        Err(NodeError::ChainMoved)
    }

    /// Offers the transactions of disconnected blocks back to the mempool.
    async fn readmit(&self, disconnected: Vec<SpendBundle>) {
        if disconnected.is_empty() {
            return;
        }

        let offered = disconnected.len();
        let mut readmitted = 0;
        for bundle in disconnected {
            let name = bundle.name();
            match self.add_transaction(bundle).await {
                Ok(inclusion) if inclusion.is_admitted() => readmitted += 1,
                Ok(_) => {}
                Err(error) => warn!("Could not re-admit transaction {name}: {error}"),
            }
        }

        info!("Re-admitted {readmitted} of {offered} disconnected transactions");
    }

    async fn send(&self, command: Command) -> Result<(), NodeError> {
        self.0
            .commands
            .send(command)
            .await
            .map_err(|_| NodeError::Shutdown)
    }

    /// Verifies a weight proof, cancelling any in-flight verification of a proof that
    /// claims less weight.
    async fn verify_weight_proof(
        &self,
        proof: WeightProof,
    ) -> Result<VerifiedWeightProof, NodeError> {
        let claimed_weight = proof.tip().map_or(0, |tip| tip.weight);
        let cancel = Arc::new(AtomicBool::new(false));

        {
            let mut sync = self.0.sync.lock();
            let supersedes = match &sync.in_flight {
                Some((weight, flag)) if *weight < claimed_weight => {
                    flag.store(true, Ordering::Relaxed);
                    true
                }
                Some(_) => false,
                None => true,
            };
            if supersedes {
                sync.in_flight = Some((claimed_weight, cancel.clone()));
            }
        }

        let constants = self.0.constants;
        let proofs = self.0.blockchain.read().proof_oracle();
        let result = self
            .0
            .verifier
            .run_cancellable(
                self.0.config.weight_proof_timeout(),
                cancel.clone(),
                move |cancel| verify_weight_proof(&proof, &constants, proofs.as_ref(), cancel),
            )
            .await;

        let mut sync = self.0.sync.lock();
        if sync
            .in_flight
            .as_ref()
            .is_some_and(|(_, flag)| Arc::ptr_eq(flag, &cancel))
        {
            sync.in_flight = None;
        }

        let verified = match result {
            Ok(Ok(verified)) => verified,
            Ok(Err(error)) => {
                warn!("Weight proof rejected: {error}");
                return Err(error.into());
            }
            Err(error) => return Err(error),
        };

        if !matches!(sync.target, Some(target) if target.weight >= verified.weight) {
            info!(
                "New sync target at height {} weight {}",
                verified.height, verified.weight
            );
            sync.target = Some(verified);
        }

        Ok(verified)
    }
}

impl Drop for NodeInner {
    fn drop(&mut self) {
        self.mutation_handle.abort();
    }
}

fn open_store(config: &NodeConfig) -> Result<Arc<dyn BlockStore>, NodeError> {
    match &config.database_path {
        None => Ok(Arc::new(MemoryStore::new())),
        #[cfg(feature = "sled")]
        Some(path) => Ok(Arc::new(spare_blockchain::SledStore::open(path)?)),
        #[cfg(not(feature = "sled"))]
        Some(_) => Err(NodeError::PersistenceUnavailable),
    }
}

fn transaction_ack(name: Bytes32, inclusion: &MempoolInclusion) -> TransactionAck {
    let error = match inclusion {
        MempoolInclusion::Rejected(error) => Some(error.to_string()),
        _ => None,
    };
    TransactionAck::new(name, MempoolInclusionStatus::of(inclusion) as u8, error)
}

/// The peak's state of every coin `bundle` spends or creates.
fn coin_snapshot(chain: &Blockchain, bundle: &SpendBundle) -> CoinSnapshot {
    let coins = chain.peak_spend_set();
    bundle
        .removals()
        .chain(bundle.additions())
        .filter_map(|coin| {
            let coin_id = coin.coin_id();
            coins.coin_state(&coin_id).map(|state| (coin_id, state))
        })
        .collect()
}

async fn apply_commands(
    mut commands: mpsc::Receiver<Command>,
    blockchain: Arc<RwLock<Blockchain>>,
    mempool: Arc<Mutex<Mempool>>,
    clock: Clock,
) {
    while let Some(command) = commands.recv().await {
        match command {
            Command::AddBlock {
                block,
                pre_validation,
                respond,
            } => {
                let result = apply_block(
                    &blockchain,
                    &mempool,
                    &block,
                    pre_validation.as_ref(),
                    clock(),
                );
                if let Some(Err(error)) = &result {
                    warn!("Failed to add block {}: {error}", block.header_hash());
                }
                respond.send(result).ok();
            }
            Command::AddTransaction {
                bundle,
                validated,
                snapshot,
                respond,
            } => {
                let chain = blockchain.read();
                let inclusion = (coin_snapshot(&chain, &bundle) == snapshot)
                    .then(|| mempool.lock().add_validated(bundle, validated));
                respond.send(inclusion).ok();
            }
        }
    }
}

/// Commits a pre-validated block. Returns `None` if the block arrived without
/// pre-validation but its parent is now known, so it has to be pre-validated first.
fn apply_block(
    blockchain: &RwLock<Blockchain>,
    mempool: &Mutex<Mempool>,
    block: &FullBlock,
    pre_validation: Option<&PreValidation>,
    now: u64,
) -> Option<Result<AddBlockResult, BlockchainError>> {
    let mut chain = blockchain.write();

    let result = match pre_validation {
        Some(pre_validation) => chain.add_prevalidated_block(block, pre_validation, now),
        None if chain.contains_block(&block.header_hash()) => Ok(AddBlockResult::AlreadyHave),
        None if chain.contains_block(&block.prev_header_hash())
            || block.prev_header_hash() == chain.constants().genesis_challenge =>
        {
            return None;
        }
        None => {
            debug!("Orphaned block {}", block.header_hash());
            Ok(AddBlockResult::Orphaned)
        }
    };

    if let Ok(AddBlockResult::Accepted(Some(_))) = &result {
        let chain = RwLockWriteGuard::downgrade(chain);
        let dropped = mempool
            .lock()
            .remove_stale(chain.peak_height(), &chain.peak_spend_set());
        if !dropped.is_empty() {
            debug!("Dropped {} mempool items at the new peak", dropped.len());
        }
    }

    Some(result)
}
