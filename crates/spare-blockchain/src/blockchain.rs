use std::{fmt, sync::Arc};

use spare_consensus::{
    validate_block, validate_prevalidated_block, BlockContext, BlockRecord, BlockRecords,
    CoinState, ConsensusConstants, PreValidation, ProofOracle, SignatureOracle, ValidationError,
};
use spare_protocol::{Bytes32, Coin, ErrorKind, FullBlock, Header, SpendBundle, Streamable};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::{
    BlockIndex, BlockStore, BlockchainError, ChainComparison, CoinStore, ForkPath, SpendSet,
};

const PEAK_KEY: &[u8] = b"peak";
const SEEN_COUNT_KEY: &[u8] = b"seen_count";

fn block_key(header_hash: &Bytes32) -> Vec<u8> {
    [b"block".as_slice(), header_hash.as_ref()].concat()
}

fn seen_key(index: u64) -> Vec<u8> {
    [b"seen".as_slice(), index.to_be_bytes().as_slice()].concat()
}

/// What changed when the peak moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChangeSummary {
    pub peak: BlockRecord,
    /// Height of the last block shared by the old and new chains, if any.
    pub fork_height: Option<u32>,
    /// Blocks removed from the canonical chain, from the old peak down.
    pub disconnected: Vec<Bytes32>,
    /// Blocks added to the canonical chain, in ascending height.
    pub connected: Vec<Bytes32>,
    /// Coins spent by the connected blocks.
    pub removals: Vec<Bytes32>,
    /// Coins created by the connected blocks, including rewards.
    pub additions: Vec<Coin>,
    /// Transactions of the disconnected blocks, which may be valid again.
    pub disconnected_transactions: Vec<SpendBundle>,
}

impl StateChangeSummary {
    pub fn is_reorg(&self) -> bool {
        !self.disconnected.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("Invalid block: {0}")]
    Validation(#[from] ValidationError),

    #[error("Reorg of depth {depth} exceeds the maximum of {max}")]
    ReorgTooDeep { depth: usize, max: u32 },
}

impl RejectReason {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(error) => error.kind(),
            Self::ReorgTooDeep { .. } => ErrorKind::ProtocolViolation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddBlockResult {
    /// The block is valid and was stored. Carries the state change if it became the peak.
    Accepted(Option<StateChangeSummary>),
    /// The block was already stored.
    AlreadyHave,
    /// The block's parent is unknown. Nothing was stored.
    Orphaned,
    /// Nothing was stored.
    Rejected(RejectReason),
}

impl AddBlockResult {
    pub fn is_new_peak(&self) -> bool {
        matches!(self, Self::Accepted(Some(_)))
    }
}

/// The block tree, the canonical chain through it, and the coin set at its peak.
///
/// Every method that mutates state either completes or leaves the chain exactly as it
/// was, so a caller holding it behind a lock never exposes a partially applied reorg.
pub struct Blockchain {
    constants: ConsensusConstants,
    store: Arc<dyn BlockStore>,
    proofs: Arc<dyn ProofOracle>,
    signatures: Arc<dyn SignatureOracle>,
    index: BlockIndex,
    height_to_hash: Vec<Bytes32>,
    coins: CoinStore,
    /// The arrival index the next persisted block is stored under.
    seen_count: u64,
    max_reorg_depth: Option<u32>,
}

impl fmt::Debug for Blockchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blockchain")
            .field("blocks", &self.index.len())
            .field("peak", &self.peak())
            .field("max_reorg_depth", &self.max_reorg_depth)
            .finish_non_exhaustive()
    }
}

impl Blockchain {
    pub fn new(
        constants: ConsensusConstants,
        store: Arc<dyn BlockStore>,
        proofs: Arc<dyn ProofOracle>,
        signatures: Arc<dyn SignatureOracle>,
    ) -> Self {
        Self {
            constants,
            store,
            proofs,
            signatures,
            index: BlockIndex::new(),
            height_to_hash: Vec::new(),
            coins: CoinStore::new(),
            seen_count: 0,
            max_reorg_depth: None,
        }
    }

    /// Rebuilds the chain from the blocks in `store`, replaying them in the order they
    /// were originally accepted.
    #[instrument(skip_all)]
    pub fn open(
        constants: ConsensusConstants,
        store: Arc<dyn BlockStore>,
        proofs: Arc<dyn ProofOracle>,
        signatures: Arc<dyn SignatureOracle>,
        now: u64,
    ) -> Result<Self, BlockchainError> {
        let mut chain = Self::new(constants, store, proofs, signatures);

        let seen_count = match chain.store.get(SEEN_COUNT_KEY)? {
            Some(bytes) => u64::from_bytes(&bytes)?,
            None => return Ok(chain),
        };

        for index in 0..seen_count {
            let bytes = chain
                .store
                .get(&seen_key(index))?
                .ok_or(BlockchainError::MissingArrivalEntry(index))?;
            let header_hash = Bytes32::from_bytes(&bytes)?;
            let block = chain.load_block(&header_hash)?;

            let result = chain.receive_block(&block, None, now, false)?;
            if let AddBlockResult::Rejected(reason) = result {
                warn!("Stored block {header_hash} no longer validates: {reason}");
            }
        }

        chain.seen_count = seen_count;

        if let Some(bytes) = chain.store.get(PEAK_KEY)? {
            let stored_peak = Bytes32::from_bytes(&bytes)?;
            if chain.peak().map(|peak| peak.header_hash) != Some(stored_peak) {
                warn!("Replayed peak differs from stored peak {stored_peak}");
            }
        }

        info!(
            "Loaded {} blocks, peak height {:?}",
            chain.index.len(),
            chain.peak_height()
        );

        Ok(chain)
    }

    /// Rejects blocks that would undo more than `depth` blocks of the canonical chain.
    #[must_use]
    pub fn with_max_reorg_depth(mut self, depth: Option<u32>) -> Self {
        self.max_reorg_depth = depth;
        self
    }

    pub fn constants(&self) -> &ConsensusConstants {
        &self.constants
    }

    pub fn proof_oracle(&self) -> Arc<dyn ProofOracle> {
        self.proofs.clone()
    }

    pub fn signature_oracle(&self) -> Arc<dyn SignatureOracle> {
        self.signatures.clone()
    }

    pub fn peak(&self) -> Option<&BlockRecord> {
        self.height_to_hash
            .last()
            .and_then(|header_hash| self.index.get(header_hash))
    }

    pub fn peak_height(&self) -> Option<u32> {
        self.peak().map(|peak| peak.height)
    }

    /// The canonical block at `height`.
    pub fn height_to_hash(&self, height: u32) -> Option<Bytes32> {
        self.height_to_hash
            .get(usize::try_from(height).ok()?)
            .copied()
    }

    pub fn contains_block(&self, header_hash: &Bytes32) -> bool {
        self.index.contains(header_hash)
    }

    pub fn is_canonical(&self, record: &BlockRecord) -> bool {
        self.height_to_hash(record.height) == Some(record.header_hash)
    }

    pub fn get_block_record(&self, header_hash: &Bytes32) -> Option<&BlockRecord> {
        self.index.get(header_hash)
    }

    pub fn get_block(&self, header_hash: &Bytes32) -> Result<Option<FullBlock>, BlockchainError> {
        if !self.index.contains(header_hash) {
            return Ok(None);
        }
        self.load_block(header_hash).map(Some)
    }

    pub fn get_header(&self, header_hash: &Bytes32) -> Result<Option<Header>, BlockchainError> {
        Ok(self.get_block(header_hash)?.map(|block| block.header))
    }

    /// The state of a coin as of the peak.
    pub fn get_coin_state(&self, coin_id: &Bytes32) -> Option<CoinState> {
        self.coins.get(coin_id).copied()
    }

    pub fn block_count(&self) -> usize {
        self.index.len()
    }

    /// The coin set as of the peak.
    pub fn peak_spend_set(&self) -> SpendSet<'_> {
        SpendSet::new(&self.coins, self.peak_height())
    }

    /// The coin set as of any stored block, or before genesis if `tip` is `None`.
    pub fn spend_set_at(&self, tip: Option<&Bytes32>) -> Result<SpendSet<'_>, BlockchainError> {
        let Some(tip) = tip else {
            return Ok(SpendSet::new(&self.coins, None));
        };

        let peak = self.height_to_hash.last();
        let path = self
            .index
            .find_fork(peak, tip)
            .ok_or(BlockchainError::UnknownBlock(*tip))?;

        let mut spend_set = SpendSet::new(&self.coins, path.fork_height);
        for header_hash in &path.connected {
            let block = self.load_block(header_hash)?;
            let record = self
                .index
                .get(header_hash)
                .ok_or(BlockchainError::UnknownBlock(*header_hash))?;
            spend_set.apply_block(record, &block, &self.constants);
        }

        Ok(spend_set)
    }

    /// Validates a block and integrates it into the block tree, moving the peak if the
    /// block's chain is now the best one.
    ///
    /// Validation failures are reported as [`AddBlockResult::Rejected`]. Errors are
    /// reserved for storage failures, in which case nothing changed.
    pub fn add_block(
        &mut self,
        block: &FullBlock,
        now: u64,
    ) -> Result<AddBlockResult, BlockchainError> {
        self.receive_block(block, None, now, true)
    }

    /// Like [`add_block`](Self::add_block), for a block whose structure and proofs
    /// were already checked against its parent by [`spare_consensus::pre_validate_block`].
    pub fn add_prevalidated_block(
        &mut self,
        block: &FullBlock,
        pre_validation: &PreValidation,
        now: u64,
    ) -> Result<AddBlockResult, BlockchainError> {
        self.receive_block(block, Some(pre_validation), now, true)
    }

    #[instrument(skip_all, fields(height = block.height()))]
    fn receive_block(
        &mut self,
        block: &FullBlock,
        pre_validation: Option<&PreValidation>,
        now: u64,
        persist: bool,
    ) -> Result<AddBlockResult, BlockchainError> {
        let header_hash = block.header_hash();

        if self.index.contains(&header_hash) {
            return Ok(AddBlockResult::AlreadyHave);
        }

        let prev = match self.index.get(&block.prev_header_hash()) {
            Some(prev) => Some(*prev),
            None if block.prev_header_hash() == self.constants.genesis_challenge => None,
            None => {
                debug!("Orphaned block {header_hash}");
                return Ok(AddBlockResult::Orphaned);
            }
        };

        let record = match self.validate(block, pre_validation, prev.as_ref(), now)? {
            Ok(record) => record,
            Err(error) => {
                warn!("Rejected block {header_hash}: {error}");
                return Ok(AddBlockResult::Rejected(error.into()));
            }
        };

        let peak = self.peak().copied();
        let seen_index = self.seen_count;
        self.index.insert(record);

        let result = self.integrate(block, &record, peak.as_ref(), seen_index, persist);
        match result {
            Ok(AddBlockResult::Accepted(_)) if persist => self.seen_count += 1,
            Ok(AddBlockResult::Accepted(_)) => {}
            _ => {
                self.index.remove_last();
            }
        }
        result
    }

    fn validate(
        &self,
        block: &FullBlock,
        pre_validation: Option<&PreValidation>,
        prev: Option<&BlockRecord>,
        now: u64,
    ) -> Result<Result<BlockRecord, ValidationError>, BlockchainError> {
        let coins = self.spend_set_at(prev.map(|prev| &prev.header_hash))?;

        let context = BlockContext {
            constants: &self.constants,
            records: &self.index,
            coins: &coins,
            signatures: self.signatures.as_ref(),
            now,
        };

        Ok(match pre_validation {
            Some(pre_validation) => {
                validate_prevalidated_block(block, pre_validation, prev, &context)
            }
            None => validate_block(block, prev, self.proofs.as_ref(), &context),
        })
    }

    /// Runs fork choice for a validated block that is already in the index.
    fn integrate(
        &mut self,
        block: &FullBlock,
        record: &BlockRecord,
        peak: Option<&BlockRecord>,
        seen_index: u64,
        persist: bool,
    ) -> Result<AddBlockResult, BlockchainError> {
        let comparison =
            peak.map_or(ChainComparison::Candidate, |peak| {
                self.index.compare_chains(peak, record)
            });

        if comparison == ChainComparison::Peak {
            if persist {
                self.persist(block, seen_index, false)?;
            }
            debug!("Added block {} off the peak", record.header_hash);
            return Ok(AddBlockResult::Accepted(None));
        }

        let path = self
            .index
            .find_fork(peak.map(|peak| &peak.header_hash), &record.header_hash)
            .ok_or(BlockchainError::UnknownBlock(record.prev_hash))?;

        if let Some(max) = self.max_reorg_depth {
            if path.depth() > usize::try_from(max).unwrap_or(usize::MAX) {
                warn!(
                    "Refusing reorg of depth {} to block {}",
                    path.depth(),
                    record.header_hash
                );
                return Ok(AddBlockResult::Rejected(RejectReason::ReorgTooDeep {
                    depth: path.depth(),
                    max,
                }));
            }
        }

        let connected = path
            .connected
            .iter()
            .map(|header_hash| {
                if *header_hash == record.header_hash {
                    Ok(block.clone())
                } else {
                    self.load_block(header_hash)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let disconnected = path
            .disconnected
            .iter()
            .map(|header_hash| self.load_block(header_hash))
            .collect::<Result<Vec<_>, _>>()?;

        if persist {
            self.persist(block, seen_index, true)?;
        }

        Ok(AddBlockResult::Accepted(Some(self.switch_peak(
            *record,
            path,
            &connected,
            disconnected,
        ))))
    }

    /// Moves the peak along `path`. Everything fallible has happened by now.
    fn switch_peak(
        &mut self,
        peak: BlockRecord,
        path: ForkPath,
        connected: &[FullBlock],
        disconnected: Vec<FullBlock>,
    ) -> StateChangeSummary {
        self.coins.rollback_to(path.fork_height);
        self.height_to_hash
            .truncate(path.fork_height.map_or(0, |height| height as usize + 1));

        let mut removals = Vec::new();
        let mut additions = Vec::new();

        for block in connected {
            let header_hash = block.header_hash();
            let Some(record) = self.index.get(&header_hash).copied() else {
                continue;
            };

            self.coins.apply_block(&record, block, &self.constants);
            self.height_to_hash.push(header_hash);

            for bundle in &block.transactions {
                removals.extend(bundle.removals().map(Coin::coin_id));
                additions.extend(bundle.additions().copied());
            }
            additions.extend(record.reward_coins(&self.constants));
        }

        let disconnected_transactions = disconnected
            .into_iter()
            .flat_map(|block| block.transactions)
            .collect();

        if path.disconnected.is_empty() {
            debug!("New peak at height {} weight {}", peak.height, peak.weight);
        } else {
            info!(
                "Reorg of depth {} to peak at height {} weight {}",
                path.disconnected.len(),
                peak.height,
                peak.weight
            );
        }

        StateChangeSummary {
            peak,
            fork_height: path.fork_height,
            disconnected: path.disconnected,
            connected: path.connected,
            removals,
            additions,
            disconnected_transactions,
        }
    }

    fn persist(
        &self,
        block: &FullBlock,
        seen_index: u64,
        new_peak: bool,
    ) -> Result<(), BlockchainError> {
        let header_hash = block.header_hash();

        let mut batch = vec![
            (block_key(&header_hash), block.to_bytes()),
            (seen_key(seen_index), header_hash.to_vec()),
            (SEEN_COUNT_KEY.to_vec(), (seen_index + 1).to_bytes()),
        ];

        if new_peak {
            batch.push((PEAK_KEY.to_vec(), header_hash.to_vec()));
        }

        Ok(self.store.write_batch(batch)?)
    }

    fn load_block(&self, header_hash: &Bytes32) -> Result<FullBlock, BlockchainError> {
        let bytes = self
            .store
            .get(&block_key(header_hash))?
            .ok_or(BlockchainError::MissingBlock(*header_hash))?;
        Ok(FullBlock::from_bytes(&bytes)?)
    }
}

impl BlockRecords for Blockchain {
    fn block_record(&self, header_hash: &Bytes32) -> Option<&BlockRecord> {
        self.index.get(header_hash)
    }
}
