use std::cmp::Ordering;

use indexmap::IndexMap;
use spare_consensus::{BlockRecord, BlockRecords};
use spare_protocol::Bytes32;

/// Which of two chain tips should be the peak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainComparison {
    Peak,
    Candidate,
}

/// How to get from one tip to another through their last common block.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ForkPath {
    /// Height of the last block both chains contain, or `None` if they share nothing.
    pub fork_height: Option<u32>,
    /// Blocks only the old tip's chain contains, from the old tip down.
    pub disconnected: Vec<Bytes32>,
    /// Blocks only the new tip's chain contains, in ascending height.
    pub connected: Vec<Bytes32>,
}

impl ForkPath {
    /// How many blocks of the old chain are undone.
    pub fn depth(&self) -> usize {
        self.disconnected.len()
    }
}

/// Records of every block that passed validation, in the order they were accepted.
#[derive(Debug, Default, Clone)]
pub struct BlockIndex {
    records: IndexMap<Bytes32, BlockRecord>,
}

impl BlockIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: BlockRecord) {
        self.records.insert(record.header_hash, record);
    }

    /// Drops the most recently inserted record.
    pub fn remove_last(&mut self) -> Option<BlockRecord> {
        self.records.pop().map(|(_, record)| record)
    }

    pub fn get(&self, header_hash: &Bytes32) -> Option<&BlockRecord> {
        self.records.get(header_hash)
    }

    pub fn contains(&self, header_hash: &Bytes32) -> bool {
        self.records.contains_key(header_hash)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The position of a block in acceptance order.
    pub fn arrival_index(&self, header_hash: &Bytes32) -> Option<usize> {
        self.records.get_index_of(header_hash)
    }

    /// Walks back from both tips until they meet.
    ///
    /// Returns `None` if either tip or one of their ancestors is unknown.
    pub fn find_fork(&self, old: Option<&Bytes32>, new: &Bytes32) -> Option<ForkPath> {
        let mut path = ForkPath::default();
        let mut new = Some(self.get(new)?);
        let mut old = match old {
            Some(old) => Some(self.get(old)?),
            None => None,
        };

        loop {
            match (old, new) {
                (Some(a), Some(b)) if a.header_hash == b.header_hash => {
                    path.fork_height = Some(a.height);
                    break;
                }
                (Some(a), Some(b)) if a.height >= b.height => {
                    path.disconnected.push(a.header_hash);
                    old = self.parent(a)?;
                }
                (Some(a), None) => {
                    path.disconnected.push(a.header_hash);
                    old = self.parent(a)?;
                }
                (_, Some(b)) => {
                    path.connected.push(b.header_hash);
                    new = self.parent(b)?;
                }
                (None, None) => break,
            }
        }

        path.connected.reverse();
        Some(path)
    }

    /// `Some(None)` for a genesis block, which has no parent.
    fn parent(&self, record: &BlockRecord) -> Option<Option<&BlockRecord>> {
        if record.is_genesis() {
            Some(None)
        } else {
            self.get(&record.prev_hash).map(Some)
        }
    }

    /// Heavier chains win. Between chains of equal weight, the one whose first block
    /// after the fork was accepted earlier wins, which keeps the current peak unless
    /// the other chain was there first.
    pub fn compare_chains(&self, peak: &BlockRecord, candidate: &BlockRecord) -> ChainComparison {
        match candidate.weight.cmp(&peak.weight) {
            Ordering::Greater => ChainComparison::Candidate,
            Ordering::Less => ChainComparison::Peak,
            Ordering::Equal => {
                let Some(path) = self.find_fork(Some(&peak.header_hash), &candidate.header_hash)
                else {
                    return ChainComparison::Peak;
                };

                let peak_arrival = path
                    .disconnected
                    .last()
                    .and_then(|hash| self.arrival_index(hash));
                let candidate_arrival = path
                    .connected
                    .first()
                    .and_then(|hash| self.arrival_index(hash));

                match (peak_arrival, candidate_arrival) {
                    (Some(peak), Some(candidate)) if candidate < peak => ChainComparison::Candidate,
                    _ => ChainComparison::Peak,
                }
            }
        }
    }
}

impl BlockRecords for BlockIndex {
    fn block_record(&self, header_hash: &Bytes32) -> Option<&BlockRecord> {
        self.records.get(header_hash)
    }
}

#[cfg(test)]
mod tests {
    use spare_consensus::simulator_constants;
    use spare_test::BlockTools;

    use super::*;

    fn index(tools: &BlockTools, hashes: &[Bytes32]) -> BlockIndex {
        let mut index = BlockIndex::new();
        for hash in hashes {
            index.insert(*tools.record(hash));
        }
        index
    }

    #[test]
    fn test_find_fork() {
        let mut tools = BlockTools::new(simulator_constants());
        let main: Vec<Bytes32> = tools.chain(5).iter().map(|b| b.header_hash()).collect();
        let fork: Vec<Bytes32> = tools
            .extend_with_seed(Some(main[2]), 3, 1)
            .iter()
            .map(|b| b.header_hash())
            .collect();

        let index = index(&tools, &[main.clone(), fork.clone()].concat());

        let path = index.find_fork(Some(&main[4]), &fork[2]).unwrap();
        assert_eq!(path.fork_height, Some(2));
        assert_eq!(path.disconnected, vec![main[4], main[3]]);
        assert_eq!(path.connected, fork);
        assert_eq!(path.depth(), 2);

        let path = index.find_fork(None, &main[1]).unwrap();
        assert_eq!(path.fork_height, None);
        assert_eq!(path.connected, vec![main[0], main[1]]);

        let path = index.find_fork(Some(&main[1]), &main[3]).unwrap();
        assert_eq!(path.fork_height, Some(1));
        assert!(path.disconnected.is_empty());

        assert_eq!(index.find_fork(None, &Bytes32::new([9; 32])), None);
    }

    #[test]
    fn test_equal_weight_prefers_earlier_branch() {
        let mut tools = BlockTools::new(simulator_constants());
        let main: Vec<Bytes32> = tools.chain(3).iter().map(|b| b.header_hash()).collect();
        let fork = tools.extend_with_seed(Some(main[1]), 1, 1)[0].header_hash();

        let peak = *tools.record(&main[2]);
        let candidate = *tools.record(&fork);
        assert_eq!(peak.weight, candidate.weight);

        let index_main_first = index(&tools, &[main[0], main[1], main[2], fork]);
        assert_eq!(
            index_main_first.compare_chains(&peak, &candidate),
            ChainComparison::Peak
        );

        let index_fork_first = index(&tools, &[main[0], main[1], fork, main[2]]);
        assert_eq!(
            index_fork_first.compare_chains(&peak, &candidate),
            ChainComparison::Candidate
        );
    }
}
