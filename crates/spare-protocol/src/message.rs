use crate::{Bytes32, FullBlock, SpendBundle, Streamable, WeightProof};

/// Every payload exchanged with peers. The first byte selects the variant.
#[derive(Debug, Clone, PartialEq, Eq, Streamable)]
pub enum Message {
    NewBlock(FullBlock),
    NewTransaction(SpendBundle),
    RequestWeightProof(RequestWeightProof),
    RespondWeightProof(WeightProof),
    TransactionAck(TransactionAck),
    Reject(Reject),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Streamable)]
pub struct RequestWeightProof {
    /// The tip the requester already knows about, if any.
    pub known_tip: Option<Bytes32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Streamable)]
pub struct TransactionAck {
    pub txid: Bytes32,
    pub status: u8,
    pub error: Option<String>,
}

impl TransactionAck {
    pub fn new(txid: Bytes32, status: u8, error: Option<String>) -> Self {
        Self { txid, status, error }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Streamable)]
pub struct Reject {
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use crate::{Bytes96, ErrorKind};

    use super::*;

    #[test]
    fn test_message_dispatch_by_discriminant() -> anyhow::Result<()> {
        let message = Message::NewTransaction(SpendBundle::new(Vec::new(), 7, Bytes96::default()));
        let bytes = message.to_bytes();
        assert_eq!(bytes[0], 1);
        assert_eq!(Message::from_bytes(&bytes)?, message);

        let request = Message::RequestWeightProof(RequestWeightProof { known_tip: None });
        assert_eq!(request.to_bytes(), vec![2, 0]);
        Ok(())
    }

    #[test]
    fn test_unknown_message_type() {
        let error = Message::from_bytes(&[42]).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ValueOutOfRange);
    }
}
