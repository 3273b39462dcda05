use crate::ledger::OutputId;
use crate::wallet::seed::{Address, KeyPair};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

pub const TRANSACTION_VERSION: u8 = 0;
const SIGNATURE_UNLOCK_BLOCK: u8 = 0;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("output id {0} is not a valid ledger output id")]
    InvalidOutputId(String),
    #[error("a transaction needs at least one input and one output")]
    Empty,
    #[error("too many {0} for one transaction")]
    TooMany(&'static str),
    #[error("transaction bytes end inside the {0}")]
    Truncated(&'static str),
    #[error("{0} trailing bytes after the transaction")]
    TrailingBytes(usize),
    #[error("unsupported unlock block type {0}")]
    UnsupportedUnlockBlock(u8),
    #[error("invalid public key in unlock block")]
    InvalidPublicKey,
    #[error("signature does not match the essence")]
    InvalidSignature,
}

/// Identity of the node credited with the transaction's mana pledges.
pub type NodeId = [u8; 32];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionEssence {
    pub version: u8,
    /// unix time in nanoseconds
    pub timestamp: i64,
    pub access_pledge_id: NodeId,
    pub consensus_pledge_id: NodeId,
    pub inputs: Vec<OutputId>,
    pub outputs: Vec<(Address, u64)>,
}

impl TransactionEssence {
    pub fn new(inputs: Vec<OutputId>, outputs: Vec<(Address, u64)>, node_id: NodeId) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as i64)
            .unwrap_or_default();
        Self {
            version: TRANSACTION_VERSION,
            timestamp,
            access_pledge_id: node_id,
            consensus_pledge_id: node_id,
            inputs,
            outputs,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, BuildError> {
        if self.inputs.is_empty() || self.outputs.is_empty() {
            return Err(BuildError::Empty);
        }
        let input_count =
            u16::try_from(self.inputs.len()).map_err(|_| BuildError::TooMany("inputs"))?;
        let output_count =
            u16::try_from(self.outputs.len()).map_err(|_| BuildError::TooMany("outputs"))?;

        let inputs_len = self.inputs.len() * OutputId::LENGTH;
        let outputs_len = self.outputs.len() * (Address::LENGTH + 8);
        let mut bytes = Vec::with_capacity(75 + inputs_len + outputs_len + 4);
        bytes.push(self.version);
        bytes.extend_from_slice(&self.timestamp.to_le_bytes());
        bytes.extend_from_slice(&self.access_pledge_id);
        bytes.extend_from_slice(&self.consensus_pledge_id);

        bytes.extend_from_slice(&input_count.to_le_bytes());
        for input in self.inputs.iter() {
            let id = input
                .to_bytes()
                .ok_or_else(|| BuildError::InvalidOutputId(input.to_string()))?;
            bytes.extend_from_slice(&id);
        }

        bytes.extend_from_slice(&output_count.to_le_bytes());
        for (address, value) in self.outputs.iter() {
            bytes.extend_from_slice(address.as_bytes());
            bytes.extend_from_slice(&value.to_le_bytes());
        }

        // no payload
        bytes.extend_from_slice(&0u32.to_le_bytes());
        Ok(bytes)
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, BuildError> {
        let version = reader.array::<1>("version")?[0];
        let timestamp = i64::from_le_bytes(reader.array("timestamp")?);
        let access_pledge_id = reader.array("access pledge id")?;
        let consensus_pledge_id = reader.array("consensus pledge id")?;

        let input_count = u16::from_le_bytes(reader.array("input count")?);
        let mut inputs = Vec::with_capacity(input_count as usize);
        for _ in 0..input_count {
            let id: [u8; OutputId::LENGTH] = reader.array("inputs")?;
            inputs.push(OutputId::new(bs58::encode(id).into_string()));
        }

        let output_count = u16::from_le_bytes(reader.array("output count")?);
        let mut outputs = Vec::with_capacity(output_count as usize);
        for _ in 0..output_count {
            let address = Address::from_bytes(reader.array("outputs")?);
            let value = u64::from_le_bytes(reader.array("outputs")?);
            outputs.push((address, value));
        }

        let payload_length = u32::from_le_bytes(reader.array("payload length")?);
        reader.skip(payload_length as usize, "payload")?;

        Ok(Self {
            version,
            timestamp,
            access_pledge_id,
            consensus_pledge_id,
            inputs,
            outputs,
        })
    }
}

/// An essence plus its single signature unlock block.
#[derive(Clone, Debug)]
pub struct Transaction {
    pub essence: TransactionEssence,
    pub public_key: VerifyingKey,
    pub signature: Signature,
}

impl Transaction {
    pub fn sign(essence: TransactionEssence, key_pair: &KeyPair) -> Result<Self, BuildError> {
        let signature = key_pair.sign(&essence.to_bytes()?);
        Ok(Self {
            essence,
            public_key: key_pair.public_key(),
            signature,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, BuildError> {
        let mut bytes = self.essence.to_bytes()?;
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.push(SIGNATURE_UNLOCK_BLOCK);
        bytes.extend_from_slice(self.public_key.as_bytes());
        bytes.extend_from_slice(&self.signature.to_bytes());
        Ok(bytes)
    }

    /// Parses a transaction and checks its signature against the essence.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BuildError> {
        let mut reader = Reader { bytes, offset: 0 };
        let essence = TransactionEssence::read(&mut reader)?;
        let essence_bytes = &bytes[..reader.offset];

        let unlock_count = u16::from_le_bytes(reader.array("unlock block count")?);
        if unlock_count != 1 {
            return Err(BuildError::TooMany("unlock blocks"));
        }
        let unlock_type = reader.array::<1>("unlock block")?[0];
        if unlock_type != SIGNATURE_UNLOCK_BLOCK {
            return Err(BuildError::UnsupportedUnlockBlock(unlock_type));
        }
        let public_key = VerifyingKey::from_bytes(&reader.array("public key")?)
            .map_err(|_| BuildError::InvalidPublicKey)?;
        let signature = Signature::from_bytes(&reader.array("signature")?);
        if reader.remaining() > 0 {
            return Err(BuildError::TrailingBytes(reader.remaining()));
        }

        public_key
            .verify(essence_bytes, &signature)
            .map_err(|_| BuildError::InvalidSignature)?;

        Ok(Self {
            essence,
            public_key,
            signature,
        })
    }
}

pub fn transaction_id(tx_bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(tx_bytes).into()
}

/// Builds and signs a transaction spending `inputs` into `outputs`.
pub fn build_transaction(
    inputs: &[OutputId],
    outputs: &[(Address, u64)],
    key_pair: &KeyPair,
    node_id: NodeId,
) -> Result<Vec<u8>, BuildError> {
    let essence = TransactionEssence::new(inputs.to_vec(), outputs.to_vec(), node_id);
    Transaction::sign(essence, key_pair)?.to_bytes()
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], BuildError> {
        let end = self.offset + N;
        let slice = self
            .bytes
            .get(self.offset..end)
            .ok_or(BuildError::Truncated(field))?;
        self.offset = end;
        let mut array = [0u8; N];
        array.copy_from_slice(slice);
        Ok(array)
    }

    fn skip(&mut self, count: usize, field: &'static str) -> Result<(), BuildError> {
        if self.remaining() < count {
            return Err(BuildError::Truncated(field));
        }
        self.offset += count;
        Ok(())
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }
}

#[cfg(test)]
mod tests {
    use crate::ledger::OutputId;
    use crate::tx_builder::{build_transaction, BuildError, Transaction, TransactionEssence};
    use crate::wallet::seed::{Address, Seed};

    #[test]
    fn signed_transaction_parses_and_verifies() {
        let seed = Seed::from_bytes([4u8; 32]);
        let input = OutputId::from_parts(&[1u8; 32], 0);
        let outputs = vec![(seed.address(1), 500), (seed.address(2), 500)];

        let bytes = build_transaction(&[input.clone()], &outputs, &seed.key_pair(0), [0u8; 32])
            .unwrap();
        let tx = Transaction::from_bytes(&bytes).unwrap();

        assert_eq!(tx.essence.inputs, vec![input]);
        assert_eq!(tx.essence.outputs, outputs);
        assert_eq!(Address::from_public_key(&tx.public_key), seed.address(0));
    }

    #[test]
    fn tampered_transaction_is_rejected() {
        let seed = Seed::from_bytes([5u8; 32]);
        let mut bytes = build_transaction(
            &[OutputId::from_parts(&[2u8; 32], 1)],
            &[(seed.address(1), 10)],
            &seed.key_pair(0),
            [0u8; 32],
        )
        .unwrap();
        // the value of the only output sits right before the payload length
        let value_offset = bytes.len() - 2 - 1 - 32 - 64 - 4 - 8;
        bytes[value_offset] ^= 0xff;
        assert!(matches!(
            Transaction::from_bytes(&bytes),
            Err(BuildError::InvalidSignature)
        ));
        assert!(matches!(
            Transaction::from_bytes(&bytes[..20]),
            Err(BuildError::Truncated(_))
        ));
    }

    #[test]
    fn invalid_inputs_are_refused() {
        let seed = Seed::from_bytes([6u8; 32]);
        let essence = TransactionEssence::new(
            vec![OutputId::new("tooshort")],
            vec![(seed.address(0), 1)],
            [0u8; 32],
        );
        assert!(matches!(
            essence.to_bytes(),
            Err(BuildError::InvalidOutputId(_))
        ));
        let empty = TransactionEssence::new(vec![], vec![(seed.address(0), 1)], [0u8; 32]);
        assert!(matches!(empty.to_bytes(), Err(BuildError::Empty)));
    }
}
