use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;

pub const SEED_LENGTH: usize = 32;

/// Deterministic wallet root: address and key pair `i` are both derived from `(seed, i)`.
#[derive(Clone, PartialEq, Eq)]
pub struct Seed([u8; SEED_LENGTH]);

impl Seed {
    pub fn generate() -> Self {
        let mut bytes = [0u8; SEED_LENGTH];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; SEED_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn from_base58(encoded: &str) -> Option<Self> {
        let decoded = bs58::decode(encoded).into_vec().ok()?;
        Some(Self(decoded.try_into().ok()?))
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }

    pub fn as_bytes(&self) -> &[u8; SEED_LENGTH] {
        &self.0
    }

    pub fn key_pair(&self, index: u64) -> KeyPair {
        let mut hasher = Sha256::new();
        hasher.update(self.0);
        hasher.update(index.to_le_bytes());
        let sub_seed: [u8; 32] = hasher.finalize().into();
        KeyPair {
            signing_key: SigningKey::from_bytes(&sub_seed),
        }
    }

    pub fn address(&self, index: u64) -> Address {
        self.key_pair(index).address()
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // never print the seed itself
        f.debug_tuple("Seed").field(&self.address(0)).finish()
    }
}

#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    pub fn public_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    pub fn address(&self) -> Address {
        Address::from_public_key(&self.public_key())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Ed25519 address: type byte followed by the hash of the public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address([u8; Address::LENGTH]);

impl Address {
    pub const LENGTH: usize = 33;
    const ED25519_TYPE: u8 = 0;

    pub fn from_public_key(public_key: &VerifyingKey) -> Self {
        let digest: [u8; 32] = Sha256::digest(public_key.as_bytes()).into();
        let mut bytes = [0u8; Self::LENGTH];
        bytes[0] = Self::ED25519_TYPE;
        bytes[1..].copy_from_slice(&digest);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; Self::LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; Self::LENGTH] {
        &self.0
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_base58())
    }
}
