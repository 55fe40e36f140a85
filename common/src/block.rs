use std::fmt::{Display, Error, Formatter};

use log::info;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    crypto::{hash, Hash},
    transaction::Transaction,
};

// A proof-of-work block. Hashes are stored as hex strings because the genesis
// block links to the literal "0" rather than a real digest.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Block {
    index: u64,
    transactions: Vec<Transaction>,
    timestamp: f64,
    previous_hash: String,
    nonce: u64,
    difficulty: usize,
    hash: String,
}

impl Block {
    pub fn new(
        index: u64,
        transactions: Vec<Transaction>,
        timestamp: f64,
        previous_hash: String,
        nonce: u64,
        difficulty: usize,
    ) -> Self {
        let mut block = Block {
            index,
            transactions,
            timestamp,
            previous_hash,
            nonce,
            difficulty,
            hash: String::new(),
        };
        block.hash = block.compute_hash().to_hex();
        block
    }

    // The hashed payload excludes difficulty and the stored hash itself
    pub fn compute_hash(&self) -> Hash {
        let value = json!({
            "index": self.index,
            "nonce": self.nonce,
            "previous_hash": self.previous_hash,
            "timestamp": self.timestamp,
            "transactions": self.transactions,
        });
        hash(value.to_string().as_bytes())
    }

    // Proof of work: bump the nonce until the hash carries the required
    // number of leading zero hex characters. CPU-bound and uncancellable,
    // callers stop mining between blocks, not inside one.
    pub fn mine(&mut self) {
        let target = "0".repeat(self.difficulty);
        while !self.hash.starts_with(&target) {
            self.nonce += 1;
            self.hash = self.compute_hash().to_hex();
        }

        info!("Block mined: {}", self.hash);
    }

    // A block is well-formed when its stored hash is honest and meets its own
    // difficulty target
    pub fn is_well_formed(&self) -> bool {
        self.hash.starts_with(&"0".repeat(self.difficulty))
            && self.hash == self.compute_hash().to_hex()
    }

    pub fn get_index(&self) -> u64 {
        self.index
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn get_txs_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn get_timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn get_previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn get_nonce(&self) -> u64 {
        self.nonce
    }

    pub fn get_difficulty(&self) -> usize {
        self.difficulty
    }

    pub fn get_hash(&self) -> &str {
        &self.hash
    }
}

impl Display for Block {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(
            f,
            "Block[index: {}, hash: {}, txs: {}]",
            self.index,
            self.hash,
            self.transactions.len()
        )
    }
}
