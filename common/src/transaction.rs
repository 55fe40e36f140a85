use std::fmt::{Display, Error, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    config::SYSTEM_SENDER,
    crypto::{hash, random::random_id, Hash, Hashable},
    time::get_current_timestamp,
};

// A transfer of funds between two named accounts. The signature carries no
// cryptographic weight, it is an opaque identifier that makes two otherwise
// identical submissions distinguishable.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Transaction {
    sender: String,
    recipient: String,
    amount: f64,
    timestamp: f64,
    signature: String,
}

impl Transaction {
    // Build a transaction stamped with the current wall clock and a fresh
    // random signature
    pub fn new(sender: String, recipient: String, amount: f64) -> Self {
        Self::with_metadata(
            sender,
            recipient,
            amount,
            get_current_timestamp(),
            random_id(),
        )
    }

    // Rebuild a transaction received from a peer, keeping the metadata that
    // its content hash depends on
    pub fn with_metadata(
        sender: String,
        recipient: String,
        amount: f64,
        timestamp: f64,
        signature: String,
    ) -> Self {
        Transaction {
            sender,
            recipient,
            amount,
            timestamp,
            signature,
        }
    }

    pub fn get_sender(&self) -> &str {
        &self.sender
    }

    pub fn get_recipient(&self) -> &str {
        &self.recipient
    }

    pub fn get_amount(&self) -> f64 {
        self.amount
    }

    pub fn get_timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn get_signature(&self) -> &str {
        &self.signature
    }

    // Mining rewards are sent by the reserved system address
    pub fn is_system(&self) -> bool {
        self.sender == SYSTEM_SENDER
    }
}

impl Hashable for Transaction {
    // Identity is the SHA-256 of the canonical key-sorted JSON of the five
    // fields (serde_json maps iterate in key order)
    fn hash(&self) -> Hash {
        let value = json!({
            "amount": self.amount,
            "recipient": self.recipient,
            "sender": self.sender,
            "signature": self.signature,
            "timestamp": self.timestamp,
        });
        hash(value.to_string().as_bytes())
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}

impl Display for Transaction {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(
            f,
            "Transaction[{} -> {}, amount: {}]",
            self.sender, self.recipient, self.amount
        )
    }
}
