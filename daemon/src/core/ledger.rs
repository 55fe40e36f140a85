use std::collections::{HashSet, VecDeque};

use indexmap::IndexMap;
use serde::Serialize;

use minichain_common::{
    api::daemon::AddressTransaction,
    block::Block,
    config::{
        DEFAULT_MINING_REWARD, GENESIS_PREVIOUS_HASH, INITIAL_SENDER_BALANCE,
        MAX_REJECTED_TRANSACTIONS, SYSTEM_SENDER,
    },
    crypto::{Hash, Hashable},
    time::get_current_timestamp,
    transaction::Transaction,
};

use super::error::{LedgerError, RejectReason};

// A refused transaction kept around for inspection, never retried
#[derive(Serialize, Clone, Debug)]
pub struct RejectedTransaction {
    pub transaction: Transaction,
    pub reason: String,
    pub timestamp: f64,
}

// Everything a miner needs to assemble the next block without holding the
// ledger lock while grinding nonces
#[derive(Clone, Debug)]
pub struct BlockTemplate {
    pub index: u64,
    pub transactions: Vec<Transaction>,
    pub previous_hash: String,
    pub difficulty: usize,
}

impl BlockTemplate {
    pub fn into_block(self) -> Block {
        Block::new(
            self.index,
            self.transactions,
            get_current_timestamp(),
            self.previous_hash,
            0,
            self.difficulty,
        )
    }
}

// The replicated state machine of a node: the chain itself, the pools of
// not-yet-mined and refused transactions, and the balance of every account
// that ever appeared in an admitted transfer.
pub struct Ledger {
    chain: Vec<Block>,
    pending_transactions: Vec<Transaction>,
    rejected_transactions: VecDeque<RejectedTransaction>,
    balances: IndexMap<String, f64>,
    difficulty: usize,
    mining_reward: f64,
}

impl Ledger {
    pub fn new(difficulty: usize) -> Self {
        let genesis = Block::new(
            0,
            Vec::new(),
            get_current_timestamp(),
            GENESIS_PREVIOUS_HASH.to_owned(),
            0,
            difficulty,
        );
        info!("Genesis block created: {}", genesis.get_hash());

        Ledger {
            chain: vec![genesis],
            pending_transactions: Vec::new(),
            rejected_transactions: VecDeque::new(),
            balances: IndexMap::new(),
            difficulty,
            mining_reward: DEFAULT_MINING_REWARD,
        }
    }

    pub fn get_chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn get_chain_length(&self) -> usize {
        self.chain.len()
    }

    pub fn get_latest_block(&self) -> &Block {
        self.chain
            .last()
            .expect("chain always starts with the genesis block")
    }

    pub fn get_pending(&self) -> &[Transaction] {
        &self.pending_transactions
    }

    pub fn get_rejected(&self) -> &VecDeque<RejectedTransaction> {
        &self.rejected_transactions
    }

    pub fn get_difficulty(&self) -> usize {
        self.difficulty
    }

    pub fn get_mining_reward(&self) -> f64 {
        self.mining_reward
    }

    pub fn get_balance(&self, address: &str) -> f64 {
        self.balances.get(address).copied().unwrap_or(0.0)
    }

    // Mining rewards sitting in the pool do not count towards the trigger
    pub fn non_system_pending_count(&self) -> usize {
        self.pending_transactions
            .iter()
            .filter(|tx| !tx.is_system())
            .count()
    }

    // A transaction is a duplicate when its content hash is already pending
    // or mined, or when a pending transaction moves the same amount between
    // the same parties. The triple check deliberately catches double-click
    // resubmissions that differ only in timestamp and signature, at the cost
    // of blocking a legitimate identical transfer until the first one mines.
    pub fn is_duplicate(&self, transaction: &Transaction) -> bool {
        let tx_hash = transaction.hash();
        if self
            .pending_transactions
            .iter()
            .any(|tx| tx.hash() == tx_hash)
        {
            return true;
        }

        if self.chain.iter().any(|block| {
            block
                .get_transactions()
                .iter()
                .any(|tx| tx.hash() == tx_hash)
        }) {
            return true;
        }

        self.pending_transactions
            .iter()
            .any(|tx| same_parties_and_amount(tx, transaction))
    }

    // Admit a transaction into the pending pool, debiting the sender right
    // away so stacked submissions cannot overspend a displayed balance.
    // A refusal is recorded once in the rejected pool and returned.
    pub fn add_transaction(&mut self, transaction: Transaction) -> Result<(), RejectReason> {
        match self.check_admissible(&transaction) {
            Ok(()) => {
                if !transaction.is_system() {
                    self.apply_transfer(&transaction);
                }
                info!("Transaction added to pool: {}", transaction);
                self.pending_transactions.push(transaction);
                Ok(())
            }
            Err(reason) => {
                warn!("Rejected transaction {}: {}", transaction, reason);
                self.record_rejected(transaction, &reason);
                Err(reason)
            }
        }
    }

    fn check_admissible(&mut self, transaction: &Transaction) -> Result<(), RejectReason> {
        if !transaction.is_system() && transaction.get_sender() == transaction.get_recipient() {
            return Err(RejectReason::SelfTransfer);
        }

        if self.is_duplicate(transaction) {
            return Err(RejectReason::Duplicate);
        }

        // Rewards skip the funds check entirely
        if transaction.is_system() {
            return Ok(());
        }

        // Lazy account creation. The inits stick even when the transfer is
        // refused below, matching the displayed-balance semantics.
        if !self.balances.contains_key(transaction.get_sender()) {
            info!(
                "Initializing new account {} with {} balance",
                transaction.get_sender(),
                INITIAL_SENDER_BALANCE
            );
            self.balances
                .insert(transaction.get_sender().to_owned(), INITIAL_SENDER_BALANCE);
        }
        if !self.balances.contains_key(transaction.get_recipient()) {
            self.balances
                .insert(transaction.get_recipient().to_owned(), 0.0);
        }

        let have = self.get_balance(transaction.get_sender());
        if have < transaction.get_amount() {
            return Err(RejectReason::InsufficientFunds {
                have,
                need: transaction.get_amount(),
            });
        }

        Ok(())
    }

    // Move funds for a non-system transaction, opening unknown accounts with
    // their first-appearance balances
    fn apply_transfer(&mut self, transaction: &Transaction) {
        let amount = transaction.get_amount();
        *self
            .balances
            .entry(transaction.get_sender().to_owned())
            .or_insert(INITIAL_SENDER_BALANCE) -= amount;
        *self
            .balances
            .entry(transaction.get_recipient().to_owned())
            .or_insert(0.0) += amount;

        debug!(
            "Updated balances: {} = {}, {} = {}",
            transaction.get_sender(),
            self.get_balance(transaction.get_sender()),
            transaction.get_recipient(),
            self.get_balance(transaction.get_recipient())
        );
    }

    fn record_rejected(&mut self, transaction: Transaction, reason: &RejectReason) {
        if self.rejected_transactions.len() == MAX_REJECTED_TRANSACTIONS {
            self.rejected_transactions.pop_front();
        }
        self.rejected_transactions.push_back(RejectedTransaction {
            transaction,
            reason: reason.to_string(),
            timestamp: get_current_timestamp(),
        });
    }

    // Candidate transactions for the next block: everything pending plus a
    // fresh reward for the miner
    pub fn get_mining_template(&self, miner_address: &str) -> BlockTemplate {
        let mut transactions = self.pending_transactions.clone();
        transactions.push(Transaction::new(
            SYSTEM_SENDER.to_owned(),
            miner_address.to_owned(),
            self.mining_reward,
        ));

        let tip = self.get_latest_block();
        BlockTemplate {
            index: tip.get_index() + 1,
            transactions,
            previous_hash: tip.get_hash().to_owned(),
            difficulty: self.difficulty,
        }
    }

    // Append a block that extends the current tip. Works for blocks this node
    // mined itself and for blocks received from peers; a block that lost the
    // race against a concurrent append fails the tip check and is discarded
    // by the caller.
    pub fn commit_block(&mut self, block: Block) -> Result<(), LedgerError> {
        let tip = self.get_latest_block();
        if block.get_index() != tip.get_index() + 1 || block.get_previous_hash() != tip.get_hash()
        {
            return Err(LedgerError::TipMismatch {
                index: block.get_index(),
                tip: tip.get_index(),
            });
        }
        if !block.is_well_formed() {
            return Err(LedgerError::MalformedBlock(block.get_index()));
        }

        self.apply_block_balances(&block);
        self.prune_pending(&block);
        info!("Block appended to chain: {}", block);
        self.chain.push(block);
        Ok(())
    }

    // Rewards are credited here. Regular transactions were already debited
    // when they entered the pending pool, except those first seen inside a
    // peer's block, which are applied now to keep balances in step with the
    // chain.
    fn apply_block_balances(&mut self, block: &Block) {
        for tx in block.get_transactions() {
            if tx.is_system() {
                let balance = self
                    .balances
                    .entry(tx.get_recipient().to_owned())
                    .or_insert(0.0);
                *balance += tx.get_amount();
                info!(
                    "Mining reward: {} balance updated to {}",
                    tx.get_recipient(),
                    *balance
                );
            } else if !self.already_pending(tx) {
                self.apply_transfer(tx);
            }
        }
    }

    fn already_pending(&self, transaction: &Transaction) -> bool {
        let tx_hash = transaction.hash();
        self.pending_transactions
            .iter()
            .any(|tx| tx.hash() == tx_hash || same_parties_and_amount(tx, transaction))
    }

    // Drop pending transactions now included in the block, matching by
    // content hash and by the (sender, recipient, amount) triple so relayed
    // copies with different metadata are cleared too
    fn prune_pending(&mut self, block: &Block) {
        let hashes: HashSet<Hash> = block
            .get_transactions()
            .iter()
            .map(|tx| tx.hash())
            .collect();
        let triples: HashSet<(&str, &str, u64)> = block
            .get_transactions()
            .iter()
            .map(triple_key)
            .collect();

        let before = self.pending_transactions.len();
        self.pending_transactions
            .retain(|tx| !hashes.contains(&tx.hash()) && !triples.contains(&triple_key(tx)));

        let removed = before - self.pending_transactions.len();
        if removed > 0 {
            info!(
                "Removed {} pending transactions now included in block #{}",
                removed,
                block.get_index()
            );
        }
    }

    // The synchronous mining path: reward the miner, grind the proof of work
    // and append. The node wraps the template/commit halves around an
    // off-lock mine for the concurrent paths.
    pub fn mine_pending(&mut self, miner_address: &str) -> Result<Block, LedgerError> {
        if self.pending_transactions.is_empty() {
            return Err(LedgerError::NothingToMine);
        }

        let mut block = self.get_mining_template(miner_address).into_block();
        block.mine();
        self.commit_block(block.clone())?;
        Ok(block)
    }

    pub fn is_chain_valid(&self) -> bool {
        validate_chain(&self.chain)
    }

    // Adopt a strictly longer valid chain, rebuild balances by replaying it,
    // and reconcile the pending pool: transactions the new chain already
    // contains are dropped, the survivors keep their real-time debits.
    pub fn replace_chain(&mut self, candidate: Vec<Block>) -> bool {
        if candidate.len() <= self.chain.len() {
            info!(
                "Candidate chain ({} blocks) is not longer than ours ({} blocks)",
                candidate.len(),
                self.chain.len()
            );
            return false;
        }

        if !validate_chain(&candidate) {
            warn!("Candidate chain is invalid, keeping ours");
            return false;
        }

        self.chain = candidate;
        self.rebuild_balances();

        let hashes: HashSet<Hash> = self
            .chain
            .iter()
            .flat_map(|block| block.get_transactions())
            .map(|tx| tx.hash())
            .collect();
        let triples: HashSet<(String, String, u64)> = self
            .chain
            .iter()
            .flat_map(|block| block.get_transactions())
            .map(|tx| {
                (
                    tx.get_sender().to_owned(),
                    tx.get_recipient().to_owned(),
                    tx.get_amount().to_bits(),
                )
            })
            .collect();

        let before = self.pending_transactions.len();
        self.pending_transactions.retain(|tx| {
            !hashes.contains(&tx.hash())
                && !triples.contains(&(
                    tx.get_sender().to_owned(),
                    tx.get_recipient().to_owned(),
                    tx.get_amount().to_bits(),
                ))
        });
        let removed = before - self.pending_transactions.len();
        if removed > 0 {
            info!(
                "Removed {} pending transactions already present in the new chain",
                removed
            );
        }

        // Surviving pending transactions were admitted with a real-time
        // debit, re-apply their flows on top of the replayed chain
        let survivors = self.pending_transactions.clone();
        for tx in survivors.iter().filter(|tx| !tx.is_system()) {
            self.apply_transfer(tx);
        }

        info!(
            "Chain replaced with a longer valid chain of {} blocks",
            self.chain.len()
        );
        true
    }

    fn rebuild_balances(&mut self) {
        self.balances.clear();
        for block in &self.chain {
            for tx in block.get_transactions() {
                if tx.is_system() {
                    *self
                        .balances
                        .entry(tx.get_recipient().to_owned())
                        .or_insert(0.0) += tx.get_amount();
                } else {
                    *self
                        .balances
                        .entry(tx.get_sender().to_owned())
                        .or_insert(INITIAL_SENDER_BALANCE) -= tx.get_amount();
                    *self
                        .balances
                        .entry(tx.get_recipient().to_owned())
                        .or_insert(0.0) += tx.get_amount();
                }
            }
        }
    }

    // Every mined transaction touching the address, with its block location
    pub fn get_transactions_for_address(&self, address: &str) -> Vec<AddressTransaction> {
        let mut transactions = Vec::new();
        for block in &self.chain {
            for tx in block.get_transactions() {
                if tx.get_sender() == address || tx.get_recipient() == address {
                    transactions.push(AddressTransaction {
                        transaction: tx.clone(),
                        block_index: block.get_index(),
                        block_hash: block.get_hash().to_owned(),
                    });
                }
            }
        }
        transactions
    }

    #[cfg(test)]
    pub(crate) fn get_balances(&self) -> &IndexMap<String, f64> {
        &self.balances
    }
}

fn same_parties_and_amount(a: &Transaction, b: &Transaction) -> bool {
    a.get_sender() == b.get_sender()
        && a.get_recipient() == b.get_recipient()
        && a.get_amount() == b.get_amount()
}

fn triple_key(tx: &Transaction) -> (&str, &str, u64) {
    (
        tx.get_sender(),
        tx.get_recipient(),
        tx.get_amount().to_bits(),
    )
}

// Walk a chain from index 1 (genesis is trusted by convention) and verify
// per block: the stored hash is honest, the previous_hash links, the
// proof-of-work prefix holds for the block's own difficulty, and a balance
// simulation with first-appearance credits never goes negative.
pub fn validate_chain(chain: &[Block]) -> bool {
    let mut balances: IndexMap<String, f64> = IndexMap::new();

    for i in 1..chain.len() {
        let block = &chain[i];
        let previous = &chain[i - 1];

        if block.get_hash() != block.compute_hash().to_hex() {
            warn!("Invalid hash in block {}", i);
            return false;
        }

        if block.get_previous_hash() != previous.get_hash() {
            warn!("Broken previous_hash link in block {}", i);
            return false;
        }

        if !block
            .get_hash()
            .starts_with(&"0".repeat(block.get_difficulty()))
        {
            warn!("Invalid proof-of-work in block {}", i);
            return false;
        }

        for tx in block.get_transactions() {
            if tx.is_system() {
                *balances.entry(tx.get_recipient().to_owned()).or_insert(0.0) +=
                    tx.get_amount();
                continue;
            }

            let sender_balance = *balances
                .entry(tx.get_sender().to_owned())
                .or_insert(INITIAL_SENDER_BALANCE);
            if sender_balance < tx.get_amount() {
                warn!(
                    "Transaction in block {} overdraws account {}",
                    i,
                    tx.get_sender()
                );
                return false;
            }

            *balances
                .entry(tx.get_sender().to_owned())
                .or_insert(INITIAL_SENDER_BALANCE) -= tx.get_amount();
            *balances.entry(tx.get_recipient().to_owned()).or_insert(0.0) += tx.get_amount();
        }
    }

    true
}
