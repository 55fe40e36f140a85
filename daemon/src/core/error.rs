use thiserror::Error;

// Why a transaction was refused admission. The Display strings are part of
// the HTTP contract and are stored verbatim in the rejected pool.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RejectReason {
    #[error("Duplicate transaction")]
    Duplicate,

    #[error("Insufficient funds: {have:?} < {need:?}")]
    InsufficientFunds { have: f64, need: f64 },

    #[error("Source and recipient must differ")]
    SelfTransfer,
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("block #{index} does not extend the current tip #{tip}")]
    TipMismatch { index: u64, tip: u64 },

    #[error("block #{0} fails hash or proof-of-work verification")]
    MalformedBlock(u64),

    #[error("no pending transactions to mine")]
    NothingToMine,
}
