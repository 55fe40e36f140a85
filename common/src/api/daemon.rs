// Request and response bodies of the daemon HTTP API, shared between the RPC
// handlers, the node-to-node client paths and the interactive CLI.

use serde::{Deserialize, Serialize};

use crate::{block::Block, network::NodeType, transaction::Transaction};

// Body of POST /transactions/new. Required fields are optional here so the
// handler can answer a structured validation error instead of a framework
// one. Timestamp and signature are present when a peer relays an existing
// transaction, absent on user submissions.
#[derive(Serialize, Deserialize, Debug)]
pub struct NewTransactionRequest {
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ChainResponse {
    pub chain: Vec<Block>,
    pub length: usize,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ValidateChainResponse {
    pub valid: bool,
    pub length: usize,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct BalanceResponse {
    pub address: String,
    pub balance: f64,
}

// One entry of a transaction history lookup: the transaction plus where in
// the chain it was included
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AddressTransaction {
    pub transaction: Transaction,
    pub block_index: u64,
    pub block_hash: String,
}

// A peer as shared inside announcements
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AnnouncedNode {
    pub host: String,
    pub port: u16,
    pub node_type: NodeType,
    #[serde(default)]
    pub name: Option<String>,
}

// Body of POST /nodes/announce
#[derive(Serialize, Deserialize, Debug)]
pub struct AnnounceRequest {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub node_type: Option<NodeType>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub active_nodes: Vec<AnnouncedNode>,
}

// The announcement a node makes about itself, also returned to announcers so
// both sides learn each other's view of the network
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NodeAnnouncement {
    pub host: String,
    pub port: u16,
    pub node_type: NodeType,
    pub name: String,
    pub active_nodes: Vec<AnnouncedNode>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct AnnounceResponse {
    pub message: String,
    pub node: NodeAnnouncement,
}

// Body of POST /nodes/register
#[derive(Serialize, Deserialize, Debug)]
pub struct RegisterNodesRequest {
    pub nodes: Option<Vec<String>>,
}

// A registered peer with its current liveness, as served by GET /nodes/peers
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PeerStatus {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub node_type: NodeType,
    pub active: bool,
    pub url: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct PeersResponse {
    pub nodes: Vec<PeerStatus>,
    pub active_count: usize,
    pub total_count: usize,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct NodeInfoResponse {
    pub address: String,
    pub host: String,
    pub port: u16,
    pub node_type: NodeType,
    pub chain_length: usize,
    pub pending_transactions: usize,
    pub registered_nodes: usize,
    pub active_nodes: usize,
    pub is_mining: bool,
    pub miner_mode: bool,
}
