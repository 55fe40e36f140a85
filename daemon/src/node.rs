use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use reqwest::Client;
use tokio::{
    sync::{Mutex, RwLock},
    task::JoinHandle,
    time::sleep,
};

use minichain_common::{
    api::daemon::{
        AnnounceResponse, ChainResponse, NodeAnnouncement, NodeInfoResponse, PeersResponse,
        RegisterNodesRequest,
    },
    block::Block,
    config::{BROADCAST_TIMEOUT_SECS, LIVENESS_PROBE_TIMEOUT_SECS, TRANSACTIONS_PER_BLOCK},
    crypto::random::random_id,
    network::NodeType,
    transaction::Transaction,
};

use crate::{
    config::NodeConfig,
    core::{
        error::{LedgerError, RejectReason},
        ledger::Ledger,
    },
    p2p::{normalize_host, parse_node_url, PeerEntry, PeerRegistry},
};

// Requests relayed between nodes carry these headers so receivers do not
// rebroadcast and cascade the message back through the network
pub const SOURCE_TYPE_HEADER: &str = "X-Source-Type";
pub const SOURCE_NODE_HEADER: &str = "X-Source-Node";
pub const NODE_BROADCAST: &str = "node_broadcast";

// A peer node: one ledger, one peer registry, and the network behavior that
// ties them together. All mutation goes through the two RwLocks; no network
// call is ever made while holding either of them.
pub struct Node {
    host: String,
    port: u16,
    node_id: String,
    miner_mode: bool,
    mining_address: String,
    mining_interval: u64,
    running: AtomicBool,
    mining_task: Mutex<Option<JoinHandle<()>>>,
    ledger: RwLock<Ledger>,
    registry: RwLock<PeerRegistry>,
    client: Client,
}

impl Node {
    pub fn new(config: &NodeConfig, ledger: Ledger, registry: PeerRegistry) -> Self {
        let node_id = random_id();
        let host = normalize_host(&config.host);
        info!("Initialized node with identity: {}:{}", host, config.port);

        Node {
            host,
            port: config.port,
            mining_address: format!("miner-{}", node_id),
            node_id,
            miner_mode: config.node_type.is_miner(),
            mining_interval: config.mining_interval,
            running: AtomicBool::new(false),
            mining_task: Mutex::new(None),
            ledger: RwLock::new(ledger),
            registry: RwLock::new(registry),
            client: Client::new(),
        }
    }

    pub fn get_identity(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn get_host(&self) -> &str {
        &self.host
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    pub fn is_miner(&self) -> bool {
        self.miner_mode
    }

    pub fn get_node_type(&self) -> NodeType {
        if self.miner_mode {
            NodeType::Miner
        } else {
            NodeType::Full
        }
    }

    pub fn get_mining_address(&self) -> &str {
        &self.mining_address
    }

    pub fn is_mining(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn ledger(&self) -> &RwLock<Ledger> {
        &self.ledger
    }

    pub fn registry(&self) -> &RwLock<PeerRegistry> {
        &self.registry
    }

    // Admit a transaction. When this node is the ingress (a user submission
    // rather than a peer relay) the transaction is forwarded to every active
    // peer. On a miner, filling the trigger mines the block immediately; the
    // backup loop only exists for transactions that arrived while one was
    // already being mined.
    pub async fn handle_new_transaction(
        &self,
        transaction: Transaction,
        origin_is_broadcast: bool,
    ) -> Result<(), RejectReason> {
        let trigger_reached = {
            let mut ledger = self.ledger.write().await;
            ledger.add_transaction(transaction.clone())?;
            self.miner_mode && ledger.non_system_pending_count() == TRANSACTIONS_PER_BLOCK
        };

        if !origin_is_broadcast {
            self.broadcast_transaction(&transaction).await;
        }

        if trigger_reached {
            info!(
                "Reached {} pending transactions, mining a new block",
                TRANSACTIONS_PER_BLOCK
            );
            match self.mine_and_broadcast().await {
                Ok(block) => info!("Automatically mined {}", block),
                Err(e) => warn!("Triggered mining attempt failed: {}", e),
            }
        }

        Ok(())
    }

    // Accept a block from a peer. Blocks extending the tip are committed;
    // a block further ahead means we fell behind and consensus decides;
    // everything else (stale, forked, malformed) is rejected. Receiving the
    // same block twice is harmless: the second copy fails the tip check.
    pub async fn handle_new_block(&self, block: Block, origin_is_broadcast: bool) -> bool {
        let source = if origin_is_broadcast { "peer" } else { "api" };
        let result = {
            let mut ledger = self.ledger.write().await;
            ledger.commit_block(block.clone())
        };

        match result {
            Ok(()) => {
                info!("Accepted {} from {}", block, source);
                true
            }
            Err(LedgerError::TipMismatch { index, tip }) if index > tip + 1 => {
                info!(
                    "Block #{} is ahead of our tip #{}, running consensus",
                    index, tip
                );
                self.consensus().await;
                true
            }
            Err(e) => {
                warn!("Rejected block #{} from {}: {}", block.get_index(), source, e);
                false
            }
        }
    }

    // Forward a transaction to every active peer. Failures are logged and
    // counted, the broadcast itself never fails.
    pub async fn broadcast_transaction(&self, transaction: &Transaction) {
        let peers = self.active_peers(true, true).await;
        if peers.is_empty() {
            warn!("No active peer nodes found to broadcast transaction to");
            return;
        }

        info!(
            "Broadcasting transaction from {} to {} peer nodes",
            transaction.get_sender(),
            peers.len()
        );

        let mut delivered = 0;
        for peer in &peers {
            let url = format!("{}/transactions/new", peer.get_url());
            match self
                .client
                .post(&url)
                .json(transaction)
                .header(SOURCE_TYPE_HEADER, NODE_BROADCAST)
                .header(SOURCE_NODE_HEADER, self.get_identity())
                .timeout(Duration::from_secs(BROADCAST_TIMEOUT_SECS))
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => delivered += 1,
                Ok(response) => warn!(
                    "Peer {} did not accept the transaction: HTTP {}",
                    url,
                    response.status()
                ),
                Err(e) => error!("Network error broadcasting transaction to {}: {}", url, e),
            }
        }

        info!(
            "Transaction broadcast complete: {} of {} peers reached",
            delivered,
            peers.len()
        );
    }

    // Forward a freshly mined block to every active peer
    pub async fn broadcast_block(&self, block: &Block) {
        let peers = self.active_peers(true, true).await;
        if peers.is_empty() {
            warn!("No active peer nodes found to broadcast block to");
            return;
        }

        info!(
            "Broadcasting block #{} to {} peer nodes",
            block.get_index(),
            peers.len()
        );

        let mut delivered = 0;
        for peer in &peers {
            let url = format!("{}/blocks/new", peer.get_url());
            match self
                .client
                .post(&url)
                .json(block)
                .header(SOURCE_TYPE_HEADER, NODE_BROADCAST)
                .header(SOURCE_NODE_HEADER, self.get_identity())
                .timeout(Duration::from_secs(BROADCAST_TIMEOUT_SECS))
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => delivered += 1,
                Ok(response) => warn!(
                    "Peer {} did not accept the block: HTTP {}",
                    url,
                    response.status()
                ),
                Err(e) => error!("Network error broadcasting block to {}: {}", url, e),
            }
        }

        info!(
            "Block broadcast complete: {} of {} peers reached",
            delivered,
            peers.len()
        );
    }

    // Longest-chain consensus: fetch every active peer's chain, keep the
    // longest strictly-greater candidate and let the ledger decide whether it
    // is valid enough to adopt. Unreachable peers are simply skipped.
    pub async fn consensus(&self) -> bool {
        let peers = self.active_peers(true, true).await;
        info!("Running consensus with {} active peers", peers.len());

        let mut max_length = {
            let ledger = self.ledger.read().await;
            ledger.get_chain_length()
        };
        let mut best: Option<Vec<Block>> = None;

        for peer in &peers {
            let url = format!("{}/chain", peer.get_url());
            match self
                .client
                .get(&url)
                .timeout(Duration::from_secs(BROADCAST_TIMEOUT_SECS))
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    match response.json::<ChainResponse>().await {
                        Ok(body) if body.length > max_length => {
                            info!(
                                "Found longer chain ({} blocks) from {}",
                                body.length,
                                peer.get_name()
                            );
                            max_length = body.length;
                            best = Some(body.chain);
                        }
                        Ok(_) => {}
                        Err(e) => warn!("Malformed chain response from {}: {}", url, e),
                    }
                }
                Ok(response) => {
                    warn!("Failed to get chain from {}: HTTP {}", url, response.status())
                }
                Err(e) => error!("Failed to get chain from {}: {}", url, e),
            }
        }

        match best {
            Some(chain) => {
                let replaced = {
                    let mut ledger = self.ledger.write().await;
                    ledger.replace_chain(chain)
                };
                if replaced {
                    info!("Chain replaced with longer chain ({} blocks)", max_length);
                } else {
                    warn!("Longer chain was invalid, not replaced");
                }
                replaced
            }
            None => false,
        }
    }

    // Mine one block off-lock: snapshot a template, grind the proof of work
    // on a blocking thread, then commit only if the tip has not moved in the
    // meantime. A moved tip discards the mined block.
    pub async fn mine_block(&self) -> Result<Block, LedgerError> {
        let template = {
            let ledger = self.ledger.read().await;
            if ledger.get_pending().is_empty() {
                return Err(LedgerError::NothingToMine);
            }
            ledger.get_mining_template(&self.mining_address)
        };

        let mined = tokio::task::spawn_blocking(move || {
            let mut block = template.into_block();
            block.mine();
            block
        })
        .await
        .expect("mining task panicked");

        let mut ledger = self.ledger.write().await;
        ledger.commit_block(mined.clone())?;
        Ok(mined)
    }

    pub async fn mine_and_broadcast(&self) -> Result<Block, LedgerError> {
        let block = self.mine_block().await?;
        self.broadcast_block(&block).await;
        Ok(block)
    }

    // Start the backup mining loop. The primary trigger is the synchronous
    // path in handle_new_transaction; this loop catches transactions that
    // arrived while a block was already being mined.
    pub async fn start_mining(self: &Arc<Self>) {
        if !self.miner_mode {
            warn!("Cannot start mining: node is not in miner mode");
            return;
        }

        let mut task = self.mining_task.lock().await;
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            info!("Background mining is already running");
            return;
        }

        self.running.store(true, Ordering::SeqCst);
        let node = Arc::clone(self);
        *task = Some(tokio::spawn(async move {
            node.mining_loop().await;
        }));
        info!(
            "Started backup mining loop (checks every {} seconds)",
            self.mining_interval
        );
    }

    // Ask the loop to stop. Observed between ticks; a block being mined is
    // finished, not interrupted.
    pub async fn stop_mining(&self) {
        self.running.store(false, Ordering::SeqCst);
        info!("Stopped mining");
    }

    async fn mining_loop(&self) {
        while self.running.load(Ordering::SeqCst) {
            let pending = {
                let ledger = self.ledger.read().await;
                ledger.non_system_pending_count()
            };

            if pending == TRANSACTIONS_PER_BLOCK {
                info!("Mining new block with {} transactions...", pending);
                match self.mine_and_broadcast().await {
                    Ok(block) => info!("Mined new block with index {}", block.get_index()),
                    Err(e) => warn!("Backup mining attempt failed: {}", e),
                }
            } else if pending > 0 {
                info!(
                    "Waiting for more transactions... Currently have {}/{}",
                    pending, TRANSACTIONS_PER_BLOCK
                );
            } else {
                debug!("No pending transactions to mine");
            }

            sleep(Duration::from_secs(self.mining_interval)).await;
        }
        info!("Mining loop exited");
    }

    // Registered peers currently considered alive. A peer without a fresh
    // announcement can be rescued by a direct probe when force_probe is set;
    // probes run outside the registry lock.
    pub async fn active_peers(&self, exclude_self: bool, force_probe: bool) -> Vec<PeerEntry> {
        let snapshot = {
            let registry = self.registry.read().await;
            registry.get_peers().to_vec()
        };

        let mut active = Vec::new();
        for peer in snapshot {
            let is_self = {
                let registry = self.registry.read().await;
                registry.is_self(peer.get_host(), peer.get_port())
            };
            if exclude_self && is_self {
                continue;
            }

            let fresh = {
                let registry = self.registry.read().await;
                registry.is_active(peer.get_host(), peer.get_port())
            };
            if fresh {
                active.push(peer);
                continue;
            }

            if force_probe && self.probe(peer.get_host(), peer.get_port()).await {
                let mut registry = self.registry.write().await;
                registry.mark_active(peer.get_host(), peer.get_port());
                drop(registry);
                active.push(peer);
            }
        }

        active
    }

    // Direct liveness check against a peer's /nodes/info
    async fn probe(&self, host: &str, port: u16) -> bool {
        let url = format!("http://{}:{}/nodes/info", host, port);
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(LIVENESS_PROBE_TIMEOUT_SECS))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                debug!("Node {}:{} is active through direct ping", host, port);
                true
            }
            _ => false,
        }
    }

    // What this node announces about itself, including its view of who else
    // is active so the knowledge spreads
    pub async fn build_announcement(&self) -> NodeAnnouncement {
        let registry = self.registry.read().await;
        NodeAnnouncement {
            host: self.host.clone(),
            port: self.port,
            node_type: self.get_node_type(),
            name: format!("Node {}:{}", self.host, self.port),
            active_nodes: registry.get_active_nodes_info(),
        }
    }

    // Announce this node to every registered peer and incorporate what each
    // peer answers about itself and its known actives
    pub async fn announce_to_peers(&self) -> usize {
        {
            let mut registry = self.registry.write().await;
            registry.mark_active(&self.host, self.port);
        }
        let announcement = self.build_announcement().await;
        let peers = {
            let registry = self.registry.read().await;
            registry.get_peers().to_vec()
        };

        let mut announced = 0;
        for peer in &peers {
            let is_self = {
                let registry = self.registry.read().await;
                registry.is_self(peer.get_host(), peer.get_port())
            };
            if is_self {
                continue;
            }

            let url = format!("{}/nodes/announce", peer.get_url());
            match self
                .client
                .post(&url)
                .json(&announcement)
                .timeout(Duration::from_secs(LIVENESS_PROBE_TIMEOUT_SECS))
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    announced += 1;
                    debug!("Successfully announced to {}", peer.get_url());
                    match response.json::<AnnounceResponse>().await {
                        Ok(body) => {
                            let mut registry = self.registry.write().await;
                            registry.record_active(
                                &body.node.host,
                                body.node.port,
                                body.node.node_type,
                                Some(body.node.name),
                            );
                            for node in body.node.active_nodes {
                                registry.record_active(
                                    &node.host,
                                    node.port,
                                    node.node_type,
                                    node.name,
                                );
                            }
                        }
                        Err(e) => warn!("Malformed announce response from {}: {}", url, e),
                    }
                }
                Ok(response) => warn!(
                    "Failed to announce to {}: HTTP {}",
                    peer.get_url(),
                    response.status()
                ),
                Err(e) => warn!("Failed to announce to {}: {}", peer.get_url(), e),
            }
        }

        info!("Announced to {} peers", announced);
        announced
    }

    // Join the network through an existing node: hand it our URL, learn its
    // peer list and sync our chain to the network's
    pub async fn register_with_node(&self, url: &str) -> bool {
        let Some((host, port)) = parse_node_url(url) else {
            error!("Invalid node URL: {}", url);
            return false;
        };

        let is_self = {
            let registry = self.registry.read().await;
            registry.is_self(&host, port)
        };
        if is_self {
            warn!("Cannot register with self");
            return false;
        }

        if !self.probe(&host, port).await {
            error!("Node at {}:{} is not active", host, port);
            return false;
        }

        let target = format!("http://{}:{}", host, port);
        let request = RegisterNodesRequest {
            nodes: Some(vec![format!("http://{}:{}", self.host, self.port)]),
        };
        let accepted = match self
            .client
            .post(format!("{}/nodes/register", target))
            .json(&request)
            .timeout(Duration::from_secs(BROADCAST_TIMEOUT_SECS))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                error!("Failed to register with node {}:{}: {}", host, port, e);
                false
            }
        };
        if !accepted {
            return false;
        }

        {
            let mut registry = self.registry.write().await;
            registry.register(&target);
            registry.mark_active(&host, port);
        }

        // Import the peers the other node already knows about
        if let Ok(response) = self
            .client
            .get(format!("{}/nodes/peers", target))
            .timeout(Duration::from_secs(BROADCAST_TIMEOUT_SECS))
            .send()
            .await
        {
            if let Ok(body) = response.json::<PeersResponse>().await {
                let mut registry = self.registry.write().await;
                for node in body.nodes {
                    registry.register(&node.url);
                }
            }
        }

        self.consensus().await;
        info!("Successfully registered with node at {}", target);
        true
    }

    pub async fn get_info(&self) -> NodeInfoResponse {
        let (chain_length, pending_transactions) = {
            let ledger = self.ledger.read().await;
            (ledger.get_chain_length(), ledger.get_pending().len())
        };
        let registered_nodes = {
            let registry = self.registry.read().await;
            registry.get_peer_count()
        };
        // Liveness windows only: /nodes/info is itself the probe target, so
        // probing from here would let two nodes ping-pong requests forever
        let active_nodes = self.active_peers(true, false).await.len();

        NodeInfoResponse {
            address: self.node_id.clone(),
            host: self.host.clone(),
            port: self.port,
            node_type: self.get_node_type(),
            chain_length,
            pending_transactions,
            registered_nodes,
            active_nodes,
            is_mining: self.is_mining(),
            miner_mode: self.miner_mode,
        }
    }
}
