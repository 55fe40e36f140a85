use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use minichain_common::{
    api::daemon::{AnnouncedNode, PeerStatus},
    config::ACTIVITY_TIMEOUT_SECS,
    network::NodeType,
    time::{get_current_time_in_seconds, TimestampSeconds},
};

use super::{normalize_host, parse_node_url};

#[derive(Debug, Error)]
pub enum PeerListError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed peer config: {0}")]
    Json(#[from] serde_json::Error),
}

// A peer as persisted in the config file
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PeerEntry {
    host: String,
    port: u16,
    name: String,
    node_type: NodeType,
}

impl PeerEntry {
    pub fn get_host(&self) -> &str {
        &self.host
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_node_type(&self) -> NodeType {
        self.node_type
    }

    pub fn get_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    fn default_name(host: &str, port: u16) -> String {
        format!("Node {}:{}", host, port)
    }
}

#[derive(Serialize, Deserialize)]
struct PeerConfigFile {
    nodes: Vec<PeerEntry>,
}

// The persisted peer list plus the in-memory liveness table. Pure state: the
// only I/O here is the config file, opened and closed within each mutation.
// Liveness probing and announcing are network operations and live on the
// Node, which runs them outside the registry lock.
pub struct PeerRegistry {
    peers: Vec<PeerEntry>,
    // host:port -> unix seconds of the last announcement or successful probe
    active_nodes: HashMap<String, TimestampSeconds>,
    config_file: PathBuf,
    local_host: String,
    local_port: u16,
}

impl PeerRegistry {
    // Load the peer list, creating the default config with a single primary
    // entry when the file does not exist yet
    pub fn load_or_create(
        config_file: impl Into<PathBuf>,
        local_host: &str,
        local_port: u16,
        local_type: NodeType,
    ) -> Result<Self, PeerListError> {
        let config_file = config_file.into();

        if !config_file.exists() {
            warn!(
                "Peer config {} not found, creating default",
                config_file.display()
            );
            let default = PeerConfigFile {
                nodes: vec![PeerEntry {
                    host: "localhost".to_owned(),
                    port: 5000,
                    name: "Primary Node".to_owned(),
                    node_type: local_type,
                }],
            };
            write_config(&config_file, &default)?;
        }

        let content = fs::read_to_string(&config_file)?;
        let peers = match serde_json::from_str::<PeerConfigFile>(&content) {
            Ok(config) => {
                info!(
                    "Loaded {} registered nodes from {}",
                    config.nodes.len(),
                    config_file.display()
                );
                config.nodes
            }
            Err(e) => {
                error!("Error loading peer config: {}", e);
                Vec::new()
            }
        };

        Ok(PeerRegistry {
            peers,
            active_nodes: HashMap::new(),
            config_file,
            local_host: normalize_host(local_host),
            local_port,
        })
    }

    pub fn get_peers(&self) -> &[PeerEntry] {
        &self.peers
    }

    pub fn get_peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn is_self(&self, host: &str, port: u16) -> bool {
        normalize_host(host) == self.local_host && port == self.local_port
    }

    // Register a peer URL in the config. Self, duplicates and malformed URLs
    // are refused.
    pub fn register(&mut self, url: &str) -> bool {
        let Some((host, port)) = parse_node_url(url) else {
            error!("Invalid node URL: {}", url);
            return false;
        };

        if self.is_self(&host, port) {
            warn!("Cannot register self as peer");
            return false;
        }

        if self.find(&host, port).is_some() {
            info!("Node {}:{} already registered", host, port);
            return false;
        }

        info!("Registered new node: {}:{}", host, port);
        self.peers.push(PeerEntry {
            name: PeerEntry::default_name(&host, port),
            host,
            port,
            node_type: NodeType::Unknown,
        });
        self.persist();
        true
    }

    // Stamp a node as active following its announcement and upsert what it
    // told us about itself into the peer list
    pub fn record_active(
        &mut self,
        host: &str,
        port: u16,
        node_type: NodeType,
        name: Option<String>,
    ) {
        let host = normalize_host(host);
        self.active_nodes
            .insert(peer_key(&host, port), get_current_time_in_seconds());

        match self.find_mut(&host, port) {
            Some(entry) => {
                entry.node_type = node_type;
                if let Some(name) = name {
                    entry.name = name;
                }
                debug!("Updated node {}:{} status to active", host, port);
            }
            None => {
                info!("Added new active node {}:{}", host, port);
                self.peers.push(PeerEntry {
                    name: name.unwrap_or_else(|| PeerEntry::default_name(&host, port)),
                    host,
                    port,
                    node_type,
                });
            }
        }
        self.persist();
    }

    // Refresh the liveness timestamp only, without touching the peer list.
    // Used after a successful direct probe.
    pub fn mark_active(&mut self, host: &str, port: u16) {
        let host = normalize_host(host);
        self.active_nodes
            .insert(peer_key(&host, port), get_current_time_in_seconds());
    }

    // Active within the announcement window. The node itself is always
    // active. A stale peer may still be proven alive by a direct probe, which
    // the Node performs before giving up on it.
    pub fn is_active(&self, host: &str, port: u16) -> bool {
        let host = normalize_host(host);
        if self.is_self(&host, port) {
            return true;
        }

        self.has_fresh_announcement(&host, port)
    }

    fn has_fresh_announcement(&self, host: &str, port: u16) -> bool {
        match self.active_nodes.get(&peer_key(host, port)) {
            Some(last_seen) => {
                get_current_time_in_seconds().saturating_sub(*last_seen) < ACTIVITY_TIMEOUT_SECS
            }
            None => false,
        }
    }

    // Peers with a fresh announcement, in the shape shared inside
    // announcements
    pub fn get_active_nodes_info(&self) -> Vec<AnnouncedNode> {
        self.peers
            .iter()
            .filter(|peer| self.has_fresh_announcement(&peer.host, peer.port))
            .map(|peer| AnnouncedNode {
                host: peer.host.clone(),
                port: peer.port,
                node_type: peer.node_type,
                name: Some(peer.name.clone()),
            })
            .collect()
    }

    // Every registered peer with its current liveness flag
    pub fn get_peer_statuses(&self) -> Vec<PeerStatus> {
        self.peers
            .iter()
            .map(|peer| PeerStatus {
                host: peer.host.clone(),
                port: peer.port,
                name: peer.name.clone(),
                node_type: peer.node_type,
                active: self.is_active(&peer.host, peer.port),
                url: peer.get_url(),
            })
            .collect()
    }

    fn find(&self, host: &str, port: u16) -> Option<&PeerEntry> {
        self.peers
            .iter()
            .find(|peer| peer.host == host && peer.port == port)
    }

    fn find_mut(&mut self, host: &str, port: u16) -> Option<&mut PeerEntry> {
        self.peers
            .iter_mut()
            .find(|peer| peer.host == host && peer.port == port)
    }

    fn persist(&self) {
        let config = PeerConfigFile {
            nodes: self.peers.clone(),
        };
        if let Err(e) = write_config(&self.config_file, &config) {
            error!("Failed to persist peer list: {}", e);
        }
    }
}

fn peer_key(host: &str, port: u16) -> String {
    format!("{}:{}", host, port)
}

fn write_config(path: &Path, config: &PeerConfigFile) -> Result<(), PeerListError> {
    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    fn registry(dir: &TempDir) -> PeerRegistry {
        PeerRegistry::load_or_create(
            dir.path().join("nodes_config.json"),
            "localhost",
            5000,
            NodeType::Full,
        )
        .unwrap()
    }

    #[test]
    fn creates_default_config_on_first_start() {
        let dir = TempDir::new("minichain").unwrap();
        let registry = registry(&dir);

        assert!(dir.path().join("nodes_config.json").exists());
        assert_eq!(registry.get_peer_count(), 1);
        assert_eq!(registry.get_peers()[0].get_name(), "Primary Node");
    }

    #[test]
    fn registration_survives_a_reload() {
        let dir = TempDir::new("minichain").unwrap();
        {
            let mut registry = registry(&dir);
            assert!(registry.register("http://192.168.1.20:5001"));
        }

        let reloaded = registry(&dir);
        assert_eq!(reloaded.get_peer_count(), 2);
        assert_eq!(reloaded.get_peers()[1].get_host(), "192.168.1.20");
    }

    #[test]
    fn refuses_self_duplicates_and_malformed_urls() {
        let dir = TempDir::new("minichain").unwrap();
        let mut registry = registry(&dir);

        // The default primary entry is this node itself
        assert!(!registry.register("http://localhost:5000"));
        assert!(!registry.register("http://127.0.0.1:5000"));
        assert!(!registry.register("http://"));

        assert!(registry.register("localhost:5001"));
        assert!(!registry.register("http://localhost:5001"));
        assert_eq!(registry.get_peer_count(), 2);
    }

    #[test]
    fn record_active_upserts_peer_details() {
        let dir = TempDir::new("minichain").unwrap();
        let mut registry = registry(&dir);

        registry.record_active("192.168.1.30", 5002, NodeType::Miner, None);
        assert!(registry.is_active("192.168.1.30", 5002));
        assert_eq!(registry.get_peer_count(), 2);

        // A later announcement updates what we know about the peer
        registry.record_active(
            "192.168.1.30",
            5002,
            NodeType::Full,
            Some("Renamed".to_owned()),
        );
        assert_eq!(registry.get_peer_count(), 2);
        let entry = registry.find("192.168.1.30", 5002).unwrap();
        assert_eq!(entry.get_node_type(), NodeType::Full);
        assert_eq!(entry.get_name(), "Renamed");
    }

    #[test]
    fn activity_expires_after_the_timeout() {
        let dir = TempDir::new("minichain").unwrap();
        let mut registry = registry(&dir);
        registry.register("http://192.168.1.40:5003");

        assert!(!registry.is_active("192.168.1.40", 5003));
        registry.mark_active("192.168.1.40", 5003);
        assert!(registry.is_active("192.168.1.40", 5003));

        // Age the record past the window
        registry.active_nodes.insert(
            peer_key("192.168.1.40", 5003),
            get_current_time_in_seconds() - ACTIVITY_TIMEOUT_SECS - 1,
        );
        assert!(!registry.is_active("192.168.1.40", 5003));
    }

    #[test]
    fn self_is_always_active() {
        let dir = TempDir::new("minichain").unwrap();
        let registry = registry(&dir);
        assert!(registry.is_active("localhost", 5000));
        assert!(registry.is_active("127.0.0.1", 5000));
    }

    #[test]
    fn active_nodes_info_only_lists_fresh_peers() {
        let dir = TempDir::new("minichain").unwrap();
        let mut registry = registry(&dir);
        registry.register("http://192.168.1.50:5004");

        assert!(registry.get_active_nodes_info().is_empty());
        registry.record_active("192.168.1.50", 5004, NodeType::Full, None);

        let info = registry.get_active_nodes_info();
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].host, "192.168.1.50");
    }

    #[test]
    fn statuses_carry_urls_and_liveness() {
        let dir = TempDir::new("minichain").unwrap();
        let mut registry = registry(&dir);
        registry.register("http://192.168.1.60:5005");

        let statuses = registry.get_peer_statuses();
        assert_eq!(statuses.len(), 2);
        // Self is always active, the fresh registration is not
        assert!(statuses[0].active);
        assert!(!statuses[1].active);
        assert_eq!(statuses[1].url, "http://192.168.1.60:5005");
    }

    #[test]
    fn malformed_config_starts_with_an_empty_peer_list() {
        let dir = TempDir::new("minichain").unwrap();
        let path = dir.path().join("nodes_config.json");
        fs::write(&path, "{not json").unwrap();

        let registry =
            PeerRegistry::load_or_create(&path, "localhost", 5000, NodeType::Full).unwrap();
        assert_eq!(registry.get_peer_count(), 0);
    }
}
