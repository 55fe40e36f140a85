use clap::Parser;

use minichain_common::{
    config::{
        DEFAULT_DIFFICULTY, DEFAULT_HOST, DEFAULT_MINING_INTERVAL_SECS, DEFAULT_NODES_CONFIG_FILE,
        DEFAULT_PORT, VERSION,
    },
    get_cli_styles,
    network::NodeType,
};

#[derive(Parser, Clone, Debug)]
#[command(
    name = "minichain_daemon",
    version = VERSION,
    about = "Minichain blockchain daemon",
    styles = get_cli_styles()
)]
pub struct NodeConfig {
    /// Host to bind and identify as
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port for the HTTP API
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Mining difficulty (leading zero hex characters required on block hashes)
    #[arg(long, default_value_t = DEFAULT_DIFFICULTY)]
    pub difficulty: usize,

    /// Role of this node
    #[arg(long, value_enum, default_value_t = NodeType::Full)]
    pub node_type: NodeType,

    /// Seconds between backup mining checks (miner nodes)
    #[arg(long, default_value_t = DEFAULT_MINING_INTERVAL_SECS)]
    pub mining_interval: u64,

    /// Peer node URLs to register with on startup
    #[arg(long, num_args = 0..)]
    pub peers: Vec<String>,

    /// Run the interactive client alongside the API server
    #[arg(long)]
    pub cli: bool,

    /// Run the API server only (default when no mode is given)
    #[arg(long)]
    pub api: bool,

    /// Peer list file
    #[arg(long, default_value = DEFAULT_NODES_CONFIG_FILE)]
    pub nodes_config_file: String,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: log::LevelFilter,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NodeConfig::parse_from(["minichain_daemon"]);
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.node_type, NodeType::Full);
        assert!(!config.cli);
        assert!(config.peers.is_empty());
    }

    #[test]
    fn test_miner_flags() {
        let config = NodeConfig::parse_from([
            "minichain_daemon",
            "--node-type",
            "miner",
            "--difficulty",
            "2",
            "--mining-interval",
            "10",
            "--peers",
            "http://localhost:5000",
            "http://localhost:5001",
        ]);
        assert_eq!(config.node_type, NodeType::Miner);
        assert_eq!(config.difficulty, 2);
        assert_eq!(config.mining_interval, 10);
        assert_eq!(config.peers.len(), 2);
    }
}
