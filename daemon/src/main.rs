use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

use minichain_common::config::VERSION;
use minichain_daemon::{
    cli,
    config::NodeConfig,
    core::ledger::Ledger,
    logger,
    node::Node,
    p2p::PeerRegistry,
    rpc,
};

#[actix_web::main]
async fn main() -> Result<()> {
    let config = NodeConfig::parse();
    logger::init(config.log_level).context("Failed to initialize logger")?;
    info!("Minichain daemon v{}", VERSION);

    let ledger = Ledger::new(config.difficulty);
    let registry = PeerRegistry::load_or_create(
        &config.nodes_config_file,
        &config.host,
        config.port,
        config.node_type,
    )
    .context("Failed to load the peer config")?;
    let node = Arc::new(Node::new(&config, ledger, registry));

    // Join the network through any peers given on the command line
    for peer in &config.peers {
        if node.register_with_node(peer).await {
            info!("Connected to peer: {}", peer);
        } else {
            warn!("Failed to connect to peer: {}", peer);
        }
    }

    info!("Announcing this node to the network...");
    node.announce_to_peers().await;

    if node.is_miner() {
        info!(
            "Starting miner node with mining interval of {} seconds",
            config.mining_interval
        );
        node.start_mining().await;
    } else {
        info!("Starting full node (non-mining mode)");
    }

    let bind_address = format!("{}:{}", config.host, config.port);
    let server = rpc::start_rpc_server(node.clone(), &bind_address)?;

    if config.cli {
        // The API keeps serving in the background while the REPL owns stdin
        let handle = server.handle();
        tokio::spawn(server);
        cli::run(format!("http://{}:{}", node.get_host(), node.get_port())).await?;
        handle.stop(true).await;
    } else {
        server.await.context("RPC server terminated abnormally")?;
    }

    Ok(())
}
