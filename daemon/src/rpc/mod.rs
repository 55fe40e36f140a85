pub mod rpc;

use std::sync::Arc;

use actix_web::{dev::Server, web, App, HttpServer};
use anyhow::Context;

use crate::node::Node;

// Build and bind the HTTP API. The returned server is a future the caller
// drives, so the CLI mode can run it in the background.
pub fn start_rpc_server(node: Arc<Node>, bind_address: &str) -> anyhow::Result<Server> {
    info!("Starting RPC server on {}", bind_address);

    let data = web::Data::new(node);
    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .configure(rpc::register_routes)
    })
    .bind(bind_address)
    .with_context(|| format!("Failed to bind RPC server on {}", bind_address))?
    .run();

    Ok(server)
}
