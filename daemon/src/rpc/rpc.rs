use std::sync::Arc;

use actix_web::{
    error::InternalError, http::StatusCode, web, HttpRequest, HttpResponse, ResponseError,
};
use serde_json::json;

use minichain_common::{
    api::daemon::{AnnounceRequest, NewTransactionRequest, RegisterNodesRequest},
    block::Block,
    transaction::Transaction,
};

use crate::{
    core::error::RejectReason,
    node::{Node, NODE_BROADCAST, SOURCE_NODE_HEADER, SOURCE_TYPE_HEADER},
};

type NodeData = web::Data<Arc<Node>>;

// Every failure crossing the RPC boundary becomes a {error, reason} JSON body
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Rejected(#[from] RejectReason),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Rejected(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error = match self {
            ApiError::Validation(_) => "Invalid request",
            ApiError::Rejected(_) => "Transaction rejected",
            ApiError::NotFound(_) => "Not found",
            ApiError::Forbidden(_) => "Forbidden",
        };
        HttpResponse::build(self.status_code()).json(json!({
            "error": error,
            "reason": self.to_string(),
        }))
    }
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    // Malformed JSON bodies also answer in the structured error shape
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _| {
        let body = HttpResponse::BadRequest().json(json!({
            "error": "Invalid request",
            "reason": err.to_string(),
        }));
        InternalError::from_response(err, body).into()
    }));

    cfg.route("/chain", web::get().to(get_chain))
        .route("/chain/validate", web::get().to(validate_chain))
        .route("/transactions/new", web::post().to(new_transaction))
        .route(
            "/transactions/pending",
            web::get().to(get_pending_transactions),
        )
        .route(
            "/transactions/rejected",
            web::get().to(get_rejected_transactions),
        )
        .route(
            "/transactions/address/{address}",
            web::get().to(get_address_transactions),
        )
        .route("/blocks/new", web::post().to(new_block))
        .route("/blocks/{index}", web::get().to(get_block))
        .route("/mine", web::get().to(mine))
        .route("/mine/start", web::get().to(start_mining))
        .route("/mine/stop", web::get().to(stop_mining))
        .route("/nodes/announce", web::post().to(announce_node))
        .route("/nodes/register", web::post().to(register_nodes))
        .route("/nodes/peers", web::get().to(get_peers))
        .route("/nodes/resolve", web::get().to(resolve_conflicts))
        .route("/nodes/info", web::get().to(node_info))
        .route("/balance/{address}", web::get().to(get_balance))
        .default_service(web::route().to(not_found));
}

fn is_node_broadcast(req: &HttpRequest) -> bool {
    req.headers()
        .get(SOURCE_TYPE_HEADER)
        .and_then(|value| value.to_str().ok())
        == Some(NODE_BROADCAST)
}

fn source_node(req: &HttpRequest) -> String {
    req.headers()
        .get(SOURCE_NODE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown")
        .to_owned()
}

async fn get_chain(node: NodeData) -> HttpResponse {
    let ledger = node.ledger().read().await;
    HttpResponse::Ok().json(json!({
        "chain": ledger.get_chain(),
        "length": ledger.get_chain_length(),
    }))
}

async fn validate_chain(node: NodeData) -> HttpResponse {
    let ledger = node.ledger().read().await;
    HttpResponse::Ok().json(json!({
        "valid": ledger.is_chain_valid(),
        "length": ledger.get_chain_length(),
    }))
}

async fn new_transaction(
    node: NodeData,
    req: HttpRequest,
    body: web::Json<NewTransactionRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let (Some(sender), Some(recipient), Some(amount)) = (body.sender, body.recipient, body.amount)
    else {
        return Err(ApiError::Validation(
            "Missing required fields: sender, recipient, amount".to_owned(),
        ));
    };

    // A relayed transaction keeps the metadata its content hash depends on,
    // a user submission gets fresh metadata
    let transaction = match (body.timestamp, body.signature) {
        (Some(timestamp), Some(signature)) => {
            Transaction::with_metadata(sender, recipient, amount, timestamp, signature)
        }
        _ => Transaction::new(sender, recipient, amount),
    };

    let origin_is_broadcast = is_node_broadcast(&req);
    if origin_is_broadcast {
        info!(
            "Received transaction from peer node {}: {}",
            source_node(&req),
            transaction
        );
    } else {
        info!("Received new transaction via API: {}", transaction);
    }

    node.handle_new_transaction(transaction.clone(), origin_is_broadcast)
        .await?;

    Ok(HttpResponse::Created().json(json!({
        "message": "Transaction added to pool",
        "transaction": transaction,
    })))
}

async fn get_pending_transactions(node: NodeData) -> HttpResponse {
    let ledger = node.ledger().read().await;
    HttpResponse::Ok().json(json!({
        "transactions": ledger.get_pending(),
        "count": ledger.get_pending().len(),
    }))
}

async fn get_rejected_transactions(node: NodeData) -> HttpResponse {
    let ledger = node.ledger().read().await;
    HttpResponse::Ok().json(json!({
        "transactions": ledger.get_rejected(),
        "count": ledger.get_rejected().len(),
    }))
}

async fn get_address_transactions(node: NodeData, path: web::Path<String>) -> HttpResponse {
    let address = path.into_inner();
    let ledger = node.ledger().read().await;
    let transactions = ledger.get_transactions_for_address(&address);
    HttpResponse::Ok().json(json!({
        "count": transactions.len(),
        "transactions": transactions,
    }))
}

async fn new_block(
    node: NodeData,
    req: HttpRequest,
    body: web::Json<Block>,
) -> Result<HttpResponse, ApiError> {
    let block = body.into_inner();
    let origin_is_broadcast = is_node_broadcast(&req);
    if origin_is_broadcast {
        info!(
            "Received block #{} from peer node: {}",
            block.get_index(),
            source_node(&req)
        );
    } else {
        info!("Received new block #{} via API", block.get_index());
    }

    if node.handle_new_block(block.clone(), origin_is_broadcast).await {
        Ok(HttpResponse::Created().json(json!({
            "message": "Block added to chain",
            "block": block,
        })))
    } else {
        Err(ApiError::Validation(format!(
            "Block #{} was not accepted",
            block.get_index()
        )))
    }
}

async fn get_block(node: NodeData, path: web::Path<u64>) -> Result<HttpResponse, ApiError> {
    let index = path.into_inner();
    let ledger = node.ledger().read().await;
    match ledger.get_chain().get(index as usize) {
        Some(block) => Ok(HttpResponse::Ok().json(block)),
        None => Err(ApiError::NotFound(format!("No block at index {}", index))),
    }
}

fn require_miner(node: &Node) -> Result<(), ApiError> {
    if node.is_miner() {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "This node is not a miner node. Only miner nodes can mine blocks.".to_owned(),
        ))
    }
}

async fn mine(node: NodeData) -> Result<HttpResponse, ApiError> {
    require_miner(&node)?;

    match node.mine_and_broadcast().await {
        Ok(block) => Ok(HttpResponse::Ok().json(json!({
            "message": "New block mined",
            "block": block,
        }))),
        Err(e) => Err(ApiError::Validation(e.to_string())),
    }
}

async fn start_mining(node: NodeData) -> Result<HttpResponse, ApiError> {
    require_miner(&node)?;
    node.get_ref().start_mining().await;
    Ok(HttpResponse::Ok().json(json!({ "message": "Mining started" })))
}

async fn stop_mining(node: NodeData) -> Result<HttpResponse, ApiError> {
    require_miner(&node)?;
    node.stop_mining().await;
    Ok(HttpResponse::Ok().json(json!({ "message": "Mining stopped" })))
}

async fn announce_node(
    node: NodeData,
    body: web::Json<AnnounceRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let (Some(host), Some(port), Some(node_type)) = (body.host, body.port, body.node_type) else {
        return Err(ApiError::Validation(
            "Missing required node information".to_owned(),
        ));
    };

    let name = body
        .name
        .unwrap_or_else(|| format!("Node {}:{}", host, port));
    {
        let mut registry = node.registry().write().await;
        registry.record_active(&host, port, node_type, Some(name));
        // Learn the actives the announcing node knows about as well
        for peer in body.active_nodes {
            registry.record_active(&peer.host, peer.port, peer.node_type, peer.name);
        }
    }

    // Answer with our own info so the announcer learns about us too
    let our_info = node.build_announcement().await;
    Ok(HttpResponse::Ok().json(json!({
        "message": format!("Node {}:{} recorded as active", host, port),
        "node": our_info,
    })))
}

async fn register_nodes(
    node: NodeData,
    body: web::Json<RegisterNodesRequest>,
) -> Result<HttpResponse, ApiError> {
    let Some(nodes) = body.into_inner().nodes else {
        return Err(ApiError::Validation(
            "Please supply a valid list of nodes".to_owned(),
        ));
    };

    let mut registered = 0;
    let total_nodes = {
        let mut registry = node.registry().write().await;
        for url in &nodes {
            if registry.register(url) {
                registered += 1;
            }
        }
        registry.get_peer_count()
    };

    Ok(HttpResponse::Created().json(json!({
        "message": format!("Registered {} new nodes", registered),
        "total_nodes": total_nodes,
    })))
}

async fn get_peers(node: NodeData) -> HttpResponse {
    let registry = node.registry().read().await;
    let nodes = registry.get_peer_statuses();
    let active_count = nodes.iter().filter(|peer| peer.active).count();
    HttpResponse::Ok().json(json!({
        "active_count": active_count,
        "total_count": nodes.len(),
        "nodes": nodes,
    }))
}

async fn resolve_conflicts(node: NodeData) -> HttpResponse {
    let replaced = node.consensus().await;
    let ledger = node.ledger().read().await;

    if replaced {
        HttpResponse::Ok().json(json!({
            "message": "Chain was replaced",
            "new_chain": ledger.get_chain(),
        }))
    } else {
        HttpResponse::Ok().json(json!({
            "message": "Our chain is authoritative",
            "chain": ledger.get_chain(),
        }))
    }
}

async fn node_info(node: NodeData) -> HttpResponse {
    HttpResponse::Ok().json(node.get_info().await)
}

async fn get_balance(node: NodeData, path: web::Path<String>) -> HttpResponse {
    let address = path.into_inner();
    let ledger = node.ledger().read().await;
    HttpResponse::Ok().json(json!({
        "balance": ledger.get_balance(&address),
        "address": address,
    }))
}

async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(json!({
        "error": "Not found",
        "reason": "Unknown endpoint",
    }))
}
