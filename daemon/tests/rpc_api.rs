// End-to-end tests of the HTTP surface against a real node wired to a fresh
// ledger and a peer registry in a temporary directory.

use std::sync::Arc;

use actix_http::Request;
use actix_web::{
    body::MessageBody,
    dev::{Service, ServiceResponse},
    http::StatusCode,
    test, web, App,
};
use clap::Parser;
use serde_json::{json, Value};
use tempdir::TempDir;

use minichain_daemon::{config::NodeConfig, core::ledger::Ledger, node::Node, p2p::PeerRegistry, rpc};

fn test_config(node_type: &str, difficulty: usize) -> NodeConfig {
    let difficulty = difficulty.to_string();
    NodeConfig::parse_from([
        "minichain_daemon",
        "--host",
        "localhost",
        "--port",
        "5000",
        "--node-type",
        node_type,
        "--difficulty",
        difficulty.as_str(),
    ])
}

// The TempDir must outlive the node so the peer config file stays around
fn test_node(node_type: &str, difficulty: usize) -> (Arc<Node>, TempDir) {
    let dir = TempDir::new("minichain-rpc").unwrap();
    let config = test_config(node_type, difficulty);
    let registry = PeerRegistry::load_or_create(
        dir.path().join("nodes_config.json"),
        &config.host,
        config.port,
        config.node_type,
    )
    .unwrap();
    let node = Arc::new(Node::new(&config, Ledger::new(difficulty), registry));
    (node, dir)
}

async fn test_app(
    node: Arc<Node>,
) -> impl Service<Request, Response = ServiceResponse<impl MessageBody>, Error = actix_web::Error>
{
    test::init_service(
        App::new()
            .app_data(web::Data::new(node))
            .configure(rpc::rpc::register_routes),
    )
    .await
}

async fn get_json<S, B>(app: &S, path: &str) -> (StatusCode, Value)
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let resp = test::call_service(app, test::TestRequest::get().uri(path).to_request()).await;
    let status = resp.status();
    (status, test::read_body_json(resp).await)
}

async fn post_json<S, B>(app: &S, path: &str, body: Value) -> (StatusCode, Value)
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let resp = test::call_service(
        app,
        test::TestRequest::post()
            .uri(path)
            .set_json(body)
            .to_request(),
    )
    .await;
    let status = resp.status();
    (status, test::read_body_json(resp).await)
}

#[actix_web::test]
async fn submitting_a_transfer_updates_balances_and_blocks_duplicates() {
    let (node, _dir) = test_node("full", 2);
    let app = test_app(node).await;

    let (status, body) = post_json(
        &app,
        "/transactions/new",
        json!({ "sender": "alice", "recipient": "bob", "amount": 30 }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Transaction added to pool");
    assert_eq!(body["transaction"]["sender"], "alice");

    let (status, body) = get_json(&app, "/balance/alice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], json!(70.0));
    let (_, body) = get_json(&app, "/balance/bob").await;
    assert_eq!(body["balance"], json!(30.0));

    // Same parties, same amount: caught as a double-click duplicate
    let (status, body) = post_json(
        &app,
        "/transactions/new",
        json!({ "sender": "alice", "recipient": "bob", "amount": 30 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["reason"], "Duplicate transaction");
}

#[actix_web::test]
async fn overspending_is_rejected_and_recorded() {
    let (node, _dir) = test_node("full", 2);
    let app = test_app(node).await;

    let (status, body) = post_json(
        &app,
        "/transactions/new",
        json!({ "sender": "alice", "recipient": "bob", "amount": 150 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Transaction rejected");
    assert_eq!(body["reason"], "Insufficient funds: 100.0 < 150.0");

    let (status, body) = get_json(&app, "/transactions/rejected").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(
        body["transactions"][0]["reason"],
        "Insufficient funds: 100.0 < 150.0"
    );
}

#[actix_web::test]
async fn missing_fields_fail_validation() {
    let (node, _dir) = test_node("full", 2);
    let app = test_app(node).await;

    let (status, body) = post_json(
        &app,
        "/transactions/new",
        json!({ "sender": "alice", "amount": 10 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid request");
}

#[actix_web::test]
async fn relayed_transactions_keep_their_identity() {
    let (node, _dir) = test_node("full", 2);
    let app = test_app(node.clone()).await;

    // A peer relay carries full metadata and the loop-suppression header
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/transactions/new")
            .insert_header(("X-Source-Type", "node_broadcast"))
            .insert_header(("X-Source-Node", "localhost:5001"))
            .set_json(json!({
                "sender": "alice",
                "recipient": "bob",
                "amount": 12.5,
                "timestamp": 1700000000.25,
                "signature": "adadadadadadadadadadadadadadadad",
            }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    // The metadata the content hash depends on was preserved, not regenerated
    assert_eq!(body["transaction"]["timestamp"], json!(1700000000.25));
    assert_eq!(
        body["transaction"]["signature"],
        "adadadadadadadadadadadadadadadad"
    );

    let (_, body) = get_json(&app, "/transactions/pending").await;
    assert_eq!(body["count"], 1);
}

#[actix_web::test]
async fn chain_and_block_lookup() {
    let (node, _dir) = test_node("full", 2);
    let app = test_app(node).await;

    let (status, body) = get_json(&app, "/chain").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["length"], 1);
    assert_eq!(body["chain"][0]["previous_hash"], "0");

    let (status, body) = get_json(&app, "/chain/validate").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);

    let (status, body) = get_json(&app, "/blocks/0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["index"], 0);

    let (status, body) = get_json(&app, "/blocks/7").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not found");
}

#[actix_web::test]
async fn unknown_endpoints_answer_structured_404() {
    let (node, _dir) = test_node("full", 2);
    let app = test_app(node).await;

    let (status, body) = get_json(&app, "/no/such/route").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["reason"], "Unknown endpoint");
}

#[actix_web::test]
async fn mining_endpoints_are_forbidden_on_full_nodes() {
    let (node, _dir) = test_node("full", 2);
    let app = test_app(node).await;

    for path in ["/mine", "/mine/start", "/mine/stop"] {
        let (status, body) = get_json(&app, path).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Forbidden");
    }
}

#[actix_web::test]
async fn mining_with_an_empty_pool_is_a_client_error() {
    let (node, _dir) = test_node("miner", 1);
    let app = test_app(node).await;

    let (status, body) = get_json(&app, "/mine").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["reason"], "no pending transactions to mine");
}

#[actix_web::test]
async fn explicit_mine_produces_a_block_and_pays_the_miner() {
    let (node, _dir) = test_node("miner", 1);
    let app = test_app(node.clone()).await;

    post_json(
        &app,
        "/transactions/new",
        json!({ "sender": "alice", "recipient": "bob", "amount": 10 }),
    )
    .await;

    let (status, body) = get_json(&app, "/mine").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "New block mined");
    assert_eq!(body["block"]["index"], 1);

    let (_, body) = get_json(&app, "/chain").await;
    assert_eq!(body["length"], 2);
    let (_, body) = get_json(&app, "/transactions/pending").await;
    assert_eq!(body["count"], 0);

    let miner = node.get_mining_address().to_owned();
    let (_, body) = get_json(&app, &format!("/balance/{}", miner)).await;
    assert_eq!(body["balance"], json!(1.0));
}

#[actix_web::test]
async fn third_admitted_transaction_triggers_mining_on_a_miner() {
    let (node, _dir) = test_node("miner", 1);
    let app = test_app(node.clone()).await;

    for (sender, recipient, amount) in
        [("alice", "bob", 10.0), ("bob", "carol", 5.0), ("carol", "alice", 2.0)]
    {
        let (status, _) = post_json(
            &app,
            "/transactions/new",
            json!({ "sender": sender, "recipient": recipient, "amount": amount }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    // The third admission mined synchronously
    let (_, body) = get_json(&app, "/chain").await;
    assert_eq!(body["length"], 2);
    let (_, body) = get_json(&app, "/transactions/pending").await;
    assert_eq!(body["count"], 0);
    let (_, body) = get_json(&app, "/chain/validate").await;
    assert_eq!(body["valid"], true);

    let miner = node.get_mining_address().to_owned();
    let (_, body) = get_json(&app, &format!("/balance/{}", miner)).await;
    assert_eq!(body["balance"], json!(1.0));
}

#[actix_web::test]
async fn receiving_the_same_block_twice_leaves_the_chain_unchanged() {
    let (miner_node, _dir_a) = test_node("miner", 1);
    let miner_app = test_app(miner_node.clone()).await;
    post_json(
        &miner_app,
        "/transactions/new",
        json!({ "sender": "alice", "recipient": "bob", "amount": 10 }),
    )
    .await;
    let (_, body) = get_json(&miner_app, "/mine").await;
    let block = body["block"].clone();

    let (node, _dir_b) = test_node("full", 1);
    let app = test_app(node).await;

    // The block extends this node's genesis only in index terms; its
    // previous_hash points at the miner's genesis, so it must be refused
    let (status, _) = post_json(&app, "/blocks/new", block.clone()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Against the node that mined it, a replay is idempotent: rejected, and
    // the chain stays as it was
    let (_, before) = get_json(&miner_app, "/chain").await;
    let (status, _) = post_json(&miner_app, "/blocks/new", block).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (_, after) = get_json(&miner_app, "/chain").await;
    assert_eq!(before, after);
}

#[actix_web::test]
async fn peer_registration_and_listing() {
    let (node, _dir) = test_node("full", 2);
    let app = test_app(node).await;

    let (status, body) = post_json(
        &app,
        "/nodes/register",
        json!({ "nodes": ["http://192.168.1.20:5001", "http://localhost:5000"] }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    // Registering ourselves is refused, the other node goes through
    assert_eq!(body["message"], "Registered 1 new nodes");
    assert_eq!(body["total_nodes"], 2);

    let (status, body) = get_json(&app, "/nodes/peers").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_count"], 2);
    // Only this node itself counts as active, the new peer never announced
    assert_eq!(body["active_count"], 1);

    let (status, body) = post_json(&app, "/nodes/register", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid request");
}

#[actix_web::test]
async fn announcements_are_recorded_and_answered_in_kind() {
    let (node, _dir) = test_node("full", 2);
    let app = test_app(node).await;

    let (status, body) = post_json(
        &app,
        "/nodes/announce",
        json!({
            "host": "192.168.1.30",
            "port": 5002,
            "node_type": "miner",
            "name": "Miner Node",
            "active_nodes": [],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Node 192.168.1.30:5002 recorded as active");
    // The response describes us so the announcer learns about this node too
    assert_eq!(body["node"]["host"], "localhost");
    assert_eq!(body["node"]["port"], 5000);
    assert_eq!(body["node"]["node_type"], "full");

    let (_, body) = get_json(&app, "/nodes/info").await;
    assert_eq!(body["active_nodes"], 1);
    assert_eq!(body["registered_nodes"], 2);

    let (status, body) = post_json(&app, "/nodes/announce", json!({ "host": "x" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid request");
}

#[actix_web::test]
async fn node_info_describes_the_node() {
    let (node, _dir) = test_node("miner", 2);
    let app = test_app(node).await;

    let (status, body) = get_json(&app, "/nodes/info").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["host"], "localhost");
    assert_eq!(body["port"], 5000);
    assert_eq!(body["node_type"], "miner");
    assert_eq!(body["miner_mode"], true);
    assert_eq!(body["is_mining"], false);
    assert_eq!(body["chain_length"], 1);
    assert_eq!(body["pending_transactions"], 0);
}

#[actix_web::test]
async fn resolve_without_longer_peers_keeps_our_chain() {
    let (node, _dir) = test_node("full", 2);
    let app = test_app(node).await;

    let (status, body) = get_json(&app, "/nodes/resolve").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Our chain is authoritative");
    assert_eq!(body["chain"].as_array().unwrap().len(), 1);
}

#[actix_web::test]
async fn address_history_endpoint() {
    let (node, _dir) = test_node("miner", 1);
    let app = test_app(node).await;

    post_json(
        &app,
        "/transactions/new",
        json!({ "sender": "alice", "recipient": "bob", "amount": 10 }),
    )
    .await;
    get_json(&app, "/mine").await;

    let (status, body) = get_json(&app, "/transactions/address/alice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["transactions"][0]["block_index"], 1);

    let (_, body) = get_json(&app, "/transactions/address/nobody").await;
    assert_eq!(body["count"], 0);
}
