// Interactive client for a running node. Talks to the HTTP API only, so it
// can inspect any node in the network, not just the local one.

use std::io::Write;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};

use minichain_common::api::daemon::NodeInfoResponse;

pub struct CliClient {
    base_url: String,
    client: Client,
}

impl CliClient {
    pub fn new(base_url: String) -> Self {
        CliClient {
            base_url,
            client: Client::new(),
        }
    }

    async fn get(&self, path: &str) -> Result<(StatusCode, Value)> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .with_context(|| format!("request to {} failed", path))?;
        let status = response.status();
        let body = response.json().await.unwrap_or(Value::Null);
        Ok((status, body))
    }

    async fn post(&self, path: &str, body: Value) -> Result<(StatusCode, Value)> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("request to {} failed", path))?;
        let status = response.status();
        let body = response.json().await.unwrap_or(Value::Null);
        Ok((status, body))
    }

    fn show_help(&self) {
        println!("Available commands:");
        println!("  help                        Show this help");
        println!("  info                        Show node information");
        println!("  chain                       Show the blockchain");
        println!("  validate                    Validate the blockchain");
        println!("  balance <address>           Show the balance of an address");
        println!("  transaction <s> <r> <amt>   Submit a transfer");
        println!("  pending                     Show pending transactions");
        println!("  rejected                    Show rejected transactions");
        println!("  mine                        Mine a block now (miner nodes)");
        println!("  mining start|stop           Control background mining");
        println!("  peers                       Show registered peer nodes");
        println!("  register <url>              Register a peer node");
        println!("  consensus                   Resolve conflicts with peers");
        println!("  block <index>               Show a block");
        println!("  history <address>           Show transactions of an address");
        println!("  exit                        Quit");
    }

    async fn show_info(&self) -> Result<()> {
        let (_, body) = self.get("/nodes/info").await?;
        let info: NodeInfoResponse =
            serde_json::from_value(body).context("unexpected node info response")?;
        println!("Node {}:{} ({})", info.host, info.port, info.node_type);
        println!("  address:              {}", info.address);
        println!("  chain length:         {}", info.chain_length);
        println!("  pending transactions: {}", info.pending_transactions);
        println!("  registered nodes:     {}", info.registered_nodes);
        println!("  active nodes:         {}", info.active_nodes);
        println!("  mining:               {}", info.is_mining);
        Ok(())
    }

    async fn show_chain(&self) -> Result<()> {
        let (_, body) = self.get("/chain").await?;
        let blocks = body["chain"].as_array().cloned().unwrap_or_default();
        println!("Chain with {} blocks:", blocks.len());
        for block in blocks {
            println!(
                "  #{} {} ({} txs)",
                block["index"],
                block["hash"].as_str().unwrap_or("?"),
                block["transactions"].as_array().map_or(0, |txs| txs.len())
            );
        }
        Ok(())
    }

    async fn validate_chain(&self) -> Result<()> {
        let (_, body) = self.get("/chain/validate").await?;
        if body["valid"].as_bool().unwrap_or(false) {
            println!("Chain is valid ({} blocks)", body["length"]);
        } else {
            println!("Chain is INVALID ({} blocks)", body["length"]);
        }
        Ok(())
    }

    async fn show_balance(&self, address: &str) -> Result<()> {
        let (_, body) = self.get(&format!("/balance/{}", address)).await?;
        println!("Balance of {}: {}", address, body["balance"]);
        Ok(())
    }

    async fn create_transaction(&self, sender: &str, recipient: &str, amount: &str) -> Result<()> {
        let amount: f64 = amount.parse().context("amount must be a number")?;
        let (status, body) = self
            .post(
                "/transactions/new",
                json!({ "sender": sender, "recipient": recipient, "amount": amount }),
            )
            .await?;
        if status == StatusCode::CREATED {
            println!("Transaction added: {} -> {} ({})", sender, recipient, amount);
        } else {
            println!(
                "Transaction rejected: {}",
                body["reason"].as_str().unwrap_or("unknown reason")
            );
        }
        Ok(())
    }

    async fn show_pending(&self) -> Result<()> {
        let (_, body) = self.get("/transactions/pending").await?;
        println!("{} pending transactions", body["count"]);
        for tx in body["transactions"].as_array().cloned().unwrap_or_default() {
            println!(
                "  {} -> {} ({})",
                tx["sender"].as_str().unwrap_or("?"),
                tx["recipient"].as_str().unwrap_or("?"),
                tx["amount"]
            );
        }
        Ok(())
    }

    async fn show_rejected(&self) -> Result<()> {
        let (_, body) = self.get("/transactions/rejected").await?;
        println!("{} rejected transactions", body["count"]);
        for entry in body["transactions"].as_array().cloned().unwrap_or_default() {
            let tx = &entry["transaction"];
            println!(
                "  {} -> {} ({}): {}",
                tx["sender"].as_str().unwrap_or("?"),
                tx["recipient"].as_str().unwrap_or("?"),
                tx["amount"],
                entry["reason"].as_str().unwrap_or("?")
            );
        }
        Ok(())
    }

    async fn mine(&self) -> Result<()> {
        let (status, body) = self.get("/mine").await?;
        if status.is_success() {
            println!("Mined block #{}", body["block"]["index"]);
        } else {
            println!(
                "Mining failed: {}",
                body["reason"].as_str().unwrap_or("unknown reason")
            );
        }
        Ok(())
    }

    async fn mining_control(&self, action: &str) -> Result<()> {
        let (status, body) = match action {
            "start" => self.get("/mine/start").await?,
            "stop" => self.get("/mine/stop").await?,
            _ => {
                println!("Usage: mining start|stop");
                return Ok(());
            }
        };
        if status.is_success() {
            println!("{}", body["message"].as_str().unwrap_or("ok"));
        } else {
            println!("{}", body["reason"].as_str().unwrap_or("request refused"));
        }
        Ok(())
    }

    async fn show_peers(&self) -> Result<()> {
        let (_, body) = self.get("/nodes/peers").await?;
        println!(
            "{} registered nodes, {} active:",
            body["total_count"], body["active_count"]
        );
        for peer in body["nodes"].as_array().cloned().unwrap_or_default() {
            println!(
                "  {} [{}] {} - {}",
                peer["name"].as_str().unwrap_or("?"),
                peer["node_type"].as_str().unwrap_or("?"),
                peer["url"].as_str().unwrap_or("?"),
                if peer["active"].as_bool().unwrap_or(false) {
                    "active"
                } else {
                    "inactive"
                }
            );
        }
        Ok(())
    }

    async fn register_node(&self, url: &str) -> Result<()> {
        let (status, body) = self
            .post("/nodes/register", json!({ "nodes": [url] }))
            .await?;
        if status == StatusCode::CREATED {
            println!(
                "{} (total: {})",
                body["message"].as_str().unwrap_or("registered"),
                body["total_nodes"]
            );
        } else {
            println!(
                "Registration failed: {}",
                body["reason"].as_str().unwrap_or("unknown reason")
            );
        }
        Ok(())
    }

    async fn run_consensus(&self) -> Result<()> {
        let (_, body) = self.get("/nodes/resolve").await?;
        println!("{}", body["message"].as_str().unwrap_or("done"));
        Ok(())
    }

    async fn show_block(&self, index: &str) -> Result<()> {
        let (status, body) = self.get(&format!("/blocks/{}", index)).await?;
        if status.is_success() {
            println!("{}", serde_json::to_string_pretty(&body)?);
        } else {
            println!(
                "Block not found: {}",
                body["reason"].as_str().unwrap_or("unknown index")
            );
        }
        Ok(())
    }

    async fn show_history(&self, address: &str) -> Result<()> {
        let (_, body) = self
            .get(&format!("/transactions/address/{}", address))
            .await?;
        println!("{} transactions involving {}", body["count"], address);
        for entry in body["transactions"].as_array().cloned().unwrap_or_default() {
            let tx = &entry["transaction"];
            println!(
                "  block #{}: {} -> {} ({})",
                entry["block_index"],
                tx["sender"].as_str().unwrap_or("?"),
                tx["recipient"].as_str().unwrap_or("?"),
                tx["amount"]
            );
        }
        Ok(())
    }

    // Returns false when the user asked to exit
    async fn process_command(&self, line: &str) -> bool {
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else {
            return true;
        };
        let args: Vec<&str> = parts.collect();

        let result = match (command, args.as_slice()) {
            ("help", _) => {
                self.show_help();
                Ok(())
            }
            ("exit", _) | ("quit", _) => return false,
            ("info", _) => self.show_info().await,
            ("chain", _) => self.show_chain().await,
            ("validate", _) => self.validate_chain().await,
            ("balance", [address]) => self.show_balance(address).await,
            ("transaction", [sender, recipient, amount]) => {
                self.create_transaction(sender, recipient, amount).await
            }
            ("pending", _) => self.show_pending().await,
            ("rejected", _) => self.show_rejected().await,
            ("mine", _) => self.mine().await,
            ("mining", [action]) => self.mining_control(action).await,
            ("peers", _) => self.show_peers().await,
            ("register", [url]) => self.register_node(url).await,
            ("consensus", _) => self.run_consensus().await,
            ("block", [index]) => self.show_block(index).await,
            ("history", [address]) => self.show_history(address).await,
            _ => {
                println!("Unknown command or wrong arguments: {} (try 'help')", line);
                Ok(())
            }
        };

        if let Err(e) = result {
            println!("Error: {:#}", e);
        }
        true
    }
}

// Read-eval loop on stdin until "exit" or end of input
pub async fn run(base_url: String) -> Result<()> {
    let cli = CliClient::new(base_url);
    println!("Minichain interactive client, type 'help' for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;
    while let Some(line) = lines.next_line().await? {
        if !cli.process_command(line.trim()).await {
            break;
        }
        prompt()?;
    }

    println!("Bye");
    Ok(())
}

fn prompt() -> Result<()> {
    print!("> ");
    std::io::stdout().flush()?;
    Ok(())
}
