pub mod peer_list;

pub use peer_list::{PeerEntry, PeerRegistry};

// Loopback addresses fold to a single spelling so a node recognizes itself
// no matter how a peer URL was written
pub fn normalize_host(host: &str) -> String {
    if host == "127.0.0.1" || host == "localhost" {
        "localhost".to_owned()
    } else {
        host.to_owned()
    }
}

// Accepts "http://host:port", "host:port" and bare hosts (default port 80)
pub fn parse_node_url(url: &str) -> Option<(String, u16)> {
    let with_scheme = if url.contains("://") {
        url.to_owned()
    } else {
        format!("http://{}", url)
    };

    let parsed = reqwest::Url::parse(&with_scheme).ok()?;
    let host = parsed.host_str()?.to_owned();
    let port = parsed.port_or_known_default()?;
    Some((normalize_host(&host), port))
}
