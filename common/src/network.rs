use serde::{Deserialize, Serialize};
use strum::Display;

// Role a node plays in the network. Peers learned through registration start
// as Unknown until their first announcement tells us what they are.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Display)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NodeType {
    Full,
    Miner,
    #[cfg_attr(feature = "clap", value(skip))]
    Unknown,
}

impl NodeType {
    pub fn is_miner(&self) -> bool {
        matches!(self, NodeType::Miner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(serde_json::to_string(&NodeType::Miner).unwrap(), "\"miner\"");
        let parsed: NodeType = serde_json::from_str("\"full\"").unwrap();
        assert_eq!(parsed, NodeType::Full);
    }

    #[test]
    fn test_unknown_round_trips() {
        let parsed: NodeType = serde_json::from_str("\"unknown\"").unwrap();
        assert_eq!(parsed, NodeType::Unknown);
        assert!(serde_json::from_str::<NodeType>("\"archive\"").is_err());
    }

    #[test]
    fn test_display_lowercase() {
        assert_eq!(NodeType::Miner.to_string(), "miner");
        assert_eq!(NodeType::Unknown.to_string(), "unknown");
    }
}
