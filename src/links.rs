//! Outbound block-explorer and analytics links.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    PulseChain,
    Ethereum,
}

impl Chain {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "pulsechain" | "pls" => Some(Self::PulseChain),
            "ethereum" | "eth" => Some(Self::Ethereum),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PulseChain => "pulsechain",
            Self::Ethereum => "ethereum",
        }
    }

    pub fn default_subgraph_url(self) -> &'static str {
        match self {
            Self::PulseChain => "https://graph.pulsechain.com/subgraphs/name/Codeakk/Hex",
            Self::Ethereum => "https://api.thegraph.com/subgraphs/name/codeakk/hex",
        }
    }

    fn explorer_base(self) -> &'static str {
        match self {
            Self::PulseChain => "https://scan.pulsechain.com",
            Self::Ethereum => "https://etherscan.io",
        }
    }
}

pub fn address_link(chain: Chain, address: &str) -> String {
    format!("{}/address/{address}", chain.explorer_base())
}

pub fn transaction_link(chain: Chain, hash: &str) -> String {
    format!("{}/tx/{hash}", chain.explorer_base())
}

pub fn analytics_link(address: &str) -> String {
    format!("https://hexscout.com/{address}")
}
