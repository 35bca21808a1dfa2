//! Runtime mode configuration for Undertow.

use serde::{Deserialize, Serialize};

/// Which collaborators back the server.
///
/// Development mode serves local files through the in-memory engine and
/// canned subtitle search results, so the whole stack runs offline.
/// Production mode fetches torrents from the swarm through librqbit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeMode {
    Production,
    #[default]
    Development,
}

impl RuntimeMode {
    pub fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }

    pub fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl std::fmt::Display for RuntimeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Development => write!(f, "development"),
        }
    }
}

impl std::str::FromStr for RuntimeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" => Ok(Self::Development),
            _ => Err(format!(
                "Invalid runtime mode: '{s}'. Valid options are: production, development"
            )),
        }
    }
}
