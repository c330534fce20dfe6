use serde::{Deserialize, Serialize};

/// Which kind of entity a donation is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Ngo,
    Campaign,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ngo => "ngo",
            Self::Campaign => "campaign",
        }
    }
}

impl std::str::FromStr for TargetKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ngo" => Ok(Self::Ngo),
            "campaign" => Ok(Self::Campaign),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A donation target: a (kind, id) pair discriminating NGOs from campaigns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonationTarget {
    pub kind: TargetKind,
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ngo {
    pub id: String,
    pub name: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub created_at: i64,
}
