use serde::{Deserialize, Serialize};

/// User-assigned watch-status bucket for a tracked title.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    PlanToWatch,
    #[default]
    Watching,
    Watched,
    OnHold,
    Dropped,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlanToWatch => "Plan to Watch",
            Self::Watching => "Watching",
            Self::Watched => "Watched",
            Self::OnHold => "On Hold",
            Self::Dropped => "Dropped",
        }
    }

    /// Database string representation (lowercase, no spaces).
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::PlanToWatch => "plan_to_watch",
            Self::Watching => "watching",
            Self::Watched => "watched",
            Self::OnHold => "on_hold",
            Self::Dropped => "dropped",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "plan_to_watch" => Some(Self::PlanToWatch),
            "watching" => Some(Self::Watching),
            "watched" => Some(Self::Watched),
            "on_hold" => Some(Self::OnHold),
            "dropped" => Some(Self::Dropped),
            _ => None,
        }
    }

    pub const ALL: &[Category] = &[
        Self::PlanToWatch,
        Self::Watching,
        Self::Watched,
        Self::OnHold,
        Self::Dropped,
    ];
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    /// Accepts the database form as well as the display form ("On Hold", "on-hold").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded = s.trim().to_lowercase().replace([' ', '-'], "_");
        Self::from_db_str(&folded).ok_or_else(|| format!("unknown category: {s}"))
    }
}
