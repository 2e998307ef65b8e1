use serde::{Deserialize, Serialize};

/// Movie or series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Series,
}

impl MediaKind {
    pub const ALL: &[MediaKind] = &[Self::Movie, Self::Series];

    pub fn from_is_movie(is_movie: bool) -> Self {
        if is_movie {
            Self::Movie
        } else {
            Self::Series
        }
    }

    pub fn is_movie(self) -> bool {
        matches!(self, Self::Movie)
    }

    /// Database string representation, shared with the remote API's media type.
    pub fn as_db_str(self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Series => "tv",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "movie" => Some(Self::Movie),
            "tv" => Some(Self::Series),
            _ => None,
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Movie => write!(f, "Movie"),
            Self::Series => write!(f, "Series"),
        }
    }
}

/// A remote genre identifier with its display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    pub id: u32,
    pub name: String,
}
