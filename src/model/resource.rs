//! Resource kinds and the table registry behind them

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The three categorizable entity kinds in a Spark library.
///
/// The enum doubles as the resource registry: every table and column name
/// a kind implies is an exhaustive match here, so adding a kind forces
/// every dispatch site to be revisited by the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Book,
    Highlight,
    Spark,
}

impl ResourceKind {
    /// All kinds, in a fixed order. Used for cross-kind sweeps
    /// (junction purges) and registry tests.
    pub const ALL: [ResourceKind; 3] = [
        ResourceKind::Book,
        ResourceKind::Highlight,
        ResourceKind::Spark,
    ];

    /// Backing table holding rows of this kind
    pub fn table(&self) -> &'static str {
        match self {
            ResourceKind::Book => "books",
            ResourceKind::Highlight => "highlights",
            ResourceKind::Spark => "sparks",
        }
    }

    /// Junction table linking this kind to categories
    pub fn category_junction(&self) -> &'static str {
        match self {
            ResourceKind::Book => "book_categories",
            ResourceKind::Highlight => "highlight_categories",
            ResourceKind::Spark => "spark_categories",
        }
    }

    /// Junction table linking this kind to tags
    pub fn tag_junction(&self) -> &'static str {
        match self {
            ResourceKind::Book => "book_tags",
            ResourceKind::Highlight => "highlight_tags",
            ResourceKind::Spark => "spark_tags",
        }
    }

    /// Foreign-key column naming this kind inside its junction tables
    pub fn id_column(&self) -> &'static str {
        match self {
            ResourceKind::Book => "book_id",
            ResourceKind::Highlight => "highlight_id",
            ResourceKind::Spark => "spark_id",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Book => "book",
            ResourceKind::Highlight => "highlight",
            ResourceKind::Spark => "spark",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "book" => Ok(ResourceKind::Book),
            "highlight" => Ok(ResourceKind::Highlight),
            "spark" => Ok(ResourceKind::Spark),
            other => Err(format!("unknown resource kind: {}", other)),
        }
    }
}

/// Typed pointer into one of the three resource tables.
///
/// Never persisted as its own row; the kind determines which junction
/// tables are legal targets for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    /// Row id in the kind's backing table
    pub id: String,
    /// Which table the id points into
    pub kind: ResourceKind,
    /// User the resource must belong to
    pub owner_id: String,
}

impl ResourceRef {
    pub fn new(
        kind: ResourceKind,
        id: impl Into<String>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            owner_id: owner_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_is_exhaustive_and_distinct() {
        let mut tables = Vec::new();
        for kind in ResourceKind::ALL {
            tables.push(kind.table());
            tables.push(kind.category_junction());
            tables.push(kind.tag_junction());
        }
        let before = tables.len();
        tables.sort();
        tables.dedup();
        assert_eq!(before, tables.len(), "registry table names must be distinct");
    }

    #[test]
    fn id_columns_match_kind() {
        assert_eq!(ResourceKind::Book.id_column(), "book_id");
        assert_eq!(ResourceKind::Highlight.id_column(), "highlight_id");
        assert_eq!(ResourceKind::Spark.id_column(), "spark_id");
    }

    #[test]
    fn kind_round_trips_through_str() {
        for kind in ResourceKind::ALL {
            let parsed: ResourceKind = kind.to_string().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("note".parse::<ResourceKind>().is_err());
    }
}
