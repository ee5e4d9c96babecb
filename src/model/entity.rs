//! Categories and tags — the shared entities automations attach to

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A category, shared across all users, unique by slug.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    /// Display name as the user or automation submitted it
    pub name: String,
    /// Normalized, URL-safe, unique derivation of the name
    pub slug: String,
    /// Set when an automation created this category; the attribution
    /// revert checks before deleting anything
    pub created_by_automation_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Category {
    /// Build a new category with a fresh id and derived slug.
    pub fn new(
        name: impl Into<String>,
        created_by_automation_id: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let name = name.into();
        let slug = slugify(&name);
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            slug,
            created_by_automation_id,
            created_at,
        }
    }
}

/// A tag, unique per owning user by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub created_by_automation_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Tag {
    pub fn new(
        owner_id: impl Into<String>,
        name: impl Into<String>,
        created_by_automation_id: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            name: name.into(),
            created_by_automation_id,
            created_at,
        }
    }
}

/// Derive a category slug: lowercase, whitespace runs become single
/// hyphens, everything outside `[a-z0-9-]` is stripped.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_hyphen = true; // suppress leading hyphens
    for ch in name.trim().chars() {
        if ch.is_whitespace() {
            if !last_hyphen {
                slug.push('-');
                last_hyphen = true;
            }
        } else if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_hyphen = false;
        } else if ch == '-' || ch == '_' {
            if !last_hyphen {
                slug.push('-');
                last_hyphen = true;
            }
        }
        // anything else is stripped
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
