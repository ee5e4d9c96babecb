//! SQLite storage backend for Spark

use super::traits::{
    AutomationFilter, JunctionRow, OpenStore, SparkStore, StorageError, StorageResult,
};
use crate::model::{
    ActionData, ActionStatus, Automation, AutomationAction, AutomationStatus, Category,
    CreatedBy, ResourceKind, Tag,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed store
///
/// Uses a single SQLite database file with one table per resource kind,
/// entity tables for categories and tags, automation/action tables, and
/// a category- plus tag-junction table per resource kind. Thread-safe
/// via internal mutex on the connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Initialize the database schema
    ///
    /// Uses a two-phase approach for migration compatibility:
    /// 1. Create base tables - safe for existing DBs
    /// 2. Run migrations to add provenance columns to existing tables
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            -- Resource tables. Only id and ownership matter to the engine;
            -- the descriptive column is whatever the dashboard displays.
            CREATE TABLE IF NOT EXISTS books (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS highlights (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                content TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS sparks (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                content TEXT NOT NULL
            );

            -- Categories are shared across users, unique by slug
            CREATE TABLE IF NOT EXISTS categories (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            );

            -- Tags are unique per owning user
            CREATE TABLE IF NOT EXISTS tags (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (user_id, name)
            );

            -- Automation headers; append-only except for status
            CREATE TABLE IF NOT EXISTS automations (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                source TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_automations_user
                ON automations(user_id, status);

            -- Per-action records; payload stored as a tagged JSON blob
            CREATE TABLE IF NOT EXISTS automation_actions (
                id TEXT PRIMARY KEY,
                automation_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                action_json TEXT NOT NULL,
                status TEXT NOT NULL,
                executed_at TEXT,
                FOREIGN KEY (automation_id) REFERENCES automations(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_actions_automation
                ON automation_actions(automation_id, position);

            -- Enable foreign keys
            PRAGMA foreign_keys = ON;

            -- Enable WAL mode for concurrent reads during writes
            PRAGMA journal_mode = WAL;
            "#,
        )?;

        // Junction tables come from the resource registry so a new kind
        // cannot ship without its junctions.
        for kind in ResourceKind::ALL {
            let id_col = kind.id_column();
            for (table, entity_col) in [
                (kind.category_junction(), "category_id"),
                (kind.tag_junction(), "tag_id"),
            ] {
                conn.execute_batch(&format!(
                    r#"
                    CREATE TABLE IF NOT EXISTS {table} (
                        {id_col} TEXT NOT NULL,
                        {entity_col} TEXT NOT NULL,
                        automation_action_id TEXT,
                        created_by TEXT NOT NULL DEFAULT 'user',
                        created_at TEXT NOT NULL,
                        PRIMARY KEY ({id_col}, {entity_col})
                    );
                    CREATE INDEX IF NOT EXISTS idx_{table}_entity
                        ON {table}({entity_col});
                    CREATE INDEX IF NOT EXISTS idx_{table}_action
                        ON {table}(automation_action_id);
                    "#,
                ))?;
            }
        }

        Self::migrate_add_entity_provenance(conn)?;

        Ok(())
    }

    /// Migration: add `created_by_automation_id` to categories and tags
    ///
    /// SQLite doesn't support ALTER TABLE ADD COLUMN IF NOT EXISTS,
    /// so we check if columns exist first using the table_info pragma.
    /// Pre-provenance rows keep NULL, which revert reads as "cannot be
    /// attributed, leave it alone".
    fn migrate_add_entity_provenance(conn: &Connection) -> StorageResult<()> {
        for table in ["categories", "tags"] {
            let has_column: bool = conn
                .query_row(
                    &format!(
                        "SELECT COUNT(*) > 0 FROM pragma_table_info('{table}') \
                         WHERE name = 'created_by_automation_id'",
                    ),
                    [],
                    |row| row.get(0),
                )
                .unwrap_or(false);

            if !has_column {
                conn.execute(
                    &format!("ALTER TABLE {table} ADD COLUMN created_by_automation_id TEXT"),
                    [],
                )?;
            }
        }
        Ok(())
    }

    /// Which column holds a resource's display text
    fn label_column(kind: ResourceKind) -> &'static str {
        match kind {
            ResourceKind::Book => "title",
            ResourceKind::Highlight => "content",
            ResourceKind::Spark => "content",
        }
    }

    /// Map an insert error, surfacing unique-key failures distinctly so
    /// the catalog can re-read instead of propagating them.
    fn map_insert_err(err: rusqlite::Error, what: &str) -> StorageError {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                StorageError::UniqueViolation(what.to_string())
            }
            _ => StorageError::Database(err),
        }
    }

    fn parse_ts(raw: &str) -> StorageResult<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StorageError::DateParse(e.to_string()))
    }

    fn row_to_category(
        id: String,
        name: String,
        slug: String,
        created_by_automation_id: Option<String>,
        created_at: String,
    ) -> StorageResult<Category> {
        Ok(Category {
            id,
            name,
            slug,
            created_by_automation_id,
            created_at: Self::parse_ts(&created_at)?,
        })
    }

    fn row_to_tag(
        id: String,
        owner_id: String,
        name: String,
        created_by_automation_id: Option<String>,
        created_at: String,
    ) -> StorageResult<Tag> {
        Ok(Tag {
            id,
            owner_id,
            name,
            created_by_automation_id,
            created_at: Self::parse_ts(&created_at)?,
        })
    }

    fn row_to_automation(
        id: String,
        owner_id: String,
        name: String,
        source: String,
        status: String,
        created_at: String,
    ) -> StorageResult<Automation> {
        Ok(Automation {
            id,
            owner_id,
            name,
            source: source.parse().map_err(StorageError::CorruptRow)?,
            status: status.parse().map_err(StorageError::CorruptRow)?,
            created_at: Self::parse_ts(&created_at)?,
        })
    }

    fn row_to_action(
        id: String,
        automation_id: String,
        position: i64,
        action_json: String,
        status: String,
        executed_at: Option<String>,
    ) -> StorageResult<AutomationAction> {
        Ok(AutomationAction {
            id,
            automation_id,
            position,
            data: serde_json::from_str(&action_json)?,
            status: status.parse().map_err(StorageError::CorruptRow)?,
            executed_at: executed_at.as_deref().map(Self::parse_ts).transpose()?,
        })
    }

    fn row_to_junction(
        resource_id: String,
        entity_id: String,
        action_id: Option<String>,
        created_by: String,
        created_at: String,
    ) -> StorageResult<JunctionRow> {
        Ok(JunctionRow {
            resource_id,
            entity_id,
            action_id,
            created_by: created_by.parse().map_err(StorageError::CorruptRow)?,
            created_at: Self::parse_ts(&created_at)?,
        })
    }

    fn upsert_link(
        &self,
        table: &str,
        id_col: &str,
        entity_col: &str,
        resource_id: &str,
        entity_id: &str,
        action_id: Option<&str>,
        created_by: CreatedBy,
        created_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                r#"
                INSERT INTO {table} ({id_col}, {entity_col}, automation_action_id, created_by, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT({id_col}, {entity_col}) DO UPDATE SET
                    automation_action_id = excluded.automation_action_id,
                    created_by = excluded.created_by
                "#,
            ),
            params![
                resource_id,
                entity_id,
                action_id,
                created_by.to_string(),
                created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn find_link(
        &self,
        table: &str,
        id_col: &str,
        entity_col: &str,
        resource_id: &str,
        entity_id: &str,
    ) -> StorageResult<Option<JunctionRow>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                &format!(
                    "SELECT {id_col}, {entity_col}, automation_action_id, created_by, created_at \
                     FROM {table} WHERE {id_col} = ?1 AND {entity_col} = ?2",
                ),
                params![resource_id, entity_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(rid, eid, aid, by, at)| Self::row_to_junction(rid, eid, aid, by, at))
            .transpose()
    }

    fn delete_link(
        &self,
        table: &str,
        id_col: &str,
        entity_col: &str,
        resource_id: &str,
        entity_id: &str,
        action_id: Option<&str>,
    ) -> StorageResult<bool> {
        let conn = self.conn.lock().unwrap();
        let affected = match action_id {
            Some(aid) => conn.execute(
                &format!(
                    "DELETE FROM {table} WHERE {id_col} = ?1 AND {entity_col} = ?2 \
                     AND automation_action_id = ?3",
                ),
                params![resource_id, entity_id, aid],
            )?,
            None => conn.execute(
                &format!("DELETE FROM {table} WHERE {id_col} = ?1 AND {entity_col} = ?2"),
                params![resource_id, entity_id],
            )?,
        };
        Ok(affected > 0)
    }

    /// Manual cascade: delete every row in every junction table of the
    /// given column family that references the entity.
    fn purge_links(
        &self,
        entity_col: &str,
        entity_id: &str,
        tables: impl Iterator<Item = &'static str>,
    ) -> StorageResult<usize> {
        let conn = self.conn.lock().unwrap();
        let mut removed = 0;
        for table in tables {
            removed += conn.execute(
                &format!("DELETE FROM {table} WHERE {entity_col} = ?1"),
                params![entity_id],
            )?;
        }
        Ok(removed)
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl SparkStore for SqliteStore {
    // === Resource operations ===

    async fn insert_resource(
        &self,
        kind: ResourceKind,
        id: &str,
        owner_id: &str,
        label: &str,
    ) -> StorageResult<()> {
        let table = kind.table();
        let label_col = Self::label_column(kind);
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!("INSERT INTO {table} (id, user_id, {label_col}) VALUES (?1, ?2, ?3)"),
            params![id, owner_id, label],
        )
        .map_err(|e| Self::map_insert_err(e, kind.table()))?;
        Ok(())
    }

    async fn resource_owner(
        &self,
        kind: ResourceKind,
        id: &str,
    ) -> StorageResult<Option<String>> {
        let table = kind.table();
        let conn = self.conn.lock().unwrap();
        let owner = conn
            .query_row(
                &format!("SELECT user_id FROM {table} WHERE id = ?1"),
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(owner)
    }

    // === Category operations ===

    async fn insert_category(&self, category: &Category) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO categories (id, name, slug, created_by_automation_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                category.id,
                category.name,
                category.slug,
                category.created_by_automation_id,
                category.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| Self::map_insert_err(e, "categories.slug"))?;
        Ok(())
    }

    async fn find_category(&self, id: &str) -> StorageResult<Option<Category>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT id, name, slug, created_by_automation_id, created_at \
                 FROM categories WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;
        row.map(|(id, name, slug, by, at)| Self::row_to_category(id, name, slug, by, at))
            .transpose()
    }

    async fn find_category_by_slug(&self, slug: &str) -> StorageResult<Option<Category>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT id, name, slug, created_by_automation_id, created_at \
                 FROM categories WHERE slug = ?1",
                params![slug],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;
        row.map(|(id, name, slug, by, at)| Self::row_to_category(id, name, slug, by, at))
            .transpose()
    }

    async fn list_categories(&self) -> StorageResult<Vec<Category>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, slug, created_by_automation_id, created_at \
             FROM categories ORDER BY slug",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut categories = Vec::new();
        for row in rows {
            let (id, name, slug, by, at) = row?;
            categories.push(Self::row_to_category(id, name, slug, by, at)?);
        }
        Ok(categories)
    }

    async fn delete_category(&self, id: &str) -> StorageResult<bool> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute("DELETE FROM categories WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    // === Tag operations ===

    async fn insert_tag(&self, tag: &Tag) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO tags (id, user_id, name, created_by_automation_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                tag.id,
                tag.owner_id,
                tag.name,
                tag.created_by_automation_id,
                tag.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| Self::map_insert_err(e, "tags.user_id+name"))?;
        Ok(())
    }

    async fn find_tag(&self, id: &str) -> StorageResult<Option<Tag>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT id, user_id, name, created_by_automation_id, created_at \
                 FROM tags WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;
        row.map(|(id, owner, name, by, at)| Self::row_to_tag(id, owner, name, by, at))
            .transpose()
    }

    async fn find_tag_by_name(
        &self,
        owner_id: &str,
        name: &str,
    ) -> StorageResult<Option<Tag>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT id, user_id, name, created_by_automation_id, created_at \
                 FROM tags WHERE user_id = ?1 AND name = ?2",
                params![owner_id, name],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;
        row.map(|(id, owner, name, by, at)| Self::row_to_tag(id, owner, name, by, at))
            .transpose()
    }

    async fn list_tags(&self, owner_id: &str) -> StorageResult<Vec<Tag>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, name, created_by_automation_id, created_at \
             FROM tags WHERE user_id = ?1 ORDER BY name",
        )?;
        let rows = stmt.query_map(params![owner_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut tags = Vec::new();
        for row in rows {
            let (id, owner, name, by, at) = row?;
            tags.push(Self::row_to_tag(id, owner, name, by, at)?);
        }
        Ok(tags)
    }

    async fn delete_tag(&self, id: &str) -> StorageResult<bool> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute("DELETE FROM tags WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    // === Junction operations ===

    async fn upsert_category_link(
        &self,
        kind: ResourceKind,
        resource_id: &str,
        category_id: &str,
        action_id: Option<&str>,
        created_by: CreatedBy,
        created_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        self.upsert_link(
            kind.category_junction(),
            kind.id_column(),
            "category_id",
            resource_id,
            category_id,
            action_id,
            created_by,
            created_at,
        )
    }

    async fn find_category_link(
        &self,
        kind: ResourceKind,
        resource_id: &str,
        category_id: &str,
    ) -> StorageResult<Option<JunctionRow>> {
        self.find_link(
            kind.category_junction(),
            kind.id_column(),
            "category_id",
            resource_id,
            category_id,
        )
    }

    async fn delete_category_link(
        &self,
        kind: ResourceKind,
        resource_id: &str,
        category_id: &str,
        action_id: Option<&str>,
    ) -> StorageResult<bool> {
        self.delete_link(
            kind.category_junction(),
            kind.id_column(),
            "category_id",
            resource_id,
            category_id,
            action_id,
        )
    }

    async fn purge_category_links(&self, category_id: &str) -> StorageResult<usize> {
        self.purge_links(
            "category_id",
            category_id,
            ResourceKind::ALL.iter().map(|k| k.category_junction()),
        )
    }

    async fn upsert_tag_link(
        &self,
        kind: ResourceKind,
        resource_id: &str,
        tag_id: &str,
        action_id: Option<&str>,
        created_by: CreatedBy,
        created_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        self.upsert_link(
            kind.tag_junction(),
            kind.id_column(),
            "tag_id",
            resource_id,
            tag_id,
            action_id,
            created_by,
            created_at,
        )
    }

    async fn find_tag_link(
        &self,
        kind: ResourceKind,
        resource_id: &str,
        tag_id: &str,
    ) -> StorageResult<Option<JunctionRow>> {
        self.find_link(
            kind.tag_junction(),
            kind.id_column(),
            "tag_id",
            resource_id,
            tag_id,
        )
    }

    async fn delete_tag_link(
        &self,
        kind: ResourceKind,
        resource_id: &str,
        tag_id: &str,
        action_id: Option<&str>,
    ) -> StorageResult<bool> {
        self.delete_link(
            kind.tag_junction(),
            kind.id_column(),
            "tag_id",
            resource_id,
            tag_id,
            action_id,
        )
    }

    async fn purge_tag_links(&self, tag_id: &str) -> StorageResult<usize> {
        self.purge_links(
            "tag_id",
            tag_id,
            ResourceKind::ALL.iter().map(|k| k.tag_junction()),
        )
    }

    // === Automation operations ===

    async fn insert_automation(&self, automation: &Automation) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO automations (id, user_id, name, source, status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                automation.id,
                automation.owner_id,
                automation.name,
                automation.source.to_string(),
                automation.status.to_string(),
                automation.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| Self::map_insert_err(e, "automations.id"))?;
        Ok(())
    }

    async fn get_automation(&self, id: &str) -> StorageResult<Option<Automation>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT id, user_id, name, source, status, created_at \
                 FROM automations WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;
        row.map(|(id, owner, name, source, status, at)| {
            Self::row_to_automation(id, owner, name, source, status, at)
        })
        .transpose()
    }

    async fn list_automations(
        &self,
        owner_id: &str,
        filter: &AutomationFilter,
    ) -> StorageResult<Vec<Automation>> {
        let conn = self.conn.lock().unwrap();

        let mut sql = String::from(
            "SELECT id, user_id, name, source, status, created_at \
             FROM automations WHERE user_id = ?1",
        );
        let mut args: Vec<String> = vec![owner_id.to_string()];
        if let Some(status) = filter.status {
            args.push(status.to_string());
            sql.push_str(&format!(" AND status = ?{}", args.len()));
        }
        if let Some(source) = filter.source {
            args.push(source.to_string());
            sql.push_str(&format!(" AND source = ?{}", args.len()));
        }
        sql.push_str(" ORDER BY created_at DESC, id");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut automations = Vec::new();
        for row in rows {
            let (id, owner, name, source, status, at) = row?;
            automations.push(Self::row_to_automation(id, owner, name, source, status, at)?);
        }
        Ok(automations)
    }

    async fn set_automation_status(
        &self,
        id: &str,
        status: AutomationStatus,
    ) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE automations SET status = ?2 WHERE id = ?1",
            params![id, status.to_string()],
        )?;
        Ok(())
    }

    // === Action operations ===

    async fn insert_action(&self, action: &AutomationAction) -> StorageResult<()> {
        let action_json = serde_json::to_string(&action.data)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO automation_actions (id, automation_id, position, action_json, status, executed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                action.id,
                action.automation_id,
                action.position,
                action_json,
                action.status.to_string(),
                action.executed_at.map(|t| t.to_rfc3339()),
            ],
        )
        .map_err(|e| Self::map_insert_err(e, "automation_actions.id"))?;
        Ok(())
    }

    async fn get_action(&self, id: &str) -> StorageResult<Option<AutomationAction>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT id, automation_id, position, action_json, status, executed_at \
                 FROM automation_actions WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<String>>(5)?,
                    ))
                },
            )
            .optional()?;
        row.map(|(id, aid, pos, json, status, at)| {
            Self::row_to_action(id, aid, pos, json, status, at)
        })
        .transpose()
    }

    async fn actions_for_automation(
        &self,
        automation_id: &str,
    ) -> StorageResult<Vec<AutomationAction>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, automation_id, position, action_json, status, executed_at \
             FROM automation_actions WHERE automation_id = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map(params![automation_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut actions = Vec::new();
        for row in rows {
            let (id, aid, pos, json, status, at) = row?;
            actions.push(Self::row_to_action(id, aid, pos, json, status, at)?);
        }
        Ok(actions)
    }

    async fn set_action_status(
        &self,
        id: &str,
        status: ActionStatus,
        executed_at: Option<DateTime<Utc>>,
    ) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        match executed_at {
            Some(at) => conn.execute(
                "UPDATE automation_actions SET status = ?2, executed_at = ?3 WHERE id = ?1",
                params![id, status.to_string(), at.to_rfc3339()],
            )?,
            None => conn.execute(
                "UPDATE automation_actions SET status = ?2 WHERE id = ?1",
                params![id, status.to_string()],
            )?,
        };
        Ok(())
    }

    async fn update_action_data(&self, id: &str, data: &ActionData) -> StorageResult<()> {
        let action_json = serde_json::to_string(data)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE automation_actions SET action_json = ?2 WHERE id = ?1",
            params![id, action_json],
        )?;
        Ok(())
    }

    async fn reject_pending_actions(&self, automation_id: &str) -> StorageResult<usize> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            "UPDATE automation_actions SET status = 'rejected' \
             WHERE automation_id = ?1 AND status = 'pending'",
            params![automation_id],
        )?;
        Ok(affected)
    }
}
