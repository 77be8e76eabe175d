//! SQLite-backed item data provider.
//!
//! The save path applies an [`ItemChanges`] delta to the item row and the
//! three field tables inside one transaction, executed through a retry
//! policy and serialized per item by a lock handle. Blob cleanup and cache
//! invalidation run after the transaction commits and are best-effort.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use quarry_core::{
    template_ids, DefaultFieldSharing, FieldChange, ItemChanges, ItemDefinition, ItemId, Language,
    SharingType, TemplateId, Version,
};

use crate::cache::{LanguageCache, PrefetchCache};
use crate::error::{Result, StoreError};
use crate::lock::{ItemLockManager, LockManager};
use crate::retry::{FixedDelayRetry, RetryPolicy};
use crate::schema::{Schema, SCHEMA_VERSION};

/// Fixed order in which the field-update protocol walks the storage scopes.
const SHARING_PASSES: [SharingType; 3] = [
    SharingType::Shared,
    SharingType::Unversioned,
    SharingType::Versioned,
];

/// SQLite data provider for item and field persistence.
pub struct SqliteDataProvider {
    conn: Mutex<Connection>,
    locks: Arc<dyn LockManager>,
    retry: Arc<dyn RetryPolicy>,
    default_sharing: DefaultFieldSharing,
    prefetch: PrefetchCache,
    languages: LanguageCache,
}

impl SqliteDataProvider {
    /// Open (or create) a database at the given path.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init_with_connection(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_with_connection(conn)
    }

    fn init_with_connection(conn: Connection) -> Result<Self> {
        let provider = Self {
            conn: Mutex::new(conn),
            locks: Arc::new(ItemLockManager::new()),
            retry: Arc::new(FixedDelayRetry::default()),
            default_sharing: DefaultFieldSharing::standard(),
            prefetch: PrefetchCache::new(),
            languages: LanguageCache::new(),
        };
        provider.initialize()?;
        Ok(provider)
    }

    /// Replace the per-item lock manager.
    pub fn with_lock_manager(mut self, locks: Arc<dyn LockManager>) -> Self {
        self.locks = locks;
        self
    }

    /// Replace the retry policy for the transactional unit of work.
    pub fn with_retry_policy(mut self, retry: Arc<dyn RetryPolicy>) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the fallback sharing table.
    pub fn with_default_sharing(mut self, sharing: DefaultFieldSharing) -> Self {
        self.default_sharing = sharing;
        self
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;

        let current_version = Self::schema_version(&conn).unwrap_or(0);
        if current_version == 0 {
            conn.execute_batch(Schema::create_tables())?;
            Self::set_schema_version(&conn, SCHEMA_VERSION)?;
        } else if current_version < SCHEMA_VERSION {
            for version in current_version..SCHEMA_VERSION {
                if let Some(migration) = Schema::migration(version, version + 1) {
                    conn.execute_batch(migration)?;
                }
            }
            Self::set_schema_version(&conn, SCHEMA_VERSION)?;
        }
        Ok(())
    }

    fn schema_version(conn: &Connection) -> Option<u32> {
        conn.query_row(
            "SELECT version FROM schema_version ORDER BY applied_at DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .ok()
    }

    fn set_schema_version(conn: &Connection, version: u32) -> Result<()> {
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [version],
        )?;
        Ok(())
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    // ==================== Save protocol ====================

    /// Durably apply a change set to an item.
    ///
    /// Property and field updates run in one transaction, replayed by the
    /// retry policy on transient failures. Blob cleanup and cache
    /// invalidation follow unconditionally once the write is durable.
    pub fn save_item(&self, item: &ItemDefinition, changes: &ItemChanges) -> Result<bool> {
        if changes.has_properties_changed() || changes.has_fields_changed() {
            self.retry.execute(&mut || -> Result<()> {
                let conn = self.lock_conn()?;
                let tx = conn.unchecked_transaction()?;
                if changes.has_properties_changed() {
                    Self::update_item_row(&tx, item, changes)?;
                }
                if changes.has_fields_changed() {
                    self.update_item_fields(&tx, item.id, changes)?;
                }
                tx.commit()?;
                Ok(())
            })?;
        }
        self.remove_old_blobs(changes);
        self.on_item_saved(item.id, item.template_id);
        Ok(true)
    }

    /// Storage scope for a change: the schema definition when present,
    /// otherwise the default-sharing fallback.
    pub fn sharing_type(&self, change: &FieldChange) -> SharingType {
        match &change.definition {
            Some(definition) => definition.sharing_type(),
            None => self.default_sharing.get(change.field_id),
        }
    }

    fn update_item_row(
        conn: &Connection,
        item: &ItemDefinition,
        changes: &ItemChanges,
    ) -> Result<()> {
        let properties = changes.properties.as_ref();
        let name = properties
            .and_then(|p| p.name.clone())
            .unwrap_or_else(|| item.name.clone());
        let template_id = properties
            .and_then(|p| p.template_id)
            .unwrap_or(item.template_id);
        let branch_id = properties
            .and_then(|p| p.branch_id)
            .unwrap_or(item.branch_id);

        conn.execute(
            "UPDATE items SET name = ?1, template_id = ?2, branch_id = ?3, updated = ?4
             WHERE id = ?5",
            params![
                name,
                template_id.to_string(),
                branch_id.to_string(),
                Utc::now().to_rfc3339(),
                item.id.to_string(),
            ],
        )?;
        Ok(())
    }

    /// Field-update protocol, serialized per item by its lock handle.
    ///
    /// Under save-all the item's current language/version field rows are
    /// deleted first and every write becomes a plain insert; removals are
    /// skipped because the delete already cleared them.
    fn update_item_fields(
        &self,
        conn: &Connection,
        item_id: ItemId,
        changes: &ItemChanges,
    ) -> Result<()> {
        let handle = self.locks.lock_handle(item_id);
        let _guard = handle.lock().unwrap_or_else(|e| e.into_inner());

        let now = Utc::now();
        let save_all = changes.context.save_all;
        if save_all {
            Self::remove_fields(
                conn,
                item_id,
                &changes.context.language,
                changes.context.version,
            )?;
        }

        for pass in SHARING_PASSES {
            for change in &changes.field_changes {
                if self.sharing_type(change) != pass {
                    continue;
                }
                if change.remove_field {
                    if !save_all {
                        Self::remove_field_rows(conn, pass, item_id, change)?;
                    }
                } else {
                    match pass {
                        SharingType::Shared => {
                            Self::write_shared_field(conn, item_id, change, now, save_all)?
                        }
                        SharingType::Unversioned => {
                            Self::write_unversioned_field(conn, item_id, change, now, save_all)?
                        }
                        SharingType::Versioned => {
                            Self::write_versioned_field(conn, item_id, change, now, save_all)?
                        }
                        SharingType::Unknown => {}
                    }
                }
            }
        }
        Ok(())
    }

    /// Delete every field row of an item for one language/version cursor:
    /// the versioned rows of that language+version, the unversioned rows of
    /// that language, and all shared rows.
    fn remove_fields(
        conn: &Connection,
        item_id: ItemId,
        language: &Language,
        version: Version,
    ) -> Result<()> {
        let item = item_id.to_string();
        conn.execute(
            "DELETE FROM versioned_fields WHERE item_id = ?1 AND language = ?2 AND version = ?3",
            params![item, language, version],
        )?;
        conn.execute(
            "DELETE FROM unversioned_fields WHERE item_id = ?1 AND language = ?2",
            params![item, language],
        )?;
        conn.execute(
            "DELETE FROM shared_fields WHERE item_id = ?1",
            params![item],
        )?;
        Ok(())
    }

    /// Delete a field's rows from every table its sharing scope can reach.
    ///
    /// `Unknown` deletes from all three tables, guaranteeing no orphan
    /// survives an ambiguous resolution. Filters are per table: the
    /// versioned delete matches language and version, the unversioned
    /// delete matches language, the shared delete matches the field alone.
    pub fn remove_field(&self, item_id: ItemId, change: &FieldChange) -> Result<()> {
        let conn = self.lock_conn()?;
        Self::remove_field_rows(&conn, self.sharing_type(change), item_id, change)
    }

    fn remove_field_rows(
        conn: &Connection,
        sharing: SharingType,
        item_id: ItemId,
        change: &FieldChange,
    ) -> Result<()> {
        use rusqlite::types::ToSql;

        let item = item_id.to_string();
        let field = change.field_id.to_string();

        let mut statements: Vec<(&str, Vec<Box<dyn ToSql>>)> = Vec::new();
        if matches!(sharing, SharingType::Unknown | SharingType::Versioned) {
            statements.push((
                "DELETE FROM versioned_fields
                 WHERE item_id = ?1 AND version = ?2 AND field_id = ?3 AND language = ?4",
                vec![
                    Box::new(item.clone()),
                    Box::new(change.version),
                    Box::new(field.clone()),
                    Box::new(change.language.clone()),
                ],
            ));
        }
        if matches!(sharing, SharingType::Shared | SharingType::Unknown) {
            statements.push((
                "DELETE FROM shared_fields WHERE item_id = ?1 AND field_id = ?2",
                vec![Box::new(item.clone()), Box::new(field.clone())],
            ));
        }
        if matches!(sharing, SharingType::Unversioned | SharingType::Unknown) {
            statements.push((
                "DELETE FROM unversioned_fields
                 WHERE item_id = ?1 AND field_id = ?2 AND language = ?3",
                vec![
                    Box::new(item),
                    Box::new(field),
                    Box::new(change.language.clone()),
                ],
            ));
        }

        for (sql, stmt_params) in statements {
            let params_ref: Vec<&dyn ToSql> = stmt_params.iter().map(|p| p.as_ref()).collect();
            conn.execute(sql, params_ref.as_slice())?;
        }
        Ok(())
    }

    fn write_shared_field(
        conn: &Connection,
        item_id: ItemId,
        change: &FieldChange,
        now: DateTime<Utc>,
        save_all: bool,
    ) -> Result<()> {
        let stamp = now.to_rfc3339();
        if !save_all {
            let rows = conn.execute(
                "UPDATE shared_fields SET value = ?1, updated = ?2
                 WHERE item_id = ?3 AND field_id = ?4",
                params![
                    change.value,
                    stamp,
                    item_id.to_string(),
                    change.field_id.to_string(),
                ],
            )?;
            if rows > 0 {
                return Ok(());
            }
        }
        conn.execute(
            "INSERT INTO shared_fields (item_id, field_id, value, created, updated)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                item_id.to_string(),
                change.field_id.to_string(),
                change.value,
                stamp,
                stamp,
            ],
        )?;
        Ok(())
    }

    fn write_unversioned_field(
        conn: &Connection,
        item_id: ItemId,
        change: &FieldChange,
        now: DateTime<Utc>,
        save_all: bool,
    ) -> Result<()> {
        let stamp = now.to_rfc3339();
        if !save_all {
            let rows = conn.execute(
                "UPDATE unversioned_fields SET value = ?1, updated = ?2
                 WHERE item_id = ?3 AND language = ?4 AND field_id = ?5",
                params![
                    change.value,
                    stamp,
                    item_id.to_string(),
                    change.language,
                    change.field_id.to_string(),
                ],
            )?;
            if rows > 0 {
                return Ok(());
            }
        }
        conn.execute(
            "INSERT INTO unversioned_fields (item_id, language, field_id, value, created, updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                item_id.to_string(),
                change.language,
                change.field_id.to_string(),
                change.value,
                stamp,
                stamp,
            ],
        )?;
        Ok(())
    }

    fn write_versioned_field(
        conn: &Connection,
        item_id: ItemId,
        change: &FieldChange,
        now: DateTime<Utc>,
        save_all: bool,
    ) -> Result<()> {
        let stamp = now.to_rfc3339();
        if !save_all {
            let rows = conn.execute(
                "UPDATE versioned_fields SET value = ?1, updated = ?2
                 WHERE item_id = ?3 AND language = ?4 AND version = ?5 AND field_id = ?6",
                params![
                    change.value,
                    stamp,
                    item_id.to_string(),
                    change.language,
                    change.version,
                    change.field_id.to_string(),
                ],
            )?;
            if rows > 0 {
                return Ok(());
            }
        }
        conn.execute(
            "INSERT INTO versioned_fields (item_id, language, version, field_id, value, created, updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                item_id.to_string(),
                change.language,
                change.version,
                change.field_id.to_string(),
                change.value,
                stamp,
                stamp,
            ],
        )?;
        Ok(())
    }

    // ==================== Blob cleanup ====================

    /// Best-effort removal of blob streams orphaned by this change set.
    /// Runs outside the save transaction; failures are logged, never
    /// propagated.
    fn remove_old_blobs(&self, changes: &ItemChanges) {
        for change in &changes.field_changes {
            if let Err(err) = self.cleanup_blob(change) {
                tracing::warn!(
                    "Blob cleanup failed for field {}: {}",
                    change.field_id,
                    err
                );
            }
        }
    }

    fn cleanup_blob(&self, change: &FieldChange) -> Result<()> {
        let conn = self.lock_conn()?;
        if let Some(blob_id) = Self::blob_to_delete(&conn, change)? {
            conn.execute(
                "DELETE FROM blobs WHERE blob_id = ?1",
                params![blob_id.to_string()],
            )?;
        }
        Ok(())
    }

    /// The orphaned blob id, if this change replaced a blob value whose
    /// previous stream is no longer referenced by any field row.
    ///
    /// Reference scan covers the shared, versioned and archived tables,
    /// short-circuiting on the first hit. An original value that is not a
    /// well-formed identifier disqualifies the change silently.
    fn blob_to_delete(conn: &Connection, change: &FieldChange) -> Result<Option<Uuid>> {
        if !change.is_blob || change.value == change.original_value {
            return Ok(None);
        }
        let Ok(blob_id) = Uuid::parse_str(&change.original_value) else {
            return Ok(None);
        };
        if Self::value_exists(conn, "shared_fields", &change.original_value)?
            || Self::value_exists(conn, "versioned_fields", &change.original_value)?
            || Self::value_exists(conn, "archived_fields", &change.original_value)?
        {
            return Ok(None);
        }
        Ok(Some(blob_id))
    }

    fn value_exists(conn: &Connection, table: &str, value: &str) -> Result<bool> {
        let sql = format!("SELECT 1 FROM {} WHERE value = ?1 LIMIT 1", table);
        let hit = conn
            .query_row(&sql, params![value], |_row| Ok(()))
            .optional()?;
        Ok(hit.is_some())
    }

    // ==================== Cache invalidation ====================

    fn on_item_saved(&self, item_id: ItemId, template_id: TemplateId) {
        self.prefetch.remove(item_id);
        self.clear_language_cache(template_id);
    }

    fn clear_language_cache(&self, template_id: TemplateId) {
        if template_id == template_ids::LANGUAGE {
            self.languages.clear();
        }
    }

    // ==================== Item rows ====================

    /// Insert a new item row.
    pub fn create_item(&self, item: &ItemDefinition) -> Result<()> {
        let conn = self.lock_conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO items (id, name, template_id, branch_id, created, updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                item.id.to_string(),
                item.name,
                item.template_id.to_string(),
                item.branch_id.to_string(),
                now,
                now,
            ],
        )
        .map_err(|e| {
            if let rusqlite::Error::SqliteFailure(ffi, _) = &e {
                if ffi.code == rusqlite::ErrorCode::ConstraintViolation {
                    return StoreError::ItemExists(item.id);
                }
            }
            e.into()
        })?;
        Ok(())
    }

    /// Read an item's definition, serving repeated reads from the prefetch
    /// cache until the next save evicts it.
    pub fn get_item_definition(&self, item_id: ItemId) -> Result<Option<ItemDefinition>> {
        if let Some(definition) = self.prefetch.get(item_id) {
            return Ok(Some(definition));
        }
        let conn = self.lock_conn()?;
        let row = conn
            .query_row(
                "SELECT name, template_id, branch_id FROM items WHERE id = ?1",
                params![item_id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        drop(conn);

        let Some((name, template_str, branch_str)) = row else {
            return Ok(None);
        };
        let template_id = Uuid::parse_str(&template_str)
            .map_err(|e| StoreError::Database(format!("parse template id: {}", e)))?;
        let branch_id = Uuid::parse_str(&branch_str)
            .map_err(|e| StoreError::Database(format!("parse branch id: {}", e)))?;
        let definition = ItemDefinition::new(item_id, name, template_id, branch_id);
        self.prefetch.insert(definition.clone());
        Ok(Some(definition))
    }

    /// Names of the language-definition items, cached until one of them is
    /// saved.
    pub fn languages(&self) -> Result<Vec<Language>> {
        if let Some(languages) = self.languages.get() {
            return Ok(languages);
        }
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare("SELECT name FROM items WHERE template_id = ?1 ORDER BY name")?;
        let languages = stmt
            .query_map(params![template_ids::LANGUAGE.to_string()], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<std::result::Result<Vec<Language>, _>>()?;
        drop(stmt);
        drop(conn);
        self.languages.set(languages.clone());
        Ok(languages)
    }

    // ==================== Blob streams ====================

    /// Store a binary stream under a blob id, replacing any previous
    /// content for that id.
    pub fn set_blob_stream(&self, blob_id: Uuid, data: &[u8]) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO blobs (blob_id, data, created) VALUES (?1, ?2, ?3)",
            params![blob_id.to_string(), data, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn get_blob_stream(&self, blob_id: Uuid) -> Result<Option<Vec<u8>>> {
        let conn = self.lock_conn()?;
        let data = conn
            .query_row(
                "SELECT data FROM blobs WHERE blob_id = ?1",
                params![blob_id.to_string()],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(data)
    }

    pub fn remove_blob_stream(&self, blob_id: Uuid) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "DELETE FROM blobs WHERE blob_id = ?1",
            params![blob_id.to_string()],
        )?;
        Ok(())
    }
}
