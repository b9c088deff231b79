//! Redb (Rust embedded database) backend for the newsmap store.
//!
//! Every logical [`Table`] maps to its own redb table. Writes go through redb
//! write transactions, so [`StoreBackend::write_batch`] is atomic: a crash in
//! the middle of a grid commit leaves the previous cache rows intact.
//!
//! # Configuration Example
//! ```yaml
//! database_path: "/data/newsmap.redb"
//! ```

use crate::backend::{StoreBackend, Table, WriteOp};
use crate::StoreError;
use redb::{Database, ReadableDatabase, TableDefinition};
use std::path::Path;
use std::sync::Arc;

fn definition(table: Table) -> TableDefinition<'static, &'static str, &'static [u8]> {
    TableDefinition::new(table.name())
}

/// Redb backend implementation for persistent key-value storage.
///
/// # Thread Safety
/// The `Arc<Database>` wrapper allows safe sharing across threads.
/// Redb handles its own internal locking and MVCC.
pub struct RedbBackend {
    db: Arc<Database>,
}

impl RedbBackend {
    /// Open or create a Redb database at the given path, creating all tables.
    ///
    /// # Example
    /// ```no_run
    /// use store::RedbBackend;
    ///
    /// let backend = RedbBackend::open("/tmp/newsmap.redb").unwrap();
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(StoreError::backend)?;

        // Read transactions fail on tables that were never created.
        let write_txn = db.begin_write().map_err(StoreError::backend)?;
        for table in Table::ALL {
            write_txn
                .open_table(definition(table))
                .map_err(StoreError::backend)?;
        }
        write_txn.commit().map_err(StoreError::backend)?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl StoreBackend for RedbBackend {
    fn get(&self, table: Table, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let read_txn = self.db.begin_read().map_err(StoreError::backend)?;
        let rows = read_txn
            .open_table(definition(table))
            .map_err(StoreError::backend)?;

        Ok(rows
            .get(key)
            .map_err(StoreError::backend)?
            .map(|value| value.value().to_vec()))
    }

    fn write_batch(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write().map_err(StoreError::backend)?;
        // Order only matters within a table, so each table is opened once.
        for table in Table::ALL {
            let mut rows = write_txn
                .open_table(definition(table))
                .map_err(StoreError::backend)?;
            for op in &ops {
                match op {
                    WriteOp::Put(t, key, value) if *t == table => {
                        rows.insert(key.as_str(), value.as_slice())
                            .map_err(StoreError::backend)?;
                    }
                    WriteOp::Delete(t, key) if *t == table => {
                        rows.remove(key.as_str()).map_err(StoreError::backend)?;
                    }
                    _ => {}
                }
            }
        }
        write_txn.commit().map_err(StoreError::backend)?;
        Ok(())
    }

    fn keys_desc_from(
        &self,
        table: Table,
        from: &str,
        visitor: &mut dyn FnMut(&str) -> Result<bool, StoreError>,
    ) -> Result<(), StoreError> {
        let read_txn = self.db.begin_read().map_err(StoreError::backend)?;
        let rows = read_txn
            .open_table(definition(table))
            .map_err(StoreError::backend)?;

        for item in rows.range(from..).map_err(StoreError::backend)?.rev() {
            let (key, _) = item.map_err(StoreError::backend)?;
            if !visitor(key.value())? {
                break;
            }
        }
        Ok(())
    }
}
