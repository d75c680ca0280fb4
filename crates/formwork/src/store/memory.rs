use crate::attributes::Value;
use crate::entity::RecordId;
use crate::error::EntityError;
use crate::transaction::TransactionContext;
use indexmap::IndexMap;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::trace;

/// One stored record: field name → value.
pub type Row = IndexMap<String, Value>;

type Tables = HashMap<String, BTreeMap<RecordId, Row>>;

type Undo = Box<dyn FnOnce()>;

/// In-memory table store.
///
/// Uses `RefCell` for interior mutability since forms are single-threaded,
/// so every operation takes `&self` and the store can be shared through an
/// `Rc` by all models that live in it.
///
/// Transactions nest: `begin` snapshots every table, `rollback` restores the
/// latest snapshot and `commit` discards it. Records register an undo step
/// with [`MemoryStore::on_rollback`] before they change their own identity
/// state, so a rollback resets them along with the tables.
#[derive(Default)]
pub struct MemoryStore {
    tables: RefCell<Tables>,
    next_id: Cell<RecordId>,
    snapshots: RefCell<Vec<Tables>>,
    undo: RefCell<Vec<Vec<Undo>>>,
    failing_tables: RefCell<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write to `table` fail, for testing rollback.
    pub fn set_simulate_write_error(&self, table: &str, simulate: bool) {
        let mut failing = self.failing_tables.borrow_mut();
        if simulate {
            failing.insert(table.to_string());
        } else {
            failing.remove(table);
        }
    }

    fn check_writable(&self, table: &str) -> Result<(), EntityError> {
        if self.failing_tables.borrow().contains(table) {
            Err(EntityError::Store(format!("simulated write error on {table}")))
        } else {
            Ok(())
        }
    }

    /// Store a new row and return its id.
    pub fn insert(&self, table: &str, row: Row) -> Result<RecordId, EntityError> {
        self.check_writable(table)?;
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        self.tables
            .borrow_mut()
            .entry(table.to_string())
            .or_default()
            .insert(id, row);
        Ok(id)
    }

    /// Replace the row `id`, creating it if needed.
    pub fn update(&self, table: &str, id: RecordId, row: Row) -> Result<(), EntityError> {
        self.check_writable(table)?;
        self.tables
            .borrow_mut()
            .entry(table.to_string())
            .or_default()
            .insert(id, row);
        Ok(())
    }

    pub fn delete(&self, table: &str, id: RecordId) -> Result<(), EntityError> {
        self.check_writable(table)?;
        if let Some(rows) = self.tables.borrow_mut().get_mut(table) {
            rows.remove(&id);
        }
        Ok(())
    }

    pub fn fetch(&self, table: &str, id: RecordId) -> Option<Row> {
        self.tables
            .borrow()
            .get(table)
            .and_then(|rows| rows.get(&id))
            .cloned()
    }

    /// Rows of `table` matching `predicate`, in id order.
    pub fn select<F>(&self, table: &str, predicate: F) -> Vec<(RecordId, Row)>
    where
        F: Fn(&Row) -> bool,
    {
        self.tables
            .borrow()
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|(_, row)| predicate(row))
                    .map(|(id, row)| (*id, row.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn count(&self, table: &str) -> usize {
        self.tables.borrow().get(table).map_or(0, BTreeMap::len)
    }

    pub fn depth(&self) -> usize {
        self.snapshots.borrow().len()
    }

    /// Run `undo` if the innermost open transaction, or any transaction it
    /// commits into, rolls back. Outside a transaction this is a no-op.
    pub fn on_rollback(&self, undo: impl FnOnce() + 'static) {
        if let Some(frame) = self.undo.borrow_mut().last_mut() {
            frame.push(Box::new(undo));
        }
    }
}

impl TransactionContext for MemoryStore {
    fn begin(&self) {
        let snapshot = self.tables.borrow().clone();
        self.snapshots.borrow_mut().push(snapshot);
        self.undo.borrow_mut().push(Vec::new());
        trace!(depth = self.depth(), "memory store begin");
    }

    fn commit(&self) -> Result<(), EntityError> {
        trace!(depth = self.depth(), "memory store commit");
        self.snapshots
            .borrow_mut()
            .pop()
            .ok_or_else(|| EntityError::Store("commit without an open transaction".into()))?;
        let mut undo = self.undo.borrow_mut();
        if let Some(committed) = undo.pop() {
            if let Some(parent) = undo.last_mut() {
                parent.extend(committed);
            }
        }
        Ok(())
    }

    fn rollback(&self) {
        trace!(depth = self.depth(), "memory store rollback");
        if let Some(snapshot) = self.snapshots.borrow_mut().pop() {
            *self.tables.borrow_mut() = snapshot;
        }
        let steps = self.undo.borrow_mut().pop().unwrap_or_default();
        for step in steps.into_iter().rev() {
            step();
        }
    }
}
