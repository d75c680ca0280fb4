use super::memory::MemoryStore;
use super::model::{Model, ModelSchema};
use crate::attributes::Value;
use crate::entity::{entity_ptr, Association, Entity, RecordId, SharedEntity};
use crate::error::EntityError;
use std::collections::HashSet;
use std::rc::Rc;

/// Children of one owner record, linked by a foreign-key column.
///
/// The in-memory target holds the members handed out so far. Loading merges
/// the stored rows into it: records already in the target keep their
/// instance (and any unsaved changes), and records not yet stored stay at
/// the end.
pub struct HasMany {
    store: Rc<MemoryStore>,
    schema: Rc<ModelSchema>,
    foreign_key: String,
    owner: SharedEntity,
    target: Vec<SharedEntity>,
    loaded: bool,
}

impl HasMany {
    pub fn new(
        store: &Rc<MemoryStore>,
        schema: &Rc<ModelSchema>,
        foreign_key: String,
        owner: SharedEntity,
    ) -> Self {
        Self {
            store: Rc::clone(store),
            schema: Rc::clone(schema),
            foreign_key,
            owner,
            target: Vec::new(),
            loaded: false,
        }
    }

    fn stored_ids(&self) -> Vec<RecordId> {
        self.stored_rows().into_iter().map(|(id, _)| id).collect()
    }

    fn stored_rows(&self) -> Vec<(RecordId, super::Row)> {
        let Some(owner_id) = self.owner.borrow().id() else {
            return Vec::new();
        };
        let key = Value::Int(owner_id);
        self.store
            .select(self.schema.table(), |row| row.get(&self.foreign_key) == Some(&key))
    }

    fn in_target(&self, id: RecordId) -> Option<SharedEntity> {
        self.target
            .iter()
            .find(|record| record.borrow().id() == Some(id))
            .cloned()
    }

    fn instantiate(&self, id: RecordId, row: super::Row) -> SharedEntity {
        Model::from_row(&self.store, &self.schema, id, row).shared()
    }
}

impl Association for HasMany {
    fn records(&mut self) -> Result<Vec<SharedEntity>, EntityError> {
        if !self.loaded {
            let rows = self.stored_rows();
            let stored: HashSet<RecordId> = rows.iter().map(|(id, _)| *id).collect();

            let mut merged: Vec<SharedEntity> = rows
                .into_iter()
                .map(|(id, row)| {
                    self.in_target(id)
                        .unwrap_or_else(|| self.instantiate(id, row))
                })
                .collect();
            merged.extend(self.target.iter().filter(|record| {
                record
                    .borrow()
                    .id()
                    .map_or(true, |id| !stored.contains(&id))
            }).cloned());

            self.target = merged;
            self.loaded = true;
        }
        Ok(self.target.clone())
    }

    fn size(&self) -> Result<usize, EntityError> {
        if self.loaded {
            return Ok(self.target.len());
        }
        let stored = self.stored_ids();
        let unsaved = self
            .target
            .iter()
            .filter(|record| {
                record
                    .borrow()
                    .id()
                    .map_or(true, |id| !stored.contains(&id))
            })
            .count();
        Ok(stored.len() + unsaved)
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn find(&mut self, ids: &[RecordId]) -> Result<Vec<SharedEntity>, EntityError> {
        let rows = self.stored_rows();
        ids.iter()
            .map(|id| {
                if let Some(record) = self.in_target(*id) {
                    return Ok(record);
                }
                rows.iter()
                    .find(|(stored, _)| stored == id)
                    .map(|(_, row)| self.instantiate(*id, row.clone()))
                    .ok_or_else(|| EntityError::NotFound {
                        entity: self.schema.table().to_string(),
                        id: *id,
                    })
            })
            .collect()
    }

    fn build(&mut self) -> Result<SharedEntity, EntityError> {
        let mut model = Model::new(&self.store, &self.schema);
        if let Some(owner_id) = self.owner.borrow().id() {
            model.assign([(self.foreign_key.as_str(), Value::Int(owner_id))])?;
        }
        let record = model.shared();
        self.target.push(record.clone());
        Ok(record)
    }

    fn add_to_target(&mut self, record: SharedEntity) {
        let ptr = entity_ptr(&record);
        if !self.target.iter().any(|existing| entity_ptr(existing) == ptr) {
            self.target.push(record);
        }
    }

    fn link(&self, record: &SharedEntity) -> Result<(), EntityError> {
        let Some(owner_id) = self.owner.borrow().id() else {
            return Ok(());
        };
        let mut record = record.borrow_mut();
        if record.read(&self.foreign_key)? != Value::Int(owner_id) {
            record.write(&self.foreign_key, Value::Int(owner_id))?;
        }
        Ok(())
    }
}
