use crate::attributes::Value;
use crate::error::EntityError;
use crate::error_set::ErrorSet;
use crate::transaction::TransactionContext;
use std::cell::RefCell;
use std::rc::Rc;

pub type RecordId = i64;

/// A backing entity shared between a form, its callbacks and the caller.
pub type SharedEntity = Rc<RefCell<dyn Entity>>;

/// Interface a form needs from a persistent record.
/// The form only reads and writes named fields and asks the entity to
/// validate and persist itself; how that happens is the entity's business.
pub trait Entity {
    /// Name used in error messages (usually the table name).
    fn entity_name(&self) -> &str;

    // --- Field access ---

    fn read(&self, field: &str) -> Result<Value, EntityError>;

    fn read_before_type_cast(&self, field: &str) -> Result<Value, EntityError>;

    /// Write a raw value. `Value::Parts` must be built with the field's
    /// multi-part constructor.
    fn write(&mut self, field: &str, value: Value) -> Result<(), EntityError>;

    fn changed(&self, field: &str) -> Result<bool, EntityError>;

    /// Value as last loaded or persisted.
    fn previous_value(&self, field: &str) -> Result<Value, EntityError>;

    fn query(&self, field: &str) -> Result<bool, EntityError> {
        Ok(self.read(field)?.is_truthy())
    }

    // --- Validation & persistence ---

    /// Rebuild the entity's own error list. Returns true when it is empty.
    fn validate(&mut self) -> bool;

    fn errors(&self) -> &ErrorSet;

    /// Persist without validating.
    fn persist(&mut self) -> Result<(), EntityError>;

    fn save(&mut self) -> Result<(), EntityError> {
        if self.validate() {
            self.persist()
        } else {
            Err(EntityError::Invalid {
                entity: self.entity_name().to_string(),
                errors: self.errors().clone(),
            })
        }
    }

    fn destroy(&mut self) -> Result<(), EntityError>;

    // --- Identity ---

    fn id(&self) -> Option<RecordId>;

    fn persisted(&self) -> bool;

    fn mark_for_destruction(&mut self);

    fn marked_for_destruction(&self) -> bool;

    // --- Collaborators ---

    /// The unit-of-work this entity saves under, if it has one.
    fn transaction_context(&self) -> Option<Rc<dyn TransactionContext>> {
        None
    }

    /// The has-many association `name`. `owner` is this entity's own handle,
    /// which built children need for their foreign key.
    fn association(
        &self,
        name: &str,
        owner: &SharedEntity,
    ) -> Result<Box<dyn Association>, EntityError> {
        let _ = owner;
        Err(EntityError::UnknownAssociation {
            entity: self.entity_name().to_string(),
            association: name.to_string(),
        })
    }
}

/// A live parent-to-children collection.
pub trait Association {
    /// Every member, loading from storage on first use.
    fn records(&mut self) -> Result<Vec<SharedEntity>, EntityError>;

    fn size(&self) -> Result<usize, EntityError>;

    fn is_loaded(&self) -> bool;

    /// Members with the given ids, in the order requested.
    /// Fails with `NotFound` for an id that does not belong to the owner.
    fn find(&mut self, ids: &[RecordId]) -> Result<Vec<SharedEntity>, EntityError>;

    /// A new, unsaved member, already part of the in-memory target.
    fn build(&mut self) -> Result<SharedEntity, EntityError>;

    /// Add a record to the in-memory target unless it is already there.
    fn add_to_target(&mut self, record: SharedEntity);

    /// Point `record` at the owner before it is persisted. Needed for
    /// members built while the owner itself was still unsaved.
    fn link(&self, record: &SharedEntity) -> Result<(), EntityError> {
        let _ = record;
        Ok(())
    }
}

/// Pointer identity of a shared entity, used to memoize per-record state.
pub fn entity_ptr(entity: &SharedEntity) -> *const () {
    Rc::as_ptr(entity).cast::<()>()
}
