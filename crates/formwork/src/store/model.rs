use super::has_many::HasMany;
use super::memory::{MemoryStore, Row};
use crate::attributes::{AttributeType, Value};
use crate::callbacks::{Callbacks, Yield};
use crate::entity::{Association, Entity, RecordId, SharedEntity};
use crate::error::EntityError;
use crate::error_set::ErrorSet;
use crate::transaction::TransactionContext;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;

const ID_FIELD: &str = "id";

type CustomValidation = Rc<dyn Fn(&Model, &mut ErrorSet)>;

#[derive(Clone)]
enum Validation {
    Presence(String),
    Length { field: String, max: usize },
    Custom(CustomValidation),
}

#[derive(Clone)]
pub(crate) struct HasManyDef {
    pub(crate) schema: Rc<ModelSchema>,
    pub(crate) foreign_key: String,
}

/// Table layout and behaviour of one kind of [`Model`].
///
/// Built with chained calls and then frozen into an `Rc`:
///
/// ```ignore
/// let rooms = Rc::new(
///     ModelSchema::new("house_rooms")
///         .field("house_id", AttributeType::integer())
///         .field("name", AttributeType::string())
///         .validates_presence_of(["name"]),
/// );
/// ```
#[derive(Clone)]
pub struct ModelSchema {
    table: String,
    fields: IndexMap<String, AttributeType>,
    validations: Vec<Validation>,
    callbacks: Callbacks<Model, EntityError>,
    has_many: IndexMap<String, HasManyDef>,
}

impl ModelSchema {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            fields: IndexMap::new(),
            validations: Vec::new(),
            callbacks: Callbacks::new(),
            has_many: IndexMap::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn field(mut self, name: impl Into<String>, ty: AttributeType) -> Self {
        self.fields.insert(name.into(), ty);
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn validates_presence_of<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.validations
            .extend(fields.into_iter().map(|f| Validation::Presence(f.into())));
        self
    }

    pub fn validates_length_of(mut self, field: impl Into<String>, max: usize) -> Self {
        self.validations.push(Validation::Length {
            field: field.into(),
            max,
        });
        self
    }

    pub fn validate<F>(mut self, validation: F) -> Self
    where
        F: Fn(&Model, &mut ErrorSet) + 'static,
    {
        self.validations.push(Validation::Custom(Rc::new(validation)));
        self
    }

    pub fn before_save<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Model) -> Result<(), EntityError> + 'static,
    {
        self.callbacks.before(hook);
        self
    }

    pub fn around_save<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Model, &mut Yield<'_, Model, EntityError>) -> Result<(), EntityError> + 'static,
    {
        self.callbacks.around(hook);
        self
    }

    pub fn after_save<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Model) -> Result<(), EntityError> + 'static,
    {
        self.callbacks.after(hook);
        self
    }

    /// Declare a has-many association whose children point back through
    /// `foreign_key`.
    pub fn has_many(
        mut self,
        name: impl Into<String>,
        child: &Rc<ModelSchema>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.has_many.insert(
            name.into(),
            HasManyDef {
                schema: Rc::clone(child),
                foreign_key: foreign_key.into(),
            },
        );
        self
    }

    fn field_type(&self, field: &str) -> Result<&AttributeType, EntityError> {
        self.fields.get(field).ok_or_else(|| EntityError::UnknownField {
            entity: self.table.clone(),
            field: field.to_string(),
        })
    }
}

/// What a record knows about its stored row. Shared with the store's undo
/// log so a rolled-back transaction can put it back.
#[derive(Debug, Clone, Default)]
struct RecordState {
    id: Option<RecordId>,
    destroyed: bool,
    original: IndexMap<String, Value>,
}

/// A record of a [`MemoryStore`] table.
pub struct Model {
    schema: Rc<ModelSchema>,
    store: Rc<MemoryStore>,
    state: Rc<RefCell<RecordState>>,
    raw: IndexMap<String, Value>,
    errors: ErrorSet,
    marked_for_destruction: bool,
}

impl Model {
    /// A new, unsaved record with every field at its default.
    pub fn new(store: &Rc<MemoryStore>, schema: &Rc<ModelSchema>) -> Self {
        let raw: IndexMap<String, Value> = schema
            .fields
            .iter()
            .map(|(name, ty)| (name.clone(), ty.default_value().clone()))
            .collect();
        let model = Self {
            schema: Rc::clone(schema),
            store: Rc::clone(store),
            state: Rc::default(),
            raw,
            errors: ErrorSet::new(),
            marked_for_destruction: false,
        };
        model.state.borrow_mut().original = model.cast_values();
        model
    }

    pub(crate) fn from_row(
        store: &Rc<MemoryStore>,
        schema: &Rc<ModelSchema>,
        id: RecordId,
        row: Row,
    ) -> Self {
        let mut model = Self::new(store, schema);
        model.load_row(id, row);
        model
    }

    pub fn shared(self) -> Rc<RefCell<Model>> {
        Rc::new(RefCell::new(self))
    }

    /// Build, validate and insert a record.
    pub fn create<I, S>(
        store: &Rc<MemoryStore>,
        schema: &Rc<ModelSchema>,
        attributes: I,
    ) -> Result<Rc<RefCell<Model>>, EntityError>
    where
        I: IntoIterator<Item = (S, Value)>,
        S: AsRef<str>,
    {
        let mut model = Self::new(store, schema);
        model.assign(attributes)?;
        model.save()?;
        Ok(model.shared())
    }

    pub fn find(
        store: &Rc<MemoryStore>,
        schema: &Rc<ModelSchema>,
        id: RecordId,
    ) -> Result<Model, EntityError> {
        store
            .fetch(&schema.table, id)
            .map(|row| Self::from_row(store, schema, id, row))
            .ok_or_else(|| EntityError::NotFound {
                entity: schema.table.clone(),
                id,
            })
    }

    /// Re-read this record's row, dropping unsaved changes.
    pub fn reload(&mut self) -> Result<(), EntityError> {
        let current = self.state.borrow().id;
        let not_found = || EntityError::NotFound {
            entity: self.schema.table.clone(),
            id: current.unwrap_or_default(),
        };
        let id = current.ok_or_else(not_found)?;
        let row = self.store.fetch(&self.schema.table, id).ok_or_else(not_found)?;
        self.load_row(id, row);
        Ok(())
    }

    pub fn assign<I, S>(&mut self, attributes: I) -> Result<(), EntityError>
    where
        I: IntoIterator<Item = (S, Value)>,
        S: AsRef<str>,
    {
        for (field, value) in attributes {
            self.write(field.as_ref(), value)?;
        }
        Ok(())
    }

    /// Cast value of `field`, null for unknown fields.
    pub fn get(&self, field: &str) -> Value {
        self.read(field).unwrap_or_default()
    }

    pub fn schema(&self) -> &Rc<ModelSchema> {
        &self.schema
    }

    pub fn store(&self) -> &Rc<MemoryStore> {
        &self.store
    }

    pub fn destroyed(&self) -> bool {
        self.state.borrow().destroyed
    }

    fn load_row(&mut self, id: RecordId, row: Row) {
        for (field, value) in row {
            if self.schema.fields.contains_key(&field) {
                self.raw.insert(field, value);
            }
        }
        let original = self.cast_values();
        let mut state = self.state.borrow_mut();
        state.id = Some(id);
        state.destroyed = false;
        state.original = original;
    }

    /// Restore the current identity state if the open transaction rolls back.
    fn remember_state(&self) {
        let state = Rc::clone(&self.state);
        let saved = state.borrow().clone();
        self.store.on_rollback(move || *state.borrow_mut() = saved);
    }

    fn cast_values(&self) -> IndexMap<String, Value> {
        self.schema
            .fields
            .iter()
            .map(|(name, ty)| {
                let raw = self.raw.get(name).unwrap_or(&Value::Null);
                (name.clone(), ty.cast(raw))
            })
            .collect()
    }

    fn write_row(&mut self) -> Result<(), EntityError> {
        let row: Row = self.cast_values();
        let id = match self.id() {
            Some(id) => {
                self.store.update(&self.schema.table, id, row.clone())?;
                id
            }
            None => self.store.insert(&self.schema.table, row.clone())?,
        };
        self.remember_state();
        self.raw = row.clone();
        let mut state = self.state.borrow_mut();
        state.id = Some(id);
        state.original = row;
        Ok(())
    }
}

impl Entity for Model {
    fn entity_name(&self) -> &str {
        &self.schema.table
    }

    fn read(&self, field: &str) -> Result<Value, EntityError> {
        if field == ID_FIELD {
            return Ok(self.id().into());
        }
        let ty = self.schema.field_type(field)?;
        Ok(ty.cast(self.raw.get(field).unwrap_or(&Value::Null)))
    }

    fn read_before_type_cast(&self, field: &str) -> Result<Value, EntityError> {
        if field == ID_FIELD {
            return Ok(self.id().into());
        }
        self.schema.field_type(field)?;
        Ok(self.raw.get(field).cloned().unwrap_or_default())
    }

    fn write(&mut self, field: &str, value: Value) -> Result<(), EntityError> {
        let ty = self.schema.field_type(field)?;
        let raw = match value {
            Value::Parts(parts) => {
                ty.construct(&parts)
                    .map_err(|message| EntityError::InvalidValue {
                        field: field.to_string(),
                        message,
                    })?
            }
            other => other,
        };
        self.raw.insert(field.to_string(), raw);
        Ok(())
    }

    fn changed(&self, field: &str) -> Result<bool, EntityError> {
        Ok(self.read(field)? != self.previous_value(field)?)
    }

    fn previous_value(&self, field: &str) -> Result<Value, EntityError> {
        if field == ID_FIELD {
            return Ok(self.id().into());
        }
        self.schema.field_type(field)?;
        Ok(self
            .state
            .borrow()
            .original
            .get(field)
            .cloned()
            .unwrap_or_default())
    }

    fn validate(&mut self) -> bool {
        let mut errors = ErrorSet::new();
        for validation in &self.schema.validations {
            match validation {
                Validation::Presence(field) => {
                    if self.get(field).is_blank() {
                        errors.add(field.clone(), "can't be blank");
                    }
                }
                Validation::Length { field, max } => {
                    let length = self.get(field).to_string().chars().count();
                    if length > *max {
                        errors.add(
                            field.clone(),
                            format!("is too long (maximum is {max} characters)"),
                        );
                    }
                }
                Validation::Custom(check) => check(self, &mut errors),
            }
        }
        self.errors = errors;
        self.errors.is_empty()
    }

    fn errors(&self) -> &ErrorSet {
        &self.errors
    }

    fn persist(&mut self) -> Result<(), EntityError> {
        let schema = Rc::clone(&self.schema);
        if schema.callbacks.run(self, Model::write_row)? {
            Ok(())
        } else {
            Err(EntityError::Halted {
                entity: schema.table.clone(),
            })
        }
    }

    fn destroy(&mut self) -> Result<(), EntityError> {
        if let Some(id) = self.id() {
            self.store.delete(&self.schema.table, id)?;
        }
        self.remember_state();
        self.state.borrow_mut().destroyed = true;
        Ok(())
    }

    fn id(&self) -> Option<RecordId> {
        self.state.borrow().id
    }

    fn persisted(&self) -> bool {
        let state = self.state.borrow();
        state.id.is_some() && !state.destroyed
    }

    fn mark_for_destruction(&mut self) {
        self.marked_for_destruction = true;
    }

    fn marked_for_destruction(&self) -> bool {
        self.marked_for_destruction
    }

    fn transaction_context(&self) -> Option<Rc<dyn TransactionContext>> {
        let store: Rc<dyn TransactionContext> = self.store.clone();
        Some(store)
    }

    fn association(
        &self,
        name: &str,
        owner: &SharedEntity,
    ) -> Result<Box<dyn Association>, EntityError> {
        let def = self
            .schema
            .has_many
            .get(name)
            .ok_or_else(|| EntityError::UnknownAssociation {
                entity: self.schema.table.clone(),
                association: name.to_string(),
            })?;
        Ok(Box::new(HasMany::new(
            &self.store,
            &def.schema,
            def.foreign_key.clone(),
            Rc::clone(owner),
        )))
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("table", &self.schema.table)
            .field("id", &self.id())
            .field("values", &self.cast_values())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customers() -> Rc<ModelSchema> {
        Rc::new(
            ModelSchema::new("customers")
                .field("name", AttributeType::string())
                .field("friendly", AttributeType::boolean().with_default(true))
                .field("date_of_birth", AttributeType::date())
                .validates_presence_of(["name"])
                .validates_length_of("name", 5)
                .validate(|model, errors| {
                    if !model.get("friendly").is_truthy() {
                        errors.add(ErrorSet::BASE, "Customer needs to be friendly");
                    }
                }),
        )
    }

    #[test]
    fn new_records_start_at_defaults() {
        let store = Rc::new(MemoryStore::new());
        let model = Model::new(&store, &customers());
        assert_eq!(model.get("friendly"), Value::Bool(true));
        assert_eq!(model.get("name"), Value::Null);
        assert!(!model.persisted());
        assert!(!model.changed("friendly").unwrap());
    }

    #[test]
    fn validations_fill_the_error_list() {
        let store = Rc::new(MemoryStore::new());
        let mut model = Model::new(&store, &customers());
        model.write("friendly", Value::from("0")).unwrap();
        assert!(!model.validate());
        assert_eq!(model.errors().get("name"), ["can't be blank"]);
        assert_eq!(model.errors().get("base"), ["Customer needs to be friendly"]);

        model.write("name", Value::from("Alexandra")).unwrap();
        model.write("friendly", Value::Bool(true)).unwrap();
        assert!(!model.validate());
        assert_eq!(
            model.errors().get("name"),
            ["is too long (maximum is 5 characters)"]
        );
    }

    #[test]
    fn save_then_find_round_trips() {
        let store = Rc::new(MemoryStore::new());
        let schema = customers();
        let created = Model::create(&store, &schema, [("name", Value::from("Ann"))]).unwrap();
        let id = created.borrow().id().unwrap();

        let found = Model::find(&store, &schema, id).unwrap();
        assert_eq!(found.get("name"), Value::from("Ann"));
        assert!(found.persisted());
        assert_eq!(found.read("id").unwrap(), Value::Int(id));
    }

    #[test]
    fn save_rejects_invalid_records() {
        let store = Rc::new(MemoryStore::new());
        let err = Model::create(&store, &customers(), Vec::<(&str, Value)>::new()).unwrap_err();
        assert!(matches!(err, EntityError::Invalid { .. }));
        assert_eq!(store.count("customers"), 0);
    }

    #[test]
    fn unknown_fields_are_errors() {
        let store = Rc::new(MemoryStore::new());
        let mut model = Model::new(&store, &customers());
        assert!(matches!(
            model.write("nickname", Value::from("x")),
            Err(EntityError::UnknownField { .. })
        ));
    }

    #[test]
    fn composite_writes_use_the_field_constructor() {
        let store = Rc::new(MemoryStore::new());
        let mut model = Model::new(&store, &customers());
        let parts = [(1, Value::Int(2001)), (2, Value::Int(2)), (3, Value::Int(30))]
            .into_iter()
            .collect();
        let err = model.write("date_of_birth", Value::Parts(parts)).unwrap_err();
        assert_eq!(
            err,
            EntityError::InvalidValue {
                field: "date_of_birth".into(),
                message: "invalid date".into()
            }
        );
    }

    #[test]
    fn reload_drops_unsaved_changes_and_detects_deletion() {
        let store = Rc::new(MemoryStore::new());
        let schema = customers();
        let created = Model::create(&store, &schema, [("name", Value::from("Ann"))]).unwrap();
        let mut model = created.borrow_mut();
        model.write("name", Value::from("Bob")).unwrap();
        assert!(model.changed("name").unwrap());
        model.reload().unwrap();
        assert_eq!(model.get("name"), Value::from("Ann"));

        model.destroy().unwrap();
        assert!(matches!(model.reload(), Err(EntityError::NotFound { .. })));
    }

    #[test]
    fn rollback_forgets_the_insert() {
        let store = Rc::new(MemoryStore::new());
        let mut model = Model::new(&store, &customers());
        model.write("name", Value::from("Ann")).unwrap();

        store.begin();
        model.persist().unwrap();
        assert!(model.persisted());
        store.rollback();

        assert!(!model.persisted());
        assert_eq!(model.id(), None);
        assert!(model.changed("name").unwrap());
        assert_eq!(store.count("customers"), 0);
    }

    #[test]
    fn rollback_undoes_destroy() {
        let store = Rc::new(MemoryStore::new());
        let created = Model::create(&store, &customers(), [("name", Value::from("Ann"))]).unwrap();
        let mut model = created.borrow_mut();

        store.begin();
        model.destroy().unwrap();
        assert!(!model.persisted());
        store.rollback();

        assert!(model.persisted());
        assert!(!model.destroyed());
        assert_eq!(store.count("customers"), 1);
    }

    #[test]
    fn around_callback_can_halt_persist() {
        let store = Rc::new(MemoryStore::new());
        let schema = Rc::new(
            ModelSchema::new("notes")
                .field("body", AttributeType::string())
                .around_save(|_, _| Ok(())),
        );
        let mut model = Model::new(&store, &schema);
        assert_eq!(
            model.persist(),
            Err(EntityError::Halted {
                entity: "notes".into()
            })
        );
        assert_eq!(store.count("notes"), 0);
    }
}
