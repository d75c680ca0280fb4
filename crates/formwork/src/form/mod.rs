//! # Forms
//!
//! A [`FormType`] describes which attributes a form exposes and where they
//! live; a [`Form`] is one instance of it bound to concrete entities.
//!
//! ## Lifecycle
//!
//! ```text
//! Form::builder(&ty).entity(..).build()
//!     -> write / assign_attributes        (lands on entities or form-local slots)
//!     -> valid? / errors                  (validation.rs)
//!     -> save / update                    (saving.rs, one transaction scope)
//! ```
//!
//! Nested has-many collections are reconciled by a
//! [`CollectionSync`] per exposed collection, created on first use.

mod collection;
mod form_type;
mod saving;
mod validation;
pub mod validators;

pub use collection::CollectionSync;
pub use form_type::{Collection, Fragment, FormType, RejectIf};

use crate::attributes::multiparameter::{assign_multiparameter_attributes, is_multiparameter_key};
use crate::attributes::{AccessorKind, AttributeSource, IdentityOp, IntroducedValue, Method, Params, Value};
use crate::entity::{entity_ptr, RecordId, SharedEntity};
use crate::error::{EntityError, FormError, Result};
use crate::error_set::ErrorSet;
use crate::transaction::{NullTransaction, TransactionContext};
use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;

/// One instance of a [`FormType`].
pub struct Form {
    form_type: Rc<FormType>,
    entities: IndexMap<String, SharedEntity>,
    introduced: IndexMap<String, IntroducedValue>,
    collections: IndexMap<String, CollectionSync>,
    errors: Option<ErrorSet>,
    form_validation_failed: bool,
    fallback_transaction: Rc<dyn TransactionContext>,
}

pub struct FormBuilder {
    form_type: Rc<FormType>,
    entities: IndexMap<String, SharedEntity>,
    fallback_transaction: Option<Rc<dyn TransactionContext>>,
}

impl FormBuilder {
    /// Bind `entity` under `key`. Keys the form type does not declare are
    /// kept as context for callbacks but are neither validated nor saved.
    pub fn entity(mut self, key: impl Into<String>, entity: SharedEntity) -> Self {
        self.entities.insert(key.into(), entity);
        self
    }

    /// Unit of work used for entities that have none of their own.
    pub fn fallback_transaction(mut self, context: Rc<dyn TransactionContext>) -> Self {
        self.fallback_transaction = Some(context);
        self
    }

    pub fn build(self) -> Result<Form> {
        let registry = self.form_type.registry();
        if let Some(missing) = registry
            .backing_keys()
            .find(|key| !self.entities.contains_key(*key))
        {
            return Err(FormError::UnboundEntity {
                form: self.form_type.name().to_string(),
                key: missing.to_string(),
            });
        }

        let introduced = registry
            .introduced_attributes()
            .iter()
            .map(|(name, ty)| (name.clone(), IntroducedValue::new(ty.clone())))
            .collect();

        Ok(Form {
            form_type: self.form_type,
            entities: self.entities,
            introduced,
            collections: IndexMap::new(),
            errors: None,
            form_validation_failed: false,
            fallback_transaction: self
                .fallback_transaction
                .unwrap_or_else(|| Rc::new(NullTransaction)),
        })
    }
}

impl Form {
    pub fn builder(form_type: &Rc<FormType>) -> FormBuilder {
        FormBuilder {
            form_type: Rc::clone(form_type),
            entities: IndexMap::new(),
            fallback_transaction: None,
        }
    }

    /// A form whose only entity is its identity entity.
    pub fn wrap(form_type: &Rc<FormType>, entity: SharedEntity) -> Result<Form> {
        let key = form_type
            .identity_key()
            .ok_or_else(|| FormError::no_method(form_type.name(), IdentityOp::Id.method_name()))?;
        Form::builder(form_type).entity(key, entity).build()
    }

    pub fn form_type(&self) -> &Rc<FormType> {
        &self.form_type
    }

    fn type_name(&self) -> &str {
        self.form_type.name()
    }

    /// The entity bound under `key`.
    pub fn entity(&self, key: &str) -> Result<&SharedEntity> {
        self.entities.get(key).ok_or_else(|| FormError::UnboundEntity {
            form: self.type_name().to_string(),
            key: key.to_string(),
        })
    }

    /// Declared entities, each once, in declaration order.
    pub(crate) fn backing_entities(&self) -> Vec<SharedEntity> {
        let mut seen = Vec::new();
        let mut entities = Vec::new();
        for key in self.form_type.registry().backing_keys() {
            if let Some(entity) = self.entities.get(key) {
                let ptr = entity_ptr(entity);
                if !seen.contains(&ptr) {
                    seen.push(ptr);
                    entities.push(Rc::clone(entity));
                }
            }
        }
        entities
    }

    fn source(&self, name: &str) -> Result<&AttributeSource> {
        self.form_type
            .registry()
            .resolve(name)
            .ok_or_else(|| FormError::no_method(self.type_name(), name))
    }

    fn slot(&self, name: &str) -> Result<&IntroducedValue> {
        self.introduced
            .get(name)
            .ok_or_else(|| FormError::no_method(self.type_name(), name))
    }

    // --- Attribute accessors ---

    pub fn read(&self, name: &str) -> Result<Value> {
        match self.source(name)? {
            AttributeSource::Entity { key, field } => Ok(self.entity(key)?.borrow().read(field)?),
            AttributeSource::Introduced => Ok(self.slot(name)?.read().clone()),
        }
    }

    pub fn read_before_type_cast(&self, name: &str) -> Result<Value> {
        match self.source(name)? {
            AttributeSource::Entity { key, field } => {
                Ok(self.entity(key)?.borrow().read_before_type_cast(field)?)
            }
            AttributeSource::Introduced => Ok(self.slot(name)?.read_before_type_cast().clone()),
        }
    }

    pub fn write(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        match self.source(name)?.clone() {
            AttributeSource::Entity { key, field } => {
                self.entity(&key)?.borrow_mut().write(&field, value)?;
            }
            AttributeSource::Introduced => {
                let form = self.type_name().to_string();
                let slot = self
                    .introduced
                    .get_mut(name)
                    .ok_or_else(|| FormError::no_method(&form, name))?;
                slot.write(value).map_err(|message| EntityError::InvalidValue {
                    field: name.to_string(),
                    message,
                })?;
            }
        }
        Ok(())
    }

    pub fn query(&self, name: &str) -> Result<bool> {
        match self.source(name)? {
            AttributeSource::Entity { key, field } => Ok(self.entity(key)?.borrow().query(field)?),
            AttributeSource::Introduced => Ok(self.slot(name)?.read().is_truthy()),
        }
    }

    pub fn changed(&self, name: &str) -> Result<bool> {
        match self.source(name)? {
            AttributeSource::Entity { key, field } => {
                Ok(self.entity(key)?.borrow().changed(field)?)
            }
            AttributeSource::Introduced => Ok(self.slot(name)?.changed()),
        }
    }

    /// The value before the pending change.
    pub fn was(&self, name: &str) -> Result<Value> {
        match self.source(name)? {
            AttributeSource::Entity { key, field } => {
                Ok(self.entity(key)?.borrow().previous_value(field)?)
            }
            AttributeSource::Introduced => Ok(self.slot(name)?.was().clone()),
        }
    }

    /// Exposed and introduced names in declaration order.
    pub fn attribute_names(&self) -> Vec<String> {
        self.form_type.attribute_names()
    }

    pub fn attributes(&self) -> Result<Params> {
        self.form_type
            .registry()
            .attribute_names()
            .map(|name| Ok((name.to_string(), self.read(name)?)))
            .collect()
    }

    pub fn respond_to(&self, method: &str) -> bool {
        self.form_type.registry().method(method).is_some()
    }

    /// Dispatch a generated method by name: `"name"`, `"name="`,
    /// `"name_changed?"`, `"rooms_attributes="`, `"to_param"`, ...
    ///
    /// Writers take their value from `argument`; readers ignore it.
    pub fn call(&mut self, method: &str, argument: Option<Value>) -> Result<Value> {
        let resolved = self
            .form_type
            .registry()
            .method(method)
            .cloned()
            .ok_or_else(|| FormError::no_method(self.type_name(), method))?;

        let required = move || {
            argument.ok_or_else(|| {
                FormError::Argument(format!(
                    "wrong number of arguments calling `{method}` (given 0, expected 1)"
                ))
            })
        };

        match resolved {
            Method::Attribute { name, kind } => match kind {
                AccessorKind::Read => self.read(&name),
                AccessorKind::ReadBeforeTypeCast => self.read_before_type_cast(&name),
                AccessorKind::Write => {
                    let value = required()?;
                    self.write(&name, value.clone())?;
                    Ok(value)
                }
                AccessorKind::Query => self.query(&name).map(Value::Bool),
                AccessorKind::Changed => self.changed(&name).map(Value::Bool),
                AccessorKind::Was => self.was(&name),
            },
            Method::Collection { name } => {
                let forms = self.collection(&name)?.forms()?;
                let rows = forms
                    .into_iter()
                    .map(|form| form.attributes().map(Value::Map))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::List(rows))
            }
            Method::NestedAttributes { collection } => {
                let value = required()?;
                self.collection(&collection)?
                    .parse_collection_attributes(value)?;
                Ok(Value::Null)
            }
            Method::Identity(op) => self.identity_call(op),
        }
    }

    fn identity_call(&mut self, op: IdentityOp) -> Result<Value> {
        Ok(match op {
            IdentityOp::Id => self.id()?.into(),
            IdentityOp::ToKey => self
                .to_key()?
                .map_or(Value::Null, |key| Value::List(key.into_iter().map(Value::Int).collect())),
            IdentityOp::ToParam => self.to_param()?.into(),
            IdentityOp::Persisted => Value::Bool(self.persisted()?),
            IdentityOp::NewRecord => Value::Bool(self.new_record()?),
            IdentityOp::MarkForDestruction => {
                self.mark_for_destruction()?;
                Value::Null
            }
            IdentityOp::MarkedForDestruction => Value::Bool(self.marked_for_destruction()?),
        })
    }

    /// Bulk assignment from a map of exposed names, `<collection>_attributes`
    /// keys and composite `name(1i)` keys. Composite keys are applied last.
    pub fn assign_attributes(&mut self, attributes: impl Into<Value>) -> Result<()> {
        let Value::Map(params) = attributes.into() else {
            return Err(FormError::Argument(
                "When assigning attributes, you must pass a map as an argument".to_string(),
            ));
        };

        let mut composite = Vec::new();
        for (key, value) in params {
            if is_multiparameter_key(&key) {
                composite.push((key, value));
            } else {
                self.assign_one(&key, value)?;
            }
        }

        if !composite.is_empty() {
            let pairs = composite.iter().map(|(key, value)| (key.as_str(), value));
            assign_multiparameter_attributes(pairs, |name, value| {
                self.write(name, value).map_err(|err| match err {
                    FormError::Entity(EntityError::InvalidValue { message, .. }) => message,
                    other => other.to_string(),
                })
            })?;
        }
        Ok(())
    }

    fn assign_one(&mut self, key: &str, value: Value) -> Result<()> {
        let writer = format!("{key}=");
        let assignable = matches!(
            self.form_type.registry().method(&writer),
            Some(Method::Attribute { .. } | Method::NestedAttributes { .. })
        );
        if !assignable {
            return Err(FormError::no_method(self.type_name(), writer));
        }
        self.call(&writer, Some(value))?;
        Ok(())
    }

    // --- Identity ---

    fn identity_entity(&self, op: IdentityOp) -> Result<&SharedEntity> {
        let key = self
            .form_type
            .identity_key()
            .ok_or_else(|| FormError::no_method(self.type_name(), op.method_name()))?;
        self.entity(key)
    }

    pub fn id(&self) -> Result<Option<RecordId>> {
        Ok(self.identity_entity(IdentityOp::Id)?.borrow().id())
    }

    /// `[id]` once persisted.
    pub fn to_key(&self) -> Result<Option<Vec<RecordId>>> {
        let entity = self.identity_entity(IdentityOp::ToKey)?.borrow();
        Ok(entity.id().filter(|_| entity.persisted()).map(|id| vec![id]))
    }

    pub fn to_param(&self) -> Result<Option<String>> {
        Ok(self.to_key()?.map(|key| {
            key.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("-")
        }))
    }

    pub fn persisted(&self) -> Result<bool> {
        Ok(self.identity_entity(IdentityOp::Persisted)?.borrow().persisted())
    }

    pub fn new_record(&self) -> Result<bool> {
        Ok(self.identity_entity(IdentityOp::NewRecord)?.borrow().id().is_none())
    }

    pub fn mark_for_destruction(&mut self) -> Result<()> {
        self.identity_entity(IdentityOp::MarkForDestruction)?
            .borrow_mut()
            .mark_for_destruction();
        Ok(())
    }

    pub fn marked_for_destruction(&self) -> Result<bool> {
        Ok(self
            .identity_entity(IdentityOp::MarkedForDestruction)?
            .borrow()
            .marked_for_destruction())
    }

    // --- Collections ---

    /// The synchronizer of the exposed collection `name`, created on first use.
    pub fn collection(&mut self, name: &str) -> Result<&mut CollectionSync> {
        if !self.collections.contains_key(name) {
            let decl = self
                .form_type
                .collection_decl(name)
                .cloned()
                .ok_or_else(|| FormError::no_method(self.type_name(), name))?;
            let owner = Rc::clone(self.entity(&decl.on)?);
            let association = owner.borrow().association(&decl.association, &owner)?;
            let sync = CollectionSync::new(name, decl, association, self.form_type.config().clone());
            self.collections.insert(name.to_string(), sync);
        }
        self.collections
            .get_mut(name)
            .ok_or_else(|| FormError::no_method(self.form_type.name(), name))
    }
}

impl fmt::Debug for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Form")
            .field("type", &self.type_name())
            .field("entities", &self.entities.keys().collect::<Vec<_>>())
            .field("errors", &self.errors)
            .finish()
    }
}
