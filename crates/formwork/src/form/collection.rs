//! Nested collection synchronization.
//!
//! A [`CollectionSync`] sits between a parent form and one has-many
//! association. It wraps each member record in a child [`Form`] (once per
//! record, for the life of the parent form) and turns submitted
//! `<collection>_attributes` into inserts, updates and destroy marks.
//!
//! ## Classification
//!
//! | Submission | Result |
//! |------------|--------|
//! | id + destroy flag | destroy, if `allow_destroy` |
//! | id, not rejected | update, if `allow_update` |
//! | no id, no destroy flag, not rejected | insert, if `allow_insert` |
//! | anything else | ignored |
//!
//! Nothing is written to storage until the parent form saves.

use super::form_type::CollectionDecl;
use super::Form;
use crate::attributes::{AttributeType, Params, Value};
use crate::config::{FormConfig, NestedErrorPaths};
use crate::entity::{entity_ptr, Association, RecordId, SharedEntity};
use crate::error::{EntityError, FormError, Result};
use crate::error_set::ErrorSet;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

static DESTROY_FLAG: AttributeType = AttributeType::boolean();

pub struct CollectionSync {
    name: String,
    decl: CollectionDecl,
    association: Box<dyn Association>,
    forms: Vec<Form>,
    by_record: HashMap<*const (), usize>,
    config: FormConfig,
}

impl CollectionSync {
    pub(crate) fn new(
        name: &str,
        decl: CollectionDecl,
        association: Box<dyn Association>,
        config: FormConfig,
    ) -> Self {
        Self {
            name: name.to_string(),
            decl,
            association,
            forms: Vec::new(),
            by_record: HashMap::new(),
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The child form of `record`, created on first sight.
    fn wrap(&mut self, record: SharedEntity) -> Result<usize> {
        let ptr = entity_ptr(&record);
        if let Some(index) = self.by_record.get(&ptr) {
            return Ok(*index);
        }
        let form = Form::wrap(&self.decl.child, record)?;
        self.forms.push(form);
        let index = self.forms.len() - 1;
        self.by_record.insert(ptr, index);
        Ok(index)
    }

    fn wrap_all(&mut self) -> Result<Vec<usize>> {
        self.association
            .records()?
            .into_iter()
            .map(|record| self.wrap(record))
            .collect()
    }

    /// One child form per association member, in association order.
    pub fn forms(&mut self) -> Result<Vec<&Form>> {
        let indices = self.wrap_all()?;
        Ok(indices.into_iter().map(|index| &self.forms[index]).collect())
    }

    /// The child form at `position` in association order.
    pub fn form_mut(&mut self, position: usize) -> Result<Option<&mut Form>> {
        let indices = self.wrap_all()?;
        Ok(match indices.get(position) {
            Some(index) => self.forms.get_mut(*index),
            None => None,
        })
    }

    pub fn size(&self) -> Result<usize> {
        Ok(self.association.size()?)
    }

    /// Child forms created so far, in the order they were created.
    pub fn loaded_forms(&self) -> &[Form] {
        &self.forms
    }

    /// Apply a submitted list (or map) of child attribute sets.
    pub fn parse_collection_attributes(&mut self, submitted: Value) -> Result<()> {
        let entries: Vec<Value> = match submitted {
            Value::List(items) => items,
            Value::Map(map) => map.into_values().collect(),
            other => {
                return Err(FormError::Argument(format!(
                    "expected a list or map of attributes for `{}`, got {other}",
                    self.name
                )))
            }
        };

        let options = &self.decl.options;
        let id_key = self.config.identity_key.as_str();
        let destroy_key = self.config.destroy_key.as_str();

        let mut inserts: Vec<Params> = Vec::new();
        let mut updates: IndexMap<RecordId, Params> = IndexMap::new();
        let mut destroys: Vec<RecordId> = Vec::new();

        for entry in entries {
            let Value::Map(mut attributes) = entry else {
                return Err(FormError::Argument(format!(
                    "each entry of `{}` must be a map of attributes",
                    self.name
                )));
            };
            let destroy = attributes
                .get(destroy_key)
                .map_or(false, |flag| DESTROY_FLAG.cast(flag).is_truthy());
            let id = attributes
                .get(id_key)
                .filter(|id| id.is_present())
                .map(Value::to_integer_lossy);

            match id {
                Some(id) if destroy => {
                    if options.allow_destroy {
                        destroys.push(id);
                    }
                }
                Some(id) => {
                    if options.allow_update && !options.reject_if.rejects(&attributes, destroy_key) {
                        attributes.shift_remove(id_key);
                        attributes.shift_remove(destroy_key);
                        updates.insert(id, attributes);
                    }
                }
                None => {
                    if !destroy
                        && options.allow_insert
                        && !options.reject_if.rejects(&attributes, destroy_key)
                    {
                        attributes.shift_remove(destroy_key);
                        inserts.push(attributes);
                    }
                }
            }
        }

        debug!(
            collection = self.name.as_str(),
            inserts = inserts.len(),
            updates = updates.len(),
            destroys = destroys.len(),
            "parsed nested attributes"
        );

        if self.association.is_loaded() {
            self.wrap_all()?;
        }

        let wrapped: Vec<RecordId> = self
            .forms
            .iter()
            .filter_map(|form| form.id().ok().flatten())
            .collect();
        let mut to_load: Vec<RecordId> = Vec::new();
        for id in updates.keys().chain(destroys.iter()) {
            if !wrapped.contains(id) && !to_load.contains(id) {
                to_load.push(*id);
            }
        }
        if !to_load.is_empty() {
            for record in self.association.find(&to_load)? {
                self.association.add_to_target(record.clone());
                self.wrap(record)?;
            }
        }

        let by_id: HashMap<RecordId, usize> = self
            .forms
            .iter()
            .enumerate()
            .filter_map(|(index, form)| form.id().ok().flatten().map(|id| (id, index)))
            .collect();
        let table = self.decl.association.clone();
        let lookup = |id: RecordId| {
            by_id.get(&id).copied().ok_or_else(|| {
                FormError::from(EntityError::NotFound {
                    entity: table.clone(),
                    id,
                })
            })
        };

        for attributes in inserts {
            let record = self.association.build()?;
            let index = self.wrap(record)?;
            self.forms[index].assign_attributes(Value::Map(attributes))?;
        }
        for (id, attributes) in updates {
            let index = lookup(id)?;
            self.forms[index].assign_attributes(Value::Map(attributes))?;
        }
        for id in destroys {
            let index = lookup(id)?;
            self.forms[index].mark_for_destruction()?;
        }
        Ok(())
    }

    /// Validate every wrapped child, including those marked for
    /// destruction, and copy its errors to `errors` under this collection's
    /// prefix.
    pub(crate) fn validate_forms(
        &mut self,
        errors: &mut ErrorSet,
        style: NestedErrorPaths,
    ) -> Result<()> {
        let prefix = self.error_prefix(style);
        for form in &mut self.forms {
            if !form.run_validations()? {
                errors.merge_namespaced(&prefix, form.errors());
            }
        }
        Ok(())
    }

    /// Like [`CollectionSync::validate_forms`] but from the children's
    /// current (possibly cached) errors.
    pub(crate) fn collect_errors(&mut self, errors: &mut ErrorSet, style: NestedErrorPaths) {
        let prefix = self.error_prefix(style);
        for form in &mut self.forms {
            errors.merge_namespaced(&prefix, form.errors());
        }
    }

    fn error_prefix(&self, style: NestedErrorPaths) -> String {
        match style {
            NestedErrorPaths::Collection => self.name.clone(),
            NestedErrorPaths::Member => self
                .decl
                .child
                .identity_key()
                .unwrap_or(self.name.as_str())
                .to_string(),
        }
    }

    pub fn form_errors(&self) -> bool {
        self.forms.iter().any(Form::form_errors)
    }

    pub(crate) fn reset_forms_errors(&mut self) {
        for form in &mut self.forms {
            form.reset_errors();
        }
    }

    /// Destroy the marked children and persist the rest, without validating.
    pub(crate) fn save_forms(&mut self) -> Result<()> {
        for form in &mut self.forms {
            let key = form.form_type().identity_key().unwrap_or_default().to_string();
            let record = std::rc::Rc::clone(form.entity(&key)?);
            if form.marked_for_destruction()? {
                record.borrow_mut().destroy()?;
            } else {
                self.association.link(&record)?;
                form.persist_all()?;
            }
        }
        debug!(collection = self.name.as_str(), forms = self.forms.len(), "saved nested forms");
        Ok(())
    }
}

impl fmt::Debug for CollectionSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionSync")
            .field("name", &self.name)
            .field("association", &self.decl.association)
            .field("loaded_forms", &self.forms.len())
            .finish()
    }
}
