//! Validation and error aggregation.
//!
//! A form's errors come from three places, merged into one [`ErrorSet`]:
//!
//! - the form's own validators (form-level errors)
//! - every backing entity, with internal field names mapped back to exposed
//!   names and `base` passed through
//! - every loaded child form of every nested collection, namespaced under
//!   the collection (`rooms.room_name`)
//!
//! The set is cached until [`Form::reset_errors`] and always ordered `base`
//! first, then declared attributes, then everything else.

use super::Form;
use crate::error::Result;
use crate::error_set::ErrorSet;
use std::rc::Rc;
use tracing::debug;

impl Form {
    /// The current errors. Computed from the entities' current error lists
    /// on first access, then cached until [`Form::reset_errors`].
    pub fn errors(&mut self) -> &ErrorSet {
        if self.errors.is_none() {
            let mut errors = ErrorSet::new();
            self.collect_entity_errors(&mut errors);
            let style = self.form_type.config().nested_error_paths;
            for sync in self.collections.values_mut() {
                sync.collect_errors(&mut errors, style);
            }
            self.sort_errors(&mut errors);
            self.errors = Some(errors);
        }
        self.errors.get_or_insert_with(ErrorSet::new)
    }

    /// Drop cached errors here and in every loaded child form.
    pub fn reset_errors(&mut self) {
        self.errors = None;
        self.form_validation_failed = false;
        for sync in self.collections.values_mut() {
            sync.reset_forms_errors();
        }
    }

    /// Run every validation. Always re-validates.
    pub fn valid(&mut self) -> Result<bool> {
        self.run_validations()
    }

    pub fn invalid(&mut self) -> Result<bool> {
        Ok(!self.valid()?)
    }

    /// True when the failure came from form-level validators, here or in a
    /// child form, rather than from the entities.
    pub fn form_errors(&self) -> bool {
        self.form_validation_failed || self.collections.values().any(|sync| sync.form_errors())
    }

    pub(crate) fn run_validations(&mut self) -> Result<bool> {
        debug!(form = self.form_type.name(), "running validations");
        let form_type = Rc::clone(&self.form_type);

        for hook in form_type.before_validation_hooks() {
            hook(self)?;
        }

        let mut errors = ErrorSet::new();
        for validator in form_type.validators() {
            validator.validate(self, &mut errors);
        }
        self.form_validation_failed = !errors.is_empty();

        for entity in self.backing_entities() {
            entity.borrow_mut().validate();
        }
        self.collect_entity_errors(&mut errors);

        let style = form_type.config().nested_error_paths;
        for sync in self.collections.values_mut() {
            sync.validate_forms(&mut errors, style)?;
        }

        self.sort_errors(&mut errors);
        let valid = errors.is_empty();
        debug!(
            form = form_type.name(),
            valid,
            errors = errors.len(),
            "validation finished"
        );
        self.errors = Some(errors);
        Ok(valid)
    }

    /// Copy each backing entity's `base` errors and its errors on exposed
    /// fields, renamed to the exposed names.
    pub(crate) fn collect_entity_errors(&self, errors: &mut ErrorSet) {
        for (key, mapping) in self.form_type.exposed_attributes() {
            let Some(entity) = self.entities.get(key) else {
                continue;
            };
            let entity = entity.borrow();
            let entity_errors = entity.errors();
            for message in entity_errors.get(ErrorSet::BASE) {
                errors.add_unique(ErrorSet::BASE, message.clone());
            }
            for (exposed, internal) in mapping {
                for message in entity_errors.get(internal) {
                    errors.add(exposed.clone(), message.clone());
                }
            }
        }
    }

    fn sort_errors(&self, errors: &mut ErrorSet) {
        let registry = self.form_type.registry();
        errors.sort_by_declaration(|path| registry.declaration_index(path));
    }
}
