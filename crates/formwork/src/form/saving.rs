//! Saving.
//!
//! `save` validates the whole form tree, then persists it inside one
//! [`TransactionScope`](crate::transaction::TransactionScope) covering every
//! distinct unit of work the backing entities report. Order of writes:
//!
//! 1. `before_save` hooks, then `around_save` hooks down to the body
//! 2. each backing entity, in declaration order, without revalidating
//! 3. each nested collection: marked children destroyed, the rest linked to
//!    their owner and persisted
//! 4. `after_save` hooks
//!
//! Any error in those steps unwinds the scope, rolling every store back.

use super::Form;
use crate::attributes::Value;
use crate::error::{EntityError, FormError, Result, ValidationFailure};
use crate::transaction::{within, TransactionContext};
use std::rc::Rc;
use tracing::{debug, info};

impl Form {
    /// Validate and persist. Fails with [`FormError::Invalid`] when any part
    /// of the tree is invalid; nothing is written in that case.
    pub fn save(&mut self) -> Result<()> {
        self.reset_errors();
        self.transaction(|form| form.save_within())?;
        info!(form = self.form_type.name(), "form saved");
        Ok(())
    }

    /// Like [`Form::save`], but reports validation failure as `Ok(false)`.
    pub fn save_if_valid(&mut self) -> Result<bool> {
        match self.save() {
            Ok(()) => Ok(true),
            Err(err) if err.is_invalid() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Assign then save, both inside one transaction.
    pub fn update(&mut self, attributes: impl Into<Value>) -> Result<()> {
        let attributes = attributes.into();
        self.transaction(|form| {
            form.assign_attributes(attributes)?;
            form.save()
        })
    }

    pub fn update_if_valid(&mut self, attributes: impl Into<Value>) -> Result<bool> {
        match self.update(attributes) {
            Ok(()) => Ok(true),
            Err(err) if err.is_invalid() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Run `body` in one unit of work spanning every backing entity.
    pub fn transaction<T, F>(&mut self, body: F) -> Result<T>
    where
        F: FnOnce(&mut Form) -> Result<T>,
    {
        let contexts = self.transaction_contexts();
        within(contexts, || body(self))
    }

    fn transaction_contexts(&self) -> Vec<Rc<dyn TransactionContext>> {
        let mut contexts: Vec<Rc<dyn TransactionContext>> = Vec::new();
        let mut push = |context: Rc<dyn TransactionContext>| {
            if !contexts.iter().any(|open| Rc::ptr_eq(open, &context)) {
                contexts.push(context);
            }
        };
        let entities = self.backing_entities();
        if entities.is_empty() {
            push(Rc::clone(&self.fallback_transaction));
        }
        for entity in entities {
            let context = entity.borrow().transaction_context();
            push(context.unwrap_or_else(|| Rc::clone(&self.fallback_transaction)));
        }
        contexts
    }

    fn save_within(&mut self) -> Result<()> {
        if !self.run_validations()? {
            let failure = ValidationFailure {
                form: self.form_type.name().to_string(),
                errors: self.errors().clone(),
                form_errors: self.form_errors(),
            };
            debug!(form = failure.form.as_str(), "save refused: {failure}");
            return Err(failure.into());
        }
        self.persist_all()
    }

    /// Persist this form and its children without validating.
    pub(crate) fn persist_all(&mut self) -> Result<()> {
        let form_type = Rc::clone(&self.form_type);
        let completed = form_type
            .callbacks()
            .run(self, |form| form.persist_entities())?;
        if !completed {
            return Err(FormError::Halted {
                form: form_type.name().to_string(),
            });
        }
        for slot in self.introduced.values_mut() {
            slot.changes_applied();
        }
        Ok(())
    }

    fn persist_entities(&mut self) -> Result<()> {
        for entity in self.backing_entities() {
            let saved = entity.borrow_mut().persist();
            if let Err(err) = saved {
                if matches!(err, EntityError::Invalid { .. }) {
                    self.errors = None;
                    self.errors();
                }
                return Err(err.into());
            }
        }
        for sync in self.collections.values_mut() {
            sync.save_forms()?;
        }
        Ok(())
    }
}
