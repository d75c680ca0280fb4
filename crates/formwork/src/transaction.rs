//! Nested units of work.
//!
//! A save touches every backing entity of a form, and each entity may live
//! in a different store. [`TransactionScope`] opens one nested transaction
//! per context in the order given and, unless [`TransactionScope::commit`]
//! is reached, rolls all of them back in reverse order when it is dropped.
//! Early returns through `?` therefore unwind the stores as well.

use crate::error::EntityError;
use std::rc::Rc;
use tracing::{trace, warn};

pub trait TransactionContext {
    fn begin(&self);

    fn commit(&self) -> Result<(), EntityError>;

    fn rollback(&self);
}

/// Context for entities without a unit of work of their own.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTransaction;

impl TransactionContext for NullTransaction {
    fn begin(&self) {}

    fn commit(&self) -> Result<(), EntityError> {
        Ok(())
    }

    fn rollback(&self) {}
}

/// Guard over a stack of open transactions.
#[must_use = "dropping the scope rolls every transaction back"]
pub struct TransactionScope {
    open: Vec<Rc<dyn TransactionContext>>,
}

impl TransactionScope {
    pub fn open(contexts: Vec<Rc<dyn TransactionContext>>) -> Self {
        for context in &contexts {
            context.begin();
        }
        trace!(depth = contexts.len(), "transaction scope opened");
        Self { open: contexts }
    }

    /// Commit innermost first. A failed commit rolls back the failing
    /// context and whatever is still open around it.
    pub fn commit(mut self) -> Result<(), EntityError> {
        while let Some(context) = self.open.last() {
            context.commit()?;
            self.open.pop();
        }
        trace!("transaction scope committed");
        Ok(())
    }
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        if self.open.is_empty() {
            return;
        }
        warn!(depth = self.open.len(), "rolling back transaction scope");
        while let Some(context) = self.open.pop() {
            context.rollback();
        }
    }
}

/// Run `body` inside one scope over `contexts`; commit on `Ok`, roll back
/// on `Err`.
pub fn within<T, E, F>(contexts: Vec<Rc<dyn TransactionContext>>, body: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    E: From<EntityError>,
{
    let scope = TransactionScope::open(contexts);
    let value = body()?;
    scope.commit()?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct Recording {
        name: &'static str,
        log: Rc<RefCell<Vec<String>>>,
        fail_commit: bool,
    }

    impl TransactionContext for Recording {
        fn begin(&self) {
            self.log.borrow_mut().push(format!("begin {}", self.name));
        }

        fn commit(&self) -> Result<(), EntityError> {
            self.log.borrow_mut().push(format!("commit {}", self.name));
            if self.fail_commit {
                Err(EntityError::Store(format!("{} refused", self.name)))
            } else {
                Ok(())
            }
        }

        fn rollback(&self) {
            self.log.borrow_mut().push(format!("rollback {}", self.name));
        }
    }

    fn contexts(
        log: &Rc<RefCell<Vec<String>>>,
        names: &[(&'static str, bool)],
    ) -> Vec<Rc<dyn TransactionContext>> {
        names
            .iter()
            .map(|(name, fail_commit)| {
                Rc::new(Recording {
                    name: *name,
                    log: log.clone(),
                    fail_commit: *fail_commit,
                }) as Rc<dyn TransactionContext>
            })
            .collect()
    }

    #[test]
    fn commits_in_reverse_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let result: Result<i32, EntityError> =
            within(contexts(&log, &[("a", false), ("b", false)]), || Ok(7));

        assert_eq!(result, Ok(7));
        assert_eq!(*log.borrow(), vec!["begin a", "begin b", "commit b", "commit a"]);
    }

    #[test]
    fn error_rolls_back_in_reverse_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let result: Result<(), EntityError> =
            within(contexts(&log, &[("a", false), ("b", false)]), || {
                Err(EntityError::Store("boom".into()))
            });

        assert!(result.is_err());
        assert_eq!(
            *log.borrow(),
            vec!["begin a", "begin b", "rollback b", "rollback a"]
        );
    }

    #[test]
    fn failed_commit_rolls_back_the_failing_context_too() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let result: Result<(), EntityError> =
            within(contexts(&log, &[("a", false), ("b", true)]), || Ok(()));

        assert!(result.is_err());
        assert_eq!(
            *log.borrow(),
            vec!["begin a", "begin b", "commit b", "rollback b", "rollback a"]
        );
    }
}
