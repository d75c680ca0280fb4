//! # Formwork
//!
//! Formwork builds **form objects**: one validated, atomically-saved unit
//! over several persistent entities. A form exposes a chosen subset of each
//! entity's fields under names of its own, adds form-only attributes,
//! reconciles nested has-many collections from submitted parameters and
//! saves the whole tree in a single transaction scope.
//!
//! ## Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Form layer (form/)                                         │
//! │  - FormType: declarations, validators, callbacks            │
//! │  - Form: accessors, bulk assignment, errors, save           │
//! │  - CollectionSync: nested child forms per collection        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Attribute layer (attributes/)                              │
//! │  - Registry of exposed/introduced names and their methods   │
//! │  - Values, types, casting, composite (multiparameter) keys  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Entity layer (entity.rs, transaction.rs)                   │
//! │  - Entity / Association traits the forms drive              │
//! │  - TransactionContext + TransactionScope                    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Reference store (store/)                                   │
//! │  - MemoryStore with nested snapshots, Model, HasMany        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Anything that implements [`Entity`] can back a form; the bundled
//! [`store`] is a complete in-memory implementation, used by the tests and
//! handy for prototyping.
//!
//! ## Example
//!
//! ```
//! use formwork::store::{MemoryStore, Model, ModelSchema};
//! use formwork::{AttributeType, Expose, Form, FormType};
//! use std::rc::Rc;
//!
//! let store = Rc::new(MemoryStore::new());
//! let customers = Rc::new(
//!     ModelSchema::new("customers")
//!         .field("name", AttributeType::string())
//!         .validates_presence_of(["name"]),
//! );
//!
//! let mut signup = FormType::new("SignupForm");
//! signup.identity_from("customer");
//! signup.expose(["name"], Expose::default().alias("full_name")).unwrap();
//! let signup = Rc::new(signup);
//!
//! let customer = Model::new(&store, &customers).shared();
//! let mut form = Form::wrap(&signup, customer).unwrap();
//! form.write("full_name", "Ada").unwrap();
//! form.save().unwrap();
//! assert!(form.persisted().unwrap());
//! ```
//!
//! ## Module Overview
//!
//! - [`form`]: form types, form instances, nested collections, validators
//! - [`attributes`]: the attribute registry, values and types
//! - [`entity`]: the traits a backing entity implements
//! - [`transaction`]: nested units of work
//! - [`callbacks`]: before/around/after hook chains
//! - [`error_set`]: ordered error messages keyed by attribute path
//! - [`config`]: conventions (identity key, destroy flag, ...)
//! - [`store`]: in-memory reference entities
//! - [`error`]: error types

pub mod attributes;
pub mod callbacks;
pub mod config;
pub mod entity;
pub mod error;
pub mod error_set;
pub mod form;
pub mod store;
pub mod transaction;

pub use attributes::{AttributeType, Expose, Params, Value};
pub use config::{FormConfig, NestedErrorPaths};
pub use entity::{Association, Entity, RecordId, SharedEntity};
pub use error::{
    ConfigurationError, EntityError, FormError, MultiparameterAssignmentErrors, Result,
    ValidationFailure,
};
pub use error_set::ErrorSet;
pub use form::{Collection, Form, FormType, RejectIf};
