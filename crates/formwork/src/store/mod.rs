//! # Reference Storage
//!
//! Forms are written against the [`Entity`](crate::Entity) and
//! [`Association`](crate::Association) contracts and never touch storage
//! directly. This module provides a small implementation of those
//! contracts so forms can be used (and tested) without a database:
//!
//! - [`MemoryStore`]: tables of rows with nested snapshot transactions
//! - [`ModelSchema`] / [`Model`]: typed records with dirty tracking,
//!   validations and save callbacks
//! - [`HasMany`]: a foreign-key association between two schemas
//!
//! ## Usage
//!
//! ```ignore
//! let store = Rc::new(MemoryStore::new());
//! let customers = Rc::new(
//!     ModelSchema::new("customers")
//!         .field("name", AttributeType::string())
//!         .validates_presence_of(["name"]),
//! );
//! let customer = Model::create(&store, &customers, [("name", Value::from("Ann"))])?;
//! ```

mod has_many;
mod memory;
mod model;

pub use has_many::HasMany;
pub use memory::{MemoryStore, Row};
pub use model::{Model, ModelSchema};
