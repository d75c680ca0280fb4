//! # Attribute System
//!
//! Everything a form needs to know about a single attribute, independent of
//! where its value lives:
//!
//! - **Values**: [`Value`], the dynamic value every accessor reads and writes
//! - **Types**: [`AttributeType`], the caster plus default used by
//!   introduced attributes and model fields
//! - **Registry**: [`AttributeRegistry`], the exposed-name table and the
//!   generated method table of one form type
//! - **Introduced storage**: [`IntroducedValue`], the form-local slot with
//!   lazy casting and dirty tracking
//! - **Composite assembly**: [`multiparameter`], which rebuilds one value
//!   from `name(1i)`, `name(2i)`, ... parts
//!
//! ## Accessor names
//!
//! | Method | Meaning |
//! |--------|---------|
//! | `name` | cast value |
//! | `name_before_type_cast` | raw value |
//! | `name=` | write |
//! | `name?` | truthiness |
//! | `name_changed?` | differs from the original |
//! | `name_was` | the original |

mod introduced;
pub mod multiparameter;
mod registry;
mod types;
mod value;

pub use introduced::IntroducedValue;
pub use multiparameter::MultiparameterKey;
pub use registry::{AccessorKind, AttributeRegistry, AttributeSource, Expose, IdentityOp, Method};
pub use types::{AttributeType, TypeKind};
pub use value::{Params, Value};
