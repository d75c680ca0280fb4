use crate::attributes::Value;
use crate::entity::RecordId;
use crate::error_set::ErrorSet;
use thiserror::Error;

/// Structural misuse detected while a [`crate::FormType`] is being defined.
///
/// These never happen at runtime against user input; they mean the form
/// definition itself is wrong.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("cannot alias multiple attributes to one name (tried {names:?} as `{alias}`)")]
    AliasMultiple { names: Vec<String>, alias: String },

    #[error("`{name}` is already exposed on {form}")]
    DuplicateAttribute { form: String, name: String },

    #[error("{form} has no backing entity to expose {names:?} on; pass `on` or call identity_from")]
    MissingBackingEntity { form: String, names: Vec<String> },

    #[error("collection `{collection}` on {form} needs a child form with an identity entity")]
    CollectionWithoutIdentity { form: String, collection: String },

    #[error("unknown attribute type: {0}")]
    UnknownType(String),

    #[error("failed to load form configuration: {0}")]
    Load(String),
}

/// Failures reported by backing entities and their collaborators.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EntityError {
    #[error("couldn't find {entity} with id {id}")]
    NotFound { entity: String, id: RecordId },

    #[error("unknown field `{field}` for {entity}")]
    UnknownField { entity: String, field: String },

    #[error("{entity} has no association named `{association}`")]
    UnknownAssociation { entity: String, association: String },

    #[error("invalid value for `{field}`: {message}")]
    InvalidValue { field: String, message: String },

    #[error("{entity} is invalid: {}", errors.full_messages().join(", "))]
    Invalid { entity: String, errors: ErrorSet },

    #[error("save of {entity} was halted by a callback")]
    Halted { entity: String },

    #[error("store error: {0}")]
    Store(String),
}

/// Raised by `save`/`update` when the form, one of its entities, or one of
/// its nested child forms failed validation.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Validation failed: {}", errors.full_messages().join(", "))]
pub struct ValidationFailure {
    /// Name of the form type that failed.
    pub form: String,
    /// Snapshot of the aggregated errors at the time of failure.
    pub errors: ErrorSet,
    /// True when a form-level (not entity-level) validator produced errors.
    pub form_errors: bool,
}

/// One failed composite attribute group.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("error on assignment {values:?} to {attribute} ({message})")]
pub struct AttributeAssignmentError {
    pub attribute: String,
    pub values: Vec<Value>,
    pub message: String,
}

/// Every composite group that failed during one bulk assignment.
#[derive(Error, Debug, Clone, PartialEq)]
#[error(
    "{} error(s) on assignment of multiparameter attributes [{}]",
    errors.len(),
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
)]
pub struct MultiparameterAssignmentErrors {
    pub errors: Vec<AttributeAssignmentError>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormError {
    /// Access to a name the form type never declared.
    #[error("undefined method `{method}` for {form}")]
    NoMethod { form: String, method: String },

    #[error("{0}")]
    Argument(String),

    #[error("{form} has no backing entity bound for `{key}`")]
    UnboundEntity { form: String, key: String },

    #[error("save of {form} was halted by an around_save callback")]
    Halted { form: String },

    #[error(transparent)]
    Invalid(#[from] ValidationFailure),

    #[error(transparent)]
    Multiparameter(#[from] MultiparameterAssignmentErrors),

    #[error(transparent)]
    Entity(#[from] EntityError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

impl FormError {
    /// Whether this error is a validation outcome rather than a fault.
    ///
    /// The non-raising `save_if_valid`/`update_if_valid` swallow exactly
    /// these.
    pub fn is_invalid(&self) -> bool {
        matches!(
            self,
            FormError::Invalid(_) | FormError::Entity(EntityError::Invalid { .. })
        )
    }

    pub(crate) fn no_method(form: &str, method: impl Into<String>) -> Self {
        FormError::NoMethod {
            form: form.to_string(),
            method: method.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FormError>;
