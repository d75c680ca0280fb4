//! The attribute-exposure registry.
//!
//! A registry belongs to one [`FormType`](crate::FormType) and answers two
//! questions: which backing entity and field does an exposed name map to,
//! and which method names does the form respond to. The method table is
//! generated once, at registration time, so instances dispatch through a
//! lookup instead of reflection.

use super::types::AttributeType;
use crate::error::ConfigurationError;
use indexmap::IndexMap;
use std::collections::HashMap;

/// Options for one `expose` call.
///
/// Without [`Expose::on`] the attributes go to the identity entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expose {
    on: Option<String>,
    prefix: String,
    suffix: String,
    alias: Option<String>,
}

impl Expose {
    pub fn on(entity: impl Into<String>) -> Self {
        Self {
            on: Some(entity.into()),
            ..Self::default()
        }
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Expose a single attribute under a different name.
    pub fn alias(mut self, name: impl Into<String>) -> Self {
        self.alias = Some(name.into());
        self
    }

    fn exposed_name(&self, internal: &str) -> String {
        match &self.alias {
            Some(alias) => alias.clone(),
            None => format!("{}{}{}", self.prefix, internal, self.suffix),
        }
    }
}

/// Where an exposed attribute's value lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeSource {
    Entity { key: String, field: String },
    Introduced,
}

/// The per-attribute accessors generated for every exposed name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessorKind {
    Read,
    ReadBeforeTypeCast,
    Write,
    Query,
    Changed,
    Was,
}

impl AccessorKind {
    pub const ALL: [AccessorKind; 6] = [
        AccessorKind::Read,
        AccessorKind::ReadBeforeTypeCast,
        AccessorKind::Write,
        AccessorKind::Query,
        AccessorKind::Changed,
        AccessorKind::Was,
    ];

    pub fn method_name(self, attribute: &str) -> String {
        match self {
            AccessorKind::Read => attribute.to_string(),
            AccessorKind::ReadBeforeTypeCast => format!("{attribute}_before_type_cast"),
            AccessorKind::Write => format!("{attribute}="),
            AccessorKind::Query => format!("{attribute}?"),
            AccessorKind::Changed => format!("{attribute}_changed?"),
            AccessorKind::Was => format!("{attribute}_was"),
        }
    }
}

/// Identity operations delegated to the identity entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityOp {
    Id,
    ToKey,
    ToParam,
    Persisted,
    NewRecord,
    MarkForDestruction,
    MarkedForDestruction,
}

impl IdentityOp {
    pub const ALL: [IdentityOp; 7] = [
        IdentityOp::Id,
        IdentityOp::ToKey,
        IdentityOp::ToParam,
        IdentityOp::Persisted,
        IdentityOp::NewRecord,
        IdentityOp::MarkForDestruction,
        IdentityOp::MarkedForDestruction,
    ];

    pub fn method_name(self) -> &'static str {
        match self {
            IdentityOp::Id => "id",
            IdentityOp::ToKey => "to_key",
            IdentityOp::ToParam => "to_param",
            IdentityOp::Persisted => "persisted?",
            IdentityOp::NewRecord => "new_record?",
            IdentityOp::MarkForDestruction => "mark_for_destruction",
            IdentityOp::MarkedForDestruction => "marked_for_destruction?",
        }
    }
}

/// One entry of the generated method table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Attribute { name: String, kind: AccessorKind },
    Collection { name: String },
    NestedAttributes { collection: String },
    Identity(IdentityOp),
}

#[derive(Debug, Clone, Default)]
pub struct AttributeRegistry {
    exposed: IndexMap<String, IndexMap<String, String>>,
    introduced: IndexMap<String, AttributeType>,
    sources: IndexMap<String, AttributeSource>,
    identity: Option<String>,
    methods: HashMap<String, Method>,
}

impl AttributeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `names` of one backing entity. Returns the exposed names.
    pub fn expose<I, S>(
        &mut self,
        form: &str,
        names: I,
        options: &Expose,
    ) -> Result<Vec<String>, ConfigurationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let internal: Vec<String> = names.into_iter().map(Into::into).collect();

        let key = match options.on.as_ref().or(self.identity.as_ref()) {
            Some(key) => key.clone(),
            None => {
                return Err(ConfigurationError::MissingBackingEntity {
                    form: form.to_string(),
                    names: internal,
                })
            }
        };

        if let Some(alias) = &options.alias {
            if internal.len() != 1 {
                return Err(ConfigurationError::AliasMultiple {
                    names: internal,
                    alias: alias.clone(),
                });
            }
        }

        let pairs: Vec<(String, String)> = internal
            .into_iter()
            .map(|field| (options.exposed_name(&field), field))
            .collect();

        for (i, (exposed, _)) in pairs.iter().enumerate() {
            let repeated = pairs[..i].iter().any(|(earlier, _)| earlier == exposed);
            if repeated || self.is_taken(exposed) {
                return Err(ConfigurationError::DuplicateAttribute {
                    form: form.to_string(),
                    name: exposed.clone(),
                });
            }
        }

        let mapping = self.exposed.entry(key.clone()).or_default();
        for (exposed, field) in &pairs {
            mapping.insert(exposed.clone(), field.clone());
        }
        for (exposed, field) in &pairs {
            self.sources.insert(
                exposed.clone(),
                AttributeSource::Entity {
                    key: key.clone(),
                    field: field.clone(),
                },
            );
            self.add_accessors(exposed);
        }

        Ok(pairs.into_iter().map(|(exposed, _)| exposed).collect())
    }

    /// Register an attribute that lives on the form itself.
    pub fn introduce(
        &mut self,
        form: &str,
        name: impl Into<String>,
        ty: AttributeType,
    ) -> Result<(), ConfigurationError> {
        let name = name.into();
        if self.is_taken(&name) {
            return Err(ConfigurationError::DuplicateAttribute {
                form: form.to_string(),
                name,
            });
        }
        self.introduced.insert(name.clone(), ty);
        self.sources.insert(name.clone(), AttributeSource::Introduced);
        self.add_accessors(&name);
        Ok(())
    }

    /// Declare a backing entity without exposing anything on it yet.
    pub fn declare_entity(&mut self, key: impl Into<String>) {
        self.exposed.entry(key.into()).or_default();
    }

    /// Designate the identity entity; it becomes a backing entity too.
    pub fn set_identity(&mut self, key: impl Into<String>) {
        let key = key.into();
        self.declare_entity(key.clone());
        self.identity = Some(key);
        for op in IdentityOp::ALL {
            self.methods
                .entry(op.method_name().to_string())
                .or_insert(Method::Identity(op));
        }
    }

    /// Register the reader and nested-attributes writer of a collection.
    pub fn register_collection(
        &mut self,
        form: &str,
        name: &str,
        nested_suffix: &str,
    ) -> Result<(), ConfigurationError> {
        let writer = format!("{name}{nested_suffix}=");
        if self.is_taken(name) || self.methods.contains_key(&writer) {
            return Err(ConfigurationError::DuplicateAttribute {
                form: form.to_string(),
                name: name.to_string(),
            });
        }
        self.methods.insert(
            name.to_string(),
            Method::Collection {
                name: name.to_string(),
            },
        );
        self.methods.insert(
            writer,
            Method::NestedAttributes {
                collection: name.to_string(),
            },
        );
        Ok(())
    }

    fn is_taken(&self, name: &str) -> bool {
        self.sources.contains_key(name)
            || AccessorKind::ALL
                .iter()
                .any(|kind| self.methods.contains_key(&kind.method_name(name)))
    }

    fn add_accessors(&mut self, name: &str) {
        for kind in AccessorKind::ALL {
            self.methods.insert(
                kind.method_name(name),
                Method::Attribute {
                    name: name.to_string(),
                    kind,
                },
            );
        }
    }

    pub fn resolve(&self, name: &str) -> Option<&AttributeSource> {
        self.sources.get(name)
    }

    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    /// Backing-entity key → (exposed name → internal name), in declaration order.
    pub fn exposed_attributes(&self) -> &IndexMap<String, IndexMap<String, String>> {
        &self.exposed
    }

    pub fn introduced_attributes(&self) -> &IndexMap<String, AttributeType> {
        &self.introduced
    }

    /// Exposed and introduced names in declaration order.
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    pub fn backing_keys(&self) -> impl Iterator<Item = &str> {
        self.exposed.keys().map(String::as_str)
    }

    pub fn identity_key(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub(crate) fn declaration_index(&self, name: &str) -> Option<usize> {
        self.sources.get_index_of(name)
    }
}
