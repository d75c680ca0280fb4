use super::validators::Validator;
use super::Form;
use crate::attributes::{AttributeRegistry, AttributeType, Expose, Params};
use crate::callbacks::{Callbacks, Yield};
use crate::config::FormConfig;
use crate::error::{ConfigurationError, FormError, Result};
use crate::error_set::ErrorSet;
use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;

type Hook = Rc<dyn Fn(&mut Form) -> Result<()>>;

/// Rejection rule for nested collection submissions.
#[derive(Clone, Default)]
pub enum RejectIf {
    #[default]
    Never,
    /// Decides without looking at the submission.
    Toggle(Rc<dyn Fn() -> bool>),
    /// Decides per submitted attribute set.
    Record(Rc<dyn Fn(&Params) -> bool>),
    /// Rejects submissions whose values are all blank, ignoring the destroy flag.
    AllBlank,
}

impl RejectIf {
    pub fn toggle(f: impl Fn() -> bool + 'static) -> Self {
        RejectIf::Toggle(Rc::new(f))
    }

    pub fn record(f: impl Fn(&Params) -> bool + 'static) -> Self {
        RejectIf::Record(Rc::new(f))
    }

    pub fn all_blank() -> Self {
        RejectIf::AllBlank
    }

    pub(crate) fn rejects(&self, attributes: &Params, destroy_key: &str) -> bool {
        match self {
            RejectIf::Never => false,
            RejectIf::Toggle(f) => f(),
            RejectIf::Record(f) => f(attributes),
            RejectIf::AllBlank => attributes
                .iter()
                .all(|(key, value)| key == destroy_key || value.is_blank()),
        }
    }
}

impl fmt::Debug for RejectIf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            RejectIf::Never => "Never",
            RejectIf::Toggle(_) => "Toggle",
            RejectIf::Record(_) => "Record",
            RejectIf::AllBlank => "AllBlank",
        };
        f.write_str(kind)
    }
}

/// Options for [`FormType::expose_collection_of`].
#[derive(Debug, Clone)]
pub struct Collection {
    pub(crate) on: Option<String>,
    pub(crate) alias: Option<String>,
    pub(crate) allow_insert: bool,
    pub(crate) allow_update: bool,
    pub(crate) allow_destroy: bool,
    pub(crate) reject_if: RejectIf,
}

impl Default for Collection {
    fn default() -> Self {
        Self {
            on: None,
            alias: None,
            allow_insert: true,
            allow_update: true,
            allow_destroy: false,
            reject_if: RejectIf::Never,
        }
    }
}

impl Collection {
    pub fn on(entity: impl Into<String>) -> Self {
        Self {
            on: Some(entity.into()),
            ..Self::default()
        }
    }

    /// Expose the collection under a different name.
    pub fn alias(mut self, name: impl Into<String>) -> Self {
        self.alias = Some(name.into());
        self
    }

    pub fn allow_insert(mut self, allow: bool) -> Self {
        self.allow_insert = allow;
        self
    }

    pub fn allow_update(mut self, allow: bool) -> Self {
        self.allow_update = allow;
        self
    }

    pub fn allow_destroy(mut self, allow: bool) -> Self {
        self.allow_destroy = allow;
        self
    }

    pub fn reject_if(mut self, rule: RejectIf) -> Self {
        self.reject_if = rule;
        self
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CollectionDecl {
    pub(crate) association: String,
    pub(crate) on: String,
    pub(crate) child: Rc<FormType>,
    pub(crate) options: Collection,
}

/// Reusable piece of a form definition.
///
/// Any `Fn(&mut FormType) -> Result<(), ConfigurationError>` is a fragment,
/// so shared exposures can live in a plain function.
pub trait Fragment {
    fn apply(&self, form: &mut FormType) -> std::result::Result<(), ConfigurationError>;
}

impl<F> Fragment for F
where
    F: Fn(&mut FormType) -> std::result::Result<(), ConfigurationError>,
{
    fn apply(&self, form: &mut FormType) -> std::result::Result<(), ConfigurationError> {
        self(form)
    }
}

/// The definition of a form: what it exposes, how it validates and what
/// runs around its save.
///
/// Definitions are built mutably, then shared by every instance through an
/// `Rc`. [`FormType::specialize`] copies a definition so a derived form can
/// add to it without touching the base.
#[derive(Clone)]
pub struct FormType {
    name: String,
    registry: AttributeRegistry,
    collections: IndexMap<String, CollectionDecl>,
    validators: Vec<Rc<dyn Validator>>,
    before_validation: Vec<Hook>,
    callbacks: Callbacks<Form, FormError>,
    config: FormConfig,
}

type DefinitionResult<'a> = std::result::Result<&'a mut FormType, ConfigurationError>;

impl FormType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registry: AttributeRegistry::new(),
            collections: IndexMap::new(),
            validators: Vec::new(),
            before_validation: Vec::new(),
            callbacks: Callbacks::new(),
            config: FormConfig::default(),
        }
    }

    /// A derived definition starting from a copy of this one.
    pub fn specialize(&self, name: impl Into<String>) -> Self {
        let mut derived = self.clone();
        derived.name = name.into();
        derived
    }

    pub fn with_config(&mut self, config: FormConfig) -> &mut Self {
        self.config = config;
        self
    }

    pub fn expose<I, S>(&mut self, names: I, options: Expose) -> DefinitionResult<'_>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.registry.expose(&self.name, names, &options)?;
        Ok(self)
    }

    /// Add an attribute stored on the form itself.
    pub fn attribute(&mut self, name: impl Into<String>, ty: AttributeType) -> DefinitionResult<'_> {
        self.registry.introduce(&self.name, name, ty)?;
        Ok(self)
    }

    /// Take `id`, `to_key`, `to_param`, `persisted?`, ... from `entity`.
    pub fn identity_from(&mut self, entity: impl Into<String>) -> &mut Self {
        self.registry.set_identity(entity);
        self
    }

    /// Expose the has-many `association` as a collection of `child` forms.
    pub fn expose_collection_of(
        &mut self,
        association: impl Into<String>,
        options: Collection,
        child: FormType,
    ) -> DefinitionResult<'_> {
        let association = association.into();
        let exposed = options.alias.clone().unwrap_or_else(|| association.clone());

        if child.registry.identity_key().is_none() {
            return Err(ConfigurationError::CollectionWithoutIdentity {
                form: self.name.clone(),
                collection: exposed,
            });
        }
        let on = match options.on.as_deref().or(self.registry.identity_key()) {
            Some(on) => on.to_string(),
            None => {
                return Err(ConfigurationError::MissingBackingEntity {
                    form: self.name.clone(),
                    names: vec![exposed],
                })
            }
        };

        self.registry.register_collection(
            &self.name,
            &exposed,
            &self.config.nested_attributes_suffix,
        )?;
        self.registry.declare_entity(on.clone());
        self.collections.insert(
            exposed,
            CollectionDecl {
                association,
                on,
                child: Rc::new(child),
                options,
            },
        );
        Ok(self)
    }

    pub fn include<F>(&mut self, fragment: &F) -> DefinitionResult<'_>
    where
        F: Fragment + ?Sized,
    {
        fragment.apply(self)?;
        Ok(self)
    }

    /// Add a form-level validation written as a closure.
    pub fn validate<F>(&mut self, check: F) -> &mut Self
    where
        F: Fn(&Form, &mut ErrorSet) + 'static,
    {
        self.validators.push(Rc::new(check));
        self
    }

    /// Add one of the stock [`validators`](super::validators).
    pub fn validates<V>(&mut self, validator: V) -> &mut Self
    where
        V: Validator + 'static,
    {
        self.validators.push(Rc::new(validator));
        self
    }

    pub fn before_validation<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&mut Form) -> Result<()> + 'static,
    {
        self.before_validation.push(Rc::new(hook));
        self
    }

    pub fn before_save<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&mut Form) -> Result<()> + 'static,
    {
        self.callbacks.before(hook);
        self
    }

    /// The hook must call its second argument to let the save proceed.
    pub fn around_save<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&mut Form, &mut Yield<'_, Form, FormError>) -> Result<()> + 'static,
    {
        self.callbacks.around(hook);
        self
    }

    pub fn after_save<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&mut Form) -> Result<()> + 'static,
    {
        self.callbacks.after(hook);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &AttributeRegistry {
        &self.registry
    }

    pub fn config(&self) -> &FormConfig {
        &self.config
    }

    /// Backing-entity key → (exposed name → internal name).
    pub fn exposed_attributes(&self) -> &IndexMap<String, IndexMap<String, String>> {
        self.registry.exposed_attributes()
    }

    pub fn introduced_attributes(&self) -> &IndexMap<String, AttributeType> {
        self.registry.introduced_attributes()
    }

    pub fn attribute_names(&self) -> Vec<String> {
        self.registry.attribute_names().map(str::to_string).collect()
    }

    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    pub fn identity_key(&self) -> Option<&str> {
        self.registry.identity_key()
    }

    pub(crate) fn collection_decl(&self, name: &str) -> Option<&CollectionDecl> {
        self.collections.get(name)
    }

    pub(crate) fn validators(&self) -> &[Rc<dyn Validator>] {
        &self.validators
    }

    pub(crate) fn before_validation_hooks(&self) -> &[Hook] {
        &self.before_validation
    }

    pub(crate) fn callbacks(&self) -> &Callbacks<Form, FormError> {
        &self.callbacks
    }
}

impl fmt::Debug for FormType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormType")
            .field("name", &self.name)
            .field("exposed", self.registry.exposed_attributes())
            .field("collections", &self.collections.keys().collect::<Vec<_>>())
            .finish()
    }
}
