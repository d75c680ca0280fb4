//! Form-level validators.
//!
//! These run against the form's own attribute readers, so they work for
//! introduced attributes as well as exposed ones. Entity validations stay on
//! the entities; use these for rules that only make sense for one form.

use super::Form;
use crate::attributes::Value;
use crate::error_set::ErrorSet;

pub trait Validator {
    fn validate(&self, form: &Form, errors: &mut ErrorSet);
}

impl<F> Validator for F
where
    F: Fn(&Form, &mut ErrorSet),
{
    fn validate(&self, form: &Form, errors: &mut ErrorSet) {
        self(form, errors)
    }
}

fn read_or_null(form: &Form, name: &str) -> Value {
    form.read(name).unwrap_or_default()
}

/// Rejects blank values.
#[derive(Debug, Clone)]
pub struct Presence {
    names: Vec<String>,
}

pub fn presence_of<I, S>(names: I) -> Presence
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Presence {
        names: names.into_iter().map(Into::into).collect(),
    }
}

impl Validator for Presence {
    fn validate(&self, form: &Form, errors: &mut ErrorSet) {
        for name in &self.names {
            if read_or_null(form, name).is_blank() {
                errors.add(name.clone(), "can't be blank");
            }
        }
    }
}

/// Limits the character length of a value. `{count}` in the message is
/// replaced by the maximum.
#[derive(Debug, Clone)]
pub struct Length {
    name: String,
    max: usize,
    too_long: String,
}

pub fn length_of(name: impl Into<String>, max: usize) -> Length {
    Length {
        name: name.into(),
        max,
        too_long: "is too long (maximum is {count} characters)".to_string(),
    }
}

impl Length {
    pub fn too_long(mut self, message: impl Into<String>) -> Self {
        self.too_long = message.into();
        self
    }
}

impl Validator for Length {
    fn validate(&self, form: &Form, errors: &mut ErrorSet) {
        let value = read_or_null(form, &self.name);
        if value.is_null() {
            return;
        }
        if value.to_string().chars().count() > self.max {
            errors.add(
                self.name.clone(),
                self.too_long.replace("{count}", &self.max.to_string()),
            );
        }
    }
}

/// Requires `<name>_confirmation` to equal `<name>`.
#[derive(Debug, Clone)]
pub struct Confirmation {
    name: String,
    message: String,
}

pub fn confirmation_of(name: impl Into<String>) -> Confirmation {
    Confirmation {
        name: name.into(),
        message: "doesn't match".to_string(),
    }
}

impl Confirmation {
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl Validator for Confirmation {
    fn validate(&self, form: &Form, errors: &mut ErrorSet) {
        let confirmation_name = format!("{}_confirmation", self.name);
        if read_or_null(form, &confirmation_name) != read_or_null(form, &self.name) {
            errors.add(confirmation_name, self.message.clone());
        }
    }
}
