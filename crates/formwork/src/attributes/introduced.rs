//! Storage for introduced (form-local) attributes.

use super::types::AttributeType;
use super::value::Value;
use once_cell::unsync::OnceCell;

/// Value slot for one introduced attribute.
///
/// Writes store the raw value and drop the cast cache; reads cast lazily
/// from the raw value, or from the type's default when never written.
#[derive(Debug, Clone)]
pub struct IntroducedValue {
    ty: AttributeType,
    raw: Option<Value>,
    cast: OnceCell<Value>,
    original: Value,
}

impl IntroducedValue {
    pub fn new(ty: AttributeType) -> Self {
        let original = ty.cast_default();
        Self {
            ty,
            raw: None,
            cast: OnceCell::new(),
            original,
        }
    }

    pub fn attribute_type(&self) -> &AttributeType {
        &self.ty
    }

    pub fn read(&self) -> &Value {
        self.cast
            .get_or_init(|| self.ty.cast(self.read_before_type_cast()))
    }

    pub fn read_before_type_cast(&self) -> &Value {
        self.raw.as_ref().unwrap_or_else(|| self.ty.default_value())
    }

    /// Store a raw value. Composite parts are constructed eagerly so that a
    /// bad part is reported at assignment time.
    pub fn write(&mut self, value: Value) -> Result<(), String> {
        let raw = match value {
            Value::Parts(parts) => self.ty.construct(&parts)?,
            other => other,
        };
        self.raw = Some(raw);
        self.cast = OnceCell::new();
        Ok(())
    }

    pub fn changed(&self) -> bool {
        *self.read() != self.original
    }

    /// The value before the pending change.
    pub fn was(&self) -> &Value {
        &self.original
    }

    /// Accept the current value as the new original (after a save).
    pub fn changes_applied(&mut self) {
        self.original = self.read().clone();
    }
}
