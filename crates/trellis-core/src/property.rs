use crate::error::PropertyError;
use crate::value::Value;

/// A named, typed setter on a view or controller.
pub struct PropertyDescriptor<T> {
    pub name: &'static str,
    pub set: fn(&mut T, &Value) -> Result<(), PropertyError>,
}

impl<T> Clone for PropertyDescriptor<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for PropertyDescriptor<T> {}

/// Static property table of a view or controller type.
///
/// Usually derived with `#[derive(Properties)]`, marking each exposed field
/// with `#[prop]` or `#[prop(rename = "...")]`.
pub trait Properties: Sized + 'static {
    fn descriptors() -> &'static [PropertyDescriptor<Self>];

    fn property_index(name: &str) -> Option<usize> {
        Self::descriptors()
            .iter()
            .position(|descriptor| descriptor.name == name)
    }

    fn apply_property(&mut self, index: usize, value: &Value) -> Result<(), PropertyError> {
        match Self::descriptors().get(index) {
            Some(descriptor) => (descriptor.set)(self, value),
            None => Err(PropertyError::new("declared property", "unknown slot")),
        }
    }
}

/// Names interpreted by the reconciler rather than written to the target.
pub(crate) fn is_reserved(name: &str) -> bool {
    matches!(name, "key" | "id")
}
