//! Typed device properties and the per-device property registry.
//!
//! Every device exposes its adjustable surface as named properties. A
//! property is declared once, at device construction, as a
//! [`PropertyDescriptor`]: declared type, getter, optional setter (absence
//! means read-only), optional allowed-value set, optional numeric limits, and
//! optional hooks for pre-programmed value sequences. The descriptors live in
//! an insertion-ordered [`PropertyRegistry`] that the device holds in an
//! `Arc` and delegates its property surface to.
//!
//! Two rules are enforced here and nowhere else:
//!
//! - Coercion from the wire representation (string) to the declared type
//!   happens exactly once, at the set boundary. Everything above this layer
//!   deals in [`PropertyValue`]s.
//! - A property registered without a setter can never be written; the
//!   attempt fails with [`CoreError::PropertyNotSettable`] rather than being
//!   silently ignored.
//!
//! Registration uses optional function references captured up front instead
//! of probing the device for methods at runtime: if a capability closure is
//! absent, the capability is unsupported.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Property types and values
// =============================================================================

/// Declared type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    /// 64-bit floating point.
    Float,
    /// 64-bit signed integer.
    Int,
    /// Free-form string.
    String,
    /// String drawn from a finite set of labels.
    Enum,
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PropertyType::Float => "float",
            PropertyType::Int => "int",
            PropertyType::String => "string",
            PropertyType::Enum => "enum",
        };
        write!(f, "{label}")
    }
}

/// Runtime value of a property.
///
/// Config settings arrive as strings; [`PropertyValue::parse`] is the single
/// coercion point to the declared type. Comparison for current-config
/// detection is type-aware via [`PropertyValue::matches`]: the string `"1"`,
/// the integer `1`, and the float `1.0` all compare equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// String value (also used for enum labels).
    Str(String),
}

impl PropertyValue {
    /// Coerce a wire string to the declared property type.
    pub fn parse(raw: &str, ty: PropertyType) -> CoreResult<Self> {
        match ty {
            PropertyType::Float => raw
                .trim()
                .parse::<f64>()
                .map(PropertyValue::Float)
                .map_err(|_| CoreError::TypeCoercion {
                    value: raw.to_string(),
                    target: ty.to_string(),
                }),
            PropertyType::Int => raw
                .trim()
                .parse::<i64>()
                .map(PropertyValue::Int)
                .map_err(|_| CoreError::TypeCoercion {
                    value: raw.to_string(),
                    target: ty.to_string(),
                }),
            PropertyType::String | PropertyType::Enum => Ok(PropertyValue::Str(raw.to_string())),
        }
    }

    /// Re-coerce an already-typed value to the declared type.
    ///
    /// Values produced by [`PropertyValue::parse`] are already correct; this
    /// exists so callers holding a typed value (e.g. an integer state index
    /// destined for a string property) go through the same single boundary.
    pub fn coerce(&self, ty: PropertyType) -> CoreResult<Self> {
        match (self, ty) {
            (PropertyValue::Float(v), PropertyType::Float) => Ok(PropertyValue::Float(*v)),
            (PropertyValue::Int(v), PropertyType::Int) => Ok(PropertyValue::Int(*v)),
            (PropertyValue::Int(v), PropertyType::Float) => Ok(PropertyValue::Float(*v as f64)),
            (PropertyValue::Str(_), PropertyType::String | PropertyType::Enum) => Ok(self.clone()),
            (PropertyValue::Str(s), _) => Self::parse(s, ty),
            (other, PropertyType::String | PropertyType::Enum) => {
                Ok(PropertyValue::Str(other.to_string()))
            }
            (other, _) => Err(CoreError::TypeCoercion {
                value: other.to_string(),
                target: ty.to_string(),
            }),
        }
    }

    /// Numeric view of the value, when it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(v) => Some(*v),
            PropertyValue::Int(v) => Some(*v as f64),
            PropertyValue::Str(s) => s.trim().parse::<f64>().ok(),
        }
    }

    /// Type-aware equality used for current-config matching.
    ///
    /// Numeric forms compare by value regardless of representation, so a
    /// stored `"100"` matches a live integer `100`. Non-numeric strings
    /// compare textually.
    pub fn matches(&self, other: &PropertyValue) -> bool {
        if let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) {
            return a == b;
        }
        self.to_string() == other.to_string()
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Int(v) => write!(f, "{v}"),
            PropertyValue::Float(v) => write!(f, "{v}"),
            PropertyValue::Str(s) => write!(f, "{s}"),
        }
    }
}

// =============================================================================
// Descriptors
// =============================================================================

/// Getter closure: reads the property off the device state.
pub type Getter<D> = Box<dyn Fn(&D) -> CoreResult<PropertyValue> + Send + Sync>;

/// Setter closure: writes an already-coerced value into the device state.
pub type Setter<D> = Box<dyn Fn(&mut D, PropertyValue) -> CoreResult<()> + Send + Sync>;

/// Hooks for properties that can run a pre-programmed value sequence
/// (hardware-timed property switching).
pub struct SequenceHooks<D> {
    /// Load a sequence of values into the device.
    pub load: Box<dyn Fn(&mut D, &[PropertyValue]) -> CoreResult<()> + Send + Sync>,
    /// Start stepping through the loaded sequence.
    pub start: Box<dyn Fn(&mut D) -> CoreResult<()> + Send + Sync>,
    /// Stop the running sequence.
    pub stop: Box<dyn Fn(&mut D) -> CoreResult<()> + Send + Sync>,
    /// Longest sequence the device accepts.
    pub max_length: usize,
}

/// A single registered property: declared type, access closures, and
/// validation metadata.
pub struct PropertyDescriptor<D> {
    name: String,
    ty: PropertyType,
    getter: Getter<D>,
    setter: Option<Setter<D>>,
    allowed: Option<Vec<String>>,
    limits: Option<(f64, f64)>,
    sequence: Option<SequenceHooks<D>>,
}

impl<D> PropertyDescriptor<D> {
    /// Create a read-only descriptor. Add capabilities with the `with_*`
    /// builder methods.
    pub fn new(
        name: impl Into<String>,
        ty: PropertyType,
        getter: impl Fn(&D) -> CoreResult<PropertyValue> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            ty,
            getter: Box::new(getter),
            setter: None,
            allowed: None,
            limits: None,
            sequence: None,
        }
    }

    /// Create a read-only descriptor from an already-boxed getter (used when
    /// the closure comes out of an optional-capability struct).
    pub fn new_boxed(name: impl Into<String>, ty: PropertyType, getter: Getter<D>) -> Self {
        Self {
            name: name.into(),
            ty,
            getter,
            setter: None,
            allowed: None,
            limits: None,
            sequence: None,
        }
    }

    /// Make the property writable with an already-boxed setter.
    pub fn with_setter_boxed(mut self, setter: Setter<D>) -> Self {
        self.setter = Some(setter);
        self
    }

    /// Make the property writable.
    pub fn with_setter(
        mut self,
        setter: impl Fn(&mut D, PropertyValue) -> CoreResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.setter = Some(Box::new(setter));
        self
    }

    /// Restrict the property to a finite value set (compared as strings).
    pub fn with_allowed_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Declare inclusive numeric limits.
    pub fn with_limits(mut self, min: f64, max: f64) -> Self {
        self.limits = Some((min, max));
        self
    }

    /// Attach value-sequence hooks.
    pub fn with_sequence_hooks(mut self, hooks: SequenceHooks<D>) -> Self {
        self.sequence = Some(hooks);
        self
    }

    /// Property name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Introspection record for one property, safe to ship across transports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyInfo {
    /// Property name.
    pub name: String,
    /// Declared type.
    pub ty: PropertyType,
    /// True when the property was registered without a setter.
    pub read_only: bool,
    /// Allowed-value set, when restricted.
    pub allowed_values: Option<Vec<String>>,
    /// Inclusive numeric limits, when declared.
    pub limits: Option<(f64, f64)>,
    /// True when sequence hooks are registered.
    pub sequenceable: bool,
}

// =============================================================================
// Registry
// =============================================================================

/// Insertion-ordered property registry for a device of state type `D`.
///
/// Built once at construction and then immutable, so devices hold it in an
/// `Arc` and can invoke setters on `&mut` device state without aliasing the
/// registry itself:
///
/// ```rust,ignore
/// fn set_property(&mut self, name: &str, value: PropertyValue) -> CoreResult<()> {
///     let props = Arc::clone(&self.props);
///     props.set(self, name, value)
/// }
/// ```
pub struct PropertyRegistry<D> {
    owner: String,
    entries: Vec<PropertyDescriptor<D>>,
}

impl<D> PropertyRegistry<D> {
    /// Create an empty registry. `owner` is the device name used in error
    /// messages.
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            entries: Vec::new(),
        }
    }

    /// Register a property. Re-registering a name replaces the previous
    /// descriptor in place (position preserved).
    pub fn register(&mut self, descriptor: PropertyDescriptor<D>) {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| e.name == descriptor.name)
        {
            *existing = descriptor;
        } else {
            self.entries.push(descriptor);
        }
    }

    /// Property names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    /// Wrap the registry for shared ownership by the device.
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn find(&self, name: &str) -> CoreResult<&PropertyDescriptor<D>> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| CoreError::PropertyNotFound {
                device: self.owner.clone(),
                property: name.to_string(),
            })
    }

    /// Introspection record for one property.
    pub fn info(&self, name: &str) -> CoreResult<PropertyInfo> {
        let entry = self.find(name)?;
        Ok(PropertyInfo {
            name: entry.name.clone(),
            ty: entry.ty,
            read_only: entry.setter.is_none(),
            allowed_values: entry.allowed.clone(),
            limits: entry.limits,
            sequenceable: entry.sequence.is_some(),
        })
    }

    /// Read a property off the device state.
    pub fn get(&self, dev: &D, name: &str) -> CoreResult<PropertyValue> {
        let entry = self.find(name)?;
        (entry.getter)(dev)
    }

    /// Write a property. This is the one place coercion and validation
    /// happen: the value is coerced to the declared type, checked against the
    /// allowed set and limits, then handed to the setter.
    pub fn set(&self, dev: &mut D, name: &str, value: PropertyValue) -> CoreResult<()> {
        let entry = self.find(name)?;
        let setter = entry
            .setter
            .as_ref()
            .ok_or_else(|| CoreError::PropertyNotSettable {
                device: self.owner.clone(),
                property: name.to_string(),
            })?;
        let coerced = value.coerce(entry.ty)?;
        if let Some(allowed) = &entry.allowed {
            let as_text = coerced.to_string();
            if !allowed.iter().any(|a| *a == as_text) {
                return Err(CoreError::ValueNotAllowed {
                    property: name.to_string(),
                    value: as_text,
                });
            }
        }
        if let Some((min, max)) = entry.limits {
            if let Some(v) = coerced.as_f64() {
                if v < min || v > max {
                    return Err(CoreError::LimitViolation {
                        property: name.to_string(),
                        value: v,
                        min,
                        max,
                    });
                }
            }
        }
        setter(dev, coerced)
    }

    /// Whether the property supports hardware value sequences.
    pub fn is_sequenceable(&self, name: &str) -> CoreResult<bool> {
        Ok(self.find(name)?.sequence.is_some())
    }

    fn hooks(&self, name: &str) -> CoreResult<&SequenceHooks<D>> {
        let entry = self.find(name)?;
        entry
            .sequence
            .as_ref()
            .ok_or_else(|| CoreError::NotSequenceable {
                device: self.owner.clone(),
                property: name.to_string(),
            })
    }

    /// Load a value sequence into the device, coercing each value once.
    pub fn load_sequence(
        &self,
        dev: &mut D,
        name: &str,
        values: &[PropertyValue],
    ) -> CoreResult<()> {
        let ty = self.find(name)?.ty;
        let coerced: Vec<PropertyValue> = values
            .iter()
            .map(|v| v.coerce(ty))
            .collect::<CoreResult<_>>()?;
        (self.hooks(name)?.load)(dev, &coerced)
    }

    /// Start the loaded sequence.
    pub fn start_sequence(&self, dev: &mut D, name: &str) -> CoreResult<()> {
        (self.hooks(name)?.start)(dev)
    }

    /// Stop the running sequence.
    pub fn stop_sequence(&self, dev: &mut D, name: &str) -> CoreResult<()> {
        (self.hooks(name)?.stop)(dev)
    }
}
