//! Discrete-state device contract.
//!
//! A discrete-state device is one whose addressable positions form a finite
//! enumerated set: a filter wheel, an objective turret, an LED bank. Each
//! position carries both an integer index and a string label, and the two
//! must never disagree: at any observable instant
//! `label_of(current_index) == current_label`.
//!
//! The contract makes that invariant structural rather than behavioral. A
//! device stores only its current index ([`StateDevice::position`]); the
//! label is always derived through the [`StateMap`], so there is no second
//! stored value that could drift. Setting by label resolves through the map
//! and takes the index path; setting an index outside the map's domain fails
//! with [`CoreError::InvalidState`] naming the value, never clamping.
//!
//! The standard `"State"` and `"Label"` properties registered by
//! [`register_state_properties`] are two views over this same pair: writing
//! either one moves both, which is what makes config application on state
//! devices safe without any special-casing upstream.

use std::collections::BTreeMap;

use crate::error::{CoreError, CoreResult};
use crate::property::{PropertyDescriptor, PropertyRegistry, PropertyType, PropertyValue};

use super::Device;

/// Names of the standard discrete-state properties.
pub mod props {
    /// Integer position index.
    pub const STATE: &str = "State";
    /// Position label.
    pub const LABEL: &str = "Label";
}

// =============================================================================
// StateMap
// =============================================================================

/// Bidirectional index ↔ label mapping for a discrete-state device.
#[derive(Debug, Clone)]
pub struct StateMap {
    owner: String,
    labels: BTreeMap<usize, String>,
}

impl StateMap {
    /// Build a map from `(index, label)` pairs. `owner` is the device name
    /// used in error messages.
    pub fn new<I, S>(owner: impl Into<String>, entries: I) -> Self
    where
        I: IntoIterator<Item = (usize, S)>,
        S: Into<String>,
    {
        Self {
            owner: owner.into(),
            labels: entries
                .into_iter()
                .map(|(i, label)| (i, label.into()))
                .collect(),
        }
    }

    /// Number of defined positions.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// True when no positions are defined.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Label for a position index.
    pub fn label_of(&self, index: usize) -> CoreResult<&str> {
        self.labels
            .get(&index)
            .map(String::as_str)
            .ok_or_else(|| CoreError::InvalidState {
                device: self.owner.clone(),
                index: index as i64,
            })
    }

    /// Position index for a label.
    pub fn index_of(&self, label: &str) -> CoreResult<usize> {
        self.labels
            .iter()
            .find(|(_, l)| l.as_str() == label)
            .map(|(i, _)| *i)
            .ok_or_else(|| CoreError::UndefinedLabel {
                device: self.owner.clone(),
                label: label.to_string(),
            })
    }

    /// Whether the index is in the map's domain.
    pub fn contains(&self, index: usize) -> bool {
        self.labels.contains_key(&index)
    }

    /// Define or replace the label for a position.
    pub fn define_label(&mut self, index: usize, label: impl Into<String>) {
        self.labels.insert(index, label.into());
    }

    /// All `(index, label)` pairs in index order.
    pub fn entries(&self) -> impl Iterator<Item = (usize, &str)> {
        self.labels.iter().map(|(i, l)| (*i, l.as_str()))
    }
}

// =============================================================================
// StateDevice
// =============================================================================

/// Contract for devices whose identity is a finite enumerated state.
///
/// Implementers provide the map, the current index, and the actuation
/// ([`StateDevice::apply_position`], called only with validated indices).
/// The provided methods own validation and label resolution, which is what
/// keeps index and label in lockstep.
pub trait StateDevice: Device {
    /// The index ↔ label mapping.
    fn state_map(&self) -> &StateMap;

    /// Mutable access to the mapping (relabeling positions).
    fn state_map_mut(&mut self) -> &mut StateMap;

    /// Current position index.
    fn position(&self) -> usize;

    /// Move the hardware to an already-validated position index.
    fn apply_position(&mut self, index: usize) -> CoreResult<()>;

    /// Move to a position by index. An index outside the map's domain fails
    /// with [`CoreError::InvalidState`]; it is never clamped or ignored.
    fn set_position(&mut self, index: usize) -> CoreResult<()> {
        // Validate first so a failed move leaves the device untouched.
        self.state_map().label_of(index)?;
        self.apply_position(index)
    }

    /// Move to a position by label. Resolves through the map and takes the
    /// index path, so both sides of the pair update together.
    fn set_position_label(&mut self, label: &str) -> CoreResult<()> {
        let index = self.state_map().index_of(label)?;
        self.set_position(index)
    }

    /// Label of the current position, always derived from the index.
    fn position_label(&self) -> CoreResult<String> {
        self.state_map()
            .label_of(self.position())
            .map(str::to_string)
    }

    /// Number of addressable positions.
    fn num_positions(&self) -> usize {
        self.state_map().len()
    }
}

/// Register the standard `"State"` and `"Label"` properties into a state
/// device's registry.
///
/// Both are views over the same index/label pair: setting `"State"` updates
/// the label and setting `"Label"` updates the index, because both setters
/// route through [`StateDevice::set_position`]. They are never two
/// independent stored values.
pub fn register_state_properties<D: StateDevice + 'static>(registry: &mut PropertyRegistry<D>) {
    registry.register(
        PropertyDescriptor::new(props::STATE, PropertyType::Int, |d: &D| {
            Ok(PropertyValue::Int(d.position() as i64))
        })
        .with_setter(|d: &mut D, value| {
            let raw = match value {
                PropertyValue::Int(i) => i,
                other => {
                    return Err(CoreError::TypeCoercion {
                        value: other.to_string(),
                        target: PropertyType::Int.to_string(),
                    })
                }
            };
            let index = usize::try_from(raw).map_err(|_| CoreError::InvalidState {
                device: d.name().to_string(),
                index: raw,
            })?;
            if !d.state_map().contains(index) {
                return Err(CoreError::InvalidState {
                    device: d.name().to_string(),
                    index: raw,
                });
            }
            d.set_position(index)
        }),
    );
    registry.register(
        PropertyDescriptor::new(props::LABEL, PropertyType::Enum, |d: &D| {
            d.position_label().map(PropertyValue::Str)
        })
        .with_setter(|d: &mut D, value| d.set_position_label(&value.to_string())),
    );
}
