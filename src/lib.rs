//! # Unified Device-Control Core
//!
//! This crate is a device-control core for scientific instruments that
//! presents two device populations behind one label-addressed surface:
//! devices owned by an external native hardware-abstraction engine, and
//! software devices implemented in-process against this crate's contracts.
//! Outer layers (acquisition engines, GUIs, RPC bridges) talk to a single
//! [`core::UniCore`] facade and never learn which population a label
//! belongs to.
//!
//! ## Crate Structure
//!
//! - **`core`**: The [`core::UniCore`] facade — device lifecycle, property
//!   access, state and camera operations, the system state cache.
//! - **`groups`**: Config application and the merge engine that unifies
//!   software- and native-defined config groups (further `impl UniCore`
//!   blocks).
//! - **`device`**: The device contracts — base [`device::Device`],
//!   discrete-state [`device::state::StateDevice`], and
//!   [`device::camera::CameraDevice`] — plus demo implementations used in
//!   tests and examples.
//! - **`property`**: Per-device property registries: typed descriptors with
//!   getter/setter closures, wire-string coercion, allowed values, limits,
//!   and hardware-sequencing hooks.
//! - **`directory`**: The label → device directory that routes every
//!   operation to the right population and owns software-device lifecycle.
//! - **`store`**: The in-process configuration store (groups, configs,
//!   settings).
//! - **`native`**: The [`native::NativeEngine`] trait the external engine
//!   implements, and the [`native::NullNativeEngine`] used when no native
//!   hardware is attached.
//! - **`events`**: Fire-and-forget core events over a broadcast channel.
//! - **`error`**: The [`error::CoreError`] taxonomy; every variant names
//!   the offending entity.

pub mod core;
pub mod device;
pub mod directory;
pub mod error;
pub mod events;
pub mod groups;
pub mod native;
pub mod property;
pub mod store;

pub use crate::core::UniCore;
pub use crate::device::camera::{
    AcquisitionSupport, BufferProvider, CameraDevice, FrameMetadata, PixelBuffer, PixelType, Roi,
};
pub use crate::device::state::StateDevice;
pub use crate::device::{Device, DeviceKind};
pub use crate::directory::{DeviceDirectory, LifecycleState, SoftwareDevice};
pub use crate::error::{CoreError, CoreResult};
pub use crate::events::{CoreEvent, EventHub};
pub use crate::groups::GroupState;
pub use crate::native::{NativeEngine, NativeSetting, NullNativeEngine};
pub use crate::property::{PropertyInfo, PropertyRegistry, PropertyType, PropertyValue};
pub use crate::store::{Config, ConfigGroup, ConfigStore, Setting};
