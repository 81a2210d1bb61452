//! Config application and merge engine.
//!
//! Config groups can be defined on either side of the native boundary: in
//! the in-process [`ConfigStore`](crate::store::ConfigStore), in the native
//! engine, or both under the same name. Every operation here presents the
//! two populations as one namespace:
//!
//! - listings are the union, software definitions first;
//! - `set_config` applies the native side once through the engine's own
//!   path and then only the software settings whose target the native data
//!   did not already cover, so each (device, property) pair is written
//!   exactly once;
//! - group-state queries merge the engine's answer with live reads of every
//!   pair the software configs reference, except the strictly-native
//!   variant, which never falls back;
//! - current-config detection walks candidates in definition order
//!   (software first) and compares stored wire strings to live values
//!   type-aware, so `"100"` matches an integer 100 and a float 100.0.
//!
//! Application is not atomic: a failing setting aborts the apply with an
//! error naming the offender, and settings applied before it stay applied.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::core::UniCore;
use crate::error::{CoreError, CoreResult};
use crate::events::CoreEvent;
use crate::property::PropertyValue;
use crate::store::Setting;

/// Group state as a `device → {property → value}` mapping of wire strings.
pub type GroupState = BTreeMap<String, BTreeMap<String, String>>;

fn state_from_settings(settings: impl IntoIterator<Item = Setting>) -> GroupState {
    let mut state = GroupState::new();
    for setting in settings {
        state
            .entry(setting.device)
            .or_default()
            .insert(setting.property, setting.value);
    }
    state
}

impl UniCore {
    fn native_groups(&self) -> CoreResult<Vec<String>> {
        self.engine
            .list_groups()
            .map_err(|e| CoreError::native("list_groups", e))
    }

    fn native_group_defined(&self, group: &str) -> CoreResult<bool> {
        Ok(self.native_groups()?.iter().any(|g| g == group))
    }

    fn native_configs(&self, group: &str) -> CoreResult<Vec<String>> {
        self.engine
            .list_configs(group)
            .map_err(|e| CoreError::native(format!("list_configs '{group}'"), e))
    }

    fn native_config_data(&self, group: &str, config: &str) -> CoreResult<Vec<Setting>> {
        let data = self
            .engine
            .config_data(group, config)
            .map_err(|e| CoreError::native(format!("config_data '{group}/{config}'"), e))?;
        Ok(data
            .into_iter()
            .map(|(d, p, v)| Setting::new(d, p, v))
            .collect())
    }

    fn require_group(&self, group: &str) -> CoreResult<()> {
        if self.store.group_defined(group) || self.native_group_defined(group)? {
            Ok(())
        } else {
            Err(CoreError::GroupNotFound {
                group: group.to_string(),
            })
        }
    }

    // -------------------------------------------------------------------------
    // Definition passthroughs
    // -------------------------------------------------------------------------

    /// Define a software config group (idempotent).
    pub fn define_config_group(&mut self, group: &str) {
        self.store.define_group(group);
        self.events.emit(CoreEvent::ConfigGroupDefined {
            group: group.to_string(),
        });
    }

    /// Define or extend a software config. The group is created if absent;
    /// passing no setting creates an empty config.
    pub fn define_config(&mut self, group: &str, config: &str, setting: Option<Setting>) {
        let new_group = !self.store.group_defined(group);
        self.store.define_config(group, config, setting);
        if new_group {
            self.events.emit(CoreEvent::ConfigGroupDefined {
                group: group.to_string(),
            });
        }
        self.events.emit(CoreEvent::ConfigDefined {
            group: group.to_string(),
            config: config.to_string(),
        });
    }

    /// Rename a software config group.
    pub fn rename_config_group(&mut self, group: &str, new_name: &str) -> CoreResult<()> {
        self.store.rename_group(group, new_name)?;
        self.events.emit(CoreEvent::ConfigGroupDeleted {
            group: group.to_string(),
        });
        self.events.emit(CoreEvent::ConfigGroupDefined {
            group: new_name.to_string(),
        });
        Ok(())
    }

    /// Delete a software config group and everything in it.
    pub fn delete_config_group(&mut self, group: &str) -> CoreResult<()> {
        self.store.delete_group(group)?;
        self.events.emit(CoreEvent::ConfigGroupDeleted {
            group: group.to_string(),
        });
        Ok(())
    }

    /// Rename a software config within its group.
    pub fn rename_config(&mut self, group: &str, config: &str, new_name: &str) -> CoreResult<()> {
        self.store.rename_config(group, config, new_name)?;
        self.events.emit(CoreEvent::ConfigDeleted {
            group: group.to_string(),
            config: config.to_string(),
        });
        self.events.emit(CoreEvent::ConfigDefined {
            group: group.to_string(),
            config: new_name.to_string(),
        });
        Ok(())
    }

    /// Delete a software config.
    pub fn delete_config(&mut self, group: &str, config: &str) -> CoreResult<()> {
        self.store.delete_config(group, config)?;
        self.events.emit(CoreEvent::ConfigDeleted {
            group: group.to_string(),
            config: config.to_string(),
        });
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Listings
    // -------------------------------------------------------------------------

    /// Every known config group: software groups in definition order, then
    /// native groups not shadowed by a software name.
    pub fn get_available_config_groups(&self) -> CoreResult<Vec<String>> {
        let mut groups = self.store.groups();
        for native in self.native_groups()? {
            if !groups.contains(&native) {
                groups.push(native);
            }
        }
        Ok(groups)
    }

    /// Every config in a group: software configs in definition order, then
    /// native-only configs.
    pub fn get_available_configs(&self, group: &str) -> CoreResult<Vec<String>> {
        self.require_group(group)?;
        let mut configs = if self.store.group_defined(group) {
            self.store.configs(group)?
        } else {
            Vec::new()
        };
        if self.native_group_defined(group)? {
            for native in self.native_configs(group)? {
                if !configs.contains(&native) {
                    configs.push(native);
                }
            }
        }
        Ok(configs)
    }

    /// The stored settings of a config, software definition first when both
    /// sides define the name.
    pub fn get_config_data(&self, group: &str, config: &str) -> CoreResult<Vec<Setting>> {
        self.require_group(group)?;
        if self.store.config_defined(group, config) {
            return Ok(self.store.config_data(group, config)?.to_vec());
        }
        if self.native_group_defined(group)?
            && self.native_configs(group)?.iter().any(|c| c == config)
        {
            return self.native_config_data(group, config);
        }
        Err(CoreError::ConfigNotFound {
            group: group.to_string(),
            config: config.to_string(),
        })
    }

    /// Whether either side defines the group.
    pub fn is_group_defined(&self, group: &str) -> CoreResult<bool> {
        Ok(self.store.group_defined(group) || self.native_group_defined(group)?)
    }

    /// Whether either side defines the config.
    pub fn is_config_defined(&self, group: &str, config: &str) -> CoreResult<bool> {
        if self.store.config_defined(group, config) {
            return Ok(true);
        }
        if self.native_group_defined(group)? {
            return Ok(self.native_configs(group)?.iter().any(|c| c == config));
        }
        Ok(false)
    }

    // -------------------------------------------------------------------------
    // Application
    // -------------------------------------------------------------------------

    /// Apply a config: the native definition once through the engine, then
    /// every software setting whose target the native data did not already
    /// cover, through the directory's property-set path (so state/label
    /// sync happens automatically).
    ///
    /// Not atomic: a failing setting aborts with an error naming the
    /// offender, leaving earlier settings applied.
    pub fn set_config(&mut self, group: &str, config: &str) -> CoreResult<()> {
        self.require_group(group)?;
        let software = if self.store.config_defined(group, config) {
            self.store.config_data(group, config)?.to_vec()
        } else {
            Vec::new()
        };
        let native_defined = self.native_group_defined(group)?
            && self.native_configs(group)?.iter().any(|c| c == config);
        if software.is_empty() && !native_defined && !self.store.config_defined(group, config) {
            return Err(CoreError::ConfigNotFound {
                group: group.to_string(),
                config: config.to_string(),
            });
        }

        let mut covered: Vec<(String, String)> = Vec::new();
        if native_defined {
            self.engine
                .apply_config(group, config)
                .map_err(|e| CoreError::native(format!("apply_config '{group}/{config}'"), e))?;
            covered = self
                .native_config_data(group, config)?
                .into_iter()
                .map(|s| (s.device, s.property))
                .collect();
            debug!(group, config, targets = covered.len(), "native side applied");
        }

        for setting in software {
            if covered
                .iter()
                .any(|(d, p)| d == &setting.device && p == &setting.property)
            {
                continue;
            }
            self.set_property(
                &setting.device,
                &setting.property,
                PropertyValue::Str(setting.value.clone()),
            )?;
        }

        info!(group, config, "config applied");
        self.events.emit(CoreEvent::ConfigApplied {
            group: group.to_string(),
            config: config.to_string(),
        });
        Ok(())
    }

    /// Block until every device a config touches reports not-busy.
    pub fn wait_for_config(&self, group: &str, config: &str) -> CoreResult<()> {
        let mut waited: Vec<String> = Vec::new();
        for setting in self.get_config_data(group, config)? {
            if !waited.contains(&setting.device) {
                self.wait_for_device(&setting.device)?;
                waited.push(setting.device);
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // State queries
    // -------------------------------------------------------------------------

    /// Strictly-native group state, answered purely by the engine. Fails
    /// with [`CoreError::NativeOnly`] when the engine has no such group,
    /// even if a software group of the same name exists.
    pub fn get_config_group_state_native(&self, group: &str) -> CoreResult<GroupState> {
        if !self.native_group_defined(group)? {
            return Err(CoreError::NativeOnly {
                group: group.to_string(),
            });
        }
        let triples = self
            .engine
            .group_state(group)
            .map_err(|e| CoreError::native(format!("group_state '{group}'"), e))?;
        Ok(state_from_settings(
            triples.into_iter().map(|(d, p, v)| Setting::new(d, p, v)),
        ))
    }

    /// Live group state: the native engine's answer (when it knows the
    /// group) merged with live reads of every pair the software configs
    /// reference. Software reads win for shared pairs.
    pub fn get_config_group_state(&self, group: &str) -> CoreResult<GroupState> {
        self.group_state_via(group, |core, device, property| {
            core.get_property(device, property)
        })
    }

    /// As [`get_config_group_state`](Self::get_config_group_state), but
    /// answered from caches instead of hardware.
    pub fn get_config_group_state_from_cache(&self, group: &str) -> CoreResult<GroupState> {
        self.group_state_via(group, |core, device, property| {
            core.get_property_from_cache(device, property)
        })
    }

    fn group_state_via(
        &self,
        group: &str,
        read: impl Fn(&Self, &str, &str) -> CoreResult<PropertyValue>,
    ) -> CoreResult<GroupState> {
        self.require_group(group)?;
        let mut state = GroupState::new();
        if self.native_group_defined(group)? {
            let triples = self
                .engine
                .group_state(group)
                .map_err(|e| CoreError::native(format!("group_state '{group}'"), e))?;
            for (device, property, _) in triples {
                let value = read(self, &device, &property)?;
                state
                    .entry(device)
                    .or_default()
                    .insert(property, value.to_string());
            }
        }
        for (device, property) in self.software_group_pairs(group)? {
            let value = read(self, &device, &property)?;
            state
                .entry(device)
                .or_default()
                .insert(property, value.to_string());
        }
        Ok(state)
    }

    /// Every (device, property) pair referenced by any software config in
    /// the group, first-reference order.
    fn software_group_pairs(&self, group: &str) -> CoreResult<Vec<(String, String)>> {
        let mut pairs: Vec<(String, String)> = Vec::new();
        if let Some(group) = self.store.group(group) {
            for config in group.configs() {
                for setting in config.settings() {
                    let (device, property) = setting.target();
                    if !pairs
                        .iter()
                        .any(|(d, p)| d.as_str() == device && p.as_str() == property)
                    {
                        pairs.push((device.to_string(), property.to_string()));
                    }
                }
            }
        }
        Ok(pairs)
    }

    /// The stored (not live) settings of a config as a
    /// `device → {property → value}` mapping.
    pub fn get_config_state(&self, group: &str, config: &str) -> CoreResult<GroupState> {
        Ok(state_from_settings(self.get_config_data(group, config)?))
    }

    // -------------------------------------------------------------------------
    // Current-config detection
    // -------------------------------------------------------------------------

    /// The first config, in definition order (software definitions first),
    /// whose every stored setting matches the live value type-aware.
    /// `None` when no config fully matches.
    pub fn get_current_config(&self, group: &str) -> CoreResult<Option<String>> {
        self.current_config_via(group, |core, device, property| {
            core.get_property(device, property)
        })
    }

    /// As [`get_current_config`](Self::get_current_config), but matched
    /// against caches instead of hardware.
    pub fn get_current_config_from_cache(&self, group: &str) -> CoreResult<Option<String>> {
        self.current_config_via(group, |core, device, property| {
            core.get_property_from_cache(device, property)
        })
    }

    fn current_config_via(
        &self,
        group: &str,
        read: impl Fn(&Self, &str, &str) -> CoreResult<PropertyValue>,
    ) -> CoreResult<Option<String>> {
        self.require_group(group)?;
        for config in self.get_available_configs(group)? {
            if self.config_matches(group, &config, &read)? {
                return Ok(Some(config));
            }
        }
        Ok(None)
    }

    fn config_matches(
        &self,
        group: &str,
        config: &str,
        read: &impl Fn(&Self, &str, &str) -> CoreResult<PropertyValue>,
    ) -> CoreResult<bool> {
        for setting in self.get_config_data(group, config)? {
            // A setting addressing an unknown device or property makes the
            // config non-current rather than failing the whole detection.
            let live = match read(self, &setting.device, &setting.property) {
                Ok(value) => value,
                Err(_) => return Ok(false),
            };
            if !PropertyValue::Str(setting.value.clone()).matches(&live) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::demo::DemoStateDevice;
    use crate::directory::SoftwareDevice;

    fn core_with_channel_group() -> UniCore {
        let mut core = UniCore::new();
        core.load_device(
            "PyLED",
            SoftwareDevice::State(Box::new(DemoStateDevice::with_intensity(
                "PyLED",
                [(0, "UV"), (1, "BLUE"), (2, "GREEN")],
            ))),
        )
        .unwrap();
        core.initialize_all_devices().unwrap();
        core.define_config(
            "Channel",
            "DAPI",
            Some(Setting::new("PyLED", "Label", "UV")),
        );
        core.define_config(
            "Channel",
            "FITC",
            Some(Setting::new("PyLED", "Label", "BLUE")),
        );
        core
    }

    #[test]
    fn set_config_routes_through_property_path() {
        let mut core = core_with_channel_group();
        core.set_config("Channel", "FITC").unwrap();
        // Label sync: the State index followed the Label setting.
        assert_eq!(core.get_state("PyLED").unwrap(), 1);
        assert_eq!(core.get_state_label("PyLED").unwrap(), "BLUE");
    }

    #[test]
    fn current_config_matches_type_aware() {
        let mut core = core_with_channel_group();
        core.define_config(
            "Power",
            "Full",
            Some(Setting::new("PyLED", "Intensity", "100")),
        );
        core.set_property("PyLED", "Intensity", PropertyValue::Int(100))
            .unwrap();
        // Stored "100" matches the live integer 100.
        assert_eq!(
            core.get_current_config("Power").unwrap(),
            Some("Full".to_string())
        );
    }

    #[test]
    fn current_config_none_when_nothing_matches() {
        let mut core = core_with_channel_group();
        core.set_state("PyLED", 2).unwrap();
        assert_eq!(core.get_current_config("Channel").unwrap(), None);
    }

    #[test]
    fn unknown_group_is_an_error_not_none() {
        let core = core_with_channel_group();
        assert!(matches!(
            core.get_current_config("Ghost").unwrap_err(),
            CoreError::GroupNotFound { .. }
        ));
    }

    #[test]
    fn group_state_reads_live_values() {
        let mut core = core_with_channel_group();
        core.set_config("Channel", "DAPI").unwrap();
        let state = core.get_config_group_state("Channel").unwrap();
        assert_eq!(state["PyLED"]["Label"], "UV");
    }

    #[test]
    fn strictly_native_query_refuses_software_group() {
        let core = core_with_channel_group();
        assert!(matches!(
            core.get_config_group_state_native("Channel").unwrap_err(),
            CoreError::NativeOnly { .. }
        ));
    }

    #[test]
    fn apply_is_not_atomic() {
        let mut core = core_with_channel_group();
        core.define_config(
            "Preset",
            "Bad",
            Some(Setting::new("PyLED", "Intensity", "25")),
        );
        core.define_config(
            "Preset",
            "Bad",
            Some(Setting::new("PyLED", "Label", "INVALID")),
        );
        let err = core.set_config("Preset", "Bad").unwrap_err();
        assert!(matches!(err, CoreError::UndefinedLabel { .. }));
        // The intensity setting before the failure stayed applied.
        assert_eq!(
            core.get_property("PyLED", "Intensity").unwrap(),
            PropertyValue::Int(25)
        );
    }
}
