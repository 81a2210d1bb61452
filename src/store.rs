//! Software-side configuration store.
//!
//! Pure data and CRUD over config groups. A group is a named collection of
//! configs; a config is a named, ordered sequence of
//! (device, property, value) settings. Definition order is meaningful for
//! listing and for first-match tie-breaks in current-config detection, so
//! the store is `Vec`-backed rather than map-backed.
//!
//! The store knows nothing about devices or the native engine: it holds
//! whatever the caller defines, values as wire strings, and leaves
//! application and merging to the core. All mutations are immediate and
//! visible to subsequent reads; there are no transactions, and a failure
//! partway through a multi-call config definition leaves the prior settings
//! intact.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// One (device, property, value) assignment inside a config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setting {
    /// Directory label of the target device.
    pub device: String,
    /// Property name on that device.
    pub property: String,
    /// Target value as a wire string; coerced at application time.
    pub value: String,
}

impl Setting {
    /// Convenience constructor.
    pub fn new(
        device: impl Into<String>,
        property: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            device: device.into(),
            property: property.into(),
            value: value.into(),
        }
    }

    /// The (device, property) pair this setting targets.
    pub fn target(&self) -> (&str, &str) {
        (&self.device, &self.property)
    }
}

/// A named, ordered sequence of settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Config name, unique within its group.
    pub name: String,
    settings: Vec<Setting>,
}

impl Config {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: Vec::new(),
        }
    }

    /// Settings in definition order.
    pub fn settings(&self) -> &[Setting] {
        &self.settings
    }

    /// Add a setting. Re-defining an existing (device, property) pair
    /// replaces its value in place — last definition wins, position
    /// preserved, no duplicate triplets.
    pub fn push(&mut self, setting: Setting) {
        if let Some(existing) = self
            .settings
            .iter_mut()
            .find(|s| s.target() == setting.target())
        {
            existing.value = setting.value;
        } else {
            self.settings.push(setting);
        }
    }
}

/// A named collection of configs (mutually exclusive instrument settings,
/// e.g. fluorescence channels).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigGroup {
    /// Group name.
    pub name: String,
    configs: Vec<Config>,
}

impl ConfigGroup {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            configs: Vec::new(),
        }
    }

    /// Configs in definition order.
    pub fn configs(&self) -> &[Config] {
        &self.configs
    }

    fn find(&self, config: &str) -> Option<&Config> {
        self.configs.iter().find(|c| c.name == config)
    }

    fn find_mut(&mut self, config: &str) -> Option<&mut Config> {
        self.configs.iter_mut().find(|c| c.name == config)
    }
}

/// Insertion-ordered store of software-defined config groups.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigStore {
    groups: Vec<ConfigGroup>,
}

impl ConfigStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn find(&self, group: &str) -> CoreResult<&ConfigGroup> {
        self.groups
            .iter()
            .find(|g| g.name == group)
            .ok_or_else(|| CoreError::GroupNotFound {
                group: group.to_string(),
            })
    }

    fn find_mut(&mut self, group: &str) -> CoreResult<&mut ConfigGroup> {
        self.groups
            .iter_mut()
            .find(|g| g.name == group)
            .ok_or_else(|| CoreError::GroupNotFound {
                group: group.to_string(),
            })
    }

    /// Define an empty group. Defining an existing group is a no-op (the
    /// original core treats it as idempotent).
    pub fn define_group(&mut self, group: &str) {
        if !self.group_defined(group) {
            self.groups.push(ConfigGroup::new(group));
        }
    }

    /// Define a config, or extend an existing one with a setting.
    ///
    /// With `setting = None` this creates a named but empty config. The
    /// owning group is created if absent. Within one config, the last
    /// definition for a (device, property) pair wins.
    pub fn define_config(&mut self, group: &str, config: &str, setting: Option<Setting>) {
        self.define_group(group);
        let grp = match self.find_mut(group) {
            Ok(grp) => grp,
            // Unreachable: the group was just defined.
            Err(_) => return,
        };
        if grp.find(config).is_none() {
            grp.configs.push(Config::new(config));
        }
        if let Some(setting) = setting {
            if let Some(cfg) = grp.find_mut(config) {
                cfg.push(setting);
            }
        }
    }

    /// Rename a group, preserving its configs and its position.
    pub fn rename_group(&mut self, group: &str, new_name: &str) -> CoreResult<()> {
        let grp = self.find_mut(group)?;
        grp.name = new_name.to_string();
        Ok(())
    }

    /// Delete a group and every config under it.
    pub fn delete_group(&mut self, group: &str) -> CoreResult<()> {
        let before = self.groups.len();
        self.groups.retain(|g| g.name != group);
        if self.groups.len() == before {
            return Err(CoreError::GroupNotFound {
                group: group.to_string(),
            });
        }
        Ok(())
    }

    /// Rename a config within its group.
    pub fn rename_config(&mut self, group: &str, config: &str, new_name: &str) -> CoreResult<()> {
        let grp = self.find_mut(group)?;
        let cfg = grp.find_mut(config).ok_or_else(|| CoreError::ConfigNotFound {
            group: group.to_string(),
            config: config.to_string(),
        })?;
        cfg.name = new_name.to_string();
        Ok(())
    }

    /// Delete a config from its group.
    pub fn delete_config(&mut self, group: &str, config: &str) -> CoreResult<()> {
        let grp = self.find_mut(group)?;
        let before = grp.configs.len();
        grp.configs.retain(|c| c.name != config);
        if grp.configs.len() == before {
            return Err(CoreError::ConfigNotFound {
                group: group.to_string(),
                config: config.to_string(),
            });
        }
        Ok(())
    }

    /// Group names in definition order.
    pub fn groups(&self) -> Vec<String> {
        self.groups.iter().map(|g| g.name.clone()).collect()
    }

    /// Config names of a group, in definition order.
    pub fn configs(&self, group: &str) -> CoreResult<Vec<String>> {
        Ok(self
            .find(group)?
            .configs
            .iter()
            .map(|c| c.name.clone())
            .collect())
    }

    /// The settings of one config, in definition order.
    pub fn config_data(&self, group: &str, config: &str) -> CoreResult<&[Setting]> {
        let grp = self.find(group)?;
        grp.find(config)
            .map(Config::settings)
            .ok_or_else(|| CoreError::ConfigNotFound {
                group: group.to_string(),
                config: config.to_string(),
            })
    }

    /// Whether the group exists.
    pub fn group_defined(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g.name == group)
    }

    /// Whether the (group, config) pair exists.
    pub fn config_defined(&self, group: &str, config: &str) -> bool {
        self.groups
            .iter()
            .any(|g| g.name == group && g.find(config).is_some())
    }

    /// The full group record, when defined.
    pub fn group(&self, group: &str) -> Option<&ConfigGroup> {
        self.groups.iter().find(|g| g.name == group)
    }
}
