//! Shared test fixture: an in-memory native engine.

use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::{bail, Result};
use tracing_subscriber::EnvFilter;
use unicore::{NativeEngine, NativeSetting};

/// Install a test-writer subscriber so core logs show up under
/// `cargo test -- --nocapture`. Safe to call from every test.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new("unicore=debug"))
        .try_init();
}

/// In-memory stand-in for a native hardware-abstraction engine: a set of
/// devices with string properties and a set of config groups, all applied
/// through the engine's own path (no unicore property routing involved).
pub struct SimNativeEngine {
    inner: Mutex<SimState>,
}

#[derive(Default)]
struct SimState {
    // device -> property -> (current, cached)
    devices: BTreeMap<String, BTreeMap<String, (String, String)>>,
    // group -> [(config, settings)]
    groups: Vec<(String, Vec<(String, Vec<NativeSetting>)>)>,
}

impl SimNativeEngine {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SimState::default()),
        }
    }

    /// Add a native device with initial property values (cache primed to
    /// the same values).
    pub fn with_device<'a>(
        self,
        label: &str,
        properties: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        {
            let mut state = self.inner.lock().unwrap();
            let props = state.devices.entry(label.to_string()).or_default();
            for (name, value) in properties {
                props.insert(name.to_string(), (value.to_string(), value.to_string()));
            }
        }
        self
    }

    /// Add a native config definition.
    pub fn with_config<'a>(
        self,
        group: &str,
        config: &str,
        settings: impl IntoIterator<Item = (&'a str, &'a str, &'a str)>,
    ) -> Self {
        {
            let mut state = self.inner.lock().unwrap();
            let settings: Vec<NativeSetting> = settings
                .into_iter()
                .map(|(d, p, v)| (d.to_string(), p.to_string(), v.to_string()))
                .collect();
            match state.groups.iter_mut().find(|(g, _)| g == group) {
                Some((_, configs)) => configs.push((config.to_string(), settings)),
                None => state
                    .groups
                    .push((group.to_string(), vec![(config.to_string(), settings)])),
            }
        }
        self
    }

    /// Change a device property without refreshing the engine's cache, as
    /// hardware drifting behind the engine's back would.
    pub fn drift_property(&self, device: &str, property: &str, value: &str) {
        let mut state = self.inner.lock().unwrap();
        if let Some(slot) = state.devices.get_mut(device).and_then(|p| p.get_mut(property)) {
            slot.0 = value.to_string();
        }
    }
}

impl NativeEngine for SimNativeEngine {
    fn loaded_devices(&self) -> Result<Vec<String>> {
        Ok(self.inner.lock().unwrap().devices.keys().cloned().collect())
    }

    fn device_property_names(&self, device: &str) -> Result<Vec<String>> {
        let state = self.inner.lock().unwrap();
        match state.devices.get(device) {
            Some(props) => Ok(props.keys().cloned().collect()),
            None => bail!("no native device '{device}'"),
        }
    }

    fn list_groups(&self) -> Result<Vec<String>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .groups
            .iter()
            .map(|(g, _)| g.clone())
            .collect())
    }

    fn list_configs(&self, group: &str) -> Result<Vec<String>> {
        let state = self.inner.lock().unwrap();
        match state.groups.iter().find(|(g, _)| g == group) {
            Some((_, configs)) => Ok(configs.iter().map(|(c, _)| c.clone()).collect()),
            None => bail!("no native config group '{group}'"),
        }
    }

    fn config_data(&self, group: &str, config: &str) -> Result<Vec<NativeSetting>> {
        let state = self.inner.lock().unwrap();
        let configs = match state.groups.iter().find(|(g, _)| g == group) {
            Some((_, configs)) => configs,
            None => bail!("no native config group '{group}'"),
        };
        match configs.iter().find(|(c, _)| c == config) {
            Some((_, settings)) => Ok(settings.clone()),
            None => bail!("no native config '{config}' in group '{group}'"),
        }
    }

    fn apply_config(&self, group: &str, config: &str) -> Result<()> {
        let settings = self.config_data(group, config)?;
        let mut state = self.inner.lock().unwrap();
        for (device, property, value) in settings {
            let props = match state.devices.get_mut(&device) {
                Some(props) => props,
                None => bail!("no native device '{device}'"),
            };
            props.insert(property, (value.clone(), value));
        }
        Ok(())
    }

    fn get_property(&self, device: &str, property: &str) -> Result<String> {
        let state = self.inner.lock().unwrap();
        match state.devices.get(device).and_then(|p| p.get(property)) {
            Some((current, _)) => Ok(current.clone()),
            None => bail!("no native property '{device}/{property}'"),
        }
    }

    fn set_property(&self, device: &str, property: &str, value: &str) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        match state.devices.get_mut(device).and_then(|p| p.get_mut(property)) {
            Some(slot) => {
                *slot = (value.to_string(), value.to_string());
                Ok(())
            }
            None => bail!("no native property '{device}/{property}'"),
        }
    }

    fn get_cached_property(&self, device: &str, property: &str) -> Result<String> {
        let state = self.inner.lock().unwrap();
        match state.devices.get(device).and_then(|p| p.get(property)) {
            Some((_, cached)) => Ok(cached.clone()),
            None => bail!("no native property '{device}/{property}'"),
        }
    }

    fn group_state(&self, group: &str) -> Result<Vec<NativeSetting>> {
        let pairs: Vec<(String, String)> = {
            let state = self.inner.lock().unwrap();
            let configs = match state.groups.iter().find(|(g, _)| g == group) {
                Some((_, configs)) => configs,
                None => bail!("no native config group '{group}'"),
            };
            let mut pairs = Vec::new();
            for (_, settings) in configs {
                for (device, property, _) in settings {
                    let pair = (device.clone(), property.clone());
                    if !pairs.contains(&pair) {
                        pairs.push(pair);
                    }
                }
            }
            pairs
        };
        let mut out = Vec::new();
        for (device, property) in pairs {
            let value = self.get_property(&device, &property)?;
            out.push((device, property, value));
        }
        Ok(out)
    }

    fn is_busy(&self, _device: &str) -> Result<bool> {
        Ok(false)
    }
}
