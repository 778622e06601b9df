//! Router configuration
//!
//! Everything that the engine would normally expose as component properties or
//! project settings lives in one TOML file:
//!
//! ```toml
//! [router]
//! enable_tag_gates = true
//! [[router.gate_rules]]
//! gate_tag = "State.Stunned"
//! require_present = false
//!
//! [buffer]
//! max_buffered_events_per_channel = 8
//!
//! [registry]
//! use_async_loads = true
//! asset_root = "assets/layers"
//! [[registry.layers]]
//! tag = "Input.Layer.Combat"
//! asset = "combat.toml"
//! ```

use crate::binding::gate::InputGateRule;
use crate::binding::GameplayTag;
use crate::buffer::{self, InputBuffer};
use crate::error::ConfigError;
use crate::layer::loader::LayerAssetRef;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const CONFIG_DIR: &str = "sots-input";
const CONFIG_FILE: &str = "router.toml";

const DEFAULT_AUTO_REFRESH_INTERVAL_SECONDS: f32 = 0.5;
const DEFAULT_DEBUG_LOG_INTERVAL_SECONDS: f32 = 2.0;

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct InputRouterConfig {
    pub router: RouterSettings,
    pub buffer: BufferSettings,
    pub registry: RegistrySettings,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct RouterSettings {
    pub enable_tag_gates: bool,
    pub gate_rules: Vec<InputGateRule>,
    /// Periodic state line from `tick`
    pub debug_log_router_state: bool,
    /// Binding list after every rebuild
    pub debug_log_bindings: bool,
    pub debug_log_interval_seconds: f32,
    pub enable_auto_refresh: bool,
    pub auto_refresh_interval_seconds: f32,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            enable_tag_gates: true,
            gate_rules: Vec::new(),
            debug_log_router_state: false,
            debug_log_bindings: false,
            debug_log_interval_seconds: DEFAULT_DEBUG_LOG_INTERVAL_SECONDS,
            enable_auto_refresh: false,
            auto_refresh_interval_seconds: DEFAULT_AUTO_REFRESH_INTERVAL_SECONDS,
        }
    }
}

impl RouterSettings {
    /// Out-of-range values (infinite, too large) fall back to the default
    pub fn auto_refresh_interval(&self) -> Duration {
        seconds_or(self.auto_refresh_interval_seconds, DEFAULT_AUTO_REFRESH_INTERVAL_SECONDS)
    }

    pub fn debug_log_interval(&self) -> Duration {
        seconds_or(self.debug_log_interval_seconds, DEFAULT_DEBUG_LOG_INTERVAL_SECONDS)
    }
}

/// Negative and NaN clamp to zero; anything a `Duration` cannot hold yields `fallback`
pub(crate) fn seconds_or(seconds: f32, fallback: f32) -> Duration {
    Duration::try_from_secs_f32(seconds.max(0.0)).unwrap_or_else(|_| {
        warn!("Interval of {} seconds out of range, using {}", seconds, fallback);
        Duration::try_from_secs_f32(fallback).unwrap_or_default()
    })
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BufferSettings {
    /// 0 disables the cap
    pub max_buffered_events_per_channel: usize,
    /// Channels that accept intent windows
    pub window_channels: Vec<GameplayTag>,
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self {
            max_buffered_events_per_channel: buffer::DEFAULT_MAX_BUFFERED_EVENTS_PER_CHANNEL,
            window_channels: vec![
                GameplayTag::new(buffer::EXECUTION_CHANNEL),
                GameplayTag::new(buffer::VANISH_CHANNEL),
            ],
        }
    }
}

impl BufferSettings {
    pub fn build(&self) -> InputBuffer {
        InputBuffer::new(self.max_buffered_events_per_channel)
            .with_window_channels(self.window_channels.iter().cloned())
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct RegistrySettings {
    pub use_async_loads: bool,
    pub log_registry_loads: bool,
    /// Base directory for relative asset references
    pub asset_root: PathBuf,
    pub layers: Vec<RegistryEntry>,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            use_async_loads: false,
            log_registry_loads: true,
            asset_root: PathBuf::from("assets/layers"),
            layers: Vec::new(),
        }
    }
}

/// Tag to asset mapping of the registry
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct RegistryEntry {
    pub tag: GameplayTag,
    pub asset: LayerAssetRef,
}

impl InputRouterConfig {
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let mut path = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        // Relative asset roots follow the config file
        if config.registry.asset_root.is_relative() {
            if let Some(parent) = path.parent() {
                config.registry.asset_root = parent.join(&config.registry.asset_root);
            }
        }

        info!(
            "Loaded router config from {:?} ({} registry entries)",
            path,
            config.registry.layers.len()
        );
        Ok(config)
    }

    /// Missing file means defaults; a broken file is still an error
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = InputRouterConfig::load_or_default(&dir.path().join("router.toml")).unwrap();
        assert_eq!(config, InputRouterConfig::default());
        assert_eq!(config.buffer.max_buffered_events_per_channel, 8);
    }

    #[test]
    fn router_defaults() {
        let settings = RouterSettings::default();
        assert!(settings.enable_tag_gates);
        assert!(settings.gate_rules.is_empty());
        assert!(!settings.enable_auto_refresh);
        assert!(!settings.debug_log_router_state);
        assert!(!settings.debug_log_bindings);
        assert_eq!(settings.auto_refresh_interval(), Duration::from_millis(500));
        assert_eq!(settings.debug_log_interval(), Duration::from_secs(2));
    }

    #[test]
    fn rules_without_enable_flag_are_enforced() {
        let config: InputRouterConfig = toml::from_str(
            r#"
            [[router.gate_rules]]
            gate_tag = "State.Dead"
            require_present = false
            "#,
        )
        .unwrap();
        assert!(config.router.enable_tag_gates);

        let dead = |tag: &GameplayTag| tag.as_str() == "State.Dead";
        assert!(!crate::binding::gate::evaluate_gates(
            config.router.enable_tag_gates,
            &config.router.gate_rules,
            Some(&dead as &dyn crate::binding::gate::TagPredicate),
            false,
        ));
    }

    #[test]
    fn out_of_range_intervals_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("router.toml");
        fs::write(
            &path,
            r#"
            [router]
            enable_auto_refresh = true
            auto_refresh_interval_seconds = inf
            debug_log_router_state = true
            debug_log_interval_seconds = 1e20
            "#,
        )
        .unwrap();

        let config = InputRouterConfig::load(&path).unwrap();
        assert!(config.router.auto_refresh_interval_seconds.is_infinite());
        assert_eq!(config.router.auto_refresh_interval(), Duration::from_millis(500));
        assert_eq!(config.router.debug_log_interval(), Duration::from_secs(2));

        let negative = RouterSettings {
            auto_refresh_interval_seconds: -3.0,
            ..Default::default()
        };
        assert_eq!(negative.auto_refresh_interval(), Duration::ZERO);

        let mut router = crate::router::InputRouter::from_config(&config);
        router.tick(Duration::from_millis(16));
        router.tick(Duration::MAX);
        router.tick(Duration::MAX);
    }

    #[test]
    fn partial_file_fills_defaults_and_resolves_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("router.toml");
        fs::write(
            &path,
            r#"
            [router]
            enable_tag_gates = true
            [[router.gate_rules]]
            gate_tag = "State.Stunned"
            require_present = false
            affects_buffering = false

            [registry]
            asset_root = "layers"
            [[registry.layers]]
            tag = "Input.Layer.Combat"
            asset = "combat.toml"
            "#,
        )
        .unwrap();

        let config = InputRouterConfig::load(&path).unwrap();
        assert!(config.router.enable_tag_gates);
        assert_eq!(config.router.gate_rules.len(), 1);
        let rule = &config.router.gate_rules[0];
        assert!(!rule.require_present);
        assert!(!rule.affects_buffering);
        assert!(rule.affects_live_input);
        assert_eq!(config.registry.asset_root, dir.path().join("layers"));
        assert_eq!(config.registry.layers[0].asset, LayerAssetRef::new("combat.toml"));
        assert_eq!(config.buffer, BufferSettings::default());
    }

    #[test]
    fn broken_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("router.toml");
        fs::write(&path, "[router\n").unwrap();
        assert!(matches!(
            InputRouterConfig::load_or_default(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn default_config_serializes() {
        let text = InputRouterConfig::default().to_toml().unwrap();
        let back: InputRouterConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, InputRouterConfig::default());
    }

    #[test]
    fn shipped_config_loads_its_layers() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("assets/router.toml");
        let config = InputRouterConfig::load(&path).unwrap();
        assert!(config.registry.use_async_loads);

        let sync = RegistrySettings {
            use_async_loads: false,
            ..config.registry.clone()
        };
        let mut registry = crate::layer::InputLayerRegistry::from_settings(&sync);
        for entry in &config.registry.layers {
            let asset = registry.try_get_layer_asset(&entry.tag).unwrap();
            assert_eq!(asset.layer_tag, entry.tag);
        }
    }
}
