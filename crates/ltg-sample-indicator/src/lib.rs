//! Simple moving average indicator plugin.
//!
//! Build as a `cdylib` and install it in the host's plugin directory as
//! `plugin_sma_<flavour>.<ext>`, e.g. `plugins/plugin_sma_release.so`.

use std::cell::Cell;
use std::rc::Rc;

use ltg_plugin_api::prelude::*;
use tracing::{debug, info};

const MODULE_NAME: &str = "SMA";
const DEFAULT_PERIOD: usize = 14;

/// Moving average over a fixed window.
pub struct SmaIndicator {
    default_period: usize,
}

impl SmaIndicator {
    pub fn new(default_period: usize) -> Self {
        Self { default_period }
    }

    fn period(&self, params: &[PluginParam]) -> usize {
        params
            .iter()
            .find(|p| p.name() == "period")
            .and_then(PluginParam::as_number)
            .filter(|v| v.is_finite() && *v >= 1.0)
            .map(|v| v as usize)
            .unwrap_or(self.default_period)
    }
}

impl PluginModule for SmaIndicator {
    fn into_indicator(self: Rc<Self>) -> Option<IndicatorComputingPtr> {
        Some(self)
    }
}

impl IndicatorComputing for SmaIndicator {
    /// One value per complete window; `None` when the input is shorter than
    /// the period.
    fn compute(&self, input: &[f64], params: &[PluginParam]) -> Option<Serie> {
        let period = self.period(params);
        if period == 0 || input.len() < period {
            return None;
        }

        let mut sum: f64 = input[..period].iter().sum();
        let mut output = Vec::with_capacity(input.len() - period + 1);
        output.push(sum / period as f64);
        for (entering, leaving) in input[period..].iter().zip(input) {
            sum += entering - leaving;
            output.push(sum / period as f64);
        }
        Some(output)
    }
}

/// Application-wide settings of the plugin.
pub struct SmaSettings {
    period: Cell<usize>,
}

impl SmaSettings {
    fn period(&self) -> usize {
        self.period.get()
    }
}

impl Default for SmaSettings {
    fn default() -> Self {
        Self {
            period: Cell::new(DEFAULT_PERIOD),
        }
    }
}

impl PluginSettings for SmaSettings {
    fn category(&self) -> String {
        "plugins/indicators/sma".to_string()
    }

    fn export_settings(&self, offset: &str, kind: SettingsType) -> String {
        match kind {
            SettingsType::App => format!("{offset}<sma_period>{}</sma_period>\n", self.period()),
            _ => String::new(),
        }
    }

    fn import_setting(&self, name: &str, _parent_name: &str, value: &str, kind: SettingsType) {
        if kind == SettingsType::App && name == "sma_period" {
            match value.trim().parse::<usize>() {
                Ok(period) if period > 0 => self.period.set(period),
                _ => debug!(value, "Ignoring invalid SMA period"),
            }
        }
    }
}

pub struct SmaPlugin {
    settings: Rc<SmaSettings>,
}

impl SmaPlugin {
    pub fn new() -> Self {
        Self {
            settings: Rc::new(SmaSettings::default()),
        }
    }
}

impl Default for SmaPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginInterface for SmaPlugin {
    fn init(&mut self, host: &HostContext) -> bool {
        host.install_logger();
        info!(host_version = host.host_version(), "SMA plugin initialized");
        true
    }

    fn unit(&mut self) {
        debug!("SMA plugin released");
    }

    fn minimal_host_version(&self) -> u32 {
        HOST_VERSION
    }

    fn name(&self) -> String {
        "Sma".to_string()
    }

    fn author(&self) -> String {
        "LogToGraph Contributors".to_string()
    }

    fn version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    fn description(&self) -> String {
        "Simple moving average".to_string()
    }

    fn modules_infos(&self) -> Vec<PluginModuleInfos> {
        vec![
            PluginModuleInfos::new("Indicators/Averages", MODULE_NAME, PluginModuleType::Indicator)
                .with_color([0.2, 0.6, 1.0, 1.0])
                .with_entry("period", DEFAULT_PERIOD.to_string()),
        ]
    }

    fn create_module(
        &self,
        module_name: &str,
        _bridge: &dyn PluginBridge,
    ) -> Option<PluginModulePtr> {
        if module_name != MODULE_NAME {
            return None;
        }
        Some(Rc::new(SmaIndicator::new(self.settings.period())))
    }

    fn settings(&self) -> Vec<PluginSettingsConfig> {
        let settings: Rc<dyn PluginSettings> = self.settings.clone();
        vec![PluginSettingsConfig::new(Rc::downgrade(&settings))]
    }
}

declare_plugin!(SmaPlugin, SmaPlugin::new);

#[cfg(test)]
mod tests {
    use super::*;

    struct NoBridge;

    impl PluginBridge for NoBridge {
        fn indicator(&self, _name: &str) -> Option<IndicatorComputingPtr> {
            None
        }
    }

    fn sma(period: usize) -> SmaIndicator {
        SmaIndicator::new(period)
    }

    #[test]
    fn test_compute_windows() {
        let out = sma(3).compute(&[1.0, 2.0, 3.0, 4.0, 5.0], &[]).unwrap();
        assert_eq!(out, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_compute_short_input() {
        assert!(sma(3).compute(&[1.0, 2.0], &[]).is_none());
        assert!(sma(3).compute(&[], &[]).is_none());
    }

    #[test]
    fn test_period_parameter_overrides_default() {
        let params = [PluginParam::number("period", 2.0)];
        let out = sma(14).compute(&[2.0, 4.0, 6.0], &params).unwrap();
        assert_eq!(out, vec![3.0, 5.0]);

        // invalid values fall back to the default
        let params = [PluginParam::text("period", "two")];
        assert!(sma(14).compute(&[2.0, 4.0, 6.0], &params).is_none());
        let params = [PluginParam::number("period", 0.0)];
        assert_eq!(sma(1).compute(&[2.0], &params), Some(vec![2.0]));
    }

    #[test]
    fn test_module_lookup() {
        let plugin = SmaPlugin::new();
        let infos = plugin.modules_infos();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].module_type, PluginModuleType::Indicator);

        let module = plugin.create_module("SMA", &NoBridge).unwrap();
        let indicator = module.into_indicator().unwrap();
        let input: Vec<f64> = (1..=14).map(f64::from).collect();
        assert_eq!(indicator.compute(&input, &[]), Some(vec![7.5]));

        assert!(plugin.create_module("EMA", &NoBridge).is_none());
    }

    #[test]
    fn test_settings_round_trip() {
        let plugin = SmaPlugin::new();
        let settings = plugin.settings()[0].settings.upgrade().unwrap();
        assert_eq!(settings.category(), "plugins/indicators/sma");

        settings.import_setting("sma_period", "", "20", SettingsType::App);
        assert_eq!(
            settings.export_settings("  ", SettingsType::App),
            "  <sma_period>20</sma_period>\n"
        );
        assert_eq!(settings.export_settings("", SettingsType::Project), "");

        settings.import_setting("sma_period", "", "-1", SettingsType::App);
        assert_eq!(plugin.settings.period(), 20);

        // modules created afterwards pick up the new period
        let module = plugin.create_module("SMA", &NoBridge).unwrap();
        let input: Vec<f64> = (0..20).map(f64::from).collect();
        assert_eq!(module.into_indicator().unwrap().compute(&input, &[]), Some(vec![9.5]));
    }

    #[test]
    fn test_exported_factories() {
        let raw = allocator();
        assert!(!raw.is_null());

        let plugin: &mut RootPlugin = unsafe { &mut *raw };
        let host = HostContext::new(".");
        assert!(plugin.init(&host));
        assert_eq!(plugin.name(), "Sma");
        assert_eq!(plugin.minimal_host_version(), HOST_VERSION);
        plugin.unit();

        unsafe { deleter(raw) };
    }
}
