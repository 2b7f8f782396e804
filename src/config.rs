use anyhow::Result;
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use fetch_core::FetchConfig;
use serde::{Deserialize, Serialize};

const CONFIG_NAMESPACE: &str = "fetch";
const CONFIG_KEY: &str = "config";

/// Everything the device persists: console verbosity plus the fetch parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub log_level: String,
    pub fetch: FetchConfig,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        // Injected by build.rs from modem_config.h, which should NOT be committed
        let apn = env!("CELL_APN");
        let url = env!("FETCH_URL");

        let mut fetch = FetchConfig::with_url(url);
        if !apn.is_empty() {
            fetch.apn = apn.to_string();
        }

        Self { log_level: "info".to_string(), fetch }
    }
}

impl DeviceConfig {
    pub fn save(&self, nvs: &mut EspNvs<NvsDefault>) -> Result<()> {
        let json = serde_json::to_vec(self)?;
        nvs.set_blob(CONFIG_KEY, &json)?;
        log::info!("Configuration saved to NVS");
        Ok(())
    }
}

/// Stored configuration, or compiled defaults written back for next boot
pub fn load_or_default(partition: EspDefaultNvsPartition) -> Result<DeviceConfig> {
    let mut nvs = EspNvs::new(partition, CONFIG_NAMESPACE, true)?;

    match load_from_nvs(&nvs) {
        Ok(Some(mut config)) => {
            log::info!("Loaded configuration from NVS");

            // A blank URL in NVS means the compiled-in one still applies
            if config.fetch.base_url.is_empty() {
                let defaults = DeviceConfig::default();
                log::warn!("NVS fetch URL empty, using compiled default '{}'", defaults.fetch.base_url);
                config.fetch.base_url = defaults.fetch.base_url;
                if let Err(e) = config.save(&mut nvs) {
                    log::warn!("Failed to save updated config: {:?}", e);
                }
            }
            Ok(config)
        }
        Ok(None) => {
            log::info!("No stored configuration, using compiled defaults");
            let config = DeviceConfig::default();
            if let Err(e) = config.save(&mut nvs) {
                log::warn!("Failed to save default config to NVS: {:?}", e);
            }
            Ok(config)
        }
        Err(e) => {
            log::warn!("Failed to load config from NVS: {:?}, using defaults", e);
            Ok(DeviceConfig::default())
        }
    }
}

fn load_from_nvs(nvs: &EspNvs<NvsDefault>) -> Result<Option<DeviceConfig>> {
    let mut buf = vec![0u8; 2048]; // Max config size
    match nvs.get_blob(CONFIG_KEY, &mut buf)? {
        Some(data) => Ok(Some(serde_json::from_slice(data)?)),
        None => Ok(None),
    }
}
