#[cfg(target_os = "espidf")]
mod config;
#[cfg(target_os = "espidf")]
mod logging;
#[cfg(target_os = "espidf")]
mod modem;
#[cfg(target_os = "espidf")]
mod storage;
#[cfg(target_os = "espidf")]
mod version;

#[cfg(target_os = "espidf")]
use esp_idf_sys as _; // Binstart

// Generate ESP-IDF app descriptor
#[cfg(target_os = "espidf")]
#[allow(unexpected_cfgs)]
mod app_desc {
    esp_idf_sys::esp_app_desc!();
}

/// Modem wiring on the carrier board
#[cfg(target_os = "espidf")]
mod pins {
    pub const MODEM_TX: u8 = 6;
    pub const MODEM_RX: u8 = 5;
    pub const MODEM_PWRKEY: u8 = 4;
    pub const MODEM_RESET: u8 = 7;
}

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    use esp_idf_hal::delay::FreeRtos;
    use esp_idf_hal::gpio::OutputPin;
    use esp_idf_hal::prelude::Peripherals;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use fetch_core::{AttachPlan, ModemSession, Orchestrator};
    use log::{error, info, warn};

    esp_idf_svc::sys::link_patches();
    logging::init_logger()?;

    info!("{} starting", version::full_version());
    info!("Boot reason: {}", reset_reason());
    info!("Free heap: {} bytes", unsafe { esp_idf_sys::esp_get_free_heap_size() });

    let peripherals = Peripherals::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let device_config = config::load_or_default(nvs)?;
    if !logging::set_max_level_from_str(&device_config.log_level) {
        warn!("Unknown log level '{}', keeping info", device_config.log_level);
    }
    let fetch_config = device_config.fetch;
    info!("APN: {}  URL: {}", fetch_config.apn, fetch_config.base_url);

    let storage = storage::SpiffsStorage::mount();

    info!(
        "Modem on UART2 (tx GPIO{} rx GPIO{}), PWRKEY GPIO{}, RESET GPIO{}",
        pins::MODEM_TX,
        pins::MODEM_RX,
        pins::MODEM_PWRKEY,
        pins::MODEM_RESET
    );
    let transport = modem::UartTransport::open(
        peripherals.uart2,
        peripherals.pins.gpio6,
        peripherals.pins.gpio5,
        fetch_config.chunk_size,
    )?;
    let lines = modem::GpioControlLines::new(
        peripherals.pins.gpio7.downgrade_output(),
        peripherals.pins.gpio4.downgrade_output(),
    )?;

    let session = ModemSession::new(
        transport,
        lines,
        modem::FreeRtosClock::new(),
        AttachPlan::from_config(&fetch_config),
        fetch_config.attach_attempts,
    );
    let mut orchestrator = Orchestrator::new(session, storage, fetch_config);

    match orchestrator.run() {
        Ok(report) => {
            info!("Stored {} bytes from {}", report.transferred, report.url);
            match report.digest {
                Some(digest) => info!("Artifact SHA-256: {}", digest),
                None => warn!("Artifact stored but could not be verified"),
            }
        }
        Err(e) => {
            let kind = e.kind().map_or("CONFIG", |k| k.as_str());
            error!("Fetch failed [{}]: {}", kind, e);
        }
    }

    info!("Fetch finished, idling");
    loop {
        FreeRtos::delay_ms(10_000);
    }
}

#[cfg(target_os = "espidf")]
fn reset_reason() -> &'static str {
    match unsafe { esp_idf_sys::esp_reset_reason() } {
        esp_idf_sys::esp_reset_reason_t_ESP_RST_POWERON => "Power-on",
        esp_idf_sys::esp_reset_reason_t_ESP_RST_EXT => "External pin",
        esp_idf_sys::esp_reset_reason_t_ESP_RST_SW => "Software reset",
        esp_idf_sys::esp_reset_reason_t_ESP_RST_PANIC => "Panic",
        esp_idf_sys::esp_reset_reason_t_ESP_RST_INT_WDT
        | esp_idf_sys::esp_reset_reason_t_ESP_RST_TASK_WDT
        | esp_idf_sys::esp_reset_reason_t_ESP_RST_WDT => "Watchdog",
        esp_idf_sys::esp_reset_reason_t_ESP_RST_BROWNOUT => "Brownout",
        _ => "Unknown",
    }
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    eprintln!("cellular-fetch runs on ESP-IDF targets; run `cargo test --workspace` for the host tests");
}
