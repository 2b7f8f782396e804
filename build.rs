use std::env;
use std::fs;
use std::path::Path;

fn main() -> anyhow::Result<()> {
    // Necessary for ESP-IDF; host builds of the workspace skip it
    if env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        embuild::espidf::sysenv::output();

        // Add crash log helper for better panic diagnostics
        println!("cargo:rustc-link-arg=-Wl,--undefined=esp_backtrace_print_app_description");
    }

    println!("cargo:rerun-if-changed=modem_config.h");

    // Read cellular configuration if it exists
    let modem_config_path = "modem_config.h";
    let contents = if Path::new(modem_config_path).exists() {
        fs::read_to_string(modem_config_path)?
    } else {
        println!("cargo:warning=modem_config.h not found! Copy modem_config.h.example to modem_config.h and set APN and URL.");
        String::new()
    };

    for key in ["CELL_APN", "FETCH_URL"] {
        println!("cargo:rustc-env={}={}", key, define_value(&contents, key).unwrap_or_default());
    }

    Ok(())
}

/// Value of `#define KEY "value"`, if present
fn define_value(contents: &str, key: &str) -> Option<String> {
    let directive = format!("#define {}", key);
    contents
        .lines()
        .find(|l| l.trim_start().starts_with(&directive))
        .and_then(|l| l.split('"').nth(1))
        .map(str::to_string)
}
