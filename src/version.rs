// Centralized version information

// Cargo package version from Cargo.toml
pub const CARGO_VERSION: &str = env!("CARGO_PKG_VERSION");

// Name shown in the boot banner
pub const PRODUCT: &str = "Cellular Fetch";

pub fn full_version() -> String {
    format!("{} v{}", PRODUCT, CARGO_VERSION)
}
