/// Station configuration, read from the environment
///
/// # Environment variables
///
/// | Variable | Default | Meaning |
/// |----------|---------|---------|
/// | DATABASE_URL | sqlite:split-station.db | Inventory database |
/// | PRINTER_CONFIG | printer_config.json | Printer endpoint file |
/// | LOG_LEVEL | info | Default log filter |
/// | LOG_DIR | (unset) | Daily rolling log files, when the directory exists |
///
/// # Example
///
/// ```ignore
/// DATABASE_URL=sqlite:/data/wms.db LOG_DIR=/var/log/split split-station lookup HU123
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    /// Path of the printer JSON file
    pub printer_config: String,
    pub log_level: String,
    pub log_dir: Option<String>,
}

pub const DEFAULT_DATABASE_URL: &str = "sqlite:split-station.db";
pub const DEFAULT_PRINTER_CONFIG: &str = "printer_config.json";

impl Config {
    /// Load from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());
        Self {
            database_url: non_empty("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.into()),
            printer_config: non_empty("PRINTER_CONFIG")
                .unwrap_or_else(|| DEFAULT_PRINTER_CONFIG.into()),
            log_level: non_empty("LOG_LEVEL").unwrap_or_else(|| "info".into()),
            log_dir: non_empty("LOG_DIR"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}
