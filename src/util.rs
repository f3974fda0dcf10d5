use sysinfo::System;

const CONFIG_PATH: &str = "HOST_HEALTH_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "host-health.json";

pub fn get_default_config_path() -> &'static str {
    DEFAULT_CONFIG_PATH
}

/// Config file location from `HOST_HEALTH_CONFIG`, if set
pub fn get_config_path() -> Option<String> {
    std::env::var(CONFIG_PATH).ok().filter(|p| !p.trim().is_empty())
}

const FALLBACK_HOSTNAME: &str = "localhost";

/// This machine's host name, used in EHLO and report headers
pub fn hostname() -> String {
    System::host_name()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_HOSTNAME.to_string())
}
