use std::env;
use std::fs;
use std::path::Path;

const DEVICE_CONFIG: &str = "device_config.h";

/// Value of `#define NAME "value"` in a C header, if present.
fn define(contents: &str, name: &str) -> Option<String> {
    let prefix = format!("#define {}", name);
    contents
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with(&prefix) && l[prefix.len()..].starts_with(char::is_whitespace))
        .and_then(|l| l.split('"').nth(1))
        .map(str::to_string)
}

fn main() -> anyhow::Result<()> {
    // Necessary for ESP-IDF
    if env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        embuild::espidf::sysenv::output();
    }

    println!("cargo:rerun-if-changed={}", DEVICE_CONFIG);

    let contents = if Path::new(DEVICE_CONFIG).exists() {
        fs::read_to_string(DEVICE_CONFIG)?
    } else {
        println!("cargo:warning={} not found! Copy device_config.h.example to {} and fill in your network and release settings.", DEVICE_CONFIG, DEVICE_CONFIG);
        String::new()
    };

    for name in ["WIFI_SSID", "WIFI_PASSWORD", "MANIFEST_URL", "MQTT_URL", "COMMAND_TOPIC"] {
        let value = define(&contents, name).unwrap_or_default();
        println!("cargo:rustc-env={}={}", name, value);
    }

    // The installed release tag is fixed at build time
    let release_tag = define(&contents, "RELEASE_TAG")
        .filter(|tag| !tag.is_empty())
        .unwrap_or_else(|| format!("v{}", env::var("CARGO_PKG_VERSION").unwrap_or_default()));
    println!("cargo:rustc-env=RELEASE_TAG={}", release_tag);

    Ok(())
}
