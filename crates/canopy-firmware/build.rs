//! Bakes node identity and WiFi credentials into the firmware.
//!
//! Values come from the environment or a `.env` file next to the workspace,
//! e.g.
//!
//! ```text
//! WIFI_SSID=greenhouse
//! WIFI_PASSWORD=hunter22
//! DEVICE_ID=canopy-01
//! COLLECTOR_URL=http://192.168.1.20:8080/api/readouts
//! UTC_OFFSET_SECS=3600
//! ```

const KEYS: [(&str, &str); 5] = [
    ("WIFI_SSID", ""),
    ("WIFI_PASSWORD", ""),
    ("DEVICE_ID", "canopy-01"),
    ("COLLECTOR_URL", "http://192.168.1.20:8080/api/readouts"),
    ("UTC_OFFSET_SECS", "0"),
];

fn main() {
    // A missing .env is fine; the process environment still applies.
    let _ = dotenvy::dotenv();

    for (key, default) in KEYS {
        println!("cargo:rerun-if-env-changed={key}");
        let value = std::env::var(key).unwrap_or_else(|_| default.to_string());
        check(key, &value);
        println!("cargo:rustc-env={key}={value}");
    }

    println!("cargo:rerun-if-changed=.env");
    println!("cargo:rustc-link-arg=-Tlinkall.x");
}

/// Reject values the firmware cannot use before they are baked in.
fn check(key: &str, value: &str) {
    if key == "UTC_OFFSET_SECS" {
        match value.parse::<i32>() {
            Ok(secs) if secs.abs() <= 14 * 3600 => {}
            _ => panic!("UTC_OFFSET_SECS must be whole seconds within +/-14h, got {value:?}"),
        }
    }
}
