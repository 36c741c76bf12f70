use chrono::Utc;
use parking_lot::Mutex;

/// Session-unique id generator: millisecond timestamp plus a
/// disambiguator suffix when two ids land in the same millisecond.
pub struct IdGen {
    last: Mutex<(i64, u32)>,
}

impl IdGen {
    pub fn new() -> Self {
        IdGen {
            last: Mutex::new((0, 0)),
        }
    }

    pub fn next(&self, prefix: &str) -> String {
        let ms = Utc::now().timestamp_millis();
        let mut guard = self.last.lock();
        if ms <= guard.0 {
            guard.1 += 1;
            format!("{}{}_{}", prefix, guard.0, guard.1)
        } else {
            *guard = (ms, 0);
            format!("{}{}", prefix, ms)
        }
    }
}

impl Default for IdGen {
    fn default() -> Self {
        Self::new()
    }
}

/// Coarse device-class label from a browser user-agent string.
/// Best-effort and non-authoritative; only ever displayed.
pub fn classify_user_agent(ua: &str) -> &'static str {
    if ua.contains("iPad") {
        "iPad"
    } else if ua.contains("iPhone") {
        "iPhone"
    } else if ua.contains("Android") && ua.contains("Mobile") {
        "Android Phone"
    } else if ua.contains("Android") {
        "Android Tablet"
    } else if ua.contains("Macintosh") {
        "Mac"
    } else if ua.contains("Windows") {
        "Windows PC"
    } else if ua.contains("Linux") {
        "Linux"
    } else {
        "Unknown Device"
    }
}

/// Device-class label for native deployments, derived from the target OS.
pub fn default_device_label() -> &'static str {
    match std::env::consts::OS {
        "macos" => "Mac",
        "windows" => "Windows PC",
        "linux" => "Linux",
        "ios" => "iPhone",
        "android" => "Android Phone",
        _ => "Unknown Device",
    }
}
