use std::sync::atomic::{AtomicBool, Ordering};

/// Global debug flags toggled via console.
/// When a flag is true, the module logs at info! level instead of being silent.
pub static DEBUG_WIFI: AtomicBool = AtomicBool::new(false);
pub static DEBUG_FETCH: AtomicBool = AtomicBool::new(false);

/// Request flags — console sets these, the polling loop acts on them.
pub static REQUEST_REFRESH: AtomicBool = AtomicBool::new(false);

pub fn is_on(flag: &AtomicBool) -> bool {
    flag.load(Ordering::Relaxed)
}

pub fn set(flag: &AtomicBool, val: bool) {
    flag.store(val, Ordering::Relaxed);
}

pub fn toggle(flag: &AtomicBool) -> bool {
    let old = flag.load(Ordering::Relaxed);
    flag.store(!old, Ordering::Relaxed);
    !old
}

pub fn status_line() -> String {
    format!(
        "wifi={} fetch={}",
        if is_on(&DEBUG_WIFI) { "ON" } else { "off" },
        if is_on(&DEBUG_FETCH) { "ON" } else { "off" },
    )
}
