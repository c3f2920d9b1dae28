use anyhow::Result;
use esp_idf_svc::sntp::{EspSntp, OperatingMode, SntpConf, SyncMode, SyncStatus};
use log::info;
use std::thread;
use std::time::Duration;

const SNTP_SERVER: &str = "pool.ntp.org";
const SYNC_TIMEOUT_MS: u32 = 20_000;
const POLL_INTERVAL_MS: u32 = 250;

// Clock readings below this are "never synced".
const EPOCH_SANITY_SECS: libc::time_t = 1_000_000_000;

/// Start SNTP time synchronization with the given POSIX timezone string.
///
/// Sets the TZ environment variable, then creates an SNTP client that polls
/// pool.ntp.org. Waits up to 20 seconds for an initial sync before returning.
/// The returned EspSntp must be kept alive to maintain periodic re-sync.
pub fn sync_time(tz: &str) -> Result<EspSntp<'static>> {
    info!("Setting timezone: {}", tz);
    // Safety: single-threaded at this point during init
    unsafe {
        std::env::set_var("TZ", tz);
    }

    let conf = SntpConf {
        servers: [SNTP_SERVER, "time.nist.gov"],
        sync_mode: SyncMode::Immediate,
        operating_mode: OperatingMode::Poll,
    };

    info!("Starting SNTP sync with {}", SNTP_SERVER);
    let sntp = EspSntp::new_with_callback(&conf, |_| {
        info!("SNTP sync callback triggered");
    })?;

    let mut elapsed_ms = 0u32;
    while elapsed_ms < SYNC_TIMEOUT_MS {
        if sntp.get_sync_status() == SyncStatus::Completed {
            info!("SNTP time synchronized after {}ms", elapsed_ms);
            if let Some(t) = format_zulu_time() {
                info!("Current Zulu time: {}", t);
            }
            return Ok(sntp);
        }
        thread::sleep(Duration::from_millis(POLL_INTERVAL_MS as u64));
        elapsed_ms += POLL_INTERVAL_MS;
    }

    log::warn!(
        "SNTP sync not completed within {}s, continuing anyway (will sync in background)",
        SYNC_TIMEOUT_MS / 1000
    );
    Ok(sntp)
}

fn wall_clock() -> Option<libc::time_t> {
    let mut now: libc::time_t = 0;
    unsafe {
        libc::time(&mut now);
    }
    if now < EPOCH_SANITY_SECS {
        return None;
    }
    Some(now)
}

/// Format the current UTC time as "HHMMZ" (METAR convention), or None if
/// the clock has not been set yet.
pub fn format_zulu_time() -> Option<String> {
    let now = wall_clock()?;
    let mut tm: libc::tm = unsafe { std::mem::zeroed() };
    unsafe {
        libc::gmtime_r(&now, &mut tm);
    }
    Some(format!("{:02}{:02}Z", tm.tm_hour, tm.tm_min))
}

/// Format the current local time as "HH:MM", or None if the clock is not
/// set. Used for the "updated" stamp in the status footer.
pub fn format_local_time() -> Option<String> {
    let now = wall_clock()?;
    let mut tm: libc::tm = unsafe { std::mem::zeroed() };
    unsafe {
        libc::localtime_r(&now, &mut tm);
    }
    Some(format!("{:02}:{:02}", tm.tm_hour, tm.tm_min))
}
