use anyhow::Result;
use esp_idf_svc::nvs::{EspNvs, NvsDefault};
use log::info;

pub const NS: &str = "app_cfg";

const KEY_WIFI_SSID: &str = "wifi_ssid";
const KEY_WIFI_PASS: &str = "wifi_pass";
const KEY_STATION: &str = "station";
const KEY_REFRESH_SECS: &str = "refresh_s";
const KEY_LINE_WIDTH: &str = "line_w";
const KEY_LINE_HEIGHT: &str = "line_h";
const KEY_HTTP_UA: &str = "http_ua";
const KEY_TIMEZONE: &str = "timezone";

const DEFAULT_STATION: &str = "KSFO";
const DEFAULT_REFRESH_SECS: u32 = 600;
const DEFAULT_TIMEZONE: &str = "CST6CDT,M3.2.0,M11.1.0";

pub const DEFAULT_LINE_WIDTH: usize = 20;
pub const DEFAULT_LINE_HEIGHT: usize = 6;

/// Largest character grid the METAR card can hold with the grid font.
pub const MAX_LINE_WIDTH: usize = 22;
pub const MAX_LINE_HEIGHT: usize = 7;

const MIN_REFRESH_SECS: u32 = 60;

/// Runtime configuration, loaded from NVS once at boot.
///
/// The console mutates NVS and the shared copy for `show` commands, but the
/// polling loop keeps the immutable copy it was started with; changes apply
/// on reboot.
#[derive(Clone)]
pub struct Config {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    /// ICAO identifier polled for METARs.
    pub station: String,
    pub refresh_secs: u32,
    pub line_width: usize,
    pub line_height: usize,
    pub http_user_agent: String,
    pub timezone: String,
}

/// Read a string from NVS, returning None if the key is absent or on error.
fn nvs_get_str(nvs: &EspNvs<NvsDefault>, key: &str) -> Option<String> {
    // First call with None to get the required buffer length.
    let len = match nvs.str_len(key) {
        Ok(Some(len)) => len,
        _ => return None,
    };

    let mut buf = vec![0u8; len];
    match nvs.get_str(key, &mut buf) {
        Ok(Some(val)) => {
            let s = val.trim_end_matches('\0').to_string();
            if s.is_empty() {
                None
            } else {
                Some(s)
            }
        }
        _ => None,
    }
}

fn default_user_agent() -> String {
    format!("metar_panel/{} (contact: unset)", env!("CARGO_PKG_VERSION"))
}

/// Normalize an ICAO identifier typed at the console.
pub fn normalize_station(raw: &str) -> Option<String> {
    let s = raw.trim().to_ascii_uppercase();
    if (3..=8).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_alphanumeric()) {
        Some(s)
    } else {
        None
    }
}

impl Config {
    /// Load configuration from NVS, falling back to defaults for any missing
    /// keys. Display geometry is clamped so both dimensions stay >= 1 and
    /// within what the panel can render.
    pub fn load(nvs: &EspNvs<NvsDefault>) -> Config {
        let wifi_ssid = nvs_get_str(nvs, KEY_WIFI_SSID)
            .unwrap_or_else(|| option_env!("LOCAL_WIFI_SSID").unwrap_or("").to_string());
        info!("NVS wifi_ssid = {:?}", wifi_ssid);

        let wifi_pass = nvs_get_str(nvs, KEY_WIFI_PASS)
            .unwrap_or_else(|| option_env!("LOCAL_WIFI_PASS").unwrap_or("").to_string());
        info!("NVS wifi_pass = <{} chars>", wifi_pass.len());

        let station = nvs_get_str(nvs, KEY_STATION)
            .as_deref()
            .and_then(normalize_station)
            .unwrap_or_else(|| {
                option_env!("LOCAL_METAR_STATION")
                    .unwrap_or(DEFAULT_STATION)
                    .to_string()
            });
        info!("NVS station = {:?}", station);

        let refresh_secs = nvs
            .get_u32(KEY_REFRESH_SECS)
            .unwrap_or(None)
            .unwrap_or(DEFAULT_REFRESH_SECS)
            .max(MIN_REFRESH_SECS);
        info!("NVS refresh_s = {}", refresh_secs);

        let line_width = nvs
            .get_u8(KEY_LINE_WIDTH)
            .unwrap_or(None)
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_LINE_WIDTH)
            .clamp(1, MAX_LINE_WIDTH);
        let line_height = nvs
            .get_u8(KEY_LINE_HEIGHT)
            .unwrap_or(None)
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_LINE_HEIGHT)
            .clamp(1, MAX_LINE_HEIGHT);
        info!("NVS display grid = {}x{}", line_width, line_height);

        let http_user_agent = nvs_get_str(nvs, KEY_HTTP_UA).unwrap_or_else(default_user_agent);
        info!("NVS http_ua = {:?}", http_user_agent);

        let timezone =
            nvs_get_str(nvs, KEY_TIMEZONE).unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        info!("NVS timezone = {:?}", timezone);

        Config {
            wifi_ssid,
            wifi_pass,
            station,
            refresh_secs,
            line_width,
            line_height,
            http_user_agent,
            timezone,
        }
    }

    pub fn save_wifi(nvs: &mut EspNvs<NvsDefault>, ssid: &str, pass: &str) -> Result<()> {
        nvs.set_str(KEY_WIFI_SSID, ssid)?;
        nvs.set_str(KEY_WIFI_PASS, pass)?;
        info!("NVS saved wifi_ssid={:?}", ssid);
        Ok(())
    }

    pub fn save_station(nvs: &mut EspNvs<NvsDefault>, station: &str) -> Result<()> {
        nvs.set_str(KEY_STATION, station)?;
        info!("NVS saved station={:?}", station);
        Ok(())
    }

    pub fn save_refresh_secs(nvs: &mut EspNvs<NvsDefault>, secs: u32) -> Result<()> {
        nvs.set_u32(KEY_REFRESH_SECS, secs)?;
        info!("NVS saved refresh_s={}", secs);
        Ok(())
    }

    pub fn save_grid(nvs: &mut EspNvs<NvsDefault>, width: usize, height: usize) -> Result<()> {
        nvs.set_u8(KEY_LINE_WIDTH, width as u8)?;
        nvs.set_u8(KEY_LINE_HEIGHT, height as u8)?;
        info!("NVS saved display grid = {}x{}", width, height);
        Ok(())
    }

    pub fn save_http_user_agent(nvs: &mut EspNvs<NvsDefault>, ua: &str) -> Result<()> {
        nvs.set_str(KEY_HTTP_UA, ua)?;
        info!("NVS saved http_ua={:?}", ua);
        Ok(())
    }

    #[allow(dead_code)]
    pub fn save_timezone(nvs: &mut EspNvs<NvsDefault>, tz: &str) -> Result<()> {
        nvs.set_str(KEY_TIMEZONE, tz)?;
        info!("NVS saved timezone={:?}", tz);
        Ok(())
    }
}
