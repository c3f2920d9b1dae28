use anyhow::Result;
use esp_idf_svc::nvs::{EspNvs, NvsDefault};
use log::{info, warn};
use std::io::{self, Read};
use std::sync::{Arc, Mutex};

use crate::config::{self, Config};

pub fn spawn_console(nvs: Arc<Mutex<EspNvs<NvsDefault>>>, config: Arc<Mutex<Config>>) {
    std::thread::Builder::new()
        .name("console".into())
        .stack_size(8192)
        .spawn(move || {
            info!("console: ready (type 'help') — use minicom Ctrl+A E for local echo");
            let stdin = io::stdin();
            let mut reader = stdin.lock();
            let mut line = String::new();
            let mut buf = [0u8; 1];
            let mut in_escape = false;
            loop {
                match reader.read(&mut buf) {
                    Ok(1) => {
                        let ch = buf[0];
                        if in_escape {
                            if (ch as char).is_ascii_alphabetic() || ch == b'~' {
                                in_escape = false;
                            }
                            continue;
                        }
                        if ch == 0x1b {
                            in_escape = true;
                            continue;
                        }
                        if ch == b'\n' || ch == b'\r' {
                            if line.is_empty() {
                                continue;
                            }
                            info!("> {}", line);
                            if let Err(e) = process_line(&line, &nvs, &config) {
                                warn!("console: error: {}", e);
                            }
                            line.clear();
                        } else if ch == 0x7f || ch == 0x08 {
                            line.pop();
                        } else if ch >= 0x20 {
                            line.push(ch as char);
                        }
                    }
                    Ok(_) => {
                        std::thread::sleep(std::time::Duration::from_millis(50));
                    }
                    Err(_) => {
                        std::thread::sleep(std::time::Duration::from_millis(100));
                    }
                }
            }
        })
        .expect("failed to spawn console thread");
}

fn process_line(
    line: &str,
    nvs: &Arc<Mutex<EspNvs<NvsDefault>>>,
    config: &Arc<Mutex<Config>>,
) -> Result<()> {
    let clean = line.trim().trim_end_matches('\\');
    if clean.is_empty() {
        return Ok(());
    }
    let mut parts = clean.splitn(3, char::is_whitespace);
    let cmd = parts.next().unwrap_or("");
    let sub = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("").trim();

    match cmd {
        "help" | "?" => print_help(),
        "wifi" => handle_wifi(sub, rest, nvs, config)?,
        "station" => handle_station(sub, rest, nvs, config)?,
        "display" => handle_display(sub, rest, nvs, config)?,
        "refresh" => handle_refresh(sub, rest, nvs, config)?,
        "ua" => handle_ua(sub, rest, nvs, config)?,
        "debug" => handle_debug(sub),
        "status" => {
            let cfg = config.lock().unwrap();
            info!(
                "wifi: {}",
                if cfg.wifi_ssid.is_empty() {
                    "not configured"
                } else {
                    &cfg.wifi_ssid
                }
            );
            info!("station: {}", cfg.station);
            info!("refresh: {}s", cfg.refresh_secs);
            info!("display grid: {}x{}", cfg.line_width, cfg.line_height);
            info!("ua: {}", cfg.http_user_agent);
            let heap_kb = unsafe { esp_idf_sys::esp_get_free_heap_size() } / 1024;
            info!("free heap: {} KB", heap_kb);
            info!("debug: {}", crate::debug_flags::status_line());
        }
        "reboot" => {
            info!("console: rebooting now");
            std::thread::sleep(std::time::Duration::from_millis(100));
            unsafe { esp_idf_sys::esp_restart() };
        }
        _ => {
            warn!("console: unknown command '{}' (type 'help')", cmd);
        }
    }
    Ok(())
}

fn print_help() {
    info!("commands:");
    info!("  wifi show                  - show Wi-Fi config");
    info!("  wifi set <ssid> <pass>     - set Wi-Fi credentials");
    info!("  wifi clear                 - clear Wi-Fi override");
    info!("  station show               - show METAR station");
    info!("  station set <icao>         - set METAR station (e.g. KSFO)");
    info!("  display show               - show display grid");
    info!("  display set <cols> <rows>  - set METAR grid geometry");
    info!("  refresh show               - show poll interval");
    info!("  refresh set <secs>         - set poll interval");
    info!("  refresh now                - fetch on the next tick");
    info!("  ua set <user-agent>        - set dataserver User-Agent");
    info!("  debug <module>             - toggle debug for module");
    info!("    modules: wifi, fetch, all");
    info!("  debug show                 - show debug flag status");
    info!("  status                     - show system status");
    info!("  reboot                     - reboot device");
}

fn handle_debug(sub: &str) {
    use crate::debug_flags::*;
    match sub {
        "show" | "" => {
            info!("debug: {}", status_line());
        }
        "wifi" => {
            let on = toggle(&DEBUG_WIFI);
            info!("debug wifi: {}", if on { "ON" } else { "OFF" });
        }
        "fetch" | "metar" => {
            let on = toggle(&DEBUG_FETCH);
            info!("debug fetch: {}", if on { "ON" } else { "OFF" });
        }
        "all" => {
            // If any flag is off, turn all on; if all on, turn all off
            let any_off = !is_on(&DEBUG_WIFI) || !is_on(&DEBUG_FETCH);
            set(&DEBUG_WIFI, any_off);
            set(&DEBUG_FETCH, any_off);
            info!("debug all: {}", if any_off { "ON" } else { "OFF" });
        }
        _ => {
            info!("unknown module '{}'. options: wifi, fetch, all", sub);
        }
    }
}

fn handle_wifi(
    sub: &str,
    rest: &str,
    nvs: &Arc<Mutex<EspNvs<NvsDefault>>>,
    config: &Arc<Mutex<Config>>,
) -> Result<()> {
    match sub {
        "show" => {
            let cfg = config.lock().unwrap();
            info!("wifi ssid: {}", cfg.wifi_ssid);
            let pass_len = cfg.wifi_pass.len();
            info!(
                "wifi pass: {} ({} chars)",
                if pass_len == 0 { "<empty>" } else { "********" },
                pass_len
            );
        }
        "set" => {
            let (ssid, pass) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            let ssid = ssid.trim_matches('"').trim_matches('\'');
            let pass = pass.trim().trim_matches('"').trim_matches('\'');
            if ssid.is_empty() {
                warn!("usage: wifi set <ssid> <password>");
                return Ok(());
            }
            let mut nvs = nvs.lock().unwrap();
            Config::save_wifi(&mut nvs, ssid, pass)?;
            config.lock().unwrap().wifi_ssid = ssid.to_string();
            config.lock().unwrap().wifi_pass = pass.to_string();
            info!("saved: SSID='{}' pass=******** ({} chars)", ssid, pass.len());
            info!("type 'reboot' to apply");
        }
        "clear" => {
            let mut nvs = nvs.lock().unwrap();
            Config::save_wifi(&mut nvs, "", "")?;
            let mut cfg = config.lock().unwrap();
            cfg.wifi_ssid.clear();
            cfg.wifi_pass.clear();
            info!("Wi-Fi override cleared");
        }
        _ => print_help(),
    }
    Ok(())
}

fn handle_station(
    sub: &str,
    rest: &str,
    nvs: &Arc<Mutex<EspNvs<NvsDefault>>>,
    config: &Arc<Mutex<Config>>,
) -> Result<()> {
    match sub {
        "" | "show" => {
            let cfg = config.lock().unwrap();
            info!("station: {}", cfg.station);
        }
        "set" => {
            let raw = rest.trim().trim_matches('"').trim_matches('\'');
            let Some(station) = config::normalize_station(raw) else {
                warn!("usage: station set <icao> (3-8 alphanumeric characters)");
                return Ok(());
            };
            let mut nvs = nvs.lock().unwrap();
            Config::save_station(&mut nvs, &station)?;
            config.lock().unwrap().station = station.clone();
            info!("saved: station={}", station);
            info!("type 'reboot' to apply");
        }
        _ => {
            // Allow the shorthand "station KSFO".
            if let Some(station) = config::normalize_station(sub) {
                let mut nvs = nvs.lock().unwrap();
                Config::save_station(&mut nvs, &station)?;
                config.lock().unwrap().station = station.clone();
                info!("saved: station={}", station);
                info!("type 'reboot' to apply");
            } else {
                warn!("usage: station set <icao>");
            }
        }
    }
    Ok(())
}

fn handle_display(
    sub: &str,
    rest: &str,
    nvs: &Arc<Mutex<EspNvs<NvsDefault>>>,
    config: &Arc<Mutex<Config>>,
) -> Result<()> {
    match sub {
        "" | "show" => {
            let cfg = config.lock().unwrap();
            info!(
                "display grid: {}x{} (max {}x{})",
                cfg.line_width,
                cfg.line_height,
                config::MAX_LINE_WIDTH,
                config::MAX_LINE_HEIGHT
            );
        }
        "set" => {
            let mut it = rest.split_whitespace();
            let cols = it.next().and_then(|v| v.parse::<usize>().ok());
            let rows = it.next().and_then(|v| v.parse::<usize>().ok());
            let (Some(cols), Some(rows)) = (cols, rows) else {
                warn!("usage: display set <cols> <rows>");
                return Ok(());
            };
            if cols == 0
                || rows == 0
                || cols > config::MAX_LINE_WIDTH
                || rows > config::MAX_LINE_HEIGHT
            {
                warn!(
                    "grid must be 1..={} cols and 1..={} rows",
                    config::MAX_LINE_WIDTH,
                    config::MAX_LINE_HEIGHT
                );
                return Ok(());
            }
            let mut nvs = nvs.lock().unwrap();
            Config::save_grid(&mut nvs, cols, rows)?;
            let mut cfg = config.lock().unwrap();
            cfg.line_width = cols;
            cfg.line_height = rows;
            info!("saved: display grid = {}x{}", cols, rows);
            info!("type 'reboot' to apply");
        }
        _ => warn!("usage: display show|set <cols> <rows>"),
    }
    Ok(())
}

fn handle_refresh(
    sub: &str,
    rest: &str,
    nvs: &Arc<Mutex<EspNvs<NvsDefault>>>,
    config: &Arc<Mutex<Config>>,
) -> Result<()> {
    match sub {
        "" | "show" => {
            let cfg = config.lock().unwrap();
            info!("refresh: {}s", cfg.refresh_secs);
        }
        "now" => {
            info!("refresh: fetch requested (will run on next tick)");
            crate::debug_flags::REQUEST_REFRESH.store(true, std::sync::atomic::Ordering::Relaxed);
        }
        "set" => {
            let Some(secs) = rest.split_whitespace().next().and_then(|v| v.parse::<u32>().ok())
            else {
                warn!("usage: refresh set <secs>");
                return Ok(());
            };
            if secs < 60 {
                warn!("refresh interval must be at least 60s (dataserver rate limits)");
                return Ok(());
            }
            let mut nvs = nvs.lock().unwrap();
            Config::save_refresh_secs(&mut nvs, secs)?;
            config.lock().unwrap().refresh_secs = secs;
            info!("saved: refresh={}s", secs);
            info!("type 'reboot' to apply");
        }
        _ => warn!("usage: refresh show|set <secs>|now"),
    }
    Ok(())
}

fn handle_ua(
    sub: &str,
    rest: &str,
    nvs: &Arc<Mutex<EspNvs<NvsDefault>>>,
    config: &Arc<Mutex<Config>>,
) -> Result<()> {
    match sub {
        "" | "show" => {
            let cfg = config.lock().unwrap();
            info!("ua: {}", cfg.http_user_agent);
        }
        "set" => {
            let ua = rest.trim().trim_matches('"').trim_matches('\'');
            if ua.is_empty() {
                warn!("usage: ua set <user-agent>");
                return Ok(());
            }
            let mut nvs = nvs.lock().unwrap();
            Config::save_http_user_agent(&mut nvs, ua)?;
            config.lock().unwrap().http_user_agent = ua.to_string();
            info!("ua saved");
        }
        _ => warn!("usage: ua show|set <user-agent>"),
    }
    Ok(())
}
