use anyhow::Result;
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};
use log::info;

const CONNECT_ATTEMPTS: u32 = 5;

/// WiFi connection result.
pub struct WifiResult {
    pub wifi: Box<EspWifi<'static>>,
    pub connected: bool,
    pub ip_address: Option<String>,
}

/// Log association state from ESP-IDF internals when WiFi debug is on.
fn log_wifi_diag(label: &str) {
    if !crate::debug_flags::is_on(&crate::debug_flags::DEBUG_WIFI) {
        return;
    }
    unsafe {
        let mut ap_info: esp_idf_sys::wifi_ap_record_t = core::mem::zeroed();
        let ap_rc = esp_idf_sys::esp_wifi_sta_get_ap_info(&mut ap_info);
        if ap_rc == esp_idf_sys::ESP_OK {
            let ssid = core::str::from_utf8(&ap_info.ssid)
                .unwrap_or("?")
                .trim_end_matches('\0');
            info!(
                "WiFi [{}]: assoc=YES rssi={} ch={} ssid={}",
                label, ap_info.rssi, ap_info.primary, ssid
            );
        } else {
            info!("WiFi [{}]: assoc=NO (ap_info err={})", label, ap_rc);
        }
    }
}

/// Retry association with a full stop/start radio reset between attempts.
fn connect_with_retries(blocking_wifi: &mut BlockingWifi<&mut EspWifi<'static>>, label: &str) -> bool {
    for attempt in 1..=CONNECT_ATTEMPTS {
        let t0 = unsafe { esp_idf_sys::esp_timer_get_time() };
        match blocking_wifi.connect() {
            Ok(_) => {
                let elapsed_ms = (unsafe { esp_idf_sys::esp_timer_get_time() } - t0) / 1000;
                info!("WiFi {} OK on attempt {} ({}ms)", label, attempt, elapsed_ms);
                log_wifi_diag(&format!("{} attempt {} OK", label, attempt));
                return true;
            }
            Err(e) => {
                let elapsed_ms = (unsafe { esp_idf_sys::esp_timer_get_time() } - t0) / 1000;
                log::warn!(
                    "WiFi {} attempt {}/{} failed after {}ms: {}",
                    label,
                    attempt,
                    CONNECT_ATTEMPTS,
                    elapsed_ms,
                    e
                );
                log_wifi_diag(&format!("{} attempt {} FAIL", label, attempt));

                if attempt < CONNECT_ATTEMPTS {
                    let _ = blocking_wifi.disconnect();
                    blocking_wifi.stop().ok();
                    std::thread::sleep(std::time::Duration::from_millis(500));
                    blocking_wifi.start().ok();
                    std::thread::sleep(std::time::Duration::from_millis(300));
                }
            }
        }
    }
    false
}

pub fn connect_wifi(
    modem: Modem,
    sysloop: EspSystemEventLoop,
    ssid: &str,
    password: &str,
) -> Result<WifiResult> {
    let mut esp_wifi = EspWifi::new(modem, sysloop.clone(), None)?;

    let auth = if password.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPA2Personal
    };

    let mut wifi_ssid = heapless::String::<32>::new();
    let mut wifi_pass = heapless::String::<64>::new();
    wifi_ssid.push_str(ssid).ok();
    wifi_pass.push_str(password).ok();

    esp_wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: wifi_ssid,
        password: wifi_pass,
        auth_method: auth,
        ..Default::default()
    }))?;

    let mut blocking_wifi = BlockingWifi::wrap(&mut esp_wifi, sysloop)?;

    blocking_wifi.start()?;
    info!("WiFi connecting to '{}'...", ssid);

    let connected = connect_with_retries(&mut blocking_wifi, "connect");

    let mut ip_address: Option<String> = None;
    if connected {
        info!("WiFi associated, waiting for IP address...");
        blocking_wifi.wait_netif_up()?;

        let ip_info = blocking_wifi.wifi().sta_netif().get_ip_info()?;
        info!("WiFi connected — IP: {}", ip_info.ip);
        ip_address = Some(ip_info.ip.to_string());
    } else {
        log::warn!(
            "WiFi failed after {} attempts; will retry later",
            CONNECT_ATTEMPTS
        );
    }

    // Drop the BlockingWifi wrapper; the underlying EspWifi remains usable.
    drop(blocking_wifi);

    Ok(WifiResult {
        wifi: Box::new(esp_wifi),
        connected,
        ip_address,
    })
}

/// Reconnect an existing driver. Returns the new IP on success, None when
/// association did not come up within the attempt budget.
pub fn reconnect_existing(
    wifi: &mut EspWifi<'static>,
    sysloop: EspSystemEventLoop,
) -> Result<Option<String>> {
    let mut blocking_wifi = BlockingWifi::wrap(wifi, sysloop)?;
    let _ = blocking_wifi.start();

    if !connect_with_retries(&mut blocking_wifi, "reconnect") {
        return Ok(None);
    }

    blocking_wifi.wait_netif_up()?;
    let ip_info = blocking_wifi.wifi().sta_netif().get_ip_info()?;
    info!("WiFi reconnected — IP: {}", ip_info.ip);

    Ok(Some(ip_info.ip.to_string()))
}
