mod config;
mod console;
mod debug_flags;
mod display;
mod framebuffer;
mod http_client;
mod layout;
mod metar;
mod reflow;
mod time_sync;
mod wifi;

use anyhow::Result;
use embedded_graphics::{
    mono_font::MonoTextStyle,
    prelude::*,
    text::{Alignment, Text},
};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs};
use log::info;
use profont::{PROFONT_10_POINT, PROFONT_12_POINT, PROFONT_14_POINT, PROFONT_24_POINT};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::display::TextGrid;
use crate::framebuffer::Framebuffer;

// ── SPI panel wiring (2.4" ST7789 module) ──────────────────────────
const PIN_LCD_SCLK: i32 = 12;
const PIN_LCD_MOSI: i32 = 11;
const PIN_LCD_CS: i32 = 10;
const PIN_LCD_DC: i32 = 9;
const PIN_LCD_RST: i32 = 8;
const PIN_LCD_BL: i32 = 7;

const PCLK_HZ: u32 = 40_000_000;

// ── Timing ──────────────────────────────────────────────────────────
const RETRY_SECS: u64 = 30;
const STALE_AFTER_EXTRA_SECS: u64 = 120;
const WIFI_RETRY_INTERVAL_SECS: u64 = 300;
const CLOCK_REDRAW_SECS: u64 = 60;
const FAILURE_WARN_EVERY: u32 = 10;

// ── Helpers ─────────────────────────────────────────────────────────

fn esp_check(res: esp_idf_sys::esp_err_t, msg: &str) -> Result<()> {
    if res != esp_idf_sys::ESP_OK {
        Err(anyhow::anyhow!("{} (err {})", msg, res))
    } else {
        Ok(())
    }
}

fn now_secs() -> u64 {
    unsafe { (esp_idf_sys::esp_timer_get_time() / 1_000_000) as u64 }
}

/// Truncate `s` to at most `max` bytes without splitting a UTF-8 character.
fn truncate_at_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}

// ── Display init ────────────────────────────────────────────────────

struct LcdContext {
    panel: esp_idf_sys::esp_lcd_panel_handle_t,
}

fn init_display() -> Result<LcdContext> {
    let mut bus_cfg = esp_idf_sys::spi_bus_config_t::default();
    bus_cfg.__bindgen_anon_1.mosi_io_num = PIN_LCD_MOSI;
    bus_cfg.__bindgen_anon_2.miso_io_num = -1;
    bus_cfg.__bindgen_anon_3.quadwp_io_num = -1;
    bus_cfg.__bindgen_anon_4.quadhd_io_num = -1;
    bus_cfg.sclk_io_num = PIN_LCD_SCLK;
    bus_cfg.max_transfer_sz = (framebuffer::FB_WIDTH as i32) * framebuffer::CHUNK_LINES * 2;

    let host = esp_idf_sys::spi_host_device_t_SPI2_HOST;
    esp_check(
        unsafe {
            esp_idf_sys::spi_bus_initialize(
                host,
                &bus_cfg,
                esp_idf_sys::spi_common_dma_t_SPI_DMA_CH_AUTO,
            )
        },
        "spi_bus_initialize",
    )?;

    let mut io: esp_idf_sys::esp_lcd_panel_io_handle_t = std::ptr::null_mut();
    let mut io_cfg = esp_idf_sys::esp_lcd_panel_io_spi_config_t::default();
    io_cfg.cs_gpio_num = PIN_LCD_CS;
    io_cfg.dc_gpio_num = PIN_LCD_DC;
    io_cfg.spi_mode = 0;
    io_cfg.pclk_hz = PCLK_HZ;
    io_cfg.trans_queue_depth = 10;
    io_cfg.lcd_cmd_bits = 8;
    io_cfg.lcd_param_bits = 8;
    esp_check(
        unsafe {
            esp_idf_sys::esp_lcd_new_panel_io_spi(
                host as esp_idf_sys::esp_lcd_spi_bus_handle_t,
                &io_cfg,
                &mut io,
            )
        },
        "esp_lcd_new_panel_io_spi",
    )?;

    let mut panel: esp_idf_sys::esp_lcd_panel_handle_t = std::ptr::null_mut();
    let mut panel_cfg = esp_idf_sys::esp_lcd_panel_dev_config_t::default();
    panel_cfg.reset_gpio_num = PIN_LCD_RST;
    panel_cfg.__bindgen_anon_1.rgb_ele_order =
        esp_idf_sys::lcd_rgb_element_order_t_LCD_RGB_ELEMENT_ORDER_RGB;
    panel_cfg.data_endian = esp_idf_sys::lcd_rgb_data_endian_t_LCD_RGB_DATA_ENDIAN_BIG;
    panel_cfg.bits_per_pixel = 16;
    esp_check(
        unsafe { esp_idf_sys::esp_lcd_new_panel_st7789(io, &panel_cfg, &mut panel) },
        "esp_lcd_new_panel_st7789",
    )?;

    esp_check(unsafe { esp_idf_sys::esp_lcd_panel_reset(panel) }, "panel_reset")?;
    esp_check(unsafe { esp_idf_sys::esp_lcd_panel_init(panel) }, "panel_init")?;
    // Native-portrait controller driven in landscape.
    esp_check(unsafe { esp_idf_sys::esp_lcd_panel_swap_xy(panel, true) }, "panel_swap_xy")?;
    esp_check(
        unsafe { esp_idf_sys::esp_lcd_panel_mirror(panel, true, false) },
        "panel_mirror",
    )?;
    esp_check(
        unsafe { esp_idf_sys::esp_lcd_panel_invert_color(panel, true) },
        "panel_invert",
    )?;
    esp_check(
        unsafe { esp_idf_sys::esp_lcd_panel_disp_on_off(panel, true) },
        "disp_on",
    )?;

    info!("Display initialized OK");
    Ok(LcdContext { panel })
}

fn enable_backlight() {
    unsafe {
        let io_conf = esp_idf_sys::gpio_config_t {
            pin_bit_mask: 1u64 << (PIN_LCD_BL as u64),
            mode: esp_idf_sys::gpio_mode_t_GPIO_MODE_OUTPUT,
            pull_up_en: esp_idf_sys::gpio_pullup_t_GPIO_PULLUP_DISABLE,
            pull_down_en: esp_idf_sys::gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
            intr_type: esp_idf_sys::gpio_int_type_t_GPIO_INTR_DISABLE,
        };
        esp_idf_sys::gpio_config(&io_conf);
        esp_idf_sys::gpio_set_level(PIN_LCD_BL, 1);
    }
    info!("Backlight ON");
}

// ── Screens ─────────────────────────────────────────────────────────

fn draw_splash(fb: &mut Framebuffer, status: &str) {
    fb.clear_color(layout::BG);
    let cx = (fb.size().width as i32) / 2;
    let cy = (fb.size().height as i32) / 2;

    let title_style = MonoTextStyle::new(&PROFONT_24_POINT, layout::TEXT_HEADER);
    Text::with_alignment(
        "METAR Panel",
        Point::new(cx, cy - 40),
        title_style,
        Alignment::Center,
    )
    .draw(fb)
    .ok();

    let sub_style = MonoTextStyle::new(&PROFONT_14_POINT, layout::TEXT_CLOCK);
    Text::with_alignment(
        "aviationweather.gov",
        Point::new(cx, cy - 10),
        sub_style,
        Alignment::Center,
    )
    .draw(fb)
    .ok();

    let status_style = MonoTextStyle::new(&PROFONT_12_POINT, layout::TEXT_STATUS);
    Text::with_alignment(status, Point::new(cx, cy + 34), status_style, Alignment::Center)
        .draw(fb)
        .ok();
}

/// Redraw the whole screen: header (station, category badge, Zulu clock),
/// the METAR grid card, and the status footer.
#[allow(clippy::too_many_arguments)]
fn draw_screen(
    fb: &mut Framebuffer,
    grid: &TextGrid,
    station: &str,
    category: &str,
    clock: &str,
    status: &str,
    stale: bool,
) {
    use crate::layout::*;

    fb.clear_color(BG);
    draw_hline(fb, HEADER_LINE_Y, LINE_COLOR);

    let header_style = MonoTextStyle::new(&PROFONT_14_POINT, TEXT_HEADER);
    Text::new(station, Point::new(14, 24), header_style).draw(fb).ok();

    if !category.is_empty() {
        let cat_style = MonoTextStyle::new(&PROFONT_14_POINT, category_color(category));
        Text::new(category, Point::new(120, 24), cat_style).draw(fb).ok();
    }

    if !clock.is_empty() {
        let clock_style = MonoTextStyle::new(&PROFONT_14_POINT, TEXT_CLOCK);
        Text::with_alignment(
            clock,
            Point::new(SCREEN_W - 14, 24),
            clock_style,
            Alignment::Right,
        )
        .draw(fb)
        .ok();
    }

    let card_h = SCREEN_H - CARD_Y - 26;
    draw_card(
        fb,
        CARD_MARGIN,
        CARD_Y,
        SCREEN_W - 2 * CARD_MARGIN,
        card_h,
        CARD_RADIUS as u32,
        CARD_FILL,
        CARD_BORDER,
        1,
    );
    grid.draw(fb, Point::new(CARD_MARGIN + CARD_PAD_X, CARD_Y + CARD_PAD_Y));

    let status_style = MonoTextStyle::new(&PROFONT_10_POINT, TEXT_STATUS);
    Text::new(status, Point::new(14, STATUS_Y), status_style).draw(fb).ok();
    if stale {
        let stale_style = MonoTextStyle::new(&PROFONT_10_POINT, TEXT_STALE);
        Text::with_alignment(
            "STALE",
            Point::new(SCREEN_W - 14, STATUS_Y),
            stale_style,
            Alignment::Right,
        )
        .draw(fb)
        .ok();
    }
}

// ── Entry point ─────────────────────────────────────────────────────

fn main() -> Result<()> {
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("BOOT — metar_panel v{}", env!("CARGO_PKG_VERSION"));

    // ── 1. Display init + immediate splash screen ──
    let ctx = init_display()?;
    let mut fb = Framebuffer::new(framebuffer::FB_WIDTH, framebuffer::FB_HEIGHT);
    draw_splash(&mut fb, "Starting...");
    fb.flush_to_panel(ctx.panel);
    enable_backlight();

    // ── 2. Peripherals ──
    let peripherals = unsafe { Peripherals::new() };
    let sysloop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    // ── 3. NVS config ──
    let nvs = EspNvs::new(nvs_partition, config::NS, true)?;
    let cfg = config::Config::load(&nvs);

    let nvs = Arc::new(Mutex::new(nvs));
    let shared_cfg = Arc::new(Mutex::new(cfg.clone()));

    // ── 4. Console (serial interactive) ──
    console::spawn_console(nvs.clone(), shared_cfg.clone());

    // ── 5. WiFi ──
    let mut wifi_ok = false;
    let mut ip_address = String::new();
    let mut wifi_handle = if !cfg.wifi_ssid.is_empty() {
        draw_splash(&mut fb, &format!("Connecting to '{}'...", cfg.wifi_ssid));
        fb.flush_to_panel(ctx.panel);
        match wifi::connect_wifi(
            peripherals.modem,
            sysloop.clone(),
            &cfg.wifi_ssid,
            &cfg.wifi_pass,
        ) {
            Ok(result) => {
                if let Some(ip) = result.ip_address {
                    ip_address = ip;
                }
                wifi_ok = result.connected;
                Some(result.wifi)
            }
            Err(e) => {
                log::warn!("WiFi failed: {}", e);
                None
            }
        }
    } else {
        log::warn!("No WiFi SSID configured (use console: wifi set <ssid> <pass>)");
        None
    };

    // ── 6. NTP time sync (Zulu clock for the header) ──
    let _sntp = if wifi_ok {
        draw_splash(&mut fb, "Syncing time...");
        fb.flush_to_panel(ctx.panel);
        match time_sync::sync_time(&cfg.timezone) {
            Ok(sntp) => Some(sntp),
            Err(e) => {
                log::warn!("NTP sync failed: {}", e);
                None
            }
        }
    } else {
        None
    };

    // ── 7. Polling loop: fetch → reflow → render, fixed delays between ──
    let mut grid = TextGrid::new(cfg.line_width, cfg.line_height);
    info!(
        "Entering polling loop (station {}, {}x{} grid, every {}s)",
        cfg.station,
        grid.cols(),
        grid.rows(),
        cfg.refresh_secs
    );
    let mut last_report: Option<metar::MetarReport> = None;
    let mut last_success_at: Option<u64> = None;
    let mut status_text = String::new();
    let mut last_wifi_retry = now_secs();
    let mut consecutive_failures: u32 = 0;

    loop {
        // Reassociate when the link is down, at most once per retry window.
        if !wifi_ok
            && !cfg.wifi_ssid.is_empty()
            && now_secs().saturating_sub(last_wifi_retry) >= WIFI_RETRY_INTERVAL_SECS
        {
            last_wifi_retry = now_secs();
            if let Some(wifi) = wifi_handle.as_mut() {
                info!("WiFi retry window reached; attempting reconnect...");
                match wifi::reconnect_existing(wifi.as_mut(), sysloop.clone()) {
                    Ok(Some(ip)) => {
                        wifi_ok = true;
                        ip_address = ip;
                    }
                    Ok(None) => info!("WiFi reconnect did not succeed; retrying later"),
                    Err(e) => log::warn!("WiFi reconnect error: {}", e),
                }
            }
        }

        let verbose =
            consecutive_failures == 0 || debug_flags::is_on(&debug_flags::DEBUG_FETCH);
        if verbose {
            info!("METAR fetch starting...");
        }

        let sleep_secs = match metar::fetch_metar(&cfg.station, &cfg.http_user_agent) {
            Ok(report) => {
                consecutive_failures = 0;
                last_success_at = Some(now_secs());
                if debug_flags::is_on(&debug_flags::DEBUG_FETCH) {
                    info!(
                        "observation {} raw: {}",
                        report.observation_time, report.raw_text
                    );
                }

                // Reflow so no word straddles a grid row, then truncate the
                // expanded text to the grid's character budget before it is
                // handed to the display.
                let mut wrapped = match reflow::reflow(&report.raw_text, cfg.line_width) {
                    Ok(w) => w,
                    Err(e) => {
                        log::warn!("reflow failed: {}", e);
                        report.raw_text.clone()
                    }
                };
                truncate_at_boundary(&mut wrapped, grid.capacity());
                grid.clear();
                grid.print(&wrapped, 0);

                status_text = match time_sync::format_local_time() {
                    Some(t) => format!("updated {}  {}", t, ip_address),
                    None => format!("updated  {}", ip_address),
                };
                last_report = Some(report);
                cfg.refresh_secs as u64
            }
            Err(e) => {
                consecutive_failures = consecutive_failures.saturating_add(1);
                if consecutive_failures == 1
                    || consecutive_failures.is_multiple_of(FAILURE_WARN_EVERY)
                {
                    log::warn!(
                        "METAR fetch failed ({} consecutive): {}",
                        consecutive_failures,
                        e
                    );
                } else {
                    info!("METAR fetch failed ({} consecutive)", consecutive_failures);
                }

                // Keep the last good report on screen; show the fallback
                // only when there is nothing better.
                if last_report.is_none() {
                    grid.clear();
                    grid.print("NO DATA", 0);
                }
                status_text = format!("fetch failed: {}", e.root_cause());
                truncate_at_boundary(&mut status_text, 48);

                if let Some(wifi) = wifi_handle.as_ref() {
                    wifi_ok = wifi.is_connected().unwrap_or(false);
                }
                RETRY_SECS
            }
        };

        let (station_label, category) = match last_report.as_ref() {
            Some(r) if !r.station_id.is_empty() => {
                (r.station_id.clone(), r.flight_category.clone())
            }
            _ => (cfg.station.clone(), String::new()),
        };

        let stale = last_success_at
            .map(|t| now_secs().saturating_sub(t) > cfg.refresh_secs as u64 + STALE_AFTER_EXTRA_SECS)
            .unwrap_or(false);
        let clock = time_sync::format_zulu_time().unwrap_or_default();
        draw_screen(&mut fb, &grid, &station_label, &category, &clock, &status_text, stale);
        fb.flush_to_panel(ctx.panel);

        // Sleep in 1s ticks so a console "refresh now" wakes us early and
        // the header clock keeps ticking.
        let mut slept: u64 = 0;
        while slept < sleep_secs {
            if debug_flags::REQUEST_REFRESH.swap(false, Ordering::Relaxed) {
                info!("refresh requested from console");
                break;
            }
            std::thread::sleep(Duration::from_secs(1));
            slept += 1;

            if slept.is_multiple_of(CLOCK_REDRAW_SECS) {
                let stale = last_success_at
                    .map(|t| {
                        now_secs().saturating_sub(t)
                            > cfg.refresh_secs as u64 + STALE_AFTER_EXTRA_SECS
                    })
                    .unwrap_or(false);
                let clock = time_sync::format_zulu_time().unwrap_or_default();
                draw_screen(
                    &mut fb,
                    &grid,
                    &station_label,
                    &category,
                    &clock,
                    &status_text,
                    stale,
                );
                fb.flush_to_panel(ctx.panel);
            }
        }
    }
}
