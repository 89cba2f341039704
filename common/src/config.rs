//! Configuration parsing – reads a KEY=VALUE file (`rowling.conf`).
//!
//! Every key is optional; defaults reproduce the field unit's factory
//! settings (30 images, 1 s cadence, 1920x1080, JPEG quality 85,
//! button on BCM 17, 16x2 LCD at 0x27 on i2c-1).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

/// Which two-line sink the status messages go to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayKind {
    /// HD44780 character LCD behind a PCF8574 i2c backpack.
    Lcd,
    /// Status lines become log records (bench runs without an LCD).
    Log,
}

/// Appliance configuration.
#[derive(Debug, Clone)]
pub struct Config {
    // ── capture ──────────────────────────────────────────────────────
    pub max_images: u32,
    pub capture_period_secs: f64,
    /// Estimated time a single capture takes; subtracted from the period.
    pub capture_latency_secs: f64,
    pub resolution: (u32, u32),
    pub jpeg_quality: u8,
    pub camera_still_cmd: String,
    pub camera_preview_cmd: String,
    /// Directory the per-session folders are created in.
    pub base_dir: PathBuf,

    // ── trigger ──────────────────────────────────────────────────────
    pub button_pin: u32,
    pub gpio_chip: String,
    pub button_debounce_ms: u64,
    /// Edge monitor command line; `{chip}` and `{pin}` are substituted.
    pub button_monitor: String,
    pub trigger_pause_ms: u64,
    pub start_poll_ms: u64,

    // ── display ──────────────────────────────────────────────────────
    pub display: DisplayKind,
    pub lcd_i2c_bus: u8,
    pub lcd_i2c_addr: u16,
    pub lcd_cols: usize,
    pub lcd_rows: usize,
    /// How long informative messages stay up before the next step.
    pub message_hold_secs: u64,

    // ── network ──────────────────────────────────────────────────────
    pub connectivity_probe: String,
    pub connectivity_timeout_secs: u64,
    pub connectivity_retry_secs: u64,
    pub dashboard_url: String,
    pub drive_folder_link: String,
    pub credentials_file: PathBuf,
}

impl Config {
    /// Default config path.
    pub fn default_path() -> &'static str {
        "/etc/rowling/rowling.conf"
    }

    /// Pause after each capture so the whole iteration lasts roughly one
    /// period. Never negative; slower captures are not compensated.
    pub fn cadence_sleep(&self) -> Duration {
        Duration::from_secs_f64((self.capture_period_secs - self.capture_latency_secs).max(0.0))
    }

    pub fn message_hold(&self) -> Duration {
        Duration::from_secs(self.message_hold_secs)
    }

    /// Service-account file, resolved against `base_dir` when relative.
    pub fn credentials_path(&self) -> PathBuf {
        if self.credentials_file.is_absolute() {
            self.credentials_file.clone()
        } else {
            self.base_dir.join(&self.credentials_file)
        }
    }

    /// Drive ID of the parent folder, taken from its sharable link.
    pub fn parent_folder_id(&self) -> &str {
        folder_id_from_link(&self.drive_folder_link)
    }

    /// The edge monitor command split into program and arguments.
    pub fn button_monitor_argv(&self) -> Vec<String> {
        self.button_monitor
            .split_whitespace()
            .map(|arg| {
                arg.replace("{chip}", &self.gpio_chip)
                    .replace("{pin}", &self.button_pin.to_string())
            })
            .collect()
    }
}

/// `https://drive.google.com/drive/folders/<ID>?usp=drive_link` → `<ID>`.
pub fn folder_id_from_link(link: &str) -> &str {
    let last = link.trim_end_matches('/').rsplit('/').next().unwrap_or(link);
    last.split('?').next().unwrap_or(last)
}

/// Read and parse a config file.
pub fn load(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read config: {}", path.display()))?;

    let config = parse(&text);
    info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Build a [`Config`] from `KEY=VALUE` text, falling back to defaults for
/// anything missing or unparsable.
pub fn parse(text: &str) -> Config {
    let map = parse_conf(text);

    let get = |key: &str| -> Option<String> { map.get(key).cloned().filter(|v| !v.is_empty()) };
    let get_f64 = |key: &str, default: f64| -> f64 {
        get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    };
    let get_u64 = |key: &str, default: u64| -> u64 {
        get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    };

    let resolution = get("RESOLUTION")
        .and_then(|v| parse_resolution(&v))
        .unwrap_or((1920, 1080));

    let display = match get("DISPLAY").as_deref() {
        Some(v) if v.eq_ignore_ascii_case("log") => DisplayKind::Log,
        Some(v) if !v.eq_ignore_ascii_case("lcd") => {
            warn!("Unknown DISPLAY={v}, using lcd");
            DisplayKind::Lcd
        }
        _ => DisplayKind::Lcd,
    };

    let lcd_i2c_addr = get("LCD_I2C_ADDR")
        .and_then(|v| parse_int(&v))
        .and_then(|v| u16::try_from(v).ok())
        .unwrap_or(0x27);

    let base_dir = get("BASE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(executable_dir);

    Config {
        max_images: get_u64("MAX_IMAGES", 30).max(1) as u32,
        capture_period_secs: get_f64("CAPTURE_PERIOD_SECS", 1.0),
        capture_latency_secs: get_f64("CAPTURE_LATENCY_SECS", 0.4),
        resolution,
        jpeg_quality: get_u64("JPEG_QUALITY", 85).clamp(1, 100) as u8,
        camera_still_cmd: get("CAMERA_STILL_CMD").unwrap_or_else(|| "rpicam-still".into()),
        camera_preview_cmd: get("CAMERA_PREVIEW_CMD").unwrap_or_else(|| "rpicam-hello".into()),
        base_dir,

        button_pin: get_u64("BUTTON_PIN", 17) as u32,
        gpio_chip: get("GPIO_CHIP").unwrap_or_else(|| "gpiochip0".into()),
        button_debounce_ms: get_u64("BUTTON_DEBOUNCE_MS", 3000),
        button_monitor: get("BUTTON_MONITOR")
            .unwrap_or_else(|| "gpiomon --falling-edge --bias=pull-up {chip} {pin}".into()),
        trigger_pause_ms: get_u64("TRIGGER_PAUSE_MS", 2000),
        start_poll_ms: get_u64("START_POLL_MS", 100),

        display,
        lcd_i2c_bus: get_u64("LCD_I2C_BUS", 1) as u8,
        lcd_i2c_addr,
        lcd_cols: get_u64("LCD_COLS", 16) as usize,
        lcd_rows: get_u64("LCD_ROWS", 2) as usize,
        message_hold_secs: get_u64("MESSAGE_HOLD_SECS", 2),

        connectivity_probe: get("CONNECTIVITY_PROBE").unwrap_or_else(|| "8.8.8.8:53".into()),
        connectivity_timeout_secs: get_u64("CONNECTIVITY_TIMEOUT_SECS", 5),
        connectivity_retry_secs: get_u64("CONNECTIVITY_RETRY_SECS", 1),
        dashboard_url: get("DASHBOARD_URL").unwrap_or_else(|| {
            "http://rowling-backend3.eastus.azurecontainer.io:8000/api/v1/update_car_state".into()
        }),
        drive_folder_link: get("DRIVE_FOLDER_LINK").unwrap_or_default(),
        credentials_file: PathBuf::from(
            get("CREDENTIALS_FILE").unwrap_or_else(|| "credentials.json".into()),
        ),
    }
}

/// Parse `KEY=VALUE` lines into a map, stripping optional double-quotes.
fn parse_conf(text: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, val)) = line.split_once('=') {
            let key = key.trim();
            let val = val.trim().trim_matches('"');
            map.insert(key.to_string(), val.to_string());
        }
    }
    map
}

/// `1920x1080` → `(1920, 1080)`.
fn parse_resolution(value: &str) -> Option<(u32, u32)> {
    let (w, h) = value.split_once(['x', 'X'])?;
    let w = w.trim().parse().ok()?;
    let h = h.trim().parse().ok()?;
    (w > 0 && h > 0).then_some((w, h))
}

/// Decimal or `0x`-prefixed hexadecimal.
fn parse_int(value: &str) -> Option<u64> {
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

fn executable_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

// ─── tests ───────────────────────────────────────────────────────────────
