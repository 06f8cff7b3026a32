use std::fs;
use std::path::{Path, PathBuf};

use image::Rgb;

use crate::error::{Result, SketchError};
use crate::types::SketchConfig;

/// `prefix_YYYYMMDD_HHMMSS.ext` in local time.
pub fn timestamped_filename(prefix: &str, ext: &str) -> String {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    format!("{prefix}_{stamp}.{ext}")
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Parse `#RRGGBB` (the leading `#` is optional).
pub fn hex_to_rgb(hex: &str) -> Result<Rgb<u8>> {
    let digits = hex.trim().trim_start_matches('#');
    if digits.len() != 6 || !digits.is_ascii() {
        return Err(SketchError::InvalidColor(hex.to_string()));
    }
    let channel = |i: usize| {
        u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| SketchError::InvalidColor(hex.to_string()))
    };
    Ok(Rgb([channel(0)?, channel(2)?, channel(4)?]))
}

pub fn rgb_to_hex(color: Rgb<u8>) -> String {
    format!("#{:02x}{:02x}{:02x}", color[0], color[1], color[2])
}

/// Load a JSON config, falling back to defaults for a missing file and for
/// any field the file leaves out.
pub fn load_config(path: &Path) -> Result<SketchConfig> {
    if !path.exists() {
        return Ok(SketchConfig::default());
    }
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

pub fn save_config(config: &SketchConfig, path: &Path) -> Result<()> {
    ensure_parent_dir(path)?;
    fs::write(path, serde_json::to_string_pretty(config)?)?;
    Ok(())
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Create `dir` if needed. Failures are logged, not returned; the write that
/// follows will report them properly.
pub fn ensure_output_dir(dir: &Path) -> PathBuf {
    if let Err(e) = fs::create_dir_all(dir) {
        log::warn!("failed to create output dir {:?}: {}", dir, e);
    }
    dir.to_path_buf()
}
