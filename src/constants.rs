// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use serde::{Deserialize, Serialize};

/// Directory name used under the config and video directories
pub const APP_DIR: &str = "camera-session";

/// Name of the thread that receives hardware callbacks
pub const EXECUTOR_THREAD_NAME: &str = "CameraBackground";

/// Widest recording size picked by default
pub const MAX_RECORD_WIDTH: u32 = 1920;

/// Recording frame rate
pub const DEFAULT_FRAME_RATE: u32 = 30;

/// Fixed recording bitrate used unless a preset is chosen
pub const DEFAULT_BITRATE_KBPS: u32 = 10_000;

/// Recording file names are `video_<timestamp>.<ext>`
pub const RECORDING_PREFIX: &str = "video_";

/// Timestamp format of recording file names (millisecond resolution)
pub const RECORDING_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S_%3f";

/// Video encoder bitrate presets
///
/// These presets define the target bitrate for video encoding based on resolution.
/// Users can choose between quality and file size trade-offs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BitratePreset {
    /// Low bitrate - smaller files, reduced quality
    Low,
    /// Medium bitrate - balanced quality and file size (default)
    #[default]
    Medium,
    /// High bitrate - larger files, better quality
    High,
}

impl BitratePreset {
    /// All preset variants
    pub const ALL: [BitratePreset; 3] = [
        BitratePreset::Low,
        BitratePreset::Medium,
        BitratePreset::High,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            BitratePreset::Low => "Low",
            BitratePreset::Medium => "Medium",
            BitratePreset::High => "High",
        }
    }

    /// Bitrate in kbps for a recording of the given width
    ///
    /// - SD (640x480): Low=1, Medium=2, High=4 Mbps
    /// - HD (1280x720): Low=2.5, Medium=5, High=10 Mbps
    /// - Full HD (1920x1080): Low=4, Medium=8, High=16 Mbps
    /// - 2K (2560x1440): Low=8, Medium=16, High=32 Mbps
    /// - 4K (3840x2160): Low=15, Medium=30, High=50 Mbps
    pub fn bitrate_kbps(&self, width: u32) -> u32 {
        self.bitrate_for_tier(get_resolution_tier(width))
    }

    /// Bitrate for a specific resolution tier
    pub fn bitrate_for_tier(&self, tier: ResolutionTier) -> u32 {
        match (tier, self) {
            (ResolutionTier::SD, BitratePreset::Low) => 1_000,
            (ResolutionTier::SD, BitratePreset::Medium) => 2_000,
            (ResolutionTier::SD, BitratePreset::High) => 4_000,
            (ResolutionTier::HD, BitratePreset::Low) => 2_500,
            (ResolutionTier::HD, BitratePreset::Medium) => 5_000,
            (ResolutionTier::HD, BitratePreset::High) => 10_000,
            (ResolutionTier::FullHD, BitratePreset::Low) => 4_000,
            (ResolutionTier::FullHD, BitratePreset::Medium) => 8_000,
            (ResolutionTier::FullHD, BitratePreset::High) => 16_000,
            (ResolutionTier::TwoK, BitratePreset::Low) => 8_000,
            (ResolutionTier::TwoK, BitratePreset::Medium) => 16_000,
            (ResolutionTier::TwoK, BitratePreset::High) => 32_000,
            (ResolutionTier::FourK, BitratePreset::Low) => 15_000,
            (ResolutionTier::FourK, BitratePreset::Medium) => 30_000,
            (ResolutionTier::FourK, BitratePreset::High) => 50_000,
        }
    }
}

/// Resolution tiers for bitrate calculation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTier {
    /// SD: 640x480 and below
    SD,
    /// HD: 1280x720
    HD,
    /// Full HD: 1920x1080
    FullHD,
    /// 2K: 2560x1440
    TwoK,
    /// 4K: 3840x2160 and above
    FourK,
}

/// Get the resolution tier for a given width
pub fn get_resolution_tier(width: u32) -> ResolutionTier {
    match width {
        w if w >= 3840 => ResolutionTier::FourK,
        w if w >= 2560 => ResolutionTier::TwoK,
        w if w >= 1920 => ResolutionTier::FullHD,
        w if w >= 1280 => ResolutionTier::HD,
        _ => ResolutionTier::SD,
    }
}

/// Format bitrate for display (e.g., "8 Mbps" or "2.5 Mbps")
pub fn format_bitrate(kbps: u32) -> String {
    let mbps = kbps as f64 / 1000.0;
    if mbps == mbps.floor() {
        format!("{} Mbps", mbps as u32)
    } else {
        format!("{:.1} Mbps", mbps)
    }
}

/// Short label for a size width, as shown next to device sizes
pub fn get_resolution_label(width: u32) -> Option<&'static str> {
    match width {
        w if w >= 7680 => Some("8K"), // 7680x4320
        w if w >= 6144 => Some("6K"), // 6144x3456
        w if w >= 5120 => Some("5K"), // 5120x2880
        w if w >= 3840 => Some("4K"), // 3840x2160
        w if w >= 2560 => Some("2K"), // 2560x1440
        w if w >= 1920 => Some("HD"), // 1920x1080
        w if w >= 640 => Some("SD"),  // 640x480
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_labels() {
        assert_eq!(get_resolution_label(3840), Some("4K"));
        assert_eq!(get_resolution_label(1920), Some("HD"));
        assert_eq!(get_resolution_label(640), Some("SD"));
        assert_eq!(get_resolution_label(320), None);
    }

    #[test]
    fn test_bitrate_follows_tier() {
        assert_eq!(BitratePreset::Medium.bitrate_kbps(1920), 8_000);
        assert_eq!(BitratePreset::Low.bitrate_kbps(1280), 2_500);
        assert_eq!(BitratePreset::High.bitrate_kbps(640), 4_000);
    }
}
