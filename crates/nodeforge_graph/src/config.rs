// SPDX-License-Identifier: MIT OR Apache-2.0
//! Editor configuration.
//!
//! Every tunable read by the viewport, layout, hit testing and interaction
//! lives here. Stored as RON alongside the host's other settings.

use crate::layout::{Layout, LineStyle};
use crate::viewport::Easing;
use serde::{Deserialize, Serialize};

/// Error loading or saving configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// RON parse error
    #[error("Failed to parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// RON serialization error
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] ron::Error),

    /// Values that cannot work together
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Editor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Smallest allowed scale
    pub min_zoom: f32,
    /// Largest allowed scale
    pub max_zoom: f32,
    /// Scale multiplier per wheel notch
    pub zoom_step: f32,
    /// World-space padding around zoom-to-fit bounds
    pub fit_padding: f32,
    /// Node header height (world units)
    pub header_height: f32,
    /// Offset of the first pin from a node's left edge (world units)
    pub pin_margin: f32,
    /// Distance between pins (world units)
    pub pin_spacing: f32,
    /// Pin radius (world units)
    pub pin_radius: f32,
    /// Pin hit radius as a multiple of the drawn radius
    pub pin_hit_scale: f32,
    /// Max pointer distance to a connection curve for a hit (pixels)
    pub connection_hit_threshold: f32,
    /// Magnetic snap radius while dragging a wire (pixels)
    pub snap_radius: f32,
    /// Reroute hit radius (pixels)
    pub reroute_radius: f32,
    /// Group header height (world units)
    pub group_header_height: f32,
    /// Group resize handle edge length (world units)
    pub group_resize_handle: f32,
    /// Smallest size a group can be resized to (world units)
    pub group_min_size: [f32; 2],
    /// Connection routing style
    pub line_style: LineStyle,
    /// Bezier control-point distance (world units)
    pub bezier_curvature: f32,
    /// Manhattan corner radius (world units)
    pub corner_radius: f32,
    /// Viewport transition length in seconds
    pub transition_duration: f32,
    /// Viewport transition easing
    pub transition_easing: Easing,
    /// Snap dragged nodes to the grid on release
    pub snap_to_grid: bool,
    /// Grid size for snapping (world units)
    pub grid_size: f32,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            min_zoom: 0.1,
            max_zoom: 4.0,
            zoom_step: 1.1,
            fit_padding: 50.0,
            header_height: 24.0,
            pin_margin: 16.0,
            pin_spacing: 22.0,
            pin_radius: 6.0,
            pin_hit_scale: 1.5,
            connection_hit_threshold: 6.0,
            snap_radius: 24.0,
            reroute_radius: 8.0,
            group_header_height: 24.0,
            group_resize_handle: 12.0,
            group_min_size: [80.0, 48.0],
            line_style: LineStyle::Bezier,
            bezier_curvature: 50.0,
            corner_radius: 8.0,
            transition_duration: 0.25,
            transition_easing: Easing::EaseInOut,
            snap_to_grid: false,
            grid_size: 20.0,
        }
    }
}

impl EditorConfig {
    /// Parse from RON, filling missing fields with defaults
    pub fn from_ron(s: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty RON
    pub fn to_ron(&self) -> Result<String, ConfigError> {
        Ok(ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?)
    }

    /// Reject settings the components cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_zoom > 0.0 && self.min_zoom <= self.max_zoom) {
            return Err(ConfigError::Invalid(format!(
                "zoom range {}..{} is empty or non-positive",
                self.min_zoom, self.max_zoom
            )));
        }
        if self.zoom_step <= 1.0 {
            return Err(ConfigError::Invalid("zoom_step must be greater than 1".to_string()));
        }
        if self.grid_size <= 0.0 {
            return Err(ConfigError::Invalid("grid_size must be positive".to_string()));
        }
        Ok(())
    }

    /// Layout metrics
    pub fn layout(&self) -> Layout {
        Layout::from_config(self)
    }

    /// Snap a world position to the grid if snapping is on
    pub fn snap_position(&self, pos: egui::Pos2) -> egui::Pos2 {
        if self.snap_to_grid {
            egui::Pos2::new(
                (pos.x / self.grid_size).round() * self.grid_size,
                (pos.y / self.grid_size).round() * self.grid_size,
            )
        } else {
            pos
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(EditorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_serialization() {
        let mut config = EditorConfig::default();
        config.snap_to_grid = true;
        config.line_style = LineStyle::Manhattan;
        let ron_str = config.to_ron().unwrap();
        let loaded = EditorConfig::from_ron(&ron_str).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let loaded = EditorConfig::from_ron("(max_zoom: 8.0)").unwrap();
        assert_eq!(loaded.max_zoom, 8.0);
        assert_eq!(loaded.min_zoom, EditorConfig::default().min_zoom);
    }

    #[test]
    fn test_rejects_inverted_zoom_range() {
        assert!(matches!(
            EditorConfig::from_ron("(min_zoom: 2.0, max_zoom: 1.0)"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_grid_snap() {
        let mut config = EditorConfig::default();
        let p = egui::Pos2::new(31.0, 49.0);
        assert_eq!(config.snap_position(p), p);
        config.snap_to_grid = true;
        assert_eq!(config.snap_position(p), egui::Pos2::new(40.0, 40.0));
    }
}
