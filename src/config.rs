use crate::layout::{Group, LayoutAnchor, zoom_level};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Shared origin of the three group trees (LUCA), in map degrees.
pub const LUCA_X: f64 = 0.0;
pub const LUCA_Y: f64 = -4.226497;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayoutConfig {
    /// Radius at which zoom level 0 starts: `zoom = ceil(log2(zoom_base / r))`.
    pub zoom_base: f64,
    pub archaea: AnchorConfig,
    pub eukaryotes: AnchorConfig,
    pub bacteria: AnchorConfig,
    pub luca_x: f64,
    pub luca_y: f64,
    /// Zoom level stored on the branch joining LUCA to a group root.
    pub luca_branch_zoom: i32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            zoom_base: 30.0,
            archaea: AnchorConfig {
                x: 6.0,
                y: 9.660254 - 10.0,
                angle: 30.0,
                radius: 10.0,
            },
            eukaryotes: AnchorConfig {
                x: -6.0,
                y: 9.660254 - 10.0,
                angle: 150.0,
                radius: 10.0,
            },
            bacteria: AnchorConfig {
                x: 0.0,
                y: -11.0,
                angle: 270.0,
                radius: 10.0,
            },
            luca_x: LUCA_X,
            luca_y: LUCA_Y,
            luca_branch_zoom: 4,
        }
    }
}

impl LayoutConfig {
    pub fn anchor(&self, group: Group) -> LayoutAnchor {
        let cfg = match group {
            Group::Archaea => &self.archaea,
            Group::Eukaryotes => &self.eukaryotes,
            Group::Bacteria => &self.bacteria,
        };
        LayoutAnchor {
            group,
            x: cfg.x,
            y: cfg.y,
            angle: cfg.angle,
            radius: cfg.radius,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AnchorConfig {
    pub x: f64,
    pub y: f64,
    pub angle: f64,
    pub radius: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExportConfig {
    /// Added to the layout zoom in the feature tables.
    pub zoom_offset: i32,
    /// `suggest_weight = suggest_weight_base - len(sci_name)`.
    pub suggest_weight_base: i64,
    /// Zoom given to the LUCA row of the merged table.
    pub luca_zoom: i32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            zoom_offset: 4,
            suggest_weight_base: 300,
            luca_zoom: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub layout: LayoutConfig,
    pub export: ExportConfig,
    /// Language tags of the localized names and ranks. The first one is the
    /// language of the taxonomy dump itself.
    pub languages: Vec<String>,
    pub simplify: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            layout: LayoutConfig::default(),
            export: ExportConfig::default(),
            languages: vec!["en".to_string(), "fr".to_string()],
            simplify: false,
        }
    }
}

impl Config {
    pub fn primary_language(&self) -> &str {
        self.languages.first().map(String::as_str).unwrap_or("en")
    }
}

/// Loads a config file. JSON5 is accepted, so plain JSON works as well.
/// Missing keys fall back to the defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };

    let contents = std::fs::read_to_string(path)?;
    let config: Config = json5::from_str(&contents)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> anyhow::Result<()> {
    if config.languages.is_empty() {
        anyhow::bail!("at least one language is required");
    }
    if !(config.layout.zoom_base.is_finite() && config.layout.zoom_base > 0.0) {
        anyhow::bail!("zoomBase must be positive, got {}", config.layout.zoom_base);
    }
    for group in Group::ALL {
        let anchor = config.layout.anchor(group);
        if !(anchor.radius.is_finite() && anchor.radius > 0.0) {
            anyhow::bail!("{} anchor radius must be positive", group.name());
        }
        if zoom_level(config.layout.zoom_base, anchor.radius).is_none() {
            anyhow::bail!(
                "{} anchor radius {} is too small for zoomBase {}",
                group.name(),
                anchor.radius,
                config.layout.zoom_base
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_group_anchors() {
        let config = Config::default();
        let bacteria = config.layout.anchor(Group::Bacteria);
        assert_eq!((bacteria.x, bacteria.y), (0.0, -11.0));
        assert_eq!(bacteria.angle, 270.0);
        assert_eq!(config.primary_language(), "en");
    }

    #[test]
    fn loads_partial_json5() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "{{ // comments are fine\n layout: {{ zoomBase: 60, bacteria: {{ x: 1, y: 2, angle: 90, radius: 5 }} }}, languages: ['en'] }}"
        )
        .unwrap();
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.layout.zoom_base, 60.0);
        assert_eq!(config.layout.anchor(Group::Bacteria).radius, 5.0);
        assert_eq!(config.layout.archaea.angle, 30.0);
        assert_eq!(config.languages, vec!["en".to_string()]);
        assert_eq!(config.export.zoom_offset, 4);
    }

    #[test]
    fn rejects_empty_language_list() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ \"languages\": [] }}").unwrap();
        assert!(load_config(Some(file.path())).is_err());
    }

    #[test]
    fn rejects_radius_without_zoom_level() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "{{ layout: {{ archaea: {{ x: 0, y: 0, angle: 30, radius: 1e-308 }} }} }}"
        )
        .unwrap();
        let err = load_config(Some(file.path())).unwrap_err();
        assert!(format!("{err:#}").contains("too small"), "{err:#}");
    }
}
