use ratatui::style::Color;
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct Theme {
    pub timeline_bg: Color,
    pub card_bg: Color,
    pub status_bg: Color,
    pub text_fg: Color,
    pub muted_fg: Color,
    pub running_fg: Color,
    pub completed_fg: Color,
    pub failed_fg: Color,
    pub hero_fg: Color,
    pub discarded_fg: Color,
    pub selected_bg: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            timeline_bg: Color::Rgb(44, 44, 44),
            card_bg: Color::Rgb(62, 62, 62),
            status_bg: Color::Rgb(36, 36, 36),
            text_fg: Color::Rgb(225, 225, 225),
            muted_fg: Color::Rgb(185, 185, 185),
            running_fg: Color::Rgb(90, 145, 200),
            completed_fg: Color::Rgb(120, 190, 120),
            failed_fg: Color::Rgb(220, 100, 100),
            hero_fg: Color::Rgb(255, 255, 255),
            discarded_fg: Color::Rgb(110, 110, 110),
            selected_bg: Color::Rgb(70, 80, 95),
        }
    }
}

impl Theme {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        let cfg: ThemeToml = toml::from_str(s)?;
        Ok(Self::from_overrides(&cfg))
    }

    /// Applies the colors present in `cfg` over the defaults.
    pub fn from_overrides(cfg: &ThemeToml) -> Self {
        let base = Self::default();
        let pick = |value: &Option<RgbToml>, fallback: Color| {
            value.as_ref().map_or(fallback, RgbToml::to_color)
        };
        Self {
            timeline_bg: pick(&cfg.timeline_bg, base.timeline_bg),
            card_bg: pick(&cfg.card_bg, base.card_bg),
            status_bg: pick(&cfg.status_bg, base.status_bg),
            text_fg: pick(&cfg.text_fg, base.text_fg),
            muted_fg: pick(&cfg.muted_fg, base.muted_fg),
            running_fg: pick(&cfg.running_fg, base.running_fg),
            completed_fg: pick(&cfg.completed_fg, base.completed_fg),
            failed_fg: pick(&cfg.failed_fg, base.failed_fg),
            hero_fg: pick(&cfg.hero_fg, base.hero_fg),
            discarded_fg: pick(&cfg.discarded_fg, base.discarded_fg),
            selected_bg: pick(&cfg.selected_bg, base.selected_bg),
        }
    }
}

/// `[theme]` table of the config file. Every color is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ThemeToml {
    timeline_bg: Option<RgbToml>,
    card_bg: Option<RgbToml>,
    status_bg: Option<RgbToml>,
    text_fg: Option<RgbToml>,
    muted_fg: Option<RgbToml>,
    running_fg: Option<RgbToml>,
    completed_fg: Option<RgbToml>,
    failed_fg: Option<RgbToml>,
    hero_fg: Option<RgbToml>,
    discarded_fg: Option<RgbToml>,
    selected_bg: Option<RgbToml>,
}

#[derive(Debug, Clone, Deserialize)]
struct RgbToml {
    r: u8,
    g: u8,
    b: u8,
}

impl RgbToml {
    fn to_color(&self) -> Color {
        Color::Rgb(self.r, self.g, self.b)
    }
}
