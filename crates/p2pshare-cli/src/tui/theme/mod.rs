//! TUI theme system.

use ratatui::style::Color;

mod dark;
mod light;

/// Theme configuration for the TUI.
#[derive(Debug, Clone)]
pub struct Theme {
    /// Theme name
    pub name: String,

    /// Accent color for the header and highlights
    pub accent: Color,

    // semantic
    /// Success indicators
    pub success: Color,
    /// Warning indicators
    pub warning: Color,
    /// Error indicators
    pub error: Color,
    /// Information indicators
    pub info: Color,

    /// Border color (unfocused)
    pub border: Color,
    /// Border color (focused)
    pub border_focused: Color,
    /// Selection background
    pub selection: Color,

    // text
    /// Primary text color
    pub text_primary: Color,
    /// Secondary text color
    pub text_secondary: Color,
    /// Muted/disabled text color
    pub text_muted: Color,

    /// Progress bar fill color
    pub progress_bar: Color,
    /// Progress bar background color
    pub progress_bar_bg: Color,
}

impl Theme {
    /// Create the dark theme.
    pub fn dark() -> Self {
        dark::theme()
    }

    /// Create the light theme.
    pub fn light() -> Self {
        light::theme()
    }

    /// Create a theme by name. Unknown names fall back to dark.
    pub fn from_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "light" => Self::light(),
            _ => Self::dark(),
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::dark()
    }
}
