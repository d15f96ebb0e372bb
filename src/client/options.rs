//! Optional arguments for the convenience commands
//!
//! Every struct implements `Default`; the defaults match what the server
//! assumes when a parameter is left out.

/// Position relative to a widget's top-left corner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Mouse button for `click`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn as_str(&self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        }
    }
}

/// Options for `get_tree`
#[derive(Debug, Clone, Default)]
pub struct TreeOptions {
    /// Subtree root selector; whole application when unset
    pub root: Option<String>,
    /// Maximum depth; unlimited when unset
    pub depth: Option<u32>,
    /// Include hidden widgets
    pub include_invisible: bool,
}

/// Options for `screenshot`
#[derive(Debug, Clone, Default)]
pub struct ScreenshotOptions {
    /// Widget to capture; whole window when unset
    pub target: Option<String>,
    /// Image format; server default (png) when unset
    pub format: Option<String>,
}

/// Options for `click`
#[derive(Debug, Clone, Default)]
pub struct ClickOptions {
    /// Defaults to the left button
    pub button: MouseButton,
    /// Click position; widget centre when unset
    pub pos: Option<Point>,
    /// Ask the server to report which properties changed
    pub track_changes: bool,
}

/// Options for `type`
#[derive(Debug, Clone, Default)]
pub struct TypeOptions {
    /// Clear existing text before typing
    pub clear_first: bool,
}

/// Options for `key`
#[derive(Debug, Clone, Default)]
pub struct KeyOptions {
    /// Modifier names such as `ctrl`, `shift`; omitted when empty
    pub modifiers: Vec<String>,
}

/// Options for `scroll`
#[derive(Debug, Clone, Copy, Default)]
pub struct ScrollOptions {
    pub delta_x: i32,
    pub delta_y: i32,
}

/// Options for `drag`
#[derive(Debug, Clone, Copy, Default)]
pub struct DragOptions {
    /// Grab position on the source widget
    pub from_pos: Option<Point>,
    /// Drop position on the destination widget
    pub to_pos: Option<Point>,
}

/// Options for `find`
#[derive(Debug, Clone, Copy)]
pub struct FindOptions {
    /// Upper bound on returned matches (default 100)
    pub max_results: u32,
    /// Only report visible widgets
    pub visible_only: bool,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            max_results: 100,
            visible_only: false,
        }
    }
}

/// Options for `wait`
#[derive(Debug, Clone)]
pub struct WaitOptions {
    /// Condition name understood by the server (default `exists`)
    pub condition: String,
    /// Server-side wait budget (default 5000)
    pub timeout_ms: u64,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            condition: "exists".to_string(),
            timeout_ms: 5000,
        }
    }
}
