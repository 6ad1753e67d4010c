use ratatui::style::Color;

/// Symbol used to indicate the selected line.
pub const RIGHT_ARROW: &str = "▶";
/// Markers in front of collapse headers.
pub const FOLDED_MARKER: &str = "▸ ";
pub const EXPANDED_MARKER: &str = "▾ ";

/// Common colors
pub const GRAY_COLOR: Color = Color::Indexed(237);
pub const BLACK_COLOR: Color = Color::Indexed(234);
pub const WHITE_COLOR: Color = Color::White;

// Footer
pub const FOOTER_BG: Color = GRAY_COLOR;
pub const STATUS_WARNING_FG: Color = Color::Yellow;
pub const LEVEL_OFF_FG: Color = Color::DarkGray;

// Scrollbar
pub const SCROLLBAR_FG: Color = GRAY_COLOR;

// Search colors
pub const SEARCH_MODE_FG: Color = BLACK_COLOR;
pub const SEARCH_MODE_BG: Color = Color::Yellow;

// Rename colors
pub const RENAME_MODE_FG: Color = BLACK_COLOR;
pub const RENAME_MODE_BG: Color = Color::Cyan;

// Log levels
pub const ERROR_FG: Color = Color::Red;
pub const WARNING_FG: Color = Color::Yellow;
pub const INFO_FG: Color = WHITE_COLOR;
pub const DEBUG_FG: Color = Color::DarkGray;
pub const UNKNOWN_FG: Color = Color::Gray;
pub const TIMESTAMP_FG: Color = Color::Indexed(108);
pub const NOTIFICATION_FG: Color = Color::Cyan;

// Groups
pub const GROUP_BORDER: Color = Color::Cyan;
pub const GROUP_COUNT_FG: Color = Color::Yellow;
pub const GROUP_RENAMED_FG: Color = Color::Green;
pub const MESSAGE_DATE_FG: Color = Color::Gray;

// Help
pub const HELP_BG: Color = Color::Blue;
pub const HELP_BORDER_FG: Color = Color::White;
pub const HELP_HEADER_FG: Color = Color::Yellow;

// Messages
pub const MESSAGE_INFO_FG: Color = WHITE_COLOR;
pub const MESSAGE_BORDER: Color = Color::Blue;
pub const MESSAGE_ERROR_FG: Color = Color::Red;
