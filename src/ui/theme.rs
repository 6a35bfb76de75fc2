use ratatui::style::Color;

pub const BG_PRIMARY: Color = Color::Rgb(0, 0, 0);
pub const BG_PANEL: Color = Color::Rgb(12, 12, 12);
pub const FG_PRIMARY: Color = Color::Rgb(190, 190, 190);
pub const FG_DIM: Color = Color::Rgb(128, 128, 128);

pub const BAR_BG: Color = Color::Rgb(23, 52, 127);
pub const BAR_TEXT: Color = Color::Rgb(235, 240, 255);
pub const BAR_HIGHLIGHT_BG: Color = Color::Rgb(73, 102, 177);
pub const BAR_ERROR_BG: Color = Color::Rgb(127, 29, 29);

pub const PROMPT_BG: Color = Color::Rgb(79, 79, 79);
pub const PROMPT_BORDER: Color = Color::Rgb(208, 208, 208);

pub const BORDER_IDLE: Color = Color::Rgb(61, 120, 120);
pub const BORDER_FOCUS: Color = Color::Rgb(187, 94, 0);

pub const ROLE_USER: Color = Color::Cyan;
pub const ROLE_ASSISTANT: Color = Color::Rgb(120, 200, 120);
pub const ROLE_SYSTEM: Color = Color::Yellow;
pub const PAYLOAD_FG: Color = Color::Rgb(200, 180, 110);
