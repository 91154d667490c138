//! Terminal User Interface module
//!
//! Login form, chat view with markdown answers, and a documents browser.

mod app;
mod input;
mod picker;
mod progress;
mod slash_commands;
mod theme;
mod widgets;

pub use app::App;
pub use picker::{Picker, PickerItem};
pub use progress::{progress_bar, spinner};
pub use slash_commands::{parse_command, ChatCommand, Invocation, ParsedCommand, SlashPopup};
pub use theme::{BlockStyle, Theme};
