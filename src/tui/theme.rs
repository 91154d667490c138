//! Color theme for the TUI - ANSI colors for terminal compatibility
//!
//! Lookups that depend on a domain value (notice kind, turn role, markdown
//! block) go through enum-keyed tables instead of scattered conditionals.

use crate::chat::{Outcome, TurnRole};
use crate::notify::NoticeKind;
use ratatui::style::{Color, Modifier, Style};

/// Markdown element kinds that get their own style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockStyle {
    Heading,
    Quote,
    CodeBlock,
    InlineCode,
    Link,
    ListMarker,
    Rule,
}

/// Badge shown in front of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Badge {
    pub label: &'static str,
    pub icon: &'static str,
    pub style: Style,
}

/// Style and icon for a toast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoticeLook {
    pub icon: &'static str,
    pub style: Style,
}

pub struct Theme;

impl Theme {
    pub const CYAN: Color = Color::Cyan;
    pub const GREEN: Color = Color::Green;
    pub const YELLOW: Color = Color::Yellow;
    pub const RED: Color = Color::Red;
    pub const BLUE: Color = Color::Blue;
    pub const MAGENTA: Color = Color::Magenta;
    pub const DARK_GRAY: Color = Color::DarkGray;
    pub const GRAY: Color = Color::Gray;

    pub fn title() -> Style {
        Style::default().fg(Self::CYAN).add_modifier(Modifier::BOLD)
    }

    pub fn text() -> Style {
        Style::default()
    }

    pub fn bold() -> Style {
        Style::default().add_modifier(Modifier::BOLD)
    }

    pub fn success() -> Style {
        Style::default().fg(Self::GREEN)
    }

    pub fn warning() -> Style {
        Style::default().fg(Self::YELLOW)
    }

    pub fn error() -> Style {
        Style::default().fg(Self::RED)
    }

    pub fn accent() -> Style {
        Style::default().fg(Self::CYAN)
    }

    pub fn muted() -> Style {
        Style::default().fg(Self::DARK_GRAY)
    }

    pub fn border() -> Style {
        Style::default().fg(Self::DARK_GRAY)
    }

    pub fn border_focused() -> Style {
        Style::default().fg(Self::CYAN)
    }

    pub fn running() -> Style {
        Style::default().fg(Self::GREEN).add_modifier(Modifier::BOLD)
    }

    pub fn idle() -> Style {
        Style::default().fg(Self::DARK_GRAY)
    }

    pub fn selected() -> Style {
        Style::default().fg(Self::CYAN).add_modifier(Modifier::BOLD)
    }

    // Key hints
    pub fn key() -> Style {
        Style::default().fg(Self::CYAN).add_modifier(Modifier::BOLD)
    }

    pub fn key_desc() -> Style {
        Style::default().fg(Self::DARK_GRAY)
    }

    pub fn notice(kind: NoticeKind) -> NoticeLook {
        match kind {
            NoticeKind::Success => NoticeLook {
                icon: "✓",
                style: Style::default().fg(Self::GREEN).add_modifier(Modifier::BOLD),
            },
            NoticeKind::Error => NoticeLook {
                icon: "✗",
                style: Style::default().fg(Self::RED).add_modifier(Modifier::BOLD),
            },
            NoticeKind::Info => NoticeLook {
                icon: "•",
                style: Style::default().fg(Self::BLUE),
            },
        }
    }

    /// `outcome` is ignored for user turns
    pub fn turn_badge(role: TurnRole, outcome: Option<Outcome>) -> Badge {
        match (role, outcome) {
            (TurnRole::User, _) => Badge {
                label: " You ",
                icon: "›",
                style: Style::default()
                    .bg(Self::CYAN)
                    .fg(Color::Black)
                    .add_modifier(Modifier::BOLD),
            },
            (TurnRole::Assistant, Some(Outcome::Failure)) => Badge {
                label: " Assistant ",
                icon: "✗",
                style: Style::default()
                    .bg(Self::RED)
                    .fg(Color::Black)
                    .add_modifier(Modifier::BOLD),
            },
            (TurnRole::Assistant, _) => Badge {
                label: " Assistant ",
                icon: "◆",
                style: Style::default()
                    .bg(Self::GREEN)
                    .fg(Color::Black)
                    .add_modifier(Modifier::BOLD),
            },
        }
    }

    pub fn block(kind: BlockStyle) -> Style {
        match kind {
            BlockStyle::Heading => Style::default()
                .fg(Self::MAGENTA)
                .add_modifier(Modifier::BOLD),
            BlockStyle::Quote => Style::default()
                .fg(Self::GRAY)
                .add_modifier(Modifier::ITALIC),
            BlockStyle::CodeBlock => Style::default().fg(Self::YELLOW),
            BlockStyle::InlineCode => Style::default().fg(Self::YELLOW),
            BlockStyle::Link => Style::default()
                .fg(Self::BLUE)
                .add_modifier(Modifier::UNDERLINED),
            BlockStyle::ListMarker => Style::default().fg(Self::CYAN),
            BlockStyle::Rule => Style::default().fg(Self::DARK_GRAY),
        }
    }
}
