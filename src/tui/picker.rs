//! List picker with a detail pane, used by the documents view

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::Stylize,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Widget, Wrap},
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use super::theme::Theme;
use super::widgets::truncate_to_width_str;

/// One row in the picker
#[derive(Debug, Clone)]
pub struct PickerItem {
    /// Stable key (the document hash)
    pub id: String,
    /// Main label
    pub title: String,
    /// Dimmed text after the title
    pub subtitle: String,
    /// Extra lines fetched on demand for the selected item
    pub detail: Vec<String>,
}

impl PickerItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>, subtitle: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            subtitle: subtitle.into(),
            detail: Vec::new(),
        }
    }
}

/// Picker state: rows, selection and an optional prompt
#[derive(Debug, Clone)]
pub struct Picker {
    /// Whether the picker is drawn
    pub visible: bool,
    /// Top border title
    pub title: String,
    /// Rows currently listed
    pub items: Vec<PickerItem>,
    /// Index of the highlighted row
    pub selected: usize,
    /// Waiting for the list to arrive
    pub loading: bool,
    /// First row shown when the list is longer than the window
    pub scroll_offset: usize,
    /// Bottom border hint
    pub help: String,
    /// Replaces the detail pane (e.g. a delete confirmation)
    pub prompt: Option<String>,
}

impl Default for Picker {
    fn default() -> Self {
        Self::new("Select")
    }
}

const VISIBLE_ITEMS: usize = 10;

impl Picker {
    /// Hidden picker with the given title
    pub fn new(title: &str) -> Self {
        Self {
            visible: false,
            title: title.to_string(),
            items: Vec::new(),
            selected: 0,
            loading: false,
            scroll_offset: 0,
            help: " Up/Down Enter Esc ".to_string(),
            prompt: None,
        }
    }

    /// Show the picker empty with a loading line
    pub fn open_loading(&mut self) {
        self.visible = true;
        self.items.clear();
        self.selected = 0;
        self.scroll_offset = 0;
        self.loading = true;
        self.prompt = None;
    }

    /// Replace the rows once loading completes
    pub fn set_items(&mut self, items: Vec<PickerItem>) {
        self.items = items;
        self.loading = false;
        self.selected = self.selected.min(self.items.len().saturating_sub(1));
        self.ensure_visible();
    }

    /// Hide the picker and drop its rows
    pub fn close(&mut self) {
        self.visible = false;
        self.items.clear();
        self.selected = 0;
        self.loading = false;
        self.prompt = None;
    }

    /// Move selection up, wrapping to the last row
    pub fn select_prev(&mut self) {
        if !self.items.is_empty() {
            if self.selected == 0 {
                self.selected = self.items.len() - 1;
            } else {
                self.selected -= 1;
            }
            self.ensure_visible();
        }
    }

    /// Move selection down, wrapping to the first row
    pub fn select_next(&mut self) {
        if !self.items.is_empty() {
            self.selected = (self.selected + 1) % self.items.len();
            self.ensure_visible();
        }
    }

    /// Scroll so the selected row is inside the window
    fn ensure_visible(&mut self) {
        if self.selected < self.scroll_offset {
            self.scroll_offset = self.selected;
        } else if self.selected >= self.scroll_offset + VISIBLE_ITEMS {
            self.scroll_offset = self.selected + 1 - VISIBLE_ITEMS;
        }
    }

    /// The highlighted row, if any
    pub fn selected_item(&self) -> Option<&PickerItem> {
        self.items.get(self.selected)
    }

    /// Attach detail lines to the item with this id, if still listed
    pub fn set_detail(&mut self, id: &str, detail: Vec<String>) {
        if let Some(item) = self.items.iter_mut().find(|i| i.id == id) {
            item.detail = detail;
        }
    }

    /// Remove the item with this id, keeping the selection in range
    pub fn remove(&mut self, id: &str) {
        self.items.retain(|i| i.id != id);
        self.selected = self.selected.min(self.items.len().saturating_sub(1));
        self.ensure_visible();
    }

    /// Draw the list and, below it, the detail pane or prompt
    pub fn render(&self, area: Rect, buf: &mut Buffer) {
        if !self.visible {
            return;
        }

        let width = (area.width * 3 / 4).clamp(48.min(area.width), 100.min(area.width));
        let height = 22.min(area.height.saturating_sub(2));
        let x = area.x + (area.width - width) / 2;
        let y = area.y + (area.height - height) / 2;
        let picker_area = Rect::new(x, y, width, height);

        Clear.render(picker_area, buf);

        let inner_height = height.saturating_sub(2) as usize;
        let inner_width = width.saturating_sub(2) as usize;

        let lines: Vec<Line> = if self.loading {
            vec![Line::styled("Loading...", Theme::muted())]
        } else if self.items.is_empty() {
            vec![Line::styled("No documents indexed yet.", Theme::muted())]
        } else {
            let detail_reserved = if inner_height >= 10 { 7 } else { 0 };
            let list_height = inner_height
                .saturating_sub(detail_reserved)
                .clamp(1, VISIBLE_ITEMS);

            let mut lines: Vec<Line> = self
                .items
                .iter()
                .enumerate()
                .skip(self.scroll_offset)
                .take(list_height)
                .map(|(i, item)| {
                    let is_selected = i == self.selected;
                    let prefix = if is_selected { "> " } else { "  " };
                    let style = if is_selected { Theme::selected() } else { Theme::text() };
                    let avail = inner_width.saturating_sub(prefix.width());
                    Line::from(vec![
                        Span::styled(prefix, style),
                        Span::styled(truncate_to_width_str(&item.title, avail), style),
                    ])
                })
                .collect();

            if detail_reserved > 0 {
                lines.push(Line::styled("─".repeat(inner_width), Theme::muted()));
                if let Some(prompt) = &self.prompt {
                    for row in wrap_to_width(prompt, inner_width, 3) {
                        lines.push(Line::styled(row, Theme::warning().bold()));
                    }
                } else if let Some(selected) = self.selected_item() {
                    lines.push(Line::styled(
                        truncate_to_width_str(&selected.title, inner_width),
                        Theme::accent().bold(),
                    ));
                    for row in wrap_to_width(selected.subtitle.trim(), inner_width, 2) {
                        lines.push(Line::styled(row, Theme::muted()));
                    }
                    for row in selected.detail.iter().take(3) {
                        lines.push(Line::styled(
                            truncate_to_width_str(row, inner_width),
                            Theme::muted(),
                        ));
                    }
                }
            }

            lines
        };

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Theme::accent())
            .title_top(Line::styled(format!(" {} ", self.title), Theme::title()))
            .title_bottom(Line::styled(self.help.clone(), Theme::muted()));

        Paragraph::new(lines)
            .block(block)
            .wrap(Wrap { trim: false })
            .render(picker_area, buf);
    }
}

fn wrap_to_width(text: &str, max_width: usize, max_lines: usize) -> Vec<String> {
    if text.is_empty() || max_width == 0 || max_lines == 0 {
        return Vec::new();
    }

    let mut all_lines: Vec<String> = Vec::new();
    for raw in text.lines() {
        let mut current = String::new();
        let mut current_width = 0usize;
        for ch in raw.chars() {
            let ch_width = UnicodeWidthChar::width(ch).unwrap_or(1);
            if current_width + ch_width > max_width && !current.is_empty() {
                all_lines.push(std::mem::take(&mut current));
                current_width = 0;
            }
            current.push(ch);
            current_width += ch_width;
        }
        all_lines.push(current);
    }

    all_lines.into_iter().take(max_lines).collect()
}
