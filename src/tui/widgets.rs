//! Custom widgets for the TUI

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget, Wrap},
};
use std::time::Duration;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use super::progress::{progress_bar, shimmer_spans, spinner};
use super::theme::{BlockStyle, Theme};
use crate::api::UploadStage;
use crate::chat::{Outcome, Turn};
use crate::format::{format_clock, format_processing_time};
use crate::markdown::{self, plain_text, Block as MdBlock, Inline};
use crate::notify::Notice;

/// Cut `text` to `max_width` columns, ending with `…` when shortened
pub fn truncate_to_width_str(text: &str, max_width: usize) -> String {
    if text.width() <= max_width {
        return text.to_string();
    }
    if max_width == 0 {
        return String::new();
    }
    let mut out = String::new();
    let mut width = 0;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if width + w + 1 > max_width {
            break;
        }
        out.push(ch);
        width += w;
    }
    out.push('…');
    out
}

/// Break styled spans into rows of at most `max_width` columns.
///
/// Breaks happen after spaces where possible; words longer than a row are
/// split. Adjacent spans with the same style are merged.
pub fn wrap_spans(spans: Vec<Span<'static>>, max_width: usize) -> Vec<Vec<Span<'static>>> {
    if max_width == 0 {
        return vec![spans];
    }

    let mut rows: Vec<Vec<Span<'static>>> = Vec::new();
    let mut current: Vec<Span<'static>> = Vec::new();
    let mut width = 0usize;

    for span in spans {
        let style = span.style;
        for word in span.content.split_inclusive(' ') {
            let visible = word.trim_end().width();
            if width > 0 && width + visible > max_width {
                rows.push(std::mem::take(&mut current));
                width = 0;
                if word.trim().is_empty() {
                    continue;
                }
            }

            if visible <= max_width {
                push_merged(&mut current, word, style);
                width += word.width();
                continue;
            }

            let mut chunk = String::new();
            for ch in word.chars() {
                let cw = ch.width().unwrap_or(0);
                if width > 0 && width + cw > max_width {
                    push_merged(&mut current, &std::mem::take(&mut chunk), style);
                    rows.push(std::mem::take(&mut current));
                    width = 0;
                }
                chunk.push(ch);
                width += cw;
            }
            push_merged(&mut current, &chunk, style);
        }
    }
    rows.push(current);
    rows
}

fn push_merged(row: &mut Vec<Span<'static>>, text: &str, style: Style) {
    if text.is_empty() {
        return;
    }
    match row.last_mut() {
        Some(last) if last.style == style => last.content.to_mut().push_str(text),
        _ => row.push(Span::styled(text.to_string(), style)),
    }
}

/// Plain text wrapped to `max_width`, one string per row
pub fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    text.lines()
        .flat_map(|line| wrap_spans(vec![Span::raw(line.to_string())], max_width))
        .map(|row| row.iter().map(|s| s.content.as_ref()).collect())
        .collect()
}

// ─── Markdown ───────────────────────────────────────────────────────

/// Styled rows for a parsed markdown answer
pub fn markdown_lines(blocks: &[MdBlock], width: usize) -> Vec<Line<'static>> {
    let mut out = Vec::new();
    for (i, block) in blocks.iter().enumerate() {
        if i > 0 {
            out.push(Line::default());
        }
        out.extend(block_lines(block, width));
    }
    out
}

fn block_lines(block: &MdBlock, width: usize) -> Vec<Line<'static>> {
    match block {
        MdBlock::Heading { level, inlines } => {
            let style = Theme::block(BlockStyle::Heading);
            let mut spans = vec![Span::styled(
                format!("{} ", "#".repeat(usize::from(*level))),
                style,
            )];
            spans.extend(inline_rows(inlines, style).into_iter().flatten());
            wrap_spans(spans, width).into_iter().map(Line::from).collect()
        }
        MdBlock::Paragraph(inlines) => inline_rows(inlines, Theme::text())
            .into_iter()
            .flat_map(|row| wrap_spans(row, width))
            .map(Line::from)
            .collect(),
        MdBlock::List { ordered, items } => {
            let mut out = Vec::new();
            for (n, item) in items.iter().enumerate() {
                let marker = match ordered {
                    Some(start) => format!("{}. ", start + n as u64),
                    None => "• ".to_string(),
                };
                let marker_width = marker.width();
                let body = markdown_lines(item, width.saturating_sub(marker_width));
                out.extend(prefix_lines(
                    body,
                    Span::styled(marker, Theme::block(BlockStyle::ListMarker)),
                    Span::raw(" ".repeat(marker_width)),
                ));
            }
            out
        }
        MdBlock::CodeBlock { code, .. } => {
            let gutter = Theme::block(BlockStyle::Rule);
            let style = Theme::block(BlockStyle::CodeBlock);
            code.trim_end_matches('\n')
                .lines()
                .map(|l| {
                    Line::from(vec![
                        Span::styled("│ ", gutter),
                        Span::styled(truncate_to_width_str(l, width.saturating_sub(2)), style),
                    ])
                })
                .collect()
        }
        MdBlock::Quote(blocks) => {
            let quote = Theme::block(BlockStyle::Quote);
            let bar = Span::styled("▌ ", quote);
            let body = markdown_lines(blocks, width.saturating_sub(2))
                .into_iter()
                .map(|line| {
                    Line::from(
                        line.spans
                            .into_iter()
                            .map(|s| s.patch_style(quote))
                            .collect::<Vec<_>>(),
                    )
                })
                .collect();
            prefix_lines(body, bar.clone(), bar)
        }
        MdBlock::Rule => vec![Line::styled(
            "─".repeat(width.min(40)),
            Theme::block(BlockStyle::Rule),
        )],
    }
}

fn prefix_lines(lines: Vec<Line<'static>>, first: Span<'static>, rest: Span<'static>) -> Vec<Line<'static>> {
    lines
        .into_iter()
        .enumerate()
        .map(|(i, line)| {
            let prefix = if i == 0 { first.clone() } else { rest.clone() };
            let mut spans = vec![prefix];
            spans.extend(line.spans);
            Line::from(spans)
        })
        .collect()
}

/// Inline runs as rows of spans, split at hard breaks
fn inline_rows(inlines: &[Inline], style: Style) -> Vec<Vec<Span<'static>>> {
    let mut rows = vec![Vec::new()];
    push_inlines(inlines, style, &mut rows);
    rows
}

fn push_inlines(inlines: &[Inline], style: Style, rows: &mut Vec<Vec<Span<'static>>>) {
    for inline in inlines {
        match inline {
            Inline::Text(t) => push_text(t, style, rows),
            Inline::Code(c) => push_text(c, style.patch(Theme::block(BlockStyle::InlineCode)), rows),
            Inline::Strong(children) => push_inlines(children, style.add_modifier(Modifier::BOLD), rows),
            Inline::Emphasis(children) => {
                push_inlines(children, style.add_modifier(Modifier::ITALIC), rows)
            }
            Inline::Link { href, children, .. } => {
                push_inlines(children, style.patch(Theme::block(BlockStyle::Link)), rows);
                // Terminals cannot follow links, so show the target
                if plain_text(children).trim() != href {
                    push_text(&format!(" <{href}>"), Theme::muted(), rows);
                }
            }
            Inline::LineBreak => rows.push(Vec::new()),
        }
    }
}

fn push_text(text: &str, style: Style, rows: &mut Vec<Vec<Span<'static>>>) {
    for (i, part) in text.split('\n').enumerate() {
        if i > 0 {
            rows.push(Vec::new());
        }
        if let Some(row) = rows.last_mut() {
            push_merged(row, part, style);
        }
    }
}

// ─── Conversation ───────────────────────────────────────────────────

const TURN_INDENT: &str = "  ";

/// Rows for one turn: badge header, indented body, blank separator.
///
/// `answer_no` is the 1-based index used by `/copy n`.
pub fn render_turn_lines(turn: &Turn, answer_no: Option<usize>, max_width: usize) -> Vec<Line<'static>> {
    let badge = Theme::turn_badge(turn.role(), turn.outcome());
    let mut header = vec![
        Span::styled(badge.label, badge.style),
        Span::styled(format!(" {}", format_clock(&turn.submitted_at())), Theme::muted()),
    ];
    if let Some(n) = answer_no {
        header.push(Span::styled(format!(" [{n}]"), Theme::muted()));
    }

    let content_width = max_width.saturating_sub(TURN_INDENT.len() + 2);
    let body: Vec<Line<'static>> = match turn {
        Turn::User(t) => wrap_text(&t.text, content_width)
            .into_iter()
            .map(Line::from)
            .collect(),
        Turn::Assistant(t) if t.outcome == Outcome::Failure => {
            wrap_text(&t.sanitized_text, content_width)
                .into_iter()
                .map(|row| Line::styled(row, Theme::error()))
                .collect()
        }
        Turn::Assistant(t) => {
            let mut meta = Vec::new();
            if let Some(n) = t.sources_count {
                meta.push(format!("{n} source(s)"));
            }
            let elapsed = format_processing_time(t.processing_time_seconds);
            if !elapsed.is_empty() {
                meta.push(elapsed);
            }
            if !meta.is_empty() {
                header.push(Span::styled(format!(" · {}", meta.join(" · ")), Theme::muted()));
            }
            markdown_lines(&markdown::parse(&t.sanitized_text), content_width)
        }
    };

    let mut lines = vec![Line::from(header)];
    for line in body {
        let mut spans = vec![Span::raw(TURN_INDENT)];
        spans.extend(line.spans);
        lines.push(Line::from(spans));
    }
    lines.push(Line::default());
    lines
}

// ─── Chrome ─────────────────────────────────────────────────────────

pub struct HeaderBar<'a> {
    pub title: &'a str,
    pub user: Option<&'a str>,
    pub server: &'a str,
}

impl Widget for HeaderBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.height < 1 {
            return;
        }

        let title_line = Line::from(vec![
            Span::styled("◆ ", Theme::accent()),
            Span::styled(self.title, Theme::title()),
        ]);
        buf.set_line(area.x + 1, area.y, &title_line, area.width.saturating_sub(2));

        let right = match self.user {
            Some(user) => format!("{} @ {} ", user, self.server),
            None => format!("{} ", self.server),
        };
        let right_len = right.width() as u16;
        let right_x = area.x + area.width.saturating_sub(right_len + 1);
        buf.set_span(right_x, area.y, &Span::styled(right, Theme::muted()), right_len + 1);
    }
}

pub struct StatusBar {
    pub busy: bool,
    pub spinner_frame: usize,
    pub elapsed: Duration,
    pub top_k: u8,
    pub answers: usize,
}

impl Widget for StatusBar {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let mut spans = if self.busy {
            let mut spans = vec![Span::styled(format!("{} ", spinner(self.spinner_frame)), Theme::accent())];
            spans.extend(shimmer_spans("Searching the knowledge base", self.elapsed));
            spans
        } else {
            vec![
                Span::styled("● ", Theme::success()),
                Span::styled("Ready", Theme::idle()),
            ]
        };
        spans.push(Span::styled(
            format!("  top-k {}  ·  {} answer(s)", self.top_k, self.answers),
            Theme::muted(),
        ));
        buf.set_line(area.x + 1, area.y, &Line::from(spans), area.width.saturating_sub(2));
    }
}

pub struct InputBox<'a> {
    pub title: &'a str,
    pub content: &'a str,
    pub placeholder: &'a str,
    pub focused: bool,
}

impl Widget for InputBox<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let border_style = if self.focused {
            Theme::border_focused()
        } else {
            Theme::border()
        };

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(border_style)
            .title(Span::styled(format!(" {} ", self.title), Theme::muted()));

        let (text, style) = if self.content.is_empty() {
            (self.placeholder, Theme::muted())
        } else {
            (self.content, Theme::text())
        };

        Paragraph::new(text.to_string())
            .style(style)
            .block(block)
            .wrap(Wrap { trim: false })
            .render(area, buf);
    }
}

pub struct HelpBar<'a> {
    pub bindings: &'a [(&'a str, &'a str)],
}

impl Widget for HelpBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let mut spans = vec![Span::raw(" ")];
        for (i, (key, desc)) in self.bindings.iter().enumerate() {
            if i > 0 {
                spans.push(Span::styled(" │ ", Theme::muted()));
            }
            spans.push(Span::styled(*key, Theme::key()));
            spans.push(Span::styled(format!(" {}", desc), Theme::key_desc()));
        }
        buf.set_line(area.x, area.y, &Line::from(spans), area.width);
    }
}

/// One-line toast for the newest live notice
pub struct ToastLine<'a> {
    pub notice: Option<&'a Notice>,
}

impl Widget for ToastLine<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let Some(notice) = self.notice else {
            return;
        };
        let look = Theme::notice(notice.kind);
        let text = truncate_to_width_str(&notice.message, area.width.saturating_sub(4) as usize);
        let line = Line::from(vec![
            Span::styled(format!(" {} ", look.icon), look.style),
            Span::styled(text, look.style),
        ]);
        buf.set_line(area.x, area.y, &line, area.width);
    }
}

/// Single-row upload progress: name, bar, stage
pub struct UploadGauge<'a> {
    pub file_name: &'a str,
    pub stage: UploadStage,
}

impl Widget for UploadGauge<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let label = format!(" {} {:>3}% ", self.stage.label(), self.stage.percent());
        let name = truncate_to_width_str(self.file_name, 24);
        let used = name.width() + label.width() + 3;
        let bar_width = (area.width as usize).saturating_sub(used).min(40);

        let bar_style = match self.stage {
            UploadStage::Finished { ok: false } => Theme::error(),
            UploadStage::Finished { ok: true } => Theme::success(),
            _ => Theme::accent(),
        };
        let line = Line::from(vec![
            Span::styled(format!(" {name} "), Theme::bold()),
            Span::styled(progress_bar(self.stage.percent(), bar_width), bar_style),
            Span::styled(label, Theme::muted()),
        ]);
        buf.set_line(area.x, area.y, &line, area.width);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row_text(row: &[Span<'_>]) -> String {
        row.iter().map(|s| s.content.as_ref()).collect()
    }

    fn line_text(line: &Line<'_>) -> String {
        row_text(&line.spans)
    }

    #[test]
    fn test_truncate_to_width() {
        assert_eq!(truncate_to_width_str("short", 10), "short");
        assert_eq!(truncate_to_width_str("manual-v2.pdf", 8), "manual-…");
        assert_eq!(truncate_to_width_str("\u{4f60}\u{597d}\u{4f60}", 4), "\u{4f60}…");
    }

    #[test]
    fn test_wrap_breaks_after_spaces() {
        let rows = wrap_spans(vec![Span::raw("the quick brown fox")], 10);
        let texts: Vec<String> = rows.iter().map(|r| row_text(r)).collect();
        assert_eq!(texts, vec!["the quick ", "brown fox"]);
    }

    #[test]
    fn test_wrap_splits_long_words() {
        let rows = wrap_text("abcdefghij", 4);
        assert_eq!(rows, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_wrap_merges_same_style() {
        let rows = wrap_spans(vec![Span::raw("a "), Span::raw("b")], 20);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), 1);
    }

    #[test]
    fn test_markdown_list_and_code() {
        let blocks = markdown::parse("1. first\n2. second\n\n```\nlet x = 1;\n```");
        let lines: Vec<String> = markdown_lines(&blocks, 40).iter().map(line_text).collect();
        assert_eq!(lines, vec!["1. first", "2. second", "", "│ let x = 1;"]);
    }

    #[test]
    fn test_links_show_target() {
        let blocks = markdown::parse("[docs](https://example.com)");
        let lines = markdown_lines(&blocks, 80);
        assert_eq!(line_text(&lines[0]), "docs <https://example.com>");
    }

    #[test]
    fn test_heading_and_quote() {
        let blocks = markdown::parse("## Steps\n\n> careful");
        let lines: Vec<String> = markdown_lines(&blocks, 40).iter().map(line_text).collect();
        assert_eq!(lines, vec!["## Steps", "", "▌ careful"]);
    }

    #[test]
    fn test_bold_span_style() {
        let blocks = markdown::parse("a **b**");
        let lines = markdown_lines(&blocks, 40);
        let bold = lines[0].spans.iter().find(|s| s.content == "b").unwrap();
        assert!(bold.style.add_modifier.contains(Modifier::BOLD));
    }
}
