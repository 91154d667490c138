//! Restricted markdown for assistant answers
//!
//! Answers are untrusted text. They are parsed with `pulldown-cmark` into a
//! small display tree: headings (levels 1-3), paragraphs, lists, code,
//! quotes, rules, and inline emphasis, code and links. Raw HTML is never
//! interpreted and comes out as literal text. Images become their alt text.

use pulldown_cmark::{CodeBlockKind, Event, Parser, Tag, TagEnd};

/// `rel` attached to every link
pub const NOOPENER_NOREFERRER: &str = "noopener noreferrer";

const UNSAFE_SCHEMES: &[&str] = &["javascript:", "data:", "vbscript:"];
const MAX_HEADING_LEVEL: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTarget {
    /// Open outside the current view
    NewContext,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Text(String),
    Code(String),
    Strong(Vec<Inline>),
    Emphasis(Vec<Inline>),
    Link {
        href: String,
        target: LinkTarget,
        rel: &'static str,
        children: Vec<Inline>,
    },
    LineBreak,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading { level: u8, inlines: Vec<Inline> },
    Paragraph(Vec<Inline>),
    List {
        /// Start number for ordered lists
        ordered: Option<u64>,
        items: Vec<Vec<Block>>,
    },
    CodeBlock { lang: Option<String>, code: String },
    Quote(Vec<Block>),
    Rule,
}

impl Inline {
    fn text(s: impl Into<String>) -> Self {
        Inline::Text(s.into())
    }
}

/// Concatenated text of a run of inlines, without markup
pub fn plain_text(inlines: &[Inline]) -> String {
    let mut out = String::new();
    collect_text(inlines, &mut out);
    out
}

fn collect_text(inlines: &[Inline], out: &mut String) {
    for inline in inlines {
        match inline {
            Inline::Text(t) | Inline::Code(t) => out.push_str(t),
            Inline::Strong(c) | Inline::Emphasis(c) => collect_text(c, out),
            Inline::Link { children, .. } => collect_text(children, out),
            Inline::LineBreak => out.push('\n'),
        }
    }
}

/// True unless the href uses a scheme that could run code
pub fn is_safe_href(href: &str) -> bool {
    let normalized: String = href
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    !UNSAFE_SCHEMES.iter().any(|s| normalized.starts_with(s))
}

/// Parse markdown into display blocks
pub fn parse(markdown: &str) -> Vec<Block> {
    let mut builder = Builder::new();
    for event in Parser::new(markdown) {
        builder.event(event);
    }
    builder.finish()
}

// ─── Tree builder ───────────────────────────────────────────────────

enum Container {
    Root(Vec<Block>),
    Quote(Vec<Block>),
    List {
        ordered: Option<u64>,
        items: Vec<Vec<Block>>,
    },
    Item(Vec<Block>),
}

#[derive(Clone, Copy)]
enum Leaf {
    Paragraph,
    Heading(u8),
    /// Loose text, e.g. inside a tight list item
    Implicit,
}

enum SpanKind {
    Root,
    Strong,
    Emphasis,
    Link { href: String },
    Image,
}

struct Span {
    kind: SpanKind,
    children: Vec<Inline>,
}

struct Builder {
    containers: Vec<Container>,
    leaf: Option<Leaf>,
    spans: Vec<Span>,
    code: Option<(Option<String>, String)>,
    html: Option<String>,
}

impl Builder {
    fn new() -> Self {
        Self {
            containers: vec![Container::Root(Vec::new())],
            leaf: None,
            spans: Vec::new(),
            code: None,
            html: None,
        }
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => {
                if let Some((_, code)) = self.code.as_mut() {
                    code.push_str(&text);
                } else if let Some(html) = self.html.as_mut() {
                    html.push_str(&text);
                } else {
                    self.push_inline(Inline::text(text.as_ref()));
                }
            }
            Event::Code(code) => self.push_inline(Inline::Code(code.to_string())),
            Event::Html(html) => match self.html.as_mut() {
                Some(buf) => buf.push_str(&html),
                None => self.push_inline(Inline::text(html.as_ref())),
            },
            Event::InlineHtml(html) => self.push_inline(Inline::text(html.as_ref())),
            Event::SoftBreak => self.push_inline(Inline::text(" ")),
            Event::HardBreak => self.push_inline(Inline::LineBreak),
            Event::Rule => {
                self.close_leaf();
                self.push_block(Block::Rule);
            }
            Event::TaskListMarker(done) => {
                self.push_inline(Inline::text(if done { "[x] " } else { "[ ] " }))
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => self.open_leaf(Leaf::Paragraph),
            Tag::Heading { level, .. } => {
                let level = (level as u8).clamp(1, MAX_HEADING_LEVEL);
                self.open_leaf(Leaf::Heading(level));
            }
            Tag::BlockQuote { .. } => {
                self.close_leaf();
                self.containers.push(Container::Quote(Vec::new()));
            }
            Tag::CodeBlock(kind) => {
                self.close_leaf();
                let lang = match kind {
                    CodeBlockKind::Fenced(lang) => {
                        let lang = lang.split_whitespace().next().unwrap_or("").to_string();
                        (!lang.is_empty()).then_some(lang)
                    }
                    CodeBlockKind::Indented => None,
                };
                self.code = Some((lang, String::new()));
            }
            Tag::HtmlBlock => {
                self.close_leaf();
                self.html = Some(String::new());
            }
            Tag::List(start) => {
                self.close_leaf();
                self.containers.push(Container::List {
                    ordered: start,
                    items: Vec::new(),
                });
            }
            Tag::Item => {
                self.close_leaf();
                self.containers.push(Container::Item(Vec::new()));
            }
            Tag::Strong => self.open_span(SpanKind::Strong),
            Tag::Emphasis => self.open_span(SpanKind::Emphasis),
            Tag::Link { dest_url, .. } => self.open_span(SpanKind::Link {
                href: dest_url.to_string(),
            }),
            Tag::Image { .. } => self.open_span(SpanKind::Image),
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph | TagEnd::Heading(_) => self.close_leaf(),
            TagEnd::BlockQuote { .. } => {
                self.close_leaf();
                if let Some(Container::Quote(blocks)) = self.pop_container() {
                    self.push_block(Block::Quote(blocks));
                }
            }
            TagEnd::CodeBlock => {
                if let Some((lang, code)) = self.code.take() {
                    self.push_block(Block::CodeBlock { lang, code });
                }
            }
            TagEnd::HtmlBlock => {
                if let Some(html) = self.html.take() {
                    let html = html.trim_end().to_string();
                    if !html.is_empty() {
                        self.push_block(Block::Paragraph(vec![Inline::Text(html)]));
                    }
                }
            }
            TagEnd::List(_) => {
                self.close_leaf();
                if let Some(Container::List { ordered, items }) = self.pop_container() {
                    self.push_block(Block::List { ordered, items });
                }
            }
            TagEnd::Item => {
                self.close_leaf();
                if let Some(Container::Item(blocks)) = self.pop_container() {
                    if let Some(Container::List { items, .. }) = self.containers.last_mut() {
                        items.push(blocks);
                    }
                }
            }
            TagEnd::Strong | TagEnd::Emphasis | TagEnd::Link | TagEnd::Image => self.close_span(),
            _ => {}
        }
    }

    fn pop_container(&mut self) -> Option<Container> {
        // The root is never popped
        if self.containers.len() > 1 {
            self.containers.pop()
        } else {
            None
        }
    }

    fn push_block(&mut self, block: Block) {
        match self.containers.last_mut() {
            Some(Container::Root(blocks))
            | Some(Container::Quote(blocks))
            | Some(Container::Item(blocks)) => blocks.push(block),
            Some(Container::List { items, .. }) => items.push(vec![block]),
            None => {}
        }
    }

    fn open_leaf(&mut self, leaf: Leaf) {
        self.close_leaf();
        self.leaf = Some(leaf);
        self.spans.push(Span {
            kind: SpanKind::Root,
            children: Vec::new(),
        });
    }

    fn close_leaf(&mut self) {
        let Some(leaf) = self.leaf.take() else {
            return;
        };
        while self.spans.len() > 1 {
            self.close_span();
        }
        let inlines = self.spans.pop().map(|s| s.children).unwrap_or_default();
        if inlines.is_empty() {
            return;
        }
        let block = match leaf {
            Leaf::Heading(level) => Block::Heading { level, inlines },
            Leaf::Paragraph | Leaf::Implicit => Block::Paragraph(inlines),
        };
        self.push_block(block);
    }

    fn open_span(&mut self, kind: SpanKind) {
        if self.leaf.is_none() {
            self.open_leaf(Leaf::Implicit);
        }
        self.spans.push(Span {
            kind,
            children: Vec::new(),
        });
    }

    fn close_span(&mut self) {
        if self.spans.len() < 2 {
            return;
        }
        let Some(span) = self.spans.pop() else {
            return;
        };
        match span.kind {
            SpanKind::Strong => self.push_inline(Inline::Strong(span.children)),
            SpanKind::Emphasis => self.push_inline(Inline::Emphasis(span.children)),
            SpanKind::Link { href } if is_safe_href(&href) => self.push_inline(Inline::Link {
                href,
                target: LinkTarget::NewContext,
                rel: NOOPENER_NOREFERRER,
                children: span.children,
            }),
            SpanKind::Link { .. } => {
                for child in span.children {
                    self.push_inline(child);
                }
            }
            SpanKind::Image => {
                let alt = plain_text(&span.children);
                if !alt.is_empty() {
                    self.push_inline(Inline::Text(alt));
                }
            }
            SpanKind::Root => {}
        }
    }

    fn push_inline(&mut self, inline: Inline) {
        if self.leaf.is_none() {
            self.open_leaf(Leaf::Implicit);
        }
        let Some(span) = self.spans.last_mut() else {
            return;
        };
        if let Inline::Text(next) = &inline {
            if let Some(Inline::Text(prev)) = span.children.last_mut() {
                prev.push_str(next);
                return;
            }
        }
        span.children.push(inline);
    }

    fn finish(mut self) -> Vec<Block> {
        self.close_leaf();
        if let Some((lang, code)) = self.code.take() {
            self.push_block(Block::CodeBlock { lang, code });
        }
        while self.containers.len() > 1 {
            match self.containers.pop() {
                Some(Container::Quote(blocks)) => self.push_block(Block::Quote(blocks)),
                Some(Container::List { ordered, items }) => {
                    self.push_block(Block::List { ordered, items })
                }
                Some(Container::Item(blocks)) => {
                    if let Some(Container::List { items, .. }) = self.containers.last_mut() {
                        items.push(blocks);
                    }
                }
                _ => {}
            }
        }
        match self.containers.pop() {
            Some(Container::Root(blocks)) => blocks,
            _ => Vec::new(),
        }
    }
}
