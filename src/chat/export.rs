//! Markdown transcript of a conversation

use super::turn::{Conversation, Outcome, Turn};
use crate::format::{format_clock, format_processing_time};
use chrono::Local;
use std::fmt::Write;

/// Render the conversation as a markdown document
pub fn transcript(conversation: &Conversation) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Conversation");
    let _ = writeln!(out);
    let _ = writeln!(out, "_Exported {}_", Local::now().format("%Y-%m-%d %H:%M"));

    for turn in conversation.turns() {
        let _ = writeln!(out);
        match turn {
            Turn::User(t) => {
                let _ = writeln!(out, "## You ({})", format_clock(&t.submitted_at));
                let _ = writeln!(out);
                let _ = writeln!(out, "{}", t.text);
            }
            Turn::Assistant(t) => {
                let title = match t.outcome {
                    Outcome::Success => "Assistant",
                    Outcome::Failure => "Assistant (error)",
                };
                let _ = writeln!(out, "## {} ({})", title, format_clock(&t.submitted_at));
                let _ = writeln!(out);
                let _ = writeln!(out, "{}", t.sanitized_text);

                let mut meta = Vec::new();
                if let Some(n) = t.sources_count {
                    meta.push(format!("{n} source(s)"));
                }
                let elapsed = format_processing_time(t.processing_time_seconds);
                if !elapsed.is_empty() {
                    meta.push(elapsed);
                }
                if !meta.is_empty() {
                    let _ = writeln!(out);
                    let _ = writeln!(out, "_{}_", meta.join(" · "));
                }

                if !t.used_excerpts.is_empty() {
                    let _ = writeln!(out);
                    let _ = writeln!(out, "<details><summary>Excerpts</summary>");
                    let _ = writeln!(out);
                    for (i, excerpt) in t.used_excerpts.iter().enumerate() {
                        let _ = writeln!(out, "{}. {}", i + 1, excerpt.replace('\n', " "));
                    }
                    let _ = writeln!(out);
                    let _ = writeln!(out, "</details>");
                }
            }
        }
    }
    out
}
