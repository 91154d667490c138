//! Slash commands typed in the chat input

use std::fmt;
use std::path::PathBuf;

use crate::validation::{TopK, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatCommand {
    Clear,
    Copy,
    Export,
    TopK,
    Docs,
    Upload,
    Logout,
    Help,
    Quit,
}

impl ChatCommand {
    pub fn all() -> &'static [ChatCommand] {
        &[
            ChatCommand::Clear,
            ChatCommand::Copy,
            ChatCommand::Export,
            ChatCommand::TopK,
            ChatCommand::Docs,
            ChatCommand::Upload,
            ChatCommand::Logout,
            ChatCommand::Help,
            ChatCommand::Quit,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChatCommand::Clear => "clear",
            ChatCommand::Copy => "copy",
            ChatCommand::Export => "export",
            ChatCommand::TopK => "topk",
            ChatCommand::Docs => "docs",
            ChatCommand::Upload => "upload",
            ChatCommand::Logout => "logout",
            ChatCommand::Help => "help",
            ChatCommand::Quit => "quit",
        }
    }

    pub fn usage(&self) -> &'static str {
        match self {
            ChatCommand::Copy => "/copy [n]",
            ChatCommand::Export => "/export [path]",
            ChatCommand::TopK => "/topk <1-20>",
            ChatCommand::Upload => "/upload <file.pdf> <system>",
            _ => "",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ChatCommand::Clear => "clear the conversation",
            ChatCommand::Copy => "copy the last (or n-th) answer",
            ChatCommand::Export => "save the conversation as markdown",
            ChatCommand::TopK => "set how many excerpts are retrieved",
            ChatCommand::Docs => "browse indexed documents",
            ChatCommand::Upload => "index a PDF document",
            ChatCommand::Logout => "log out and forget the credential",
            ChatCommand::Help => "list commands and keys",
            ChatCommand::Quit => "exit ragdesk",
        }
    }

    pub fn takes_args(&self) -> bool {
        matches!(
            self,
            ChatCommand::Copy | ChatCommand::Export | ChatCommand::TopK | ChatCommand::Upload
        )
    }

    pub fn matches(prefix: &str) -> Vec<ChatCommand> {
        let prefix = prefix.to_lowercase();
        Self::all()
            .iter()
            .filter(|cmd| cmd.name().starts_with(&prefix))
            .copied()
            .collect()
    }

    pub fn parse(name: &str) -> Option<ChatCommand> {
        let name = name.to_lowercase();
        Self::all().iter().find(|cmd| cmd.name() == name).copied()
    }

    /// Check the arguments and build the action to run
    pub fn invocation(&self, args: &str) -> Result<Invocation, String> {
        let args = args.trim();
        match self {
            ChatCommand::Clear => Ok(Invocation::Clear),
            ChatCommand::Docs => Ok(Invocation::Docs),
            ChatCommand::Logout => Ok(Invocation::Logout),
            ChatCommand::Help => Ok(Invocation::Help),
            ChatCommand::Quit => Ok(Invocation::Quit),
            ChatCommand::Copy => {
                if args.is_empty() {
                    return Ok(Invocation::Copy(None));
                }
                args.parse::<usize>()
                    .ok()
                    .filter(|n| *n > 0)
                    .map(|n| Invocation::Copy(Some(n)))
                    .ok_or_else(|| format!("Usage: {}", self.usage()))
            }
            ChatCommand::Export => Ok(Invocation::Export(
                Some(args).filter(|a| !a.is_empty()).map(PathBuf::from),
            )),
            ChatCommand::TopK => args
                .parse::<i64>()
                .map_err(|_| format!("Usage: {}", self.usage()))
                .and_then(|k| TopK::new_checked(k).map_err(|e: ValidationError| e.to_string()))
                .map(Invocation::TopK),
            ChatCommand::Upload => {
                let mut parts = args.splitn(2, ' ');
                let path = parts.next().unwrap_or("").trim();
                let system = parts.next().unwrap_or("").trim();
                if path.is_empty() || system.is_empty() {
                    return Err(format!("Usage: {}", self.usage()));
                }
                Ok(Invocation::Upload {
                    path: PathBuf::from(path),
                    system: system.to_string(),
                })
            }
        }
    }
}

impl fmt::Display for ChatCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.name())
    }
}

/// A command with its arguments checked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Clear,
    /// `None` copies the last answer
    Copy(Option<usize>),
    Export(Option<PathBuf>),
    TopK(TopK),
    Docs,
    Upload { path: PathBuf, system: String },
    Logout,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCommand {
    Known(ChatCommand, String),
    Unknown(String),
}

/// `None` when the input is a question rather than a command
pub fn parse_command(input: &str) -> Option<ParsedCommand> {
    let rest = input.trim().strip_prefix('/')?;
    let mut parts = rest.splitn(2, ' ');
    let cmd_name = parts.next().unwrap_or("");
    let args = parts.next().unwrap_or("").to_string();

    Some(match ChatCommand::parse(cmd_name) {
        Some(cmd) => ParsedCommand::Known(cmd, args),
        None => ParsedCommand::Unknown(cmd_name.to_string()),
    })
}

/// Autocomplete popup shown while typing `/...`
#[derive(Debug, Clone, Default)]
pub struct SlashPopup {
    pub visible: bool,
    pub filter: String,
    pub matches: Vec<ChatCommand>,
    pub selected: usize,
}

impl SlashPopup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self) {
        self.visible = true;
        self.filter.clear();
        self.matches = ChatCommand::matches("");
        self.selected = 0;
    }

    pub fn close(&mut self) {
        self.visible = false;
        self.filter.clear();
        self.matches.clear();
        self.selected = 0;
    }

    pub fn set_filter(&mut self, filter: &str) {
        self.filter = filter.to_string();
        self.matches = ChatCommand::matches(filter);
        if self.selected >= self.matches.len() {
            self.selected = 0;
        }
    }

    pub fn select_prev(&mut self) {
        let total = self.matches.len();
        if total > 0 {
            self.selected = (self.selected + total - 1) % total;
        }
    }

    pub fn select_next(&mut self) {
        let total = self.matches.len();
        if total > 0 {
            self.selected = (self.selected + 1) % total;
        }
    }

    /// Text to put in the input for the highlighted command
    pub fn complete(&self) -> Option<String> {
        self.matches.get(self.selected).map(|cmd| {
            if cmd.takes_args() {
                format!("{} ", cmd)
            } else {
                cmd.to_string()
            }
        })
    }

    /// (name, description, is_selected)
    pub fn display_items(&self) -> Vec<(String, String, bool)> {
        self.matches
            .iter()
            .enumerate()
            .map(|(i, cmd)| {
                let name = if cmd.usage().is_empty() {
                    cmd.to_string()
                } else {
                    cmd.usage().to_string()
                };
                (name, cmd.description().to_string(), i == self.selected)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(
            parse_command("/topk 8"),
            Some(ParsedCommand::Known(ChatCommand::TopK, "8".to_string()))
        );
        assert_eq!(
            parse_command("/nope"),
            Some(ParsedCommand::Unknown("nope".to_string()))
        );
        assert_eq!(parse_command("what is the warranty?"), None);
    }

    #[test]
    fn test_topk_arguments() {
        let ok = ChatCommand::TopK.invocation("8").unwrap();
        assert_eq!(ok, Invocation::TopK(TopK::new(8).unwrap()));
        assert!(ChatCommand::TopK.invocation("0").is_err());
        assert!(ChatCommand::TopK.invocation("21").is_err());
        assert!(ChatCommand::TopK.invocation("many").is_err());
    }

    #[test]
    fn test_copy_and_export_arguments() {
        assert_eq!(ChatCommand::Copy.invocation("").unwrap(), Invocation::Copy(None));
        assert_eq!(ChatCommand::Copy.invocation("2").unwrap(), Invocation::Copy(Some(2)));
        assert!(ChatCommand::Copy.invocation("0").is_err());
        assert_eq!(
            ChatCommand::Export.invocation(" notes.md ").unwrap(),
            Invocation::Export(Some(PathBuf::from("notes.md")))
        );
    }

    #[test]
    fn test_upload_arguments() {
        assert_eq!(
            ChatCommand::Upload.invocation("manual.pdf Field Ops").unwrap(),
            Invocation::Upload {
                path: PathBuf::from("manual.pdf"),
                system: "Field Ops".to_string()
            }
        );
        assert!(ChatCommand::Upload.invocation("manual.pdf").is_err());
    }

    #[test]
    fn test_popup_filter_and_complete() {
        let mut popup = SlashPopup::new();
        popup.open();
        assert_eq!(popup.matches.len(), ChatCommand::all().len());

        popup.set_filter("c");
        assert_eq!(popup.matches, vec![ChatCommand::Clear, ChatCommand::Copy]);
        popup.select_next();
        assert_eq!(popup.complete().as_deref(), Some("/copy "));
        popup.select_next();
        assert_eq!(popup.complete().as_deref(), Some("/clear"));
    }
}
