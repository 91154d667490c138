//! Input validation performed before any network call

use std::fmt;
use std::path::Path;

pub const QUESTION_MIN_CHARS: usize = 3;
pub const QUESTION_MAX_CHARS: usize = 500;
pub const TOP_K_MIN: u8 = 1;
pub const TOP_K_MAX: u8 = 20;
/// Largest value offered by the interactive selector
pub const TOP_K_UI_MAX: u8 = 10;
pub const PDF_MAX_BYTES: u64 = 50 * 1024 * 1024;

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Errors caught locally, before a request is issued
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("The question cannot be empty")]
    EmptyQuestion,

    #[error("The question must contain at least {QUESTION_MIN_CHARS} characters")]
    QuestionTooShort,

    #[error("The question cannot exceed {QUESTION_MAX_CHARS} characters")]
    QuestionTooLong,

    #[error("The number of documents must be between {TOP_K_MIN} and {TOP_K_MAX}")]
    TopKOutOfRange,

    #[error("No file selected")]
    NoFile,

    #[error("Only PDF files are accepted")]
    NotPdf,

    #[error("The file is too large (max 50MB)")]
    FileTooLarge,

    #[error("A source system name is required")]
    EmptySystemName,

    #[error("Username and password are required")]
    MissingCredentials,
}

/// Number of excerpts retrieved per question, always within 1..=20
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TopK(u8);

impl TopK {
    pub fn new(k: u8) -> Result<Self, ValidationError> {
        if (TOP_K_MIN..=TOP_K_MAX).contains(&k) {
            Ok(Self(k))
        } else {
            Err(ValidationError::TopKOutOfRange)
        }
    }

    /// Like [`TopK::new`] but for values parsed from wider integers
    pub fn new_checked(k: i64) -> Result<Self, ValidationError> {
        u8::try_from(k)
            .map_err(|_| ValidationError::TopKOutOfRange)
            .and_then(Self::new)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Next value in the interactive selector, wrapping 10 -> 1
    pub fn cycle_up(self) -> Self {
        if self.0 >= TOP_K_UI_MAX {
            Self(TOP_K_MIN)
        } else {
            Self(self.0 + 1)
        }
    }

    /// Previous value in the interactive selector, wrapping 1 -> 10
    pub fn cycle_down(self) -> Self {
        if self.0 <= TOP_K_MIN || self.0 > TOP_K_UI_MAX {
            Self(TOP_K_UI_MAX)
        } else {
            Self(self.0 - 1)
        }
    }
}

impl Default for TopK {
    fn default() -> Self {
        Self(crate::config::DEFAULT_TOP_K)
    }
}

impl fmt::Display for TopK {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Non-empty after trimming.
pub fn require_text(text: &str) -> Result<&str, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(ValidationError::EmptyQuestion)
    } else {
        Ok(trimmed)
    }
}

/// Full question check (length bounds counted in characters, after trimming).
pub fn validate_question(question: &str) -> Result<&str, ValidationError> {
    let trimmed = require_text(question)?;
    let len = trimmed.chars().count();
    if len < QUESTION_MIN_CHARS {
        return Err(ValidationError::QuestionTooShort);
    }
    if len > QUESTION_MAX_CHARS {
        return Err(ValidationError::QuestionTooLong);
    }
    Ok(trimmed)
}

/// Check that `path` names an existing PDF no larger than 50MB.
///
/// The `%PDF-` signature is checked in addition to the extension.
pub fn validate_pdf(path: &Path) -> Result<u64, ValidationError> {
    let meta = std::fs::metadata(path).map_err(|_| ValidationError::NoFile)?;
    if !meta.is_file() {
        return Err(ValidationError::NoFile);
    }

    let has_pdf_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    if !has_pdf_ext {
        return Err(ValidationError::NotPdf);
    }

    if meta.len() > PDF_MAX_BYTES {
        return Err(ValidationError::FileTooLarge);
    }

    let mut head = [0u8; 5];
    let matches_magic = std::fs::File::open(path)
        .and_then(|mut f| std::io::Read::read_exact(&mut f, &mut head))
        .map(|_| head == PDF_MAGIC)
        .unwrap_or(false);
    if !matches_magic {
        return Err(ValidationError::NotPdf);
    }

    Ok(meta.len())
}

pub fn validate_system_name(name: &str) -> Result<&str, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        Err(ValidationError::EmptySystemName)
    } else {
        Ok(trimmed)
    }
}

pub fn validate_login(username: &str, password: &str) -> Result<(), ValidationError> {
    if username.trim().is_empty() || password.is_empty() {
        return Err(ValidationError::MissingCredentials);
    }
    Ok(())
}
