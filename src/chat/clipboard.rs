//! System clipboard access

use crate::{RagdeskError, Result};
use std::sync::{Arc, Mutex};

pub trait Clipboard {
    fn set_text(&mut self, text: &str) -> Result<()>;
}

/// Clipboard backed by `arboard`. The handle is opened lazily so headless
/// sessions only fail when something is actually copied.
#[derive(Default)]
pub struct SystemClipboard {
    inner: Option<arboard::Clipboard>,
}

impl SystemClipboard {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clipboard for SystemClipboard {
    fn set_text(&mut self, text: &str) -> Result<()> {
        if self.inner.is_none() {
            let cb = arboard::Clipboard::new().map_err(|e| RagdeskError::Clipboard(e.to_string()))?;
            self.inner = Some(cb);
        }
        match self.inner.as_mut() {
            Some(cb) => cb
                .set_text(text.to_string())
                .map_err(|e| RagdeskError::Clipboard(e.to_string())),
            None => Err(RagdeskError::Clipboard("clipboard not available".to_string())),
        }
    }
}

/// In-process clipboard; the last copied text is readable through the
/// shared handle.
#[derive(Debug, Clone, Default)]
pub struct MemoryClipboard {
    contents: Arc<Mutex<Option<String>>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Option<String> {
        self.contents.lock().ok().and_then(|c| c.clone())
    }
}

impl Clipboard for MemoryClipboard {
    fn set_text(&mut self, text: &str) -> Result<()> {
        let mut slot = self
            .contents
            .lock()
            .map_err(|e| RagdeskError::Clipboard(e.to_string()))?;
        *slot = Some(text.to_string());
        Ok(())
    }
}
