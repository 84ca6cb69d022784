// src/view_match.rs

//! Decides whether a change on disk invalidates what a viewer is looking at.

use crate::paths::is_markdown;
use serde::{Deserialize, Serialize};

/// Whether a view shows a single document or a directory listing.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ViewKind {
    Document,
    Listing,
}

impl ViewKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ViewKind::Document => "document",
            ViewKind::Listing => "listing",
        }
    }

    /// Guesses the kind from the identifier alone: `.md` means a document.
    ///
    /// Wrong for a directory whose name ends in `.md`; prefer the kind the
    /// renderer recorded whenever it is available.
    pub fn infer(view: &str) -> Self {
        if is_markdown(view) {
            ViewKind::Document
        } else {
            ViewKind::Listing
        }
    }
}

/// What one viewer is looking at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    /// Canonical relative path (see [`crate::paths::normalize`])
    pub id: String,
    pub kind: ViewKind,
}

impl View {
    pub fn new(id: impl Into<String>, kind: ViewKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    /// Returns `true` if this view should reload after `changed` was touched.
    ///
    /// - A change to exactly the viewed path always reloads.
    /// - A listing also reloads for any path nested below it, at any depth.
    ///   The root listing (empty id) only counts top-level paths.
    /// - Nothing else reloads.
    pub fn should_reload(&self, changed: &str) -> bool {
        if changed == self.id {
            return true;
        }
        if self.kind == ViewKind::Document {
            return false;
        }
        if self.id.is_empty() {
            return !changed.is_empty() && !changed.contains('/');
        }
        changed
            .strip_prefix(self.id.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    }
}

/// [`View::should_reload`] for a bare identifier, with the kind inferred from
/// its suffix.
pub fn should_reload(view: &str, changed: &str) -> bool {
    View::new(view, ViewKind::infer(view)).should_reload(changed)
}
