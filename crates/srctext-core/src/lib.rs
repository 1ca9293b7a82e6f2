use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Workspace-wide result alias.
pub type Result<T> = color_eyre::eyre::Result<T>;

/// Comment prefix marking the current canonical English text.
pub const DEFAULT_MARKER_PREFIX: &str = "EN:";

/// Message templates that legitimately carry example markup in their text.
pub const DEFAULT_LITERAL_MARKUP_TAGS: &[&str] = &["letterText", "messageText"];

/// Inline markup tags whose escaped form is restored after serialization.
pub const DEFAULT_ESCAPE_RESTORE_TAGS: &[&str] = &["li", "b", "i"];

/// Rule operators kept readable in serialized text.
pub const DEFAULT_ESCAPE_RESTORE_OPERATORS: &[&str] = &["-&gt;", "&gt;="];

/// How escaped `>` characters are restored after serialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EscapePolicy {
    /// Only allow-listed tags and operators are restored.
    #[default]
    AllowList,
    /// Allow-listed tags are restored, then every remaining `&gt;` becomes `>`.
    AllGt,
}

/// What happens to a marker comment once its text was applied to an element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommentPolicy {
    /// The comment stays in the file as a permanent annotation.
    #[default]
    Keep,
    /// The comment is dropped from the tree after it was applied.
    Remove,
}

/// Fixed knobs of the propagation pass, resolved once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rules {
    pub marker_prefix: String,
    pub literal_markup_tags: Vec<String>,
    pub escape_restore_tags: Vec<String>,
    pub escape_restore_operators: Vec<String>,
    pub escape_policy: EscapePolicy,
    pub comment_policy: CommentPolicy,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            marker_prefix: DEFAULT_MARKER_PREFIX.to_string(),
            literal_markup_tags: to_owned_list(DEFAULT_LITERAL_MARKUP_TAGS),
            escape_restore_tags: to_owned_list(DEFAULT_ESCAPE_RESTORE_TAGS),
            escape_restore_operators: to_owned_list(DEFAULT_ESCAPE_RESTORE_OPERATORS),
            escape_policy: EscapePolicy::default(),
            comment_policy: CommentPolicy::default(),
        }
    }
}

impl Rules {
    pub fn is_literal_markup(&self, tag: &str) -> bool {
        self.literal_markup_tags.iter().any(|t| t == tag)
    }
}

fn to_owned_list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Per-file failure. Never aborts a batch on its own.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("parse error at byte {position}: {message}")]
    Parse { position: u64, message: String },
    #[error("input is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("no root element found")]
    NoRoot,
    #[error("cannot serialize document: {0}")]
    Write(String),
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TransformError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Short category used in reports: `parse` or `io`.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Io { .. } | Self::Write(_) => "io",
            Self::Parse { .. } | Self::Encoding(_) | Self::NoRoot => "parse",
        }
    }
}
