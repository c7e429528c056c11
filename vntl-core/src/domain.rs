// vntl_core/src/domain.rs
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::VntlError;

/// Which half of a job workspace a request addresses.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Area {
    Input,
    #[default]
    Output,
}

impl Area {
    pub fn dir_name(self) -> &'static str {
        match self {
            Area::Input => "input",
            Area::Output => "output",
        }
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for Area {
    type Err = VntlError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "input" => Ok(Area::Input),
            "output" => Ok(Area::Output),
            other => Err(VntlError::InvalidParams(format!(
                "where must be input or output, got {other:?}"
            ))),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
}

/// Node of a directory listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEntry {
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub name: String,
    /// Relative to the listed root, forward slashes; `""` for the root.
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub children: Option<Vec<PathEntry>>,
}

/// One row of an archive listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EntryRow {
    pub name: String,
    pub size: u64,
    pub offset: u64,
    pub segments: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    Ok,
    Skipped,
    Error,
}

/// Result of processing one file during a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOutcome {
    pub path: String,
    pub kind: OutcomeKind,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
}

impl FileOutcome {
    pub fn ok(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: OutcomeKind::Ok,
            message: None,
        }
    }

    pub fn skipped(path: impl Into<String>, why: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: OutcomeKind::Skipped,
            message: Some(why.into()),
        }
    }

    pub fn error(path: impl Into<String>, err: &VntlError) -> Self {
        Self {
            path: path.into(),
            kind: OutcomeKind::Error,
            message: Some(err.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.kind == OutcomeKind::Ok
    }
}
