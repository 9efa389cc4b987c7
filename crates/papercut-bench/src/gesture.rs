//! Layer-store edits given on the command line.

use std::fmt;
use std::str::FromStr;

use papercut_io::HttpFetcher;
use papercut_pipeline::{PipelineError, Session};

/// One edit, as a user would make it by dragging layers around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    /// Merge the layer at `source` into the layer at `target`.
    Merge { source: usize, target: usize },
    /// Move the layer at `from` to position `to`.
    Reorder { from: usize, to: usize },
}

impl Gesture {
    /// Apply the edit to `session`.
    pub async fn apply(self, session: &mut Session, fetcher: &HttpFetcher) -> Result<(), PipelineError> {
        match self {
            Self::Merge { source, target } => {
                session.merge(source, target, fetcher).await?;
            }
            Self::Reorder { from, to } => session.reorder(from, to)?,
        }
        Ok(())
    }
}

impl fmt::Display for Gesture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Merge { source, target } => write!(f, "merge={source}:{target}"),
            Self::Reorder { from, to } => write!(f, "reorder={from}:{to}"),
        }
    }
}

impl FromStr for Gesture {
    type Err = String;

    /// Parse `merge=S:T` or `reorder=F:T`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, pair) = s
            .split_once('=')
            .ok_or_else(|| format!("expected merge=S:T or reorder=F:T, got {s:?}"))?;
        let (a, b) = pair
            .split_once(':')
            .ok_or_else(|| format!("expected two indices separated by ':', got {pair:?}"))?;
        let a: usize = a
            .trim()
            .parse()
            .map_err(|e| format!("invalid index {a:?}: {e}"))?;
        let b: usize = b
            .trim()
            .parse()
            .map_err(|e| format!("invalid index {b:?}: {e}"))?;

        match kind.trim() {
            "merge" => Ok(Self::Merge {
                source: a,
                target: b,
            }),
            "reorder" => Ok(Self::Reorder { from: a, to: b }),
            other => Err(format!("unknown gesture {other:?}")),
        }
    }
}
