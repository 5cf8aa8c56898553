//! Source correlation results

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Source position a GPU program counter maps back to
///
/// Fields are empty (and `line` is zero) when the binary carries no line
/// information for the queried offset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Line number, 0 when unknown
    pub line: u32,

    /// File name as recorded in the binary
    pub file: String,

    /// Directory the file was compiled from
    pub dir: String,
}

impl SourceLocation {
    /// Check whether any source information was found
    pub fn is_resolved(&self) -> bool {
        self.line != 0 || !self.file.is_empty()
    }

    /// Full path of the source file, joining directory and file name
    pub fn path(&self) -> PathBuf {
        if self.dir.is_empty() {
            PathBuf::from(&self.file)
        } else {
            PathBuf::from(&self.dir).join(&self.file)
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_resolved() {
            return f.write_str("<unknown>");
        }
        write!(f, "{}:{}", self.path().display(), self.line)
    }
}
