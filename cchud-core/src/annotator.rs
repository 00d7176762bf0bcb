//! Map classified records onto lines of the analyzed file

use crate::bucketer::{Buckets, SeverityBucket};
use crate::parser::ComplexityRecord;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Half-open range of 0-based line indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    /// The single line at 0-based `index`
    pub const fn line(index: usize) -> Self {
        Self {
            start: index,
            end: index + 1,
        }
    }
}

/// A record placed on a line of the current target file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedRange {
    pub range: LineRange,
    pub record: ComplexityRecord,
    pub bucket: SeverityBucket,
}

impl AnnotatedRange {
    /// e.g. `high complexity 20 (traditional 18)`
    pub fn label(&self) -> String {
        format!(
            "{} complexity {} (traditional {})",
            self.bucket, self.record.modified_complexity, self.record.traditional_complexity
        )
    }
}

/// 0-based index of a 1-based line number, if it exists in a file of
/// `line_count` lines
fn line_index(line: u32, line_count: usize) -> Option<usize> {
    let index = usize::try_from(line).ok()?.checked_sub(1)?;
    (index < line_count).then_some(index)
}

/// Place every record of `buckets` in a file that currently has
/// `line_count` lines.
///
/// The definition line is preferred; the first line is used when it is
/// missing or past the end. Records that fit neither are dropped, since the
/// file may have shrunk after the analysis started.
pub fn annotate(buckets: &Buckets, line_count: usize) -> Vec<AnnotatedRange> {
    buckets
        .iter()
        .filter_map(|(bucket, record)| {
            let index = record
                .definition_line
                .and_then(|line| line_index(line, line_count))
                .or_else(|| line_index(record.first_line, line_count));

            if index.is_none() {
                debug!(
                    function = %record.function_name,
                    line = record.anchor_line(),
                    line_count,
                    "dropping annotation outside the target file"
                );
            }

            index.map(|index| AnnotatedRange {
                range: LineRange::line(index),
                record: record.clone(),
                bucket,
            })
        })
        .collect()
}
