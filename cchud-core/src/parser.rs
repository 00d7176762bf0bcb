//! Parse pmccabe result lines
//!
//! A result line looks like
//!
//! ```text
//! 3	2	5	10	4	foo.c(12): my_function
//! ```
//!
//! modified complexity, traditional complexity, statements, first line and
//! line span, optionally a sixth count (non-comment lines, emitted by some
//! analyzer builds), then `file(definition line): function name`. Older
//! analyzers omit the parenthesised definition line. Both forms are accepted
//! without configuration.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    // After `(line)` the colon alone ends the file name. Without it the
    // colon must be followed by whitespace, since a drive letter
    // (`C:\src\foo.c`) never is.
    static ref RECORD_LINE: Regex = Regex::new(
        r"^\s*(\d+)\s+(\d+)\s+(\d+)\s+(\d+)\s+(\d+)(?:\s+(\d+))?\s+(\S.*?)(?:\((\d+)\):\s*|:\s+)(\S.*?)\s*$"
    )
    .expect("record line pattern is valid");
}

/// One function reported by the analyzer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexityRecord {
    pub modified_complexity: u32,
    pub traditional_complexity: u32,
    pub statements: u32,
    /// 1-based first line of the function
    pub first_line: u32,
    pub line_span: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub non_comment_lines: Option<u32>,
    pub file: String,
    /// 1-based line of the definition, when the analyzer reports it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition_line: Option<u32>,
    pub function_name: String,
}

impl ComplexityRecord {
    /// Line used to place the record in the source, 1-based
    pub fn anchor_line(&self) -> u32 {
        self.definition_line.unwrap_or(self.first_line)
    }
}

/// Match one line against the result grammar.
///
/// Banner, summary and diagnostic lines yield `None`; so do counts too large
/// for a `u32`.
pub fn parse_line(line: &str) -> Option<ComplexityRecord> {
    let caps = RECORD_LINE.captures(line)?;
    let number = |i: usize| caps.get(i).map(|m| m.as_str().parse::<u32>());

    Some(ComplexityRecord {
        modified_complexity: number(1)?.ok()?,
        traditional_complexity: number(2)?.ok()?,
        statements: number(3)?.ok()?,
        first_line: number(4)?.ok()?,
        line_span: number(5)?.ok()?,
        non_comment_lines: number(6).transpose().ok()?,
        file: caps.get(7)?.as_str().to_string(),
        definition_line: number(8).transpose().ok()?,
        function_name: caps.get(9)?.as_str().to_string(),
    })
}

/// Parse every matching line of `output`, in order
pub fn parse_output(output: &str) -> Vec<ComplexityRecord> {
    output.lines().filter_map(parse_line).collect()
}
