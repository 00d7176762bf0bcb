//! Terminal rendering of analysis output

use cchud_core::{LineRange, RenderSurface, SeverityBucket};
use crossterm::style::{StyledContent, Stylize};
use crossterm::tty::IsTty;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Renders to stdout; status and errors go to stderr.
///
/// In JSON mode only status and errors are printed, leaving stdout to the
/// report.
pub struct TerminalSurface {
    target: PathBuf,
    json: bool,
    color: bool,
}

impl TerminalSurface {
    pub fn new(target: &Path, json: bool) -> Self {
        Self {
            target: target.to_path_buf(),
            json,
            color: io::stdout().is_tty(),
        }
    }

    fn paint<'a>(&self, text: &'a str, bucket: Option<SeverityBucket>) -> StyledContent<&'a str> {
        match bucket {
            Some(bucket) if self.color => match bucket {
                SeverityBucket::High => text.red().bold(),
                SeverityBucket::Medium => text.yellow(),
                SeverityBucket::Low => text.green(),
            },
            _ => text.stylize(),
        }
    }

    // A closed stdout (`cchud foo.c | head -1`) surfaces as a write error
    // here, which callers discard.
    fn write_regions(
        &self,
        out: &mut impl Write,
        bucket: SeverityBucket,
        ranges: &[LineRange],
    ) -> io::Result<()> {
        if ranges.is_empty() {
            return Ok(());
        }
        let heading = format!("{:<6}", bucket.name());
        writeln!(
            out,
            "{} output lines {}",
            self.paint(&heading, Some(bucket)),
            line_list(ranges)
        )?;
        out.flush()
    }

    fn write_annotations(
        &self,
        out: &mut impl Write,
        ranges: &[LineRange],
        labels: &[String],
    ) -> io::Result<()> {
        for (range, label) in ranges.iter().zip(labels) {
            writeln!(
                out,
                "{}:{}: {}",
                self.target.display(),
                range.start + 1,
                self.paint(label, label_bucket(label))
            )?;
        }
        out.flush()
    }
}

/// Bucket named by the first word of an annotation label
fn label_bucket(label: &str) -> Option<SeverityBucket> {
    let name = label.split_whitespace().next()?;
    SeverityBucket::ALL.into_iter().find(|bucket| bucket.name() == name)
}

fn line_list(ranges: &[LineRange]) -> String {
    ranges
        .iter()
        .map(|range| (range.start + 1).to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl RenderSurface for TerminalSurface {
    fn append_text(&mut self, text: &str) {
        if self.json {
            return;
        }
        let mut stdout = io::stdout().lock();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }

    fn set_regions(&mut self, bucket: SeverityBucket, ranges: &[LineRange], _style_hint: &str) {
        if self.json {
            return;
        }
        let _ = self.write_regions(&mut io::stdout().lock(), bucket, ranges);
    }

    fn set_annotations(&mut self, ranges: &[LineRange], labels: &[String]) {
        if self.json {
            return;
        }
        let _ = self.write_annotations(&mut io::stdout().lock(), ranges, labels);
    }

    fn status_message(&mut self, text: &str) {
        let text = if io::stderr().is_tty() {
            text.dim().to_string()
        } else {
            text.to_string()
        };
        eprintln!("{text}");
    }

    fn error_dialog(&mut self, text: &str) {
        if io::stderr().is_tty() {
            eprintln!("{} {}", "Error:".red().bold(), text);
        } else {
            eprintln!("Error: {text}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_bucket() {
        assert_eq!(
            label_bucket("high complexity 20 (traditional 18)"),
            Some(SeverityBucket::High)
        );
        assert_eq!(label_bucket("low complexity 1 (traditional 1)"), Some(SeverityBucket::Low));
        assert_eq!(label_bucket("unrelated"), None);
        assert_eq!(label_bucket(""), None);
    }

    #[test]
    fn test_line_list_is_one_based() {
        let ranges = [LineRange::line(0), LineRange::line(6)];
        assert_eq!(line_list(&ranges), "1, 7");
    }

    fn plain_surface() -> TerminalSurface {
        TerminalSurface {
            target: PathBuf::from("src/foo.c"),
            json: false,
            color: false,
        }
    }

    /// Stdout after the reading end of the pipe went away
    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::ErrorKind::BrokenPipe.into())
        }
    }

    #[test]
    fn test_write_annotations() {
        let surface = plain_surface();
        let mut out = Vec::new();
        let ranges = [LineRange::line(11), LineRange::line(30)];
        let labels = [
            "low complexity 3 (traditional 2)".to_string(),
            "high complexity 20 (traditional 18)".to_string(),
        ];
        surface.write_annotations(&mut out, &ranges, &labels).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "src/foo.c:12: low complexity 3 (traditional 2)\n\
             src/foo.c:31: high complexity 20 (traditional 18)\n"
        );
    }

    #[test]
    fn test_write_regions_skips_empty_bucket() {
        let surface = plain_surface();
        let mut out = Vec::new();
        surface.write_regions(&mut out, SeverityBucket::Medium, &[]).unwrap();
        assert!(out.is_empty());

        surface
            .write_regions(&mut out, SeverityBucket::High, &[LineRange::line(1)])
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "high   output lines 2\n");
    }

    #[test]
    fn test_closed_stdout_is_an_error_not_a_panic() {
        let surface = plain_surface();
        let ranges = [LineRange::line(0)];
        let labels = ["low complexity 1 (traditional 1)".to_string()];

        let err = surface.write_annotations(&mut ClosedPipe, &ranges, &labels).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        let err = surface
            .write_regions(&mut ClosedPipe, SeverityBucket::Low, &ranges)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
