//! Display collaborator driven by [`crate::AnalysisSession`]

use crate::annotator::LineRange;
use crate::bucketer::SeverityBucket;

/// Where analysis output and results are rendered.
///
/// Every method is called from the single consumer that drains the session,
/// never from the output readers.
pub trait RenderSurface {
    /// Append streamed analyzer output
    fn append_text(&mut self, text: &str);

    /// Highlight output lines belonging to `bucket`; replaces earlier
    /// regions of the same bucket
    fn set_regions(&mut self, bucket: SeverityBucket, ranges: &[LineRange], style_hint: &str);

    /// Attach `labels[i]` to `ranges[i]` of the analyzed source
    fn set_annotations(&mut self, ranges: &[LineRange], labels: &[String]);

    fn status_message(&mut self, text: &str);

    /// A problem the user has to fix before a run can start
    fn error_dialog(&mut self, text: &str);
}
