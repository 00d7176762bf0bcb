//! Severity tiers for complexity records

use crate::parser::ComplexityRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity tier of one record, derived from its modified complexity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityBucket {
    Low,
    Medium,
    High,
}

impl SeverityBucket {
    /// Every bucket, least severe first
    pub const ALL: [Self; 3] = [Self::Low, Self::Medium, Self::High];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Style scope handed to the rendering surface for this bucket
    pub const fn style_hint(self) -> &'static str {
        match self {
            Self::Low => "region.greenish",
            Self::Medium => "region.yellowish",
            Self::High => "region.redish",
        }
    }
}

impl fmt::Display for SeverityBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bucket boundaries. `medium <= high` is expected but not enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub high: u32,
    pub medium: u32,
}

impl Thresholds {
    pub const fn classify(self, record: &ComplexityRecord) -> SeverityBucket {
        classify(record, self.high, self.medium)
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { high: 15, medium: 7 }
    }
}

/// Above `high` is high, else above `medium` is medium, else low
pub const fn classify(record: &ComplexityRecord, high: u32, medium: u32) -> SeverityBucket {
    if record.modified_complexity > high {
        SeverityBucket::High
    } else if record.modified_complexity > medium {
        SeverityBucket::Medium
    } else {
        SeverityBucket::Low
    }
}

/// Records grouped by severity, each group in analyzer output order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buckets {
    pub low: Vec<ComplexityRecord>,
    pub medium: Vec<ComplexityRecord>,
    pub high: Vec<ComplexityRecord>,
}

impl Buckets {
    pub fn get(&self, bucket: SeverityBucket) -> &[ComplexityRecord] {
        match bucket {
            SeverityBucket::Low => &self.low,
            SeverityBucket::Medium => &self.medium,
            SeverityBucket::High => &self.high,
        }
    }

    fn get_mut(&mut self, bucket: SeverityBucket) -> &mut Vec<ComplexityRecord> {
        match bucket {
            SeverityBucket::Low => &mut self.low,
            SeverityBucket::Medium => &mut self.medium,
            SeverityBucket::High => &mut self.high,
        }
    }

    /// All records, bucket by bucket from low to high
    pub fn iter(&self) -> impl Iterator<Item = (SeverityBucket, &ComplexityRecord)> {
        SeverityBucket::ALL
            .into_iter()
            .flat_map(move |bucket| self.get(bucket).iter().map(move |record| (bucket, record)))
    }

    pub fn len(&self) -> usize {
        self.low.len() + self.medium.len() + self.high.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Classify every record, keeping relative order within each bucket
pub fn partition<I>(records: I, thresholds: Thresholds) -> Buckets
where
    I: IntoIterator<Item = ComplexityRecord>,
{
    let mut buckets = Buckets::default();
    for record in records {
        let bucket = thresholds.classify(&record);
        buckets.get_mut(bucket).push(record);
    }
    buckets
}
