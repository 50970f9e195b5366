//! Per-generation statistics artifact (CSV).
//!
//! The sink is a pure side effect: experiments push rows into it and never
//! read them back.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::core::stats::GenerationStats;

/// Fixed header row of the statistics file.
pub const STATS_HEADER: &str = "generation,totalResources,averageResources,stdDev,inequality,successfulDonations,failedDonations,successRatePercent";

/// Destination for per-generation statistics rows.
pub trait StatsSink {
    fn record(&mut self, generation: u32, stats: &GenerationStats) -> Result<()>;
}

/// Writes the header on creation and one comma-separated row per generation.
pub struct CsvStatsSink {
    path: PathBuf,
    file: File,
}

impl CsvStatsSink {
    /// Create (or truncate) the stats file and write the header row.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create stats directory {}", parent.display()))?;
        }
        let mut file =
            File::create(&path).with_context(|| format!("create stats file {}", path.display()))?;
        writeln!(file, "{STATS_HEADER}")
            .with_context(|| format!("write stats header {}", path.display()))?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StatsSink for CsvStatsSink {
    fn record(&mut self, generation: u32, stats: &GenerationStats) -> Result<()> {
        writeln!(
            self.file,
            "{},{:.2},{:.2},{:.2},{:.2},{},{},{:.1}",
            generation,
            stats.total_resources,
            stats.average_resources,
            stats.std_dev,
            stats.inequality,
            stats.successful_donations,
            stats.failed_donations,
            stats.success_rate_percent(),
        )
        .with_context(|| format!("write stats row {}", self.path.display()))?;
        self.file
            .flush()
            .with_context(|| format!("flush stats file {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample_stats() -> GenerationStats {
        let resources: HashMap<String, f64> = [("a".to_string(), 5.0), ("b".to_string(), 20.0)]
            .into_iter()
            .collect();
        GenerationStats::from_ledger(&resources, 3, 1)
    }

    #[test]
    fn writes_header_and_rows() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("stats.csv");

        let mut sink = CsvStatsSink::create(&path).expect("create");
        sink.record(1, &sample_stats()).expect("record");

        let contents = fs::read_to_string(&path).expect("read");
        let mut lines = contents.lines();
        assert_eq!(lines.next(), Some(STATS_HEADER));
        assert_eq!(lines.next(), Some("1,25.00,12.50,7.50,15.00,3,1,75.0"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn creates_missing_parent_directories() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested/run/stats.csv");
        CsvStatsSink::create(&path).expect("create with parents");
        assert!(path.exists());
    }

    #[test]
    fn recreate_truncates_previous_contents() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("stats.csv");
        let mut sink = CsvStatsSink::create(&path).expect("create");
        sink.record(1, &sample_stats()).expect("record");
        drop(sink);

        CsvStatsSink::create(&path).expect("recreate");
        let contents = fs::read_to_string(&path).expect("read");
        assert_eq!(contents.lines().count(), 1, "only the header remains");
    }
}
