//! Per-date Parquet partitions.
//!
//! Each (ticker, date) pair owns one file:
//!
//! ```text
//! <output_root>/<ticker>/NewsData/<ticker>_<YYYY-MM-DD>.parquet
//! ```
//!
//! New rows are merged into the existing file and deduplicated by `link`,
//! keeping the first occurrence. The merged table is written to a sibling
//! `.tmp` file which is then renamed over the destination, so a reader
//! never sees a half-written partition.

use crate::config::news_dir;
use crate::error::{NewsError, Result};
use crate::models::NewsRecord;
use arrow::array::{Array, ArrayRef, AsArray, Date32Builder, StringArray, StringBuilder};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Date32Type, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use chrono::{Duration, NaiveDate};
use itertools::Itertools;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Column names, in on-disk order.
pub const COLUMNS: [&str; 4] = ["title", "date", "link", "body"];

/// Outcome of writing one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionWrite {
    pub path: PathBuf,
    /// Rows in the file after the write.
    pub rows: usize,
    /// Rows that were not already present.
    pub added: usize,
    /// Whether an existing file was merged.
    pub merged: bool,
}

/// Arrow schema of a partition file.
pub fn news_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("title", DataType::Utf8, true),
        Field::new("date", DataType::Date32, true),
        Field::new("link", DataType::Utf8, true),
        Field::new("body", DataType::Utf8, true),
    ]))
}

pub fn partition_path(output_root: &Path, ticker: &str, date: NaiveDate) -> PathBuf {
    news_dir(output_root, ticker).join(format!("{}_{}.parquet", ticker, date.format("%Y-%m-%d")))
}

/// Split accepted records by their own effective date.
pub fn group_by_date(records: Vec<NewsRecord>) -> BTreeMap<NaiveDate, Vec<NewsRecord>> {
    let mut groups: BTreeMap<NaiveDate, Vec<NewsRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.date).or_default().push(record);
    }
    groups
}

/// Concatenate and drop repeated links, first occurrence wins.
pub fn merge_records(existing: Vec<NewsRecord>, new: Vec<NewsRecord>) -> Vec<NewsRecord> {
    existing
        .into_iter()
        .chain(new)
        .unique_by(|r| r.link.clone())
        .collect()
}

/// Merge `records` into the partition for `date` and replace it atomically.
///
/// # Arguments
///
/// * `output_root` - Directory holding the `<ticker>/NewsData` trees
/// * `ticker` - Ticker symbol, used in the directory and file name
/// * `date` - Effective date shared by all `records`
/// * `records` - New rows; rows whose `link` is already present are dropped
///
/// # Returns
///
/// A [`PartitionWrite`] with the file path, total rows, newly added rows,
/// and whether an existing file was merged.
///
/// # Errors
///
/// Returns an error if the existing file cannot be read or the new file
/// cannot be written. The canonical file is left untouched in that case.
#[instrument(level = "info", skip_all, fields(%ticker, %date, new = records.len()))]
pub fn write_partition(
    output_root: &Path,
    ticker: &str,
    date: NaiveDate,
    records: Vec<NewsRecord>,
) -> Result<PartitionWrite> {
    let path = partition_path(output_root, ticker, date);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let (existing, merged) = if path.exists() {
        (read_records(&path, date)?, true)
    } else {
        (Vec::new(), false)
    };
    let before = existing.len();
    let combined = merge_records(existing, records);
    let added = combined.len() - before;

    if merged {
        info!(path = %path.display(), total = combined.len(), added, "Merging into existing file");
    } else {
        info!(path = %path.display(), total = combined.len(), "Creating new file");
    }

    write_atomic(&path, &combined)?;
    info!(path = %path.display(), "Saved partition");

    Ok(PartitionWrite {
        path,
        rows: combined.len(),
        added,
        merged,
    })
}

/// Write `records` to `<path>.tmp`, then rename over `path`.
pub fn write_atomic(path: &Path, records: &[NewsRecord]) -> Result<()> {
    let tmp = temp_path(path);
    if let Err(e) = write_file(&tmp, records) {
        warn!(path = %tmp.display(), error = %e, "Write failed; removing temp file");
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

fn write_file(path: &Path, records: &[NewsRecord]) -> Result<()> {
    let batch = build_record_batch(records)?;
    let file = File::create(path)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    let file = writer.into_inner()?;
    file.sync_all()?;
    Ok(())
}

fn build_record_batch(records: &[NewsRecord]) -> Result<RecordBatch> {
    let n = records.len();
    let mut title = StringBuilder::with_capacity(n, n * 64);
    let mut date = Date32Builder::with_capacity(n);
    let mut link = StringBuilder::with_capacity(n, n * 96);
    let mut body = StringBuilder::with_capacity(n, n * 2048);

    for record in records {
        title.append_value(&record.title);
        date.append_value(date_to_days(record.date));
        link.append_value(&record.link);
        body.append_value(&record.body);
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(title.finish()),
        Arc::new(date.finish()),
        Arc::new(link.finish()),
        Arc::new(body.finish()),
    ];
    Ok(RecordBatch::try_new(news_schema(), columns)?)
}

/// Read a partition file.
///
/// String columns may be any Arrow string type; `date` may be a date,
/// timestamp or string column. Null strings read as empty, null dates as
/// `fallback_date`.
pub fn read_records(path: &Path, fallback_date: NaiveDate) -> Result<Vec<NewsRecord>> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut records = Vec::new();
    for batch in reader {
        let batch = batch?;
        let title = string_column(&batch, "title")?;
        let link = string_column(&batch, "link")?;
        let body = string_column(&batch, "body")?;
        let dates = cast(required_column(&batch, "date")?, &DataType::Date32)?;
        let dates = dates.as_primitive::<Date32Type>();

        let title = title.as_string::<i32>();
        let link = link.as_string::<i32>();
        let body = body.as_string::<i32>();

        for i in 0..batch.num_rows() {
            let date = if dates.is_null(i) {
                fallback_date
            } else {
                days_to_date(dates.value(i)).unwrap_or(fallback_date)
            };
            records.push(NewsRecord {
                title: nullable_str(title, i),
                date,
                link: nullable_str(link, i),
                body: nullable_str(body, i),
            });
        }
    }
    debug!(path = %path.display(), rows = records.len(), "Read partition");
    Ok(records)
}

fn required_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
    batch
        .column_by_name(name)
        .ok_or_else(|| NewsError::MissingColumn(name.to_string()))
}

fn string_column(batch: &RecordBatch, name: &str) -> Result<ArrayRef> {
    Ok(cast(required_column(batch, name)?, &DataType::Utf8)?)
}

fn nullable_str(array: &StringArray, i: usize) -> String {
    if array.is_null(i) {
        String::new()
    } else {
        array.value(i).to_string()
    }
}

fn unix_epoch() -> NaiveDate {
    NaiveDate::default()
}

pub(crate) fn date_to_days(date: NaiveDate) -> i32 {
    (date - unix_epoch()).num_days() as i32
}

pub(crate) fn days_to_date(days: i32) -> Option<NaiveDate> {
    unix_epoch().checked_add_signed(Duration::days(days as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{LargeStringArray, TimestampMicrosecondArray};
    use tempfile::tempdir;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
    }

    fn record(link: &str, title: &str) -> NewsRecord {
        NewsRecord {
            title: title.to_string(),
            date: day(),
            link: link.to_string(),
            body: format!("body of {link}"),
        }
    }

    fn links(records: &[NewsRecord]) -> Vec<String> {
        records.iter().map(|r| r.link.clone()).collect()
    }

    #[test]
    fn test_partition_path() {
        assert_eq!(
            partition_path(Path::new("/out"), "NVDA", day()),
            PathBuf::from("/out/NVDA/NewsData/NVDA_2025-01-15.parquet")
        );
    }

    #[test]
    fn test_date_days_conversion() {
        assert_eq!(date_to_days(NaiveDate::from_ymd_opt(1970, 1, 2).unwrap()), 1);
        assert_eq!(days_to_date(date_to_days(day())), Some(day()));
    }

    #[test]
    fn test_group_by_date() {
        let mut other = record("x", "x");
        other.date = NaiveDate::from_ymd_opt(2025, 1, 16).unwrap();
        let groups = group_by_date(vec![record("a", "a"), other, record("b", "b")]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&day()].len(), 2);
    }

    #[test]
    fn test_merge_keeps_first_occurrence() {
        let existing = vec![record("a", "old a"), record("b", "old b")];
        let new = vec![record("b", "new b"), record("c", "new c"), record("c", "dup c")];
        let merged = merge_records(existing, new);
        assert_eq!(links(&merged), vec!["a", "b", "c"]);
        assert_eq!(merged[1].title, "old b");
        assert_eq!(merged[2].title, "new c");
    }

    #[test]
    fn test_write_new_partition() {
        let tmp = tempdir().unwrap();
        let write =
            write_partition(tmp.path(), "NVDA", day(), vec![record("a", "A"), record("a", "A2")]).unwrap();
        assert!(!write.merged);
        assert_eq!(write.rows, 1);
        let back = read_records(&write.path, day()).unwrap();
        assert_eq!(back, vec![record("a", "A")]);
    }

    #[test]
    fn test_merge_into_existing_partition() {
        let tmp = tempdir().unwrap();
        write_partition(
            tmp.path(),
            "NVDA",
            day(),
            vec![record("a", "A"), record("b", "B"), record("c", "C")],
        )
        .unwrap();

        let write =
            write_partition(tmp.path(), "NVDA", day(), vec![record("b", "B again"), record("d", "D")])
                .unwrap();
        assert!(write.merged);
        assert_eq!(write.rows, 4);
        assert_eq!(write.added, 1);

        let back = read_records(&write.path, day()).unwrap();
        assert_eq!(links(&back), vec!["a", "b", "c", "d"]);
        assert_eq!(back[1].title, "B");
    }

    #[test]
    fn test_rewriting_same_batch_is_idempotent() {
        let tmp = tempdir().unwrap();
        let batch = vec![record("a", "A"), record("b", "B")];
        let first = write_partition(tmp.path(), "NVDA", day(), batch.clone()).unwrap();
        let once = read_records(&first.path, day()).unwrap();
        let second = write_partition(tmp.path(), "NVDA", day(), batch).unwrap();
        let twice = read_records(&second.path, day()).unwrap();
        assert_eq!(once, twice);
        assert_eq!(second.added, 0);
    }

    #[test]
    fn test_stale_temp_file_does_not_affect_canonical_file() {
        let tmp = tempdir().unwrap();
        let first = write_partition(tmp.path(), "NVDA", day(), vec![record("a", "A")]).unwrap();

        // A write interrupted after creating the temp file.
        fs::write(temp_path(&first.path), b"PAR1 truncated").unwrap();
        assert_eq!(read_records(&first.path, day()).unwrap(), vec![record("a", "A")]);

        let second = write_partition(tmp.path(), "NVDA", day(), vec![record("b", "B")]).unwrap();
        assert_eq!(second.rows, 2);
        assert!(!temp_path(&second.path).exists());
    }

    #[test]
    fn test_read_accepts_other_arrow_types() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("foreign.parquet");
        let schema = Arc::new(Schema::new(vec![
            Field::new("title", DataType::LargeUtf8, true),
            Field::new(
                "date",
                DataType::Timestamp(arrow::datatypes::TimeUnit::Microsecond, None),
                true,
            ),
            Field::new("link", DataType::LargeUtf8, true),
            Field::new("body", DataType::LargeUtf8, true),
        ]));
        let micros = day().and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp_micros();
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(LargeStringArray::from(vec![Some("T"), None])),
                Arc::new(TimestampMicrosecondArray::from(vec![Some(micros), None])),
                Arc::new(LargeStringArray::from(vec![Some("l1"), Some("l2")])),
                Arc::new(LargeStringArray::from(vec![Some("B"), Some("B2")])),
            ],
        )
        .unwrap();
        let mut writer = ArrowWriter::try_new(File::create(&path).unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let fallback = NaiveDate::from_ymd_opt(2025, 1, 16).unwrap();
        let back = read_records(&path, fallback).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[0].date, day());
        assert_eq!(back[1].title, "");
        assert_eq!(back[1].date, fallback);
    }

    #[test]
    fn test_read_reports_missing_column() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("bad.parquet");
        let schema = Arc::new(Schema::new(vec![Field::new("title", DataType::Utf8, true)]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(StringArray::from(vec!["t"])) as ArrayRef],
        )
        .unwrap();
        let mut writer = ArrowWriter::try_new(File::create(&path).unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        assert!(matches!(
            read_records(&path, day()),
            Err(NewsError::MissingColumn(c)) if c == "link"
        ));
    }
}
