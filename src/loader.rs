//! Bulk load of an aggregated Parquet file into PostgreSQL.
//!
//! The whole file is read into memory, then the target table is dropped,
//! recreated with one column per file column, and filled, all inside one
//! transaction. This replaces the table's contents; nothing is merged.

use crate::config::DatabaseSettings;
use crate::error::{NewsError, Result};
use crate::outputs::parquet::{COLUMNS, days_to_date};
use arrow::array::{Array, AsArray};
use arrow::compute::{CastOptions, cast_with_options};
use arrow::datatypes::{
    DataType, Date32Type, Float64Type, Int64Type, TimeUnit, TimestampMicrosecondType,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::fs::File;
use std::path::Path;
use tracing::{debug, info, instrument};

/// PostgreSQL's limit on bind parameters per statement.
const MAX_BIND_PARAMS: usize = 65_535;

/// Column type in the target table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PgType {
    Text,
    Date,
    BigInt,
    Double,
    Boolean,
    Timestamp,
}

impl PgType {
    /// Map an Arrow column type; anything unrecognised is stored as text.
    pub fn for_arrow(data_type: &DataType) -> Self {
        match data_type {
            DataType::Date32 | DataType::Date64 => PgType::Date,
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64 => PgType::BigInt,
            DataType::Float16 | DataType::Float32 | DataType::Float64 => PgType::Double,
            DataType::Boolean => PgType::Boolean,
            DataType::Timestamp(_, _) => PgType::Timestamp,
            _ => PgType::Text,
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            PgType::Text => "TEXT",
            PgType::Date => "DATE",
            PgType::BigInt => "BIGINT",
            PgType::Double => "DOUBLE PRECISION",
            PgType::Boolean => "BOOLEAN",
            PgType::Timestamp => "TIMESTAMP",
        }
    }

    fn arrow_target(&self) -> DataType {
        match self {
            PgType::Text => DataType::Utf8,
            PgType::Date => DataType::Date32,
            PgType::BigInt => DataType::Int64,
            PgType::Double => DataType::Float64,
            PgType::Boolean => DataType::Boolean,
            PgType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
        }
    }
}

/// A single value bound into an INSERT.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(Option<String>),
    Date(Option<NaiveDate>),
    BigInt(Option<i64>),
    Double(Option<f64>),
    Boolean(Option<bool>),
    Timestamp(Option<NaiveDateTime>),
}

/// In-memory copy of a Parquet file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<(String, PgType)>,
    pub rows: Vec<Vec<Cell>>,
}

/// Read the whole file. Only checks that the news columns are present.
///
/// Timezone-aware timestamps are stored as the wall clock of their zone.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn read_table(path: &Path) -> Result<Table> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)?;
    let schema = builder.schema().clone();

    for required in COLUMNS {
        if schema.field_with_name(required).is_err() {
            return Err(NewsError::MissingColumn(required.to_string()));
        }
    }

    let columns: Vec<(String, PgType)> = schema
        .fields()
        .iter()
        .map(|f| (f.name().clone(), PgType::for_arrow(f.data_type())))
        .collect();

    // Overflowing or unconvertible values are errors, not silent NULLs.
    let strict = CastOptions {
        safe: false,
        ..Default::default()
    };
    let mut rows: Vec<Vec<Cell>> = Vec::new();
    for batch in builder.build()? {
        let batch = batch?;
        let start = rows.len();
        rows.extend((0..batch.num_rows()).map(|_| Vec::with_capacity(columns.len())));

        for (idx, (_, pg_type)) in columns.iter().enumerate() {
            let array = cast_with_options(batch.column(idx), &pg_type.arrow_target(), &strict)?;
            for (offset, row) in rows[start..].iter_mut().enumerate() {
                row.push(cell_at(array.as_ref(), *pg_type, offset));
            }
        }
    }

    debug!(rows = rows.len(), columns = columns.len(), "Read table");
    Ok(Table { columns, rows })
}

fn cell_at(array: &dyn Array, pg_type: PgType, i: usize) -> Cell {
    let present = !array.is_null(i);
    match pg_type {
        PgType::Text => Cell::Text(present.then(|| array.as_string::<i32>().value(i).to_string())),
        PgType::Date => Cell::Date(
            present
                .then(|| days_to_date(array.as_primitive::<Date32Type>().value(i)))
                .flatten(),
        ),
        PgType::BigInt => Cell::BigInt(present.then(|| array.as_primitive::<Int64Type>().value(i))),
        PgType::Double => Cell::Double(present.then(|| array.as_primitive::<Float64Type>().value(i))),
        PgType::Boolean => Cell::Boolean(present.then(|| array.as_boolean().value(i))),
        PgType::Timestamp => Cell::Timestamp(
            present
                .then(|| {
                    let micros = array.as_primitive::<TimestampMicrosecondType>().value(i);
                    DateTime::from_timestamp_micros(micros).map(|dt| dt.naive_utc())
                })
                .flatten(),
        ),
    }
}

/// Double-quote an identifier so its case survives.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn create_table_sql(table: &str, columns: &[(String, PgType)]) -> String {
    let defs = columns
        .iter()
        .map(|(name, ty)| format!("{} {}", quote_ident(name), ty.sql()))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE {} ({})", quote_ident(table), defs)
}

fn insert_prefix(table: &str, columns: &[(String, PgType)]) -> String {
    let names = columns
        .iter()
        .map(|(name, _)| quote_ident(name))
        .collect::<Vec<_>>()
        .join(", ");
    format!("INSERT INTO {} ({}) ", quote_ident(table), names)
}

/// Rows per INSERT so one statement stays under the bind limit.
pub fn rows_per_insert(column_count: usize) -> usize {
    (MAX_BIND_PARAMS / column_count.max(1)).max(1)
}

/// Drop, recreate and fill `table` in a single transaction.
#[instrument(level = "info", skip(pool, data), fields(rows = data.rows.len()))]
pub async fn replace_table(pool: &PgPool, table: &str, data: &Table) -> Result<u64> {
    let mut tx = pool.begin().await?;

    sqlx::query(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)))
        .execute(&mut *tx)
        .await?;
    sqlx::query(&create_table_sql(table, &data.columns))
        .execute(&mut *tx)
        .await?;

    let mut inserted = 0u64;
    for chunk in data.rows.chunks(rows_per_insert(data.columns.len())) {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(insert_prefix(table, &data.columns));
        qb.push_values(chunk, |mut b, row| {
            for cell in row {
                match cell {
                    Cell::Text(v) => {
                        b.push_bind(v.clone());
                    }
                    Cell::Date(v) => {
                        b.push_bind(*v);
                    }
                    Cell::BigInt(v) => {
                        b.push_bind(*v);
                    }
                    Cell::Double(v) => {
                        b.push_bind(*v);
                    }
                    Cell::Boolean(v) => {
                        b.push_bind(*v);
                    }
                    Cell::Timestamp(v) => {
                        b.push_bind(*v);
                    }
                }
            }
        });
        inserted += qb.build().execute(&mut *tx).await?.rows_affected();
        debug!(inserted, "Inserted chunk");
    }

    tx.commit().await?;
    Ok(inserted)
}

/// Read `path` and replace `table` with its contents.
///
/// # Arguments
///
/// * `settings` - Connection parameters; `settings.url` wins when set
/// * `path` - Parquet file holding at least `title, date, link, body`
/// * `table` - Target table, dropped and recreated
///
/// # Returns
///
/// The number of rows inserted.
///
/// # Errors
///
/// * [`NewsError::MissingColumn`] when a news column is absent
/// * [`NewsError::Arrow`] when a column value cannot be converted
/// * [`NewsError::Database`] on connection or statement failure; the
///   transaction is rolled back and the previous table is kept
#[instrument(level = "info", skip(settings), fields(host = %settings.host, db = %settings.name))]
pub async fn load_parquet(settings: &DatabaseSettings, path: &Path, table: &str) -> Result<u64> {
    let owned = path.to_path_buf();
    let data = tokio::task::spawn_blocking(move || read_table(&owned)).await??;
    info!(rows = data.rows.len(), columns = data.columns.len(), "Read parquet file");

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&settings.connection_url())
        .await?;
    info!("Connected to database");

    let result = replace_table(&pool, table, &data).await;
    pool.close().await;
    let inserted = result?;
    info!(inserted, %table, "Replaced table contents");
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewsRecord;
    use crate::outputs::parquet::write_atomic;
    use arrow::array::{ArrayRef, BooleanArray, Date32Array, Int32Array, StringArray, UInt64Array};
    use arrow::datatypes::{Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
    }

    #[test]
    fn test_type_mapping() {
        assert_eq!(PgType::for_arrow(&DataType::LargeUtf8), PgType::Text);
        assert_eq!(PgType::for_arrow(&DataType::Date32), PgType::Date);
        assert_eq!(PgType::for_arrow(&DataType::Int32), PgType::BigInt);
        assert_eq!(PgType::for_arrow(&DataType::Float32), PgType::Double);
        assert_eq!(
            PgType::for_arrow(&DataType::Timestamp(TimeUnit::Nanosecond, Some("UTC".into()))),
            PgType::Timestamp
        );
        assert_eq!(PgType::for_arrow(&DataType::Binary), PgType::Text);
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("News_Datas"), "\"News_Datas\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_create_table_sql() {
        let columns = vec![
            ("title".to_string(), PgType::Text),
            ("date".to_string(), PgType::Date),
        ];
        assert_eq!(
            create_table_sql("News_Datas", &columns),
            "CREATE TABLE \"News_Datas\" (\"title\" TEXT, \"date\" DATE)"
        );
        assert_eq!(
            insert_prefix("News_Datas", &columns),
            "INSERT INTO \"News_Datas\" (\"title\", \"date\") "
        );
    }

    #[test]
    fn test_rows_per_insert() {
        assert_eq!(rows_per_insert(4), 16_383);
        assert_eq!(rows_per_insert(0), 65_535);
    }

    #[test]
    fn test_read_table_from_partition_file() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("News_Datas.parquet");
        let records = vec![
            NewsRecord {
                title: "A".into(),
                date: day(),
                link: "https://pub.example/a".into(),
                body: "Body A".into(),
            },
            NewsRecord {
                title: "B".into(),
                date: day(),
                link: "https://pub.example/b".into(),
                body: "Body B".into(),
            },
        ];
        write_atomic(&path, &records).unwrap();

        let table = read_table(&path).unwrap();
        assert_eq!(
            table.columns,
            vec![
                ("title".to_string(), PgType::Text),
                ("date".to_string(), PgType::Date),
                ("link".to_string(), PgType::Text),
                ("body".to_string(), PgType::Text),
            ]
        );
        assert_eq!(table.rows.len(), 2);
        assert_eq!(
            table.rows[1],
            vec![
                Cell::Text(Some("B".into())),
                Cell::Date(Some(day())),
                Cell::Text(Some("https://pub.example/b".into())),
                Cell::Text(Some("Body B".into())),
            ]
        );
    }

    #[test]
    fn test_read_table_keeps_extra_columns() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("aggregate.parquet");
        let schema = Arc::new(Schema::new(vec![
            Field::new("ticker", DataType::Utf8, true),
            Field::new("title", DataType::Utf8, true),
            Field::new("date", DataType::Date32, true),
            Field::new("link", DataType::Utf8, true),
            Field::new("body", DataType::Utf8, true),
            Field::new("views", DataType::Int32, true),
            Field::new("flagged", DataType::Boolean, true),
        ]));
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(vec![Some("NVDA")])),
            Arc::new(StringArray::from(vec![None::<&str>])),
            Arc::new(Date32Array::from(vec![Some(20103)])),
            Arc::new(StringArray::from(vec![Some("l")])),
            Arc::new(StringArray::from(vec![Some("b")])),
            Arc::new(Int32Array::from(vec![Some(7)])),
            Arc::new(BooleanArray::from(vec![Some(true)])),
        ];
        let batch = RecordBatch::try_new(schema.clone(), columns).unwrap();
        let mut writer = ArrowWriter::try_new(File::create(&path).unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let table = read_table(&path).unwrap();
        assert_eq!(table.columns.len(), 7);
        assert_eq!(table.columns[5], ("views".to_string(), PgType::BigInt));
        assert_eq!(table.rows[0][1], Cell::Text(None));
        assert_eq!(table.rows[0][2], Cell::Date(Some(day())));
        assert_eq!(table.rows[0][5], Cell::BigInt(Some(7)));
        assert_eq!(table.rows[0][6], Cell::Boolean(Some(true)));
    }

    fn write_batch(path: &Path, schema: Arc<Schema>, columns: Vec<ArrayRef>) {
        let batch = RecordBatch::try_new(schema.clone(), columns).unwrap();
        let mut writer = ArrowWriter::try_new(File::create(path).unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn test_read_table_rejects_unsigned_overflow() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("overflow.parquet");
        let schema = Arc::new(Schema::new(vec![
            Field::new("title", DataType::Utf8, true),
            Field::new("date", DataType::Date32, true),
            Field::new("link", DataType::Utf8, true),
            Field::new("body", DataType::Utf8, true),
            Field::new("views", DataType::UInt64, true),
        ]));
        write_batch(
            &path,
            schema,
            vec![
                Arc::new(StringArray::from(vec!["t"])),
                Arc::new(Date32Array::from(vec![20103])),
                Arc::new(StringArray::from(vec!["l"])),
                Arc::new(StringArray::from(vec!["b"])),
                Arc::new(UInt64Array::from(vec![u64::MAX])),
            ],
        );

        assert!(matches!(read_table(&path), Err(NewsError::Arrow(_))));
    }

    fn news_table(prefix: &str, n: usize) -> Table {
        Table {
            columns: vec![
                ("title".to_string(), PgType::Text),
                ("date".to_string(), PgType::Date),
                ("link".to_string(), PgType::Text),
                ("body".to_string(), PgType::Text),
            ],
            rows: (0..n)
                .map(|i| {
                    vec![
                        Cell::Text(Some(format!("{prefix} title {i}"))),
                        Cell::Date(Some(day())),
                        Cell::Text(Some(format!("https://{prefix}.example/{i}"))),
                        Cell::Text(None),
                    ]
                })
                .collect(),
        }
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL via DATABASE_URL"]
    async fn test_replace_table_against_postgres() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = PgPool::connect(&url).await.unwrap();
        let table = "ticker_news_replace_test";

        let first = news_table("first", 3);
        assert_eq!(replace_table(&pool, table, &first).await.unwrap(), 3);

        // More rows than fit in one INSERT.
        let n = rows_per_insert(4) + 5;
        let second = news_table("second", n);
        assert_eq!(replace_table(&pool, table, &second).await.unwrap(), n as u64);

        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", quote_ident(table)))
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, n as i64);

        let stale: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {} WHERE \"link\" LIKE 'https://first.%'",
            quote_ident(table)
        ))
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(stale, 0);

        sqlx::query(&format!("DROP TABLE {}", quote_ident(table)))
            .execute(&pool)
            .await
            .unwrap();
    }

    #[test]
    fn test_read_table_requires_news_columns() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("partial.parquet");
        let schema = Arc::new(Schema::new(vec![
            Field::new("title", DataType::Utf8, true),
            Field::new("date", DataType::Date32, true),
            Field::new("link", DataType::Utf8, true),
        ]));
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(vec!["t"])),
            Arc::new(Date32Array::from(vec![20103])),
            Arc::new(StringArray::from(vec!["l"])),
        ];
        let batch = RecordBatch::try_new(schema.clone(), columns).unwrap();
        let mut writer = ArrowWriter::try_new(File::create(&path).unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        assert!(matches!(
            read_table(&path),
            Err(NewsError::MissingColumn(c)) if c == "body"
        ));
    }
}
