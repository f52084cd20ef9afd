//! Output generation.
//!
//! - [`parquet`]: per-(ticker, date) Parquet partitions with link dedup and
//!   atomic replace
//!
//! # Output Structure
//!
//! ```text
//! output_root/
//! └── NVDA/
//!     └── NewsData/
//!         ├── NVDA_2025-01-14.parquet
//!         └── NVDA_2025-01-15.parquet
//! ```

pub mod parquet;
