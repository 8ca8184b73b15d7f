//! `sheetsense` recovers tabular structure from messy spreadsheet and CSV
//! files: it locates header rows, multiple tables per sheet, locale-specific
//! number formats, and hidden/merged regions, then materializes clean flat
//! [`types::Table`]s for downstream SQL querying. Detection is best-effort;
//! a declarative [`load::SheetOverride`] is the escape hatch whenever a
//! heuristic gets a sheet wrong.
//!
//! ## Loading a sheet
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use sheetsense::catalog::MemoryCatalog;
//! use sheetsense::load::{Loader, SheetOverride};
//! use sheetsense::naming::TableRegistry;
//!
//! # fn main() -> Result<(), sheetsense::LoadError> {
//! let registry = Arc::new(TableRegistry::new());
//! let catalog = Arc::new(MemoryCatalog::new());
//! let loader = Loader::new(registry, catalog.clone());
//!
//! // RAW: the whole sheet verbatim, all-text columns.
//! let metas = loader.load_sheet(
//!     Path::new("data/sales.xlsx"),
//!     "sales.xlsx",
//!     "Sheet1",
//!     "excel",
//!     None,
//! )?;
//! println!("loaded {} as {}", metas[0].table_name, metas[0].mode);
//!
//! // ASSISTED with auto-detection: headers, metadata rows, and sub-tables
//! // are detected and merged into the override (explicit fields win).
//! let override_ = SheetOverride {
//!     auto_detect: true,
//!     ..SheetOverride::default()
//! };
//! let metas = loader.load_sheet(
//!     Path::new("data/sales.xlsx"),
//!     "sales.xlsx",
//!     "Sheet1",
//!     "excel",
//!     Some(&override_),
//! )?;
//! for meta in &metas {
//!     println!("{} ({} rows)", meta.table_name, meta.est_rows);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`analyze`]: worksheet structure detection (headers, sub-tables, locale)
//! - [`load`]: the RAW/ASSISTED loader and the override pipeline
//! - [`normalize`]: locale-aware column coercion
//! - [`infer`]: name-based semantic type hints
//! - [`naming`]: deterministic table-name registry
//! - [`catalog`]: registration boundary toward the query engine
//! - [`reader`]: workbook/CSV readers producing raw [`grid::Grid`]s
//! - [`observe`]: advisory events emitted at heuristic decision points

pub mod analyze;
pub mod catalog;
pub mod error;
pub mod grid;
pub mod infer;
pub mod load;
pub mod naming;
pub mod normalize;
pub mod observe;
pub mod reader;
pub mod types;

pub use error::{LoadError, LoadMode, LoadResult};
