#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/brycewang-stanford/statar/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod export;
pub mod result;
pub mod summary;

pub use export::{ExportError, ExportFormat, Exporter, ResultExport};
pub use result::{CoefficientRow, FitStatistics, RegressionResult, ResultAssembler};
