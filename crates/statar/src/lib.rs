#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/brycewang-stanford/statar/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod reghdfe;

// Re-export main types from sub-crates
pub use statar_absorb as absorb;
pub use statar_data as data;
pub use statar_estimate as estimate;
pub use statar_output as output;

pub use config::{ReghdfeConfig, ReghdfeConfigBuilder};
pub use error::{RegressionError, Result};
pub use reghdfe::{Reghdfe, reghdfe};
pub use statar_data::Dataset;
pub use statar_output::{ExportFormat, Exporter, RegressionResult};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
