#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/brycewang-stanford/statar/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod dataset;
pub mod encoder;
pub mod error;
pub mod sample;
pub mod variable;

pub use dataset::Dataset;
pub use encoder::{CategoricalEncoder, GroupIds};
pub use error::{ConfigurationError, DataError, Result, SampleError};
pub use sample::{Dimension, EstimationSample, SampleSpec};
pub use variable::{Level, Variable};
