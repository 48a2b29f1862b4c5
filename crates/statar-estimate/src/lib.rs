#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/brycewang-stanford/statar/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod inference;
pub mod ols;
pub mod vcov;

// Re-export main types
pub use inference::{CoefficientTest, WaldTest, coefficient_tests, wald_test};
pub use ols::{
    CollinearityCause, OlsConfig, OlsFit, OlsSolver, RankDeficiencyError, RankScale, column_norms,
};
pub use vcov::{
    ClusterCount, ClusterRobust, Robust, Unadjusted, VarianceEstimator, VcovEstimate, VcovInput,
    VcovKind,
};
