//! Integration tests for estimation sample construction from polars frames.

use polars::prelude::*;
use rstest::rstest;
use statar_data::{
    ConfigurationError, DataError, Dataset, EstimationSample, Level, SampleError, SampleSpec,
};

fn spec(absorb: &[&str], cluster: &[&str], drop_singletons: bool) -> SampleSpec {
    SampleSpec {
        depvar: "y".to_string(),
        regressors: vec!["x".to_string()],
        absorb: absorb.iter().map(|s| s.to_string()).collect(),
        cluster: cluster.iter().map(|s| s.to_string()).collect(),
        drop_singletons,
    }
}

/// Dropping firm C exposes a singleton year, which in turn exposes a
/// singleton firm.
fn chained_singletons() -> Dataset {
    let firm = ["A", "A", "A", "A", "B", "B", "C", "D", "D"];
    let year = [1i64, 2, 1, 2, 2, 3, 3, 1, 2];
    let y: Vec<f64> = (0..9).map(|i| i as f64).collect();
    let x: Vec<f64> = (0..9).map(|i| (i * i) as f64).collect();
    DataFrame::new(vec![
        Column::new("y".into(), y),
        Column::new("x".into(), x),
        Column::new("firm".into(), firm.to_vec()),
        Column::new("year".into(), year.to_vec()),
    ])
    .unwrap()
    .into()
}

#[test]
fn test_singletons_dropped_until_stable() {
    let sample = EstimationSample::build(&chained_singletons(), &spec(&["firm", "year"], &[], true))
        .unwrap();

    assert_eq!(sample.rows, vec![0, 1, 2, 3, 7, 8]);
    assert_eq!(sample.dropped_singletons, 3);
    assert_eq!(sample.dropped_missing, 0);
    assert_eq!(sample.y.to_vec(), vec![0.0, 1.0, 2.0, 3.0, 7.0, 8.0]);
    assert_eq!(sample.x[[4, 0]], 49.0);

    let firm = &sample.fixed_effects[0].groups;
    assert_eq!(sample.fixed_effects[0].name, "firm");
    assert_eq!(firm.ids(), &[0, 0, 0, 0, 1, 1]);
    assert_eq!(firm.levels(), &[Level::from("A"), Level::from("D")]);

    let year = &sample.fixed_effects[1].groups;
    assert_eq!(year.ids(), &[0, 1, 0, 1, 0, 1]);
    assert_eq!(year.counts(), &[3, 3]);
}

#[test]
fn test_singletons_kept_when_disabled() {
    let sample =
        EstimationSample::build(&chained_singletons(), &spec(&["firm", "year"], &[], false))
            .unwrap();
    assert_eq!(sample.n_obs(), 9);
    assert_eq!(sample.dropped_singletons, 0);
    assert_eq!(sample.fixed_effects[0].groups.n_groups(), 4);
}

#[test]
fn test_missing_values_in_every_role() {
    let df = DataFrame::new(vec![
        Column::new(
            "y".into(),
            &[Some(1.0), Some(f64::NAN), Some(3.0), Some(4.0), Some(5.0), Some(6.0), Some(7.0), Some(8.0)],
        ),
        Column::new(
            "x".into(),
            &[Some(0.5), Some(1.5), None, Some(2.5), Some(3.5), Some(4.5), Some(5.5), Some(6.5)],
        ),
        Column::new(
            "firm".into(),
            &[Some(1i64), Some(1), Some(2), Some(2), None, Some(2), Some(1), Some(2)],
        ),
        Column::new(
            "state".into(),
            &[Some(7.0), Some(7.0), Some(8.0), Some(f64::NAN), Some(8.0), Some(7.0), Some(8.0), Some(7.0)],
        ),
    ])
    .unwrap();

    let sample = EstimationSample::build(&df.into(), &spec(&["firm"], &["state"], false)).unwrap();

    assert_eq!(sample.rows, vec![0, 5, 6, 7]);
    assert_eq!(sample.dropped_missing, 4);
    assert_eq!(sample.fixed_effects[0].groups.ids(), &[0, 1, 0, 1]);
    assert_eq!(sample.clusters[0].name, "state");
    assert_eq!(sample.clusters[0].groups.counts(), &[3, 1]);
    assert_eq!(sample.clusters[0].groups.levels()[0], Level::from_f64(7.0));
}

#[test]
fn test_infinite_regressor_reaches_numeric_core() {
    let df = DataFrame::new(vec![
        Column::new("y".into(), vec![1.0, 2.0, 3.0, 4.0]),
        Column::new("x".into(), vec![0.0, f64::INFINITY, 1.0, 2.0]),
        Column::new("g".into(), vec![true, true, false, false]),
    ])
    .unwrap();

    let sample = EstimationSample::build(&df.into(), &spec(&["g"], &[], true)).unwrap();
    assert_eq!(sample.n_obs(), 4);
    assert!(sample.x[[1, 0]].is_infinite());
    assert_eq!(sample.fixed_effects[0].groups.levels()[0], Level::Integer(1));
}

#[test]
fn test_nested_and_intersected_dimensions() {
    let df = DataFrame::new(vec![
        Column::new("y".into(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
        Column::new("x".into(), vec![2.0, 1.0, 4.0, 3.0, 6.0, 5.0]),
        Column::new("firm".into(), vec!["a", "a", "b", "b", "c", "c"]),
        Column::new("industry".into(), vec!["m", "m", "m", "m", "s", "s"]),
        Column::new("year".into(), vec![1i64, 2, 1, 2, 1, 2]),
    ])
    .unwrap();

    let sample =
        EstimationSample::build(&df.into(), &spec(&["firm"], &["industry", "year"], true))
            .unwrap();
    let firm = &sample.fixed_effects[0].groups;
    let industry = &sample.clusters[0].groups;
    let year = &sample.clusters[1].groups;

    assert!(firm.is_nested_within(industry));
    assert!(!industry.is_nested_within(firm));
    assert!(!firm.is_nested_within(year));

    let both = industry.intersect(year);
    assert_eq!(both.n_groups(), 4);
    assert_eq!(both.levels()[0], Level::Text("m#1".to_string()));
}

#[test]
fn test_single_level_fixed_effect_rejected() {
    let df = DataFrame::new(vec![
        Column::new("y".into(), vec![1.0, 2.0, 3.0]),
        Column::new("x".into(), vec![1.0, 0.0, 1.0]),
        Column::new("firm".into(), vec!["a", "a", "a"]),
    ])
    .unwrap();

    match EstimationSample::build(&df.into(), &spec(&["firm"], &[], true)) {
        Err(SampleError::Configuration(ConfigurationError::SingleLevel { dimension })) => {
            assert_eq!(dimension, "firm")
        }
        other => panic!("unexpected: {:?}", other.map(|s| s.n_obs())),
    }
}

#[test]
fn test_one_level_per_row_rejected_before_singleton_dropping() {
    let df = DataFrame::new(vec![
        Column::new("y".into(), vec![1.0, 2.0, 3.0]),
        Column::new("x".into(), vec![1.0, 0.0, 1.0]),
        Column::new("firm".into(), vec!["a", "b", "c"]),
    ])
    .unwrap();
    let dataset: Dataset = df.into();

    for drop_singletons in [true, false] {
        match EstimationSample::build(&dataset, &spec(&["firm"], &[], drop_singletons)) {
            Err(SampleError::Configuration(ConfigurationError::PerfectAbsorption {
                dimension,
                levels,
                rows,
            })) => {
                assert_eq!(dimension, "firm");
                assert_eq!((levels, rows), (3, 3));
            }
            other => panic!("unexpected: {:?}", other.map(|s| s.n_obs())),
        }
    }
}

#[test]
fn test_one_level_per_row_after_missing_values() {
    // Only rows 0, 2 and 4 are complete, each with its own firm
    let df = DataFrame::new(vec![
        Column::new("y".into(), &[Some(1.0), None, Some(3.0), Some(4.0), Some(5.0)]),
        Column::new("x".into(), &[Some(1.0), Some(2.0), Some(0.0), None, Some(2.0)]),
        Column::new("firm".into(), &["a", "a", "b", "b", "c"]),
    ])
    .unwrap();

    let err = EstimationSample::build(&df.into(), &spec(&["firm"], &[], true)).unwrap_err();
    assert!(matches!(
        err,
        SampleError::Configuration(ConfigurationError::PerfectAbsorption { rows: 3, .. })
    ));
}

#[test]
fn test_all_rows_missing_is_empty_sample() {
    let df = DataFrame::new(vec![
        Column::new("y".into(), &[None::<f64>, None, None]),
        Column::new("x".into(), vec![1.0, 0.0, 1.0]),
        Column::new("firm".into(), vec!["a", "a", "b"]),
    ])
    .unwrap();

    let err = EstimationSample::build(&df.into(), &spec(&["firm"], &[], true)).unwrap_err();
    assert!(matches!(err, SampleError::Data(DataError::EmptySample(_))));
}

#[rstest]
#[case("x", "regressor string column")]
#[case("missing", "unknown column")]
fn test_bad_regressor_column(#[case] regressor: &str, #[case] _label: &str) {
    let df = DataFrame::new(vec![
        Column::new("y".into(), vec![1.0, 2.0]),
        Column::new("x".into(), vec!["p", "q"]),
    ])
    .unwrap();
    let model = SampleSpec {
        regressors: vec![regressor.to_string()],
        ..spec(&[], &[], true)
    };

    match EstimationSample::build(&df.into(), &model) {
        Err(SampleError::Data(DataError::UnsupportedDtype { column, role, .. })) => {
            assert_eq!(column, "x");
            assert_eq!(role, "numeric variable");
        }
        Err(SampleError::Data(DataError::ColumnNotFound(name))) => assert_eq!(name, "missing"),
        other => panic!("unexpected: {:?}", other.map(|s| s.n_obs())),
    }
}
