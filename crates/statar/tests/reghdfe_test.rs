//! End-to-end tests of the fixed-effects regression pipeline.

use approx::assert_relative_eq;
use ndarray::{Array1, Array2};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statar::absorb::{Acceleration, DofCaveat};
use statar::data::ConfigurationError;
use statar::estimate::{CollinearityCause, OlsSolver, VcovKind};
use statar::{Dataset, Reghdfe, ReghdfeConfig, RegressionError, reghdfe};

/// Unbalanced 20-row panel: four firms of five rows, three years, every firm
/// observed in every year.
fn small_panel(seed: u64) -> DataFrame {
    let mut rng = StdRng::seed_from_u64(seed);
    let firm_effect = [1.0, -2.0, 0.5, 3.0];
    let year_effect = [0.0, 1.0, 0.0, 0.0, -1.5];

    let mut firm = Vec::new();
    let mut year = Vec::new();
    let mut x1 = Vec::new();
    let mut x2 = Vec::new();
    let mut y = Vec::new();
    for i in 0..20usize {
        let f = i % 4;
        let t = (i * i) % 5;
        let a = rng.gen_range(-1.0..1.0) + 0.3 * f as f64;
        let b = rng.gen_range(-1.0..1.0) - 0.2 * t as f64;
        firm.push(f as i64 + 100);
        year.push(2000 + t as i64);
        x1.push(a);
        x2.push(b);
        y.push(1.5 * a - 0.7 * b + firm_effect[f] + year_effect[t] + 0.3 * rng.gen_range(-1.0..1.0));
    }

    DataFrame::new(vec![
        Column::new("y".into(), y),
        Column::new("x1".into(), x1),
        Column::new("x2".into(), x2),
        Column::new("firm".into(), firm),
        Column::new("year".into(), year),
    ])
    .unwrap()
}

fn column(df: &DataFrame, name: &str) -> Vec<f64> {
    df.column(name)
        .unwrap()
        .as_materialized_series()
        .cast(&DataType::Float64)
        .unwrap()
        .f64()
        .unwrap()
        .into_no_null_iter()
        .collect()
}

#[test]
fn test_matches_dummy_variable_regression() {
    let df = small_panel(1);
    let config = ReghdfeConfig::builder("y", ["x1", "x2"])
        .absorb(["firm", "year"])
        .tolerance(1e-13)
        .robust(false)
        .build()
        .unwrap();
    let result = reghdfe(&df, &config).unwrap();
    assert!(result.converged());

    // Explicit design: x1, x2, constant, firm dummies 1..3, year dummies for 2001 and 2004
    let x1 = column(&df, "x1");
    let x2 = column(&df, "x2");
    let firm = column(&df, "firm");
    let year = column(&df, "year");
    let y = Array1::from(column(&df, "y"));
    let n = y.len();
    let mut design = Array2::<f64>::zeros((n, 8));
    for i in 0..n {
        design[[i, 0]] = x1[i];
        design[[i, 1]] = x2[i];
        design[[i, 2]] = 1.0;
        for (j, level) in [101.0, 102.0, 103.0].iter().enumerate() {
            design[[i, 3 + j]] = f64::from(firm[i] == *level);
        }
        design[[i, 6]] = f64::from(year[i] == 2001.0);
        design[[i, 7]] = f64::from(year[i] == 2004.0);
    }
    let names: Vec<String> = (0..8).map(|j| format!("c{}", j)).collect();
    let dummy = OlsSolver::default().solve(&design, &y, &names, None).unwrap();

    assert_relative_eq!(result.coefficient("x1").unwrap(), dummy.coefficients[0], epsilon = 1e-8);
    assert_relative_eq!(result.coefficient("x2").unwrap(), dummy.coefficients[1], epsilon = 1e-8);
    assert_relative_eq!(result.fit.rss, dummy.rss, epsilon = 1e-8);

    // Same residual degrees of freedom, so the same unadjusted errors
    assert_eq!(result.absorbed.absorbed, 4 + 3 - 1);
    assert_eq!(result.df_resid, n - 8);
    let sigma2 = dummy.rss / (n - 8) as f64;
    assert_relative_eq!(
        result.std_error("x1").unwrap(),
        (sigma2 * dummy.xtx_inv[[0, 0]]).sqrt(),
        epsilon = 1e-8
    );
}

#[test]
fn test_single_level_fixed_effect_is_rejected() {
    let mut df = small_panel(2);
    df.with_column(Column::new("country".into(), vec!["us"; 20]))
        .unwrap();
    let config = ReghdfeConfig::builder("y", ["x1"])
        .absorb(["country"])
        .build()
        .unwrap();
    let err = reghdfe(&df, &config).unwrap_err();
    assert!(matches!(
        err,
        RegressionError::Configuration(ConfigurationError::SingleLevel { ref dimension }) if dimension == "country"
    ));
}

#[test]
fn test_one_firm_per_row_is_rejected() {
    let df = DataFrame::new(vec![
        Column::new("y".into(), vec![1.0, 2.5, 2.0, 4.5, 3.0, 6.0]),
        Column::new("x".into(), vec![0.5, 1.0, 1.5, 2.0, 2.5, 3.0]),
        Column::new("id".into(), (1..=6i64).collect::<Vec<_>>()),
    ])
    .unwrap();
    let config = ReghdfeConfig::builder("y", ["x"])
        .absorb(["id"])
        .build()
        .unwrap();

    match reghdfe(&df, &config).unwrap_err() {
        RegressionError::Configuration(ConfigurationError::PerfectAbsorption {
            dimension,
            levels,
            rows,
        }) => {
            assert_eq!(dimension, "id");
            assert_eq!((levels, rows), (6, 6));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_collinear_regressors_are_rejected() {
    let mut df = small_panel(3);
    let sum: Vec<f64> = column(&df, "x1")
        .iter()
        .zip(column(&df, "x2"))
        .map(|(a, b)| 2.0 * a - b)
        .collect();
    df.with_column(Column::new("x3".into(), sum)).unwrap();

    let config = ReghdfeConfig::builder("y", ["x1", "x2", "x3"])
        .absorb(["firm"])
        .build()
        .unwrap();
    match reghdfe(&df, &config).unwrap_err() {
        RegressionError::RankDeficiency(e) => {
            assert_eq!(e.cause, CollinearityCause::CollinearWithRegressors);
            assert_eq!(e.rank, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_regressor_absorbed_by_fixed_effect() {
    let mut df = small_panel(4);
    let size: Vec<f64> = column(&df, "firm").iter().map(|f| f * 0.25 + 7.0).collect();
    df.with_column(Column::new("size".into(), size)).unwrap();

    let config = ReghdfeConfig::builder("y", ["x1", "size"])
        .absorb(["firm"])
        .build()
        .unwrap();
    match reghdfe(&df, &config).unwrap_err() {
        RegressionError::RankDeficiency(e) => {
            assert_eq!(e.column, "size");
            assert_eq!(e.cause, CollinearityCause::AbsorbedByFixedEffects);
        }
        other => panic!("unexpected error: {other}"),
    }
}

/// Firm `f` has eight rows in year `f` and two in year `f + 1`: one long
/// chain of firms and years on which alternating projections converge
/// slowly. `z` is the sum of a firm and a year effect.
fn chain_panel(firms: usize) -> DataFrame {
    let mut rng = StdRng::seed_from_u64(31);
    let mut firm = Vec::new();
    let mut year = Vec::new();
    let mut x = Vec::new();
    let mut z = Vec::new();
    let mut y = Vec::new();
    for f in 0..firms {
        for k in 0..10 {
            let t = if k < 8 { f } else { f + 1 };
            let xi = rng.gen_range(-1.0..1.0);
            firm.push(f as i64);
            year.push(1980 + t as i64);
            x.push(xi);
            z.push(0.7 * f as f64 + 0.13 * (t * t) as f64 + 5.0);
            y.push(1.2 * xi + 0.4 * f as f64 - 0.1 * t as f64 + 0.2 * rng.gen_range(-1.0..1.0));
        }
    }
    DataFrame::new(vec![
        Column::new("y".into(), y),
        Column::new("x".into(), x),
        Column::new("z".into(), z),
        Column::new("firm".into(), firm),
        Column::new("year".into(), year),
    ])
    .unwrap()
}

#[test]
fn test_two_way_absorbed_regressor_on_chain_panel() {
    let df = chain_panel(40);
    let config = ReghdfeConfig::builder("y", ["x", "z"])
        .absorb(["firm", "year"])
        .build()
        .unwrap();

    match reghdfe(&df, &config).unwrap_err() {
        RegressionError::RankDeficiency(e) => {
            assert_eq!(e.column, "z");
            assert_eq!(e.rank, 1);
            assert_eq!(e.cause, CollinearityCause::AbsorbedByFixedEffects);
        }
        other => panic!("unexpected error: {other}"),
    }

    // Without the absorbed column the fit converges quickly
    let config = ReghdfeConfig::builder("y", ["x"])
        .absorb(["firm", "year"])
        .build()
        .unwrap();
    let result = reghdfe(&df, &config).unwrap();
    assert!(result.converged());
    assert!(result.convergence.iterations < 1_000);
    assert_eq!(result.absorbed.absorbed, 40 + 41 - 1);
    assert!((result.coefficient("x").unwrap() - 1.2).abs() < 0.1);
}

#[test]
fn test_acceleration_does_not_change_estimates() {
    let df = chain_panel(6);
    let fit = |acceleration| {
        let config = ReghdfeConfig::builder("y", ["x"])
            .absorb(["firm", "year"])
            .tolerance(1e-12)
            .max_iterations(200_000)
            .acceleration(acceleration)
            .build()
            .unwrap();
        reghdfe(&df, &config).unwrap()
    };
    let cg = fit(Acceleration::ConjugateGradient);
    let plain = fit(Acceleration::None);

    assert!(cg.converged() && plain.converged());
    assert!(cg.convergence.iterations < plain.convergence.iterations);
    assert_relative_eq!(
        cg.coefficient("x").unwrap(),
        plain.coefficient("x").unwrap(),
        epsilon = 1e-8
    );
    assert_relative_eq!(cg.fit.rss, plain.fit.rss, epsilon = 1e-8);
}

/// Ten firms over six periods. The within-firm regressor and the error share
/// the period pattern with a firm-specific sign, so scores are perfectly
/// correlated inside each firm.
fn clustered_panel() -> DataFrame {
    let pattern = [-1.0, 0.5, 2.0, -0.5, 1.0, -2.0];
    let mut firm = Vec::new();
    let mut x = Vec::new();
    let mut y = Vec::new();
    for g in 0..10i64 {
        let sign = if g % 2 == 0 { 1.0 } else { -1.0 };
        for &u in &pattern {
            let xi = g as f64 + u;
            firm.push(g);
            x.push(xi);
            y.push(2.0 * xi + 3.0 * g as f64 + 0.4 * sign * u);
        }
    }
    DataFrame::new(vec![
        Column::new("y".into(), y),
        Column::new("x".into(), x),
        Column::new("firm".into(), firm),
    ])
    .unwrap()
}

#[test]
fn test_cluster_errors_exceed_unadjusted_on_correlated_panel() {
    let df = clustered_panel();
    let unadjusted = ReghdfeConfig::builder("y", ["x"])
        .absorb(["firm"])
        .robust(false)
        .build()
        .unwrap();
    let clustered = ReghdfeConfig::builder("y", ["x"])
        .absorb(["firm"])
        .cluster(["firm"])
        .build()
        .unwrap();

    let plain = reghdfe(&df, &unadjusted).unwrap();
    let cluster = reghdfe(&df, &clustered).unwrap();

    assert_relative_eq!(plain.coefficient("x").unwrap(), 2.0, epsilon = 1e-10);
    assert_relative_eq!(cluster.coefficient("x").unwrap(), 2.0, epsilon = 1e-10);
    assert_eq!(cluster.vcov_kind, VcovKind::Cluster);
    assert!(cluster.vcov[[0, 0]] >= plain.vcov[[0, 0]]);

    // Fixed effect nested in the cluster: only the intercept is absorbed
    assert!(cluster.absorbed.dimensions[0].nested);
    assert_eq!(cluster.df_resid, 60 - 1 - 1);
    assert_eq!(plain.df_resid, 60 - 1 - 10);
    assert_eq!(cluster.f_test.df_den, 9);
    assert_eq!(cluster.clusters[0].clusters, 10);
}

#[test]
fn test_thousand_row_panel() {
    let mut rng = StdRng::seed_from_u64(2024);
    let n = 1000;
    let firm_effect: Vec<f64> = (0..50).map(|_| rng.gen_range(-2.0..2.0)).collect();
    let year_effect = [0.0, 0.3, -0.2, 0.8, 0.5];

    let mut firm = Vec::with_capacity(n);
    let mut year = Vec::with_capacity(n);
    let mut x = Vec::with_capacity(n);
    let mut y = Vec::with_capacity(n);
    for _ in 0..n {
        let f = rng.gen_range(0..50usize);
        let t = rng.gen_range(0..5usize);
        let xi = rng.gen_range(0.0..10.0) + firm_effect[f];
        firm.push(f as i64 + 1);
        year.push(2018 + t as i64);
        x.push(xi);
        y.push(0.5 * xi + firm_effect[f] + year_effect[t] + rng.gen_range(-1.0..1.0));
    }
    let df = DataFrame::new(vec![
        Column::new("wage".into(), y),
        Column::new("experience".into(), x),
        Column::new("firm_id".into(), firm),
        Column::new("year".into(), year),
    ])
    .unwrap();

    let config = ReghdfeConfig::builder("wage", ["experience"])
        .absorb(["firm_id", "year"])
        .build()
        .unwrap();
    let result = Reghdfe::new(config).fit(&Dataset::new(df)).unwrap();

    assert!(result.converged());
    assert!(result.convergence.iterations < 50);
    let beta = result.coefficient("experience").unwrap();
    let se = result.std_error("experience").unwrap();
    assert!((beta - 0.5).abs() < 3.0 * se);
    assert_eq!(result.n_obs + result.dropped_singletons, n);
    assert_eq!(result.vcov_kind, VcovKind::Robust);
    assert!(result.summary().contains("Absorbing 2 HDFE groups"));
}

#[test]
fn test_three_fixed_effects_flag_approximate_dof() {
    let mut df = small_panel(9);
    let region: Vec<i64> = (0..20).map(|i| i % 3).collect();
    df.with_column(Column::new("region".into(), region)).unwrap();

    let config = ReghdfeConfig::builder("y", ["x1", "x2"])
        .absorb(["firm", "year", "region"])
        .build()
        .unwrap();
    let result = reghdfe(&df, &config).unwrap();

    assert!(result.converged());
    assert_eq!(result.absorbed.caveat, DofCaveat::Approximate);
    assert_eq!(result.absorbed.absorbed, 4 + (3 - 1) + (3 - 1));
    assert_eq!(result.df_resid, 20 - 2 - 8);

    let caveats = result.caveats();
    assert_eq!(caveats.len(), 1);
    assert!(caveats[0].contains("three or more dimensions"));
    assert!(result.summary().contains("Note: absorbed degrees of freedom (8)"));
}

#[test]
fn test_two_way_clustering() {
    let df = small_panel(5);
    let config = ReghdfeConfig::builder("y", ["x1", "x2"])
        .absorb(["firm"])
        .cluster(["firm", "year"])
        .build()
        .unwrap();
    let result = reghdfe(&df, &config).unwrap();

    assert_eq!(result.clusters.len(), 2);
    assert_eq!(result.clusters[0].clusters, 4);
    assert_eq!(result.clusters[1].clusters, 3);
    assert_eq!(result.f_test.df_den, 2);
    assert!(result.std_errors.iter().all(|s| s.is_finite() && *s >= 0.0));
}

#[test]
fn test_iteration_cap_is_a_diagnostic() {
    let df = small_panel(6);
    let config = ReghdfeConfig::builder("y", ["x1", "x2"])
        .absorb(["firm", "year"])
        .max_iterations(1)
        .build()
        .unwrap();
    let result = reghdfe(&df, &config).unwrap();

    assert!(!result.converged());
    assert_eq!(result.convergence.iterations, 1);
    assert!(result.caveats().iter().any(|c| c.contains("did not converge")));
}

#[test]
fn test_no_fixed_effects_recovers_intercept() {
    let df = DataFrame::new(vec![
        Column::new("y".into(), &[Some(3.0), Some(5.1), Some(6.9), Some(9.0), None, Some(11.0)]),
        Column::new("x".into(), &[1.0, 2.0, 3.0, 4.0, 5.0, 5.0]),
    ])
    .unwrap();
    let config = ReghdfeConfig::builder("y", ["x"]).build().unwrap();
    let result = reghdfe(&df, &config).unwrap();

    // Simple regression on the five complete rows
    let xs = [1.0, 2.0, 3.0, 4.0, 5.0];
    let ys = [3.0, 5.1, 6.9, 9.0, 11.0];
    let (mx, my) = (3.0, ys.iter().sum::<f64>() / 5.0);
    let sxy: f64 = xs.iter().zip(&ys).map(|(x, y)| (x - mx) * (y - my)).sum();
    let slope = sxy / 10.0;

    assert_eq!(result.dropped_missing, 1);
    assert_eq!(result.n_obs, 5);
    assert_eq!(result.df_resid, 3);
    assert_relative_eq!(result.coefficient("x").unwrap(), slope, epsilon = 1e-10);
    assert_relative_eq!(result.intercept, my - slope * mx, epsilon = 1e-10);
    assert_relative_eq!(result.fit.r_squared, result.fit.within_r_squared, epsilon = 1e-12);
}

#[test]
fn test_json_config_end_to_end() {
    let df = small_panel(7);
    let config = ReghdfeConfig::from_json(
        r#"{
            "depvar": "y",
            "regressors": ["x1", "x2"],
            "absorb": ["firm", "year"],
            "robust": false,
            "parallel": false
        }"#,
    )
    .unwrap();
    let result = reghdfe(&df, &config).unwrap();
    assert_eq!(result.vcov_kind, VcovKind::Unadjusted);
    assert_eq!(result.absorb, vec!["firm", "year"]);
    assert!((result.coefficient("x1").unwrap() - 1.5).abs() < 1.0);
}

#[test]
fn test_unknown_column() {
    let df = small_panel(8);
    let config = ReghdfeConfig::builder("y", ["missing"]).build().unwrap();
    assert!(matches!(
        reghdfe(&df, &config).unwrap_err(),
        RegressionError::Data(_)
    ));
}
