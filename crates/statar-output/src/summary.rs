//! Text renderings of a regression result.
//!
//! `summary()` follows the layout of Stata's `reghdfe` output: a header of
//! sample and fit statistics, the coefficient table, and the absorbed
//! degrees-of-freedom breakdown.

use crate::result::RegressionResult;
use statar_estimate::VcovKind;
use std::fmt;

const WIDTH: usize = 78;

/// Right-align `name` in a 12-character label column, truncating long names.
fn label(name: &str) -> String {
    if name.chars().count() > 12 {
        let head: String = name.chars().take(11).collect();
        format!("{}~", head)
    } else {
        format!("{:>12}", name)
    }
}

fn header_line(left: &str, key: &str, value: &str) -> String {
    format!("{:<48}{:<18}= {:>10}\n", left, key, value)
}

fn thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

impl RegressionResult {
    fn vcov_description(&self) -> String {
        match self.vcov_kind {
            VcovKind::Unadjusted => "Statistics assume homoskedastic errors".to_string(),
            VcovKind::Robust => "Statistics robust to heteroskedasticity".to_string(),
            VcovKind::Cluster => {
                let names: Vec<&str> = self.clusters.iter().map(|c| c.name.as_str()).collect();
                format!("Statistics robust to clustering on {}", names.join(" "))
            }
        }
    }

    fn absorb_description(&self) -> String {
        match self.absorb.len() {
            0 => "Absorbing no fixed effects".to_string(),
            1 => "Absorbing 1 HDFE group".to_string(),
            n => format!("Absorbing {} HDFE groups", n),
        }
    }

    /// Stata-style ASCII summary table.
    pub fn summary(&self) -> String {
        let mut output = String::new();
        let level = (self.confidence_level * 100.0).round();

        // Header
        output.push_str(&header_line(
            "HDFE Linear regression",
            "Number of obs",
            &thousands(self.n_obs),
        ));
        output.push_str(&header_line(
            &self.absorb_description(),
            &format!("F({:>4},{:>7})", self.f_test.df_num, self.f_test.df_den),
            &format!("{:.2}", self.f_test.statistic),
        ));
        output.push_str(&header_line(
            &self.vcov_description(),
            "Prob > F",
            &format!("{:.4}", self.f_test.p_value),
        ));
        output.push_str(&header_line(
            "",
            "R-squared",
            &format!("{:.4}", self.fit.r_squared),
        ));
        output.push_str(&header_line(
            "",
            "Adj R-squared",
            &format!("{:.4}", self.fit.adj_r_squared),
        ));
        output.push_str(&header_line(
            "",
            "Within R-sq.",
            &format!("{:.4}", self.fit.within_r_squared),
        ));
        for cluster in &self.clusters {
            output.push_str(&header_line(
                "",
                &format!("Clusters {}", cluster.name),
                &thousands(cluster.clusters),
            ));
        }
        output.push_str(&header_line(
            "",
            "Root MSE",
            &format!("{:.4}", self.fit.rmse),
        ));
        output.push('\n');

        // Coefficient table
        output.push_str(&"-".repeat(WIDTH));
        output.push('\n');
        output.push_str(&format!(
            "{} | {:>10} {:>10} {:>8} {:>7}   [{:.0}% Conf. Interval]\n",
            label(&self.depvar),
            "Coef.",
            "Std. Err.",
            "t",
            "P>|t|",
            level
        ));
        output.push_str(&format!("{}+{}\n", "-".repeat(13), "-".repeat(WIDTH - 14)));
        for row in self.coefficient_table() {
            output.push_str(&format!(
                "{} | {:>10.6} {:>10.6} {:>8.2} {:>7.3}   {:>10.6} {:>10.6}\n",
                label(&row.name),
                row.estimate,
                row.std_error,
                row.t_stat,
                row.p_value,
                row.conf_low,
                row.conf_high
            ));
        }
        output.push_str(&format!(
            "{} | {:>10.6} {:>10} {:>8} {:>7}   {:>10} {:>10}\n",
            label("_cons"),
            self.intercept,
            ".",
            ".",
            ".",
            ".",
            "."
        ));
        output.push_str(&"-".repeat(WIDTH));
        output.push('\n');

        // Absorbed degrees of freedom
        if !self.absorb.is_empty() {
            output.push_str("\nAbsorbed degrees of freedom:\n");
            output.push_str(&format!(
                "{:<20} {:>12} {:>12} {:>12}\n",
                "Absorbed FE", "Categories", "Redundant", "Num. Coefs"
            ));
            output.push_str(&"-".repeat(59));
            output.push('\n');
            for dim in &self.absorbed.dimensions {
                let marker = if dim.nested { " *" } else { "" };
                output.push_str(&format!(
                    "{:<20} {:>12} {:>12} {:>12}{}\n",
                    dim.name,
                    dim.levels,
                    dim.redundant,
                    dim.absorbed(),
                    marker
                ));
            }
            output.push_str(&"-".repeat(59));
            output.push('\n');
            if self.absorbed.dimensions.iter().any(|d| d.nested) {
                output.push_str("* = FE nested within cluster; treated as redundant for DoF computation\n");
            }
        }

        for caveat in self.caveats() {
            output.push_str(&format!("Note: {}\n", caveat));
        }

        output
    }

    /// Format as Markdown for documentation.
    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("# Regression: {}\n\n", self.depvar));
        output.push_str(&format!("- **Observations:** {}\n", self.n_obs));
        if !self.absorb.is_empty() {
            output.push_str(&format!("- **Absorbed:** {}\n", self.absorb.join(", ")));
        }
        output.push_str(&format!("- **Variance:** {}\n", self.vcov_kind));
        output.push_str(&format!("- **R²:** {:.4}\n", self.fit.r_squared));
        output.push_str(&format!(
            "- **Within R²:** {:.4}\n",
            self.fit.within_r_squared
        ));
        output.push_str(&format!("- **Root MSE:** {:.4}\n\n", self.fit.rmse));

        output.push_str("| Variable | Coef. | Std. Err. | t | P>\\|t\\| | CI low | CI high |\n");
        output.push_str("|----------|-------|-----------|---|---------|--------|---------|\n");
        for row in self.coefficient_table() {
            output.push_str(&format!(
                "| {} | {:.6} | {:.6} | {:.2} | {:.3} | {:.6} | {:.6} |\n",
                row.name,
                row.estimate,
                row.std_error,
                row.t_stat,
                row.p_value,
                row.conf_low,
                row.conf_high
            ));
        }

        let caveats = self.caveats();
        if !caveats.is_empty() {
            output.push_str("\n## Notes\n\n");
            for caveat in caveats {
                output.push_str(&format!("- {}\n", caveat));
            }
        }

        output
    }
}

impl fmt::Display for RegressionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "reghdfe {} ({} obs, {} vcov)",
            self.depvar, self.n_obs, self.vcov_kind
        )?;
        for row in self.coefficient_table() {
            writeln!(
                f,
                "  {}: {:.6} (se {:.6}, p {:.4})",
                row.name, row.estimate, row.std_error, row.p_value
            )?;
        }
        writeln!(f, "  R²: {:.4}, within R²: {:.4}", self.fit.r_squared, self.fit.within_r_squared)?;
        Ok(())
    }
}
