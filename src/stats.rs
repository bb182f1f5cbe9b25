//! Summary statistics for job response times and the least-squares fit of
//! the log-distance path loss model.

use crate::convert::{JobRecord, RssiRecord};

use std::{collections::BTreeMap, fmt, fmt::Write};

/// The usual descriptive statistics of a sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation (n - 1 in the denominator), NaN for one value
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub q50: f64,
    pub q75: f64,
    pub max: f64,
}

impl Summary {
    /// Summarize `values`. Returns `None` when there is nothing to summarize.
    pub fn describe(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(|l, r| l.total_cmp(r));

        let n = sorted.len() as f64;
        let mean = sorted.iter().sum::<f64>() / n;
        let std = if sorted.len() > 1 {
            (sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        } else {
            f64::NAN
        };

        Some(Summary {
            count: sorted.len(),
            mean,
            std,
            min: sorted[0],
            q25: quantile(&sorted, 0.25),
            q50: quantile(&sorted, 0.5),
            q75: quantile(&sorted, 0.75),
            max: sorted[sorted.len() - 1],
        })
    }
}

/// Quantile of an ascending, non-empty slice, interpolating linearly
/// between the two closest ranks.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = (sorted.len() - 1) as f64 * q;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Response time (`completion - release`) statistics for every task, in
/// ascending task order.
pub fn response_times(jobs: &[JobRecord]) -> Vec<(u32, Summary)> {
    let mut by_task: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    for job in jobs {
        by_task
            .entry(job.task)
            .or_default()
            .push(job.completion_s - job.release_s);
    }

    by_task
        .into_iter()
        .filter_map(|(task, responses)| Summary::describe(&responses).map(|s| (task, s)))
        .collect()
}

/// Render per-task summaries as a plain text table, one task per row.
pub fn format_summary_table(label: &str, rows: &[(u32, Summary)]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:>6} {}", "", label);
    let _ = writeln!(
        out,
        "{:>6} {:>6} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
        "task", "count", "mean", "std", "min", "25%", "50%", "75%", "max"
    );
    for (task, s) in rows {
        let _ = writeln!(
            out,
            "{:>6} {:>6} {:>10.6} {:>10.6} {:>10.6} {:>10.6} {:>10.6} {:>10.6} {:>10.6}",
            task, s.count, s.mean, s.std, s.min, s.q25, s.q50, s.q75, s.max
        );
    }
    out
}

/// Why a path loss fit could not be computed.
#[derive(Debug, Clone, PartialEq)]
pub enum FitError {
    /// Returned when fewer than two distinct distances were measured, which
    /// leaves the system underdetermined.
    Underdetermined,

    /// Returned when a distance is zero or negative; its logarithm is
    /// undefined.
    NonPositiveDistance(f64),
}

impl fmt::Display for FitError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FitError::Underdetermined => {
                write!(f, "need measurements at two or more distinct distances")
            }
            FitError::NonPositiveDistance(d) => write!(f, "distance {} is not positive", d),
        }
    }
}

impl std::error::Error for FitError {}

/// Solution of the over-determined system `L_i = 10 n log10(d_i) + C`, where
/// the path loss `L_i` is the additive inverse of the measured RSSI.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathLossFit {
    /// Path loss exponent
    pub n: f64,
    /// Path loss at 1 m, in dB
    pub c: f64,
}

impl PathLossFit {
    /// Least-squares fit over the measurements.
    pub fn solve(samples: &[RssiRecord]) -> Result<Self, FitError> {
        if let Some(bad) = samples.iter().find(|s| s.dist_m <= 0.0) {
            return Err(FitError::NonPositiveDistance(bad.dist_m));
        }

        let x: Vec<f64> = samples.iter().map(|s| 10.0 * s.dist_m.log10()).collect();
        let y: Vec<f64> = samples.iter().map(|s| -s.rssi_db).collect();

        if x.len() < 2 {
            return Err(FitError::Underdetermined);
        }
        let n = x.len() as f64;
        let mean_x = x.iter().sum::<f64>() / n;
        let mean_y = y.iter().sum::<f64>() / n;

        // centred sums, so close but distinct distances still resolve
        let sxx: f64 = x.iter().map(|a| (a - mean_x).powi(2)).sum();
        let sxy: f64 = x.iter().zip(&y).map(|(a, b)| (a - mean_x) * (b - mean_y)).sum();
        let scale: f64 = x.iter().map(|a| a * a).sum();
        if sxx <= f64::EPSILON * scale {
            return Err(FitError::Underdetermined);
        }

        let slope = sxy / sxx;
        let intercept = mean_y - slope * mean_x;

        Ok(PathLossFit {
            n: slope,
            c: intercept,
        })
    }

    /// Path loss predicted by the fitted model at `dist_m`.
    pub fn predict(&self, dist_m: f64) -> f64 {
        10.0 * self.n * dist_m.log10() + self.c
    }
}

impl fmt::Display for PathLossFit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "n = {} C = {}", self.n, self.c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn describe_matches_linear_quantiles() {
        let s = Summary::describe(&[4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_eq!(s.count, 4);
        assert!(close(s.mean, 2.5));
        assert!(close(s.std, (5.0f64 / 3.0).sqrt()));
        assert!(close(s.min, 1.0));
        assert!(close(s.q25, 1.75));
        assert!(close(s.q50, 2.5));
        assert!(close(s.q75, 3.25));
        assert!(close(s.max, 4.0));
    }

    #[test]
    fn describe_single_and_empty() {
        let s = Summary::describe(&[0.5]).unwrap();
        assert!(s.std.is_nan());
        assert_eq!(s.q25, 0.5);
        assert_eq!(s.q75, 0.5);
        assert!(Summary::describe(&[]).is_none());
    }

    #[test]
    fn responses_grouped_by_task() {
        let jobs = [
            JobRecord {
                task: 2,
                release_s: 0.0,
                completion_s: 0.25,
            },
            JobRecord {
                task: 1,
                release_s: 0.0,
                completion_s: 0.5,
            },
            JobRecord {
                task: 1,
                release_s: 1.0,
                completion_s: 1.75,
            },
        ];
        let res = response_times(&jobs);
        assert_eq!(res.len(), 2);
        assert_eq!(res[0].0, 1);
        assert_eq!(res[0].1.count, 2);
        assert!(close(res[0].1.mean, 0.625));
        assert_eq!(res[1].0, 2);
        assert!(close(res[1].1.max, 0.25));

        let table = format_summary_table("response_s", &res);
        assert_eq!(table.lines().count(), 4);
        assert!(table.contains("response_s"));
    }

    #[test]
    fn fit_recovers_exact_model() {
        let (n, c) = (2.5, 40.0);
        let samples: Vec<RssiRecord> = [1.0, 2.0, 4.0, 8.0, 16.0]
            .iter()
            .map(|&d: &f64| RssiRecord {
                dist_m: d,
                rssi_db: -(10.0 * n * d.log10() + c),
            })
            .collect();
        let fit = PathLossFit::solve(&samples).unwrap();
        assert!(close(fit.n, n));
        assert!(close(fit.c, c));
        assert!(close(fit.predict(1.0), c));
    }

    #[test]
    fn fit_resolves_close_distances() {
        let samples: Vec<RssiRecord> = [1.0, 1.0000001]
            .iter()
            .map(|&d: &f64| RssiRecord {
                dist_m: d,
                rssi_db: -(20.0 * d.log10() + 40.0),
            })
            .collect();
        let fit = PathLossFit::solve(&samples).unwrap();
        assert!((fit.n - 2.0).abs() < 1e-3);
        assert!((fit.c - 40.0).abs() < 1e-6);
    }

    #[test]
    fn fit_rejects_degenerate_input() {
        let same = [
            RssiRecord {
                dist_m: 2.0,
                rssi_db: -40.0,
            },
            RssiRecord {
                dist_m: 2.0,
                rssi_db: -45.0,
            },
        ];
        assert_eq!(PathLossFit::solve(&same), Err(FitError::Underdetermined));
        assert_eq!(PathLossFit::solve(&[]), Err(FitError::Underdetermined));

        let zero = [RssiRecord {
            dist_m: 0.0,
            rssi_db: -40.0,
        }];
        assert_eq!(
            PathLossFit::solve(&zero),
            Err(FitError::NonPositiveDistance(0.0))
        );
    }
}
