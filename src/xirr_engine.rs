use anyhow::{Result, bail};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

use crate::models::{NavPoint, Transaction, TransactionKind};

pub const DAYS_PER_YEAR: f64 = 365.0;
const TOLERANCE: f64 = 1e-7;
const MAX_NEWTON_ITER: usize = 100;
const MAX_BISECT_ITER: usize = 300;
const BISECT_LOW: f64 = -0.9999;
const BISECT_HIGH: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CashFlow {
    pub date: NaiveDate,
    pub amount: f64,
}

/// Annualised internal rate of return for irregular cash flows, as a fraction (0.12 = 12%).
///
/// Returns `None` unless there is at least one inflow and one outflow and a root exists
/// in `(-1, 100]`.
pub fn calculate_xirr(flows: &[CashFlow]) -> Option<f64> {
    if flows.len() < 2 {
        return None;
    }

    let has_pos = flows.iter().any(|f| f.amount > 0.0);
    let has_neg = flows.iter().any(|f| f.amount < 0.0);
    if !has_pos || !has_neg {
        return None;
    }

    let start_date = flows.iter().map(|f| f.date).min()?;
    let points: Vec<(f64, f64)> = flows
        .iter()
        .map(|f| ((f.date - start_date).num_days() as f64 / DAYS_PER_YEAR, f.amount))
        .collect();
    if points.iter().all(|(years, _)| *years == 0.0) {
        return None;
    }

    newton(&points, 0.1).or_else(|| bisect(&points))
}

fn npv(points: &[(f64, f64)], rate: f64) -> f64 {
    let base = 1.0 + rate;
    points.iter().map(|(years, amount)| amount * base.powf(-years)).sum()
}

fn npv_derivative(points: &[(f64, f64)], rate: f64) -> f64 {
    let base = 1.0 + rate;
    points
        .iter()
        .map(|(years, amount)| amount * -years * base.powf(-years) / base)
        .sum()
}

fn newton(points: &[(f64, f64)], guess: f64) -> Option<f64> {
    let mut rate = guess;

    for _ in 0..MAX_NEWTON_ITER {
        let f_val = npv(points, rate);
        if f_val.abs() < TOLERANCE {
            return Some(rate);
        }

        let df_val = npv_derivative(points, rate);
        if !df_val.is_finite() || df_val.abs() < 1e-12 {
            return None;
        }

        let new_rate = rate - f_val / df_val;
        if !new_rate.is_finite() || new_rate <= -1.0 {
            return None;
        }
        if (new_rate - rate).abs() < TOLERANCE {
            return Some(new_rate);
        }
        rate = new_rate;
    }

    None
}

fn bisect(points: &[(f64, f64)]) -> Option<f64> {
    let (mut lo, mut hi) = (BISECT_LOW, BISECT_HIGH);
    let mut f_lo = npv(points, lo);
    let f_hi = npv(points, hi);
    if !f_lo.is_finite() || !f_hi.is_finite() || f_lo.signum() == f_hi.signum() {
        return None;
    }

    for _ in 0..MAX_BISECT_ITER {
        let mid = (lo + hi) / 2.0;
        let f_mid = npv(points, mid);
        if f_mid.abs() < TOLERANCE || (hi - lo) / 2.0 < TOLERANCE {
            return Some(mid);
        }
        if f_mid.signum() == f_lo.signum() {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
        }
    }

    Some((lo + hi) / 2.0)
}

/// Holdings below this many units count as fully redeemed.
const UNIT_DUST: Decimal = Decimal::from_parts(1, 0, 0, false, 3);

fn round_pct(rate: f64) -> f64 {
    (rate * 100.0 * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Serialize)]
pub struct XirrPoint {
    pub date: NaiveDate,
    /// XIRR in percent.
    pub xirr: Option<f64>,
    /// Purchases minus redemptions up to `date`.
    pub invested: Decimal,
    pub value: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub units: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryLevel {
    Isin,
    Scheme,
    SchemeFolio,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryRow {
    pub scheme: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folio: Option<String>,
    pub first_investment: NaiveDate,
    pub investment: Decimal,
    pub redemption: Decimal,
    pub units: Decimal,
    pub final_value: Decimal,
    pub gain: Decimal,
    /// XIRR in percent.
    pub xirr: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct XirrReport {
    pub valuation_date: NaiveDate,
    pub portfolio_xirr: Vec<XirrPoint>,
    pub scheme_timelines: BTreeMap<String, Vec<XirrPoint>>,
    pub summary_isin: Vec<SummaryRow>,
    pub summary_scheme: Vec<SummaryRow>,
    pub summary_scheme_folio: Vec<SummaryRow>,
}

/// NAV history per security, built from transaction prices and the provider's latest NAV.
struct NavBook {
    series: HashMap<String, Vec<NavPoint>>,
}

impl NavBook {
    fn build(transactions: &[&Transaction], valuations: &HashMap<String, NavPoint>) -> Self {
        let mut series: HashMap<String, Vec<NavPoint>> = HashMap::new();
        for t in transactions {
            if let Some(nav) = t.effective_nav() {
                series
                    .entry(t.security_key().to_string())
                    .or_default()
                    .push(NavPoint { date: t.date, nav });
            }
        }
        for (key, point) in valuations {
            series.entry(key.clone()).or_default().push(*point);
        }
        // Stable sort keeps the provider NAV after a same-day transaction NAV.
        for points in series.values_mut() {
            points.sort_by_key(|p| p.date);
        }
        NavBook { series }
    }

    fn nav_on(&self, key: &str, date: NaiveDate) -> Option<Decimal> {
        let points = self.series.get(key)?;
        let idx = points.partition_point(|p| p.date <= date);
        if idx == 0 {
            None
        } else {
            Some(points[idx - 1].nav)
        }
    }
}

struct Snapshot {
    investment: Decimal,
    redemption: Decimal,
    units: Decimal,
    value: Decimal,
    xirr: Option<f64>,
}

fn snapshot(transactions: &[&Transaction], navs: &NavBook, as_of: NaiveDate) -> Snapshot {
    let mut investment = Decimal::ZERO;
    let mut redemption = Decimal::ZERO;
    let mut units_by_key: HashMap<&str, Decimal> = HashMap::new();
    let mut flows = Vec::new();

    for t in transactions.iter().filter(|t| t.date <= as_of) {
        match t.kind {
            TransactionKind::Purchase => investment += t.amount,
            TransactionKind::Redemption => redemption += t.amount,
            TransactionKind::UnitsOnly => {}
            TransactionKind::Other => continue,
        }
        *units_by_key.entry(t.security_key()).or_insert(Decimal::ZERO) += t.unit_delta();
        if t.kind != TransactionKind::UnitsOnly {
            flows.push(CashFlow {
                date: t.date,
                amount: t.cash_flow().to_f64().unwrap_or(0.0),
            });
        }
    }

    let mut units = Decimal::ZERO;
    let mut value = Decimal::ZERO;
    for (key, held) in &units_by_key {
        if held.abs() < UNIT_DUST {
            continue;
        }
        // Usually a history that starts mid-way; an oversold holding is worth nothing.
        if held.is_sign_negative() {
            warn!("Negative holding of {} units in {} on {}, valuing at zero", held, key, as_of);
            continue;
        }
        units += *held;
        match navs.nav_on(key, as_of) {
            Some(nav) => value += *held * nav,
            None => debug!("No NAV for {} on {}", key, as_of),
        }
    }
    let value = value.round_dp(2);

    if value > Decimal::ZERO {
        flows.push(CashFlow {
            date: as_of,
            amount: value.to_f64().unwrap_or(0.0),
        });
    }

    Snapshot {
        investment,
        redemption,
        units: units.round_dp(4),
        value,
        xirr: calculate_xirr(&flows).map(round_pct),
    }
}

fn build_timeline(
    transactions: &[&Transaction],
    navs: &NavBook,
    valuation_date: NaiveDate,
    with_units: bool,
) -> Vec<XirrPoint> {
    let mut dates: BTreeSet<NaiveDate> = transactions.iter().map(|t| t.date).collect();
    dates.insert(valuation_date);

    dates
        .into_iter()
        .map(|date| {
            let snap = snapshot(transactions, navs, date);
            XirrPoint {
                date,
                xirr: snap.xirr,
                invested: snap.investment - snap.redemption,
                value: snap.value,
                units: with_units.then_some(snap.units),
            }
        })
        .collect()
}

fn summarize<K: Ord>(
    transactions: &[&Transaction],
    navs: &NavBook,
    valuation_date: NaiveDate,
    level: SummaryLevel,
    key_fn: impl Fn(&Transaction) -> K,
) -> Vec<SummaryRow> {
    let mut groups: BTreeMap<K, Vec<&Transaction>> = BTreeMap::new();
    for t in transactions {
        groups.entry(key_fn(*t)).or_default().push(*t);
    }

    groups
        .into_values()
        .map(|group| {
            let first = group[0];
            let first_investment = group
                .iter()
                .find(|t| t.kind == TransactionKind::Purchase)
                .unwrap_or(&first)
                .date;
            let snap = snapshot(&group, navs, valuation_date);
            SummaryRow {
                scheme: first.scheme.clone(),
                isin: match level {
                    SummaryLevel::Scheme => None,
                    _ => first.isin.clone(),
                },
                folio: match level {
                    SummaryLevel::SchemeFolio => Some(first.folio.clone()),
                    _ => None,
                },
                first_investment,
                investment: snap.investment,
                redemption: snap.redemption,
                units: snap.units,
                final_value: snap.value,
                gain: snap.value + snap.redemption - snap.investment,
                xirr: snap.xirr,
            }
        })
        .collect()
}

/// Computes the portfolio timeline, per-scheme timelines and the three summary tables.
/// `transactions` must be sorted by date.
pub fn generate_xirr_report(
    transactions: &[Transaction],
    valuations: &HashMap<String, NavPoint>,
) -> Result<XirrReport> {
    let flows: Vec<&Transaction> = transactions
        .iter()
        .filter(|t| t.kind != TransactionKind::Other)
        .collect();
    if !flows.iter().any(|t| t.kind != TransactionKind::UnitsOnly) {
        bail!("No cash-flow transactions to evaluate");
    }

    let last_tx_date = flows.iter().map(|t| t.date).max();
    let last_nav_date = valuations.values().map(|p| p.date).max();
    let valuation_date = match (last_tx_date, last_nav_date) {
        (Some(a), Some(b)) => a.max(b),
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => bail!("No dates available for valuation"),
    };

    let navs = NavBook::build(&flows, valuations);

    let portfolio_xirr = build_timeline(&flows, &navs, valuation_date, false);

    let mut by_scheme: BTreeMap<String, Vec<&Transaction>> = BTreeMap::new();
    for t in &flows {
        by_scheme.entry(t.scheme.clone()).or_default().push(*t);
    }
    let scheme_timelines = by_scheme
        .into_iter()
        .map(|(scheme, txs)| {
            let timeline = build_timeline(&txs, &navs, valuation_date, true);
            (scheme, timeline)
        })
        .collect();

    let summary_isin = summarize(&flows, &navs, valuation_date, SummaryLevel::Isin, |t| {
        t.security_key().to_string()
    });
    let summary_scheme = summarize(&flows, &navs, valuation_date, SummaryLevel::Scheme, |t| {
        t.scheme.clone()
    });
    let summary_scheme_folio = summarize(
        &flows,
        &navs,
        valuation_date,
        SummaryLevel::SchemeFolio,
        |t| (t.scheme.clone(), t.folio.clone()),
    );

    info!(
        "XIRR report: {} timeline points, {} schemes, valuation date {}",
        portfolio_xirr.len(),
        summary_scheme.len(),
        valuation_date
    );

    Ok(XirrReport {
        valuation_date,
        portfolio_xirr,
        scheme_timelines,
        summary_isin,
        summary_scheme,
        summary_scheme_folio,
    })
}
