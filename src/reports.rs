use anyhow::{Context, Result};
use askama::Template;
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal::prelude::*;
use rust_xlsxwriter::{ExcelDateTime, Format, Workbook, Worksheet, XlsxError};
use std::collections::HashSet;

use crate::xirr_engine::{SummaryLevel, SummaryRow, XirrPoint, XirrReport};

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const SHEET_NAME_MAX: usize = 30;
const SHEET_NAME_ILLEGAL: [char; 7] = ['[', ']', ':', '*', '?', '/', '\\'];

/// Names per-scheme sheets may not take: the fixed sheets plus Excel's reserved "History".
const RESERVED_SHEETS: [&str; 5] = [
    "Portfolio_XIRR",
    "XIRR_Summary_ISIN",
    "XIRR_Summary_Scheme",
    "XIRR_Summary_SchemeFolio",
    "History",
];

fn truncate(name: &str, max: usize) -> String {
    name.chars().take(max).collect()
}

/// Excel rejects names that start or end with an apostrophe.
fn tidy(name: &str) -> &str {
    name.trim_matches(|c: char| c == '\'' || c.is_whitespace())
}

/// Excel-safe sheet name: illegal characters replaced, at most 30 characters,
/// unique (case-insensitively) against `used`.
pub fn sanitize_sheet_name(raw: &str, used: &mut HashSet<String>) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if SHEET_NAME_ILLEGAL.contains(&c) { '_' } else { c })
        .collect();
    let base = match tidy(&truncate(tidy(&cleaned), SHEET_NAME_MAX)) {
        "" => "Sheet".to_string(),
        trimmed => trimmed.to_string(),
    };

    let mut name = base.clone();
    let mut n = 2;
    while used.contains(&name.to_lowercase()) {
        let suffix = format!("_{}", n);
        let stem = truncate(&base, SHEET_NAME_MAX - suffix.len());
        let stem = match tidy(&stem) {
            "" => "Sheet",
            trimmed => trimmed,
        };
        name = format!("{}{}", stem, suffix);
        n += 1;
    }
    used.insert(name.to_lowercase());
    name
}

struct Formats {
    header: Format,
    date: Format,
    money: Format,
    units: Format,
    pct: Format,
}

impl Formats {
    fn new() -> Self {
        Self {
            header: Format::new().set_bold(),
            date: Format::new().set_num_format("yyyy-mm-dd"),
            money: Format::new().set_num_format("#,##0.00"),
            units: Format::new().set_num_format("#,##0.0000"),
            pct: Format::new().set_num_format("0.00"),
        }
    }
}

fn excel_date(date: NaiveDate) -> Result<ExcelDateTime, XlsxError> {
    ExcelDateTime::from_ymd(date.year() as u16, date.month() as u8, date.day() as u8)
}

fn write_headers(
    sheet: &mut Worksheet,
    headers: &[&str],
    formats: &Formats,
) -> Result<(), XlsxError> {
    for (col, title) in headers.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *title, &formats.header)?;
    }
    Ok(())
}

fn write_decimal(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: Decimal,
    format: &Format,
) -> Result<(), XlsxError> {
    sheet.write_number_with_format(row, col, value.to_f64().unwrap_or(0.0), format)?;
    Ok(())
}

fn write_timeline(
    sheet: &mut Worksheet,
    points: &[XirrPoint],
    with_units: bool,
    formats: &Formats,
) -> Result<(), XlsxError> {
    let mut headers = vec!["Date", "XIRR (%)", "Net Invested (₹)", "Market Value (₹)"];
    if with_units {
        headers.push("Units");
    }
    write_headers(sheet, &headers, formats)?;

    for (i, point) in points.iter().enumerate() {
        let row = i as u32 + 1;
        sheet.write_datetime_with_format(row, 0, &excel_date(point.date)?, &formats.date)?;
        if let Some(xirr) = point.xirr {
            sheet.write_number_with_format(row, 1, xirr, &formats.pct)?;
        }
        write_decimal(sheet, row, 2, point.invested, &formats.money)?;
        write_decimal(sheet, row, 3, point.value, &formats.money)?;
        if with_units {
            write_decimal(sheet, row, 4, point.units.unwrap_or_default(), &formats.units)?;
        }
    }
    sheet.autofit();
    Ok(())
}

fn write_summary(
    sheet: &mut Worksheet,
    rows: &[SummaryRow],
    level: SummaryLevel,
    formats: &Formats,
) -> Result<(), XlsxError> {
    let mut headers = vec!["Scheme"];
    if level != SummaryLevel::Scheme {
        headers.push("ISIN");
    }
    if level == SummaryLevel::SchemeFolio {
        headers.push("Folio");
    }
    headers.extend([
        "First Investment",
        "Investment (₹)",
        "Redemption (₹)",
        "Units",
        "Final Value (₹)",
        "Gain (₹)",
        "XIRR (%)",
    ]);
    write_headers(sheet, &headers, formats)?;

    for (i, summary) in rows.iter().enumerate() {
        let row = i as u32 + 1;
        let mut col: u16 = 0;
        sheet.write_string(row, col, &summary.scheme)?;
        col += 1;
        if level != SummaryLevel::Scheme {
            sheet.write_string(row, col, summary.isin.as_deref().unwrap_or(""))?;
            col += 1;
        }
        if level == SummaryLevel::SchemeFolio {
            sheet.write_string(row, col, summary.folio.as_deref().unwrap_or(""))?;
            col += 1;
        }
        let first = excel_date(summary.first_investment)?;
        sheet.write_datetime_with_format(row, col, &first, &formats.date)?;
        write_decimal(sheet, row, col + 1, summary.investment, &formats.money)?;
        write_decimal(sheet, row, col + 2, summary.redemption, &formats.money)?;
        write_decimal(sheet, row, col + 3, summary.units, &formats.units)?;
        write_decimal(sheet, row, col + 4, summary.final_value, &formats.money)?;
        write_decimal(sheet, row, col + 5, summary.gain, &formats.money)?;
        if let Some(xirr) = summary.xirr {
            sheet.write_number_with_format(row, col + 6, xirr, &formats.pct)?;
        }
    }
    sheet.autofit();
    Ok(())
}

/// Builds the XIRR workbook: portfolio timeline, the three summaries and one sheet per scheme.
pub fn generate_excel(report: &XirrReport) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let formats = Formats::new();
    let mut used: HashSet<String> = RESERVED_SHEETS.iter().map(|s| s.to_lowercase()).collect();

    let sheet = workbook.add_worksheet();
    sheet.set_name("Portfolio_XIRR")?;
    write_timeline(sheet, &report.portfolio_xirr, false, &formats)?;

    let sheet = workbook.add_worksheet();
    sheet.set_name("XIRR_Summary_ISIN")?;
    write_summary(sheet, &report.summary_isin, SummaryLevel::Isin, &formats)?;

    let sheet = workbook.add_worksheet();
    sheet.set_name("XIRR_Summary_Scheme")?;
    write_summary(sheet, &report.summary_scheme, SummaryLevel::Scheme, &formats)?;

    if !report.summary_scheme_folio.is_empty() {
        let sheet = workbook.add_worksheet();
        sheet.set_name("XIRR_Summary_SchemeFolio")?;
        write_summary(sheet, &report.summary_scheme_folio, SummaryLevel::SchemeFolio, &formats)?;
    }

    for (scheme, points) in &report.scheme_timelines {
        let name = sanitize_sheet_name(scheme, &mut used);
        let sheet = workbook.add_worksheet();
        sheet
            .set_name(&name)
            .with_context(|| format!("Invalid sheet name {:?} for scheme {}", name, scheme))?;
        write_timeline(sheet, points, true, &formats)?;
    }

    let blob = workbook.save_to_buffer().context("Failed to serialize workbook")?;
    Ok(blob)
}

pub fn fmt_pct(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.2}%", v),
        _ => String::new(),
    }
}

/// `₹1,234,567.89` style, grouping thousands.
pub fn fmt_cur(value: Decimal) -> String {
    let rounded = format!("{:.2}", value.round_dp(2).abs());
    let (int_part, frac_part) = rounded.split_once('.').unwrap_or((rounded.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let rounded_value = value.round_dp(2);
    let sign = if rounded_value.is_sign_negative() && !rounded_value.is_zero() {
        "-"
    } else {
        ""
    };
    format!("{}₹{}.{}", sign, grouped, frac_part)
}

struct SummaryView {
    scheme: String,
    first_investment: String,
    investment: String,
    final_value: String,
    gain: String,
    xirr: String,
}

#[derive(Template)]
#[template(path = "report.html")]
struct ReportTemplate {
    valuation_date: String,
    chart_json: String,
    rows: Vec<SummaryView>,
}

fn chart_json(points: &[XirrPoint]) -> Result<String> {
    let series = serde_json::json!({
        "x": points.iter().map(|p| p.date.to_string()).collect::<Vec<_>>(),
        "y": points.iter().map(|p| p.xirr).collect::<Vec<_>>(),
    });
    // Keep a "</script>" inside data from closing the inline script.
    Ok(serde_json::to_string(&series)?.replace("</", "<\\/"))
}

/// Standalone HTML page with the portfolio XIRR trend chart and the scheme summary table.
pub fn generate_html_report(report: &XirrReport) -> Result<String> {
    let rows = report
        .summary_scheme
        .iter()
        .map(|r| SummaryView {
            scheme: r.scheme.clone(),
            first_investment: r.first_investment.to_string(),
            investment: fmt_cur(r.investment),
            final_value: fmt_cur(r.final_value),
            gain: fmt_cur(r.gain),
            xirr: fmt_pct(r.xirr),
        })
        .collect();

    let template = ReportTemplate {
        valuation_date: report.valuation_date.to_string(),
        chart_json: chart_json(&report.portfolio_xirr)?,
        rows,
    };
    template.render().context("Failed to render HTML report")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn currency_groups_thousands() {
        assert_eq!(fmt_cur(dec!(0)), "₹0.00");
        assert_eq!(fmt_cur(dec!(999.5)), "₹999.50");
        assert_eq!(fmt_cur(dec!(1234567.891)), "₹1,234,567.89");
        assert_eq!(fmt_cur(dec!(-1500)), "-₹1,500.00");
    }

    #[test]
    fn percent_blank_when_missing() {
        assert_eq!(fmt_pct(Some(12.3456)), "12.35%");
        assert_eq!(fmt_pct(None), "");
        assert_eq!(fmt_pct(Some(f64::NAN)), "");
    }

    #[test]
    fn sheet_names_are_truncated_and_deduplicated() {
        let mut used = HashSet::new();
        let long = "Aditya Birla Sun Life Frontline Equity Fund - Growth";
        let first = sanitize_sheet_name(long, &mut used);
        let second = sanitize_sheet_name(long, &mut used);
        assert_eq!(first, "Aditya Birla Sun Life Frontlin");
        assert_eq!(first.chars().count(), SHEET_NAME_MAX);
        assert_eq!(second, "Aditya Birla Sun Life Frontl_2");
        assert!(second.chars().count() <= SHEET_NAME_MAX);
    }

    #[test]
    fn sheet_names_replace_illegal_characters() {
        let mut used: HashSet<String> = RESERVED_SHEETS.iter().map(|s| s.to_lowercase()).collect();
        assert_eq!(sanitize_sheet_name("Fund [A/B]: Growth?", &mut used), "Fund _A_B__ Growth_");
        assert_eq!(sanitize_sheet_name("portfolio_xirr", &mut used), "portfolio_xirr_2");
        assert_eq!(sanitize_sheet_name("   ", &mut used), "Sheet");
        assert_eq!(sanitize_sheet_name("History", &mut used), "History_2");
    }

    #[test]
    fn sheet_names_never_end_with_apostrophe_after_truncation() {
        let mut used = HashSet::new();
        assert_eq!(
            sanitize_sheet_name("Franklin India Childrens Gift' Fund", &mut used),
            "Franklin India Childrens Gift"
        );

        // 28th character is an apostrophe, so the suffixed stem must drop it too.
        let name = "Franklin India Childrens Gi'ft Plan";
        assert_eq!(sanitize_sheet_name(name, &mut used), "Franklin India Childrens Gi'ft");
        assert_eq!(sanitize_sheet_name(name, &mut used), "Franklin India Childrens Gi_2");
        assert_eq!(sanitize_sheet_name("'' '", &mut used), "Sheet");
    }
}
