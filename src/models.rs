use serde::{Deserialize, Deserializer, Serialize};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Investor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pan: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
}

/// Body returned by the upstream provider for `GET /clients/{pan}/portfolio`.
#[derive(Debug, Deserialize)]
pub struct PortfolioPayload {
    #[serde(default)]
    pub investor: Investor,
    #[serde(default)]
    pub folios: Vec<FolioRecord>,
}

#[derive(Debug, Deserialize)]
pub struct FolioRecord {
    #[serde(default, deserialize_with = "deserialize_text")]
    pub folio: String,
    #[serde(default)]
    pub amc: Option<String>,
    #[serde(default)]
    pub broker: Option<String>,
    #[serde(default)]
    pub schemes: Vec<SchemeRecord>,
}

#[derive(Debug, Deserialize)]
pub struct SchemeRecord {
    pub scheme: String,
    #[serde(default)]
    pub isin: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_amount")]
    pub nav: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub nav_date: Option<NaiveDate>,
    #[serde(default)]
    pub transactions: Vec<TransactionRecord>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionRecord {
    #[serde(deserialize_with = "deserialize_date")]
    pub date: NaiveDate,
    #[serde(rename = "type", alias = "transaction_type")]
    pub transaction_type: String,
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub amount: Decimal,
    #[serde(default, deserialize_with = "deserialize_optional_amount")]
    pub units: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_optional_amount")]
    pub nav: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Purchase,
    Redemption,
    /// Units change hands without cash, e.g. bonus or segregated-portfolio allotments.
    UnitsOnly,
    Other,
}

impl TransactionKind {
    /// Maps a provider transaction type onto the cash-flow direction it represents.
    /// Taxes, stamp duty and dividend payouts are not investor cash flows.
    pub fn classify(raw: &str) -> Self {
        let t = raw.trim().to_uppercase().replace([' ', '-'], "_");
        if ["STAMP", "STT", "TDS", "TAX", "PAYOUT"].iter().any(|k| t.contains(k)) {
            return TransactionKind::Other;
        }
        if ["REDEMPTION", "REDEEM", "SWITCH_OUT", "STP_OUT", "SWP", "SELL"]
            .iter()
            .any(|k| t.contains(k))
        {
            return TransactionKind::Redemption;
        }
        if ["PURCHASE", "SIP", "SWITCH_IN", "STP_IN", "REINVEST", "BUY", "NFO"]
            .iter()
            .any(|k| t.contains(k))
        {
            return TransactionKind::Purchase;
        }
        TransactionKind::Other
    }
}

/// One investor cash flow against a scheme/folio. `amount` and `units` are magnitudes;
/// the direction lives in `kind`, except for `UnitsOnly` rows whose `units` keep the
/// provider's sign.
#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub date: NaiveDate,
    pub scheme: String,
    pub isin: Option<String>,
    pub folio: String,
    pub amc: Option<String>,
    pub broker: Option<String>,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub units: Decimal,
    pub nav: Option<Decimal>,
}

impl Transaction {
    /// Key used to look up NAVs: the ISIN, or the scheme name when the provider sent none.
    pub fn security_key(&self) -> &str {
        self.isin.as_deref().unwrap_or(&self.scheme)
    }

    /// Signed from the investor's side: purchases are outflows.
    pub fn cash_flow(&self) -> Decimal {
        match self.kind {
            TransactionKind::Purchase => -self.amount,
            TransactionKind::Redemption => self.amount,
            TransactionKind::UnitsOnly | TransactionKind::Other => Decimal::ZERO,
        }
    }

    pub fn unit_delta(&self) -> Decimal {
        match self.kind {
            TransactionKind::Purchase => self.units,
            TransactionKind::Redemption => -self.units,
            TransactionKind::UnitsOnly => self.units,
            TransactionKind::Other => Decimal::ZERO,
        }
    }

    /// NAV at which the transaction was executed, falling back to amount / units.
    pub fn effective_nav(&self) -> Option<Decimal> {
        self.nav.filter(|n| !n.is_zero()).or_else(|| {
            if self.units.is_zero() || self.amount.is_zero() {
                None
            } else {
                Some(self.amount / self.units)
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NavPoint {
    pub date: NaiveDate,
    pub nav: Decimal,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(serde_json::Number),
    Text(String),
}

fn parse_amount(raw: &str) -> Result<Option<Decimal>, String> {
    let clean = raw.replace(['₹', ','], "").replace("INR", "").trim().to_string();
    if clean.is_empty() || clean == "-" {
        return Ok(None);
    }
    Decimal::from_str(&clean)
        .or_else(|_| Decimal::from_scientific(&clean))
        .map(Some)
        .map_err(|e| format!("Invalid amount '{}': {}", raw, e))
}

fn deserialize_amount<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = NumberOrText::deserialize(deserializer)?;
    let parsed = match value {
        NumberOrText::Number(n) => parse_amount(&n.to_string()),
        NumberOrText::Text(s) => parse_amount(&s),
    };
    Ok(parsed.map_err(serde::de::Error::custom)?.unwrap_or(Decimal::ZERO))
}

fn deserialize_optional_amount<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<NumberOrText>::deserialize(deserializer)?;
    let parsed = match value {
        Some(NumberOrText::Number(n)) => parse_amount(&n.to_string()),
        Some(NumberOrText::Text(s)) => parse_amount(&s),
        None => Ok(None),
    };
    parsed.map_err(serde::de::Error::custom)
}

fn deserialize_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<NumberOrText>::deserialize(deserializer)?;
    Ok(match value {
        Some(NumberOrText::Number(n)) => n.to_string(),
        Some(NumberOrText::Text(s)) => s.trim().to_string(),
        None => String::new(),
    })
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    // Providers send either ISO dates, with or without a time part, or Indian CAS style dates.
    let date_part = s.split(['T', ' ']).next().unwrap_or(s);
    ["%Y-%m-%d", "%d-%b-%Y", "%d/%m/%Y", "%d-%m-%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

fn deserialize_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_date(&s).ok_or_else(|| serde::de::Error::custom(format!("Invalid date format: {}", s)))
}

fn deserialize_optional_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?;
    match s {
        Some(s) if !s.trim().is_empty() => parse_date(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("Invalid date format: {}", s))),
        _ => Ok(None),
    }
}
