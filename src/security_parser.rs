use regex::Regex;
use once_cell::sync::Lazy;

static SCHEME_ISIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.*?)\s*(?:[-/(]\s*)?ISIN\s*:?\s*([A-Z]{2}[A-Z0-9]{9}[0-9])\)?").unwrap()
});

static ISIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Z]{2}[A-Z0-9]{9}[0-9]$").unwrap()
});

/// Splits a scheme label such as `"Axis Bluechip Fund - Direct Growth - ISIN: INF846K01DP8"`
/// into the scheme name and the embedded ISIN.
pub fn extract_scheme_and_isin(text: &str) -> (String, Option<String>) {
    if let Some(caps) = SCHEME_ISIN_RE.captures(text) {
        let name = caps.get(1).map_or("", |m| m.as_str()).trim().to_string();
        let isin = caps.get(2).map(|m| m.as_str().to_string());
        (name, isin)
    } else {
        (text.trim().to_string(), None)
    }
}

pub fn normalize_isin(raw: &str) -> Option<String> {
    let isin = raw.trim().to_uppercase();
    if ISIN_RE.is_match(&isin) {
        Some(isin)
    } else {
        None
    }
}
