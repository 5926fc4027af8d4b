use crate::models::{Investor, NavPoint, PortfolioPayload, Transaction, TransactionKind};
use crate::security_parser::{extract_scheme_and_isin, normalize_isin};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, info};

pub struct ParsedPortfolio {
    pub investor: Investor,
    pub transactions: Vec<Transaction>,
    /// Latest provider NAV per security key (ISIN, or scheme name without one).
    pub valuations: HashMap<String, NavPoint>,
}

fn broker_matches(folio_broker: Option<&str>, wanted: &str) -> bool {
    folio_broker
        .map(|b| b.to_lowercase().contains(wanted))
        .unwrap_or(false)
}

impl ParsedPortfolio {
    /// True when at least one purchase or redemption survived parsing.
    pub fn has_cash_flows(&self) -> bool {
        self.transactions
            .iter()
            .any(|t| matches!(t.kind, TransactionKind::Purchase | TransactionKind::Redemption))
    }
}

pub fn parse_transactions_and_investor(
    payload: PortfolioPayload,
    broker: Option<&str>,
) -> ParsedPortfolio {
    let broker_filter = broker
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(str::to_lowercase);

    let mut transactions = Vec::new();
    let mut valuations: HashMap<String, NavPoint> = HashMap::new();
    let mut skipped = 0usize;

    for folio in payload.folios {
        if let Some(wanted) = &broker_filter {
            if !broker_matches(folio.broker.as_deref(), wanted) {
                debug!("Skipping folio {} (broker {:?})", folio.folio, folio.broker);
                continue;
            }
        }

        for scheme in folio.schemes {
            let (name, embedded_isin) = extract_scheme_and_isin(&scheme.scheme);
            let isin = scheme
                .isin
                .as_deref()
                .and_then(normalize_isin)
                .or(embedded_isin);
            let key = isin.clone().unwrap_or_else(|| name.clone());

            let last_tx_date = scheme.transactions.iter().map(|t| t.date).max();
            if let (Some(nav), Some(date)) = (scheme.nav, scheme.nav_date.or(last_tx_date)) {
                let point = NavPoint { date, nav };
                valuations
                    .entry(key)
                    .and_modify(|existing| {
                        if point.date > existing.date {
                            *existing = point;
                        }
                    })
                    .or_insert(point);
            }

            for record in scheme.transactions {
                let amount = record.amount.abs();
                let (kind, units) = match TransactionKind::classify(&record.transaction_type) {
                    // Bonus and allotment rows carry units but no cash; they stay in the
                    // unit ledger with their provider sign.
                    TransactionKind::Other => match record.units.filter(|u| !u.is_zero()) {
                        Some(units) => (TransactionKind::UnitsOnly, units),
                        None => {
                            skipped += 1;
                            continue;
                        }
                    },
                    kind => {
                        let units = record
                            .units
                            .map(|u| u.abs())
                            .or_else(|| record.nav.filter(|n| !n.is_zero()).map(|n| amount / n))
                            .unwrap_or(Decimal::ZERO);
                        (kind, units)
                    }
                };

                transactions.push(Transaction {
                    date: record.date,
                    scheme: name.clone(),
                    isin: isin.clone(),
                    folio: folio.folio.clone(),
                    amc: folio.amc.clone(),
                    broker: folio.broker.clone(),
                    kind,
                    amount,
                    units,
                    nav: record.nav,
                });
            }
        }
    }

    transactions.sort_by_key(|t| t.date);

    info!(
        "Parsed {} transactions across {} valued securities ({} non cash-flow rows skipped)",
        transactions.len(),
        valuations.len(),
        skipped
    );

    ParsedPortfolio {
        investor: payload.investor,
        transactions,
        valuations,
    }
}
