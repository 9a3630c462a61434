//! Currency table handling for the pricing wizard and invoices.
//!
//! The payment platform publishes a JSON table describing, per ISO code, how
//! prices in minor units are displayed (separators, symbol placement, decimal
//! exponent) and which amounts it accepts. This module models that table,
//! converts between minor units and display strings, and keeps a cached copy
//! refreshed on a TTL with an embedded fallback so pricing works offline.

use crate::config::CurrencyConfig;
use crate::errors::{AppError, AppResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Shipped copy of the platform currency table, used until the first
/// successful fetch and whenever fetching fails.
const FALLBACK_CURRENCIES: &str = include_str!("../assets/currencies.json");

/// One row of the platform currency table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurrencyEntry {
    pub code: String,
    pub title: String,
    pub symbol: String,
    pub native: String,
    pub thousands_sep: String,
    pub decimal_sep: String,
    pub symbol_left: bool,
    pub space_between: bool,
    /// Number of minor-unit digits, e.g. 2 for USD cents, 0 for CLP.
    pub exp: u32,
    /// Smallest accepted amount in minor units, as published (string-typed).
    pub min_amount: String,
    /// Largest accepted amount in minor units, as published (string-typed).
    pub max_amount: String,
}

impl CurrencyEntry {
    pub fn min_amount_minor(&self) -> Option<i64> {
        self.min_amount.parse().ok()
    }

    pub fn max_amount_minor(&self) -> Option<i64> {
        self.max_amount.parse().ok()
    }
}

/// The full code-keyed table.
#[derive(Clone, Debug, Default)]
pub struct CurrencyTable {
    entries: HashMap<String, CurrencyEntry>,
}

impl CurrencyTable {
    /// Parse the table from its published JSON form (a map keyed by code).
    pub fn parse(raw: &str) -> AppResult<Self> {
        let entries: HashMap<String, CurrencyEntry> = serde_json::from_str(raw)
            .map_err(|err| AppError::Currency(format!("currency table parse: {}", err)))?;
        if entries.is_empty() {
            return Err(AppError::Currency("currency table is empty".to_string()));
        }
        Ok(Self::from_entries(entries))
    }

    fn from_entries(entries: HashMap<String, CurrencyEntry>) -> Self {
        let entries = entries
            .into_values()
            .map(|entry| (entry.code.to_uppercase(), entry))
            .collect();
        Self { entries }
    }

    pub fn get(&self, code: &str) -> Option<&CurrencyEntry> {
        self.entries.get(&code.trim().to_uppercase())
    }

    pub fn contains(&self, code: &str) -> bool {
        self.get(code).is_some()
    }

    /// All known codes, sorted, for prompts listing what is accepted.
    pub fn codes(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = self.entries.keys().map(|s| s.as_str()).collect();
        codes.sort_unstable();
        codes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Render a minor-unit amount the way the platform displays it.
pub fn price_from_telegram(entry: &CurrencyEntry, amount_minor: i64) -> String {
    let scale = 10u64.pow(entry.exp);
    let sign = if amount_minor < 0 { "-" } else { "" };
    let abs = amount_minor.unsigned_abs();
    let units = group_thousands(abs / scale, &entry.thousands_sep);

    let number = if entry.exp == 0 {
        units
    } else {
        format!(
            "{}{}{:0width$}",
            units,
            entry.decimal_sep,
            abs % scale,
            width = entry.exp as usize
        )
    };

    let gap = if entry.space_between { " " } else { "" };
    if entry.symbol_left {
        format!("{}{}{}{}", sign, entry.symbol, gap, number)
    } else {
        format!("{}{}{}{}", sign, number, gap, entry.symbol)
    }
}

/// Parse a user-typed price into minor units for this currency.
///
/// Accepts the display form ("1,000.45", "$1,000.45") as well as a bare
/// number using the currency's decimal separator. Rejects more fractional
/// digits than the currency carries.
pub fn price_to_telegram(entry: &CurrencyEntry, input: &str) -> Result<i64, &'static str> {
    let mut cleaned = input.replace(&entry.symbol, "");
    if entry.code != entry.symbol {
        cleaned = cleaned.replace(&entry.code, "");
    }
    cleaned.retain(|c| !c.is_whitespace());
    if !entry.thousands_sep.trim().is_empty() {
        cleaned = cleaned.replace(&entry.thousands_sep, "");
    }
    let normalized = cleaned.replace(&entry.decimal_sep, ".");
    if normalized.is_empty() {
        return Err("price-invalid");
    }

    if normalized.matches('.').count() > 1 {
        return Err("price-invalid");
    }
    let (units_part, frac_part) = match normalized.split_once('.') {
        Some((units, frac)) => (units, frac),
        None => (normalized.as_str(), ""),
    };
    if !units_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return Err("price-invalid");
    }
    if frac_part.len() > entry.exp as usize {
        return Err("price-invalid");
    }

    let scale = 10i64.pow(entry.exp);
    let units: i64 = if units_part.is_empty() {
        0
    } else {
        units_part.parse().map_err(|_| "price-invalid")?
    };
    let frac: i64 = if frac_part.is_empty() {
        0
    } else {
        let parsed: i64 = frac_part.parse().map_err(|_| "price-invalid")?;
        parsed * 10i64.pow(entry.exp - frac_part.len() as u32)
    };

    units
        .checked_mul(scale)
        .and_then(|minor| minor.checked_add(frac))
        .ok_or("price-invalid")
}

/// Check a minor-unit amount against the currency's published bounds.
pub fn validate_price_bounds(entry: &CurrencyEntry, amount_minor: i64) -> Result<(), &'static str> {
    if let Some(min) = entry.min_amount_minor() {
        if amount_minor < min {
            return Err("price-too-low");
        }
    }
    if let Some(max) = entry.max_amount_minor() {
        if amount_minor > max {
            return Err("price-too-high");
        }
    }
    Ok(())
}

fn group_thousands(value: u64, sep: &str) -> String {
    let digits = value.to_string();
    if sep.is_empty() {
        return digits;
    }
    let offset = digits.len() % 3;
    let mut out = String::with_capacity(digits.len() + sep.len() * (digits.len() / 3));
    for (i, ch) in digits.chars().enumerate() {
        if i != 0 && (i + 3 - offset) % 3 == 0 {
            out.push_str(sep);
        }
        out.push(ch);
    }
    out
}

/// Whether a cached table is due for a refresh. Pure so the TTL policy is
/// testable without a cache instance.
pub fn needs_refresh(last_refresh: Option<Instant>, now: Instant, ttl: Duration) -> bool {
    match last_refresh {
        None => true,
        Some(at) => now.duration_since(at) >= ttl,
    }
}

struct CacheState {
    table: Arc<CurrencyTable>,
    last_refresh: Option<Instant>,
}

/// TTL cache over the platform currency table.
///
/// Construction parses the embedded fallback, so a cache always serves a
/// usable table; network refreshes replace it when they succeed.
pub struct CurrencyCache {
    url: String,
    ttl: Duration,
    http: reqwest::Client,
    state: RwLock<CacheState>,
}

impl CurrencyCache {
    pub fn new(config: &CurrencyConfig) -> AppResult<Self> {
        let table = CurrencyTable::parse(FALLBACK_CURRENCIES)?;
        Ok(Self {
            url: config.url.clone(),
            ttl: Duration::from_secs(config.refresh_secs),
            http: reqwest::Client::new(),
            state: RwLock::new(CacheState {
                table: Arc::new(table),
                last_refresh: None,
            }),
        })
    }

    /// The table currently held, without considering freshness.
    pub fn current(&self) -> Arc<CurrencyTable> {
        self.state.read().table.clone()
    }

    /// Return a fresh-enough table, fetching when the TTL has lapsed.
    /// A failed fetch logs and serves the cached copy; the next attempt
    /// waits out a full TTL so a dead endpoint is not hammered.
    pub async fn get_or_refresh(&self) -> Arc<CurrencyTable> {
        let now = Instant::now();
        {
            let state = self.state.read();
            if !needs_refresh(state.last_refresh, now, self.ttl) {
                return state.table.clone();
            }
        }
        {
            let mut state = self.state.write();
            if !needs_refresh(state.last_refresh, now, self.ttl) {
                return state.table.clone();
            }
            state.last_refresh = Some(now);
        }

        match self.fetch().await {
            Ok(table) => {
                info!(currencies = table.len(), "Refreshed currency table");
                let table = Arc::new(table);
                self.state.write().table = table.clone();
                table
            }
            Err(err) => {
                warn!(error = %err, "Currency table refresh failed, serving cached copy");
                self.current()
            }
        }
    }

    async fn fetch(&self) -> AppResult<CurrencyTable> {
        let entries: HashMap<String, CurrencyEntry> = self
            .http
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if entries.is_empty() {
            return Err(AppError::Currency("fetched table is empty".to_string()));
        }
        Ok(CurrencyTable::from_entries(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> CurrencyTable {
        CurrencyTable::parse(FALLBACK_CURRENCIES).unwrap()
    }

    #[test]
    fn formats_grouped_decimal_currency() {
        let table = table();
        let usd = table.get("USD").unwrap();
        assert_eq!(price_from_telegram(usd, 100045), "$1,000.45");
        assert_eq!(price_from_telegram(usd, 5), "$0.05");
        assert_eq!(price_from_telegram(usd, 100), "$1.00");
    }

    #[test]
    fn formats_zero_exponent_currency() {
        let table = table();
        let clp = table.get("CLP").unwrap();
        assert_eq!(price_from_telegram(clp, 100000), "100.000 CLP");
        assert_eq!(price_from_telegram(clp, 999), "999 CLP");
    }

    #[test]
    fn display_and_parse_are_idempotent() {
        let table = table();
        for code in ["USD", "CLP", "EUR", "JPY"] {
            let entry = table.get(code).unwrap();
            for amount in [1i64, 999, 100045, 250000000] {
                let shown = price_from_telegram(entry, amount);
                let parsed = price_to_telegram(entry, &shown).unwrap();
                assert_eq!(
                    price_from_telegram(entry, parsed),
                    shown,
                    "round trip for {} {}",
                    code,
                    amount
                );
            }
        }
    }

    #[test]
    fn parses_bare_user_input() {
        let table = table();
        let usd = table.get("USD").unwrap();
        assert_eq!(price_to_telegram(usd, "1000.45"), Ok(100045));
        assert_eq!(price_to_telegram(usd, "1000.4"), Ok(100040));
        assert_eq!(price_to_telegram(usd, "12"), Ok(1200));
        assert_eq!(price_to_telegram(usd, " $ 12 "), Ok(1200));

        assert_eq!(price_to_telegram(usd, "1000.456"), Err("price-invalid"));
        assert_eq!(price_to_telegram(usd, "ten"), Err("price-invalid"));
        assert_eq!(price_to_telegram(usd, ""), Err("price-invalid"));

        let clp = table.get("CLP").unwrap();
        assert_eq!(price_to_telegram(clp, "100.000"), Ok(100000));
        assert_eq!(price_to_telegram(clp, "100000"), Ok(100000));
    }

    #[test]
    fn enforces_published_bounds() {
        let table = table();
        let usd = table.get("USD").unwrap();
        let min = usd.min_amount_minor().unwrap();
        let max = usd.max_amount_minor().unwrap();
        assert_eq!(validate_price_bounds(usd, min), Ok(()));
        assert_eq!(validate_price_bounds(usd, min - 1), Err("price-too-low"));
        assert_eq!(validate_price_bounds(usd, max), Ok(()));
        assert_eq!(validate_price_bounds(usd, max + 1), Err("price-too-high"));
    }

    #[test]
    fn unknown_codes_are_absent() {
        let table = table();
        assert!(table.get("usd").is_some());
        assert!(table.get("XXX").is_none());
    }

    #[test]
    fn ttl_check_is_pure() {
        let ttl = Duration::from_secs(60);
        let start = Instant::now();
        assert!(needs_refresh(None, start, ttl));
        assert!(!needs_refresh(Some(start), start + Duration::from_secs(30), ttl));
        assert!(needs_refresh(Some(start), start + Duration::from_secs(60), ttl));
    }
}
