use serde::{Deserialize, Serialize};

use crate::fields::FieldError;

struct CurrencyInfo {
    code: &'static str,
    symbol: Option<&'static str>,
    /// Number of minor-unit digits
    exponent: u32,
}

const CURRENCIES: &[CurrencyInfo] = &[
    CurrencyInfo { code: "AUD", symbol: Some("A$"), exponent: 2 },
    CurrencyInfo { code: "CAD", symbol: Some("CA$"), exponent: 2 },
    CurrencyInfo { code: "CHF", symbol: None, exponent: 2 },
    CurrencyInfo { code: "CZK", symbol: None, exponent: 2 },
    CurrencyInfo { code: "DKK", symbol: None, exponent: 2 },
    CurrencyInfo { code: "EUR", symbol: Some("€"), exponent: 2 },
    CurrencyInfo { code: "GBP", symbol: Some("£"), exponent: 2 },
    CurrencyInfo { code: "JPY", symbol: Some("¥"), exponent: 0 },
    CurrencyInfo { code: "NOK", symbol: None, exponent: 2 },
    CurrencyInfo { code: "PLN", symbol: None, exponent: 2 },
    CurrencyInfo { code: "SEK", symbol: None, exponent: 2 },
    CurrencyInfo { code: "USD", symbol: Some("$"), exponent: 2 },
];

fn info(code: &str) -> Option<&'static CurrencyInfo> {
    CURRENCIES.iter().find(|c| c.code == code)
}

/// Supported ISO 4217 codes, sorted.
pub fn list_currencies() -> Vec<&'static str> {
    CURRENCIES.iter().map(|c| c.code).collect()
}

pub fn is_supported(code: &str) -> bool {
    info(code).is_some()
}

/// Amount in minor units plus its currency code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyValue {
    pub amount: i64,
    pub currency: String,
}

impl CurrencyValue {
    /// Parse a decimal string such as `1234.5` or `-12` into minor units.
    pub fn parse(input: &str, currency: &str) -> Result<Self, FieldError> {
        let exponent = info(currency)
            .map(|c| c.exponent)
            .ok_or_else(|| FieldError::UnsupportedCurrency(currency.to_string()))?;

        let invalid = || FieldError::InvalidAmount(input.to_string());
        let trimmed = input.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };

        let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        if !whole.chars().all(|c| c.is_ascii_digit())
            || !fraction.chars().all(|c| c.is_ascii_digit())
            || fraction.len() > exponent as usize
        {
            return Err(invalid());
        }

        let scale = 10i64.pow(exponent);
        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let fraction: i64 = if fraction.is_empty() {
            0
        } else {
            let padded = format!("{fraction:0<width$}", width = exponent as usize);
            padded.parse().map_err(|_| invalid())?
        };

        let amount = whole
            .checked_mul(scale)
            .and_then(|v| v.checked_add(fraction))
            .ok_or_else(invalid)?;

        Ok(Self {
            amount: if negative { -amount } else { amount },
            currency: currency.to_string(),
        })
    }
}

impl std::fmt::Display for CurrencyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let exponent = info(&self.currency).map(|c| c.exponent).unwrap_or(2);
        let scale = 10u64.pow(exponent);
        let magnitude = self.amount.unsigned_abs();
        let whole = group_thousands(magnitude / scale);
        let sign = if self.amount < 0 { "-" } else { "" };

        let number = if exponent == 0 {
            whole
        } else {
            format!(
                "{whole}.{:0width$}",
                magnitude % scale,
                width = exponent as usize
            )
        };

        match info(&self.currency).and_then(|c| c.symbol) {
            Some(symbol) => write!(f, "{sign}{symbol}{number}"),
            None => write!(f, "{sign}{} {number}", self.currency),
        }
    }
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
