use std::fmt;

/// Money is kept as a signed count of minor currency units (cents, kuruş...).
/// 1 major unit = 100 minor units for every supported currency, so 50.00 EUR = 5000.
pub type MinorUnits = i64;

/// Format minor units as a decimal major-unit string.
/// Example: 5000 -> "50.00", -1234 -> "-12.34"
pub fn format_minor(amount: MinorUnits) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Parse a decimal major-unit string into minor units.
/// Example: "50.00" -> 5000, "12.5" -> 1250, "100" -> 10000
///
/// More than two decimal places is rejected rather than truncated, since
/// silently dropping fractions of a cent on a transfer is never wanted.
pub fn parse_minor(input: &str) -> Result<MinorUnits, ParseAmountError> {
    let input = input.trim();
    let (negative, digits) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input),
    };
    if digits.is_empty() {
        return Err(ParseAmountError::InvalidFormat);
    }

    let (units_str, fraction_str) = match digits.split_once('.') {
        Some((units, fraction)) => (units, fraction),
        None => (digits, ""),
    };
    if units_str.is_empty() && fraction_str.is_empty() {
        return Err(ParseAmountError::InvalidFormat);
    }

    let units: i64 = if units_str.is_empty() {
        0
    } else {
        parse_digits(units_str)?
    };

    if !fraction_str.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseAmountError::InvalidFormat);
    }
    let fraction: i64 = match fraction_str.len() {
        0 => 0,
        1 => parse_digits(fraction_str)? * 10,
        2 => parse_digits(fraction_str)?,
        _ => return Err(ParseAmountError::TooManyDecimals),
    };

    let amount = units
        .checked_mul(100)
        .and_then(|v| v.checked_add(fraction))
        .ok_or(ParseAmountError::Overflow)?;
    Ok(if negative { -amount } else { amount })
}

fn parse_digits(s: &str) -> Result<i64, ParseAmountError> {
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseAmountError::InvalidFormat);
    }
    s.parse().map_err(|_| ParseAmountError::Overflow)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseAmountError {
    InvalidFormat,
    TooManyDecimals,
    Overflow,
}

impl fmt::Display for ParseAmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseAmountError::InvalidFormat => write!(f, "invalid money format"),
            ParseAmountError::TooManyDecimals => write!(f, "at most two decimal places allowed"),
            ParseAmountError::Overflow => write!(f, "amount out of range"),
        }
    }
}

impl std::error::Error for ParseAmountError {}
