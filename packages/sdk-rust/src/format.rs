//! Formatting utilities for amounts, rates and quotes
//!
//! Amounts are shown with 2 decimals and rates with 4, matching what the API
//! returns for `valor_destino` and `taxa_cambio`.

pub const AMOUNT_DECIMALS: usize = 2;
pub const RATE_DECIMALS: usize = 4;

/// Format an amount with exactly 2 decimals
///
/// # Example
/// ```
/// use cambio_sdk::format_amount;
/// assert_eq!(format_amount(90.0), "90.00");
/// assert_eq!(format_amount(1234.567), "1234.57");
/// ```
pub fn format_amount(value: f64) -> String {
    format!("{:.prec$}", value, prec = AMOUNT_DECIMALS)
}

/// Format an exchange rate with exactly 4 decimals
///
/// # Example
/// ```
/// use cambio_sdk::format_rate;
/// assert_eq!(format_rate(0.9), "0.9000");
/// ```
pub fn format_rate(value: f64) -> String {
    format!("{:.prec$}", value, prec = RATE_DECIMALS)
}

/// One-line quote for a pair, e.g. `1 USD = 0.9000 EUR`
///
/// # Example
/// ```
/// use cambio_sdk::quote_line;
/// assert_eq!(quote_line("USD", "EUR", 0.9), "1 USD = 0.9000 EUR");
/// ```
pub fn quote_line(from: &str, to: &str, rate: f64) -> String {
    format!("1 {} = {} {}", from, format_rate(rate), to)
}

/// Format a number with commas and at most `max_decimals` decimals,
/// trimming trailing zeros
///
/// # Example
/// ```
/// use cambio_sdk::format_number;
/// assert_eq!(format_number(1234.5678, 2), "1,234.57");
/// assert_eq!(format_number(1000000.0, 2), "1,000,000");
/// ```
pub fn format_number(value: f64, max_decimals: u8) -> String {
    let formatted = format!("{:.prec$}", value, prec = max_decimals as usize);

    let (integer, decimal) = match formatted.split_once('.') {
        Some((integer, decimal)) => (integer, Some(decimal)),
        None => (formatted.as_str(), None),
    };

    let with_commas = add_commas(integer);

    match decimal.map(|d| d.trim_end_matches('0')) {
        Some(trimmed) if !trimmed.is_empty() => format!("{}.{}", with_commas, trimmed),
        _ => with_commas,
    }
}

/// Total volume in a summary line, e.g. `1,234.50`
///
/// # Example
/// ```
/// use cambio_sdk::format_volume;
/// assert_eq!(format_volume(1234.5), "1,234.50");
/// ```
pub fn format_volume(value: f64) -> String {
    let formatted = format_amount(value);
    match formatted.split_once('.') {
        Some((integer, decimal)) => format!("{}.{}", add_commas(integer), decimal),
        None => add_commas(&formatted),
    }
}

/// Add commas to an integer string, keeping a leading sign in place
fn add_commas(s: &str) -> String {
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", s),
    };

    let chars: Vec<char> = digits.chars().collect();
    let len = chars.len();
    let mut result = String::from(sign);

    for (i, c) in chars.iter().enumerate() {
        result.push(*c);
        let pos = len - i - 1;
        if pos > 0 && pos % 3 == 0 {
            result.push(',');
        }
    }

    result
}
