use colored::{ColoredString, Colorize};

/// Dollar amount with thousands separators: $1,234.56
pub fn money(val: f64) -> String {
    let cents = format!("{:.2}", val.abs());
    let (whole, frac) = cents.split_once('.').unwrap_or((cents.as_str(), "00"));

    let digits: Vec<char> = whole.chars().collect();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*c);
    }

    // -0.001 formats as 0.00 and should not carry a sign.
    let sign = if val < 0.0 && cents != "0.00" { "-" } else { "" };
    format!("{sign}${grouped}.{frac}")
}

/// Blank for a missing amount column.
pub fn maybe_money(val: Option<f64>) -> String {
    val.map(money).unwrap_or_default()
}

/// Green for money in, red for money out.
pub fn signed_money(val: f64) -> ColoredString {
    if val < 0.0 {
        money(val).red()
    } else {
        money(val).green()
    }
}
