fn format_number(num: f64, precision: usize) -> String {
    let formatted = format!("{num:.precision$}");

    let parts: Vec<&str> = formatted.split('.').collect();
    let int_part = parts[0];

    let mut result = String::new();

    let (num_str, is_negative) = if let Some(int_part) = int_part.strip_prefix('-') {
        (int_part, true)
    } else {
        (int_part, false)
    };

    for (count, digit) in num_str.chars().rev().enumerate() {
        if count != 0 && count % 3 == 0 {
            result.insert(0, ',');
        }
        result.insert(0, digit);
    }

    if is_negative {
        result.insert(0, '-');
    }

    if parts.len() > 1 {
        result.push('.');
        result.push_str(parts[1]);
    }

    format!("${result}")
}

/// Formats a USD amount with thousands separators and a precision that
/// scales with magnitude, so both market caps and sub-cent token prices stay
/// readable.
pub fn format_usd_amount(amount: f64) -> String {
    format_number(
        amount,
        (3 - amount.log10().clamp(-20.0, 3.0) as isize) as usize,
    )
}

/// Signed percent change, two decimals, explicit `+` on gains.
pub fn format_percent_change(change: f64) -> String {
    if change >= 0.0 {
        format!("+{change:.2}%")
    } else {
        format!("{change:.2}%")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usd_amounts_scale_precision_with_magnitude() {
        assert_eq!(format_usd_amount(1_234_567.0), "$1,234,567");
        assert_eq!(format_usd_amount(1234.56), "$1,235");
        assert_eq!(format_usd_amount(5.0), "$5.000");
        assert_eq!(format_usd_amount(0.012345), "$0.0123");
    }

    #[test]
    fn percent_change_keeps_its_sign() {
        assert_eq!(format_percent_change(2.349), "+2.35%");
        assert_eq!(format_percent_change(-2.349), "-2.35%");
        assert_eq!(format_percent_change(0.0), "+0.00%");
    }
}
