use chrono::NaiveDate;

pub const MISSING_DATE: &str = "N/A";
pub const INVALID_DATE: &str = "Fecha inválida";

/// Formats cents as `1.234,56`: dot for thousands, comma for decimals.
pub fn format_amount(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    let units = (abs / 100).to_string();
    let decimals = abs % 100;

    let mut grouped = String::with_capacity(units.len() + units.len() / 3);
    for (i, ch) in units.chars().enumerate() {
        if i > 0 && (units.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    format!("{}{},{:02}", sign, grouped, decimals)
}

/// `YYYY-MM-DD` to `DD/MM/YYYY`. Never fails: empty input gives `N/A`,
/// anything unparseable gives `Fecha inválida`.
pub fn format_date(date: &str) -> String {
    let date = date.trim();
    if date.is_empty() {
        return MISSING_DATE.to_string();
    }

    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map(|d| d.format("%d/%m/%Y").to_string())
        .unwrap_or_else(|_| INVALID_DATE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(0), "0,00");
        assert_eq!(format_amount(5), "0,05");
        assert_eq!(format_amount(50000), "500,00");
        assert_eq!(format_amount(123456), "1.234,56");
        assert_eq!(format_amount(123456789), "1.234.567,89");
        assert_eq!(format_amount(-150), "-1,50");
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date("2026-01-05"), "05/01/2026");
        assert_eq!(format_date(""), MISSING_DATE);
        assert_eq!(format_date("   "), MISSING_DATE);
        assert_eq!(format_date("2026-13-40"), INVALID_DATE);
        assert_eq!(format_date("mañana"), INVALID_DATE);
    }
}
