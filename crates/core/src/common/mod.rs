pub mod time;

use rust_decimal::{Decimal, RoundingStrategy};

/// # Summary
/// 将金额格式化为带千分位的美元字符串，保留两位小数，例如 `$1,234.50`。
///
/// # Logic
/// 1. 按银行家舍入以外的常规四舍五入保留 2 位小数。
/// 2. 整数部分每三位插入逗号。
///
/// # Arguments
/// * `amount`: 待格式化金额。
///
/// # Returns
/// 格式化后的字符串，负数带前导 `-`。
pub fn format_usd(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let text = format!("{:.2}", rounded.abs());
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{}${}.{}", if negative { "-" } else { "" }, grouped, frac_part)
}

/// 规范化邮箱：去除首尾空白并转为小写
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// # Summary
/// 粗粒度的邮箱格式校验。
///
/// # Logic
/// 要求恰好一个 `@`，本地部分非空，域名部分包含 `.` 且不以 `.` 开头或结尾，且不含空白。
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_format_usd() {
        assert_eq!(format_usd(dec!(0)), "$0.00");
        assert_eq!(format_usd(dec!(999.5)), "$999.50");
        assert_eq!(format_usd(dec!(1000)), "$1,000.00");
        assert_eq!(format_usd(dec!(1234567.891)), "$1,234,567.89");
        assert_eq!(format_usd(dec!(1000000000)), "$1,000,000,000.00");
        assert_eq!(format_usd(dec!(-2500.25)), "-$2,500.25");
    }

    #[test]
    fn test_email_rules() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
        assert!(is_valid_email("alice@example.com"));
        assert!(!is_valid_email("alice.example.com"));
        assert!(!is_valid_email("alice@@example.com"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("alice@example"));
        assert!(!is_valid_email("alice@.com"));
        assert!(!is_valid_email("al ice@example.com"));
    }
}
