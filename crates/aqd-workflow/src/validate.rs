use aqd_core::{Result, ServiceError};
use rust_decimal::Decimal;

pub(crate) fn required_text(value: Option<&str>, field: &str, missing: &mut Vec<String>) -> String {
    match value.map(str::trim) {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => {
            missing.push(field.to_string());
            String::new()
        }
    }
}

pub(crate) fn ensure_no_missing(missing: &[String]) -> Result<()> {
    if missing.is_empty() {
        return Ok(());
    }
    Err(ServiceError::validation(format!(
        "missing required fields: {}",
        missing.join(", ")
    )))
}

pub(crate) fn positive_amount(amount: Decimal, field: &str) -> Result<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(ServiceError::validation(format!("{field} must be positive")));
    }
    Ok(amount.round_dp(4))
}

pub(crate) fn normalize_currency(value: &str) -> Result<String> {
    let normalized = value.trim().to_ascii_uppercase();
    if normalized.len() != 3 || !normalized.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ServiceError::validation("currency must be a 3-letter code"));
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_is_uppercased() {
        assert_eq!(normalize_currency(" sar ").unwrap(), "SAR");
        assert!(normalize_currency("riyal").is_err());
        assert!(normalize_currency("S1R").is_err());
    }

    #[test]
    fn blank_text_counts_as_missing() {
        let mut missing = Vec::new();
        required_text(Some("   "), "title", &mut missing);
        required_text(None, "service_ref", &mut missing);
        let value = required_text(Some(" SRV-1 "), "other", &mut missing);

        assert_eq!(value, "SRV-1");
        let err = ensure_no_missing(&missing).unwrap_err();
        assert_eq!(
            err.to_string(),
            "validation failed: missing required fields: title, service_ref"
        );
    }
}
