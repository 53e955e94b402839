/// Strings the upstream dump uses to mean "no value".
const NULL_SENTINELS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// True when a raw field should be treated as missing.
pub fn is_null(raw: &str) -> bool {
    NULL_SENTINELS.contains(&raw)
}

/// The field as written, or `None` if it is a null sentinel.
pub fn non_null(raw: &str) -> Option<&str> {
    if is_null(raw) {
        None
    } else {
        Some(raw)
    }
}

/// Trimmed, non-empty text, or `None`.
pub fn clean_text(raw: &str) -> Option<String> {
    let trimmed = non_null(raw)?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Lenient numeric coercion: anything that is not a finite number becomes `None`.
pub fn parse_numeric(raw: &str) -> Option<f64> {
    let v: f64 = non_null(raw)?.trim().parse().ok()?;
    v.is_finite().then_some(v)
}
