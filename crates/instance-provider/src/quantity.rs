//! Kubernetes resource quantity parsing (`120Gi`, `100G`, `1Ti`, ...)

/// Parse a quantity string into bytes
///
/// Fractional values are truncated. Returns `None` for malformed input.
pub fn parse_bytes(quantity: &str) -> Option<u128> {
    let quantity = quantity.trim();
    let split = quantity
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(quantity.len());
    let (number, suffix) = quantity.split_at(split);
    if number.is_empty() {
        return None;
    }

    let multiplier: u128 = match suffix {
        "" => 1,
        "Ki" => 1 << 10,
        "Mi" => 1 << 20,
        "Gi" => 1 << 30,
        "Ti" => 1 << 40,
        "Pi" => 1 << 50,
        "Ei" => 1 << 60,
        "k" => 1_000,
        "M" => 1_000_000,
        "G" => 1_000_000_000,
        "T" => 1_000_000_000_000,
        "P" => 1_000_000_000_000_000,
        "E" => 1_000_000_000_000_000_000,
        _ => return None,
    };

    match number.split_once('.') {
        None => number.parse::<u128>().ok()?.checked_mul(multiplier),
        Some((whole, frac)) => {
            let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
            if frac.contains('.') {
                return None;
            }
            let scale = 10u128.checked_pow(u32::try_from(frac.len()).ok()?)?;
            let frac: u128 = if frac.is_empty() { 0 } else { frac.parse().ok()? };
            let whole_bytes = whole.checked_mul(multiplier)?;
            whole_bytes.checked_add(frac.checked_mul(multiplier)? / scale)
        }
    }
}

/// Parse a quantity into whole GiB, rounding down
pub fn parse_gib(quantity: &str) -> Option<u128> {
    parse_bytes(quantity).map(|bytes| bytes >> 30)
}
