//! Kubernetes-style resource quantities.
//!
//! CPU: `"500m"` (millicores) or a plain/decimal core count (`"2"`, `"1.5"`).
//! Memory: bytes with an optional decimal (`k`, `M`, `G`, `T`) or binary
//! (`Ki`, `Mi`, `Gi`, `Ti`) suffix.

use crate::error::{ConfigError, ConfigResult};

/// Parse a CPU quantity into millicores.
pub fn parse_cpu(s: &str) -> ConfigResult<u64> {
    let s = s.trim();
    if let Some(millis) = s.strip_suffix('m') {
        return millis
            .parse::<u64>()
            .map_err(|_| ConfigError::Quantity(s.to_string()));
    }
    let cores: f64 = s.parse().map_err(|_| ConfigError::Quantity(s.to_string()))?;
    if !cores.is_finite() || cores < 0.0 {
        return Err(ConfigError::Quantity(s.to_string()));
    }
    Ok((cores * 1000.0).round() as u64)
}

/// Parse a memory quantity into bytes.
pub fn parse_memory(s: &str) -> ConfigResult<u64> {
    const SUFFIXES: [(&str, u64); 8] = [
        ("Ki", 1 << 10),
        ("Mi", 1 << 20),
        ("Gi", 1 << 30),
        ("Ti", 1 << 40),
        ("k", 1_000),
        ("M", 1_000_000),
        ("G", 1_000_000_000),
        ("T", 1_000_000_000_000),
    ];

    let s = s.trim();
    let (number, multiplier) = SUFFIXES
        .iter()
        .find_map(|(suffix, mult)| s.strip_suffix(suffix).map(|n| (n, *mult)))
        .unwrap_or((s, 1));

    let value: f64 = number
        .parse()
        .map_err(|_| ConfigError::Quantity(s.to_string()))?;
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::Quantity(s.to_string()));
    }
    Ok((value * multiplier as f64).round() as u64)
}
