//! Block-size parsing for disk usage reports
//!
//! Sizes use decimal multipliers (1 KB = 1000 bytes), matching how storage
//! allocations are quoted to data providers.

/// Divisor used whenever the block size cannot be interpreted
pub const DEFAULT_BLOCK_DIVISOR: u64 = 1000;

/// Parse a block-size string such as `"1MB"` or `"500kb"` into a byte divisor.
///
/// Malformed input never fails: it falls back to 1 KB and logs a warning.
pub fn parse_block_size(block_size: &str) -> u64 {
    let s = block_size.trim();
    if s.len() < 3 || !s.is_char_boundary(s.len() - 2) {
        tracing::warn!(block_size, "block size too short, defaulting to 1KB");
        return DEFAULT_BLOCK_DIVISOR;
    }

    let (number, unit) = s.split_at(s.len() - 2);
    let base = match unit.to_ascii_uppercase().as_str() {
        "KB" => 1_000,
        "MB" => 1_000_000,
        "GB" => 1_000_000_000,
        "TB" => 1_000_000_000_000,
        _ => {
            tracing::warn!(block_size, "unrecognized block size unit, defaulting to 1KB");
            return DEFAULT_BLOCK_DIVISOR;
        }
    };

    match number.trim().parse::<u64>() {
        Ok(n) if n > 0 => n.saturating_mul(base),
        _ => {
            tracing::warn!(block_size, "invalid block size number, defaulting to 1KB");
            DEFAULT_BLOCK_DIVISOR
        }
    }
}
