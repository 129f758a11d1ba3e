/// Positive infinity saturates to the largest representable integer.
pub const INFINITY: i64 = i64::MAX;

/// Environment-dependent constants addressable with `~N` literals.
/// Unmapped keys default to the infinity sentinel.
pub fn process_special(code: i64) -> i64 {
    match code {
        0 => 0, // the void
        1 => -1,
        2 => 1_000_000_000_000_000_000,
        3 => std::process::id() as i64,
        7 => i64::MAX,
        8 => INFINITY,
        _ => INFINITY,
    }
}
