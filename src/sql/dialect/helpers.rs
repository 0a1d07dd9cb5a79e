//! Shared helper functions for SQL dialect implementations.

/// Emit `LIMIT n OFFSET m`.
/// Used by: Postgres, MySQL
pub fn emit_limit_offset_standard(limit: u64, offset: u64) -> String {
    format!("LIMIT {} OFFSET {}", limit, offset)
}
