//! SQL handling for relational backends.
//!
//! - [`dialect`] - PostgreSQL and MySQL dialect differences
//! - [`paginate`] - executor-applied LIMIT/OFFSET and count wrapping
//! - [`validate`] - structural checks on generated SQL via `sqlparser`

pub mod dialect;
pub mod paginate;
pub mod validate;

pub use dialect::{Dialect, SqlDialect};
pub use paginate::{count_query, paginate, query_body};
pub use validate::validate_query;
