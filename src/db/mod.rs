pub mod bootstrap;
pub mod executor;

pub use executor::{QueryExecutionError, QueryExecutor, ResultSet};
