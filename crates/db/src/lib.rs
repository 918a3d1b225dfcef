pub use diesel;
pub mod schema;

pub use diesel::sqlite;
