pub mod executor;
pub mod guard;
pub mod schema;
pub mod seed;
