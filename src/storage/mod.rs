pub mod keyspace;
pub mod types;
