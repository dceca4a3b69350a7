//! Storage adapters behind the domain's capability ports.

pub mod sqlite;
