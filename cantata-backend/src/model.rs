pub mod analysis;
pub mod composite;
pub mod file;
pub mod schema;
pub mod study;
pub mod upload;
