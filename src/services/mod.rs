pub mod batch;
pub mod converter;
pub mod db_loader;
pub mod encoding;
pub mod header;
pub mod index_advisor;
pub mod type_inference;
