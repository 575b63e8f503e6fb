//! Building blocks for the `cache_import` command line interface.
pub mod gcp;
pub mod import;
pub mod object_store;
pub mod socket_addr;
pub mod tokio;
