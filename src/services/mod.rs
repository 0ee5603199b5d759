pub mod local_store;
pub mod provider;
pub mod sync_service;
