pub mod catalog;
pub mod delivery;
pub mod ingest;
pub mod password;
pub mod photo_store;
pub mod placeholder;
pub mod seed;
pub mod upload_client;
pub mod upload_dispatcher;
pub mod upload_validator;
