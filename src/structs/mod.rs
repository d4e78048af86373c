pub mod models;
pub mod request;
pub mod respond;
pub mod types;
