pub mod bytecode;
pub mod chains;
pub mod compiler;
pub mod content_address;
pub mod contract;
pub mod creation_data;
pub mod http_server;
pub mod logger;
pub mod matching;
pub mod repository;
pub mod rpc;
pub mod settings;
pub mod sources;
pub mod types;
pub mod verifier;


pub use http_server::run as run_http_server;
pub use settings::Settings;
pub use verifier::{VerificationRequest, Verifier};
