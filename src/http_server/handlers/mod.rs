pub mod status;
pub mod verification;
