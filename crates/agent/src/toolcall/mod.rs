//! Tool-call hygiene applied before dispatch.

pub mod normalizer;
pub mod validator;

pub use normalizer::normalize;
pub use validator::filter_valid;
