//! Output verification for FloatSmith runs.
//!
//! - [`status`]: the one-line `status:  pass|fail|error` contract that every
//!   verify script honours
//! - [`floats`]: tolerance-based comparison of the floating-point numbers in
//!   two program outputs

pub mod floats;
pub mod status;

pub use floats::{
    CompareOptions, Comparison, ErrorKind, Mismatch, Mode, compare_files, compare_text,
    extract_floats,
};
pub use status::{STATUS_PREFIX, VerifyStatus};
