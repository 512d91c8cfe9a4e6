pub mod validator;

pub use validator::{SqlValidator, ValidationResult};
