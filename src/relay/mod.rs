//! Request-to-message pipeline: payload lookup, templating and error reports

pub mod json;
pub mod lookup;
pub mod report;
pub mod template;

pub use lookup::{JsonSource, NoValues, QuerySource, ValueSource};
pub use report::{error_report, Failure, Payload};
pub use template::{render, MissingVariables};

impl From<MissingVariables> for Failure {
    fn from(missing: MissingVariables) -> Self {
        Failure::MissingVariables {
            names: missing.names,
            partial: missing.partial,
        }
    }
}
