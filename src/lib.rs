extern crate self as calmform;

pub mod form;
pub mod prelude;

pub use crate::form::{
    FieldChangeCallback, FieldHandle, FormError, FormModel, FormOptions, FormSession,
    SessionError, SessionResult, SubmitOptions, SubmitResult,
};

#[doc(hidden)]
pub mod __private {
    pub use serde_json;
}
