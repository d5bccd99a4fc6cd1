mod callback;
mod data_source;
mod errors;
mod field;
mod model;
mod session;
mod submit;


pub use calmform_derive::FormFields;
pub use callback::{ChangeCallback, FieldChangeCallback, invoke_field_change_callback};
pub use data_source::{get_field_value, set_field_data};
pub use errors::{ErrorPathMap, ErrorStore, translate_error_paths};
pub use field::{FieldHandle, FieldTransform, decimal_text};
pub use model::{
    DataSource, DataSourceMut, ErrorPaths, FieldMap, FieldRecord, FieldWriteError, FormError,
    FormModel, ProxyModel, SubmitFailure, SubmitFuture, SubmitResult,
};
pub use session::{
    FormOptions, FormSession, FormSessionBuilder, SessionError, SessionId, SessionResult,
    SessionSnapshot, SubmitState, Subscription,
};
pub use submit::{SubmitEvent, SubmitOptions};
