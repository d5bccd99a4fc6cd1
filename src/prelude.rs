pub use crate::form::{
    ChangeCallback, DataSource, DataSourceMut, ErrorPathMap, ErrorPaths, FieldChangeCallback,
    FieldHandle, FieldMap, FieldRecord, FieldTransform, FieldWriteError, FormError, FormFields,
    FormModel, FormOptions, FormSession, ProxyModel, SessionError, SessionResult,
    SessionSnapshot, SubmitEvent, SubmitFailure, SubmitFuture, SubmitOptions, SubmitResult,
    invoke_field_change_callback,
};
