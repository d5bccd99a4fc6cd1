use serde_json::Value;
use tracing::debug;

use super::model::{DataSource, DataSourceMut, FieldMap, FieldWriteError, FormModel};
use super::session::{SessionError, SessionResult};

pub fn get_field_value<M>(model: &M, field: &str) -> Option<Value>
where
    M: FormModel + ?Sized,
{
    match model.data_source() {
        DataSource::Proxy(proxy) => proxy.get_value(field),
        DataSource::Plain(record) => record.read_field(field),
    }
}

/// Writes `data` into the model. Proxy models receive it as a single
/// `assign`; plain models get a shallow, field-by-field merge.
pub fn set_field_data<M>(model: &mut M, data: FieldMap) -> SessionResult<()>
where
    M: FormModel + ?Sized,
{
    match model.data_source_mut() {
        DataSourceMut::Proxy(proxy) => {
            proxy.assign(data);
            Ok(())
        }
        DataSourceMut::Plain(record) => {
            for (field, value) in data {
                match record.write_field(&field, value) {
                    Ok(()) => {}
                    Err(FieldWriteError::Unknown) => {
                        debug!(field = %field, "plain model has no slot for field, write dropped");
                    }
                    Err(FieldWriteError::Type(message)) => {
                        return Err(SessionError::FieldType { field, message });
                    }
                }
            }
            Ok(())
        }
    }
}
