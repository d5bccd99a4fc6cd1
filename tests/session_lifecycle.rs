use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use calmform::prelude::*;
use futures::FutureExt;
use futures::executor::block_on;
use futures::future::FutureObj;
use futures::task::{Spawn, SpawnError};
use rust_decimal::Decimal;
use serde_json::json;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Clone, Debug, Default, FormFields)]
struct CheckoutForm {
    #[form(error_path = "customer.email_address")]
    email: String,
    quantity: u32,
    discount: Option<Decimal>,
    #[form(skip)]
    submitted: Arc<Mutex<Vec<CheckoutForm>>>,
}

impl FormModel for CheckoutForm {
    fn submit(&mut self) -> SubmitFuture {
        let order = self.clone();
        let submitted = self.submitted.clone();
        async move {
            let mut errors = Vec::new();
            if !order.email.contains('@') {
                errors.push(
                    FormError::field("customer.email_address").with_code("invalid_email"),
                );
            }
            if order.quantity == 0 {
                errors.push(FormError::field("quantity").with_code("required"));
            }
            if !errors.is_empty() {
                return Some(SubmitResult::invalid(errors));
            }
            submitted.lock().expect("submitted orders").push(order);
            Some(SubmitResult::ok_with(json!({ "order": "A-1" })))
        }
        .boxed()
    }

    fn reset(&mut self) {
        self.email.clear();
        self.quantity = 0;
        self.discount = None;
    }

    fn data_source(&self) -> DataSource<'_> {
        DataSource::Plain(self)
    }

    fn data_source_mut(&mut self) -> DataSourceMut<'_> {
        DataSourceMut::Plain(self)
    }

    fn error_paths(&self) -> ErrorPathMap {
        Self::declared_error_paths()
    }
}

#[derive(Clone, Default)]
struct ManualSpawner {
    queue: Arc<Mutex<Vec<FutureObj<'static, ()>>>>,
}

impl ManualSpawner {
    fn drain(&self) -> usize {
        let futures = std::mem::take(&mut *self.queue.lock().expect("spawn queue"));
        let count = futures.len();
        for future in futures {
            block_on(future);
        }
        count
    }
}

impl Spawn for ManualSpawner {
    fn spawn_obj(&self, future: FutureObj<'static, ()>) -> Result<(), SpawnError> {
        self.queue.lock().expect("spawn queue").push(future);
        Ok(())
    }
}

#[test]
fn checkout_round_trip_reports_translated_errors_then_succeeds() {
    init_tracing();
    let submitted = Arc::new(Mutex::new(Vec::new()));
    let form = CheckoutForm {
        submitted: submitted.clone(),
        ..CheckoutForm::default()
    };
    let after_calls = Arc::new(AtomicUsize::new(0));
    let session = {
        let after_calls = after_calls.clone();
        FormSession::builder(form)
            .options(FormOptions {
                reset_on_success: true,
                ..FormOptions::default()
            })
            .after_submit(move |_result: &SubmitResult, _model: &CheckoutForm| {
                after_calls.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .expect("build session")
    };

    session
        .field("email")
        .expect("email field")
        .on_change
        .commit(json!("not-an-email"))
        .expect("write email");
    let result = block_on(session.submit(SubmitOptions::if_modified()))
        .expect("submit")
        .expect("model result");
    assert!(result.is_invalid());

    let email = session.field("email").expect("email field");
    assert!(email.is_invalid());
    assert_eq!(email.errors[0].code.as_deref(), Some("invalid_email"));
    assert!(session.is_invalid("quantity").expect("quantity validity"));
    assert!(session.modified().expect("modified"));

    let mut fix = FieldMap::new();
    fix.insert("email".into(), json!("buyer@example.com"));
    fix.insert("quantity".into(), json!(3));
    session.set_data(fix).expect("fix fields");

    let result = block_on(session.submit(SubmitOptions::if_modified()))
        .expect("submit")
        .expect("model result");
    assert!(result.is_success());
    assert!(!session.invalid().expect("invalid"));
    assert!(!session.modified().expect("modified"));
    assert_eq!(after_calls.load(Ordering::SeqCst), 2);

    let orders = submitted.lock().expect("submitted orders");
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].quantity, 3);
    drop(orders);
    assert_eq!(
        session.with_model(|model| model.email.clone()).expect("model"),
        ""
    );
}

#[test]
fn auto_submit_runs_on_commit_through_spawner() {
    init_tracing();
    let submitted = Arc::new(Mutex::new(Vec::new()));
    let spawner = ManualSpawner::default();
    let session = FormSession::builder(CheckoutForm {
        submitted: submitted.clone(),
        ..CheckoutForm::default()
    })
    .options(FormOptions {
        auto_submit: true,
        ..FormOptions::default()
    })
    .initial_data(FieldMap::from_iter([
        ("email".to_owned(), json!("buyer@example.com")),
        ("quantity".to_owned(), json!(1)),
    ]))
    .spawner(spawner.clone())
    .build()
    .expect("build session");

    let discount = session.on_change_for("discount").expect("discount callback");
    let transform = calmform::form::decimal_text();
    discount
        .partial_with(&transform, "2.5".to_owned())
        .expect("type discount");
    assert_eq!(spawner.drain(), 0);

    discount
        .commit_with(&transform, "2.50".to_owned())
        .expect("commit discount");
    assert_eq!(spawner.drain(), 1);

    let orders = submitted.lock().expect("submitted orders");
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].discount, Some(Decimal::new(250, 2)));
    drop(orders);
    assert!(!session.modified().expect("modified"));
}

#[test]
fn dropped_session_disables_cached_callbacks() {
    init_tracing();
    let session = FormSession::new(CheckoutForm::default(), FormOptions::default())
        .expect("build session");
    let on_change = session.on_change_for("quantity").expect("callback");
    drop(session);

    assert_eq!(on_change.commit(json!(2)), Err(SessionError::Disposed));
}
