use calmform::form::{ErrorPaths, FieldMap, FieldRecord, FieldWriteError};
use serde_json::json;

#[derive(calmform::form::FormFields)]
struct AccountForm {
    #[form(error_path = "user.mail")]
    email: String,
    age: Option<u32>,
}

#[derive(calmform::form::FormFields)]
#[form(extends = AccountForm)]
struct SignupForm {
    email: String,
    #[form(error_path = "invite.code")]
    invite: String,
    #[form(skip)]
    #[allow(dead_code)]
    attempts: usize,
    #[form(extra)]
    rest: FieldMap,
}

fn main() {
    let mut account = AccountForm {
        email: "a@calm.form".to_string(),
        age: None,
    };
    account
        .write_field("age", json!(41))
        .expect("age accepts numbers");
    assert_eq!(account.read_field("age"), Some(json!(41)));
    assert_eq!(account.age, Some(41));
    assert_eq!(
        account.write_field("missing", json!(true)),
        Err(FieldWriteError::Unknown)
    );
    assert!(matches!(
        account.write_field("email", json!(7)),
        Err(FieldWriteError::Type(_))
    ));

    let mut signup = SignupForm {
        email: String::new(),
        invite: String::new(),
        attempts: 0,
        rest: FieldMap::new(),
    };
    signup
        .write_field("referrer", json!("newsletter"))
        .expect("extra map takes unknown fields");
    assert_eq!(signup.read_field("referrer"), Some(json!("newsletter")));
    assert_eq!(signup.read_field("attempts"), None);
    assert_eq!(signup.rest.len(), 1);
    assert_eq!(signup.read_field("email"), Some(json!("")));

    let paths = SignupForm::declared_error_paths();
    assert_eq!(paths.translate("user.mail"), "email");
    assert_eq!(paths.translate("invite.code"), "invite");
}
