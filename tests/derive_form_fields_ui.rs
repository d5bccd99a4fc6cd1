#[test]
fn form_fields_derive_ui() {
    let testcases = trybuild::TestCases::new();
    testcases.pass("tests/ui/form_fields/pass.rs");
}
