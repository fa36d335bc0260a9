#[test]
fn form_values_derive_ui() {
    let testcases = trybuild::TestCases::new();
    testcases.pass("tests/ui/form_values/pass.rs");
    testcases.compile_fail("tests/ui/form_values/fail_generic.rs");
    testcases.compile_fail("tests/ui/form_values/fail_tuple.rs");
    testcases.compile_fail("tests/ui/form_values/fail_enum.rs");
    testcases.compile_fail("tests/ui/form_values/fail_bad_attr.rs");
}
