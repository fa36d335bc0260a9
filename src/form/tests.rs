use super::validators::{match_control, required};
use super::*;
use futures::FutureExt;
use futures::channel::oneshot;
use futures::executor::block_on;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::{Config, ControlConfig};
use crate::value::ModelValue;

fn new_form(options: FormOptions) -> (Engine, Form) {
    let engine = Engine::new();
    let form = engine
        .form(Some("profile"), options)
        .expect("form should be created");
    (engine, form)
}

fn text(value: &str) -> ModelValue {
    ModelValue::from(value)
}

fn policy(source: &str) -> FormOptions {
    FormOptions::default().show_errors_on(source.parse().expect("policy should parse"))
}

/// An async validator whose runs resolve through the queued channels, oldest first.
/// Runs started after the queue is empty pass immediately.
fn gated_validator() -> (AsyncValidator, Arc<Mutex<VecDeque<oneshot::Receiver<bool>>>>) {
    let gates: Arc<Mutex<VecDeque<oneshot::Receiver<bool>>>> =
        Arc::new(Mutex::new(VecDeque::new()));
    let queue = gates.clone();
    let validator = AsyncValidator::new(move |_, _| {
        let gate = queue.lock().expect("gate queue lock").pop_front();
        async move {
            match gate {
                Some(gate) => gate.await.unwrap_or(false),
                None => true,
            }
        }
        .boxed()
    });
    (validator, gates)
}

fn never_resolves() -> AsyncValidator {
    AsyncValidator::new(|_, _| futures::future::pending::<bool>().boxed())
}

#[derive(Default)]
struct RecordingBinding {
    value: Mutex<Option<ModelValue>>,
}

impl ModelBinding for RecordingBinding {
    fn name(&self) -> String {
        "nickname".into()
    }

    fn model_value(&self) -> Option<ModelValue> {
        self.value.lock().expect("binding lock").clone()
    }

    fn set_model_value(&self, value: ModelValue) {
        *self.value.lock().expect("binding lock") = Some(value);
    }
}

#[derive(Default)]
struct RecordingNativeForm {
    submitted: AtomicUsize,
    pristine: AtomicUsize,
}

impl NativeForm for RecordingNativeForm {
    fn set_submitted(&self, submitted: bool) {
        if submitted {
            self.submitted.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn set_pristine(&self) {
        self.pristine.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn identical_error_tuples_are_stored_once() {
    let (_engine, form) = new_form(FormOptions::default());
    let email = form.register_control("email").expect("register email");
    let config: Config = ControlConfig::new()
        .error("required", "Email is required")
        .into();

    email.configure(config.clone()).expect("first configure");
    email.configure(config).expect("second configure");
    email
        .configure(ControlConfig::new().error("email", "Not an email").into())
        .expect("third configure");

    assert_eq!(
        email.get_error_messages().expect("error messages"),
        vec![
            ("required".to_owned(), "Email is required".to_owned()),
            ("email".to_owned(), "Not an email".to_owned()),
        ]
    );
}

#[test]
fn removing_a_validator_forces_its_key_valid() {
    let (_engine, form) = new_form(FormOptions::default());
    let email = form.register_control("email").expect("register email");

    email
        .configure(ControlConfig::new().validator("required", required()).into())
        .expect("install required");
    assert!(!email.is_valid().expect("validity"));
    assert_eq!(
        email.validity("required").expect("validity"),
        Some(Validity::Invalid)
    );

    email
        .configure(ControlConfig::new().remove_validator("required").into())
        .expect("remove required");
    assert!(email.is_valid().expect("validity"));
    assert_eq!(email.validity("required").expect("validity"), None);
    assert!(!email.has_validator("required").expect("validator lookup"));
}

#[test]
fn same_validator_reference_is_not_reinstalled() {
    let (_engine, form) = new_form(FormOptions::default());
    let email = form.register_control("email").expect("register email");
    let runs = Arc::new(AtomicUsize::new(0));
    let counted = {
        let runs = runs.clone();
        Validator::new(move |_, _| {
            runs.fetch_add(1, Ordering::SeqCst);
            true
        })
    };

    email
        .configure(ControlConfig::new().validator("counted", counted.clone()).into())
        .expect("install validator");
    email
        .configure(ControlConfig::new().validator("counted", counted).into())
        .expect("install again");

    // One run per configure, never two validators under one key.
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    email
        .configure(ControlConfig::new().validator("counted", Validator::new(|_, _| false)).into())
        .expect("overwrite validator");
    assert_eq!(
        email.validity("counted").expect("validity"),
        Some(Validity::Invalid)
    );
}

#[test]
fn malformed_configuration_leaves_control_untouched() {
    let (_engine, form) = new_form(FormOptions::default());
    let email = form.register_control("email").expect("register email");

    let config = Config::map()
        .with("errors", Config::list([Config::list(["required".into(), "Required".into()])]))
        .with("parsers", Config::list(["trim".into()]));
    let error = email.configure(config).expect_err("parser must be a function");
    assert!(matches!(error, FormError::InvalidParserType("text")));
    assert!(email.get_error_messages().expect("messages").is_empty());
}

#[test]
fn errors_are_hidden_while_control_is_valid() {
    let (_engine, form) = new_form(policy("touched, submitted"));
    let email = form.register_control("email").expect("register email");
    email.touch().expect("touch");
    assert_eq!(email.get_errors().expect("errors"), None);

    let (_engine, form) = new_form(FormOptions::default());
    let name = form.register_control("name").expect("register name");
    assert_eq!(name.get_errors().expect("errors"), None);
}

#[test]
fn display_policy_requires_touched_or_submitted() {
    let (_engine, form) = new_form(policy("touched, submitted"));
    let email = form.register_control("email").expect("register email");
    let name = form.register_control("name").expect("register name");
    for control in [&email, &name] {
        control
            .configure(ControlConfig::new().validator("required", required()).into())
            .expect("install required");
    }

    assert_eq!(email.get_errors().expect("errors"), None);

    email.touch().expect("touch");
    let errors = email.get_errors().expect("errors").expect("touched shows errors");
    assert_eq!(errors.get("required"), Some(&true));
    assert_eq!(name.get_errors().expect("errors"), None);

    let calls = Arc::new(AtomicUsize::new(0));
    let handler_calls = calls.clone();
    let result = block_on(form.submit(move |_| {
        handler_calls.fetch_add(1, Ordering::SeqCst);
        async { Ok::<_, BoxError>(None) }
    }));
    assert!(matches!(result, Err(FormError::FormInvalid)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(form.is_submitted().expect("submitted flag"));
    assert!(name.get_errors().expect("errors").is_some());
}

#[test]
fn policy_is_inherited_by_nested_forms() {
    let (_engine, form) = new_form(policy("submitted"));
    let address = form
        .register_form(Some("address"), FormOptions::default())
        .expect("register address");
    let city = address.register_control("city").expect("register city");
    city.configure(ControlConfig::new().validator("required", required()).into())
        .expect("install required");
    city.touch().expect("touch");

    assert_eq!(city.get_errors().expect("errors"), None);
}

#[test]
fn required_email_shows_error_once_touched() {
    let (_engine, form) = new_form(policy("touched"));
    let email = form.register_control("email").expect("register email");
    email
        .configure(
            ControlConfig::new()
                .validator("required", required())
                .error("required", "Email is required")
                .into(),
        )
        .expect("configure email");
    email.set_view_value("").expect("set empty email");

    assert_eq!(email.get_errors().expect("errors"), None);
    email.touch().expect("touch");
    let errors = email.get_errors().expect("errors").expect("errors shown");
    assert_eq!(errors.get("required"), Some(&true));
}

#[test]
fn nested_model_values_round_trip() {
    let (engine, form) = new_form(FormOptions::default());
    form.register_control("a").expect("register a");
    let nested = form
        .register_form(Some("b"), FormOptions::default())
        .expect("register b");
    let c = nested.register_control("c").expect("register c");

    let values = ModelValue::map([
        ("a", ModelValue::from(1_i64)),
        ("b", ModelValue::map([("c", ModelValue::from(2_i64))])),
    ]);
    form.set_model_values(values.clone()).expect("set values");
    assert!(engine.queued_tasks().expect("queued tasks") > 0);
    assert_eq!(c.model_value().expect("model value"), None);

    engine.settle().expect("settle");
    assert_eq!(form.get_model_values().expect("get values"), values);
    assert_eq!(c.view_value().expect("view value"), ModelValue::from(2_i64));
}

#[test]
fn model_values_must_match_node_shape() {
    let (_engine, form) = new_form(FormOptions::default());
    let group = form.register_group("items").expect("register group");

    let error = form
        .set_model_values(ModelValue::list([]))
        .expect_err("forms take maps");
    assert!(matches!(
        error,
        FormError::InvalidModelValuesType {
            expected: "map",
            found: "list"
        }
    ));
    let error = group
        .set_model_values(ModelValue::map::<&str, _>([]))
        .expect_err("groups take lists");
    assert!(matches!(
        error,
        FormError::InvalidModelValuesType {
            expected: "list",
            found: "map"
        }
    ));
    form.set_model_values(ModelValue::Null)
        .expect("null is ignored");
}

#[test]
fn control_and_form_names_cannot_collide() {
    let (_engine, form) = new_form(FormOptions::default());
    form.register_form(Some("x"), FormOptions::default())
        .expect("register form x");
    let error = form.register_control("x").expect_err("control x collides");
    assert!(matches!(
        error,
        FormError::NameCollision {
            existing: NodeKind::Form,
            incoming: NodeKind::Control,
            ..
        }
    ));

    form.register_control("y").expect("register control y");
    let error = form
        .register_form(Some("y"), FormOptions::default())
        .expect_err("form y collides");
    assert!(matches!(
        error,
        FormError::NameCollision {
            existing: NodeKind::Control,
            incoming: NodeKind::Form,
            ..
        }
    ));

    let error = form.register_group("x").expect_err("group x collides");
    assert!(matches!(
        error,
        FormError::NameCollision {
            existing: NodeKind::Form,
            incoming: NodeKind::FormGroup,
            ..
        }
    ));

    // Radio-style controls share one model key.
    form.register_control("y").expect("second control y");
}

#[test]
fn generated_form_names_respect_existing_members() {
    let (_engine, form) = new_form(FormOptions::default());
    form.register_control("Form-0").expect("register control");

    let error = form
        .register_form(None, FormOptions::default())
        .expect_err("generated name collides");
    assert!(matches!(
        error,
        FormError::NameCollision {
            existing: NodeKind::Control,
            incoming: NodeKind::Form,
            ..
        }
    ));

    let next = form
        .register_form(None, FormOptions::default())
        .expect("next generated name is free");
    assert_eq!(next.name().expect("name"), "Form-1");
}

#[test]
fn unsupported_registry_operations_fail_by_kind() {
    let (_engine, form) = new_form(FormOptions::default());
    let email = form.register_control("email").expect("register email");
    let group = form.register_group("items").expect("register group");

    let error = email.register_control("nested").expect_err("controls hold no children");
    assert!(matches!(
        error,
        FormError::Unsupported {
            operation: "register_control",
            kind: NodeKind::Control,
        }
    ));
    let error = group.register_control("nested").expect_err("groups hold forms only");
    assert!(matches!(
        error,
        FormError::Unsupported {
            operation: "register_control",
            kind: NodeKind::FormGroup,
        }
    ));
}

#[test]
fn ids_and_generated_names_are_engine_scoped() {
    let (_engine, form) = new_form(FormOptions::default());
    let email = form.register_control("email").expect("register email");
    let name = form.register_control("name").expect("register name");
    let anonymous = form
        .register_form(None, FormOptions::default())
        .expect("register anonymous form");

    assert_eq!(email.get_control_id().expect("id"), "email-0");
    assert_eq!(name.get_control_id().expect("id"), "name-1");
    assert_eq!(anonymous.name().expect("name"), "Form-0");

    let (_other_engine, other) = new_form(FormOptions::default());
    let email = other.register_control("email").expect("register email");
    assert_eq!(email.get_control_id().expect("id"), "email-0");
}

#[test]
fn match_against_itself_passes_without_watching() {
    let (engine, form) = new_form(FormOptions::default());
    let password = form.register_control("password").expect("register password");

    password
        .configure(
            ControlConfig::new()
                .configurable("match", match_control("password"))
                .into(),
        )
        .expect("configure match");
    engine.settle().expect("settle");

    assert!(password.is_valid().expect("validity"));
    assert_eq!(
        password.validity("match").expect("validity"),
        Some(Validity::Valid)
    );
    assert!(!password.has_validator("match:password").expect("lookup"));
}

#[test]
fn match_fails_when_independent_control_is_missing() {
    let (engine, form) = new_form(FormOptions::default());
    let confirm = form.register_control("confirm").expect("register confirm");
    confirm
        .configure(
            ControlConfig::new()
                .configurable("match", match_control("password"))
                .into(),
        )
        .expect("configure match");
    engine.settle().expect("settle");

    assert_eq!(
        confirm.validity("match").expect("validity"),
        Some(Validity::Invalid)
    );
}

#[test]
fn match_compares_view_values_on_settle() {
    let (engine, form) = new_form(FormOptions::default());
    let password = form.register_control("password").expect("register password");
    let confirm = form.register_control("confirm").expect("register confirm");
    confirm
        .configure(
            ControlConfig::new()
                .configurable("match", match_control("password"))
                .into(),
        )
        .expect("configure match");
    assert!(password.has_validator("match:confirm").expect("watcher lookup"));

    password.set_view_value("secret").expect("set password");
    confirm.set_view_value("other").expect("set confirm");
    assert_eq!(
        confirm.validity("match").expect("validity"),
        Some(Validity::Valid)
    );
    engine.settle().expect("settle");
    assert_eq!(
        confirm.validity("match").expect("validity"),
        Some(Validity::Invalid)
    );
    assert!(!form.is_valid().expect("form validity"));

    confirm.set_view_value("secret").expect("fix confirm");
    engine.settle().expect("settle");
    assert!(form.is_valid().expect("form validity"));

    password.set_view_value("changed").expect("change password");
    engine.settle().expect("settle");
    assert_eq!(
        confirm.validity("match").expect("validity"),
        Some(Validity::Invalid)
    );
}

#[test]
fn second_submit_is_rejected_while_first_runs() {
    let (_engine, form) = new_form(FormOptions::default());
    form.register_control("email").expect("register email");
    let calls = Arc::new(AtomicUsize::new(0));

    block_on(async {
        let (release, gate) = oneshot::channel::<()>();
        let first_calls = calls.clone();
        let mut first = Box::pin(form.submit(move |_| {
            first_calls.fetch_add(1, Ordering::SeqCst);
            async move {
                let _ = gate.await;
                Ok::<_, BoxError>(None)
            }
        }));
        assert!(futures::poll!(first.as_mut()).is_pending());
        assert!(form.is_submitting().expect("submitting"));

        let second_calls = calls.clone();
        let second = form
            .submit(move |_| {
                second_calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, BoxError>(None) }
            })
            .await;
        assert!(matches!(second, Err(FormError::SubmitInProgress)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        release.send(()).expect("release first submit");
        first.await.expect("first submit should succeed");
    });

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!form.is_submitting().expect("submitting"));
}

#[test]
fn nested_form_cannot_submit_inside_parent_cycle() {
    let (_engine, form) = new_form(FormOptions::default());
    let nested = form
        .register_form(Some("address"), FormOptions::default())
        .expect("register nested");
    let email = form.register_control("email").expect("register email");
    email
        .configure(ControlConfig::new().async_validator("unique", never_resolves()).into())
        .expect("install async validator");

    block_on(async {
        let mut outer = Box::pin(form.submit(|_| async { Ok::<_, BoxError>(None) }));
        assert!(futures::poll!(outer.as_mut()).is_pending());
        assert!(nested.is_disabled().expect("nested disabled"));
        let inner = nested.submit(|_| async { Ok::<_, BoxError>(None) }).await;
        assert!(matches!(inner, Err(FormError::SubmitInProgress)));
    });

    assert!(!nested.is_submitting().expect("nested submitting"));
}

#[test]
fn submit_waits_for_pending_async_validators() {
    let (_engine, form) = new_form(FormOptions::default());
    let email = form.register_control("email").expect("register email");
    let (unique, gates) = gated_validator();
    let (resolve, verdict) = oneshot::channel::<bool>();
    gates.lock().expect("gate queue lock").push_back(verdict);
    email
        .configure(ControlConfig::new().async_validator("unique", unique).into())
        .expect("install async validator");
    assert!(form.is_pending().expect("pending"));

    let begun = Arc::new(AtomicUsize::new(0));
    let ended = Arc::new(AtomicUsize::new(0));
    {
        let begun = begun.clone();
        let ended = ended.clone();
        form.on_submit_event(move |event| match event {
            SubmitEvent::Begun => {
                begun.fetch_add(1, Ordering::SeqCst);
            }
            SubmitEvent::Ended => {
                ended.fetch_add(1, Ordering::SeqCst);
            }
        })
        .expect("add listener");
    }

    let calls = Arc::new(AtomicUsize::new(0));
    block_on(async {
        let handler_calls = calls.clone();
        let mut submit = Box::pin(form.submit(move |_| {
            handler_calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, BoxError>(None) }
        }));
        assert!(futures::poll!(submit.as_mut()).is_pending());
        assert_eq!(
            form.submit_state().expect("submit state"),
            SubmitState::AwaitingValidators
        );
        assert!(form.is_disabled().expect("form disabled"));
        assert!(email.is_disabled().expect("control disabled"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        resolve.send(true).expect("resolve validator");
        submit.await.expect("submit should succeed");
    });

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(begun.load(Ordering::SeqCst), 1);
    assert_eq!(ended.load(Ordering::SeqCst), 1);
    assert!(!form.is_disabled().expect("form enabled"));
    assert!(email.is_valid().expect("email valid"));
}

#[test]
fn dropped_submit_restores_form() {
    let (_engine, form) = new_form(FormOptions::default());
    let email = form.register_control("email").expect("register email");
    email
        .configure(ControlConfig::new().async_validator("unique", never_resolves()).into())
        .expect("install async validator");

    block_on(async {
        let mut submit = Box::pin(form.submit(|_| async { Ok::<_, BoxError>(None) }));
        assert!(futures::poll!(submit.as_mut()).is_pending());
        assert!(form.is_disabled().expect("disabled during submit"));
        drop(submit);
    });

    assert!(!form.is_disabled().expect("enabled again"));
    assert!(!form.is_submitting().expect("submitting"));
    assert_eq!(form.submit_state().expect("state"), SubmitState::Idle);
}

#[test]
fn submit_restores_previous_disabled_state() {
    let (_engine, form) = new_form(FormOptions::default());
    form.register_control("email").expect("register email");
    form.disable().expect("disable");

    block_on(form.submit(|_| async { Ok::<_, BoxError>(None) })).expect("submit");
    assert!(form.is_disabled().expect("still disabled"));
}

#[test]
fn submit_times_out_on_stalled_validators() {
    let (_engine, form) = new_form(
        FormOptions::default().validation_timeout(Duration::from_millis(20)),
    );
    let email = form.register_control("email").expect("register email");
    email
        .configure(ControlConfig::new().async_validator("unique", never_resolves()).into())
        .expect("install async validator");

    let result = block_on(form.submit(|_| async { Ok::<_, BoxError>(None) }));
    assert!(matches!(result, Err(FormError::ValidationTimeout(_))));
    assert!(!form.is_disabled().expect("enabled again"));
}

#[test]
fn handler_errors_become_custom_errors() {
    let (_engine, form) = new_form(FormOptions::default());
    let email = form.register_control("email").expect("register email");
    let address = form
        .register_form(Some("address"), FormOptions::default())
        .expect("register address");
    let city = address.register_control("city").expect("register city");

    block_on(form.submit(|_| async {
        Ok::<_, BoxError>(Some(ModelValue::map([
            ("email", text("Email is taken")),
            ("address", ModelValue::map([("city", text("Unknown city"))])),
        ])))
    }))
    .expect("submit");

    assert_eq!(
        email.get_custom_error_message().expect("custom message"),
        Some("Email is taken".to_owned())
    );
    assert_eq!(
        email.get_errors().expect("errors").and_then(|e| e.get(CUSTOM_ERROR_KEY).copied()),
        Some(true)
    );
    assert_eq!(
        city.get_custom_error_message().expect("custom message"),
        Some("Unknown city".to_owned())
    );

    block_on(form.submit(|_| async { Ok::<_, BoxError>(None) })).expect("custom errors cleared");
    assert!(email.is_valid().expect("valid"));
    assert_eq!(email.get_custom_error_message().expect("custom"), None);
}

#[test]
fn handler_failure_propagates() {
    let (_engine, form) = new_form(FormOptions::default());
    let result = block_on(form.submit(|_| async {
        Err::<Option<ModelValue>, BoxError>("backend unavailable".into())
    }));
    assert!(matches!(result, Err(FormError::Handler(_))));
    assert!(!form.is_submitting().expect("submitting"));
}

#[test]
fn custom_errors_reject_non_text_messages() {
    let (_engine, form) = new_form(FormOptions::default());
    let email = form.register_control("email").expect("register email");

    let error = email
        .apply_custom_errors(&ModelValue::from(true))
        .expect_err("message must be text");
    assert!(matches!(error, FormError::InvalidErrorMessageType("bool")));

    let error = form
        .apply_custom_errors(&text("oops"))
        .expect_err("form errors must be a map");
    assert!(matches!(
        error,
        FormError::InvalidCustomErrorsType {
            kind: NodeKind::Form,
            ..
        }
    ));

    email.clear_custom_error_message().expect("no-op clear");
    assert!(email.is_valid().expect("valid"));
}

#[test]
fn group_keeps_overflow_for_later_forms() {
    let (engine, form) = new_form(FormOptions::default());
    let group = form.register_group("addresses").expect("register group");
    let first = group
        .register_form(None, FormOptions::default())
        .expect("first address");
    first.register_control("city").expect("first city");

    group
        .set_model_values(ModelValue::list([
            ModelValue::map([("city", text("Oslo"))]),
            ModelValue::map([("city", text("Rome"))]),
        ]))
        .expect("set group values");
    assert_eq!(group.overflow_len().expect("overflow"), 1);

    let second = group
        .register_form(None, FormOptions::default())
        .expect("second address");
    assert_eq!(group.overflow_len().expect("overflow"), 0);
    second.register_control("city").expect("second city");
    engine.settle().expect("settle");

    assert_eq!(
        form.get_model_values().expect("values"),
        ModelValue::map([(
            "addresses",
            ModelValue::list([
                ModelValue::map([("city", text("Oslo"))]),
                ModelValue::map([("city", text("Rome"))]),
            ])
        )])
    );
}

#[test]
fn group_configuration_is_positional() {
    let (_engine, form) = new_form(FormOptions::default());
    let group = form.register_group("addresses").expect("register group");
    form.configure(Config::map().with(
        "addresses",
        Config::list([
            Config::map(),
            Config::map().with(
                "city",
                ControlConfig::new().validator("required", required()),
            ),
        ]),
    ))
    .expect("configure group");

    let first = group
        .register_form(None, FormOptions::default())
        .expect("first address");
    let second = group
        .register_form(None, FormOptions::default())
        .expect("second address");
    let first_city = first.register_control("city").expect("first city");
    let second_city = second.register_control("city").expect("second city");

    assert!(!first_city.has_validator("required").expect("lookup"));
    assert!(second_city.has_validator("required").expect("lookup"));
}

#[test]
fn cached_group_configuration_stays_positional() {
    let (_engine, form) = new_form(FormOptions::default());
    let zip = |message: &str| {
        Config::map().with(
            "items",
            Config::list([Config::map().with(
                "zip",
                ControlConfig::new().error("required", message),
            )]),
        )
    };
    form.configure(zip("Zip required")).expect("first configure");
    form.configure(zip("Zip required")).expect("second configure");

    let group = form.register_group("items").expect("register group");
    let first = group
        .register_form(None, FormOptions::default())
        .expect("first item");
    let second = group
        .register_form(None, FormOptions::default())
        .expect("second item");
    let first_zip = first.register_control("zip").expect("first zip");
    let second_zip = second.register_control("zip").expect("second zip");

    assert_eq!(
        first_zip.get_error_messages().expect("messages"),
        vec![("required".to_owned(), "Zip required".to_owned())]
    );
    assert!(second_zip.get_error_messages().expect("messages").is_empty());
}

#[test]
fn repeated_configuration_does_not_grow_the_cache() {
    let (engine, form) = new_form(FormOptions::default());
    let email = form.register_control("email").expect("register email");
    let trim = Parser::new(|view| view);
    for _ in 0..3 {
        email
            .configure(
                ControlConfig::new()
                    .error("required", "Email is required")
                    .parser(trim.clone())
                    .into(),
            )
            .expect("configure email");
    }

    let state = engine
        .read_lock("inspecting cached configuration")
        .expect("state");
    let cached = &state.control(email.id).expect("control state").local_config;
    assert!(matches!(cached.get("errors"), Some(Config::List(items)) if items.len() == 1));
    assert!(matches!(cached.get("parsers"), Some(Config::List(items)) if items.len() == 1));
}

#[test]
fn cached_configuration_reaches_late_members() {
    let (_engine, form) = new_form(FormOptions::default());
    form.configure(
        Config::map()
            .with(
                "email",
                ControlConfig::new()
                    .validator("required", required())
                    .error("required", "Email is required"),
            )
            .with(
                "address",
                Config::map().with(
                    "city",
                    ControlConfig::new().error("required", "City is required"),
                ),
            ),
    )
    .expect("configure form");

    let email = form.register_control("email").expect("register email");
    assert!(email.has_validator("required").expect("lookup"));
    assert!(!email.is_valid().expect("validity"));
    assert_eq!(email.get_error_messages().expect("messages").len(), 1);

    let address = form
        .register_form(Some("address"), FormOptions::default())
        .expect("register address");
    let city = address.register_control("city").expect("register city");
    assert_eq!(
        city.get_error_messages().expect("messages"),
        vec![("required".to_owned(), "City is required".to_owned())]
    );
}

#[test]
fn blur_updates_buffer_until_touched() {
    let (_engine, form) = new_form(FormOptions::default());
    let email = form.register_control("email").expect("register email");
    email
        .configure(ControlConfig::new().model_option("update_on", "blur").into())
        .expect("configure blur updates");

    email.set_view_value("draft").expect("edit");
    assert_eq!(email.view_value().expect("view"), text("draft"));
    assert_eq!(email.model_value().expect("model"), None);
    assert!(!email.is_dirty().expect("dirty"));

    email.touch().expect("blur");
    assert_eq!(email.model_value().expect("model"), Some(text("draft")));
    assert!(email.is_dirty().expect("dirty"));
    assert!(email.is_touched().expect("touched"));
    assert!(form.is_dirty().expect("form dirty"));
}

#[test]
fn parsers_and_formatters_run_in_order() {
    let (engine, form) = new_form(FormOptions::default());
    let code = form.register_control("code").expect("register code");
    let trim = Parser::new(|value| match value {
        ModelValue::Text(text) => ModelValue::Text(text.trim().to_owned()),
        other => other,
    });
    let upper = Parser::new(|value| match value {
        ModelValue::Text(text) => ModelValue::Text(text.to_uppercase()),
        other => other,
    });
    let bracket = Formatter::new(|value| match value {
        ModelValue::Text(text) => ModelValue::Text(format!("<{text}>")),
        other => other,
    });
    code.configure(
        ControlConfig::new()
            .parser(trim.clone())
            .parser(upper)
            .parser(trim)
            .formatter(bracket)
            .into(),
    )
    .expect("configure pipelines");

    code.set_view_value("  ab ").expect("edit");
    assert_eq!(code.model_value().expect("model"), Some(text("AB")));

    form.set_model_values(ModelValue::map([("code", text("xy"))]))
        .expect("set values");
    engine.settle().expect("settle");
    assert_eq!(code.view_value().expect("view"), text("<xy>"));
}

#[test]
fn reset_restores_pristine_state() {
    let (engine, form) = new_form(FormOptions::default());
    let native = Arc::new(RecordingNativeForm::default());
    form.bind_native_form(native.clone()).expect("bind native form");
    let email = form.register_control("email").expect("register email");
    email.set_view_value("typed").expect("edit");
    email.touch().expect("touch");
    block_on(form.submit(|_| async { Ok::<_, BoxError>(None) })).expect("submit");
    assert_eq!(native.submitted.load(Ordering::SeqCst), 1);

    form.reset(Some(ModelValue::map([("email", text("initial"))])))
        .expect("reset");
    assert!(!email.is_touched().expect("touched"));
    assert!(!email.is_dirty().expect("dirty"));
    assert!(!form.is_submitted().expect("submitted"));
    assert!(!form.is_dirty().expect("dirty"));
    assert_eq!(native.pristine.load(Ordering::SeqCst), 1);

    engine.settle().expect("settle");
    assert_eq!(email.view_value().expect("view"), text("initial"));
}

#[test]
fn native_form_binds_once() {
    let (_engine, form) = new_form(FormOptions::default());
    form.bind_native_form(Arc::new(RecordingNativeForm::default()))
        .expect("first bind");
    let error = form
        .bind_native_form(Arc::new(RecordingNativeForm::default()))
        .expect_err("second bind");
    assert!(matches!(error, FormError::NativeFormAlreadyBound(name) if name == "profile"));
}

#[test]
fn bare_bindings_take_part_in_model_values() {
    let (engine, form) = new_form(FormOptions::default());
    let binding = Arc::new(RecordingBinding::default());
    let bound = form
        .register_ng_model(binding.clone())
        .expect("register binding");

    form.set_model_values(ModelValue::map([("nickname", text("neo"))]))
        .expect("set values");
    engine.settle().expect("settle");

    assert_eq!(binding.model_value(), Some(text("neo")));
    assert_eq!(
        form.get_model_values().expect("values"),
        ModelValue::map([("nickname", text("neo"))])
    );
    assert!(matches!(
        bound.configure(Config::map()),
        Err(FormError::Unsupported {
            operation: "configure",
            ..
        })
    ));
    form.configure(Config::map().with("nickname", Config::map()))
        .expect("bindings are skipped");

    bound.unregister().expect("unregister binding");
    assert!(form.members().expect("members").is_empty());
}

#[test]
fn disabling_a_form_cascades_to_controls() {
    let (_engine, form) = new_form(FormOptions::default());
    let group = form.register_group("items").expect("register group");
    let item = group
        .register_form(None, FormOptions::default())
        .expect("register item");
    let title = item.register_control("title").expect("register title");

    assert!(!title.is_disabled().expect("enabled"));
    form.disable().expect("disable");
    assert!(title.is_disabled().expect("disabled by form"));
    form.enable().expect("enable");
    group.disable().expect("disable group");
    assert!(title.is_disabled().expect("disabled by group"));
}

#[test]
fn unregistering_drops_node_and_pending_work() {
    let (engine, form) = new_form(FormOptions::default());
    let email = form.register_control("email").expect("register email");
    email
        .configure(ControlConfig::new().async_validator("unique", never_resolves()).into())
        .expect("install async validator");
    assert_eq!(engine.pending_validations().expect("pending"), 1);

    assert!(form.unregister_control(&email).expect("unregister"));
    assert_eq!(engine.pending_validations().expect("pending"), 0);
    assert!(form.get_control("email").expect("lookup").is_none());
    assert!(matches!(email.view_value(), Err(FormError::Detached(_))));
    assert!(!form.unregister_control(&email).expect("second unregister"));
}

#[test]
fn revalidation_drops_stale_async_results() {
    let (engine, form) = new_form(FormOptions::default());
    let email = form.register_control("email").expect("register email");
    let (unique, gates) = gated_validator();
    let (stale, first) = oneshot::channel::<bool>();
    let (fresh, second) = oneshot::channel::<bool>();
    gates.lock().expect("gate queue lock").extend([first, second]);

    email
        .configure(ControlConfig::new().async_validator("unique", unique).into())
        .expect("install async validator");
    email.validate().expect("revalidate");
    assert!(stale.send(false).is_err());

    engine.settle().expect("settle");
    assert!(email.is_pending().expect("still pending"));

    fresh.send(true).expect("resolve latest run");
    engine.settle().expect("settle");
    assert_eq!(
        email.validity("unique").expect("validity"),
        Some(Validity::Valid)
    );
    assert_eq!(engine.pending_validations().expect("pending"), 0);
}

#[derive(Debug, PartialEq, crate::FormValues)]
struct Signup {
    email: String,
    #[form(rename = "age")]
    years: i64,
    newsletter: Option<bool>,
}

#[test]
fn typed_values_round_trip_through_form() {
    let (engine, form) = new_form(FormOptions::default());
    for name in ["email", "age", "newsletter"] {
        form.register_control(name).expect("register control");
    }

    let signup = Signup {
        email: "neo@example.com".into(),
        years: 37,
        newsletter: None,
    };
    form.set_model_values_from(&signup).expect("set typed values");
    engine.settle().expect("settle");

    assert_eq!(
        form.get_control("age")
            .expect("lookup")
            .expect("age control")
            .model_value()
            .expect("model"),
        Some(ModelValue::from(37_i64))
    );
    assert_eq!(form.model_values_as::<Signup>().expect("typed values"), signup);
}
