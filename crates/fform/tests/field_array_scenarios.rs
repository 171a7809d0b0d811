#![forbid(unsafe_code)]

//! Field-array behaviour through the control: keys, per-path state, root
//! validation and focus.

use std::cell::Cell;
use std::rc::Rc;

use fform::{
    ArrayUpdate, ErrorType, FieldError, FieldHandle, FieldPath, FocusOptions, FormControl,
    FormOptions, KeepStateOptions, Mode, RegisterOptions, SetErrorOptions, SetValueOptions,
};
use pollster::block_on;
use serde_json::{Value, json};

fn p(s: &str) -> FieldPath {
    FieldPath::parse(s).expect("valid path")
}

fn form(values: Value) -> FormControl {
    FormControl::new(FormOptions::new().default_values(values))
}

#[derive(Default)]
struct Focusable {
    focused: Cell<u32>,
}

impl FieldHandle for Focusable {
    fn focus(&self) -> bool {
        self.focused.set(self.focused.get() + 1);
        true
    }
}

#[test]
fn append_to_empty_array() {
    let form = form(json!({ "test": [] }));
    let array = form.use_field_array(&p("test"), None).expect("sequence");
    array.append(vec![json!({ "firstName": "bill" })], FocusOptions::none());

    let fields = array.fields();
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0]["firstName"], json!("bill"));
    assert_eq!(fields[0]["id"], json!(array.keys()[0].to_string()));
    assert_eq!(form.get_values(), json!({ "test": [{ "firstName": "bill" }] }));
}

#[test]
fn move_keeps_keys_with_values() {
    let form = form(json!({ "items": [{ "v": "a" }, { "v": "b" }, { "v": "c" }] }));
    let array = form.use_field_array(&p("items"), None).expect("sequence");
    let before = array.entries();

    array.move_item(0, 2);
    let after = array.entries();
    let order: Vec<&Value> = after.iter().map(|(_, v)| &v["v"]).collect();
    assert_eq!(order, [&json!("b"), &json!("c"), &json!("a")]);
    for (key, value) in &after {
        let original = before.iter().find(|(k, _)| k == key).expect("key survives");
        assert_eq!(&original.1, value);
    }
}

#[test]
fn custom_key_name() {
    let form = FormControl::new(
        FormOptions::new()
            .key_name("_key")
            .default_values(json!({ "tags": ["x"] })),
    );
    let array = form.use_field_array(&p("tags"), None).expect("sequence");
    let fields = array.fields();
    assert!(fields[0].get("_key").is_some());
    assert_eq!(fields[0]["value"], json!("x"));
}

#[test]
fn remove_drops_entry_state_and_shifts_the_rest() {
    let form = form(json!({ "items": [{ "n": "a" }, { "n": "b" }, { "n": "c" }] }));
    let array = form.use_field_array(&p("items"), None).expect("sequence");
    for i in 0..3 {
        let _ = form.register(&p(&format!("items.{i}.n")), RegisterOptions::new());
    }
    form.set_error(&p("items.0.n"), FieldError::new("test"), SetErrorOptions::default());
    form.set_error(&p("items.2.n"), FieldError::new("test"), SetErrorOptions::default());

    array.remove(Some(&[0]));
    let errors = form.errors();
    assert!(errors.contains(&p("items.1.n")));
    assert!(!errors.contains(&p("items.0.n")));
    assert!(!errors.contains(&p("items.2.n")));
    assert_eq!(form.field_count(), 2);
    assert!(form.is_registered(&p("items.1.n")));
    assert!(!form.is_registered(&p("items.2.n")));
    assert_eq!(form.get_value(&p("items.0.n")), Some(json!("b")));
}

#[test]
fn remove_everything() {
    let form = form(json!({ "items": [1, 2, 3] }));
    let array = form.use_field_array(&p("items"), None).expect("sequence");
    array.remove(None);
    assert!(array.is_empty());
    assert_eq!(form.get_value(&p("items")), Some(json!([])));
    assert!(form.get_form_state().is_dirty);
}

#[test]
fn dirty_tracks_array_surgery() {
    let form = form(json!({ "items": [1, 2] }));
    let array = form.use_field_array(&p("items"), None).expect("sequence");
    array.swap(0, 1);
    assert!(form.get_form_state().is_dirty);
    array.swap(0, 1);
    assert!(!form.get_form_state().is_dirty);
    assert!(form.get_form_state().dirty_fields.is_empty());
}

#[test]
fn array_notification_carries_the_op() {
    let form = form(json!({ "items": [] }));
    let array = form.use_field_array(&p("items"), None).expect("sequence");
    let seen = Rc::new(Cell::new(None));
    let sink = Rc::clone(&seen);
    let _sub = form.subjects().array.subscribe(move |update: &ArrayUpdate| {
        sink.set(update.op.as_ref().map(|op| op.name()));
    });
    array.prepend(vec![json!(1)], FocusOptions::none());
    assert_eq!(seen.get(), Some("prepend"));
}

#[test]
fn root_rules_report_at_root_path() {
    let form = FormControl::new(
        FormOptions::new()
            .mode(Mode::OnChange)
            .default_values(json!({ "items": [1] })),
    );
    let array = form
        .use_field_array(
            &p("items"),
            Some(RegisterOptions::new().min_length_with(2, "two or more")),
        )
        .expect("sequence");

    array.remove(Some(&[0]));
    block_on(array.settle());
    let error = form.errors().get(&p("items.root")).cloned().expect("root error");
    assert_eq!(error.kind, ErrorType::MinLength);
    assert_eq!(error.message.as_deref(), Some("two or more"));

    array.append(vec![json!(1), json!(2)], FocusOptions::none());
    block_on(array.settle());
    assert!(form.errors().get(&p("items.root")).is_none());
}

#[test]
fn root_rules_wait_for_submit_in_on_submit_mode() {
    let form = form(json!({ "items": [] }));
    let array = form
        .use_field_array(&p("items"), Some(RegisterOptions::new().required()))
        .expect("sequence");
    array.append(vec![json!(1)], FocusOptions::none());
    array.remove(None);
    block_on(array.settle());
    assert!(form.errors().is_empty());

    let outcome = block_on(form.handle_submit(|_| async { Ok(()) }));
    assert!(!outcome.is_success());
    assert_eq!(
        form.errors().get(&p("items.root")).map(|e| e.kind.clone()),
        Some(ErrorType::Required)
    );
}

#[test]
fn append_focuses_the_new_entry() {
    let form = form(json!({ "items": [{ "n": "a" }] }));
    let array = form.use_field_array(&p("items"), None).expect("sequence");
    let existing = Rc::new(Focusable::default());
    let first = form.register(&p("items.0.n"), RegisterOptions::new());
    let handle: Rc<dyn FieldHandle> = existing.clone();
    first.attach(&handle).expect("registered");

    array.append(vec![json!({ "n": "" })], FocusOptions::default());
    let appended = Rc::new(Focusable::default());
    let second = form.register(&p("items.1.n"), RegisterOptions::new());
    let handle: Rc<dyn FieldHandle> = appended.clone();
    second.attach(&handle).expect("registered");
    block_on(array.settle());

    assert_eq!(appended.focused.get(), 1);
    assert_eq!(existing.focused.get(), 0);
}

#[test]
fn reset_regenerates_keys() {
    let form = form(json!({ "items": ["a", "b"] }));
    let array = form.use_field_array(&p("items"), None).expect("sequence");
    array.append(vec![json!("c")], FocusOptions::none());
    let before = array.keys();

    form.reset(None, KeepStateOptions::default());
    assert_eq!(array.len(), 2);
    assert!(array.keys().iter().all(|k| !before.contains(k)));
}

#[test]
fn update_keeps_entry_state_in_place() {
    let form = form(json!({ "items": [{ "n": "a" }] }));
    let array = form.use_field_array(&p("items"), None).expect("sequence");
    let _field = form.register(&p("items.0.n"), RegisterOptions::new());
    form.set_error(&p("items.0.n"), FieldError::new("test"), SetErrorOptions::default());

    array.update(0, json!({ "n": "z" }));
    assert!(form.errors().contains(&p("items.0.n")));
    assert_eq!(form.get_value(&p("items.0.n")), Some(json!("z")));
}

#[test]
fn set_value_on_child_leaves_keys_alone() {
    let form = form(json!({ "items": [{ "n": "a" }] }));
    let array = form.use_field_array(&p("items"), None).expect("sequence");
    let before = array.keys();
    block_on(form.set_value(&p("items.0.n"), json!("b"), SetValueOptions::default()));
    assert_eq!(array.keys(), before);
}
