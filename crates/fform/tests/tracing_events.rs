#![forbid(unsafe_code)]

//! Structured log events emitted by the control.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::Poll;

use fform::{
    FieldPath, FocusOptions, FormControl, FormOptions, KeepStateOptions, Mode, RegisterOptions,
    SetValueOptions, UnregisterOptions, ValidateResult, Validator,
};
use futures::FutureExt;
use pollster::block_on;
use serde_json::json;
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

fn p(s: &str) -> FieldPath {
    FieldPath::parse(s).expect("valid path")
}

struct YieldOnce(bool);

impl Future for YieldOnce {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<()> {
        if self.0 {
            Poll::Ready(())
        } else {
            self.0 = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

#[derive(Default)]
struct Captured {
    spans: Vec<String>,
    events: Vec<String>,
}

struct Capture {
    state: Arc<Mutex<Captured>>,
}

impl<S> Layer<S> for Capture
where
    S: Subscriber + for<'lookup> tracing_subscriber::registry::LookupSpan<'lookup>,
{
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        _id: &tracing::Id,
        _ctx: Context<'_, S>,
    ) {
        self.state
            .lock()
            .expect("capture lock")
            .spans
            .push(attrs.metadata().name().to_string());
    }

    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        struct Msg {
            message: Option<String>,
        }
        impl tracing::field::Visit for Msg {
            fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
                if field.name() == "message" {
                    self.message = Some(value.to_string());
                }
            }

            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                if field.name() == "message" {
                    self.message = Some(format!("{value:?}").trim_matches('"').to_string());
                }
            }
        }
        let mut msg = Msg { message: None };
        event.record(&mut msg);
        if let Some(message) = msg.message {
            self.state.lock().expect("capture lock").events.push(message);
        }
    }
}

fn capture() -> (Arc<Mutex<Captured>>, tracing::subscriber::DefaultGuard) {
    let state = Arc::new(Mutex::new(Captured::default()));
    let subscriber = tracing_subscriber::registry().with(Capture {
        state: Arc::clone(&state),
    });
    (state, tracing::subscriber::set_default(subscriber))
}

#[test]
fn lifecycle_events_are_logged() {
    let (state, _guard) = capture();

    let form = FormControl::new(FormOptions::new().default_values(json!({ "a": "", "items": [] })));
    let field = form.register(&p("a"), RegisterOptions::new().required());
    let array = form.use_field_array(&p("items"), None).expect("sequence");
    array.append(vec![json!(1)], FocusOptions::none());
    block_on(form.trigger(None));
    block_on(form.handle_submit(|_| async { Ok(()) }));
    form.reset(None, KeepStateOptions::default());
    drop(field);
    form.unregister(&p("a"), UnregisterOptions::default());

    let captured = state.lock().expect("capture lock");
    for expected in [
        "form.register",
        "field_array.mutate",
        "form.validate",
        "form.submit",
        "form.reset",
        "form.unregister",
    ] {
        assert!(
            captured.events.iter().any(|e| e == expected),
            "expected {expected} event, saw {:?}",
            captured.events
        );
    }
    assert!(captured.spans.iter().any(|s| s == "form.trigger"));
    assert!(captured.spans.iter().any(|s| s == "form.handle_submit"));
}

#[test]
fn stale_results_are_logged() {
    let (state, _guard) = capture();

    let form = FormControl::new(FormOptions::new().mode(Mode::OnChange));
    let field = form.register(
        &p("code"),
        RegisterOptions::new().validate(Validator::new_async(|_value, _values| {
            async {
                YieldOnce(false).await;
                ValidateResult::from("rejected")
            }
            .boxed_local()
        })),
    );
    let code = p("code");
    let slow = field.on_change(json!("bad"));
    let fast = form.set_value(&code, json!("good"), SetValueOptions::default());
    block_on(async { futures::join!(slow, fast) });

    let captured = state.lock().expect("capture lock");
    assert!(captured.events.iter().any(|e| e == "form.validate.stale"));
    assert!(form.errors().is_empty());
}
