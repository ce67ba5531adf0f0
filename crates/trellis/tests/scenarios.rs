//! End-to-end scenarios through the public facade.
//!
//! Each test drives the full stack: parse, bind, observe, flush, render.

use std::cell::RefCell;
use std::rc::Rc;

use trellis::prelude::*;
use trellis::runtime::binding::PropertyBinding;
use trellis::runtime::templating::definition::marker;

// ── Harness ─────────────────────────────────────────────────────────────

struct Harness {
    app: App,
    scheduler: Rc<Scheduler>,
    host: Node,
}

impl Harness {
    fn new() -> Self {
        init_logging();
        let scheduler = Rc::new(Scheduler::manual());
        let container = Container::with_scheduler(RuntimeConfig::default(), Rc::clone(&scheduler));
        Self {
            app: App::with_container(container),
            scheduler,
            host: Node::element("main"),
        }
    }

    fn container(&self) -> &Rc<Container> {
        self.app.container()
    }

    /// Start a root component whose template is one marker carrying `row`.
    fn start(&self, name: &str, row: Vec<Instruction>, view_model: impl Fn() -> ObjectRef + 'static) {
        let template = Node::fragment();
        template.append_child(&marker());
        let component = ElementDefinition::new(
            TemplateDefinition::new(name, template).with_instructions(vec![row]),
            view_model,
        );
        self.app.app(AppTarget::new(self.host.clone(), component));
        let started = self.app.start().expect("start");
        assert!(started.done());
    }

    fn view_model(&self) -> ObjectRef {
        self.app.root().expect("started").view_model().clone()
    }

    fn flush(&self) {
        self.scheduler.drain_microtasks();
    }

    fn text(&self) -> String {
        self.host.text_content()
    }
}

/// `RUST_LOG=trellis_runtime=debug cargo test -p trellis` shows the
/// lifecycle as the scenarios run.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
struct Recorder {
    changes: RefCell<Vec<(Value, Value)>>,
}

impl PropertySubscriber for Recorder {
    fn handle_change(&self, new_value: &Value, previous_value: &Value, _flags: LifecycleFlags) {
        self.changes.borrow_mut().push((new_value.clone(), previous_value.clone()));
    }
}

fn watch(container: &Container, target: &Value, key: &str) -> Rc<Recorder> {
    let recorder = Rc::new(Recorder::default());
    let observer = container.observer_locator().get_observer(target, key).expect("observable");
    let subscriber: std::rc::Weak<dyn PropertySubscriber> = Rc::downgrade(&recorder) as _;
    observer.subscribe(subscriber);
    recorder
}

fn named(names: &[&str]) -> Value {
    Value::Array(ArrayRef::from_vec(
        names
            .iter()
            .map(|n| Value::Object(ObjectRef::from_pairs([("name", *n)])))
            .collect(),
    ))
}

// ── Scenarios ───────────────────────────────────────────────────────────

#[test]
fn member_path_evaluates_and_notifies_on_assign() {
    let h = Harness::new();
    let c = ObjectRef::from_pairs([("c", 42)]);
    let b = ObjectRef::from_pairs([("b", Value::Object(c.clone()))]);
    let scope = Scope::create(
        Value::Object(ObjectRef::from_pairs([("a", Value::Object(b))])),
        None,
    );
    let expr = h.container().parser().parse("a.b.c", BindingType::None).expect("parse");
    let value = expr
        .evaluate(LifecycleFlags::NONE, Some(&scope), h.container().as_ref())
        .expect("evaluate");
    assert_eq!(value, Value::from(42));

    let recorder = watch(h.container(), &Value::Object(c), "c");
    expr.assign(LifecycleFlags::NONE, Some(&scope), h.container().as_ref(), Value::from(43))
        .expect("assign");
    h.flush();
    assert_eq!(*recorder.changes.borrow(), vec![(Value::from(43), Value::from(42))]);
}

#[test]
fn repeat_follows_replacement_and_mutation() {
    let h = Harness::new();
    let item = {
        let template = Node::fragment();
        template.append_child(&marker());
        TemplateDefinition::new("item", template)
            .with_instructions(vec![vec![Instruction::text("${item.name}")]])
    };
    h.start(
        "list",
        vec![Instruction::template_controller(
            "repeat",
            item,
            vec![Instruction::iterator("item of items")],
        )],
        || ObjectRef::from_pairs([("items", named(&["item-0", "item-1"]))]),
    );
    assert_eq!(h.text(), "item-0item-1");

    let items = ArrayRef::from_vec(Vec::new());
    h.view_model().set("items", Value::Array(items.clone()));
    h.flush();
    assert_eq!(h.text(), "");

    items.push(Value::Object(ObjectRef::from_pairs([("name", "item-0")])));
    h.flush();
    assert_eq!(h.text(), "item-0");
}

#[test]
fn converter_runs_toward_the_view() {
    let h = Harness::new();
    h.app.register(Resource::converter(
        "b",
        FnConverter::new(|v, _| Value::from(v.to_number() * 2.0)),
    ));
    h.start("doubled", vec![Instruction::text("${a|b}")], || {
        ObjectRef::from_pairs([("a", 5)])
    });
    assert_eq!(h.text(), "10");

    h.view_model().set("a", 6);
    h.flush();
    assert_eq!(h.text(), "12");
}

#[test]
fn two_way_input_round_trips_once_per_event() {
    let h = Harness::new();
    let vm = ObjectRef::from_pairs([("text", "x")]);
    let input = Node::element("input");
    let expr = h.container().parser().parse("text", BindingType::None).expect("parse");
    let binding = PropertyBinding::new(
        expr,
        Value::Node(input.clone()),
        "value",
        BindingMode::TWO_WAY,
        Rc::clone(h.container()),
    );
    binding
        .bind(LifecycleFlags::NONE, &Scope::create(Value::Object(vm.clone()), None))
        .expect("bind");
    assert_eq!(input.get_property("value"), Value::from("x"));

    vm.set("text", "from-source");
    h.flush();
    assert_eq!(input.get_property("value"), Value::from("from-source"));

    let source = watch(h.container(), &Value::Object(vm.clone()), "text");
    input.set_property("value", "typed");
    input.dispatch_event("input");
    h.flush();
    assert_eq!(vm.get_untracked("text"), Value::from("typed"));
    assert_eq!(input.get_property("value"), Value::from("typed"));
    assert_eq!(source.changes.borrow().len(), 1, "one source write per event");

    binding.unbind(LifecycleFlags::NONE).expect("unbind");
}

#[test]
fn stop_then_start_renders_again() {
    let h = Harness::new();
    h.start("greeting", vec![Instruction::text("Hello ${name}")], || {
        ObjectRef::from_pairs([("name", "Ada")])
    });
    assert_eq!(h.text(), "Hello Ada");
    assert!(h.app.stop().expect("stop").done());
    assert_eq!(h.text(), "");
    assert!(h.app.start().expect("restart").done());
    assert_eq!(h.text(), "Hello Ada");
}
