//! Benchmarks for observation and rendering.
//!
//! Run with: cargo bench -p trellis --bench observe_bench
//!
//! Covers the hot paths of a running app: property writes fanning out to
//! subscribers, a flushed binding update, and repeat reconciliation over
//! arrays of growing size.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::rc::{Rc, Weak};
use trellis::prelude::*;
use trellis::runtime::templating::definition::marker;

struct Sink;

impl PropertySubscriber for Sink {
    fn handle_change(&self, new_value: &Value, _previous: &Value, _flags: LifecycleFlags) {
        black_box(new_value);
    }
}

fn container() -> (Rc<Container>, Rc<Scheduler>) {
    let scheduler = Rc::new(Scheduler::manual());
    (
        Container::with_scheduler(RuntimeConfig::default(), Rc::clone(&scheduler)),
        scheduler,
    )
}

// =============================================================================
// Property observation
// =============================================================================

fn bench_property_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("observe/property_set");
    for subscribers in [1usize, 8, 64] {
        let (container, _) = container();
        let object = ObjectRef::from_pairs([("n", 0)]);
        let observer = container
            .observer_locator()
            .get_observer(&Value::Object(object.clone()), "n")
            .expect("observable");
        let sinks: Vec<Rc<Sink>> = (0..subscribers).map(|_| Rc::new(Sink)).collect();
        for sink in &sinks {
            let weak: Weak<dyn PropertySubscriber> = Rc::downgrade(sink) as _;
            observer.subscribe(weak);
        }
        group.throughput(Throughput::Elements(subscribers as u64));
        group.bench_with_input(BenchmarkId::from_parameter(subscribers), &object, |b, object| {
            let mut n = 0.0;
            b.iter(|| {
                n += 1.0;
                object.set("n", black_box(n));
            });
        });
    }
    group.finish();
}

fn bench_binding_flush(c: &mut Criterion) {
    let (container, scheduler) = container();
    let vm = ObjectRef::from_pairs([("first", "Ada"), ("last", "Lovelace")]);
    let node = Node::text("");
    let expr = container
        .parser()
        .parse_interpolation("${first} ${last}")
        .expect("parse")
        .expect("has parts");
    let binding = trellis::runtime::binding::InterpolationBinding::new(
        expr,
        Value::Node(node),
        "textContent",
        Rc::clone(&container),
    );
    binding
        .bind(LifecycleFlags::NONE, &Scope::create(Value::Object(vm.clone()), None))
        .expect("bind");
    c.bench_function("observe/interpolation_flush", |b| {
        let mut flip = false;
        b.iter(|| {
            flip = !flip;
            vm.set("last", if flip { "King" } else { "Lovelace" });
            black_box(scheduler.drain_microtasks());
        });
    });
}

// =============================================================================
// Repeat
// =============================================================================

fn list_view(container: &Rc<Container>) -> Rc<View> {
    let item = {
        let template = Node::fragment();
        template.append_child(&marker());
        TemplateDefinition::new("row", template)
            .with_instructions(vec![vec![Instruction::text("${item}")]])
    };
    let template = Node::fragment();
    template.append_child(&marker());
    let page = TemplateDefinition::new("list", template).with_instructions(vec![vec![
        Instruction::template_controller("repeat", item, vec![Instruction::iterator("item of items")]),
    ]]);
    ViewFactory::new(Rc::new(page), Rc::clone(container))
        .expect("factory")
        .create()
        .expect("view")
}

fn bench_repeat(c: &mut Criterion) {
    let mut group = c.benchmark_group("observe/repeat_reverse");
    for len in [10usize, 100, 1000] {
        let (container, scheduler) = container();
        let items = ArrayRef::from_vec((0..len).map(|i| Value::from(i as f64)).collect());
        let vm = ObjectRef::from_pairs([("items", Value::Array(items.clone()))]);
        let view = list_view(&container);
        view.hold(trellis::runtime::templating::MountTarget::Host(Node::element("body")));
        view.bind(LifecycleFlags::FROM_START, &Scope::create(Value::Object(vm), None))
            .expect("bind");
        view.attach(LifecycleFlags::FROM_START).expect("attach");
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &items, |b, items| {
            b.iter(|| {
                items.reverse();
                black_box(scheduler.drain_microtasks());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_property_set, bench_binding_flush, bench_repeat);
criterion_main!(benches);
