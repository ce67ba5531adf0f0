//! Benchmarks for expression parsing.
//!
//! Run with: cargo bench -p trellis-expr --bench parse_bench
//!
//! Compares uncached parsing against cache hits for a spread of binding
//! expressions, from a bare identifier to a converter/behavior chain.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use trellis_expr::{BindingType, ExpressionParser, parse, parse_interpolation};

// =============================================================================
// Inputs
// =============================================================================

const INPUTS: &[(&str, &str)] = &[
    ("identifier", "firstName"),
    ("member_chain", "user.address.city.name"),
    ("call", "format(user.createdAt, 'yyyy-MM-dd', locale)"),
    ("arith", "a * b + c * d - e / f % g"),
    ("conditional", "isActive && !isDisabled ? 'on' : count > 0 ? 'some' : 'off'"),
    ("resources", "items | filter:query | sort:'name':desc & debounce:250 & signal:'refresh'"),
    ("template", "`${first} ${last} (${age > 18 ? 'adult' : 'minor'})`"),
];

// =============================================================================
// Uncached
// =============================================================================

fn bench_parse_uncached(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse/uncached");
    for (name, input) in INPUTS {
        group.throughput(Throughput::Bytes(input.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), input, |b, input| {
            b.iter(|| black_box(parse(black_box(input), BindingType::None)));
        });
    }
    group.finish();
}

fn bench_parse_iterator(c: &mut Criterion) {
    c.bench_function("parse/iterator", |b| {
        b.iter(|| {
            black_box(parse(
                black_box("[key, value] of entries | sort & oneTime"),
                BindingType::IsIterator,
            ))
        });
    });
}

fn bench_parse_interpolation(c: &mut Criterion) {
    let text = "Hello ${user.first | upper}, you have ${count} new ${count === 1 ? 'message' : 'messages'}";
    c.bench_function("parse/interpolation", |b| {
        b.iter(|| black_box(parse_interpolation(black_box(text))));
    });
}

// =============================================================================
// Cached
// =============================================================================

fn bench_parse_cached(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse/cached");
    let parser = ExpressionParser::new();
    for (_, input) in INPUTS {
        let _ = parser.parse(input, BindingType::None);
    }
    for (name, input) in INPUTS {
        group.bench_with_input(BenchmarkId::from_parameter(name), input, |b, input| {
            b.iter(|| black_box(parser.parse(black_box(input), BindingType::None)));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_parse_uncached,
    bench_parse_iterator,
    bench_parse_interpolation,
    bench_parse_cached
);
criterion_main!(benches);
