use bytes::Bytes;
use contract_tap::capture::{capture_request, capture_response};
use contract_tap::contract::{ContractDefinition, ContractRegistry, ObjectSchema, Schema};
use contract_tap::report::{MemorySink, Reporter};
use contract_tap::transport::OutboundRequest;
use contract_tap::validate::ValidationEngine;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hyper::Response;
use std::sync::Arc;

fn contracts(count: usize) -> Vec<ContractDefinition> {
    (0..count)
        .map(|i| {
            ContractDefinition::new("GET", &format!("/api/v1/resource{i}/:id"))
                .with_status_codes([200])
        })
        .collect()
}

fn bench_registry_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_lookup");

    for count in [10, 50, 100, 500, 1000].iter() {
        let registry = ContractRegistry::new(contracts(*count)).unwrap();
        let first = "/api/v1/resource0/42".to_string();
        let last = format!("/api/v1/resource{}/42", count - 1);

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("match_first", count), count, |b, _| {
            b.iter(|| registry.find(black_box("GET"), black_box(&first)))
        });
        group.bench_with_input(BenchmarkId::new("match_last", count), count, |b, _| {
            b.iter(|| registry.find(black_box("GET"), black_box(&last)))
        });
        group.bench_with_input(BenchmarkId::new("no_match", count), count, |b, _| {
            b.iter(|| registry.find(black_box("GET"), black_box("/unknown/path")))
        });
    }

    group.finish();
}

fn bench_validate_exchange(c: &mut Criterion) {
    let schema: Schema = ObjectSchema::new()
        .property("id", Schema::integer())
        .property("name", Schema::string())
        .property("tags", Schema::array(Schema::string()))
        .required(["id", "name"])
        .into();
    let registry = ContractRegistry::new(vec![ContractDefinition::new("GET", "/api/users/:id")
        .with_response_body(schema)
        .with_status_codes([200])])
    .unwrap();
    let engine = ValidationEngine::new(registry)
        .with_reporter(Reporter::new(Arc::new(MemorySink::new())));

    let request = Arc::new(capture_request(
        &OutboundRequest::get("https://api.example.com/api/users/7"),
        None,
    ));
    let valid = Arc::new(capture_response(
        &Response::builder()
            .status(200)
            .header("content-type", "application/json")
            .body(Bytes::from_static(br#"{"id": 7, "name": "Ann", "tags": ["a"]}"#))
            .unwrap(),
        None,
        None,
    ));
    let invalid = Arc::new(capture_response(
        &Response::builder()
            .status(200)
            .header("content-type", "application/json")
            .body(Bytes::from_static(br#"{"id": "7", "tags": [1]}"#))
            .unwrap(),
        None,
        None,
    ));

    let mut group = c.benchmark_group("validate_exchange");
    group.bench_function("conforming", |b| {
        b.iter(|| engine.validate_exchange(black_box(&request), black_box(&valid)))
    });
    group.bench_function("violating", |b| {
        b.iter(|| engine.validate_exchange(black_box(&request), black_box(&invalid)))
    });
    group.finish();
}

criterion_group!(benches, bench_registry_lookup, bench_validate_exchange);
criterion_main!(benches);
