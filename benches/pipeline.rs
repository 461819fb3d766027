use calm_rs_visualizer::config::LayoutConfig;
use calm_rs_visualizer::containment::resolve_containment;
use calm_rs_visualizer::layout::compute_layout;
use calm_rs_visualizer::parser::parse_calm;
use calm_rs_visualizer::render::render_svg;
use calm_rs_visualizer::source_map::build_index;
use calm_rs_visualizer::theme::Theme;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use serde_json::{Value, json};
use std::hint::black_box;

/// `systems` systems with `per_system` services each, a chain of connects
/// inside every system, a link between neighbouring systems and one actor
/// interacting with the first service of each system.
fn architecture_source(systems: usize, per_system: usize) -> String {
    let mut nodes: Vec<Value> = vec![json!({"unique-id": "user", "node-type": "actor", "name": "User"})];
    let mut relationships: Vec<Value> = Vec::new();
    let mut entry_points = Vec::new();

    for s in 0..systems {
        let system = format!("sys-{s}");
        nodes.push(json!({"unique-id": &system, "node-type": "system", "name": format!("System {s}")}));
        let mut children = Vec::new();
        for n in 0..per_system {
            let id = format!("svc-{s}-{n}");
            nodes.push(json!({
                "unique-id": &id,
                "node-type": if n % 3 == 2 { "database" } else { "service" },
                "name": format!("Service {s}.{n} with a longer descriptive name"),
                "metadata": {"aigf": {"risk-level": (["low", "medium", "high", "critical"][n % 4])}}
            }));
            if n > 0 {
                relationships.push(json!({
                    "unique-id": format!("rel-{s}-{n}"),
                    "source": format!("svc-{s}-{}", n - 1),
                    "target": &id,
                    "protocol": "HTTPS"
                }));
            }
            children.push(id);
        }
        if let Some(first) = children.first() {
            entry_points.push(first.clone());
        }
        relationships.push(json!({
            "unique-id": format!("contains-{s}"),
            "relationship-type": {"composed-of": {"container": system, "nodes": children}}
        }));
        if s > 0 && per_system > 0 {
            relationships.push(json!({
                "unique-id": format!("link-{s}"),
                "source": format!("svc-{}-{}", s - 1, per_system - 1),
                "target": format!("svc-{s}-0"),
                "description": "replicates"
            }));
        }
    }
    relationships.push(json!({
        "unique-id": "user-interacts",
        "relationship-type": {"interacts": {"actor": "user", "nodes": entry_points}}
    }));

    serde_json::to_string_pretty(&json!({"nodes": nodes, "relationships": relationships}))
        .unwrap_or_default()
}

const SIZES: [(&str, usize, usize); 4] = [
    ("tiny", 1, 3),
    ("small", 3, 5),
    ("medium", 8, 8),
    ("large", 20, 12),
];

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    for (name, systems, per_system) in SIZES {
        let input = architecture_source(systems, per_system);
        group.bench_with_input(BenchmarkId::from_parameter(name), &input, |b, data| {
            b.iter(|| {
                let parsed = parse_calm(black_box(data)).expect("parse failed");
                black_box(resolve_containment(parsed));
            });
        });
    }
    group.finish();
}

fn bench_layout(c: &mut Criterion) {
    let mut group = c.benchmark_group("layout");
    let theme = Theme::calm();
    let config = LayoutConfig::default();
    for (name, systems, per_system) in SIZES {
        let input = architecture_source(systems, per_system);
        let graph = resolve_containment(parse_calm(&input).expect("parse failed"));
        group.bench_with_input(BenchmarkId::from_parameter(name), &graph, |b, data| {
            b.iter(|| {
                let layout = compute_layout(black_box(data), &theme, &config);
                black_box(layout.nodes.len());
            });
        });
    }
    group.finish();
}

fn bench_source_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("source_index");
    for (name, systems, per_system) in SIZES {
        let input = architecture_source(systems, per_system);
        group.bench_with_input(BenchmarkId::from_parameter(name), &input, |b, data| {
            b.iter(|| black_box(build_index(black_box(data))));
        });
    }
    group.finish();
}

fn bench_end_to_end(c: &mut Criterion) {
    let mut group = c.benchmark_group("end_to_end");
    let theme = Theme::calm();
    let config = LayoutConfig::default();
    for (name, systems, per_system) in SIZES {
        let input = architecture_source(systems, per_system);
        group.bench_with_input(BenchmarkId::from_parameter(name), &input, |b, data| {
            b.iter(|| {
                let graph = resolve_containment(parse_calm(black_box(data)).expect("parse failed"));
                let layout = compute_layout(&graph, &theme, &config);
                let svg = render_svg(&layout, &theme, &config);
                black_box(svg.len());
            });
        });
    }
    group.finish();
}

criterion_group!(
    name = benches;
    config = Criterion::default();
    targets = bench_parse, bench_layout, bench_source_index, bench_end_to_end
);
criterion_main!(benches);
