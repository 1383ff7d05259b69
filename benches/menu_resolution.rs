use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use dataprod::{
    menu::{classify::EntryContext, process_datalink_table, DatalinkMenuInput, NoMemory, ParsingAlgorithm},
    options::FactoryOptions,
    table::TableModel,
};

const COLUMNS: [&str; 6] = ["ID", "access_url", "semantics", "content_type", "content_length", "description"];

/// Datalink table with `bands` full/cutout pairs plus auxiliary rows.
fn datalink_table(bands: usize) -> TableModel {
    let mut rows = Vec::new();
    for b in 0..bands {
        let id = format!("ivo://bench/{b}");
        rows.push(vec![
            id.clone(),
            format!("https://x.org/full-{b}.fits"),
            if b == 0 { "#this".into() } else { "#auxiliary".into() },
            "image/fits".into(),
            "524288000".into(),
            format!("band {b}"),
        ]);
        rows.push(vec![
            id,
            format!("https://x.org/cut-{b}.fits"),
            "#cutout".into(),
            "image/fits".into(),
            "1048576".into(),
            format!("band {b} cutout"),
        ]);
    }
    rows.push(vec![
        String::new(),
        "https://x.org/preview.png".into(),
        "#preview".into(),
        "image/png".into(),
        String::new(),
        "preview".into(),
    ]);
    TableModel::new("dl", &COLUMNS, rows)
}

fn bench_datalink_menu(c: &mut Criterion) {
    let source = Arc::new(TableModel::new(
        "obscore",
        &["obs_id", "access_url", "access_format", "dataproduct_type"],
        vec![vec![
            "obs1".into(),
            "https://x.org/dl".into(),
            "application/x-votable+xml;content=datalink".into(),
            "image".into(),
        ]],
    ));
    let options = FactoryOptions::default();

    let mut group = c.benchmark_group("datalink_menu");
    for bands in [4usize, 32, 256] {
        let table = datalink_table(bands);
        group.bench_function(format!("bands={bands}"), |b| {
            b.iter_batched(
                || DatalinkMenuInput {
                    ctx: EntryContext {
                        source_table: &source,
                        source_row: 0,
                        dl_table_url: Some("https://x.org/dl"),
                        options: &options,
                        do_file_analysis: true,
                    },
                    datalink_table: &table,
                    base_title: Some("obs1"),
                    algorithm: ParsingAlgorithm::UseAll,
                    additional_service_menu: Vec::new(),
                },
                |input| black_box(process_datalink_table(input, &NoMemory)),
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_datalink_menu);
criterion_main!(benches);
