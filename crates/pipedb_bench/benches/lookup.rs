use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pipedb_core::{BuildConfig, Definitions, PipelineDb, PipelineDbBuilder, Result, ShaderCompiler, StageKind};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::path::Path;

/// Constant-size bytecode so the bench measures layout and lookup only.
struct Blob;

impl ShaderCompiler for Blob {
    fn compile(&mut self, _path: &Path, _stage: StageKind, _defs: &Definitions) -> Result<Vec<u32>> {
        Ok(vec![0x0723_0203; 256])
    }
}

fn build_image(n: usize) -> Vec<u8> {
    let cfg = BuildConfig { data_capacity: 64 << 20, scratch_capacity: 1 << 12, ..Default::default() };
    let mut b = PipelineDbBuilder::new(cfg, Blob);
    let pipelines: Vec<_> = (0..n)
        .map(|i| json!({ "name": format!("mat_{i}"), "shader_files": ["a.vert", "a.frag"] }))
        .collect();
    b.compile_material(&json!({ "pipelines": pipelines }), Path::new("."), Path::new("bench.json"))
        .expect("build");
    b.dump_to_vec().expect("dump")
}

fn bench_lookup(c: &mut Criterion) {
    let img = build_image(10_000);
    let mut db = PipelineDb::new();
    db.load(&img).expect("load");

    let mut rng = StdRng::seed_from_u64(42);
    let names: Vec<String> = (0..1024).map(|_| format!("mat_{}", rng.random_range(0..10_000))).collect();

    c.bench_function("build_1k", |bch| bch.iter(|| black_box(build_image(1_000))));
    c.bench_function("load_10k", |bch| {
        bch.iter(|| {
            let mut db = PipelineDb::new();
            black_box(db.load(&img).expect("load"))
        })
    });
    c.bench_function("lookup", |bch| {
        let mut i = 0;
        bch.iter(|| {
            i = (i + 1) % names.len();
            black_box(db.get(&names[i]).map(|r| r.stage_words(1).map(<[u32]>::len)))
        })
    });
}

criterion_group!(benches, bench_lookup);
criterion_main!(benches);
