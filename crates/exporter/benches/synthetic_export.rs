// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for planning and writing a synthetic UNet export.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use exporter::{ExportConfig, Exporter, LeafEncoding};
use model_ir::{synthetic_unet, SyntheticConfig, UnetVariant};

fn config(variant: UnetVariant) -> ExportConfig {
    ExportConfig {
        variant,
        head_dim: 8,
        ..Default::default()
    }
}

fn stub(variant: UnetVariant) -> model_ir::InMemorySource {
    synthetic_unet(
        variant,
        &SyntheticConfig {
            channels: 32,
            ..Default::default()
        },
    )
}

fn bench_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_all");
    for variant in [UnetVariant::Base, UnetVariant::Refiner] {
        let source = stub(variant);
        let exporter = Exporter::new(config(variant)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(variant), &source, |b, s| {
            b.iter(|| exporter.plan_all(s).unwrap())
        });
    }
    group.finish();
}

fn bench_export(c: &mut Criterion) {
    let mut group = c.benchmark_group("export");
    group.sample_size(10);
    for encoding in [LeafEncoding::ShapePrefixed, LeafEncoding::Native] {
        let source = stub(UnetVariant::Base);
        let exporter = Exporter::new(ExportConfig {
            encoding,
            ..config(UnetVariant::Base)
        })
        .unwrap();
        let out = tempfile::tempdir().unwrap();
        group.bench_function(BenchmarkId::from_parameter(format!("{encoding:?}")), |b| {
            b.iter(|| exporter.export(&source, out.path()).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_plan, bench_export);
criterion_main!(benches);
