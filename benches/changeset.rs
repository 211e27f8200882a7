//! Benchmarks for the reconcile-and-save path.
//!
//! These benchmarks measure how long it takes to load pin files of various
//! sizes into a Config Store, update them from a build's packages and turn
//! the result into git changes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use insertion_tool::changeset::build_change;
use insertion_tool::filesystem::MemoryFS;
use insertion_tool::reconcile::{reconcile_package_files, PackageRules};
use insertion_tool::store::{ConfigStore, StorePaths};
use std::path::PathBuf;

const CONFIG_PATH: &str = ".corext/Configs/default.config";

fn generate_pins(count: usize) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\r\n<packages>\r\n");
    for i in 0..count {
        xml.push_str(&format!(
            "  <package id=\"Component.Package{}\" version=\"1.0.{}\" />\r\n",
            i, i
        ));
    }
    xml.push_str("</packages>\r\n");
    xml
}

fn generate_files(count: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|i| PathBuf::from(format!("DevDivPackages/Component.Package{}.2.0.{}.nupkg", i, i)))
        .collect()
}

fn paths() -> StorePaths {
    StorePaths {
        config_path: CONFIG_PATH.to_string(),
        legacy_props_path: None,
        components_paths: Vec::new(),
    }
}

fn bench_build_change(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_change");

    for count in [10, 100, 1000] {
        let original = generate_pins(count);
        let same_lf = original.replace("\r\n", "\n");
        let changed = original.replace("version=\"1.0.", "version=\"2.0.");

        group.bench_with_input(
            BenchmarkId::new("line_endings_only", count),
            &(original.clone(), same_lf),
            |b, (original, new)| {
                b.iter(|| build_change(CONFIG_PATH, black_box(Some(original.as_str())), black_box(Some(new.as_str()))))
            },
        );
        group.bench_with_input(
            BenchmarkId::new("edited", count),
            &(original, changed),
            |b, (original, new)| {
                b.iter(|| build_change(CONFIG_PATH, black_box(Some(original.as_str())), black_box(Some(new.as_str()))))
            },
        );
    }

    group.finish();
}

fn bench_store_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_round_trip");
    let rules = PackageRules::default();

    for count in [10, 100, 500] {
        let mut repo = MemoryFS::new();
        repo.add_file_string(CONFIG_PATH, &generate_pins(count))
            .expect("add pin file");
        let files = generate_files(count);

        group.bench_with_input(BenchmarkId::new("load", count), &repo, |b, repo| {
            b.iter(|| ConfigStore::load(black_box(repo), "HEAD", &paths()))
        });

        group.bench_with_input(
            BenchmarkId::new("reconcile_and_save", count),
            &(repo, files),
            |b, (repo, files)| {
                b.iter(|| {
                    let mut store = ConfigStore::load(repo, "HEAD", &paths()).expect("load store");
                    reconcile_package_files(black_box(files), &mut store, &rules)
                        .expect("reconcile");
                    store.save_config().expect("save")
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_build_change, bench_store_round_trip);
criterion_main!(benches);
