use std::path::Path;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use vsxrelay_core::config::{resolve, ConfigLayer};
use vsxrelay_core::ExtensionSource;

fn bench_config_parse(c: &mut Criterion) {
    let text = r#"
# shared workstation defaults
[vsxr]
output-dir = ~/vsix
extensions = ms-python.python, rust-lang.rust-analyzer; redhat.vscode-yaml
ssh-host = ops@build-box:2222
keep = yes
dest-editor = insiders
remote-dir = "/var/tmp/vsxr"
"#;

    c.bench_function("parse_key_values", |b| {
        b.iter(|| {
            let _layer = ConfigLayer::parse_key_values(black_box(text), Path::new(".vsxrrc")).unwrap();
        })
    });

    let file = ConfigLayer::parse_key_values(text, Path::new(".vsxrrc")).unwrap();
    c.bench_function("resolve_and_split", |b| {
        b.iter(|| {
            let effective = resolve(Some("update"), ConfigLayer::default(), Some(file.clone())).unwrap();
            let _source = ExtensionSource::from_value(black_box(&effective.extensions));
        })
    });
}

criterion_group!(benches, bench_config_parse);
criterion_main!(benches);
