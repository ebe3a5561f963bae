use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::Value;

fn bench_pretty(c: &mut Criterion) {
    let json_text = r#"
{
  "name": "bench-project",
  "type": "policy-set",
  "description": "Benchmark project",
  "build": [
    {
      "name": "masterfiles",
      "description": "Official CFEngine Masterfiles Policy Framework (MPF).",
      "tags": ["supported", "base"],
      "repo": "https://github.com/cfengine/masterfiles",
      "by": "https://github.com/cfengine",
      "version": "3.21.0",
      "commit": "379c69aa71ab3069b2ef1c0cca526192fa77b864",
      "added_by": "cfbs add",
      "steps": ["run ./prepare.sh -y", "copy ./ ./"]
    },
    {
      "name": "autorun",
      "description": "Enable autorun functionality.",
      "tags": ["supported", "management"],
      "repo": "https://github.com/cfengine/modules",
      "by": "https://github.com/olehermanse",
      "version": "1.0.1",
      "commit": "c3b7329b240cf7ad062a0a64ee8b607af2cb912a",
      "subdirectory": "management/autorun",
      "added_by": "cfbs add",
      "steps": ["json def.json def.json"]
    }
  ]
}
"#;
    let value: Value = serde_json::from_str(json_text).unwrap();

    c.bench_function("pretty_sorted", |b| {
        b.iter(|| {
            let _out = cfbs_core::pretty::pretty_sorted(black_box(&value));
        })
    });
}

criterion_group!(benches, bench_pretty);
criterion_main!(benches);
