use criterion::{criterion_group, criterion_main, Criterion};
use mixsearch_core::{Analyzer, Language};

const SAMPLE: &str = "Le musée de la plongée sous-marine présente l’histoire des scaphandriers, \
    des épaves du littoral et des récifs coralliens. Les visiteurs découvrent ensuite \
    l'aquarium, les maquettes de sous-marins et une salle consacrée à la culture maritime.";

fn bench_analyze(c: &mut Criterion) {
    let text = SAMPLE.repeat(64);
    let fr = Analyzer::new(Language::French);
    c.bench_function("analyze_french", |b| b.iter(|| fr.analyze(&text)));
    let en = Analyzer::new(Language::English);
    c.bench_function("analyze_english", |b| b.iter(|| en.analyze(&text)));
}

criterion_group!(benches, bench_analyze);
criterion_main!(benches);
