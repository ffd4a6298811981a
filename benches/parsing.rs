use criterion::{criterion_group, criterion_main, Criterion};
use famfile::cursor::LineStream;
use famfile::prelude::*;
use famfile::test_utilities::{
    synthetic_fam, NRANDOM_ALLELES, NRANDOM_INDIVIDUALS, NRANDOM_LOCI,
};

fn bench_read_fam(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_fam");

    // create the test data
    let lines = synthetic_fam(NRANDOM_INDIVIDUALS, NRANDOM_LOCI, NRANDOM_ALLELES);
    let stream: LineStream = lines.into_iter().collect();

    // configure the sample size for the group
    group.sample_size(10);

    group.bench_function("full_parse", |b| {
        b.iter(|| {
            let output = read_fam_lines(&stream, &ReadFamOptions::default()).unwrap();
            output.loci.len()
        });
    });

    group.bench_function("main_section_only", |b| {
        b.iter(|| {
            let mut cursor = stream.cursor();
            let mut report = famfile::reporting::Report::new();
            let main =
                famfile::parsers::main_section::parse_main_section(&mut cursor, &mut report, false)
                    .unwrap();
            main.genotypes.rows.len()
        });
    });
}

criterion_group!(benches, bench_read_fam,);
criterion_main!(benches);
