use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tunnel_driver_dns::builders;
use tunnel_driver_dns::dns::Question;
use tunnel_driver_dns::{
    Codec, Driver, DriverConfig, NameBudget, RecordType, SequenceRandomness, SinkError,
    ThreadRandomness,
};
use std::sync::Arc;

/// Build a full-size reply for every supported record type
fn bench_builders(c: &mut Criterion) {
    let mut group = c.benchmark_group("builders");
    let budget = NameBudget::new(None, Some("tunnel.example.com".to_string()), 63, Codec::Hex).unwrap();

    for rtype in builders::SUPPORTED_TYPES {
        let builder = builders::for_type(rtype, budget.clone(), &ThreadRandomness).unwrap();
        let data = vec![0x5a; builder.max_length()];
        group.throughput(Throughput::Bytes(data.len() as u64));

        group.bench_with_input(BenchmarkId::from_parameter(rtype), &data, |b, data| {
            b.iter(|| builder.build(black_box(data)).unwrap());
        });
    }

    group.finish();
}

/// Budget arithmetic plus name encoding, across segment lengths
fn bench_name_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("name_encoding");

    for codec in Codec::ALL {
        for max_subdomain_length in [1, 16, 63] {
            let budget = NameBudget::new(
                Some("abc".to_string()),
                None,
                max_subdomain_length,
                codec,
            )
            .unwrap();
            let data = vec![0xa5; budget.max_length()];

            group.bench_with_input(
                BenchmarkId::new(codec.name(), max_subdomain_length),
                &data,
                |b, data| {
                    b.iter(|| budget.encode_name(black_box(data)).unwrap());
                },
            );
        }
    }

    group.finish();
}

fn bench_codec_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec_decode");
    let data = vec![0x42; 120];

    for codec in Codec::ALL {
        let encoded = codec.encode(&data);
        group.throughput(Throughput::Bytes(encoded.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(codec), &encoded, |b, encoded| {
            b.iter(|| codec.decode(black_box(encoded)).unwrap());
        });
    }

    group.finish();
}

/// One question end to end, without the socket
fn bench_handle_question(c: &mut Criterion) {
    let driver = Driver::with_randomness(
        &DriverConfig::default(),
        Arc::new(SequenceRandomness::new(vec![0])),
    )
    .unwrap();
    let echo = |data: &[u8], max_length: usize| -> Result<Option<Vec<u8>>, SinkError> {
        Ok(Some(data.iter().copied().take(max_length).collect()))
    };
    driver
        .add_domain("tunnel.example.com", Arc::new(echo), Codec::Hex)
        .unwrap();

    let question = Question::new("48656c6c6f2c20776f726c6421.tunnel.example.com", RecordType::Cname);
    c.bench_function("handle_question_cname", |b| {
        b.iter(|| driver.handle_question(black_box(&question)).unwrap());
    });
}

criterion_group!(
    benches,
    bench_builders,
    bench_name_encoding,
    bench_codec_decode,
    bench_handle_question
);
criterion_main!(benches);
