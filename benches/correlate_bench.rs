use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mptrace::traceroute::correlate_flows;
use mptrace::{CapturedPacket, ProbeBuilder, SentProbe, TracerouteConfig};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::MutableIpv4Packet;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Instant;

const SOURCE: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 2);
const TARGET: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 1);

fn full_run_config() -> TracerouteConfig {
    TracerouteConfig::builder()
        .target("192.0.2.1")
        .npaths(20)
        .max_ttl(30)
        .build()
        .unwrap()
}

fn build_probe_matrix(config: &TracerouteConfig) -> Vec<SentProbe> {
    let builder =
        ProbeBuilder::new(config, IpAddr::V4(SOURCE), IpAddr::V4(TARGET)).unwrap();
    let mut sent = Vec::with_capacity(config.probe_count());
    for path in 0..config.npaths {
        for ttl in config.min_ttl..=config.max_ttl {
            sent.push(SentProbe {
                packet: builder.build(path, ttl).unwrap(),
                sent_at: Instant::now(),
                dispatched: true,
            });
        }
    }
    sent
}

fn wrap_time_exceeded(inner: &[u8], from: Ipv4Addr) -> Vec<u8> {
    let total = 20 + 8 + inner.len();
    let mut buf = vec![0u8; total];
    {
        let mut ip = MutableIpv4Packet::new(&mut buf).unwrap();
        ip.set_version(4);
        ip.set_header_length(5);
        ip.set_total_length(total as u16);
        ip.set_ttl(60);
        ip.set_next_level_protocol(IpNextHeaderProtocols::Icmp);
        ip.set_source(from);
        ip.set_destination(SOURCE);
    }
    buf[20] = 11;
    buf[28..].copy_from_slice(inner);
    buf
}

fn synthetic_captures(sent: &[SentProbe]) -> Vec<CapturedPacket> {
    sent.iter()
        .map(|probe| {
            let from = Ipv4Addr::new(10, probe.packet.path_index, probe.packet.ttl, 1);
            CapturedPacket {
                bytes: wrap_time_exceeded(&probe.packet.bytes, from),
                from: IpAddr::V4(from),
                timestamp: Instant::now(),
            }
        })
        .collect()
}

fn benchmark_probe_build(c: &mut Criterion) {
    let config = full_run_config();

    c.bench_function("build_probe_matrix_20x30", |b| {
        b.iter(|| {
            let sent = build_probe_matrix(black_box(&config));
            black_box(sent.len())
        })
    });
}

fn benchmark_correlation(c: &mut Criterion) {
    let config = full_run_config();
    let sent = build_probe_matrix(&config);
    let captured = synthetic_captures(&sent);

    c.bench_function("correlate_flows_20x30_full", |b| {
        b.iter(|| {
            let flows = correlate_flows(
                black_box(&config),
                IpAddr::V4(TARGET),
                black_box(&sent),
                black_box(&captured),
            );
            black_box(flows.len())
        })
    });
}

fn benchmark_correlation_empty(c: &mut Criterion) {
    let config = full_run_config();
    let sent = build_probe_matrix(&config);

    c.bench_function("correlate_flows_20x30_silent", |b| {
        b.iter(|| {
            let flows = correlate_flows(
                black_box(&config),
                IpAddr::V4(TARGET),
                black_box(&sent),
                &[],
            );
            black_box(flows.len())
        })
    });
}

criterion_group!(
    benches,
    benchmark_probe_build,
    benchmark_correlation,
    benchmark_correlation_empty
);
criterion_main!(benches);
