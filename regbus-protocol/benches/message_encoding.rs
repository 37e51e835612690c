use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use regbus_protocol::{Command, Reply, fcs, flat_addr, framing};
use std::io::Cursor;

fn bench_command_encoding(c: &mut Criterion) {
    let cmd = Command::Write {
        increment: true,
        sequence: 42,
        addr: flat_addr(3, 100),
        data: vec![0xDEAD_BEEF; 8],
    };
    c.bench_function("encode_write_command", |b| {
        b.iter(|| {
            let mut out = Vec::with_capacity(64);
            black_box(&cmd).write_to(&mut out).unwrap();
            black_box(out)
        })
    });

    let mut wire = Vec::new();
    Reply {
        opcode: regbus_protocol::Opcode::ReadIncrement,
        word_count: 8,
        sequence: 42,
        addr: flat_addr(3, 100),
        data: vec![0x1234_5678; 8],
        status: 0,
    }
    .write_to(&mut wire)
    .unwrap();
    c.bench_function("decode_read_reply", |b| {
        b.iter(|| Reply::from_reader(&mut Cursor::new(black_box(&wire))).unwrap())
    });
}

fn bench_framing(c: &mut Criterion) {
    // Worst case for the escaper: every byte is reserved.
    let hostile = vec![framing::END; 60];
    c.bench_function("slip_encode_hostile", |b| {
        b.iter(|| framing::encode(black_box(&hostile)))
    });

    let frame = framing::encode(&fcs::append_fcs(vec![0xA5; 56], true));
    c.bench_function("deframe_and_verify", |b| {
        b.iter(|| {
            let mut deframer = framing::Deframer::new();
            deframer.extend(black_box(&frame));
            let payload = deframer.next_frame().unwrap();
            fcs::verify_fcs(&payload).unwrap().len()
        })
    });
}

criterion_group!(benches, bench_command_encoding, bench_framing);
criterion_main!(benches);
