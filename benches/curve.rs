use criterion::{black_box, criterion_group, criterion_main, Criterion};

use ipviz::curve::GridCoordinate;
use ipviz::{Address, AddressMapper, CurveMapper, Role, VisualizationState};

fn bench_locate(c: &mut Criterion) {
    let mapper = AddressMapper::new(CurveMapper::new(1024).unwrap(), 12).unwrap();
    let mut raw = 0x0A00_0001u32;
    c.bench_function("locate_address_1024", |b| {
        b.iter(|| {
            raw = raw.wrapping_mul(2_654_435_761).wrapping_add(1);
            black_box(mapper.locate(Address::new(black_box(raw))).unwrap())
        })
    });
}

fn bench_round_trip(c: &mut Criterion) {
    let curve = CurveMapper::new(4096).unwrap();
    let mut index = 0u64;
    c.bench_function("index_round_trip_4096", |b| {
        b.iter(|| {
            index = (index + 7919) % curve.cell_count();
            let coord = curve.index_to_coordinate(black_box(index)).unwrap();
            black_box(curve.coordinate_to_index(coord).unwrap())
        })
    });
}

fn bench_record(c: &mut Criterion) {
    let state = VisualizationState::new(1024);
    let address = Address::new(0xC0A8_0001);
    let mut x = 0u32;
    c.bench_function("record_event_1024", |b| {
        b.iter(|| {
            x = (x + 1) % 1024;
            state.record(GridCoordinate { x, y: x }, Role::Originator, address);
        })
    });
}

criterion_group!(benches, bench_locate, bench_round_trip, bench_record);
criterion_main!(benches);
