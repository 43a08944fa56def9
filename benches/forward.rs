use criterion::{Criterion, black_box, criterion_group, criterion_main};
use upres::{Config, Model, RawTensor};

fn fast_config(image_size: usize) -> Config {
    Config {
        scale: 2,
        radius: 1,
        padding: 4,
        batch: 1,
        image_size,
        label_size: (image_size - 4) * 2,
        images: RawTensor::randn(&[1, 1, image_size, image_size]),
    }
}

fn bench_forward(c: &mut Criterion) {
    c.bench_function("fast_preset_forward_16x16", |b| {
        b.iter(|| {
            let mut model = Model::new(fast_config(16));
            black_box(model.model(true).unwrap())
        })
    });
}

fn bench_loss(c: &mut Criterion) {
    let model = Model::new(fast_config(16));
    let y = RawTensor::randn(&[1, 1, 24, 24]);
    let x = RawTensor::randn(&[1, 1, 24, 24]);

    c.bench_function("edge_loss_24x24", |b| {
        b.iter(|| black_box(model.loss(&y, &x).unwrap()))
    });
}

criterion_group!(benches, bench_forward, bench_loss);
criterion_main!(benches);
