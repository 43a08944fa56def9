use upres::{Config, Model, NetParams, RawTensor, TensorOps, UpresError};

/// Config with a consistent label size for the given geometry
fn sr_config(batch: usize, image_size: usize, padding: usize, scale: usize, radius: usize) -> Config {
    Config {
        scale,
        radius,
        padding,
        batch,
        image_size,
        label_size: (image_size - padding) * scale,
        images: RawTensor::randn(&[batch, 1, image_size, image_size]),
    }
}

#[test]
fn test_full_preset_output_shape() {
    // 20x20 input, padding 4 (5x5 feature kernel), scale 2: (20-4)*2 = 32
    let mut model = Model::new(sr_config(2, 20, 4, 2, 1));
    let out = model.model(false).unwrap();
    assert_eq!(out.borrow().shape, vec![2, 1, 32, 32]);
    assert!(!model.store().is_empty());
}

#[test]
fn test_fast_preset_output_shape_and_size() {
    let mut full = Model::new(sr_config(1, 20, 4, 2, 1));
    full.model(false).unwrap();

    let mut fast = Model::new(sr_config(1, 20, 4, 2, 1));
    let out = fast.model(true).unwrap();

    assert_eq!(out.borrow().shape, vec![1, 1, 32, 32]);
    // The fast preset is shallower and narrower
    assert!(fast.store().len() < full.store().len());
}

#[test]
fn test_output_scales_with_input() {
    // scale 3, radius 2 (5x5 reconstruction kernel): (12-4)*3 = 24
    let mut model = Model::new(sr_config(1, 12, 4, 3, 2));
    let out = model.model(true).unwrap();
    assert_eq!(out.borrow().shape, vec![1, 1, 24, 24]);
}

#[test]
fn test_disabled_shrink_skips_both_stages() {
    let mut model = Model::new(sr_config(1, 12, 4, 2, 1));
    let out = model
        .build(NetParams { d: 16, s: 0, m: 2, r: 1 })
        .unwrap();

    assert_eq!(out.borrow().shape, vec![1, 1, 16, 16]);
    // Mapping runs at the feature width; no shrink/expand parameters exist
    assert!(
        model
            .store()
            .names()
            .all(|n| !n.starts_with("shrink/") && !n.starts_with("expand/"))
    );
}

#[test]
fn test_mapping_weights_shared_across_repetitions() {
    let net = NetParams { d: 8, s: 4, m: 2, r: 1 };
    let mut once = Model::new(sr_config(1, 12, 4, 2, 1));
    once.build(net).unwrap();

    let mut twice = Model::new(sr_config(1, 12, 4, 2, 1));
    let out = twice.build(NetParams { r: 2, ..net }).unwrap();

    // A second repetition reuses the same store entries instead of creating
    // its own copies
    assert_eq!(once.store().len(), twice.store().len());

    // Both repetitions feed the same weight tensor, so its gradient
    // accumulates across them
    out.sum().backward();
    let w3 = twice.store().get("mapping/w3").unwrap();
    assert!(w3.grad().is_some());
}

#[test]
fn test_loss_of_identical_batches_is_zero() {
    let model = Model::new(sr_config(1, 12, 4, 2, 1));
    let batch = RawTensor::randn(&[2, 1, 12, 12]);
    let loss = model.loss(&batch, &batch).unwrap();
    assert_eq!(loss.borrow().shape, vec![1]);
    assert_eq!(loss.borrow().data, vec![0.0]);
}

#[test]
fn test_loss_penalizes_differences() {
    let model = Model::new(sr_config(1, 12, 4, 2, 1));

    // Checkerboard reference, flat prediction
    let mut data = Vec::with_capacity(64);
    for y in 0..8 {
        for x in 0..8 {
            data.push(if (x + y) % 2 == 0 { 0.2 } else { 0.8 });
        }
    }
    let y = RawTensor::from_vec(data, &[1, 1, 8, 8]);
    let x = RawTensor::zeros(&[1, 1, 8, 8]);
    x.borrow_mut().requires_grad = true;

    let loss = model.loss(&y, &x).unwrap();
    assert!(loss.borrow().data[0] > 0.0);

    loss.backward();
    let grad = x.grad().expect("prediction should receive a gradient");
    assert!(grad.iter().all(|g| g.is_finite()));
    assert!(grad.iter().any(|&g| g != 0.0));
}

#[test]
fn test_loss_rejects_mismatched_shapes() {
    let model = Model::new(sr_config(1, 12, 4, 2, 1));
    let y = RawTensor::zeros(&[1, 1, 8, 8]);
    let x = RawTensor::zeros(&[1, 1, 6, 6]);
    assert!(matches!(
        model.loss(&y, &x),
        Err(UpresError::ShapeMismatch { .. })
    ));

    let rgb = RawTensor::zeros(&[1, 3, 8, 8]);
    assert!(matches!(
        model.loss(&rgb, &rgb),
        Err(UpresError::ChannelMismatch { .. })
    ));
}

#[test]
fn test_multichannel_input_is_a_typed_error() {
    let config = Config {
        scale: 2,
        radius: 1,
        padding: 4,
        batch: 1,
        image_size: 12,
        label_size: 16,
        images: RawTensor::randn(&[1, 3, 12, 12]),
    };
    let mut model = Model::new(config);
    assert!(matches!(
        model.model(true),
        Err(UpresError::ChannelMismatch {
            stage: "features",
            expected: 1,
            actual: 3,
        })
    ));
}

#[test]
fn test_oversized_feature_kernel_is_a_typed_error() {
    // padding 6 means a 7x7 valid kernel, which cannot fit a 4x4 input
    let config = Config {
        scale: 2,
        radius: 1,
        padding: 6,
        batch: 1,
        image_size: 4,
        label_size: 0,
        images: RawTensor::randn(&[1, 1, 4, 4]),
    };
    let mut model = Model::new(config);
    assert!(matches!(
        model.model(true),
        Err(UpresError::KernelTooLarge { kernel: 7, .. })
    ));
}

#[test]
fn test_input_must_match_configured_geometry() {
    let config = Config {
        scale: 2,
        radius: 1,
        padding: 4,
        batch: 2,
        image_size: 12,
        label_size: 16,
        images: RawTensor::randn(&[1, 1, 12, 12]),
    };
    let mut model = Model::new(config);
    assert!(matches!(
        model.model(true),
        Err(UpresError::InvalidConfig(_))
    ));
}

#[test]
fn test_training_step_reaches_every_parameter() {
    let mut model = Model::new(sr_config(1, 12, 4, 2, 1));
    let out = model.model(true).unwrap();

    let target = RawTensor::randn(&[1, 1, 16, 16]);
    let loss = model.loss(&target, &out).unwrap();
    loss.backward();

    for (name, param) in model.store().names().zip(model.store().parameters()) {
        assert!(
            param.grad().is_some(),
            "parameter {name} did not receive a gradient"
        );
    }

    // An external optimizer clears gradients between steps
    model.store().zero_grad();
    assert!(model.store().parameters().iter().all(|p| p.grad().is_none()));
}
