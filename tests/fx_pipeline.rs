use deepfry::FryParams;
use deepfry::fx::{contrast_factor, deep_fry, posterize_step};

fn opaque(pixels: &[[u8; 3]]) -> Vec<u8> {
    pixels
        .iter()
        .flat_map(|&[r, g, b]| [r, g, b, 255])
        .collect()
}

#[test]
fn posterize_step_endpoints() {
    assert_eq!(posterize_step(0.0), 48);
    assert_eq!(posterize_step(100.0), 8);
}

#[test]
fn neutral_params_produce_only_the_warm_push() {
    // The canonical check: a 2x2 all-gray frame gains +12 red and +3 green,
    // blue and alpha untouched.
    let mut buf = opaque(&[[128, 128, 128]; 4]);
    deep_fry(&mut buf, 2, 2, &FryParams::neutral(), 99).unwrap();
    for px in buf.chunks_exact(4) {
        assert_eq!(px, &[140, 131, 128, 255]);
    }
}

#[test]
fn contrast_pushes_values_away_from_midpoint() {
    let mut buf = opaque(&[[200, 128, 60]]);
    let params = FryParams {
        contrast: 20.0,
        ..FryParams::neutral()
    };
    deep_fry(&mut buf, 1, 1, &params, 0).unwrap();

    let cf = contrast_factor(20.0);
    let expect = |v: f64| (cf * (v - 128.0) + 128.0).clamp(0.0, 255.0);
    // Saturation at 100 is a no-op, so only contrast and the warm push act.
    assert_eq!(buf[0], (expect(200.0) + 12.0).round() as u8);
    assert_eq!(buf[1], (expect(128.0) + 3.0).round() as u8);
    assert_eq!(buf[2], expect(60.0).round() as u8);
    assert_eq!(buf[3], 255);
}

#[test]
fn oversaturation_spreads_channels_from_average() {
    let mut buf = opaque(&[[100, 150, 200]]);
    let params = FryParams {
        saturation: 200.0,
        ..FryParams::neutral()
    };
    deep_fry(&mut buf, 1, 1, &params, 0).unwrap();
    // avg 150: r -> 50, g -> 150, b -> 250, then the warm push.
    assert_eq!(&buf, &[62, 153, 250, 255]);
}

#[test]
fn sharpen_after_quantization_sees_flat_tiles() {
    // One hot pixel inside a tile. Pixelation flattens the tile before the
    // sharpen pass, so the convolution sees a uniform image and must change
    // nothing; sharpening the pre-pixelation impulse would bleed.
    let mut buf = opaque(&[[40, 40, 40]; 16]);
    let hot = (1 * 4 + 1) * 4;
    buf[hot] = 250;
    buf[hot + 1] = 250;
    buf[hot + 2] = 250;

    let params = FryParams {
        crush: 30.0, // block 4: the whole 4x4 frame is one tile
        sharpen: 100.0,
        ..FryParams::neutral()
    };
    deep_fry(&mut buf, 4, 4, &params, 0).unwrap();

    let first: [u8; 4] = buf[0..4].try_into().unwrap();
    for px in buf.chunks_exact(4) {
        assert_eq!(px, &first);
    }
}

#[test]
fn pipeline_is_deterministic_for_a_seed() {
    let src = opaque(&[[30, 90, 150]; 64]);
    // Grain only: no quantization to swallow the seed difference.
    let params = FryParams {
        noise: 100.0,
        ..FryParams::neutral()
    };

    let mut a = src.clone();
    let mut b = src.clone();
    deep_fry(&mut a, 8, 8, &params, 1234).unwrap();
    deep_fry(&mut b, 8, 8, &params, 1234).unwrap();
    assert_eq!(a, b);

    let mut c = src.clone();
    deep_fry(&mut c, 8, 8, &params, 1235).unwrap();
    assert_ne!(a, c);
}

#[test]
fn alpha_is_never_modified() {
    let mut buf: Vec<u8> = (0u16..64)
        .flat_map(|i| [i as u8, (i * 3) as u8, (i * 5) as u8, (i * 7) as u8])
        .collect();
    let alphas: Vec<u8> = buf.chunks_exact(4).map(|px| px[3]).collect();

    deep_fry(&mut buf, 4, 4, &FryParams::default(), 5).unwrap();
    let after: Vec<u8> = buf.chunks_exact(4).map(|px| px[3]).collect();
    assert_eq!(alphas, after);
}

#[test]
fn buffer_dimensions_are_preserved_and_checked() {
    let mut ok = vec![0u8; 4 * 6];
    assert!(deep_fry(&mut ok, 3, 2, &FryParams::default(), 0).is_ok());
    assert_eq!(ok.len(), 24);

    let mut bad = vec![0u8; 20];
    assert!(deep_fry(&mut bad, 3, 2, &FryParams::default(), 0).is_err());
}
