use std::io::Cursor;
use std::path::PathBuf;
use std::process::Command;

fn write_png(path: &std::path::Path, w: u32, h: u32, px: [u8; 4]) {
    let data: Vec<u8> = px.repeat((w * h) as usize);
    let img = image::RgbaImage::from_raw(w, h, data).unwrap();
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    std::fs::write(path, buf).unwrap();
}

#[test]
fn cli_fry_writes_png() {
    let dir = PathBuf::from("target").join("cli_smoke");
    std::fs::create_dir_all(&dir).unwrap();

    let in_path = dir.join("in.png");
    let out_path = dir.join("fried.png");
    let _ = std::fs::remove_file(&out_path);
    write_png(&in_path, 16, 16, [128, 128, 128, 255]);

    let status = Command::new(env!("CARGO_BIN_EXE_deepfry"))
        .args([
            "fry",
            "--in",
            in_path.to_str().unwrap(),
            "--out",
            out_path.to_str().unwrap(),
            "--width",
            "64",
            "--height",
            "64",
            "--noise",
            "0",
        ])
        .status()
        .unwrap();

    assert!(status.success());
    let decoded = image::open(&out_path).unwrap().to_rgba8();
    assert_eq!(decoded.dimensions(), (64, 64));
}

#[test]
fn cli_manifest_then_compose_random() {
    let dir = PathBuf::from("target").join("cli_smoke_compose");
    let assets = dir.join("assets");
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(assets.join("base")).unwrap();
    std::fs::create_dir_all(assets.join("hat")).unwrap();
    write_png(&assets.join("base/plain.png"), 8, 8, [50, 100, 150, 255]);
    write_png(&assets.join("hat/cap.png"), 4, 4, [200, 40, 40, 255]);

    let manifest_path = assets.join("manifest.json");
    let status = Command::new(env!("CARGO_BIN_EXE_deepfry"))
        .args(["manifest", "--assets", assets.to_str().unwrap()])
        .status()
        .unwrap();
    assert!(status.success());
    assert!(manifest_path.exists());

    let out_path = dir.join("composed.png");
    let status = Command::new(env!("CARGO_BIN_EXE_deepfry"))
        .args([
            "compose",
            "--manifest",
            manifest_path.to_str().unwrap(),
            "--random",
            "--random-seed",
            "7",
            "--layer-order",
            "base,hat",
            "--width",
            "32",
            "--height",
            "32",
            "--out",
            out_path.to_str().unwrap(),
        ])
        .status()
        .unwrap();

    assert!(status.success());
    let decoded = image::open(&out_path).unwrap().to_rgba8();
    assert_eq!(decoded.dimensions(), (32, 32));
    // The red hat layer lands on top at the center.
    assert_eq!(decoded.get_pixel(16, 16).0, [200, 40, 40, 255]);
}

#[test]
fn cli_compose_pick_by_name() {
    let dir = PathBuf::from("target").join("cli_smoke_pick");
    let assets = dir.join("assets");
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(assets.join("base")).unwrap();
    write_png(&assets.join("base/plain.png"), 8, 8, [50, 100, 150, 255]);

    let manifest_path = assets.join("manifest.json");
    let status = Command::new(env!("CARGO_BIN_EXE_deepfry"))
        .args(["manifest", "--assets", assets.to_str().unwrap()])
        .status()
        .unwrap();
    assert!(status.success());

    let out_path = dir.join("picked.png");
    let status = Command::new(env!("CARGO_BIN_EXE_deepfry"))
        .args([
            "compose",
            "--manifest",
            manifest_path.to_str().unwrap(),
            "--pick",
            "base=plain",
            "--width",
            "16",
            "--height",
            "16",
            "--out",
            out_path.to_str().unwrap(),
        ])
        .status()
        .unwrap();

    assert!(status.success());
    let decoded = image::open(&out_path).unwrap().to_rgba8();
    assert_eq!(decoded.get_pixel(8, 8).0, [50, 100, 150, 255]);
}
