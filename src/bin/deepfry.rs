use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};

use deepfry::assets::decode::decode_image;
use deepfry::fx::Rng64;
use deepfry::{Canvas, Engine, EngineConfig, FsFetcher, FryParams, Manifest, Rgba8Premul};

#[derive(Parser, Debug)]
#[command(name = "deepfry", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan an assets directory and write a manifest.json.
    Manifest(ManifestArgs),
    /// Composite trait layers from a manifest into a PNG.
    Compose(ComposeArgs),
    /// Deep-fry a single image into a PNG.
    Fry(FryArgs),
}

#[derive(Parser, Debug)]
struct ManifestArgs {
    /// Assets directory (one subdirectory per category).
    #[arg(long)]
    assets: PathBuf,

    /// Output manifest path. Defaults to `<assets>/manifest.json`.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct ComposeArgs {
    /// Input manifest JSON.
    #[arg(long)]
    manifest: PathBuf,

    /// Assets root for resolving manifest sources. Defaults to the
    /// manifest's directory.
    #[arg(long)]
    assets_root: Option<PathBuf>,

    /// Trait picks as `category=item-name`, repeatable.
    #[arg(long = "pick")]
    picks: Vec<String>,

    /// Pick a random item for every category instead.
    #[arg(long, default_value_t = false)]
    random: bool,

    /// Seed for `--random`.
    #[arg(long, default_value_t = 0)]
    random_seed: u64,

    /// Extra image composited as an uploaded base layer.
    #[arg(long)]
    upload: Option<PathBuf>,

    /// Image appended as a locked watermark overlay.
    #[arg(long)]
    watermark: Option<PathBuf>,

    /// Canonical category stacking order, comma-separated, bottom first.
    #[arg(long)]
    layer_order: Option<String>,

    /// Clip the output to a centered circle.
    #[arg(long, default_value_t = false)]
    mask_circle: bool,

    /// Transparent base instead of the background color.
    #[arg(long, default_value_t = false)]
    transparent: bool,

    /// Background color (#RRGGBB or #RRGGBBAA).
    #[arg(long, default_value = "#ffffff")]
    background: String,

    #[arg(long, default_value_t = 600)]
    width: u32,
    #[arg(long, default_value_t = 600)]
    height: u32,

    /// Run the deep-fry pipeline over the composited frame.
    #[arg(long, default_value_t = false)]
    fry: bool,

    #[command(flatten)]
    params: ParamArgs,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct FryArgs {
    /// Input image.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Background color (#RRGGBB or #RRGGBBAA).
    #[arg(long, default_value = "#1a1a1a")]
    background: String,

    #[arg(long, default_value_t = 512)]
    width: u32,
    #[arg(long, default_value_t = 512)]
    height: u32,

    #[command(flatten)]
    params: ParamArgs,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Args, Debug)]
struct ParamArgs {
    /// Grain strength, 0..100.
    #[arg(long, default_value_t = 35.0)]
    noise: f64,

    /// Contrast amount, roughly -50..50.
    #[arg(long, default_value_t = 20.0)]
    contrast: f64,

    /// Saturation percent (100 = unchanged).
    #[arg(long, default_value_t = 160.0)]
    saturation: f64,

    /// Sharpen strength, 0..100.
    #[arg(long, default_value_t = 35.0)]
    sharpen: f64,

    /// Compression crush, 0..100.
    #[arg(long, default_value_t = 55.0)]
    crush: f64,

    /// Grain seed.
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

impl ParamArgs {
    fn to_params(&self) -> FryParams {
        FryParams {
            noise: self.noise,
            contrast: self.contrast,
            saturation: self.saturation,
            sharpen: self.sharpen,
            crush: self.crush,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Manifest(args) => cmd_manifest(args),
        Command::Compose(args) => cmd_compose(args),
        Command::Fry(args) => cmd_fry(args),
    }
}

fn cmd_manifest(args: ManifestArgs) -> anyhow::Result<()> {
    let manifest = Manifest::scan_dir(&args.assets)?;
    let out = args
        .out
        .unwrap_or_else(|| args.assets.join("manifest.json"));
    std::fs::write(&out, manifest.to_json()? + "\n")
        .with_context(|| format!("write manifest '{}'", out.display()))?;
    eprintln!("wrote {}", out.display());
    Ok(())
}

fn cmd_compose(args: ComposeArgs) -> anyhow::Result<()> {
    let manifest = Manifest::from_path_lenient(&args.manifest);
    let assets_root = args.assets_root.clone().unwrap_or_else(|| {
        args.manifest
            .parent()
            .unwrap_or_else(|| std::path::Path::new("."))
            .to_path_buf()
    });

    let mut cfg = EngineConfig::new(Canvas::new(args.width, args.height)?);
    cfg.background = Rgba8Premul::from_hex(&args.background)?;
    cfg.transforms_enabled = false;
    if let Some(order) = &args.layer_order {
        cfg.layer_order = Some(
            order
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        );
    }
    let mut engine = Engine::new(cfg)?;

    for pick in &args.picks {
        let (category, item_name) = pick
            .split_once('=')
            .with_context(|| format!("pick '{pick}' must be category=item-name"))?;
        let category_entry = manifest
            .category(category)
            .with_context(|| format!("unknown category '{category}'"))?;
        let item = category_entry
            .items
            .iter()
            .find(|i| i.name == item_name)
            .with_context(|| format!("unknown item '{item_name}' in category '{category}'"))?;
        engine.set_category_asset(category, &item.src, &item.name)?;
    }

    if args.random {
        let mut rng = Rng64::new(args.random_seed);
        for cat in &manifest.categories {
            if cat.items.is_empty() {
                continue;
            }
            let item = &cat.items[(rng.next_u64() % cat.items.len() as u64) as usize];
            engine.set_category_asset(&cat.name, &item.src, &item.name)?;
        }
    }

    let mut fetcher = FsFetcher::new(&assets_root);
    engine.pump_assets(&mut fetcher);

    if let Some(path) = &args.upload {
        let bytes =
            std::fs::read(path).with_context(|| format!("read upload '{}'", path.display()))?;
        engine.set_image_layer("upload", decode_image(&bytes)?, &file_stem(path))?;
    }
    if let Some(path) = &args.watermark {
        let bytes =
            std::fs::read(path).with_context(|| format!("read watermark '{}'", path.display()))?;
        engine.add_locked_layer(decode_image(&bytes)?, &file_stem(path));
    }

    engine.set_mask_circle(args.mask_circle);
    engine.set_transparent_background(args.transparent);

    if args.fry {
        let params = args.params.to_params();
        let seed = args.params.seed;
        engine.set_post_process(Some(Box::new(move |data, w, h| {
            deepfry::deep_fry(data, w, h, &params, seed)
        })));
    }

    engine.save_png(&args.out)?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_fry(args: FryArgs) -> anyhow::Result<()> {
    let bytes = std::fs::read(&args.in_path)
        .with_context(|| format!("read input '{}'", args.in_path.display()))?;
    let image = decode_image(&bytes)?;

    let mut cfg = EngineConfig::new(Canvas::new(args.width, args.height)?);
    cfg.background = Rgba8Premul::from_hex(&args.background)?;
    cfg.transforms_enabled = false;
    // The fry tool letterboxes the image edge-to-edge, no margin.
    cfg.fit_scale_factor = 1.0;
    let mut engine = Engine::new(cfg)?;

    engine.set_image_layer("upload", image, &file_stem(&args.in_path))?;

    let params = args.params.to_params();
    let seed = args.params.seed;
    engine.set_post_process(Some(Box::new(move |data, w, h| {
        deepfry::deep_fry(data, w, h, &params, seed)
    })));

    engine.save_png(&args.out)?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn file_stem(path: &std::path::Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string())
}
