//! Flatten an exported scene into one image, as seen from a parallax
//! offset.
//!
//! Reads the `scene.json` manifest and textures written by
//! `papercut-bench --out-dir`, shifts every panel and shadow in
//! proportion to its depth, and composites them back to front.

use std::path::{Path, PathBuf};

use clap::Parser;
use image::{Rgba, RgbaImage};
use papercut_io::{SceneManifest, read_manifest};
use tiny_skia::{ColorU8, FilterQuality, Pixmap, PixmapPaint, Transform};
use tracing_subscriber::EnvFilter;

/// Render an exported papercut scene from a parallax offset.
#[derive(Parser)]
#[command(version)]
struct Args {
    /// Directory containing `scene.json` and the panel textures.
    scene_dir: PathBuf,

    /// Output image path (PNG recommended).
    #[arg(short, long)]
    output: PathBuf,

    /// Viewer offset as "X,Y", each in -1..1 (e.g. "0.5,-0.25" looks
    /// from the right and slightly below).
    #[arg(long, value_name = "X,Y", default_value = "0,0", allow_hyphen_values = true)]
    parallax: String,

    /// Pixels of shift per world unit of depth at full offset.
    #[arg(long, default_value_t = 40.0)]
    strength: f32,

    /// Output side length in pixels. Defaults to the texture size.
    #[arg(long)]
    size: Option<u32>,

    /// Background color as "R,G,B".
    #[arg(long, value_name = "R,G,B", default_value = "255,255,255")]
    background: String,

    /// Log progress (overridden by `RUST_LOG`).
    #[arg(long, short)]
    verbose: bool,
}

// ---------------------------------------------------------------------------
// Argument parsing
// ---------------------------------------------------------------------------

/// Viewer offset from the parallax collaborator.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Parallax {
    x: f32,
    y: f32,
}

impl Parallax {
    /// Parse `--parallax "X,Y"`.
    fn parse(s: &str) -> Result<Self, String> {
        let (x_str, y_str) = s
            .split_once(',')
            .ok_or_else(|| format!("parallax must be 'X,Y', got: '{s}'"))?;

        let x: f32 = x_str
            .trim()
            .parse()
            .map_err(|e| format!("invalid parallax X '{x_str}': {e}"))?;
        let y: f32 = y_str
            .trim()
            .parse()
            .map_err(|e| format!("invalid parallax Y '{y_str}': {e}"))?;

        for v in [x, y] {
            if !(-1.0..=1.0).contains(&v) {
                return Err(format!("parallax components must be within -1..1, got {v}"));
            }
        }
        Ok(Self { x, y })
    }
}

/// Parse `--background "R,G,B"`.
fn parse_rgb(s: &str) -> Result<[u8; 3], String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [r, g, b] = parts.as_slice() else {
        return Err(format!("background must be 'R,G,B', got: '{s}'"));
    };
    let channel = |c: &str| {
        c.parse::<u8>()
            .map_err(|e| format!("invalid color channel '{c}': {e}"))
    };
    Ok([channel(r)?, channel(g)?, channel(b)?])
}

// ---------------------------------------------------------------------------
// Scene flattening via tiny-skia
// ---------------------------------------------------------------------------

/// One texture placed in the scene.
struct Sprite {
    depth: f32,
    /// In-plane offset in texture pixels (x right, y down).
    offset: (f32, f32),
    pixmap: Pixmap,
}

/// Convert a straight-alpha `RgbaImage` into a premultiplied `Pixmap`.
fn to_pixmap(image: &RgbaImage) -> Option<Pixmap> {
    let mut pixmap = Pixmap::new(image.width(), image.height())?;
    for (dst, src) in pixmap.pixels_mut().iter_mut().zip(image.pixels()) {
        let [r, g, b, a] = src.0;
        *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Some(pixmap)
}

/// Convert a premultiplied `Pixmap` back to a straight-alpha `RgbaImage`.
fn to_image(pixmap: &Pixmap) -> RgbaImage {
    let mut img = RgbaImage::new(pixmap.width(), pixmap.height());
    for (dst, src) in img.pixels_mut().zip(pixmap.pixels()) {
        let c = src.demultiply();
        *dst = Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
    }
    img
}

/// Load every panel and shadow texture, placed at rest (no parallax).
fn load_sprites(dir: &Path, manifest: &SceneManifest) -> Result<Vec<Sprite>, String> {
    #[allow(clippy::cast_precision_loss)]
    let texture_px = manifest.dimensions.width as f32;
    let mut sprites = Vec::with_capacity(manifest.panels.len() * 2);

    for panel in &manifest.panels {
        let px_per_unit = texture_px / panel.extent;
        let shadow_offset = (
            panel.shadow.shift.x * px_per_unit,
            -panel.shadow.shift.y * px_per_unit,
        );
        for (file, depth, offset) in [
            (&panel.shadow_texture, panel.shadow.depth, shadow_offset),
            (&panel.texture, panel.depth, (0.0, 0.0)),
        ] {
            let path = dir.join(file);
            let image = image::open(&path)
                .map_err(|e| format!("{}: {e}", path.display()))?
                .to_rgba8();
            let pixmap = to_pixmap(&image)
                .ok_or_else(|| format!("{}: texture has zero size", path.display()))?;
            tracing::debug!(path = %path.display(), depth, "loaded texture");
            sprites.push(Sprite {
                depth,
                offset,
                pixmap,
            });
        }
    }
    Ok(sprites)
}

/// Composite `sprites` back to front onto a `size`×`size` canvas.
///
/// Each sprite moves by `parallax × depth × strength` texture pixels, so
/// nearer layers slide further than distant ones. Sprites are drawn in
/// ascending depth: the camera sits on the positive Z axis.
fn render(
    sprites: &mut [Sprite],
    texture_size: u32,
    size: u32,
    parallax: Parallax,
    strength: f32,
    background: [u8; 3],
) -> Option<Pixmap> {
    let mut canvas = Pixmap::new(size, size)?;
    let [r, g, b] = background;
    canvas.fill(tiny_skia::Color::from_rgba8(r, g, b, 255));

    sprites.sort_by(|a, b| a.depth.total_cmp(&b.depth));

    #[allow(clippy::cast_precision_loss)]
    let scale = size as f32 / texture_size.max(1) as f32;
    let paint = PixmapPaint {
        quality: FilterQuality::Bilinear,
        ..PixmapPaint::default()
    };

    for sprite in &*sprites {
        let dx = parallax.x.mul_add(sprite.depth * strength, sprite.offset.0);
        let dy = (-parallax.y).mul_add(sprite.depth * strength, sprite.offset.1);
        tracing::trace!(depth = sprite.depth, dx, dy, "drawing sprite");
        let transform = Transform::from_scale(scale, scale).pre_translate(dx, dy);
        canvas.draw_pixmap(0, 0, sprite.pixmap.as_ref(), &paint, transform, None);
    }
    Some(canvas)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let default = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let parallax = Parallax::parse(&args.parallax).map_err(|e| format!("--parallax: {e}"))?;
    let background = parse_rgb(&args.background).map_err(|e| format!("--background: {e}"))?;

    eprintln!("Reading scene from {}", args.scene_dir.display());
    let manifest = read_manifest(&args.scene_dir)?;
    let texture_size = manifest.dimensions.width;
    let size = args.size.unwrap_or(texture_size);

    let mut sprites = load_sprites(&args.scene_dir, &manifest)?;
    eprintln!(
        "Panels: {}, skipped: {}, texture: {texture_size}px, output: {size}px",
        manifest.panels.len(),
        manifest.skipped.len(),
    );
    eprintln!(
        "Parallax: ({:.2}, {:.2}), strength: {:.1}px/unit",
        parallax.x, parallax.y, args.strength,
    );

    let canvas = render(
        &mut sprites,
        texture_size,
        size,
        parallax,
        args.strength,
        background,
    )
    .ok_or("output size must be non-zero")?;
    tracing::info!(sprites = sprites.len(), size, "rendered scene");

    eprintln!("Saving to {}", args.output.display());
    to_image(&canvas).save(&args.output)?;

    eprintln!("Done.");
    Ok(())
}
