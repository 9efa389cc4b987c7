#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use image::Rgba;
use papercut_io::{
    HttpFetcher, export_scene, open_session, read_manifest, write_layers, write_png,
};
use papercut_pipeline::data_url::encode_png_data_url;
use papercut_pipeline::{ResampleFilter, RgbaImage, SceneConfig, SkipReason};

/// Fresh scratch directory under the system temp dir.
fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("papercut-io-{}-{name}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn config() -> SceneConfig {
    SceneConfig {
        working_resolution: 16,
        resample_filter: ResampleFilter::Nearest,
        ..SceneConfig::default()
    }
}

#[allow(clippy::cast_possible_truncation)]
fn photo() -> RgbaImage {
    RgbaImage::from_fn(32, 32, |x, y| Rgba([x as u8 * 8, y as u8 * 8, 128, 255]))
}

/// 32x32 mask covering columns `x0..x1`.
fn band(x0: u32, x1: u32) -> RgbaImage {
    RgbaImage::from_fn(32, 32, |x, _| {
        if (x0..x1).contains(&x) {
            Rgba([255, 255, 255, 255])
        } else {
            Rgba([0, 0, 0, 255])
        }
    })
}

/// Write three masks (the middle one empty) and an envelope that refers
/// to them by relative path.
fn write_fixture(dir: &Path) -> PathBuf {
    write_png(&dir.join("mask_0.png"), &band(0, 8)).unwrap();
    write_png(&dir.join("mask_1.png"), &band(0, 0)).unwrap();
    write_png(&dir.join("mask_2.png"), &band(16, 32)).unwrap();

    let response = serde_json::json!({
        "success": true,
        "masks": [{
            "individual_masks": ["mask_0.png", "mask_1.png", "mask_2.png"],
            "combined_mask": "combined.png",
        }],
        "originalImage": encode_png_data_url(&photo()).unwrap(),
    });
    let path = dir.join("response.json");
    std::fs::write(&path, serde_json::to_vec(&response).unwrap()).unwrap();
    path
}

#[tokio::test]
async fn build_skips_empty_mask_and_keeps_depths() {
    let dir = scratch("build");
    let response = write_fixture(&dir);
    let fetcher = HttpFetcher::new(Duration::from_secs(5))
        .unwrap()
        .with_base_dir(&dir);

    let session = open_session(config(), &response, None).await.unwrap();
    assert_eq!(session.source().dimensions(), (32, 32));

    let scene = session.build(&fetcher).await;
    assert_eq!(scene.panels.len(), 2);
    assert!(scene.panels[0].depth.abs() < 1e-6);
    assert!((scene.panels[1].depth - 0.6).abs() < 1e-6);
    assert_eq!(scene.skipped.len(), 1);
    assert_eq!(scene.skipped[0].reason, SkipReason::Empty);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn merge_then_export_round_trips_manifest() {
    let dir = scratch("export");
    let response = write_fixture(&dir);
    let fetcher = HttpFetcher::new(Duration::from_secs(5))
        .unwrap()
        .with_base_dir(&dir);

    let mut session = open_session(config(), &response, None).await.unwrap();
    let merged = session.merge(0, 2, &fetcher).await.unwrap();
    assert_eq!(session.snapshot().len(), 2);

    let scene = session.build(&fetcher).await;
    assert_eq!(scene.panels.len(), 1);
    let panel = &scene.panels[0];
    assert_eq!(panel.layer_id, merged);
    assert_eq!(panel.index, 1);
    assert!((panel.depth - 0.3).abs() < 1e-6);
    // Columns 0..8 and 16..32 of a 32-wide mask, at 16x16.
    assert_eq!(panel.cutout.foreground_pixels, 12 * 16);

    let out = dir.join("out");
    let manifest = export_scene(&scene, &out).unwrap();
    assert!(out.join(&manifest.panels[0].texture).is_file());
    assert!(out.join(&manifest.panels[0].shadow_texture).is_file());
    assert_eq!(read_manifest(&out).unwrap(), manifest);

    let texture = image::open(out.join(&manifest.panels[0].texture))
        .unwrap()
        .to_rgba8();
    assert_eq!(texture.as_raw(), panel.cutout.texture.as_raw());

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn saved_layers_reopen_with_merge_applied() {
    let dir = scratch("layers");
    let response = write_fixture(&dir);
    let fetcher = HttpFetcher::new(Duration::from_secs(5))
        .unwrap()
        .with_base_dir(&dir);

    let mut session = open_session(config(), &response, None).await.unwrap();
    session.merge(0, 2, &fetcher).await.unwrap();
    let layers = write_layers(&session.snapshot(), &dir.join("saved")).unwrap();

    let image = dir.join("photo.png");
    write_png(&image, &photo()).unwrap();
    let reopened = open_session(config(), &layers, Some(&image)).await.unwrap();
    assert_eq!(reopened.store().len(), 2);

    let scene = reopened.build(&fetcher).await;
    assert_eq!(scene.panels.len(), 1);
    assert_eq!(scene.panels[0].cutout.foreground_pixels, 12 * 16);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn missing_mask_file_is_reported_not_fatal() {
    let dir = scratch("missing");
    let response = write_fixture(&dir);
    std::fs::remove_file(dir.join("mask_2.png")).unwrap();
    let fetcher = HttpFetcher::new(Duration::from_secs(5))
        .unwrap()
        .with_base_dir(&dir);

    let session = open_session(config(), &response, None).await.unwrap();
    let scene = session.build(&fetcher).await;
    assert_eq!(scene.panels.len(), 1);
    assert_eq!(scene.failed_count(), 1);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn failed_response_does_not_open() {
    let dir = scratch("failed");
    let path = dir.join("response.json");
    std::fs::write(&path, br#"{"error": "Segmentation failed"}"#).unwrap();

    let result = open_session(config(), &path, None).await;
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("Segmentation failed"));

    let _ = std::fs::remove_dir_all(&dir);
}
