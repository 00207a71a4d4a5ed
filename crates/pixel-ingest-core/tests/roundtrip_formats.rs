use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use pixel_ingest_core::prelude::*;
use std::io::Cursor;
use std::sync::Arc;

fn pattern(n: u32) -> RgbaImage {
    RgbaImage::from_fn(n, n, |x, y| {
        Rgba([
            (x * 16) as u8,
            (y * 16) as u8,
            ((x + y) * 8) as u8,
            if (x + y) % 2 == 0 { 255 } else { 128 },
        ])
    })
}

fn encode(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format).expect("encode");
    buf.into_inner()
}

fn decode_one(label: &str, bytes: Vec<u8>, codec: Arc<dyn Codec>) -> PixelGrid {
    let report = decode_all(
        vec![DecodeTask::new(label, bytes, codec)],
        IngestConfig::default(),
    )
    .expect("decode_all");
    let mut grids = report.into_grids().expect("no failures");
    grids.remove(0).1
}

#[test]
fn lossless_formats_reproduce_every_pixel() {
    let n = 16;
    let src = pattern(n);
    let registry = CodecRegistry::with_builtin();
    for (key, format) in [
        ("png", ImageFormat::Png),
        ("bmp", ImageFormat::Bmp),
        ("tiff", ImageFormat::Tiff),
    ] {
        let bytes = encode(&DynamicImage::ImageRgba8(src.clone()), format);
        let codec = registry.get(key).expect("builtin codec");
        let grid = decode_one(key, bytes, codec);
        assert_eq!(grid.dimensions(), (n, n), "format={}", key);
        for row in 0..n {
            for col in 0..n {
                assert_eq!(
                    grid.get(row, col),
                    Some(src.get_pixel(col, row)),
                    "format={} row={} col={}",
                    key,
                    row,
                    col
                );
            }
        }
    }
}

#[test]
fn gif_reproduces_an_opaque_palette_image() {
    // 64 colors, fully opaque: fits a GIF palette without quantization
    let src = RgbaImage::from_fn(8, 8, |x, y| Rgba([(x * 32) as u8, (y * 32) as u8, 0, 255]));
    let bytes = encode(&DynamicImage::ImageRgba8(src.clone()), ImageFormat::Gif);
    let codec = CodecRegistry::with_builtin().get("gif").expect("builtin codec");
    let grid = decode_one("anim.gif", bytes, codec);
    assert_eq!(grid.dimensions(), (8, 8));
    for row in 0..8 {
        for col in 0..8 {
            assert_eq!(
                grid.get(row, col),
                Some(src.get_pixel(col, row)),
                "row={} col={}",
                row,
                col
            );
        }
    }
}

#[test]
fn sniffed_format_matches_explicit_codec() {
    let src = pattern(8);
    let bytes = encode(&DynamicImage::ImageRgba8(src), ImageFormat::Png);
    let explicit = decode_one("explicit", bytes.clone(), Arc::new(ImageCodec::png()));
    let sniffed = decode_one("sniffed", bytes, Arc::new(GuessedCodec));
    assert_eq!(explicit, sniffed);
}

#[test]
fn grayscale_expands_to_opaque_rgba() {
    let gray = image::GrayImage::from_fn(4, 4, |x, y| image::Luma([(x * 60 + y) as u8]));
    let bytes = encode(&DynamicImage::ImageLuma8(gray.clone()), ImageFormat::Png);
    let grid = decode_one("gray", bytes, Arc::new(ImageCodec::png()));
    for row in 0..4 {
        for col in 0..4 {
            let v = gray.get_pixel(col, row)[0];
            assert_eq!(grid.get(row, col), Some(&Rgba([v, v, v, 255])));
        }
    }
}

#[test]
fn jpeg_keeps_dimensions_and_approximate_color() {
    // flat color survives JPEG closely; alpha becomes opaque
    let img = RgbImage::from_pixel(16, 16, Rgb([200, 40, 90]));
    let bytes = encode(&DynamicImage::ImageRgb8(img), ImageFormat::Jpeg);
    let grid = decode_one("photo.jpg", bytes, Arc::new(ImageCodec::jpeg()));
    assert_eq!(grid.dimensions(), (16, 16));
    let px = grid.get(8, 8).expect("in range");
    let expected = [200i32, 40, 90];
    for c in 0..3 {
        assert!(
            (i32::from(px[c]) - expected[c]).abs() <= 8,
            "channel {} = {}",
            c,
            px[c]
        );
    }
    assert_eq!(px[3], 255);
}
