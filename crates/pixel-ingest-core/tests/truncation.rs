use image::{DynamicImage, ImageBuffer, ImageFormat, Luma, Rgba};
use pixel_ingest_core::prelude::*;
use std::io::Cursor;
use std::sync::Arc;

/// 2x1 16-bit RGBA PNG with channel values at 0, mid-range and max.
fn deep_png() -> Vec<u8> {
    let mut img: ImageBuffer<Rgba<u16>, Vec<u16>> = ImageBuffer::new(2, 1);
    img.put_pixel(0, 0, Rgba([0x0000, 0x7fff, 0xffff, 0xffff]));
    img.put_pixel(1, 0, Rgba([0x12ab, 0x8000, 0x00ff, 0x8080]));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgba16(img)
        .write_to(&mut buf, ImageFormat::Png)
        .expect("encode 16-bit png");
    buf.into_inner()
}

fn decode(bytes: Vec<u8>, truncation: Truncation) -> PixelGrid {
    let cfg = IngestConfig::builder().truncation(truncation).build();
    let task = DecodeTask::new("deep", bytes, Arc::new(ImageCodec::png()));
    run_task(task, &cfg).grid().cloned().expect("grid returned")
}

#[test]
fn high_byte_keeps_most_significant_bits() {
    let grid = decode(deep_png(), Truncation::HighByte);
    assert_eq!(grid.get(0, 0), Some(&Rgba([0x00, 0x7f, 0xff, 0xff])));
    assert_eq!(grid.get(0, 1), Some(&Rgba([0x12, 0x80, 0x00, 0x80])));
}

#[test]
fn low_byte_masks_least_significant_bits() {
    let grid = decode(deep_png(), Truncation::LowByte);
    assert_eq!(grid.get(0, 0), Some(&Rgba([0x00, 0xff, 0xff, 0xff])));
    assert_eq!(grid.get(0, 1), Some(&Rgba([0xab, 0x00, 0xff, 0x80])));
}

#[test]
fn deep_grayscale_narrows_every_channel() {
    let img: ImageBuffer<Luma<u16>, Vec<u16>> =
        ImageBuffer::from_fn(3, 1, |x, _| Luma([[0u16, 0x8001, 0xffff][x as usize]]));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageLuma16(img)
        .write_to(&mut buf, ImageFormat::Png)
        .expect("encode");
    let bytes = buf.into_inner();

    let high = decode(bytes.clone(), Truncation::HighByte);
    assert_eq!(
        high.row(0),
        &[
            Rgba([0x00, 0x00, 0x00, 0xff]),
            Rgba([0x80, 0x80, 0x80, 0xff]),
            Rgba([0xff, 0xff, 0xff, 0xff]),
        ]
    );
    let low = decode(bytes, Truncation::LowByte);
    assert_eq!(low.get(0, 1), Some(&Rgba([0x01, 0x01, 0x01, 0xff])));
}
