use crate::error::CodecError;
use image::{DynamicImage, ImageBuffer, ImageFormat, ImageReader, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

/// Seekable view over an encoded asset. Every codec call gets its own cursor at offset 0.
pub type ByteStream<'a> = Cursor<&'a [u8]>;

/// 16-bit-per-channel RGBA buffer.
pub type Rgba16Image = ImageBuffer<Rgba<u16>, Vec<u16>>;

/// Logical image size reported by a codec's metadata pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl From<(u32, u32)> for Dimensions {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

/// Decoded image addressable by coordinate.
///
/// Samples are RGBA widened to 16 bits per channel; an 8-bit value `v` reads as `v * 257`.
pub trait PixelSource: Send {
    fn dimensions(&self) -> Dimensions;
    /// Color at column `x`, row `y`; `None` outside the image.
    fn sample(&self, x: u32, y: u32) -> Option<[u16; 4]>;
}

impl PixelSource for RgbaImage {
    fn dimensions(&self) -> Dimensions {
        ImageBuffer::dimensions(self).into()
    }

    fn sample(&self, x: u32, y: u32) -> Option<[u16; 4]> {
        self.get_pixel_checked(x, y)
            .map(|p| p.0.map(|c| u16::from(c) * 257))
    }
}

impl PixelSource for Rgba16Image {
    fn dimensions(&self) -> Dimensions {
        ImageBuffer::dimensions(self).into()
    }

    fn sample(&self, x: u32, y: u32) -> Option<[u16; 4]> {
        self.get_pixel_checked(x, y).map(|p| p.0)
    }
}

/// Wraps a decoded image, keeping 16-bit precision for deep color types.
pub fn pixel_source(img: DynamicImage) -> Box<dyn PixelSource> {
    let color = img.color();
    let bits_per_channel = color.bits_per_pixel() / u16::from(color.channel_count().max(1));
    if bits_per_channel > 8 {
        Box::new(img.into_rgba16())
    } else {
        Box::new(img.into_rgba8())
    }
}

/// Format-specific decoding capabilities for one kind of encoded asset.
///
/// Adding a format means implementing this trait (or building an [`FnCodec`]);
/// the scheduler never inspects the concrete format.
pub trait Codec: Send + Sync {
    /// Short name used in logs (e.g. `png`).
    fn name(&self) -> &str;

    /// Reads only as much of the stream as needed to report the image size.
    fn decode_metadata(&self, stream: ByteStream<'_>) -> Result<Dimensions, CodecError>;

    /// Decodes the full pixel content.
    fn decode_image(&self, stream: ByteStream<'_>) -> Result<Box<dyn PixelSource>, CodecError>;
}

/// Codec for one fixed format supported by the `image` crate.
#[derive(Debug, Clone)]
pub struct ImageCodec {
    format: ImageFormat,
    name: String,
}

impl ImageCodec {
    pub fn new(format: ImageFormat) -> Self {
        let name = format
            .extensions_str()
            .first()
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("{:?}", format).to_ascii_lowercase());
        Self { format, name }
    }
    pub fn png() -> Self {
        Self::new(ImageFormat::Png)
    }
    pub fn jpeg() -> Self {
        Self::new(ImageFormat::Jpeg)
    }
    pub fn gif() -> Self {
        Self::new(ImageFormat::Gif)
    }
    pub fn bmp() -> Self {
        Self::new(ImageFormat::Bmp)
    }
    pub fn tiff() -> Self {
        Self::new(ImageFormat::Tiff)
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }
}

impl Codec for ImageCodec {
    fn name(&self) -> &str {
        &self.name
    }

    fn decode_metadata(&self, stream: ByteStream<'_>) -> Result<Dimensions, CodecError> {
        let dims = ImageReader::with_format(stream, self.format).into_dimensions()?;
        Ok(dims.into())
    }

    fn decode_image(&self, stream: ByteStream<'_>) -> Result<Box<dyn PixelSource>, CodecError> {
        let img = ImageReader::with_format(stream, self.format).decode()?;
        Ok(pixel_source(img))
    }
}

/// Codec that detects the format from the stream's magic bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuessedCodec;

impl GuessedCodec {
    fn reader(stream: ByteStream<'_>) -> Result<ImageReader<ByteStream<'_>>, CodecError> {
        let reader = ImageReader::new(stream).with_guessed_format()?;
        if reader.format().is_none() {
            return Err(CodecError::UnknownFormat);
        }
        Ok(reader)
    }
}

impl Codec for GuessedCodec {
    fn name(&self) -> &str {
        "guessed"
    }

    fn decode_metadata(&self, stream: ByteStream<'_>) -> Result<Dimensions, CodecError> {
        Ok(Self::reader(stream)?.into_dimensions()?.into())
    }

    fn decode_image(&self, stream: ByteStream<'_>) -> Result<Box<dyn PixelSource>, CodecError> {
        Ok(pixel_source(Self::reader(stream)?.decode()?))
    }
}

/// Codec assembled from a metadata function and a pixel function.
pub struct FnCodec<M, D> {
    name: String,
    metadata: M,
    image: D,
}

impl<M, D> FnCodec<M, D>
where
    M: Fn(ByteStream<'_>) -> Result<Dimensions, CodecError> + Send + Sync,
    D: Fn(ByteStream<'_>) -> Result<Box<dyn PixelSource>, CodecError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, metadata: M, image: D) -> Self {
        Self {
            name: name.into(),
            metadata,
            image,
        }
    }
}

impl<M, D> Codec for FnCodec<M, D>
where
    M: Fn(ByteStream<'_>) -> Result<Dimensions, CodecError> + Send + Sync,
    D: Fn(ByteStream<'_>) -> Result<Box<dyn PixelSource>, CodecError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn decode_metadata(&self, stream: ByteStream<'_>) -> Result<Dimensions, CodecError> {
        (self.metadata)(stream)
    }

    fn decode_image(&self, stream: ByteStream<'_>) -> Result<Box<dyn PixelSource>, CodecError> {
        (self.image)(stream)
    }
}

/// Case-insensitive lookup from format names / file extensions to codecs.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    codecs: HashMap<String, Arc<dyn Codec>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the formats enabled in this build: png, jpg/jpeg, gif, bmp, tif/tiff.
    pub fn with_builtin() -> Self {
        let mut reg = Self::new();
        let png: Arc<dyn Codec> = Arc::new(ImageCodec::png());
        let jpeg: Arc<dyn Codec> = Arc::new(ImageCodec::jpeg());
        let tiff: Arc<dyn Codec> = Arc::new(ImageCodec::tiff());
        reg.register("png", png);
        reg.register("jpg", jpeg.clone());
        reg.register("jpeg", jpeg);
        reg.register("gif", Arc::new(ImageCodec::gif()));
        reg.register("bmp", Arc::new(ImageCodec::bmp()));
        reg.register("tif", tiff.clone());
        reg.register("tiff", tiff);
        reg
    }

    /// Registers `codec` under `key`, returning the codec it replaced.
    pub fn register(
        &mut self,
        key: impl Into<String>,
        codec: Arc<dyn Codec>,
    ) -> Option<Arc<dyn Codec>> {
        self.codecs.insert(key.into().to_ascii_lowercase(), codec)
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn Codec>> {
        self.codecs.get(&key.to_ascii_lowercase()).cloned()
    }

    /// Looks up a codec by the path's file extension.
    pub fn for_path(&self, path: &Path) -> Option<Arc<dyn Codec>> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|ext| self.get(ext))
    }

    /// Registered keys in sorted order.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.codecs.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, format).expect("encode");
        buf.into_inner()
    }

    #[test]
    fn builtin_registry_resolves_extensions() {
        let reg = CodecRegistry::with_builtin();
        assert_eq!(reg.keys(), vec!["bmp", "gif", "jpeg", "jpg", "png", "tif", "tiff"]);
        assert_eq!(reg.get("PNG").map(|c| c.name().to_string()), Some("png".into()));
        assert_eq!(
            reg.for_path(Path::new("assets/photo.JPG"))
                .map(|c| c.name().to_string()),
            Some("jpg".into())
        );
        assert!(reg.for_path(Path::new("notes.txt")).is_none());
        assert!(reg.for_path(Path::new("no_extension")).is_none());
    }

    #[test]
    fn register_replaces_previous_codec() {
        let mut reg = CodecRegistry::new();
        assert!(reg.is_empty());
        assert!(reg.register("img", Arc::new(ImageCodec::png())).is_none());
        let old = reg.register("IMG", Arc::new(ImageCodec::bmp()));
        assert_eq!(old.map(|c| c.name().to_string()), Some("png".into()));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get("img").map(|c| c.name().to_string()), Some("bmp".into()));
    }

    #[test]
    fn metadata_and_pixels_read_independent_cursors() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(5, 3, Rgba([10, 20, 30, 40])));
        let bytes = encode(&img, ImageFormat::Png);
        let codec = ImageCodec::png();
        let dims = codec.decode_metadata(Cursor::new(bytes.as_slice())).expect("meta");
        assert_eq!(dims, Dimensions::new(5, 3));
        let src = codec.decode_image(Cursor::new(bytes.as_slice())).expect("pixels");
        assert_eq!(src.dimensions(), dims);
        assert_eq!(src.sample(4, 2), Some([10 * 257, 20 * 257, 30 * 257, 40 * 257]));
        assert_eq!(src.sample(5, 0), None);
    }

    #[test]
    fn wrong_format_is_a_codec_error() {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(2, 2));
        let bytes = encode(&img, ImageFormat::Png);
        let err = ImageCodec::bmp()
            .decode_metadata(Cursor::new(bytes.as_slice()))
            .expect_err("png bytes are not bmp");
        assert!(matches!(err, CodecError::Image(_)));
    }

    #[test]
    fn guessed_codec_sniffs_magic_bytes() {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(7, 4));
        let bytes = encode(&img, ImageFormat::Bmp);
        let dims = GuessedCodec.decode_metadata(Cursor::new(bytes.as_slice())).expect("meta");
        assert_eq!(dims, Dimensions::new(7, 4));

        let garbage = [0u8, 1, 2, 3, 4, 5, 6, 7];
        let err = GuessedCodec
            .decode_metadata(Cursor::new(&garbage[..]))
            .expect_err("not an image");
        assert!(matches!(err, CodecError::UnknownFormat));
    }

    #[test]
    fn deep_images_keep_sixteen_bits() {
        let deep = Rgba16Image::from_pixel(1, 1, Rgba([0x1234, 0, 0xffff, 0x8000]));
        let src = pixel_source(DynamicImage::ImageRgba16(deep));
        assert_eq!(src.sample(0, 0), Some([0x1234, 0, 0xffff, 0x8000]));

        let gray = image::GrayImage::from_pixel(1, 1, image::Luma([200]));
        let src = pixel_source(DynamicImage::ImageLuma8(gray));
        assert_eq!(src.sample(0, 0), Some([200 * 257, 200 * 257, 200 * 257, u16::MAX]));
    }
}
