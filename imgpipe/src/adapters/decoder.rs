//! Image decoding over the `image` crate.

use crate::identity::{Resize, TransformOptions};
use crate::pipeline::{DecodeError, Decoder};
use crate::request::DataSource;
use crate::resource::{Decoded, ImageBuffer, ImageInfo};
use image::codecs::gif::GifDecoder;
use image::imageops::FilterType;
use image::{AnimationDecoder, DynamicImage, ImageFormat};
use std::io::Cursor;
use tracing::trace;

/// Decodes PNG, JPEG, GIF and WebP into RGBA8 buffers.
///
/// The format is sniffed from the bytes, not taken from the locator or the
/// transport's content type. A resize transform downscales to fit within the
/// requested box, preserving aspect ratio; it never upscales.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageDecoder;

impl ImageDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for ImageDecoder {
    fn decode(
        &self,
        source: &DataSource,
        transform: &TransformOptions,
    ) -> Result<Decoded, DecodeError> {
        let bytes = source.read()?;
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }

        let format = image::guess_format(&bytes).map_err(codec_error)?;
        let animated = format == ImageFormat::Gif && is_animated_gif(&bytes);
        let image = image::load_from_memory_with_format(&bytes, format).map_err(codec_error)?;

        let info = ImageInfo {
            origin_width: image.width(),
            origin_height: image.height(),
            mime_type: format.to_mime_type().to_string(),
        };
        let image = match transform.resize {
            Some(resize) => downscale(image, resize, transform.low_quality),
            None => image,
        };

        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        trace!(
            mime_type = %info.mime_type,
            origin_width = info.origin_width,
            origin_height = info.origin_height,
            width,
            height,
            animated,
            "Decoded image"
        );

        Ok(Decoded {
            buffer: ImageBuffer::new(width, height, rgba.into_raw()),
            info,
            animated,
        })
    }
}

fn downscale(image: DynamicImage, resize: Resize, low_quality: bool) -> DynamicImage {
    if image.width() <= resize.width && image.height() <= resize.height {
        return image;
    }
    let filter = if low_quality {
        FilterType::Nearest
    } else {
        FilterType::Triangle
    };
    image.resize(resize.width, resize.height, filter)
}

/// True if the GIF has more than one frame.
fn is_animated_gif(bytes: &[u8]) -> bool {
    match GifDecoder::new(Cursor::new(bytes)) {
        Ok(decoder) => decoder.into_frames().take(2).filter(Result::is_ok).count() > 1,
        Err(_) => false,
    }
}

fn codec_error(e: image::ImageError) -> DecodeError {
    DecodeError::Codec(e.to_string())
}
