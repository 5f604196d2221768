use std::fs;
use std::io::Cursor;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;

use fast_image_resize::images::Image as FastImage;
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::{ImageFormat, ImageReader, Rgba, RgbaImage};

use crate::error::ThumbnailError;

#[derive(Clone)]
pub struct Thumbnail {
    pub image: RgbaImage,
    /// The thumbnail downsampled to a single pixel.
    pub average_color: Rgba<u8>,
}

/// Reads and decodes `path` into RGBA8. Magic bytes decide the format; the
/// extension is the fallback (TGA has no magic).
pub fn load_rgba(path: &Path) -> Result<RgbaImage, ThumbnailError> {
    let bytes = fs::read(path).map_err(|source| ThumbnailError::Io { path: path.to_path_buf(), source })?;

    let mut reader = ImageReader::new(Cursor::new(&bytes))
        .with_guessed_format()
        .unwrap_or_else(|_| ImageReader::new(Cursor::new(&bytes)));
    if reader.format().is_none() {
        if let Ok(fmt) = ImageFormat::from_path(path) {
            reader.set_format(fmt);
        }
    }

    // Malformed files can panic inside a decoder; keep that off the worker.
    let img = catch_unwind(AssertUnwindSafe(|| reader.decode()))
        .map_err(|_| ThumbnailError::Panicked { path: path.to_path_buf() })?
        .map_err(|source| ThumbnailError::Decode { path: path.to_path_buf(), source })?;
    Ok(img.to_rgba8())
}

pub fn render(path: &Path, height: u32) -> Result<Thumbnail, ThumbnailError> {
    let source = load_rgba(path)?;
    if source.width() == 0 || source.height() == 0 {
        return Err(ThumbnailError::Empty { path: path.to_path_buf(), width: source.width(), height: source.height() });
    }
    render_image(&source, height)
}

/// Scales `source` to exactly `height` rows keeping the aspect ratio.
pub fn render_image(source: &RgbaImage, height: u32) -> Result<Thumbnail, ThumbnailError> {
    let height = height.max(1);
    let width = ((height as f64 * source.width() as f64) / source.height().max(1) as f64).round().max(1.0) as u32;

    let image = resize_rgba(source, width, height, ResizeAlg::Convolution(FilterType::Bilinear))?;
    let average_color = average_color(&image)?;
    Ok(Thumbnail { image, average_color })
}

pub fn average_color(image: &RgbaImage) -> Result<Rgba<u8>, ThumbnailError> {
    let pixel = resize_rgba(image, 1, 1, ResizeAlg::Convolution(FilterType::Box))?;
    Ok(*pixel.get_pixel(0, 0))
}

fn resize_rgba(src: &RgbaImage, width: u32, height: u32, alg: ResizeAlg) -> Result<RgbaImage, ThumbnailError> {
    let src_image = FastImage::from_vec_u8(src.width(), src.height(), src.as_raw().clone(), PixelType::U8x4)
        .map_err(|e| ThumbnailError::Resize(e.to_string()))?;
    let mut dst_image = FastImage::new(width, height, PixelType::U8x4);

    let mut resizer = Resizer::new();
    resizer
        .resize(&src_image, &mut dst_image, &ResizeOptions::new().resize_alg(alg))
        .map_err(|e| ThumbnailError::Resize(e.to_string()))?;

    RgbaImage::from_raw(width, height, dst_image.into_vec())
        .ok_or_else(|| ThumbnailError::Resize(format!("buffer does not match {}x{}", width, height)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_png;
    use tempfile::TempDir;

    #[test]
    fn test_render_fixed_height_keeps_aspect() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wide.png");
        write_png(&path, 400, 200, [200, 40, 10]);

        let thumb = render(&path, 100).unwrap();
        assert_eq!(thumb.image.height(), 100);
        assert_eq!(thumb.image.width(), 200);
        let expected = [200u8, 40, 10, 255];
        for (got, want) in thumb.average_color.0.iter().zip(expected) {
            assert!(got.abs_diff(want) <= 1, "Average {:?} too far from {:?}", thumb.average_color, expected);
        }
    }

    #[test]
    fn test_average_of_two_halves() {
        let mut img = RgbaImage::new(64, 32);
        for (x, _, px) in img.enumerate_pixels_mut() {
            *px = if x < 32 { Rgba([0, 0, 0, 255]) } else { Rgba([255, 255, 255, 255]) };
        }
        let avg = average_color(&img).unwrap();
        for channel in &avg.0[..3] {
            assert!((120..=135).contains(channel), "Expected mid gray, got {:?}", avg);
        }
        assert_eq!(avg.0[3], 255);
    }

    #[test]
    fn test_tall_image_width_never_zero() {
        let img = RgbaImage::from_pixel(1, 1000, Rgba([1, 2, 3, 255]));
        let thumb = render_image(&img, 100).unwrap();
        assert_eq!(thumb.image.dimensions(), (1, 100));
    }

    #[test]
    fn test_render_errors() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.png");
        assert!(matches!(render(&missing, 100), Err(ThumbnailError::Io { .. })));

        let bogus = dir.path().join("bogus.png");
        fs::write(&bogus, b"not an image at all").unwrap();
        assert!(matches!(render(&bogus, 100), Err(ThumbnailError::Decode { .. })));
    }
}
