// File and image loading helpers

use anyhow::{Context, Result};
use std::path::Path;

/// Decoded RGBA8 image
#[derive(Debug, Clone)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

pub fn get_binary_file_contents(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Could not open {:?} file!", path))
}

/// Load an image file and convert it to RGBA8
pub fn get_image_data(path: &Path) -> Result<ImageData> {
    let image = image::open(path)
        .with_context(|| format!("Could not read image data from {:?}!", path))?
        .to_rgba8();

    Ok(ImageData {
        width: image.width(),
        height: image.height(),
        pixels: image.into_raw(),
    })
}

/// Checkerboard used when a texture file is missing
pub fn checkerboard(size: u32, cell: u32, a: [u8; 4], b: [u8; 4]) -> ImageData {
    let cell = cell.max(1);
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let color = if (x / cell + y / cell) % 2 == 0 { a } else { b };
            pixels.extend_from_slice(&color);
        }
    }

    ImageData {
        width: size,
        height: size,
        pixels,
    }
}

/// Load an image, falling back to a checkerboard when it cannot be read
pub fn get_image_data_or_placeholder(path: &Path, fallback: [u8; 4]) -> ImageData {
    get_image_data(path).unwrap_or_else(|e| {
        log::warn!("{:#}. Using a placeholder texture.", e);
        checkerboard(64, 8, fallback, [32, 32, 32, 255])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkerboard_alternates_cells() {
        let image = checkerboard(4, 2, [255, 0, 0, 255], [0, 0, 255, 255]);
        assert_eq!(image.pixels.len(), 4 * 4 * 4);

        let pixel = |x: usize, y: usize| &image.pixels[(y * 4 + x) * 4..(y * 4 + x) * 4 + 4];
        assert_eq!(pixel(0, 0), &[255, 0, 0, 255]);
        assert_eq!(pixel(1, 1), &[255, 0, 0, 255]);
        assert_eq!(pixel(2, 0), &[0, 0, 255, 255]);
        assert_eq!(pixel(2, 2), &[255, 0, 0, 255]);
    }

    #[test]
    fn missing_file_yields_placeholder() {
        let image = get_image_data_or_placeholder(Path::new("does/not/exist.png"), [1, 2, 3, 4]);
        assert_eq!((image.width, image.height), (64, 64));
        assert_eq!(&image.pixels[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn missing_binary_file_is_an_error() {
        assert!(get_binary_file_contents(Path::new("does/not/exist.spv")).is_err());
    }
}
