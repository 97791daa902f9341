//! Decode, transform and re-encode images for the resize command.

use crate::error::ImageError;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageOutputFormat};
use std::io::Cursor;

const DEFAULT_JPEG_QUALITY: u8 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeMode {
    Resize,
    PropResize,
    Crop,
    FitSquare,
    Rotate,
}

impl ResizeMode {
    /// Unknown modes resize exactly, like the host does.
    pub fn parse(mode: &str) -> Self {
        match mode {
            "propresize" => ResizeMode::PropResize,
            "crop" => ResizeMode::Crop,
            "fitsquare" => ResizeMode::FitSquare,
            "rotate" => ResizeMode::Rotate,
            _ => ResizeMode::Resize,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
    pub degree: i32,
}

/// Image-processing handle injected into a volume.
#[derive(Debug, Clone)]
pub struct ImageManager {
    filter: FilterType,
}

impl Default for ImageManager {
    fn default() -> Self {
        Self {
            filter: FilterType::Lanczos3,
        }
    }
}

impl ImageManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn make(&self, bytes: &[u8]) -> Result<Picture, ImageError> {
        let format = image::guess_format(bytes).map_err(ImageError::Decode)?;
        let image =
            image::load_from_memory_with_format(bytes, format).map_err(ImageError::Decode)?;
        Ok(Picture {
            image,
            format,
            filter: self.filter,
        })
    }

    /// `"WxH"` read from the image header.
    pub fn dimensions(&self, bytes: &[u8]) -> Option<String> {
        let reader = image::io::Reader::new(Cursor::new(bytes))
            .with_guessed_format()
            .ok()?;
        let (width, height) = reader.into_dimensions().ok()?;
        Some(format!("{}x{}", width, height))
    }
}

/// A decoded image together with the format it came in.
pub struct Picture {
    image: DynamicImage,
    format: ImageFormat,
    filter: FilterType,
}

impl Picture {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn mime(&self) -> String {
        self.format
            .extensions_str()
            .first()
            .and_then(|ext| mime_guess::from_ext(ext).first())
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string())
    }

    pub fn apply(&mut self, mode: ResizeMode, geometry: &Geometry) -> Result<(), ImageError> {
        let Geometry {
            width,
            height,
            x,
            y,
            degree,
        } = *geometry;

        self.image = match mode {
            ResizeMode::Resize => self.image.resize_exact(width, height, self.filter),
            ResizeMode::PropResize => self.image.resize(width, height, self.filter),
            ResizeMode::Crop => self.image.crop_imm(x, y, width, height),
            ResizeMode::FitSquare => self.image.resize_to_fill(width, height, self.filter),
            ResizeMode::Rotate => match degree.rem_euclid(360) {
                0 => return Ok(()),
                90 => self.image.rotate90(),
                180 => self.image.rotate180(),
                270 => self.image.rotate270(),
                _ => return Err(ImageError::UnsupportedRotation(degree)),
            },
        };
        Ok(())
    }

    /// Re-encodes in the source format. `quality` only affects JPEG output;
    /// `None` or `0` keeps the default.
    pub fn encode(&self, quality: Option<u8>) -> Result<Vec<u8>, ImageError> {
        let mut out = Cursor::new(Vec::new());
        if self.format == ImageFormat::Jpeg {
            let quality = quality
                .filter(|q| *q > 0)
                .unwrap_or(DEFAULT_JPEG_QUALITY)
                .min(100);
            DynamicImage::ImageRgb8(self.image.to_rgb8())
                .write_to(&mut out, ImageOutputFormat::Jpeg(quality))
                .map_err(ImageError::Encode)?;
        } else {
            self.image
                .write_to(&mut out, ImageOutputFormat::from(self.format))
                .map_err(ImageError::Encode)?;
        }
        Ok(out.into_inner())
    }

    /// PNG thumbnail bounded by `size`×`size`.
    pub fn thumbnail(&self, size: u32) -> Result<Vec<u8>, ImageError> {
        let mut out = Cursor::new(Vec::new());
        self.image
            .thumbnail(size, size)
            .write_to(&mut out, ImageOutputFormat::Png)
            .map_err(ImageError::Encode)?;
        Ok(out.into_inner())
    }
}
