//! Renderer - Composites Selected Elements into an Edition Image
//!
//! Rendering is pure: it reads element assets and returns encoded bytes.
//! Writing those bytes is the output writer's job.

use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgba, RgbaImage};
use rand::Rng;
use std::io::Cursor;
use std::path::PathBuf;
use thiserror::Error;

use crate::dna::{EditionRng, Placement};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to load element {path}: {source}")]
    Asset {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to encode image: {0}")]
    Encode(#[from] image::ImageError),
}

pub trait Renderer: Send + Sync {
    /// Composite `placements` in order and return the encoded image.
    fn render(&self, placements: &[Placement<'_>], rng: &mut EditionRng) -> Result<Vec<u8>, RenderError>;

    fn extension(&self) -> &'static str {
        "png"
    }
}

/// PNG renderer backed by the `image` crate.
pub struct ImageRenderer {
    width: u32,
    height: u32,
    draw_background: bool,
}

impl ImageRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            draw_background: true,
        }
    }

    pub fn with_background(mut self, draw: bool) -> Self {
        self.draw_background = draw;
        self
    }

    fn canvas(&self, rng: &mut EditionRng) -> RgbaImage {
        let fill = if self.draw_background {
            pastel(rng.random_range(0.0..360.0))
        } else {
            Rgba([255, 255, 255, 255])
        };
        RgbaImage::from_pixel(self.width, self.height, fill)
    }
}

impl Renderer for ImageRenderer {
    fn render(&self, placements: &[Placement<'_>], rng: &mut EditionRng) -> Result<Vec<u8>, RenderError> {
        let mut canvas = self.canvas(rng);

        for placement in placements {
            let path = &placement.element.path;
            let mut layer_img = image::open(path)
                .map_err(|source| RenderError::Asset { path: path.clone(), source })?
                .to_rgba8();

            let size = placement.layer.size;
            if layer_img.dimensions() != (size.width, size.height) {
                layer_img = imageops::resize(&layer_img, size.width, size.height, FilterType::Triangle);
            }

            let pos = placement.layer.position;
            imageops::overlay(&mut canvas, &layer_img, pos.x, pos.y);
        }

        let rgb = image::DynamicImage::ImageRgba8(canvas).to_rgb8();
        let mut bytes = Vec::new();
        rgb.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }
}

/// Light, fully saturated colour for the given hue in degrees.
fn pastel(hue: f64) -> Rgba<u8> {
    let (r, g, b) = hsl_to_rgb(hue, 1.0, 0.85);
    Rgba([r, g, b, 255])
}

fn hsl_to_rgb(hue: f64, saturation: f64, lightness: f64) -> (u8, u8, u8) {
    let c = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
    let h = (hue.rem_euclid(360.0)) / 60.0;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = lightness - c / 2.0;
    let channel = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    (channel(r), channel(g), channel(b))
}
