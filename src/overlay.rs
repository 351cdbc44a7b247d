use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use log::warn;
use rusttype::{Font, Scale};

const BAR_HEIGHT: u32 = 12;
const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const RED: Rgb<u8> = Rgb([255, 0, 0]);
const TRACK: Rgb<u8> = Rgb([40, 40, 40]);
const MARKER: Rgb<u8> = Rgb([255, 255, 255]);

/// Debug overlay for local tuning sessions.
///
/// Draws the current score as a bar along the top edge of the frame, green
/// below the threshold and red at or above it, with a white tick at the
/// threshold. If a font is configured the numeric score is printed too.
/// The annotated frame is written as a JPEG that a browser or image viewer
/// can keep reloading.
pub struct Overlay {
    path: PathBuf,
    font: Option<Font<'static>>,
}

impl Overlay {
    /// Create an overlay that writes to `path`.
    ///
    /// An unreadable or invalid font is logged and the overlay falls back
    /// to drawing the bar only.
    pub fn new(path: impl Into<PathBuf>, font_path: Option<&Path>) -> Self {
        let font = font_path.and_then(|p| match fs::read(p) {
            Ok(bytes) => {
                let font = Font::try_from_vec(bytes);
                if font.is_none() {
                    warn!("[Overlay] {} is not a usable font", p.display());
                }
                font
            }
            Err(e) => {
                warn!("[Overlay] Failed to read font {}: {}", p.display(), e);
                None
            }
        });

        Self {
            path: path.into(),
            font,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Annotate a copy of `frame` with `score` against `threshold`.
    pub fn annotate(&self, frame: &RgbImage, score: f32, threshold: f32) -> RgbImage {
        let mut canvas = frame.clone();
        let (width, height) = canvas.dimensions();
        if width == 0 || height == 0 {
            return canvas;
        }

        let bar_height = BAR_HEIGHT.min(height);
        draw_filled_rect_mut(
            &mut canvas,
            Rect::at(0, 0).of_size(width, bar_height),
            TRACK,
        );

        let filled = (score.clamp(0.0, 1.0) * width as f32).round() as u32;
        if filled > 0 {
            let color = if score < threshold { GREEN } else { RED };
            draw_filled_rect_mut(
                &mut canvas,
                Rect::at(0, 0).of_size(filled.min(width), bar_height),
                color,
            );
        }

        let marker_x = ((threshold.clamp(0.0, 1.0) * width as f32) as u32).min(width - 1);
        draw_filled_rect_mut(
            &mut canvas,
            Rect::at(marker_x as i32, 0).of_size(2.min(width - marker_x), bar_height),
            MARKER,
        );

        if let Some(font) = &self.font {
            let color = if score < threshold { GREEN } else { RED };
            let text = format!("score:{:.2} thr:{:.2}", score, threshold);
            draw_text_mut(
                &mut canvas,
                color,
                10,
                bar_height as i32 + 4,
                Scale::uniform(18.0),
                font,
                &text,
            );
        }

        canvas
    }

    /// Annotate `frame` and write it to the overlay path.
    ///
    /// # Errors
    ///
    /// Returns an error if the JPEG cannot be encoded or written.
    pub fn render(&self, frame: &RgbImage, score: f32, threshold: f32) -> Result<()> {
        let annotated = self.annotate(frame, score, threshold);
        annotated.save_with_format(&self.path, image::ImageFormat::Jpeg)?;
        Ok(())
    }
}
