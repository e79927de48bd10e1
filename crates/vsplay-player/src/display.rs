//! Headless display surface
//!
//! Pictures are not drawn anywhere; the surface hands out buffers, works
//! out where each picture would land in the configured window and logs
//! progress. Useful for servers, CI and timing measurements.

use vsplay_core::media::{DisplaySurface, PictureBuffer};
use vsplay_core::queue::DecodedPicture;

use crate::config::DisplayConfig;

/// Target rectangle of a picture inside the window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Fit a `width` x `height` picture into the screen, preserving aspect
///
/// `aspect` overrides the picture's own width/height ratio. The fitted
/// width is rounded down to a multiple of 4 and the result is centered.
pub fn fit_display_rect(
    screen_width: u32,
    screen_height: u32,
    width: u32,
    height: u32,
    aspect: Option<f64>,
) -> DisplayRect {
    let aspect = match aspect {
        Some(a) if a.is_finite() && a > 0.0 => a,
        _ if width > 0 && height > 0 => width as f64 / height as f64,
        _ => 1.0,
    };

    let mut h = screen_height;
    let mut w = ((h as f64 * aspect).round() as u32) & !3;
    if w > screen_width {
        w = screen_width;
        h = ((w as f64 / aspect).round() as u32) & !3;
    }

    DisplayRect {
        x: (screen_width - w) / 2,
        y: screen_height.saturating_sub(h) / 2,
        width: w,
        height: h,
    }
}

/// Display surface that only measures and reports
pub struct HeadlessDisplay {
    config: DisplayConfig,
    frames_shown: u64,
    allocations: u64,
    last_pts: Option<f64>,
    last_rect: Option<DisplayRect>,
}

impl HeadlessDisplay {
    pub fn new(config: DisplayConfig) -> Self {
        Self {
            config,
            frames_shown: 0,
            allocations: 0,
            last_pts: None,
            last_rect: None,
        }
    }

    pub fn frames_shown(&self) -> u64 {
        self.frames_shown
    }

    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    pub fn last_pts(&self) -> Option<f64> {
        self.last_pts
    }

    pub fn last_rect(&self) -> Option<DisplayRect> {
        self.last_rect
    }
}

impl DisplaySurface for HeadlessDisplay {
    fn allocate_surface(&mut self, width: u32, height: u32) -> PictureBuffer {
        self.allocations += 1;
        log::debug!("[DISPLAY] Allocating {}x{} surface", width, height);
        PictureBuffer::new(width, height, width as usize * height as usize)
    }

    fn blit(&mut self, picture: &DecodedPicture) {
        let rect = fit_display_rect(
            self.config.width,
            self.config.height,
            picture.width,
            picture.height,
            None,
        );
        self.frames_shown += 1;
        self.last_pts = Some(picture.pts);
        self.last_rect = Some(rect);

        let every = self.config.report_every;
        if every > 0 && self.frames_shown % every == 0 {
            log::info!(
                "[DISPLAY] frame {} pts={:.3}s at {}x{}+{}+{}",
                self.frames_shown,
                picture.pts,
                rect.width,
                rect.height,
                rect.x,
                rect.y
            );
        }
    }
}
