//! Tile compositor for full-page captures.
//!
//! Each session starts `Pending` with only its CSS metadata. The first
//! appended tile fixes the device-pixel scale, which allocates a white
//! surface (`Allocated`). Tiles are drawn full-width at
//! `y = round(scroll_y_css * scale)`; later tiles overwrite earlier rows.

use std::collections::HashMap;

use image::{imageops, Rgba, RgbaImage};
use tracing::{debug, info};

use crate::services::image_codec;
use crate::types::capture::{CaptureMeta, CapturedImage, OutputFormat};
use crate::types::errors::StitchError;

/// Trait defining the compositor interface.
pub trait StitcherTrait {
    fn begin(&mut self, session_id: &str, meta: CaptureMeta) -> Result<(), StitchError>;
    fn append(&mut self, session_id: &str, tile: &[u8], scroll_y_css: f64) -> Result<(), StitchError>;
    fn finish(
        &mut self,
        session_id: &str,
        format: OutputFormat,
        quality: f32,
    ) -> Result<CapturedImage, StitchError>;
    fn abort(&mut self, session_id: &str);
    fn canvas(&self, session_id: &str) -> Option<&StitchCanvas>;
    fn session_count(&self) -> usize;
}

/// Device-pixel surface of a session once its scale is known.
pub struct AllocatedSurface {
    pub scale: f64,
    pub width_px: u32,
    pub full_height_px: u32,
    pub surface: RgbaImage,
}

/// Per-session compositing state.
pub enum StitchCanvas {
    Pending { meta: CaptureMeta },
    Allocated { meta: CaptureMeta, surface: AllocatedSurface },
}

impl StitchCanvas {
    pub fn meta(&self) -> &CaptureMeta {
        match self {
            StitchCanvas::Pending { meta } | StitchCanvas::Allocated { meta, .. } => meta,
        }
    }

    /// The fixed scale, once the first tile has been seen.
    pub fn scale(&self) -> Option<f64> {
        match self {
            StitchCanvas::Pending { .. } => None,
            StitchCanvas::Allocated { surface, .. } => Some(surface.scale),
        }
    }

    pub fn is_allocated(&self) -> bool {
        matches!(self, StitchCanvas::Allocated { .. })
    }

    pub fn surface(&self) -> Option<&RgbaImage> {
        match self {
            StitchCanvas::Pending { .. } => None,
            StitchCanvas::Allocated { surface, .. } => Some(&surface.surface),
        }
    }
}

/// Largest surface the compositor allocates (16384 x 16384 RGBA, 1 GiB).
pub const MAX_SURFACE_PIXELS: u64 = 1 << 28;

/// Device-pixel row at which a tile scrolled to `scroll_y_css` is drawn.
pub fn tile_row(scroll_y_css: f64, scale: f64) -> i64 {
    (scroll_y_css * scale).round() as i64
}

/// Allocates the white surface for `meta` at the scale implied by a tile of
/// `tile_width_px` device pixels.
///
/// Fails with [`StitchError::InvalidMeta`] rather than allocating more than
/// [`MAX_SURFACE_PIXELS`].
pub fn allocate_surface(meta: &CaptureMeta, tile_width_px: u32) -> Result<AllocatedSurface, StitchError> {
    meta.validate().map_err(StitchError::InvalidMeta)?;
    let scale = tile_width_px as f64 / meta.viewport_width_css;
    let width_px = (meta.viewport_width_css * scale).round();
    let full_height_px = (meta.full_height_css * scale).round();
    if width_px < 1.0 || full_height_px < 1.0 || width_px * full_height_px > MAX_SURFACE_PIXELS as f64 {
        return Err(StitchError::InvalidMeta(format!(
            "surface of {}x{} device pixels at scale {}",
            width_px, full_height_px, scale
        )));
    }
    let width_px = width_px as u32;
    let full_height_px = full_height_px as u32;
    Ok(AllocatedSurface {
        scale,
        width_px,
        full_height_px,
        surface: RgbaImage::from_pixel(width_px, full_height_px, Rgba([255, 255, 255, 255])),
    })
}

/// In-memory compositor holding one canvas per session.
pub struct Stitcher {
    canvases: HashMap<String, StitchCanvas>,
}

impl Stitcher {
    pub fn new() -> Self {
        Self {
            canvases: HashMap::new(),
        }
    }
}

impl Default for Stitcher {
    fn default() -> Self {
        Self::new()
    }
}

impl StitcherTrait for Stitcher {
    /// Records the metadata for a new session without allocating pixels.
    fn begin(&mut self, session_id: &str, meta: CaptureMeta) -> Result<(), StitchError> {
        meta.validate().map_err(StitchError::InvalidMeta)?;
        if self.canvases.contains_key(session_id) {
            return Err(StitchError::AlreadyExists(session_id.to_string()));
        }
        self.canvases
            .insert(session_id.to_string(), StitchCanvas::Pending { meta });
        debug!(session_id, "stitch session started");
        Ok(())
    }

    /// Decodes `tile` and draws it at the row matching `scroll_y_css`.
    ///
    /// The first tile of a session fixes the scale and allocates the surface.
    fn append(&mut self, session_id: &str, tile: &[u8], scroll_y_css: f64) -> Result<(), StitchError> {
        let canvas = self
            .canvases
            .get_mut(session_id)
            .ok_or_else(|| StitchError::UnknownSession(session_id.to_string()))?;
        let tile = image_codec::decode_rgba(tile)?;

        if let StitchCanvas::Pending { meta } = canvas {
            let meta = *meta;
            let surface = allocate_surface(&meta, tile.width())?;
            info!(
                session_id,
                scale = surface.scale,
                width = surface.width_px,
                height = surface.full_height_px,
                "stitch surface allocated"
            );
            *canvas = StitchCanvas::Allocated { meta, surface };
        }

        if let StitchCanvas::Allocated { surface, .. } = canvas {
            let y = tile_row(scroll_y_css, surface.scale);
            imageops::replace(&mut surface.surface, &tile, 0, y);
            debug!(session_id, y, "tile drawn");
        }
        Ok(())
    }

    /// Encodes the composed surface and drops the session.
    ///
    /// The session is gone afterwards even when it never received a tile.
    fn finish(
        &mut self,
        session_id: &str,
        format: OutputFormat,
        quality: f32,
    ) -> Result<CapturedImage, StitchError> {
        let canvas = self
            .canvases
            .remove(session_id)
            .ok_or_else(|| StitchError::UnknownSession(session_id.to_string()))?;
        let surface = match canvas {
            StitchCanvas::Pending { .. } => {
                return Err(StitchError::NoTiles(session_id.to_string()))
            }
            StitchCanvas::Allocated { surface, .. } => surface,
        };
        let bytes = image_codec::encode_rgba(&surface.surface, format, quality)?;
        info!(session_id, bytes = bytes.len(), "stitch session finished");
        Ok(CapturedImage {
            bytes,
            format,
            width: surface.width_px,
            height: surface.full_height_px,
        })
    }

    fn abort(&mut self, session_id: &str) {
        if self.canvases.remove(session_id).is_some() {
            debug!(session_id, "stitch session discarded");
        }
    }

    fn canvas(&self, session_id: &str) -> Option<&StitchCanvas> {
        self.canvases.get(session_id)
    }

    fn session_count(&self) -> usize {
        self.canvases.len()
    }
}
