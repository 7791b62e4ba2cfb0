//! Multi-view quilt compositor
//!
//! A quilt is one render target split into `columns x rows` tiles, each
//! drawn from its own camera of the view sweep. View 0 is the authored
//! top-left tile; since viewports count rows from the bottom of the target,
//! row `r` lands at `rows - 1 - r`.

use crate::backend::{
    BackendError, GraphicsBackend, RenderTargetDescriptor, RenderTargetHandle, TextureFormat,
    Viewport,
};
use crate::display::QuiltFrame;
use crate::resources::ResourceManager;
use crate::scene::{Scene, CENTER_VIEW};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Normalized view used when a quilt has a single tile
pub const SINGLE_VIEW_PARAMETER: f32 = CENTER_VIEW;

#[derive(Error, Debug)]
pub enum QuiltError {
    #[error("Invalid quilt grid '{0}', expected <columns>x<rows>")]
    InvalidGrid(String),
    #[error("Quilt layout {columns}x{rows} of {view_width}x{view_height} views is empty")]
    EmptyLayout {
        columns: u32,
        rows: u32,
        view_width: u32,
        view_height: u32,
    },
    #[error("Quilt layout {columns}x{rows} of {view_width}x{view_height} views does not fit in 32 bits")]
    TooLarge {
        columns: u32,
        rows: u32,
        view_width: u32,
        view_height: u32,
    },
    #[error("Quilt target has no colour texture")]
    MissingTexture,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Tile grid and per-view size of a quilt
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuiltSettings {
    pub columns: u32,
    pub rows: u32,
    pub view_width: u32,
    pub view_height: u32,
    /// Aspect ratio of the physical display each view is projected for
    pub aspect: f32,
}

impl QuiltSettings {
    pub fn new(columns: u32, rows: u32, view_width: u32, view_height: u32) -> Self {
        let aspect = if view_height > 0 {
            view_width as f32 / view_height as f32
        } else {
            1.0
        };
        Self {
            columns,
            rows,
            view_width,
            view_height,
            aspect,
        }
    }

    /// Portrait panel: 8x6 views of 420x560
    pub fn portrait() -> Self {
        Self::new(8, 6, 420, 560)
    }

    /// Landscape panel: 5x9 views of 819x455
    pub fn landscape() -> Self {
        Self::new(5, 9, 819, 455).with_aspect(16.0 / 9.0)
    }

    /// One view covering the whole target
    pub fn single(width: u32, height: u32) -> Self {
        Self::new(1, 1, width, height)
    }

    pub fn with_aspect(self, aspect: f32) -> Self {
        Self { aspect, ..self }
    }

    /// Parse a grid such as `"8x6"` using the portrait view size
    pub fn from_grid_str(grid: &str) -> Result<Self, QuiltError> {
        let (columns, rows) =
            parse_dimensions(grid).ok_or_else(|| QuiltError::InvalidGrid(grid.to_string()))?;
        let portrait = Self::portrait();
        let settings = Self::new(columns, rows, portrait.view_width, portrait.view_height);
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), QuiltError> {
        if self.columns == 0 || self.rows == 0 || self.view_width == 0 || self.view_height == 0 {
            return Err(QuiltError::EmptyLayout {
                columns: self.columns,
                rows: self.rows,
                view_width: self.view_width,
                view_height: self.view_height,
            });
        }
        let fits = self.columns.checked_mul(self.rows).is_some()
            && self.columns.checked_mul(self.view_width).is_some()
            && self.rows.checked_mul(self.view_height).is_some();
        if !fits {
            return Err(QuiltError::TooLarge {
                columns: self.columns,
                rows: self.rows,
                view_width: self.view_width,
                view_height: self.view_height,
            });
        }
        Ok(())
    }

    pub fn view_count(&self) -> u32 {
        self.columns.saturating_mul(self.rows)
    }

    /// Width of the whole quilt in pixels; saturates on layouts `validate` rejects
    pub fn width(&self) -> u32 {
        self.columns.saturating_mul(self.view_width)
    }

    /// Height of the whole quilt in pixels; saturates on layouts `validate` rejects
    pub fn height(&self) -> u32 {
        self.rows.saturating_mul(self.view_height)
    }

    /// Position of view `index` along the sweep, in `[0, 1]`
    pub fn normalized_view(&self, index: u32) -> f32 {
        let count = self.view_count();
        if count <= 1 {
            return SINGLE_VIEW_PARAMETER;
        }
        index as f32 / (count - 1) as f32
    }

    /// Tile at authored `row` (0 at the top) and `col`; `None` outside the grid
    pub fn tile(&self, row: u32, col: u32) -> Option<QuiltTile> {
        if row >= self.rows || col >= self.columns {
            return None;
        }
        let inverted_row = self.rows - 1 - row;
        let view_index = row * self.columns + col;
        Some(QuiltTile {
            row,
            col,
            view_index,
            normalized_view: self.normalized_view(view_index),
            viewport: Viewport::new(
                (col * self.view_width) as f32,
                (inverted_row * self.view_height) as f32,
                self.view_width as f32,
                self.view_height as f32,
            ),
        })
    }

    /// Tiles in view order: row by row from the top, left to right
    pub fn tiles(&self) -> impl Iterator<Item = QuiltTile> + '_ {
        (0..self.rows).flat_map(move |row| (0..self.columns).filter_map(move |col| self.tile(row, col)))
    }
}

impl Default for QuiltSettings {
    fn default() -> Self {
        Self::portrait()
    }
}

/// Parse `"<a>x<b>"` (also accepts `X` and `*`)
pub fn parse_dimensions(text: &str) -> Option<(u32, u32)> {
    let (a, b) = text.trim().split_once(&['x', 'X', '*'][..])?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}

/// One cell of the quilt
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuiltTile {
    /// Authored row, 0 at the top
    pub row: u32,
    pub col: u32,
    pub view_index: u32,
    pub normalized_view: f32,
    /// Destination rectangle, bottom-left origin
    pub viewport: Viewport,
}

/// Owns the quilt render target and draws a scene into every tile
pub struct QuiltCompositor {
    settings: QuiltSettings,
    format: TextureFormat,
    target: RenderTargetHandle,
}

impl QuiltCompositor {
    /// sRGB like the window surface, so quilt and window show the same colours
    pub const FORMAT: TextureFormat = TextureFormat::Rgba8UnormSrgb;

    pub fn new(backend: &mut dyn GraphicsBackend, settings: QuiltSettings) -> Result<Self, QuiltError> {
        let target = Self::create_target(backend, &settings)?;
        log::info!(
            "Quilt target {}x{} ({}x{} views of {}x{})",
            settings.width(),
            settings.height(),
            settings.columns,
            settings.rows,
            settings.view_width,
            settings.view_height
        );
        Ok(Self {
            settings,
            format: Self::FORMAT,
            target,
        })
    }

    fn create_target(
        backend: &mut dyn GraphicsBackend,
        settings: &QuiltSettings,
    ) -> Result<RenderTargetHandle, QuiltError> {
        settings.validate()?;
        Ok(backend.create_render_target(&RenderTargetDescriptor {
            label: Some("quilt".to_string()),
            width: settings.width(),
            height: settings.height(),
            format: Self::FORMAT,
        })?)
    }

    pub fn settings(&self) -> &QuiltSettings {
        &self.settings
    }

    pub fn target(&self) -> RenderTargetHandle {
        self.target
    }

    /// Switch layout, recreating the target only when its size changes
    pub fn reconfigure(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        settings: QuiltSettings,
    ) -> Result<(), QuiltError> {
        if settings.width() != self.settings.width() || settings.height() != self.settings.height() {
            let target = Self::create_target(backend, &settings)?;
            backend.destroy_render_target(std::mem::replace(&mut self.target, target));
        } else {
            settings.validate()?;
        }
        self.settings = settings;
        Ok(())
    }

    /// Clear the quilt and draw `scene` once per tile.
    ///
    /// With no scene the quilt is only cleared.
    pub fn render(
        &self,
        backend: &mut dyn GraphicsBackend,
        resources: &mut ResourceManager,
        scene: Option<&Scene>,
        clear_color: [f32; 4],
    ) -> Result<QuiltFrame, QuiltError> {
        backend.bind_render_target(Some(self.target));
        backend.clear(clear_color, 1.0);

        if let Some(scene) = scene {
            for tile in self.settings.tiles() {
                backend.set_viewport(tile.viewport);
                scene.render_view(backend, resources, tile.normalized_view, true, self.settings.aspect);
            }
        }

        backend.bind_render_target(None);
        self.frame(backend)
    }

    /// Description of the quilt texture for a display
    pub fn frame(&self, backend: &dyn GraphicsBackend) -> Result<QuiltFrame, QuiltError> {
        let texture = backend
            .render_target_texture(self.target)
            .ok_or(QuiltError::MissingTexture)?;
        Ok(QuiltFrame {
            texture,
            format: self.format,
            width: self.settings.width(),
            height: self.settings.height(),
            columns: self.settings.columns,
            rows: self.settings.rows,
            aspect: self.settings.aspect,
        })
    }

    pub fn release(self, backend: &mut dyn GraphicsBackend) {
        backend.destroy_render_target(self.target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Command, RecordingBackend};
    use crate::scene::test_support::Fixture;
    use crate::scene::CameraRig;

    #[test]
    fn tile_viewport_flips_rows() {
        let settings = QuiltSettings::new(10, 10, 64, 32);
        let tile = settings.tile(2, 3).unwrap();
        assert_eq!(tile.viewport, Viewport::new(3.0 * 64.0, 7.0 * 32.0, 64.0, 32.0));
        assert_eq!(tile.view_index, 23);
        assert_eq!(tile.normalized_view, 23.0 / 99.0);
    }

    #[test]
    fn tile_outside_grid_is_none() {
        let settings = QuiltSettings::new(4, 3, 10, 20);
        assert!(settings.tile(3, 0).is_none());
        assert!(settings.tile(0, 4).is_none());
        assert!(settings.tile(2, 3).is_some());
    }

    #[test]
    fn oversized_layout_is_rejected() {
        let settings = QuiltSettings::new(70_000, 2, 70_000, 10);
        assert!(matches!(settings.validate(), Err(QuiltError::TooLarge { .. })));
        assert_eq!(settings.width(), u32::MAX);

        let mut backend = RecordingBackend::default();
        assert!(matches!(
            QuiltCompositor::new(&mut backend, settings),
            Err(QuiltError::TooLarge { .. })
        ));
    }

    #[test]
    fn tiles_cover_target_once() {
        let settings = QuiltSettings::new(4, 3, 10, 20);
        let tiles: Vec<_> = settings.tiles().collect();
        assert_eq!(tiles.len(), 12);
        assert_eq!(tiles.first().unwrap().normalized_view, 0.0);
        assert_eq!(tiles.last().unwrap().normalized_view, 1.0);
        // Top-left authored tile sits on the top row of the target
        assert_eq!(tiles[0].viewport.y, 40.0);
        assert_eq!(tiles[11].viewport, Viewport::new(30.0, 0.0, 10.0, 20.0));
    }

    #[test]
    fn single_view_is_centred() {
        let settings = QuiltSettings::single(300, 200);
        let tiles: Vec<_> = settings.tiles().collect();
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].normalized_view, SINGLE_VIEW_PARAMETER);
        assert_eq!(tiles[0].viewport, Viewport::full(300, 200));
    }

    #[test]
    fn grid_strings() {
        let settings = QuiltSettings::from_grid_str("5x9").unwrap();
        assert_eq!((settings.columns, settings.rows), (5, 9));
        assert!(matches!(QuiltSettings::from_grid_str("5by9"), Err(QuiltError::InvalidGrid(_))));
        assert!(matches!(QuiltSettings::from_grid_str("0x9"), Err(QuiltError::EmptyLayout { .. })));
        assert_eq!(parse_dimensions(" 420 X 560 "), Some((420, 560)));
    }

    #[test]
    fn render_draws_every_tile_into_quilt_target() {
        let mut fx = Fixture::new();
        let mut scene = Scene::new("main", CameraRig::default());
        let quad = fx.mesh("quad");
        scene.add_mesh(&mut fx.backend, quad).unwrap();

        let compositor = QuiltCompositor::new(&mut fx.backend, QuiltSettings::new(3, 2, 8, 8)).unwrap();
        let frame = compositor
            .render(&mut fx.backend, &mut fx.resources, Some(&scene), [0.0; 4])
            .unwrap();

        let draws = fx.backend.draws();
        assert_eq!(draws.len(), 6);
        assert!(draws.iter().all(|d| d.target == Some(compositor.target())));
        assert_eq!(draws[0].viewport, Some(Viewport::new(0.0, 8.0, 8.0, 8.0)));
        assert_eq!((frame.width, frame.height, frame.view_count()), (24, 16, 6));
        assert_eq!(fx.backend.commands().last(), Some(&Command::BindRenderTarget(None)));
    }

    #[test]
    fn quilt_is_stored_srgb_encoded() {
        let mut fx = Fixture::new();
        let compositor = QuiltCompositor::new(&mut fx.backend, QuiltSettings::new(1, 1, 2, 2)).unwrap();
        let frame = compositor
            .render(&mut fx.backend, &mut fx.resources, None, [0.5, 0.5, 0.5, 0.5])
            .unwrap();
        assert!(frame.format.is_srgb());

        let readback = fx.backend.read_texture(frame.texture).unwrap();
        assert_eq!(&readback.data[..4], &[188, 188, 188, 128]);
    }

    #[test]
    fn reconfigure_keeps_target_when_size_matches() {
        let mut backend = RecordingBackend::default();
        let mut compositor = QuiltCompositor::new(&mut backend, QuiltSettings::new(4, 2, 10, 10)).unwrap();
        let target = compositor.target();

        compositor
            .reconfigure(&mut backend, QuiltSettings::new(2, 4, 20, 5))
            .unwrap();
        assert_eq!(compositor.target(), target);

        compositor
            .reconfigure(&mut backend, QuiltSettings::new(8, 6, 10, 10))
            .unwrap();
        assert_ne!(compositor.target(), target);
        assert_eq!(backend.live_textures(), 0);
        compositor.release(&mut backend);
    }
}
