//! Hand-off point to a light-field display
//!
//! Device SDKs live outside this crate. A [`LightfieldDisplay`] reports the
//! quilt layout it wants and receives the finished quilt texture every frame.

use crate::backend::{TextureFormat, TextureHandle};
use crate::quilt::QuiltSettings;

/// The composited quilt of one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuiltFrame {
    pub texture: TextureHandle,
    /// sRGB encoded, matching what the window surface shows
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
    pub columns: u32,
    pub rows: u32,
    /// Aspect ratio of the physical display
    pub aspect: f32,
}

impl QuiltFrame {
    pub fn view_count(&self) -> u32 {
        self.columns * self.rows
    }
}

/// A device that consumes quilts
pub trait LightfieldDisplay {
    /// Human readable device name
    fn name(&self) -> &str;

    /// Quilt layout the device expects
    fn settings(&self) -> QuiltSettings;

    /// Receive the quilt rendered this frame
    fn present(&mut self, frame: &QuiltFrame);
}

/// In-process display that remembers what it was shown
#[derive(Debug, Clone)]
pub struct VirtualDisplay {
    name: String,
    settings: QuiltSettings,
    last_frame: Option<QuiltFrame>,
    frames_presented: u64,
}

impl VirtualDisplay {
    pub fn new(name: impl Into<String>, settings: QuiltSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            last_frame: None,
            frames_presented: 0,
        }
    }

    pub fn last_frame(&self) -> Option<&QuiltFrame> {
        self.last_frame.as_ref()
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }
}

impl Default for VirtualDisplay {
    fn default() -> Self {
        Self::new("virtual", QuiltSettings::portrait())
    }
}

impl LightfieldDisplay for VirtualDisplay {
    fn name(&self) -> &str {
        &self.name
    }

    fn settings(&self) -> QuiltSettings {
        self.settings
    }

    fn present(&mut self, frame: &QuiltFrame) {
        if self.last_frame.is_none() {
            log::info!(
                "{}: first quilt {}x{} ({}x{} views)",
                self.name,
                frame.width,
                frame.height,
                frame.columns,
                frame.rows
            );
        }
        self.last_frame = Some(*frame);
        self.frames_presented += 1;
    }
}
