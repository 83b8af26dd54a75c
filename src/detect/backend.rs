use anyhow::Result;
use image::RgbImage;

use crate::detect::result::RawDetection;

/// Channel order a backend expects its input raster in.
///
/// Working rasters are always stored as `RgbImage`; for `Bgr` the first and
/// third channel of every pixel are swapped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorOrder {
    #[default]
    Rgb,
    Bgr,
}

/// Detector backend trait.
///
/// A backend wraps a loaded model and scores one preprocessed raster at a time.
/// It performs no domain filtering; every candidate the model produces is
/// returned and the label policy decides what survives.
///
/// Backends are loaded once per run and reused for every frame. `Send` keeps the
/// door open for moving a backend onto a worker thread.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Channel order of the rasters passed to `detect`.
    fn input_color(&self) -> ColorOrder {
        ColorOrder::Rgb
    }

    /// Run detection on a preprocessed raster.
    ///
    /// Boxes are in the raster's pixel coordinates. Out-of-bounds boxes are
    /// allowed; the engine clamps them.
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook, called once when the engine is built.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
