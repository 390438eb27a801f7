//! Bar presenters
//!
//! A presenter turns a [`FrameDescription`] into something visible. The
//! shell service owns exactly one presenter and hands it every frame it
//! decides to draw.
//!
//! - [`LogPresenter`] logs a one-line summary (and the full frame as JSON at
//!   debug level).
//! - [`PixmapPresenter`] rasterizes the bar with tiny-skia and can write each
//!   frame to a PNG snapshot.
//! - [`RecordingPresenter`] keeps every frame in memory for tests.
//!
//! There is no font rasterizer; text is drawn as solid blocks sized by
//! character count, which is enough to see layout and ordering.

use super::frame::FrameDescription;
use crate::channel::{ProcessId, StatusHandle};
use crate::config::{parse_hex_color, BarConfig};
use anyhow::{Context, Result};
use log::{debug, info};
use parking_lot::Mutex;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const PADDING: f32 = 8.0;
const CHAR_WIDTH: f32 = 7.0;
const ICON_GAP: f32 = 6.0;

/// Something that can show the bar
pub trait BarPresenter {
    fn present(&mut self, frame: &FrameDescription) -> Result<()>;

    /// The tray item drawn at a bar position, if this presenter knows its layout
    fn tray_item_at(&self, _x: f32, _y: f32) -> Option<(ProcessId, StatusHandle)> {
        None
    }
}

impl<P: BarPresenter + ?Sized> BarPresenter for Box<P> {
    fn present(&mut self, frame: &FrameDescription) -> Result<()> {
        (**self).present(frame)
    }

    fn tray_item_at(&self, x: f32, y: f32) -> Option<(ProcessId, StatusHandle)> {
        (**self).tray_item_at(x, y)
    }
}

/// Logs frames instead of drawing them
#[derive(Debug, Default)]
pub struct LogPresenter {
    frames: u64,
}

impl LogPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl BarPresenter for LogPresenter {
    fn present(&mut self, frame: &FrameDescription) -> Result<()> {
        self.frames += 1;
        let app = frame
            .app_menu
            .as_ref()
            .map(|menu| menu.app_name.as_str())
            .unwrap_or("-");
        info!(
            "🖼️ Bar frame {}: app={} menus={} tray={} clock={}",
            self.frames,
            app,
            frame.app_menu.as_ref().map_or(0, |menu| menu.titles.len()),
            frame.tray.len(),
            frame.clock
        );
        debug!("Frame {}: {}", self.frames, serde_json::to_string(frame)?);
        Ok(())
    }
}

/// Keeps every presented frame; clones share the same history
#[derive(Debug, Clone, Default)]
pub struct RecordingPresenter {
    frames: Arc<Mutex<Vec<FrameDescription>>>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<FrameDescription> {
        self.frames.lock().clone()
    }

    pub fn last(&self) -> Option<FrameDescription> {
        self.frames.lock().last().cloned()
    }

    pub fn count(&self) -> usize {
        self.frames.lock().len()
    }
}

impl BarPresenter for RecordingPresenter {
    fn present(&mut self, frame: &FrameDescription) -> Result<()> {
        self.frames.lock().push(frame.clone());
        Ok(())
    }
}

/// Axis-aligned box in bar coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl LayoutRect {
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }

    fn to_skia(self) -> Option<tiny_skia::Rect> {
        tiny_skia::Rect::from_xywh(self.x, self.y, self.width, self.height)
    }
}

/// Where each element of a frame lands on the bar.
///
/// The application name and its menu titles run left to right from the left
/// edge. The clock sits at the right edge with the tray icons to its left,
/// in frame order.
#[derive(Debug, Clone, PartialEq)]
pub struct BarLayout {
    pub app_name: Option<LayoutRect>,
    pub titles: Vec<LayoutRect>,
    pub tray: Vec<(LayoutRect, ProcessId, StatusHandle)>,
    pub clock: LayoutRect,
}

fn text_width(text: &str) -> f32 {
    text.chars().count() as f32 * CHAR_WIDTH
}

impl BarLayout {
    pub fn compute(frame: &FrameDescription, width: u32, height: u32) -> Self {
        let (width, height) = (width as f32, height as f32);
        let inner = (height - PADDING).max(1.0);
        let top = (height - inner) / 2.0;

        let mut x = 0.0;
        let mut app_name = None;
        let mut titles = Vec::new();
        if let Some(menu) = &frame.app_menu {
            let w = text_width(&menu.app_name) + 2.0 * PADDING;
            app_name = Some(LayoutRect { x, y: 0.0, width: w, height });
            x += w;
            for title in &menu.titles {
                let w = text_width(&title.title) + 2.0 * PADDING;
                titles.push(LayoutRect { x, y: top, width: w, height: inner });
                x += w;
            }
        }

        let clock_width = text_width(&frame.clock);
        let clock = LayoutRect {
            x: width - PADDING - clock_width,
            y: top,
            width: clock_width,
            height: inner,
        };

        let icon = inner;
        let count = frame.tray.len() as f32;
        let mut icon_x = clock.x - PADDING - count * (icon + ICON_GAP) + ICON_GAP;
        let tray = frame
            .tray
            .iter()
            .map(|item| {
                let rect = LayoutRect { x: icon_x, y: top, width: icon, height: icon };
                icon_x += icon + ICON_GAP;
                (rect, item.owner, item.handle)
            })
            .collect();

        Self { app_name, titles, tray, clock }
    }

    /// The tray item under a pointer position
    pub fn tray_item_at(&self, x: f32, y: f32) -> Option<(ProcessId, StatusHandle)> {
        self.tray
            .iter()
            .find(|(rect, _, _)| rect.contains(x, y))
            .map(|(_, owner, handle)| (*owner, *handle))
    }
}

#[derive(Debug, Clone, Copy)]
struct Palette {
    background: tiny_skia::Color,
    foreground: tiny_skia::Color,
    active: tiny_skia::Color,
}

fn color(hex: &str) -> tiny_skia::Color {
    let (r, g, b) = parse_hex_color(hex).unwrap_or((0, 0, 0));
    tiny_skia::Color::from_rgba8(r, g, b, 255)
}

/// Software rasterizer for the bar
pub struct PixmapPresenter {
    pixmap: tiny_skia::Pixmap,
    palette: Palette,
    layout: Option<BarLayout>,
    snapshot: Option<PathBuf>,
    frames: u64,
}

impl PixmapPresenter {
    pub fn new(config: &BarConfig) -> Result<Self> {
        let pixmap = tiny_skia::Pixmap::new(config.width, config.height)
            .with_context(|| format!("Invalid bar size {}x{}", config.width, config.height))?;

        Ok(Self {
            pixmap,
            palette: Palette {
                background: color(&config.background),
                foreground: color(&config.foreground),
                active: color(&config.active_background),
            },
            layout: None,
            snapshot: None,
            frames: 0,
        })
    }

    /// Write every presented frame to `path` as PNG
    pub fn with_snapshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot = Some(path.into());
        self
    }

    /// Layout of the last presented frame
    pub fn layout(&self) -> Option<&BarLayout> {
        self.layout.as_ref()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// RGBA of one pixel of the last frame
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let pixel = self.pixmap.pixel(x, y)?;
        Some([pixel.red(), pixel.green(), pixel.blue(), pixel.alpha()])
    }

    fn fill(&mut self, rect: LayoutRect, color: tiny_skia::Color) {
        let Some(rect) = rect.to_skia() else {
            return;
        };
        let mut paint = tiny_skia::Paint::default();
        paint.set_color(color);
        paint.anti_alias = false;
        self.pixmap
            .fill_rect(rect, &paint, tiny_skia::Transform::identity(), None);
    }

    /// A block standing in for a line of text
    fn text_block(&mut self, rect: LayoutRect, color: tiny_skia::Color) {
        let line = LayoutRect {
            x: rect.x,
            y: rect.y + rect.height * 0.3,
            width: rect.width,
            height: (rect.height * 0.4).max(1.0),
        };
        self.fill(line, color);
    }

    fn draw(&mut self, frame: &FrameDescription, layout: &BarLayout) {
        self.pixmap.fill(self.palette.background);
        let fg = self.palette.foreground;
        let mut dimmed = fg;
        dimmed.apply_opacity(0.4);

        if let (Some(rect), Some(_)) = (layout.app_name, &frame.app_menu) {
            self.fill(rect, self.palette.active);
            self.text_block(inset(rect), fg);
        }
        if let Some(menu) = &frame.app_menu {
            for (rect, title) in layout.titles.iter().zip(&menu.titles) {
                self.text_block(inset(*rect), if title.enabled { fg } else { dimmed });
            }
        }
        for (rect, _, _) in &layout.tray {
            self.fill(*rect, fg);
        }
        self.text_block(layout.clock, fg);
    }

    fn write_png(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create snapshot {:?}", path))?;
        let mut encoder = png::Encoder::new(BufWriter::new(file), self.pixmap.width(), self.pixmap.height());
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(self.pixmap.data())?;
        Ok(())
    }
}

fn inset(rect: LayoutRect) -> LayoutRect {
    LayoutRect {
        x: rect.x + PADDING,
        width: (rect.width - 2.0 * PADDING).max(0.0),
        ..rect
    }
}

impl BarPresenter for PixmapPresenter {
    fn present(&mut self, frame: &FrameDescription) -> Result<()> {
        let layout = BarLayout::compute(frame, self.pixmap.width(), self.pixmap.height());
        self.draw(frame, &layout);
        self.layout = Some(layout);
        self.frames += 1;

        if let Some(path) = self.snapshot.clone() {
            self.write_png(&path)?;
            debug!("Wrote bar snapshot {:?}", path);
        }
        Ok(())
    }

    fn tray_item_at(&self, x: f32, y: f32) -> Option<(ProcessId, StatusHandle)> {
        self.layout.as_ref()?.tray_item_at(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::IconRef;
    use crate::shell::frame::{AppMenuFrame, MenuTitle, TrayIconFrame};

    fn sample_frame() -> FrameDescription {
        FrameDescription {
            app_menu: Some(AppMenuFrame {
                owner: ProcessId(1),
                app_name: "Editor".to_string(),
                titles: vec![
                    MenuTitle { title: "File".to_string(), enabled: true, has_submenu: true },
                    MenuTitle { title: "Edit".to_string(), enabled: false, has_submenu: false },
                ],
            }),
            clock: "09:41".to_string(),
            tray: vec![
                TrayIconFrame {
                    owner: ProcessId(1),
                    handle: StatusHandle(1),
                    icon: IconRef::Named("battery".to_string()),
                    title: "Battery".to_string(),
                },
                TrayIconFrame {
                    owner: ProcessId(2),
                    handle: StatusHandle(7),
                    icon: IconRef::None,
                    title: "Mail".to_string(),
                },
            ],
        }
    }

    #[test]
    fn test_layout_keeps_tray_order_left_to_right() {
        let layout = BarLayout::compute(&sample_frame(), 800, 28);

        assert_eq!(layout.titles.len(), 2);
        assert!(layout.titles[0].x < layout.titles[1].x);
        assert_eq!(layout.tray.len(), 2);
        assert!(layout.tray[0].0.x < layout.tray[1].0.x);
        assert!(layout.tray[1].0.x + layout.tray[1].0.width <= layout.clock.x);
        assert!(layout.clock.x + layout.clock.width <= 800.0);
    }

    #[test]
    fn test_tray_hit_testing() {
        let layout = BarLayout::compute(&sample_frame(), 800, 28);
        let (rect, _, _) = layout.tray[1];

        assert_eq!(
            layout.tray_item_at(rect.x + 1.0, rect.y + 1.0),
            Some((ProcessId(2), StatusHandle(7)))
        );
        assert_eq!(layout.tray_item_at(1.0, 1.0), None);
    }

    #[test]
    fn test_pixmap_fills_background() {
        let config = BarConfig::default();
        let mut presenter = PixmapPresenter::new(&config).unwrap();
        presenter
            .present(&FrameDescription {
                app_menu: None,
                clock: String::new(),
                tray: Vec::new(),
            })
            .unwrap();

        let (r, g, b) = parse_hex_color(&config.background).unwrap();
        assert_eq!(presenter.pixel(config.width / 2, 0), Some([r, g, b, 255]));
        assert_eq!(presenter.frames(), 1);
    }

    #[test]
    fn test_active_app_is_highlighted() {
        let config = BarConfig::default();
        let mut presenter = PixmapPresenter::new(&config).unwrap();
        presenter.present(&sample_frame()).unwrap();

        let (r, g, b) = parse_hex_color(&config.active_background).unwrap();
        assert_eq!(presenter.pixel(1, 1), Some([r, g, b, 255]));
        assert!(presenter.layout().unwrap().app_name.is_some());
    }

    #[test]
    fn test_snapshot_is_valid_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bar.png");
        let config = BarConfig {
            width: 320,
            height: 24,
            ..BarConfig::default()
        };

        let mut presenter = PixmapPresenter::new(&config).unwrap().with_snapshot(&path);
        presenter.present(&sample_frame()).unwrap();

        let decoder = png::Decoder::new(File::open(&path).unwrap());
        let reader = decoder.read_info().unwrap();
        let info = reader.info();
        assert_eq!((info.width, info.height), (320, 24));
        assert_eq!(info.color_type, png::ColorType::Rgba);
    }

    #[test]
    fn test_recording_presenter_shares_history() {
        let recorder = RecordingPresenter::new();
        let mut handle = recorder.clone();
        handle.present(&sample_frame()).unwrap();
        handle.present(&sample_frame()).unwrap();

        assert_eq!(recorder.count(), 2);
        assert_eq!(recorder.last(), Some(sample_frame()));
    }

    #[test]
    fn test_log_presenter_counts_frames() {
        let mut presenter = LogPresenter::new();
        presenter.present(&sample_frame()).unwrap();
        assert_eq!(presenter.frames(), 1);
    }
}
