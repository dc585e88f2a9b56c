//! SDL2 Window Display Module
//! Creates one window and tiles every shown camera into it, uploading each
//! camera's staging surface into a streaming texture once per tick.

use std::collections::HashMap;

use sdl2::event::Event;
use sdl2::keyboard::Keycode;
use sdl2::pixels::{Color, PixelFormatEnum};
use sdl2::rect::Rect;
use sdl2::render::{Texture, TextureCreator};
use sdl2::video::WindowContext;
use tracing::{debug, info};

use crate::app::ViewerApp;
use crate::display::surface::{RenderLayout, RenderSurface, SurfaceUpdate};
use crate::error::{Result, ViewerError};
use crate::session::CameraId;
use crate::DisplayConfig;

/// Ticks between periodic statistics log lines (~2s at vsync).
const STATS_LOG_TICKS: u64 = 120;

struct CameraView<'a> {
    surface: RenderSurface,
    texture: Option<Texture<'a>>,
}

impl<'a> CameraView<'a> {
    fn new() -> Self {
        Self {
            surface: RenderSurface::new(),
            texture: None,
        }
    }

    /// Pull the camera's slot and keep the texture in sync: recreated on
    /// reallocation (or when this view is fresh and has none yet), updated
    /// in place otherwise.
    fn sync(
        &mut self,
        slot: &crate::capture::FrameSlot,
        creator: &'a TextureCreator<WindowContext>,
    ) -> Result<()> {
        let update = self.surface.refresh(slot);
        if update == SurfaceUpdate::Unchanged {
            return Ok(());
        }
        if (update == SurfaceUpdate::Reallocated || self.texture.is_none())
            && self.surface.width() > 0
            && self.surface.height() > 0
        {
            let texture = creator
                .create_texture_streaming(
                    PixelFormatEnum::RGB24,
                    self.surface.width(),
                    self.surface.height(),
                )
                .map_err(|e| ViewerError::Display(e.to_string()))?;
            self.texture = Some(texture);
        }
        self.upload()
    }

    fn upload(&mut self) -> Result<()> {
        let Some(texture) = self.texture.as_mut() else {
            return Ok(());
        };
        let surface = &self.surface;
        texture
            .with_lock(None, |buffer, pitch| pack_rgb24(surface, buffer, pitch))
            .map_err(ViewerError::Display)
    }
}

/// Expand the staged pixels into the RGB24 texture buffer.
fn pack_rgb24(surface: &RenderSurface, out: &mut [u8], pitch: usize) {
    let Some(layout) = surface.layout() else {
        return;
    };
    let (width, height) = (surface.width() as usize, surface.height() as usize);
    let src = surface.pixels();
    let bpp = layout.bytes_per_pixel();

    for y in 0..height {
        let row = &mut out[y * pitch..y * pitch + width * 3];
        for x in 0..width {
            let p = &src[(y * width + x) * bpp..];
            let (r, g, b) = match layout {
                RenderLayout::Gray8 => (p[0], p[0], p[0]),
                // wide samples are already full-range; the high byte is enough
                RenderLayout::Gray16 => {
                    let v = u16::from_ne_bytes([p[0], p[1]]);
                    let hi = (v >> 8) as u8;
                    (hi, hi, hi)
                }
                RenderLayout::Rgb8 => (p[0], p[1], p[2]),
                RenderLayout::Bgr8 => (p[2], p[1], p[0]),
                RenderLayout::Rgba8 => (p[0], p[1], p[2]),
                RenderLayout::Bgra8 => (p[2], p[1], p[0]),
                RenderLayout::Rgb16 => (
                    (u16::from_ne_bytes([p[0], p[1]]) >> 8) as u8,
                    (u16::from_ne_bytes([p[2], p[3]]) >> 8) as u8,
                    (u16::from_ne_bytes([p[4], p[5]]) >> 8) as u8,
                ),
                RenderLayout::Bgr16 => (
                    (u16::from_ne_bytes([p[4], p[5]]) >> 8) as u8,
                    (u16::from_ne_bytes([p[2], p[3]]) >> 8) as u8,
                    (u16::from_ne_bytes([p[0], p[1]]) >> 8) as u8,
                ),
            };
            row[x * 3] = r;
            row[x * 3 + 1] = g;
            row[x * 3 + 2] = b;
        }
    }
}

/// Aspect-preserving fit of a source image into a destination cell.
fn fit_rect(src_w: u32, src_h: u32, cell: Rect) -> Rect {
    if src_w == 0 || src_h == 0 {
        return cell;
    }
    let mut w = cell.width();
    let mut h = ((src_h as f32 / src_w as f32) * w as f32).round() as u32;
    if h > cell.height() {
        h = cell.height();
        w = ((src_w as f32 / src_h as f32) * h as f32).round() as u32;
    }
    Rect::new(
        cell.x() + ((cell.width() - w) / 2) as i32,
        cell.y() + ((cell.height() - h) / 2) as i32,
        w,
        h,
    )
}

/// Grid cell for the i-th of n tiles inside the window.
fn grid_cell(index: usize, count: usize, win_w: u32, win_h: u32) -> Rect {
    let cols = (count as f32).sqrt().ceil().max(1.0) as usize;
    let rows = count.div_ceil(cols);
    let cell_w = win_w / cols as u32;
    let cell_h = win_h / rows as u32;
    Rect::new(
        ((index % cols) as u32 * cell_w) as i32,
        ((index / cols) as u32 * cell_h) as i32,
        cell_w,
        cell_h,
    )
}

/// Run the display loop until quit. One tick per vsync: handle input, pull
/// every shown camera's slot, redraw.
pub fn run(mut app: ViewerApp, config: &DisplayConfig) -> Result<()> {
    let sdl = sdl2::init().map_err(ViewerError::Display)?;
    let video = sdl.video().map_err(ViewerError::Display)?;
    let window = video
        .window("Argos ViewFinder", config.width, config.height)
        .position_centered()
        .resizable()
        .build()
        .map_err(|e| ViewerError::Display(e.to_string()))?;
    let mut canvas = window
        .into_canvas()
        .present_vsync()
        .build()
        .map_err(|e| ViewerError::Display(e.to_string()))?;
    let texture_creator = canvas.texture_creator();
    let mut event_pump = sdl.event_pump().map_err(ViewerError::Display)?;

    let mut views: HashMap<CameraId, CameraView> = HashMap::new();
    let mut selected: usize = 0;
    let mut tick: u64 = 0;

    'running: loop {
        let ids: Vec<CameraId> = app.registry().ids().collect();
        for event in event_pump.poll_iter() {
            match event {
                Event::Quit { .. } => {
                    info!("Quit event received");
                    break 'running;
                }
                Event::KeyDown {
                    keycode: Some(key),
                    ..
                } => {
                    if key == Keycode::Escape || key == Keycode::Q {
                        info!("Quit requested");
                        break 'running;
                    }
                    handle_key(&mut app, &ids, &mut selected, key, &mut views);
                }
                _ => {}
            }
        }

        let shown: Vec<CameraId> = app
            .registry()
            .sessions()
            .filter(|s| s.is_shown())
            .map(|s| s.id())
            .collect();
        views.retain(|id, _| shown.contains(id));

        canvas.set_draw_color(Color::RGB(28, 30, 34));
        canvas.clear();
        let (win_w, win_h) = canvas.window().size();

        for (i, id) in shown.iter().enumerate() {
            let Some(session) = app.registry().session(*id) else {
                continue;
            };
            let view = views.entry(*id).or_insert_with(CameraView::new);
            if let Err(e) = view.sync(session.sink().slot(), &texture_creator) {
                debug!(camera = %id, "texture sync failed: {e}");
                continue;
            }
            if let Some(texture) = &view.texture {
                let cell = grid_cell(i, shown.len(), win_w, win_h);
                let dst = fit_rect(view.surface.width(), view.surface.height(), cell);
                canvas
                    .copy(texture, None, Some(dst))
                    .map_err(ViewerError::Display)?;
            }
        }
        canvas.present();

        tick += 1;
        if tick % STATS_LOG_TICKS == 0 {
            log_stats(&app);
        }
    }
    Ok(())
}

/// Index for the 1..9 window-toggle keys.
fn digit_index(key: Keycode) -> Option<usize> {
    [
        Keycode::Num1,
        Keycode::Num2,
        Keycode::Num3,
        Keycode::Num4,
        Keycode::Num5,
        Keycode::Num6,
        Keycode::Num7,
        Keycode::Num8,
        Keycode::Num9,
    ]
    .iter()
    .position(|k| *k == key)
}

fn handle_key(
    app: &mut ViewerApp,
    ids: &[CameraId],
    selected: &mut usize,
    key: Keycode,
    views: &mut HashMap<CameraId, CameraView>,
) {
    let current = ids.get(*selected).copied();
    if let Some(index) = digit_index(key) {
        if let Some(id) = ids.get(index).copied() {
            *selected = index;
            let shown = app
                .registry()
                .session(id)
                .map(|s| s.is_shown())
                .unwrap_or(false);
            if shown {
                views.remove(&id);
                app.close_window(id);
            } else {
                app.open_window(id);
            }
        }
        return;
    }
    match key {
        Keycode::R => app.refresh(),
        Keycode::Tab => {
            if !ids.is_empty() {
                *selected = (*selected + 1) % ids.len();
            }
        }
        Keycode::S => {
            if let Some(id) = current {
                let capturing = app
                    .registry()
                    .session(id)
                    .map(|s| s.is_capturing())
                    .unwrap_or(false);
                if capturing {
                    app.stop_capture(id);
                } else {
                    app.start_capture(id);
                }
            }
        }
        Keycode::C => app.start_all(),
        Keycode::X => app.stop_all(),
        Keycode::T => {
            if let Some(id) = current {
                views.remove(&id);
                app.reset_session(id);
            }
        }
        Keycode::B => {
            if let Some(id) = current {
                let next = match app.registry().session(id).and_then(|s| s.output_bit()) {
                    None => Some(0),
                    Some(bit) if bit + 1 < crate::dio::PORT_WIDTH => Some(bit + 1),
                    Some(_) => None,
                };
                app.select_bit(id, next);
            }
        }
        Keycode::D => {
            if let Some(port) = app.debug_port() {
                info!("DIO port: {port:08b}");
            }
        }
        Keycode::E => app.clear_error(),
        _ => {}
    }
}

/// Periodic line per shown camera: frame timing, handoff pressure, sensors.
fn log_stats(app: &ViewerApp) {
    if !app.error_line().is_empty() {
        info!("Error: {}", app.error_line());
    }
    for session in app.registry().sessions().filter(|s| s.is_shown()) {
        let (mean_us, std_us) = session.timing();
        let (collisions, stalls) = session.counters();
        let fps = if mean_us > 0.0 { 1e6 / mean_us } else { 0.0 };
        let sensors = session
            .sensors()
            .map(|(names, values)| {
                names
                    .iter()
                    .zip(&values)
                    .map(|(n, v)| format!("{n}={v:.1}C"))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default();
        info!(
            "{}: {:.3} +/- {:.3} ms | {:.2} FPS (max {:.2}) | collisions {} stalls {} | {}",
            session.title(),
            mean_us * 1e-3,
            std_us * 1e-3,
            fps,
            session.expected_fps(),
            collisions,
            stalls,
            sensors,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_preserves_aspect_inside_the_cell() {
        let cell = Rect::new(0, 0, 400, 300);
        let fitted = fit_rect(640, 480, cell);
        assert_eq!(fitted.width(), 400);
        assert_eq!(fitted.height(), 300);

        let wide = fit_rect(1280, 240, cell);
        assert_eq!(wide.width(), 400);
        assert_eq!(wide.height(), 75);

        let tall = fit_rect(100, 300, cell);
        assert_eq!(tall.height(), 300);
        assert_eq!(tall.width(), 100);
    }

    #[test]
    fn grid_squares_off_for_small_counts() {
        assert_eq!(grid_cell(0, 1, 800, 600), Rect::new(0, 0, 800, 600));
        let first = grid_cell(0, 4, 800, 600);
        assert_eq!((first.width(), first.height()), (400, 300));
        let last = grid_cell(3, 4, 800, 600);
        assert_eq!((last.x(), last.y()), (400, 300));
    }
}
