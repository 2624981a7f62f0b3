use anyhow::{anyhow, Result};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use tiny_skia::{
    FilterQuality, LineCap, LineJoin, Paint, PathBuilder, Pixmap, PixmapPaint, Stroke, Transform,
};

use crate::action::{ActionId, DrawingAction, PathAction, TextAction};
use crate::font::FontMetrics;
use crate::transform::Viewport;

/// Composite the scene into a fresh pixel buffer sized to the container.
/// Pure: the same inputs always produce the same buffer, and nothing else is
/// touched. The active text object is suppressed so the host's live overlay
/// proxy is the only thing rendering it.
pub fn render(
    source: &RgbaImage,
    viewport: &Viewport,
    actions: &[DrawingAction],
    active_text: Option<ActionId>,
    container: (u32, u32),
    metrics: &FontMetrics,
) -> Result<RgbaImage> {
    compose(source, viewport, actions, active_text, container, metrics)
}

pub(crate) fn compose(
    source: &RgbaImage,
    viewport: &Viewport,
    actions: &[DrawingAction],
    skip_text: Option<ActionId>,
    size: (u32, u32),
    metrics: &FontMetrics,
) -> Result<RgbaImage> {
    let (out_w, out_h) = (size.0.max(1), size.1.max(1));
    let mut pixmap =
        Pixmap::new(out_w, out_h).ok_or_else(|| anyhow!("cannot allocate pixmap"))?;

    // An untransformed bake must stay bit-exact, so bypass resampling there.
    if *viewport == Viewport::identity() && (source.width(), source.height()) == (out_w, out_h) {
        pixmap.data_mut().copy_from_slice(source.as_raw());
    } else {
        let base = pixmap_from_image(source)?;
        let paint = PixmapPaint {
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        pixmap.draw_pixmap(0, 0, base.as_ref(), &paint, viewport.to_skia(), None);
    }

    for action in actions {
        if let DrawingAction::Path(path) = action {
            stroke_path(&mut pixmap, path, viewport)?;
        }
    }

    let mut output = RgbaImage::from_raw(out_w, out_h, pixmap.data().to_vec())
        .ok_or_else(|| anyhow!("cannot construct output image"))?;

    for action in actions {
        if let DrawingAction::Text(text) = action {
            if skip_text == Some(text.id) {
                continue;
            }
            draw_rotated_text(&mut output, text, viewport, metrics);
        }
    }

    Ok(output)
}

fn pixmap_from_image(image: &RgbaImage) -> Result<Pixmap> {
    let mut pixmap = Pixmap::new(image.width().max(1), image.height().max(1))
        .ok_or_else(|| anyhow!("cannot allocate pixmap"))?;
    let data = pixmap.data_mut();
    if data.len() != image.as_raw().len() {
        return Err(anyhow!("source image and pixmap size mismatch"));
    }
    data.copy_from_slice(image.as_raw());
    Ok(pixmap)
}

fn stroke_path(pixmap: &mut Pixmap, path: &PathAction, viewport: &Viewport) -> Result<()> {
    // A single-point stroke has no visible extent yet.
    let [first, rest @ ..] = path.points.as_slice() else {
        return Ok(());
    };
    if rest.is_empty() {
        return Ok(());
    }

    let mut pb = PathBuilder::new();
    pb.move_to(first.x, first.y);
    for point in rest {
        pb.line_to(point.x, point.y);
    }
    let built = pb.finish().ok_or_else(|| anyhow!("cannot build stroke path"))?;
    let built = built
        .transform(viewport.to_skia())
        .ok_or_else(|| anyhow!("cannot transform stroke path"))?;

    let mut paint = Paint::default();
    let [r, g, b, a] = path.color.rgba();
    paint.set_color_rgba8(r, g, b, a);
    paint.anti_alias = true;

    let stroke = Stroke {
        width: (path.stroke_width * viewport.scale).max(0.1),
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        ..Stroke::default()
    };

    pixmap.stroke_path(&built, &paint, &stroke, Transform::identity(), None);
    Ok(())
}

fn draw_rotated_text(
    output: &mut RgbaImage,
    text: &TextAction,
    viewport: &Viewport,
    metrics: &FontMetrics,
) {
    // Without a font there is nothing to rasterize; the caller already knows
    // metrics fall back to estimates.
    let Some(font) = metrics.font() else {
        return;
    };
    let px = text.font_size * viewport.scale;
    if px < 1.0 || text.text.is_empty() {
        return;
    }

    let (text_w, text_h) = text_size(px, font, &text.text);
    let (text_w, text_h) = (text_w.max(0) as u32, text_h.max(0) as u32);
    if text_w == 0 || text_h == 0 {
        return;
    }

    // Square sprite large enough that any rotation stays inside it.
    let side = (text_w as f64).hypot(text_h as f64).ceil() as u32 + 2;
    let mut sprite = RgbaImage::new(side, side);
    draw_text_mut(
        &mut sprite,
        Rgba(text.color.rgba()),
        ((side - text_w) / 2) as i32,
        ((side - text_h) / 2) as i32,
        px,
        font,
        &text.text,
    );

    let sprite = if text.rotation.abs() > f32::EPSILON {
        rotate_about_center(
            &sprite,
            text.rotation,
            Interpolation::Bilinear,
            Rgba([0, 0, 0, 0]),
        )
    } else {
        sprite
    };

    let screen = viewport.to_screen(text.anchor());
    let left = (screen.x - side as f32 / 2.0).round() as i64;
    let top = (screen.y - side as f32 / 2.0).round() as i64;
    image::imageops::overlay(output, &sprite, left, top);
}
