use anyhow::{anyhow, Context, Result};
use base64::Engine;
use image::{DynamicImage, ImageFormat};

use crate::action::DrawingAction;
use crate::font::FontMetrics;
use crate::render;
use crate::transform::Viewport;

pub const DATA_URI_PREAMBLE: &str = "data:image/png;base64,";

/// Bake every drawing action onto the source image at its original
/// resolution. Text is measured and drawn at its image-space font size, not
/// the on-screen scaled one.
pub fn flatten(
    image: &DynamicImage,
    actions: &[DrawingAction],
    metrics: &FontMetrics,
) -> Result<DynamicImage> {
    let source = image.to_rgba8();
    let output = render::compose(
        &source,
        &Viewport::identity(),
        actions,
        None,
        (image.width(), image.height()),
        metrics,
    )?;
    Ok(DynamicImage::ImageRgba8(output))
}

pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .context("cannot encode PNG")?;
    Ok(buffer.into_inner())
}

pub fn encode_data_uri(image: &DynamicImage) -> Result<String> {
    let png = encode_png(image)?;
    let mut data = String::with_capacity(DATA_URI_PREAMBLE.len() + png.len() * 4 / 3 + 4);
    data.push_str(DATA_URI_PREAMBLE);
    base64::engine::general_purpose::STANDARD.encode_string(&png, &mut data);
    Ok(data)
}

pub fn decode_data_uri(data: &str) -> Result<DynamicImage> {
    if !data.starts_with("data:image/") {
        return Err(anyhow!("not an embedded image"));
    }
    let (_, payload) = data
        .split_once(";base64,")
        .ok_or_else(|| anyhow!("missing base64 payload"))?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .context("invalid base64 image payload")?;
    image::load_from_memory(&bytes).context("cannot decode image data")
}
