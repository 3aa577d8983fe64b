use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use resvg::render;
use std::io::Cursor;
use tiny_skia::Pixmap;
use usvg::{Options, Tree};

use super::{DetectionMethod, DetectionResult};

/// SVG of the source image with every detected question box stroked on top.
pub fn render_overlay_svg(image_bytes: &[u8], image_mime: &str, result: &DetectionResult) -> String {
    let encoded = BASE64.encode(image_bytes);
    let data_uri = format!("data:{};base64,{}", image_mime, encoded);
    let (w, h) = (result.image_width, result.image_height);
    let stroke = stroke_color(result.method);
    let stroke_width = (w.max(h) / 400).max(2);

    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#
    ));
    svg.push_str(&format!(
        r#"<image href="{uri}" xlink:href="{uri}" x="0" y="0" width="{w}" height="{h}" preserveAspectRatio="none"/>"#,
        uri = data_uri
    ));

    for question in &result.questions {
        svg.push_str(&format!(
            r#"<rect x="{x}" y="{y}" width="{qw}" height="{qh}" fill="none" stroke="{stroke}" stroke-width="{stroke_width}"/>"#,
            x = question.x,
            y = question.y,
            qw = question.width,
            qh = question.height,
        ));
    }

    svg.push_str("</svg>");
    svg
}

pub fn render_overlay_png(image_bytes: &[u8], result: &DetectionResult) -> Result<Vec<u8>> {
    if !result.success {
        return Err(anyhow!("cannot render overlay for a failed detection"));
    }
    let format = image::guess_format(image_bytes).with_context(|| "unknown image format")?;
    let mime = format.to_mime_type();
    let svg = render_overlay_svg(image_bytes, mime, result);
    rasterize_svg(&svg)
}

fn rasterize_svg(svg: &str) -> Result<Vec<u8>> {
    let tree = Tree::from_str(svg, &Options::default()).with_context(|| "failed to parse SVG")?;
    let size = tree.size().to_int_size();
    let mut pixmap =
        Pixmap::new(size.width(), size.height()).ok_or_else(|| anyhow!("empty SVG size"))?;
    let mut pixmap_mut = pixmap.as_mut();
    render(&tree, tiny_skia::Transform::identity(), &mut pixmap_mut);
    let image = image::RgbaImage::from_raw(size.width(), size.height(), pixmap.data().to_vec())
        .ok_or_else(|| anyhow!("failed to build image buffer from SVG"))?;
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .with_context(|| "failed to encode overlay image")?;
    Ok(bytes)
}

fn stroke_color(method: DetectionMethod) -> &'static str {
    match method {
        DetectionMethod::Contours => "#00c853",
        DetectionMethod::Lines => "#2962ff",
        DetectionMethod::Fallback => "#ff6d00",
        DetectionMethod::Error => "#d50000",
    }
}
