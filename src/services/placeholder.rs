//! Inline SVG placeholders used for demo photos and thumbnails.

pub const DEFAULT_WIDTH: u32 = 800;
pub const DEFAULT_HEIGHT: u32 = 600;
pub const DEFAULT_LABEL: &str = "Photo";
pub const MAX_DIMENSION: u32 = 4096;

/// Render a grey placeholder card with a centered label and a green status
/// dot in the top-right corner.
pub fn render_svg(width: Option<u32>, height: Option<u32>, label: Option<&str>) -> String {
    let width = width.unwrap_or(DEFAULT_WIDTH).clamp(1, MAX_DIMENSION);
    let height = height.unwrap_or(DEFAULT_HEIGHT).clamp(1, MAX_DIMENSION);
    let label = xml_escape(label.filter(|l| !l.is_empty()).unwrap_or(DEFAULT_LABEL));

    let inner_w = width.saturating_sub(20);
    let inner_h = height.saturating_sub(20);
    let dot_x = width.saturating_sub(30);

    format!(
        concat!(
            r#"<svg width="{w}" height="{h}" xmlns="http://www.w3.org/2000/svg">"#,
            r##"<rect width="100%" height="100%" fill="#f3f4f6"/>"##,
            r##"<rect x="10" y="10" width="{iw}" height="{ih}" fill="#e5e7eb" stroke="#d1d5db" stroke-width="2" rx="8"/>"##,
            r##"<text x="50%" y="50%" font-family="Arial, sans-serif" font-size="16" fill="#6b7280" text-anchor="middle" dy="0.3em">{label}</text>"##,
            r##"<circle cx="{dx}" cy="30" r="8" fill="#10b981"/>"##,
            r#"</svg>"#
        ),
        w = width,
        h = height,
        iw = inner_w,
        ih = inner_h,
        dx = dot_x,
        label = label
    )
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
