//! Overlay drawing for the table-detection debug view.
//!
//! Works on an already rendered page image; `scale` converts PDF points to
//! pixels. Cells are tinted blue, then ruling edges are drawn in red on top.

use super::lattice::{Edge, Orientation, TableFinding};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

const EDGE_COLOUR: Rgba<u8> = Rgba([230, 30, 30, 255]);
const CELL_COLOUR: Rgba<u8> = Rgba([40, 90, 230, 255]);
const CELL_TINT_ALPHA: f32 = 0.2;

/// Draw detected cells and edges onto a page image.
pub fn overlay(page: DynamicImage, finding: &TableFinding, scale: f32) -> RgbaImage {
    let mut img = page.to_rgba8();

    for cell in &finding.cells {
        let (x0, y0) = to_px(cell.x0, cell.top, scale);
        let (x1, y1) = to_px(cell.x1, cell.bottom, scale);
        tint_rect(&mut img, x0, y0, x1, y1);
        outline_rect(&mut img, x0, y0, x1, y1, CELL_COLOUR);
    }

    for edge in &finding.edges {
        draw_edge(&mut img, edge, scale);
    }

    img
}

/// PNG-encode an image.
pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

fn to_px(x: f32, y: f32, scale: f32) -> (i64, i64) {
    ((x * scale).round() as i64, (y * scale).round() as i64)
}

fn put(img: &mut RgbaImage, x: i64, y: i64, colour: Rgba<u8>) {
    if x < 0 || y < 0 || x >= img.width() as i64 || y >= img.height() as i64 {
        return;
    }
    img.put_pixel(x as u32, y as u32, colour);
}

fn draw_edge(img: &mut RgbaImage, edge: &Edge, scale: f32) {
    let (x0, y0, x1, y1) = edge.endpoints();
    let (x0, y0) = to_px(x0, y0, scale);
    let (x1, y1) = to_px(x1, y1, scale);
    match edge.orientation {
        Orientation::Horizontal => {
            for x in x0..=x1 {
                put(img, x, y0, EDGE_COLOUR);
            }
        }
        Orientation::Vertical => {
            for y in y0..=y1 {
                put(img, x0, y, EDGE_COLOUR);
            }
        }
    }
}

fn outline_rect(img: &mut RgbaImage, x0: i64, y0: i64, x1: i64, y1: i64, colour: Rgba<u8>) {
    for x in x0..=x1 {
        put(img, x, y0, colour);
        put(img, x, y1, colour);
    }
    for y in y0..=y1 {
        put(img, x0, y, colour);
        put(img, x1, y, colour);
    }
}

fn tint_rect(img: &mut RgbaImage, x0: i64, y0: i64, x1: i64, y1: i64) {
    let (w, h) = (img.width() as i64, img.height() as i64);
    for y in y0.max(0)..y1.min(h) {
        for x in x0.max(0)..x1.min(w) {
            let px = img.get_pixel_mut(x as u32, y as u32);
            for c in 0..3 {
                let base = px.0[c] as f32;
                let tint = CELL_COLOUR.0[c] as f32;
                px.0[c] = (base + (tint - base) * CELL_TINT_ALPHA).round() as u8;
            }
        }
    }
}
