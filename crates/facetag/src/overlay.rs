//! Annotated snapshot rendering: a coloured box per face with a name bar.

use facetag_core::MatchResult;
use image::{GrayImage, Rgb, RgbImage};

const KNOWN_COLOR: Rgb<u8> = Rgb([0, 128, 0]);
const UNKNOWN_COLOR: Rgb<u8> = Rgb([200, 0, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const BOX_THICKNESS: i32 = 3;
const GLYPH_SCALE: i32 = 2;
const LABEL_HEIGHT: i32 = 5 * GLYPH_SCALE + 4;

/// Colour a face box by whether its name is known.
fn box_color(result: &MatchResult) -> Rgb<u8> {
    if result.identity.is_known() {
        KNOWN_COLOR
    } else {
        UNKNOWN_COLOR
    }
}

/// Draw every result onto a colour copy of `frame`.
pub fn render(frame: &GrayImage, results: &[MatchResult]) -> RgbImage {
    let mut canvas = RgbImage::from_fn(frame.width(), frame.height(), |x, y| {
        let v = frame.get_pixel(x, y).0[0];
        Rgb([v, v, v])
    });

    for result in results {
        let color = box_color(result);
        let r = result.region;
        for t in 0..BOX_THICKNESS {
            draw_rect_outline(&mut canvas, r.left + t, r.top + t, r.right - t, r.bottom - t, color);
        }
        // Name bar just under the box.
        fill_rect(&mut canvas, r.left, r.bottom, r.right, r.bottom + LABEL_HEIGHT, color);
        draw_text(&mut canvas, r.left + 3, r.bottom + 2, result.identity.name(), TEXT_COLOR);
    }
    canvas
}

fn put(canvas: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < canvas.width() && (y as u32) < canvas.height() {
        canvas.put_pixel(x as u32, y as u32, color);
    }
}

fn draw_rect_outline(
    canvas: &mut RgbImage,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    color: Rgb<u8>,
) {
    if right < left || bottom < top {
        return;
    }
    for x in left..=right {
        put(canvas, x, top, color);
        put(canvas, x, bottom, color);
    }
    for y in top..=bottom {
        put(canvas, left, y, color);
        put(canvas, right, y, color);
    }
}

fn fill_rect(canvas: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    for y in top..bottom {
        for x in left..=right {
            put(canvas, x, y, color);
        }
    }
}

/// 3x5 bitmap glyph, one 3-bit row per entry (MSB = leftmost pixel).
fn glyph(c: char) -> [u8; 5] {
    match c.to_ascii_uppercase() {
        'A' => [2, 5, 7, 5, 5],
        'B' => [6, 5, 6, 5, 6],
        'C' => [3, 4, 4, 4, 3],
        'D' => [6, 5, 5, 5, 6],
        'E' => [7, 4, 6, 4, 7],
        'F' => [7, 4, 6, 4, 4],
        'G' => [3, 4, 5, 5, 3],
        'H' => [5, 5, 7, 5, 5],
        'I' => [7, 2, 2, 2, 7],
        'J' => [1, 1, 1, 5, 2],
        'K' => [5, 5, 6, 5, 5],
        'L' => [4, 4, 4, 4, 7],
        'M' => [5, 7, 7, 5, 5],
        'N' => [6, 5, 5, 5, 5],
        'O' => [2, 5, 5, 5, 2],
        'P' => [6, 5, 6, 4, 4],
        'Q' => [2, 5, 5, 6, 3],
        'R' => [6, 5, 6, 5, 5],
        'S' => [3, 4, 2, 1, 6],
        'T' => [7, 2, 2, 2, 2],
        'U' => [5, 5, 5, 5, 7],
        'V' => [5, 5, 5, 5, 2],
        'W' => [5, 5, 7, 7, 5],
        'X' => [5, 5, 2, 5, 5],
        'Y' => [5, 5, 2, 2, 2],
        'Z' => [7, 1, 2, 4, 7],
        '0' => [7, 5, 5, 5, 7],
        '1' => [2, 6, 2, 2, 7],
        '2' => [7, 1, 7, 4, 7],
        '3' => [7, 1, 7, 1, 7],
        '4' => [5, 5, 7, 1, 1],
        '5' => [7, 4, 7, 1, 7],
        '6' => [7, 4, 7, 5, 7],
        '7' => [7, 1, 2, 4, 4],
        '8' => [7, 5, 7, 5, 7],
        '9' => [7, 5, 7, 1, 7],
        '-' => [0, 0, 7, 0, 0],
        '_' => [0, 0, 0, 0, 7],
        '.' => [0, 0, 0, 0, 2],
        ' ' => [0, 0, 0, 0, 0],
        _ => [7, 1, 2, 0, 2],
    }
}

fn draw_text(canvas: &mut RgbImage, x: i32, y: i32, text: &str, color: Rgb<u8>) {
    let advance = 4 * GLYPH_SCALE;
    for (i, c) in text.chars().enumerate() {
        let ox = x + i as i32 * advance;
        for (row, bits) in glyph(c).iter().enumerate() {
            for col in 0..3 {
                if bits & (0b100 >> col) == 0 {
                    continue;
                }
                for dy in 0..GLYPH_SCALE {
                    for dx in 0..GLYPH_SCALE {
                        put(
                            canvas,
                            ox + col * GLYPH_SCALE + dx,
                            y + row as i32 * GLYPH_SCALE + dy,
                            color,
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facetag_core::{DetectedRegion, Identity};
    use image::Luma;

    fn result(identity: Identity) -> MatchResult {
        MatchResult {
            region: DetectedRegion::new(10,
            40,
            30,
            5),
            identity,
        }
    }

    #[test]
    fn test_colors_keyed_on_identity() {
        let frame = GrayImage::from_pixel(64, 64, Luma([50]));
        let known = render(&frame, &[result(Identity::Known("alice".into()))]);
        let unknown = render(&frame, &[result(Identity::Unknown)]);

        assert_eq!(*known.get_pixel(5, 10), KNOWN_COLOR);
        assert_eq!(*unknown.get_pixel(40, 30), UNKNOWN_COLOR);
        // Interior of the box keeps the frame's gray.
        assert_eq!(*known.get_pixel(20, 20), Rgb([50, 50, 50]));
    }

    #[test]
    fn test_label_text_is_drawn() {
        let frame = GrayImage::new(64, 64);
        let canvas = render(&frame, &[result(Identity::Known("i".into()))]);
        // Top-left pixel of "I" (row bits 0b111) at (left + 3, bottom + 2).
        assert_eq!(*canvas.get_pixel(8, 32), TEXT_COLOR);
    }

    #[test]
    fn test_regions_outside_frame_are_clipped() {
        let frame = GrayImage::new(16, 16);
        let region = DetectedRegion::new(-20, 100, 200, -5);
        let result = MatchResult {
            region,
            identity: Identity::Unknown,
        };
        let canvas = render(&frame, &[result]);
        assert_eq!(canvas.dimensions(), (16, 16));
    }
}
