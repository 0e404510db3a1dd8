//! Rectangular structuring-element morphology.
//!
//! `imageproc::morphology` covers square and diamond neighbourhoods through
//! `Norm`; glyph analysis also needs 2x2 and line-shaped (5x1, 1x5) elements.
//! The anchor sits at `(width / 2, height / 2)` and pixels outside the image
//! never take part in the min/max.

use image::GrayImage;
use imageproc::distance_transform::Norm;
use imageproc::morphology;

#[derive(Clone, Copy)]
enum Op {
    Min,
    Max,
}

fn filter_rows(img: &GrayImage, kernel_width: u32, op: Op) -> GrayImage {
    let (width, height) = img.dimensions();
    let anchor = (kernel_width / 2) as i64;
    GrayImage::from_fn(width, height, |x, y| {
        let mut acc = match op {
            Op::Min => u8::MAX,
            Op::Max => u8::MIN,
        };
        for k in 0..kernel_width as i64 {
            let sx = x as i64 + k - anchor;
            if sx < 0 || sx >= width as i64 {
                continue;
            }
            let v = img.get_pixel(sx as u32, y)[0];
            acc = match op {
                Op::Min => acc.min(v),
                Op::Max => acc.max(v),
            };
        }
        image::Luma([acc])
    })
}

fn filter_cols(img: &GrayImage, kernel_height: u32, op: Op) -> GrayImage {
    let (width, height) = img.dimensions();
    let anchor = (kernel_height / 2) as i64;
    GrayImage::from_fn(width, height, |x, y| {
        let mut acc = match op {
            Op::Min => u8::MAX,
            Op::Max => u8::MIN,
        };
        for k in 0..kernel_height as i64 {
            let sy = y as i64 + k - anchor;
            if sy < 0 || sy >= height as i64 {
                continue;
            }
            let v = img.get_pixel(x, sy as u32)[0];
            acc = match op {
                Op::Min => acc.min(v),
                Op::Max => acc.max(v),
            };
        }
        image::Luma([acc])
    })
}

pub fn erode_rect(img: &GrayImage, kernel_width: u32, kernel_height: u32) -> GrayImage {
    filter_cols(&filter_rows(img, kernel_width, Op::Min), kernel_height, Op::Min)
}

pub fn dilate_rect(img: &GrayImage, kernel_width: u32, kernel_height: u32) -> GrayImage {
    filter_cols(&filter_rows(img, kernel_width, Op::Max), kernel_height, Op::Max)
}

/// Erode then dilate: removes specks smaller than the element.
pub fn open_rect(img: &GrayImage, kernel_width: u32, kernel_height: u32) -> GrayImage {
    dilate_rect(&erode_rect(img, kernel_width, kernel_height), kernel_width, kernel_height)
}

/// Dilate then erode: fills gaps smaller than the element.
pub fn close_rect(img: &GrayImage, kernel_width: u32, kernel_height: u32) -> GrayImage {
    erode_rect(&dilate_rect(img, kernel_width, kernel_height), kernel_width, kernel_height)
}

/// 3x3 opening followed by a 3x3 closing
pub fn open_close_3x3(img: &GrayImage) -> GrayImage {
    let opened = morphology::open(img, Norm::LInf, 1);
    morphology::close(&opened, Norm::LInf, 1)
}

/// 3x3 closing, used to bridge broken edge strokes
pub fn close_3x3(img: &GrayImage) -> GrayImage {
    morphology::close(img, Norm::LInf, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn bar(width: u32, height: u32, x0: u32, y0: u32, w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            if x >= x0 && x < x0 + w && y >= y0 && y < y0 + h {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    fn count(img: &GrayImage) -> usize {
        img.pixels().filter(|p| p[0] > 0).count()
    }

    #[test]
    fn horizontal_opening_keeps_horizontal_bar() {
        let img = bar(28, 28, 4, 12, 20, 3);
        assert_eq!(count(&open_rect(&img, 5, 1)), 60);
        assert_eq!(count(&open_rect(&img, 1, 5)), 0);
    }

    #[test]
    fn closing_fills_single_pixel_gap() {
        let mut img = bar(20, 5, 2, 2, 16, 1);
        img.put_pixel(9, 2, Luma([0]));
        let closed = close_rect(&img, 3, 1);
        assert_eq!(closed.get_pixel(9, 2)[0], 255);
    }

    #[test]
    fn opening_removes_isolated_speck() {
        let mut img = bar(16, 16, 4, 4, 8, 8);
        img.put_pixel(0, 15, Luma([255]));
        let opened = open_rect(&img, 2, 2);
        assert_eq!(opened.get_pixel(0, 15)[0], 0);
        assert_eq!(opened.get_pixel(6, 6)[0], 255);
    }
}
