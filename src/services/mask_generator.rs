// src/services/mask_generator.rs
use crate::errors::EditorError;
use crate::models::{Coordinate, Region};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use log::error;

const MARKED: Rgb<u8> = Rgb([255, 255, 255]);

/// What a mask is rasterized from. Regions take precedence over a polygon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaskSource<'a> {
    Regions(&'a [Region]),
    Polygon(&'a [Coordinate]),
}

impl<'a> MaskSource<'a> {
    pub fn select(regions: &'a [Region], coordinates: &'a [Coordinate]) -> Self {
        if regions.is_empty() {
            MaskSource::Polygon(coordinates)
        } else {
            MaskSource::Regions(regions)
        }
    }

    pub fn describe(&self) -> String {
        match self {
            MaskSource::Regions(regions) => counted(regions.len(), "region"),
            MaskSource::Polygon(points) => counted(points.len(), "coordinate point"),
        }
    }
}

/// Rasterizes edit areas into two-toned masks: white marks the edit target.
#[derive(Debug, Default)]
pub struct MaskGenerator;

impl MaskGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, size: (u32, u32), source: MaskSource<'_>) -> RgbImage {
        match source {
            MaskSource::Regions(regions) => self.rasterize_regions(size, regions),
            MaskSource::Polygon(points) => self.rasterize_polygon(size, points),
        }
    }

    /// Even-odd fill of the closed polygon. Never fails: bad input yields a blank mask.
    pub fn rasterize_polygon(&self, size: (u32, u32), points: &[Coordinate]) -> RgbImage {
        match fill_polygon(size, points) {
            Ok(mask) => mask,
            Err(e) => {
                error!("Error in Mask creation: {}", e);
                blank(size)
            }
        }
    }

    pub fn rasterize_regions(&self, size: (u32, u32), regions: &[Region]) -> RgbImage {
        let mut mask = blank(size);
        for region in regions {
            if let Some(rect) = clip_region(region, size) {
                draw_filled_rect_mut(&mut mask, rect, MARKED);
            }
        }
        mask
    }
}

fn counted(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("1 {}", noun)
    } else {
        format!("{} {}s", n, noun)
    }
}

fn blank(size: (u32, u32)) -> RgbImage {
    RgbImage::new(size.0, size.1)
}

fn fill_polygon(size: (u32, u32), points: &[Coordinate]) -> Result<RgbImage, EditorError> {
    let (width, height) = size;
    let mut mask = blank(size);
    if points.len() < 3 {
        return Ok(mask);
    }
    if let Some(bad) = points.iter().find(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return Err(EditorError::Validation(format!(
            "Non-finite polygon vertex ({}, {})",
            bad.x, bad.y
        )));
    }

    let mut crossings: Vec<f64> = Vec::with_capacity(points.len());
    for row in 0..height {
        let yc = row as f64 + 0.5;
        crossings.clear();

        for (i, a) in points.iter().enumerate() {
            let b = &points[(i + 1) % points.len()];
            // Half-open test so a vertex on the scanline is counted once.
            if (a.y <= yc) != (b.y <= yc) {
                crossings.push(a.x + (yc - a.y) * (b.x - a.x) / (b.y - a.y));
            }
        }
        crossings.sort_by(f64::total_cmp);

        for span in crossings.chunks_exact(2) {
            // Pixel centers x + 0.5 inside [span[0], span[1]).
            let start = (span[0] - 0.5).ceil().max(0.0);
            let end = (span[1] - 0.5).ceil().min(width as f64);
            if start >= end {
                continue;
            }
            for col in start as u32..end as u32 {
                mask.put_pixel(col, row, MARKED);
            }
        }
    }

    Ok(mask)
}

fn clip_region(region: &Region, size: (u32, u32)) -> Option<Rect> {
    let left = i64::from(region.x).max(0);
    let top = i64::from(region.y).max(0);
    let right = (i64::from(region.x) + i64::from(region.width)).min(i64::from(size.0));
    let bottom = (i64::from(region.y) + i64::from(region.height)).min(i64::from(size.1));

    if right <= left || bottom <= top {
        return None;
    }
    Some(Rect::at(left as i32, top as i32).of_size((right - left) as u32, (bottom - top) as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(x: f64, y: f64) -> Coordinate {
        Coordinate { x, y }
    }

    fn marked(mask: &RgbImage, x: u32, y: u32) -> bool {
        *mask.get_pixel(x, y) == MARKED
    }

    fn marked_count(mask: &RgbImage) -> usize {
        mask.pixels().filter(|p| **p == MARKED).count()
    }

    #[test]
    fn square_polygon_fills_its_interior() {
        let mask = MaskGenerator::new().rasterize_polygon(
            (40, 40),
            &[pt(10.0, 10.0), pt(30.0, 10.0), pt(30.0, 30.0), pt(10.0, 30.0)],
        );
        assert_eq!(mask.dimensions(), (40, 40));
        assert!(marked(&mask, 20, 20));
        assert!(marked(&mask, 10, 10));
        assert!(marked(&mask, 29, 29));
        assert!(!marked(&mask, 5, 5));
        assert!(!marked(&mask, 30, 30));
        assert_eq!(marked_count(&mask), 20 * 20);
    }

    #[test]
    fn triangle_spot_checks() {
        let mask = MaskGenerator::new().rasterize_polygon(
            (50, 50),
            &[pt(5.0, 5.0), pt(45.0, 5.0), pt(25.0, 45.0)],
        );
        assert!(marked(&mask, 25, 15));
        assert!(!marked(&mask, 5, 40));
        assert!(!marked(&mask, 45, 40));
    }

    #[test]
    fn mask_is_strictly_two_toned() {
        let mask = MaskGenerator::new().rasterize_polygon(
            (30, 30),
            &[pt(2.3, 4.7), pt(27.1, 9.9), pt(14.2, 28.4)],
        );
        assert!(
            mask.pixels()
                .all(|p| *p == MARKED || *p == Rgb([0, 0, 0]))
        );
    }

    #[test]
    fn collinear_points_give_blank_mask() {
        let mask = MaskGenerator::new().rasterize_polygon(
            (20, 20),
            &[pt(1.0, 1.0), pt(10.0, 10.0), pt(18.0, 18.0)],
        );
        assert_eq!(marked_count(&mask), 0);
    }

    #[test]
    fn fewer_than_three_points_give_blank_mask() {
        let mask = MaskGenerator::new().rasterize_polygon((20, 20), &[pt(1.0, 1.0), pt(10.0, 10.0)]);
        assert_eq!(marked_count(&mask), 0);
    }

    #[test]
    fn non_finite_vertex_degrades_to_blank_mask() {
        let mask = MaskGenerator::new().rasterize_polygon(
            (20, 20),
            &[pt(1.0, 1.0), pt(f64::NAN, 10.0), pt(18.0, 2.0)],
        );
        assert_eq!(mask.dimensions(), (20, 20));
        assert_eq!(marked_count(&mask), 0);
    }

    #[test]
    fn polygon_outside_canvas_is_clipped() {
        let mask = MaskGenerator::new().rasterize_polygon(
            (10, 10),
            &[pt(-5.0, -5.0), pt(5.0, -5.0), pt(5.0, 5.0), pt(-5.0, 5.0)],
        );
        assert_eq!(marked_count(&mask), 25);
        assert!(marked(&mask, 0, 0));
        assert!(!marked(&mask, 5, 5));
    }

    #[test]
    fn overlapping_regions_mark_their_union() {
        let regions = [
            Region { x: 0, y: 0, width: 10, height: 10 },
            Region { x: 5, y: 5, width: 10, height: 10 },
        ];
        let mask = MaskGenerator::new().rasterize_regions((20, 20), &regions);

        for y in 0..20 {
            for x in 0..20 {
                let expected = (x < 10 && y < 10) || ((5..15).contains(&x) && (5..15).contains(&y));
                assert_eq!(marked(&mask, x, y), expected, "pixel ({x}, {y})");
            }
        }
        assert_eq!(marked_count(&mask), 100 + 100 - 25);
    }

    #[test]
    fn regions_are_clipped_independently() {
        let regions = [
            Region { x: -5, y: -5, width: 10, height: 10 },
            Region { x: 15, y: 15, width: 100, height: 100 },
            Region { x: 50, y: 50, width: 5, height: 5 },
            Region { x: 3, y: 3, width: 0, height: 7 },
        ];
        let mask = MaskGenerator::new().rasterize_regions((20, 20), &regions);
        assert_eq!(marked_count(&mask), 25 + 25);
        assert!(marked(&mask, 4, 4));
        assert!(marked(&mask, 19, 19));
    }

    #[test]
    fn empty_region_list_gives_blank_mask() {
        let mask = MaskGenerator::new().rasterize_regions((8, 8), &[]);
        assert_eq!(marked_count(&mask), 0);
    }

    #[test]
    fn regions_take_precedence_over_coordinates() {
        let regions = [Region { x: 0, y: 0, width: 2, height: 2 }];
        let points = [pt(0.0, 0.0), pt(8.0, 0.0), pt(8.0, 8.0)];

        let source = MaskSource::select(&regions, &points);
        assert_eq!(source, MaskSource::Regions(&regions));
        assert_eq!(source.describe(), "1 region");

        let source = MaskSource::select(&[], &points);
        assert_eq!(source.describe(), "3 coordinate points");
    }

    #[test]
    fn description_uses_singular_for_one() {
        let two = [
            Region { x: 0, y: 0, width: 1, height: 1 },
            Region { x: 1, y: 1, width: 1, height: 1 },
        ];
        assert_eq!(MaskSource::Regions(&two).describe(), "2 regions");
        assert_eq!(MaskSource::Regions(&two[..1]).describe(), "1 region");
        assert_eq!(MaskSource::Polygon(&[pt(0.0, 0.0)]).describe(), "1 coordinate point");
    }
}
