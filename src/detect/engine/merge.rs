use crate::detect::BBoxPx;

use super::geom::union_bbox;

/// Greedy row grouping over boxes sorted by `y`: a box joins the open region
/// while its top is closer than `max_top_distance` to the region's top.
pub(super) fn merge_by_top_distance(boxes: &[BBoxPx], max_top_distance: f64) -> Vec<BBoxPx> {
    let mut merged: Vec<BBoxPx> = Vec::new();
    for bbox in boxes {
        if let Some(last) = merged.last_mut() {
            if (bbox.y.abs_diff(last.y) as f64) < max_top_distance {
                *last = union_bbox(last, bbox);
                continue;
            }
        }
        merged.push(*bbox);
    }
    merged
}

/// Joins consecutive boxes (sorted by `y`) that overlap vertically and start
/// at roughly the same column.
pub(super) fn merge_overlapping_column(boxes: &[BBoxPx], max_x_shift: f64) -> Vec<BBoxPx> {
    let mut merged: Vec<BBoxPx> = Vec::new();
    for bbox in boxes {
        if let Some(last) = merged.last_mut() {
            let overlaps = bbox.y < last.bottom();
            let same_column = (bbox.x.abs_diff(last.x) as f64) < max_x_shift;
            if overlaps && same_column {
                *last = union_bbox(last, bbox);
                continue;
            }
        }
        merged.push(*bbox);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_close_to_region_top_are_grouped() {
        let boxes = [
            BBoxPx::new(100, 100, 300, 20),
            BBoxPx::new(120, 140, 200, 20),
            BBoxPx::new(100, 260, 300, 20),
            BBoxPx::new(100, 600, 300, 20),
        ];
        let merged = merge_by_top_distance(&boxes, 150.0);
        assert_eq!(
            merged,
            vec![
                BBoxPx::new(100, 100, 300, 60),
                BBoxPx::new(100, 260, 300, 20),
                BBoxPx::new(100, 600, 300, 20),
            ]
        );
    }

    #[test]
    fn distance_is_measured_from_region_top_not_last_row() {
        // Every row is 100px below the previous one, but the third is 200px
        // below the region's top.
        let boxes = [
            BBoxPx::new(0, 0, 200, 20),
            BBoxPx::new(0, 100, 200, 20),
            BBoxPx::new(0, 200, 200, 20),
        ];
        let merged = merge_by_top_distance(&boxes, 150.0);
        assert_eq!(
            merged,
            vec![BBoxPx::new(0, 0, 200, 120), BBoxPx::new(0, 200, 200, 20)]
        );
    }

    #[test]
    fn threshold_is_exclusive() {
        let boxes = [BBoxPx::new(0, 0, 200, 20), BBoxPx::new(0, 150, 200, 20)];
        assert_eq!(merge_by_top_distance(&boxes, 150.0).len(), 2);
    }

    #[test]
    fn overlapping_lines_in_one_column_merge() {
        let boxes = [
            BBoxPx::new(40, 100, 500, 40),
            BBoxPx::new(60, 130, 400, 40),
            BBoxPx::new(40, 200, 500, 40),
        ];
        let merged = merge_overlapping_column(&boxes, 300.0);
        assert_eq!(
            merged,
            vec![BBoxPx::new(40, 100, 500, 70), BBoxPx::new(40, 200, 500, 40)]
        );
    }

    #[test]
    fn overlapping_lines_in_different_columns_stay_apart() {
        let boxes = [BBoxPx::new(0, 100, 300, 40), BBoxPx::new(500, 120, 300, 40)];
        assert_eq!(merge_overlapping_column(&boxes, 300.0).len(), 2);
    }

    #[test]
    fn touching_lines_do_not_overlap() {
        let boxes = [BBoxPx::new(0, 100, 300, 40), BBoxPx::new(0, 140, 300, 40)];
        assert_eq!(merge_overlapping_column(&boxes, 300.0).len(), 2);
    }
}
