use std::collections::HashMap;

/// Half-open column range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: i32,
    end: i32,
}

/// Occupied columns per row, kept as sorted, disjoint spans.
#[derive(Debug, Default)]
pub struct OccupancyMap {
    rows: HashMap<i32, Vec<Span>>,
}

impl OccupancyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn overlaps(&self, row: i32, start: i32, end: i32) -> bool {
        self.rows
            .get(&row)
            .map(|spans| spans.iter().any(|s| start < s.end && end > s.start))
            .unwrap_or(false)
    }

    pub fn occupy(&mut self, row: i32, start: i32, end: i32) {
        if end <= start {
            return;
        }
        let spans = self.rows.entry(row).or_default();
        let mut merged = Span { start, end };
        spans.retain(|s| {
            if s.start <= merged.end && s.end >= merged.start {
                merged.start = merged.start.min(s.start);
                merged.end = merged.end.max(s.end);
                false
            } else {
                true
            }
        });
        let idx = spans.partition_point(|s| s.start < merged.start);
        spans.insert(idx, merged);
    }

    #[cfg(test)]
    fn spans(&self, row: i32) -> Vec<(i32, i32)> {
        self.rows
            .get(&row)
            .map(|spans| spans.iter().map(|s| (s.start, s.end)).collect())
            .unwrap_or_default()
    }
}

/// A marker awaiting a label, in placement-priority order.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelRequest {
    pub col: i32,
    pub row: i32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub text: String,
    pub col: i32,
    pub row: i32,
}

impl Label {
    pub fn len(&self) -> i32 {
        self.text.chars().count() as i32
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn covers(&self, col: i32, row: i32) -> bool {
        row == self.row && col >= self.col && col < self.col + self.len()
    }
}

/// Places labels next to their markers without overlapping anything placed
/// before them.
///
/// Each label goes right of its marker, or left when it would run past the
/// grid edge, on the marker's row, then the row below, then the row above.
/// When all three collide the label is dropped and only the marker stays.
pub fn place_labels(requests: &[LabelRequest], width: usize, height: usize) -> Vec<Option<Label>> {
    let width = width as i32;
    let height = height as i32;
    let mut occupied = OccupancyMap::new();

    requests
        .iter()
        .map(|request| {
            occupied.occupy(request.row, request.col, request.col + 1);

            let text: String = request.text.chars().take(width.max(0) as usize).collect();
            let len = text.chars().count() as i32;
            if len == 0 {
                return None;
            }

            let mut col = request.col + 2;
            if col + len >= width {
                col = request.col - len - 1;
            }
            col = col.max(0);

            let row = [request.row, request.row + 1, request.row - 1]
                .into_iter()
                .filter(|row| (0..height).contains(row))
                .find(|&row| !occupied.overlaps(row, col, col + len))?;

            occupied.occupy(row, col, col + len);
            Some(Label { text, col, row })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(col: i32, row: i32, text: &str) -> LabelRequest {
        LabelRequest {
            col,
            row,
            text: text.into(),
        }
    }

    #[test]
    fn occupancy_merges_touching_spans() {
        let mut map = OccupancyMap::new();
        map.occupy(3, 10, 12);
        map.occupy(3, 0, 2);
        map.occupy(3, 12, 15);
        map.occupy(3, 1, 4);
        assert_eq!(map.spans(3), vec![(0, 4), (10, 15)]);
        assert!(map.overlaps(3, 14, 20));
        assert!(!map.overlaps(3, 4, 10));
        assert!(!map.overlaps(4, 0, 100));
    }

    #[test]
    fn label_goes_right_of_marker() {
        let labels = place_labels(&[request(10, 5, "Phone")], 40, 20);
        assert_eq!(
            labels[0],
            Some(Label {
                text: "Phone".into(),
                col: 12,
                row: 5
            })
        );
    }

    #[test]
    fn label_flips_left_at_right_edge() {
        let labels = place_labels(&[request(35, 5, "Speaker")], 40, 20);
        assert_eq!(labels[0].as_ref().map(|l| (l.col, l.row)), Some((27, 5)));
    }

    #[test]
    fn crowded_labels_move_down_then_up_then_vanish() {
        let requests = vec![
            request(10, 5, "Alpha"),
            request(11, 5, "Bravo"),
            request(12, 5, "Charlie"),
            request(13, 5, "Delta"),
        ];
        let labels = place_labels(&requests, 60, 20);
        assert_eq!(labels[0].as_ref().map(|l| l.row), Some(5));
        assert_eq!(labels[1].as_ref().map(|l| l.row), Some(6));
        assert_eq!(labels[2].as_ref().map(|l| l.row), Some(4));
        assert!(labels[3].is_none());
    }

    #[test]
    fn rows_outside_the_grid_are_never_used() {
        let requests = vec![request(10, 0, "Alpha"), request(11, 0, "Bravo")];
        let labels = place_labels(&requests, 60, 20);
        assert_eq!(labels[0].as_ref().map(|l| l.row), Some(0));
        assert_eq!(labels[1].as_ref().map(|l| l.row), Some(1));

        let labels = place_labels(&[request(10, 0, "Alpha"), request(11, 0, "Bravo")], 60, 1);
        assert!(labels[1].is_none());
    }

    #[test]
    fn placement_is_deterministic_and_never_overlaps() {
        let requests: Vec<_> = (0..30)
            .map(|i| request((i * 7) % 50, (i * 3) % 12, &format!("Dev{i:02}")))
            .collect();
        let first = place_labels(&requests, 60, 12);
        assert_eq!(first, place_labels(&requests, 60, 12));

        let placed: Vec<&Label> = first.iter().flatten().collect();
        for (i, a) in placed.iter().enumerate() {
            for b in placed.iter().skip(i + 1) {
                let clash = (a.col..a.col + a.len()).any(|col| b.covers(col, a.row));
                assert!(!clash, "{a:?} overlaps {b:?}");
            }
        }
    }
}
