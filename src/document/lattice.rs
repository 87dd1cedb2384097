//! Ruling-line ("lattice") table detection.
//!
//! Works on plain geometry so it can be fed by any backend: horizontal and
//! vertical [`Edge`]s taken from path objects, plus positioned
//! [`TextChar`]s. All coordinates are PDF points measured from the top-left
//! corner of the page (y grows downwards).
//!
//! ```text
//! edges ──▶ snap ──▶ join ──▶ min-length ──▶ intersections ──▶ cells ──▶ tables ──▶ grids
//! ```
//!
//! There is deliberately no text-alignment fallback: a grid without rulings
//! is not reported.

use crate::config::TableSettings;
use crate::output::Grid;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// Path objects thinner than this are treated as a single line, not a box.
const LINE_THICKNESS: f32 = 2.0;

/// Edges shorter than this are noise even before merging.
const PREFILTER_MIN_LENGTH: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// An axis-aligned ruling segment.
///
/// For horizontal edges `position` is the y coordinate and `start..end` the
/// x extent; for vertical edges `position` is x and `start..end` the y extent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub orientation: Orientation,
    pub position: f32,
    pub start: f32,
    pub end: f32,
}

impl Edge {
    pub fn horizontal(y: f32, x0: f32, x1: f32) -> Self {
        Self {
            orientation: Orientation::Horizontal,
            position: y,
            start: x0.min(x1),
            end: x0.max(x1),
        }
    }

    pub fn vertical(x: f32, top: f32, bottom: f32) -> Self {
        Self {
            orientation: Orientation::Vertical,
            position: x,
            start: top.min(bottom),
            end: top.max(bottom),
        }
    }

    pub fn length(&self) -> f32 {
        self.end - self.start
    }

    /// Segment end points as `(x0, y0, x1, y1)`.
    pub fn endpoints(&self) -> (f32, f32, f32, f32) {
        match self.orientation {
            Orientation::Horizontal => (self.start, self.position, self.end, self.position),
            Orientation::Vertical => (self.position, self.start, self.position, self.end),
        }
    }
}

/// Axis-aligned box in top-left page coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub x0: f32,
    pub top: f32,
    pub x1: f32,
    pub bottom: f32,
}

impl BBox {
    pub fn new(x0: f32, top: f32, x1: f32, bottom: f32) -> Self {
        Self {
            x0: x0.min(x1),
            top: top.min(bottom),
            x1: x0.max(x1),
            bottom: top.max(bottom),
        }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    fn contains_point(&self, x: f32, y: f32) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.top && y <= self.bottom
    }
}

/// A single glyph with its bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextChar {
    pub ch: char,
    pub bbox: BBox,
}

/// Everything the detector produced for one page.
#[derive(Debug, Clone, Default)]
pub struct TableFinding {
    /// Edges after snapping, joining and length filtering.
    pub edges: Vec<Edge>,
    /// Every cell found, across all tables.
    pub cells: Vec<BBox>,
    /// One grid per table, ordered top-to-bottom then left-to-right.
    pub tables: Vec<Grid>,
}

/// Turn the bounding box of a path object into ruling edges.
///
/// Thin boxes are strokes and yield one edge along their centre line;
/// anything larger is a rectangle and yields its four sides.
pub fn edges_from_rect(rect: BBox) -> Vec<Edge> {
    let (w, h) = (rect.width(), rect.height());
    if w <= LINE_THICKNESS && h <= LINE_THICKNESS {
        return Vec::new();
    }
    if h <= LINE_THICKNESS {
        let y = (rect.top + rect.bottom) / 2.0;
        return vec![Edge::horizontal(y, rect.x0, rect.x1)];
    }
    if w <= LINE_THICKNESS {
        let x = (rect.x0 + rect.x1) / 2.0;
        return vec![Edge::vertical(x, rect.top, rect.bottom)];
    }
    vec![
        Edge::horizontal(rect.top, rect.x0, rect.x1),
        Edge::horizontal(rect.bottom, rect.x0, rect.x1),
        Edge::vertical(rect.x0, rect.top, rect.bottom),
        Edge::vertical(rect.x1, rect.top, rect.bottom),
    ]
}

/// Ruling edges from one straight-line subpath, in top-left coordinates.
///
/// A subpath that fits in a line-thickness band is a stroke or a thin filled
/// bar and collapses to its centre line. Otherwise every axis-aligned segment
/// becomes an edge; diagonal segments are dropped.
pub fn edges_from_path(points: &[(f32, f32)]) -> Vec<Edge> {
    let Some(&(x, y)) = points.first() else {
        return Vec::new();
    };
    let bounds = points.iter().fold(BBox::new(x, y, x, y), |b, &(x, y)| {
        BBox::new(b.x0.min(x), b.top.min(y), b.x1.max(x), b.bottom.max(y))
    });
    if bounds.width() <= LINE_THICKNESS || bounds.height() <= LINE_THICKNESS {
        return edges_from_rect(bounds);
    }

    points
        .windows(2)
        .filter_map(|pair| {
            let ((ax, ay), (bx, by)) = (pair[0], pair[1]);
            if (ay - by).abs() <= LINE_THICKNESS && (ax - bx).abs() > LINE_THICKNESS {
                Some(Edge::horizontal((ay + by) / 2.0, ax.min(bx), ax.max(bx)))
            } else if (ax - bx).abs() <= LINE_THICKNESS && (ay - by).abs() > LINE_THICKNESS {
                Some(Edge::vertical((ax + bx) / 2.0, ay.min(by), ay.max(by)))
            } else {
                None
            }
        })
        .collect()
}

/// Run the full lattice pipeline over one page.
pub fn find_tables(edges: &[Edge], chars: &[TextChar], settings: &TableSettings) -> TableFinding {
    let edges = merge_edges(edges, settings);
    let points = intersections(&edges, settings.intersection_tolerance);
    let cells = build_cells(&points);
    let groups = group_cells(&cells);
    let tables = groups
        .iter()
        .map(|group| layout_grid(group, chars, settings.text_tolerance))
        .collect();

    TableFinding {
        edges,
        cells,
        tables,
    }
}

// ── Edge merging ─────────────────────────────────────────────────────────

fn merge_edges(edges: &[Edge], settings: &TableSettings) -> Vec<Edge> {
    let mut edges: Vec<Edge> = edges
        .iter()
        .copied()
        .filter(|e| e.length() >= PREFILTER_MIN_LENGTH)
        .collect();

    snap(&mut edges, settings.snap_tolerance);
    let joined = join(edges, settings.join_tolerance);

    joined
        .into_iter()
        .filter(|e| e.length() >= settings.edge_min_length)
        .collect()
}

/// Move parallel edges whose positions chain within `tolerance` onto their mean.
fn snap(edges: &mut [Edge], tolerance: f32) {
    for orientation in [Orientation::Horizontal, Orientation::Vertical] {
        let mut idx: Vec<usize> = (0..edges.len())
            .filter(|&i| edges[i].orientation == orientation)
            .collect();
        idx.sort_by(|&a, &b| edges[a].position.total_cmp(&edges[b].position));

        let mut start = 0;
        while start < idx.len() {
            let mut end = start + 1;
            while end < idx.len()
                && edges[idx[end]].position - edges[idx[end - 1]].position <= tolerance
            {
                end += 1;
            }
            let cluster = &idx[start..end];
            let mean =
                cluster.iter().map(|&i| edges[i].position).sum::<f32>() / cluster.len() as f32;
            for &i in cluster {
                edges[i].position = mean;
            }
            start = end;
        }
    }
}

/// Merge collinear edges that overlap or are separated by at most `tolerance`.
fn join(mut edges: Vec<Edge>, tolerance: f32) -> Vec<Edge> {
    edges.sort_by(|a, b| {
        a.orientation
            .cmp(&b.orientation)
            .then(a.position.total_cmp(&b.position))
            .then(a.start.total_cmp(&b.start))
    });

    let mut out: Vec<Edge> = Vec::with_capacity(edges.len());
    for edge in edges {
        if let Some(last) = out.last_mut() {
            if last.orientation == edge.orientation
                && last.position == edge.position
                && edge.start <= last.end + tolerance
            {
                last.end = last.end.max(edge.end);
                continue;
            }
        }
        out.push(edge);
    }
    out
}

// ── Intersections and cells ──────────────────────────────────────────────

type PointKey = (i64, i64);

/// Quantise a coordinate so snapped positions compare exactly.
fn quantise(v: f32) -> i64 {
    (v * 1000.0).round() as i64
}

#[derive(Debug, Default)]
struct Intersection {
    x: f32,
    y: f32,
    horizontal: BTreeSet<usize>,
    vertical: BTreeSet<usize>,
}

/// Crossing points keyed by `(y, x)`, so iteration runs top-to-bottom, left-to-right.
fn intersections(edges: &[Edge], tolerance: f32) -> BTreeMap<PointKey, Intersection> {
    let mut points: BTreeMap<PointKey, Intersection> = BTreeMap::new();

    for (vi, v) in edges
        .iter()
        .enumerate()
        .filter(|(_, e)| e.orientation == Orientation::Vertical)
    {
        for (hi, h) in edges
            .iter()
            .enumerate()
            .filter(|(_, e)| e.orientation == Orientation::Horizontal)
        {
            let crosses = v.start <= h.position + tolerance
                && v.end >= h.position - tolerance
                && v.position >= h.start - tolerance
                && v.position <= h.end + tolerance;
            if !crosses {
                continue;
            }
            let point = points
                .entry((quantise(h.position), quantise(v.position)))
                .or_insert_with(|| Intersection {
                    x: v.position,
                    y: h.position,
                    ..Default::default()
                });
            point.horizontal.insert(hi);
            point.vertical.insert(vi);
        }
    }

    points
}

fn shares(a: &BTreeSet<usize>, b: &BTreeSet<usize>) -> bool {
    a.intersection(b).next().is_some()
}

/// For each intersection, find the smallest rectangle whose four corners are
/// intersections connected by common edges.
fn build_cells(points: &BTreeMap<PointKey, Intersection>) -> Vec<BBox> {
    let mut cells = Vec::new();

    for (&(py, px), p) in points {
        let below = points
            .iter()
            .filter(|&(&(y, x), _)| x == px && y > py)
            .map(|(&(y, _), q)| (y, q));
        'search: for (by, b) in below {
            if !shares(&p.vertical, &b.vertical) {
                continue;
            }
            let right = points
                .range((py, px + 1)..(py, i64::MAX))
                .map(|(&(_, x), r)| (x, r));
            for (rx, r) in right {
                if !shares(&p.horizontal, &r.horizontal) {
                    continue;
                }
                if let Some(corner) = points.get(&(by, rx)) {
                    if shares(&corner.vertical, &r.vertical)
                        && shares(&corner.horizontal, &b.horizontal)
                    {
                        cells.push(BBox::new(p.x, p.y, corner.x, corner.y));
                        break 'search;
                    }
                }
            }
        }
    }

    cells
}

/// Group cells that share at least one corner; single-cell groups are dropped.
fn group_cells(cells: &[BBox]) -> Vec<Vec<BBox>> {
    let corners = |c: &BBox| -> [PointKey; 4] {
        let (l, t, r, b) = (
            quantise(c.x0),
            quantise(c.top),
            quantise(c.x1),
            quantise(c.bottom),
        );
        [(t, l), (t, r), (b, l), (b, r)]
    };

    let mut by_corner: HashMap<PointKey, Vec<usize>> = HashMap::new();
    for (i, cell) in cells.iter().enumerate() {
        for corner in corners(cell) {
            by_corner.entry(corner).or_default().push(i);
        }
    }

    let mut seen = vec![false; cells.len()];
    let mut groups: Vec<Vec<BBox>> = Vec::new();

    for start in 0..cells.len() {
        if seen[start] {
            continue;
        }
        seen[start] = true;
        let mut queue = VecDeque::from([start]);
        let mut group = Vec::new();
        while let Some(i) = queue.pop_front() {
            group.push(cells[i]);
            for corner in corners(&cells[i]) {
                for &j in &by_corner[&corner] {
                    if !seen[j] {
                        seen[j] = true;
                        queue.push_back(j);
                    }
                }
            }
        }
        if group.len() > 1 {
            groups.push(group);
        }
    }

    groups.sort_by(|a, b| {
        let top = |g: &Vec<BBox>| g.iter().map(|c| c.top).fold(f32::INFINITY, f32::min);
        let left = |g: &Vec<BBox>| g.iter().map(|c| c.x0).fold(f32::INFINITY, f32::min);
        top(a).total_cmp(&top(b)).then(left(a).total_cmp(&left(b)))
    });
    groups
}

// ── Grid layout ──────────────────────────────────────────────────────────

/// Lay a table's cells out as rows × columns and fill in their text.
fn layout_grid(cells: &[BBox], chars: &[TextChar], text_tolerance: f32) -> Grid {
    let tops: BTreeSet<i64> = cells.iter().map(|c| quantise(c.top)).collect();
    let lefts: BTreeSet<i64> = cells.iter().map(|c| quantise(c.x0)).collect();
    let by_origin: HashMap<PointKey, &BBox> = cells
        .iter()
        .map(|c| ((quantise(c.top), quantise(c.x0)), c))
        .collect();

    tops.iter()
        .map(|&top| {
            lefts
                .iter()
                .map(|&left| {
                    by_origin
                        .get(&(top, left))
                        .map(|cell| cell_text(cell, chars, text_tolerance))
                })
                .collect()
        })
        .collect()
}

/// Text of the characters whose centre falls inside `cell`, line by line.
fn cell_text(cell: &BBox, chars: &[TextChar], text_tolerance: f32) -> String {
    let mut inside: Vec<&TextChar> = chars
        .iter()
        .filter(|c| {
            let cx = (c.bbox.x0 + c.bbox.x1) / 2.0;
            let cy = (c.bbox.top + c.bbox.bottom) / 2.0;
            cell.contains_point(cx, cy)
        })
        .collect();
    inside.sort_by(|a, b| a.bbox.top.total_cmp(&b.bbox.top));

    let mut lines: Vec<Vec<&TextChar>> = Vec::new();
    for ch in inside {
        match lines.last_mut() {
            Some(line) if ch.bbox.top - line[0].bbox.top <= text_tolerance => line.push(ch),
            _ => lines.push(vec![ch]),
        }
    }

    lines
        .into_iter()
        .map(|mut line| {
            line.sort_by(|a, b| a.bbox.x0.total_cmp(&b.bbox.x0));
            let mut text = String::new();
            let mut prev: Option<&TextChar> = None;
            for ch in line {
                if let Some(p) = prev {
                    let gap = ch.bbox.x0 - p.bbox.x1;
                    if gap > text_tolerance && !p.ch.is_whitespace() && !ch.ch.is_whitespace() {
                        text.push(' ');
                    }
                }
                text.push(ch.ch);
                prev = Some(ch);
            }
            text.trim().to_string()
        })
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Lay out `text` as 5pt-wide, 10pt-tall glyphs starting at (x, top).
    fn word(text: &str, x: f32, top: f32) -> Vec<TextChar> {
        text.chars()
            .enumerate()
            .map(|(i, ch)| {
                let x0 = x + i as f32 * 5.0;
                TextChar {
                    ch,
                    bbox: BBox::new(x0, top, x0 + 5.0, top + 10.0),
                }
            })
            .collect()
    }

    /// Full ruling for a grid with the given row/column boundaries.
    fn ruling(xs: &[f32], ys: &[f32]) -> Vec<Edge> {
        let (x0, x1) = (xs[0], *xs.last().unwrap());
        let (y0, y1) = (ys[0], *ys.last().unwrap());
        ys.iter()
            .map(|&y| Edge::horizontal(y, x0, x1))
            .chain(xs.iter().map(|&x| Edge::vertical(x, y0, y1)))
            .collect()
    }

    fn s(v: &str) -> Option<String> {
        Some(v.to_string())
    }

    #[test]
    fn ruled_three_by_two_grid() {
        let edges = ruling(&[0.0, 100.0, 200.0], &[0.0, 20.0, 40.0, 60.0]);
        let mut chars = word("Lot", 10.0, 5.0);
        chars.extend(word("Cargo", 110.0, 5.0));
        chars.extend(word("7", 10.0, 25.0));
        chars.extend(word("Wheat", 110.0, 25.0));
        chars.extend(word("8", 10.0, 45.0));
        chars.extend(word("Urea", 110.0, 45.0));

        let finding = find_tables(&edges, &chars, &TableSettings::default());
        assert_eq!(finding.cells.len(), 6);
        assert_eq!(finding.tables.len(), 1);
        assert_eq!(
            finding.tables[0],
            vec![
                vec![s("Lot"), s("Cargo")],
                vec![s("7"), s("Wheat")],
                vec![s("8"), s("Urea")],
            ]
        );
    }

    #[test]
    fn nearly_aligned_rulings_are_snapped() {
        let mut edges = ruling(&[0.0, 100.0, 200.0], &[0.0, 20.0, 40.0]);
        // A second, slightly offset stroke of the middle rule.
        edges.push(Edge::horizontal(21.5, 0.0, 200.0));
        let finding = find_tables(&edges, &[], &TableSettings::default());
        assert_eq!(finding.tables.len(), 1);
        assert_eq!(finding.tables[0].len(), 2);
        assert_eq!(finding.tables[0][0].len(), 2);
    }

    #[test]
    fn broken_rulings_are_joined() {
        let mut edges: Vec<Edge> = ruling(&[0.0, 100.0, 200.0], &[0.0, 20.0, 40.0])
            .into_iter()
            .filter(|e| !(e.orientation == Orientation::Horizontal && e.position == 20.0))
            .collect();
        edges.push(Edge::horizontal(20.0, 0.0, 98.0));
        edges.push(Edge::horizontal(20.0, 101.0, 200.0));
        let finding = find_tables(&edges, &[], &TableSettings::default());
        assert_eq!(finding.cells.len(), 4);
    }

    #[test]
    fn short_strokes_are_ignored() {
        let edges = ruling(&[0.0, 3.0], &[0.0, 2.0, 4.0]);
        let finding = find_tables(&edges, &[], &TableSettings::default());
        assert!(finding.tables.is_empty());
    }

    #[test]
    fn no_edges_no_tables() {
        let finding = find_tables(&[], &word("plain text", 0.0, 0.0), &TableSettings::default());
        assert!(finding.tables.is_empty());
        assert!(finding.cells.is_empty());
    }

    #[test]
    fn single_box_is_not_a_table() {
        let edges = edges_from_rect(BBox::new(0.0, 0.0, 200.0, 50.0));
        let finding = find_tables(&edges, &[], &TableSettings::default());
        assert_eq!(finding.cells.len(), 1);
        assert!(finding.tables.is_empty());
    }

    #[test]
    fn separate_tables_ordered_top_down() {
        let mut edges = ruling(&[0.0, 50.0, 100.0], &[300.0, 320.0, 340.0]);
        edges.extend(ruling(&[0.0, 50.0, 100.0, 150.0], &[0.0, 20.0, 40.0]));
        let finding = find_tables(&edges, &[], &TableSettings::default());
        assert_eq!(finding.tables.len(), 2);
        assert_eq!(finding.tables[0][0].len(), 3);
        assert_eq!(finding.tables[1][0].len(), 2);
    }

    #[test]
    fn multi_line_cell_text_and_word_gaps() {
        let edges = ruling(&[0.0, 100.0, 200.0], &[0.0, 40.0, 80.0]);
        let mut chars = word("Port", 5.0, 2.0);
        chars.extend(word("of", 30.0, 2.0));
        chars.extend(word("Callao", 5.0, 20.0));
        let finding = find_tables(&edges, &chars, &TableSettings::default());
        assert_eq!(finding.tables[0][0][0].as_deref(), Some("Port of\nCallao"));
        assert_eq!(finding.tables[0][0][1].as_deref(), Some(""));
    }

    #[test]
    fn thin_rect_becomes_single_edge() {
        let edges = edges_from_rect(BBox::new(0.0, 10.0, 120.0, 10.5));
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].orientation, Orientation::Horizontal);
        assert!((edges[0].position - 10.25).abs() < 1e-4);

        let edges = edges_from_rect(BBox::new(50.0, 0.0, 50.8, 90.0));
        assert_eq!(edges[0].orientation, Orientation::Vertical);

        assert!(edges_from_rect(BBox::new(0.0, 0.0, 1.0, 1.0)).is_empty());
        assert_eq!(edges_from_rect(BBox::new(0.0, 0.0, 100.0, 30.0)).len(), 4);
    }

    #[test]
    fn merged_cell_leaves_hole_in_grid() {
        // Header spans both columns: no vertical divider in the first row.
        let mut edges = vec![
            Edge::horizontal(0.0, 0.0, 200.0),
            Edge::horizontal(20.0, 0.0, 200.0),
            Edge::horizontal(40.0, 0.0, 200.0),
            Edge::vertical(0.0, 0.0, 40.0),
            Edge::vertical(200.0, 0.0, 40.0),
        ];
        edges.push(Edge::vertical(100.0, 20.0, 40.0));
        let finding = find_tables(&edges, &[], &TableSettings::default());
        assert_eq!(finding.tables.len(), 1);
        let grid = &finding.tables[0];
        assert_eq!(grid.len(), 2);
        assert_eq!(grid[0], vec![s(""), None]);
        assert_eq!(grid[1], vec![s(""), s("")]);
    }

    #[test]
    fn grid_drawn_as_one_path() {
        // Outer frame, then every inner rule as its own move-to/line-to pair.
        let subpaths: Vec<Vec<(f32, f32)>> = vec![
            vec![(0.0, 0.0), (150.0, 0.0), (150.0, 60.0), (0.0, 60.0), (0.0, 0.0)],
            vec![(0.0, 20.0), (150.0, 20.0)],
            vec![(0.0, 40.0), (150.0, 40.0)],
            vec![(50.0, 0.0), (50.0, 60.0)],
            vec![(100.0, 0.0), (100.0, 60.0)],
        ];
        let edges: Vec<Edge> = subpaths.iter().flat_map(|p| edges_from_path(p)).collect();
        assert_eq!(edges.len(), 8);

        let mut chars = word("Lot", 5.0, 5.0);
        chars.extend(word("Urea", 105.0, 45.0));
        let finding = find_tables(&edges, &chars, &TableSettings::default());
        assert_eq!(finding.cells.len(), 9);
        assert_eq!(finding.tables.len(), 1);
        let grid = &finding.tables[0];
        assert_eq!(grid.len(), 3);
        assert!(grid.iter().all(|row| row.len() == 3));
        assert_eq!(grid[0][0], s("Lot"));
        assert_eq!(grid[2][2], s("Urea"));

        // The frame's bounding box alone is a single cell.
        let frame = edges_from_rect(BBox::new(0.0, 0.0, 150.0, 60.0));
        assert!(find_tables(&frame, &chars, &TableSettings::default()).tables.is_empty());
    }

    #[test]
    fn path_strokes_and_diagonals() {
        let edges = edges_from_path(&[(10.0, 30.0), (90.0, 30.4)]);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].orientation, Orientation::Horizontal);

        // A staircase keeps its axis-aligned steps.
        let edges = edges_from_path(&[(0.0, 0.0), (40.0, 0.0), (40.0, 40.0), (80.0, 40.0)]);
        assert_eq!(edges.len(), 3);

        assert!(edges_from_path(&[(0.0, 0.0), (50.0, 50.0)]).is_empty());
        assert!(edges_from_path(&[]).is_empty());
    }
}
