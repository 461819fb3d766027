use super::Rect;

const EPS: f32 = 1e-4;
/// Above this dx/dy ratio an edge leaves through a left/right side.
const DIRECTION_PREF_RATIO: f32 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum EdgeSide {
    Left,
    Right,
    Top,
    Bottom,
}

/// Edges leaving through this side start out along the x axis.
pub(super) fn side_is_horizontal(side: EdgeSide) -> bool {
    matches!(side, EdgeSide::Left | EdgeSide::Right)
}

/// Pick the exit side on `from` and entry side on `to`. Layout runs left to
/// right, so ties go to the horizontal sides.
pub(super) fn edge_sides(from: &Rect, to: &Rect) -> (EdgeSide, EdgeSide) {
    let (from_cx, from_cy) = from.center();
    let (to_cx, to_cy) = to.center();
    let dx = to_cx - from_cx;
    let dy = to_cy - from_cy;
    let x_overlap = from.x < to.right() && to.x < from.right();

    let ratio = dx.abs() / dy.abs().max(EPS);
    let use_horizontal = !x_overlap && ratio >= DIRECTION_PREF_RATIO;

    if use_horizontal {
        if dx >= 0.0 {
            (EdgeSide::Right, EdgeSide::Left)
        } else {
            (EdgeSide::Left, EdgeSide::Right)
        }
    } else if dy >= 0.0 {
        (EdgeSide::Bottom, EdgeSide::Top)
    } else {
        (EdgeSide::Top, EdgeSide::Bottom)
    }
}

pub(super) fn anchor_point(rect: &Rect, side: EdgeSide) -> (f32, f32) {
    let (cx, cy) = rect.center();
    match side {
        EdgeSide::Left => (rect.x, cy),
        EdgeSide::Right => (rect.right(), cy),
        EdgeSide::Top => (cx, rect.y),
        EdgeSide::Bottom => (cx, rect.bottom()),
    }
}

/// Three-segment orthogonal route between two boxes with the bend halfway
/// along the main axis.
pub(super) fn route_orthogonal(from: &Rect, to: &Rect) -> Vec<(f32, f32)> {
    let (from_side, to_side) = edge_sides(from, to);
    let start = anchor_point(from, from_side);
    let end = anchor_point(to, to_side);
    let points = if side_is_horizontal(from_side) {
        let mid_x = (start.0 + end.0) / 2.0;
        vec![start, (mid_x, start.1), (mid_x, end.1), end]
    } else {
        let mid_y = (start.1 + end.1) / 2.0;
        vec![start, (start.0, mid_y), (end.0, mid_y), end]
    };
    compress_path(&points)
}

pub(super) fn route_self_loop(rect: &Rect, pad: f32) -> Vec<(f32, f32)> {
    let (cx, cy) = rect.center();
    let right_x = rect.right() + pad;
    let top_y = rect.y - pad;
    vec![
        (rect.right(), cy),
        (right_x, cy),
        (right_x, top_y),
        (cx, top_y),
        (cx, rect.y),
    ]
}

/// Drop duplicate and collinear interior points.
pub(super) fn compress_path(points: &[(f32, f32)]) -> Vec<(f32, f32)> {
    if points.len() <= 2 {
        return points.to_vec();
    }
    let mut out: Vec<(f32, f32)> = Vec::with_capacity(points.len());
    out.push(points[0]);
    for idx in 1..points.len() - 1 {
        let prev = out[out.len() - 1];
        let curr = points[idx];
        if (curr.0 - prev.0).abs() <= EPS && (curr.1 - prev.1).abs() <= EPS {
            continue;
        }
        let next = points[idx + 1];
        let dx1 = curr.0 - prev.0;
        let dy1 = curr.1 - prev.1;
        let dx2 = next.0 - curr.0;
        let dy2 = next.1 - curr.1;
        if (dx1.abs() <= EPS && dx2.abs() <= EPS) || (dy1.abs() <= EPS && dy2.abs() <= EPS) {
            continue;
        }
        out.push(curr);
    }
    let last = points[points.len() - 1];
    let tail = out[out.len() - 1];
    if (last.0 - tail.0).abs() > EPS || (last.1 - tail.1).abs() > EPS {
        out.push(last);
    }
    out
}

pub(super) fn path_length(points: &[(f32, f32)]) -> f32 {
    points
        .windows(2)
        .map(|segment| {
            let dx = segment[1].0 - segment[0].0;
            let dy = segment[1].1 - segment[0].1;
            (dx * dx + dy * dy).sqrt()
        })
        .sum()
}

/// Midpoint of the longest segment; the first one wins ties.
pub(super) fn edge_label_anchor_from_points(points: &[(f32, f32)]) -> Option<(f32, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, segment) in points.windows(2).enumerate() {
        let len = path_length(segment);
        if best.is_none_or(|(_, best_len)| len > best_len) {
            best = Some((idx, len));
        }
    }
    let (idx, _) = best?;
    let p1 = points[idx];
    let p2 = points[idx + 1];
    Some(((p1.0 + p2.0) / 2.0, (p1.1 + p2.1) / 2.0))
}
