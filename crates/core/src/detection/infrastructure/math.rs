//! Union-find clustering and raw-hit grouping for the cascade localizer.

use std::collections::HashMap;

use crate::shared::region::FaceRegion;

/// Similarity tolerance used when clustering raw cascade hits.
pub const GROUP_EPS: f64 = 0.2;

/// Find root of element `i` with path halving for amortized near-O(1).
pub fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Merge the sets containing `a` and `b`.
pub fn union(parent: &mut [usize], a: usize, b: usize) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        parent[ra] = rb;
    }
}

/// Two rectangles are similar when every edge lies within `eps` times
/// their mean smaller side of the other's.
pub fn similar(a: &FaceRegion, b: &FaceRegion, eps: f64) -> bool {
    let delta = eps * (a.width.min(b.width) + a.height.min(b.height)) as f64 * 0.5;
    (a.x - b.x).abs() as f64 <= delta
        && (a.y - b.y).abs() as f64 <= delta
        && (a.right() - b.right()).abs() as f64 <= delta
        && (a.bottom() - b.bottom()).abs() as f64 <= delta
}

/// Clusters overlapping raw detections and keeps the well-supported ones.
///
/// Each cluster is replaced by its mean rectangle. Clusters with
/// `min_neighbors` or fewer members are dropped, as are clusters lying
/// inside a stronger one. `min_neighbors == 0` returns the input unchanged.
/// Output order follows the first member of each cluster.
pub fn group_rectangles(rects: &[FaceRegion], min_neighbors: u32, eps: f64) -> Vec<FaceRegion> {
    if min_neighbors == 0 || rects.is_empty() {
        return rects.to_vec();
    }

    let n = rects.len();
    let mut parent: Vec<usize> = (0..n).collect();
    for i in 0..n {
        for j in (i + 1)..n {
            if similar(&rects[i], &rects[j], eps) {
                union(&mut parent, i, j);
            }
        }
    }

    // (sum_x, sum_y, sum_w, sum_h, count) per cluster, in first-seen order.
    let mut slot_of_root: HashMap<usize, usize> = HashMap::new();
    let mut sums: Vec<[i64; 5]> = Vec::new();
    for (i, r) in rects.iter().enumerate() {
        let root = find(&mut parent, i);
        let slot = *slot_of_root.entry(root).or_insert_with(|| {
            sums.push([0; 5]);
            sums.len() - 1
        });
        let s = &mut sums[slot];
        s[0] += r.x as i64;
        s[1] += r.y as i64;
        s[2] += r.width as i64;
        s[3] += r.height as i64;
        s[4] += 1;
    }

    let clusters: Vec<(FaceRegion, u32)> = sums
        .iter()
        .map(|s| {
            let count = s[4] as f64;
            let avg = |v: i64| (v as f64 / count).round() as i32;
            (
                FaceRegion::new(avg(s[0]), avg(s[1]), avg(s[2]), avg(s[3])),
                s[4] as u32,
            )
        })
        .collect();

    clusters
        .iter()
        .enumerate()
        .filter(|(_, (_, n1))| *n1 > min_neighbors)
        .filter(|&(i, &(r1, n1))| {
            !clusters.iter().enumerate().any(|(j, &(r2, n2))| {
                if i == j || n2 <= min_neighbors {
                    return false;
                }
                let dx = (r2.width as f64 * eps).round() as i32;
                let dy = (r2.height as f64 * eps).round() as i32;
                r1.x >= r2.x - dx
                    && r1.y >= r2.y - dy
                    && r1.right() <= r2.right() + dx
                    && r1.bottom() <= r2.bottom() + dy
                    && (n2 > n1.max(3) || n1 < 3)
            })
        })
        .map(|(_, (r, _))| *r)
        .collect()
}
