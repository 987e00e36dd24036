/// An axis-aligned rectangle, in frame pixel coordinates, believed to contain a face.
///
/// Regions carry no identity: every localization call yields an
/// independent set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FaceRegion {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl FaceRegion {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    /// True when the whole rectangle lies inside a `frame_w` x `frame_h` frame.
    pub fn is_within(&self, frame_w: u32, frame_h: u32) -> bool {
        self.x >= 0
            && self.y >= 0
            && self.right() as i64 <= frame_w as i64
            && self.bottom() as i64 <= frame_h as i64
    }

    /// Intersects the region with the frame. `None` if nothing is left.
    pub fn clamp_to(&self, frame_w: u32, frame_h: u32) -> Option<FaceRegion> {
        let x1 = self.x.max(0);
        let y1 = self.y.max(0);
        let x2 = self.right().min(frame_w as i32);
        let y2 = self.bottom().min(frame_h as i32);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(FaceRegion::new(x1, y1, x2 - x1, y2 - y1))
    }

    /// True when both sides reach the given minimum size.
    pub fn meets_min_size(&self, min_width: u32, min_height: u32) -> bool {
        self.width as i64 >= min_width as i64 && self.height as i64 >= min_height as i64
    }
}
