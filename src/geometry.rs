use crate::pane::SplitDirection;

pub const MIN_RATIO: f32 = 0.1;
pub const MAX_RATIO: f32 = 0.9;

/// Fraction of a pane's width/height that counts as an edge drop band.
const EDGE_BAND: f32 = 0.25;

/// A rectangle in the rendering surface's pixel space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PaneViewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PaneViewport {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        PaneViewport { x, y, width, height }
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }

    /// Split along `direction`, giving `ratio` of the extent to the first half.
    pub fn split(&self, direction: SplitDirection, ratio: f32) -> (PaneViewport, PaneViewport) {
        match direction {
            SplitDirection::Horizontal => {
                let left_w = self.width * ratio;
                (
                    PaneViewport { x: self.x, y: self.y, width: left_w, height: self.height },
                    PaneViewport { x: self.x + left_w, y: self.y, width: self.width - left_w, height: self.height },
                )
            }
            SplitDirection::Vertical => {
                let top_h = self.height * ratio;
                (
                    PaneViewport { x: self.x, y: self.y, width: self.width, height: top_h },
                    PaneViewport { x: self.x, y: self.y + top_h, width: self.width, height: self.height - top_h },
                )
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropZone {
    Top,
    Bottom,
    Left,
    Right,
    Center,
}

impl DropZone {
    /// Split direction and whether the dropped pane goes first.
    /// `None` for the center zone, which swaps instead of splitting.
    pub fn placement(self) -> Option<(SplitDirection, bool)> {
        match self {
            DropZone::Top => Some((SplitDirection::Vertical, true)),
            DropZone::Bottom => Some((SplitDirection::Vertical, false)),
            DropZone::Left => Some((SplitDirection::Horizontal, true)),
            DropZone::Right => Some((SplitDirection::Horizontal, false)),
            DropZone::Center => None,
        }
    }
}

/// Classify a pointer position inside `pane` into one of the five drop zones.
/// Top/bottom bands win over left/right, so corners resolve vertically.
pub fn drop_zone(pane: PaneViewport, pointer_x: f32, pointer_y: f32) -> DropZone {
    let x = (pointer_x - pane.x) / pane.width;
    let y = (pointer_y - pane.y) / pane.height;

    if y < EDGE_BAND {
        DropZone::Top
    } else if y > 1.0 - EDGE_BAND {
        DropZone::Bottom
    } else if x < EDGE_BAND {
        DropZone::Left
    } else if x > 1.0 - EDGE_BAND {
        DropZone::Right
    } else {
        DropZone::Center
    }
}

pub fn clamp_ratio(ratio: f32) -> f32 {
    ratio.clamp(MIN_RATIO, MAX_RATIO)
}

/// New divider ratio after dragging it `delta` pixels inside a container of `container` pixels.
pub fn resize_ratio(start_ratio: f32, delta: f32, container: f32) -> f32 {
    if container <= 0.0 {
        return clamp_ratio(start_ratio);
    }
    clamp_ratio(start_ratio + delta / container)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_drop_zone_examples() {
        let rect = PaneViewport::new(0.0, 0.0, 400.0, 300.0);
        assert_eq!(drop_zone(rect, 10.0, 150.0), DropZone::Left);
        assert_eq!(drop_zone(rect, 200.0, 10.0), DropZone::Top);
        assert_eq!(drop_zone(rect, 200.0, 150.0), DropZone::Center);
        assert_eq!(drop_zone(rect, 390.0, 150.0), DropZone::Right);
        assert_eq!(drop_zone(rect, 200.0, 290.0), DropZone::Bottom);
    }

    #[test]
    fn test_drop_zone_corners_resolve_vertically() {
        let rect = PaneViewport::new(0.0, 0.0, 400.0, 300.0);
        assert_eq!(drop_zone(rect, 5.0, 5.0), DropZone::Top);
        assert_eq!(drop_zone(rect, 395.0, 5.0), DropZone::Top);
        assert_eq!(drop_zone(rect, 5.0, 295.0), DropZone::Bottom);
        assert_eq!(drop_zone(rect, 395.0, 295.0), DropZone::Bottom);
    }

    #[test]
    fn test_drop_zone_offset_rect() {
        let rect = PaneViewport::new(100.0, 50.0, 200.0, 100.0);
        assert_eq!(drop_zone(rect, 110.0, 100.0), DropZone::Left);
        assert_eq!(drop_zone(rect, 200.0, 100.0), DropZone::Center);
        assert_eq!(drop_zone(rect, 200.0, 55.0), DropZone::Top);
    }

    #[test]
    fn test_placement() {
        assert_eq!(DropZone::Top.placement(), Some((SplitDirection::Vertical, true)));
        assert_eq!(DropZone::Bottom.placement(), Some((SplitDirection::Vertical, false)));
        assert_eq!(DropZone::Left.placement(), Some((SplitDirection::Horizontal, true)));
        assert_eq!(DropZone::Right.placement(), Some((SplitDirection::Horizontal, false)));
        assert_eq!(DropZone::Center.placement(), None);
    }

    #[test]
    fn test_resize_ratio_clamps() {
        assert!(approx_eq(resize_ratio(0.5, -10000.0, 100.0), 0.1));
        assert!(approx_eq(resize_ratio(0.5, 10000.0, 100.0), 0.9));
        assert!(approx_eq(resize_ratio(0.5, 20.0, 100.0), 0.7));
    }

    #[test]
    fn test_resize_ratio_zero_container() {
        assert!(approx_eq(resize_ratio(0.4, 50.0, 0.0), 0.4));
    }

    #[test]
    fn test_viewport_split() {
        let vp = PaneViewport::new(0.0, 0.0, 200.0, 100.0);
        let (l, r) = vp.split(SplitDirection::Horizontal, 0.25);
        assert!(approx_eq(l.width, 50.0));
        assert!(approx_eq(r.x, 50.0));
        assert!(approx_eq(r.width, 150.0));
        let (t, b) = vp.split(SplitDirection::Vertical, 0.5);
        assert!(approx_eq(t.height, 50.0));
        assert!(approx_eq(b.y, 50.0));
    }
}
