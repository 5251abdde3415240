//! Geometric fall classification over detector observations.
//!
//! Pure math on bounding boxes and pose landmarks, shared by detector
//! backends. The classification is deliberately aggressive: any prone
//! person triggers, trading false positives for fewer missed falls. The
//! downstream confirmation window absorbs the resulting noise.

use crate::detect::{BoundingBox, Keypoint};

/// Minimum landmark visibility for it to count as observed.
pub const KEYPOINT_VIS_THRESHOLD: f32 = 0.35;

/// Fraction of landmarks that must be visible inside the person box.
pub const BODY_VIS_FRACTION: f32 = 0.35;

/// A person box with height/width below this ratio reads as prone.
pub const FALL_RATIO_THRESHOLD: f32 = 1.35;

/// Torso tilt from vertical, in degrees, beyond which the pose reads as fallen.
pub const FALL_ANGLE_THRESHOLD: f32 = 45.0;

/// Person boxes covering less of the frame than this are ignored as background.
pub const MIN_PERSON_AREA_RATIO: f32 = 0.05;

/// Landmark count of the full-body pose model.
pub const TOTAL_LANDMARKS: usize = 33;

const LEFT_SHOULDER: usize = 11;
const RIGHT_SHOULDER: usize = 12;
const LEFT_HIP: usize = 23;
const RIGHT_HIP: usize = 24;

/// Torso tilt angle in degrees between vertical and the shoulder-to-hip line.
///
/// Returns 0 when the pose is incomplete or either landmark pair is not
/// visible enough to trust, and 90 for a perfectly horizontal torso.
pub fn fall_angle(keypoints: &[Keypoint]) -> f32 {
    if keypoints.len() < TOTAL_LANDMARKS {
        return 0.0;
    }

    let mid_shoulder = match midpoint(&keypoints[LEFT_SHOULDER], &keypoints[RIGHT_SHOULDER]) {
        Some(p) => p,
        None => return 0.0,
    };
    let mid_hip = match midpoint(&keypoints[LEFT_HIP], &keypoints[RIGHT_HIP]) {
        Some(p) => p,
        None => return 0.0,
    };

    let dx = mid_hip.0 - mid_shoulder.0;
    let dy = mid_hip.1 - mid_shoulder.1;
    if dy == 0.0 {
        return 90.0;
    }
    (dx / dy).atan().to_degrees().abs()
}

fn midpoint(left: &Keypoint, right: &Keypoint) -> Option<(f32, f32)> {
    if left.visibility < KEYPOINT_VIS_THRESHOLD || right.visibility < KEYPOINT_VIS_THRESHOLD {
        return None;
    }
    Some(((left.x + right.x) / 2.0, (left.y + right.y) / 2.0))
}

/// Whether enough of the body is visible inside the person box to classify it.
///
/// Guards against classifying a head-and-shoulders crop as "prone" just
/// because its box is wide.
pub fn body_visibility_ok(keypoints: &[Keypoint], bbox: &BoundingBox) -> bool {
    if keypoints.is_empty() {
        return false;
    }

    let inside = keypoints
        .iter()
        .filter(|kp| kp.visibility >= KEYPOINT_VIS_THRESHOLD)
        .filter(|kp| bbox.contains(kp.x, kp.y))
        .count();

    (inside as f32 / TOTAL_LANDMARKS as f32) >= BODY_VIS_FRACTION
}

/// Whether a person box is large enough relative to the frame to matter.
pub fn person_large_enough(bbox: &BoundingBox, frame_width: u32, frame_height: u32) -> bool {
    let frame_area = (frame_width as i64) * (frame_height as i64);
    if frame_area == 0 {
        return false;
    }
    (bbox.area() as f32 / frame_area as f32) >= MIN_PERSON_AREA_RATIO
}

/// Classify whether any of the given person boxes reads as fallen.
///
/// A person counts as fallen when their box is wider than tall
/// (`h/w < FALL_RATIO_THRESHOLD`) or their torso tilt exceeds
/// `FALL_ANGLE_THRESHOLD` degrees.
pub fn is_fallen(persons: &[BoundingBox], keypoints: &[Keypoint]) -> bool {
    let angle = if keypoints.is_empty() {
        0.0
    } else {
        fall_angle(keypoints)
    };

    persons.iter().any(|p| {
        let ratio = p.height() as f32 / (p.width() as f32 + f32::EPSILON);
        ratio < FALL_RATIO_THRESHOLD || angle > FALL_ANGLE_THRESHOLD
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Full pose with every landmark at the given point and visibility.
    fn create_test_pose(x: f32, y: f32, visibility: f32) -> Vec<Keypoint> {
        vec![Keypoint::new(x, y, visibility); TOTAL_LANDMARKS]
    }

    /// Pose with shoulders and hips placed explicitly, everything else hidden.
    fn create_torso_pose(shoulder: (f32, f32), hip: (f32, f32)) -> Vec<Keypoint> {
        let mut pose = create_test_pose(0.0, 0.0, 0.0);
        pose[LEFT_SHOULDER] = Keypoint::new(shoulder.0, shoulder.1, 0.9);
        pose[RIGHT_SHOULDER] = Keypoint::new(shoulder.0, shoulder.1, 0.9);
        pose[LEFT_HIP] = Keypoint::new(hip.0, hip.1, 0.9);
        pose[RIGHT_HIP] = Keypoint::new(hip.0, hip.1, 0.9);
        pose
    }

    #[test]
    fn test_fall_angle_upright_torso() {
        let pose = create_torso_pose((100.0, 50.0), (100.0, 150.0));
        assert!(fall_angle(&pose) < 1.0);
    }

    #[test]
    fn test_fall_angle_horizontal_torso() {
        let pose = create_torso_pose((50.0, 100.0), (150.0, 100.0));
        assert!((fall_angle(&pose) - 90.0).abs() < 0.001);
    }

    #[test]
    fn test_fall_angle_diagonal_torso() {
        // 45 degree lean: equal horizontal and vertical displacement.
        let pose = create_torso_pose((50.0, 50.0), (150.0, 150.0));
        assert!((fall_angle(&pose) - 45.0).abs() < 0.1);
    }

    #[test]
    fn test_fall_angle_hidden_shoulders_is_zero() {
        let mut pose = create_torso_pose((50.0, 100.0), (150.0, 100.0));
        pose[LEFT_SHOULDER].visibility = 0.1;
        assert_eq!(fall_angle(&pose), 0.0);
    }

    #[test]
    fn test_fall_angle_incomplete_pose_is_zero() {
        let pose = vec![Keypoint::new(0.0, 0.0, 0.9); 10];
        assert_eq!(fall_angle(&pose), 0.0);
    }

    #[test]
    fn test_body_visibility_inside_box() {
        let bbox = BoundingBox::new(0, 0, 200, 200);
        let pose = create_test_pose(100.0, 100.0, 0.9);
        assert!(body_visibility_ok(&pose, &bbox));
    }

    #[test]
    fn test_body_visibility_outside_box() {
        let bbox = BoundingBox::new(0, 0, 50, 50);
        let pose = create_test_pose(100.0, 100.0, 0.9);
        assert!(!body_visibility_ok(&pose, &bbox));
    }

    #[test]
    fn test_body_visibility_low_confidence() {
        let bbox = BoundingBox::new(0, 0, 200, 200);
        let pose = create_test_pose(100.0, 100.0, 0.1);
        assert!(!body_visibility_ok(&pose, &bbox));
    }

    #[test]
    fn test_body_visibility_empty_pose() {
        let bbox = BoundingBox::new(0, 0, 200, 200);
        assert!(!body_visibility_ok(&[], &bbox));
    }

    #[test]
    fn test_person_area_filter() {
        assert!(person_large_enough(
            &BoundingBox::new(0, 0, 100, 100),
            320,
            320
        ));
        assert!(!person_large_enough(&BoundingBox::new(0, 0, 10, 10), 320, 320));
    }

    #[test]
    fn test_standing_person_is_not_fallen() {
        // Tall narrow box, upright torso.
        let persons = [BoundingBox::new(100, 20, 160, 300)];
        let pose = create_torso_pose((130.0, 60.0), (130.0, 180.0));
        assert!(!is_fallen(&persons, &pose));
    }

    #[test]
    fn test_prone_box_is_fallen() {
        // Wide flat box: h/w well below the ratio threshold.
        let persons = [BoundingBox::new(20, 200, 300, 280)];
        assert!(is_fallen(&persons, &[]));
    }

    #[test]
    fn test_tilted_torso_is_fallen() {
        // Tall box but torso nearly horizontal.
        let persons = [BoundingBox::new(100, 20, 160, 300)];
        let pose = create_torso_pose((50.0, 100.0), (150.0, 110.0));
        assert!(is_fallen(&persons, &pose));
    }

    #[test]
    fn test_no_persons_is_not_fallen() {
        assert!(!is_fallen(&[], &create_test_pose(0.0, 0.0, 0.9)));
    }
}
