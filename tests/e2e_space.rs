//! End-to-end tests for the point index: metric, neighbor search and
//! structural mutation.
//!
//! Each test drives the public `Space` API only.

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use semspace::{Error, ObservationPosition, Point, PointUpdate, Space};

// ============================================================================
// Helper: the three-point reference space.
// ============================================================================

fn abc() -> Space {
    Space::from_points([
        Point::new([0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]).with_name("A"),
        Point::new([1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]).with_name("B"),
        Point::new([0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0]).with_name("C"),
    ])
}

fn coords() -> impl Strategy<Value = [f32; 7]> {
    prop::array::uniform7(-1.0f32..=1.0)
}

// ============================================================================
// 1. Weighted metric on the reference points
// ============================================================================

#[test]
fn test_reference_distances() {
    let space = abc();
    assert!((space.distance_between("A", "B").unwrap() - 1.0).abs() < 1e-6);
    assert!((space.distance_between("A", "C").unwrap() - 0.8).abs() < 1e-6);
}

// ============================================================================
// 2. Circular observation axis
// ============================================================================

#[test]
fn test_observation_axis_wraps() {
    let space = Space::new();
    let p = Point::new([0.0, 0.0, 0.0, 0.0, 0.1, 0.0, 0.0]);
    let q = Point::new([0.0, 0.0, 0.0, 0.0, 0.95, 0.0, 0.0]);
    let d = space.distance(&p, &q);
    // wrapped diff 0.15, weight 0.5
    assert!((d - 0.5 * 0.15).abs() < 1e-5, "got {d}");
    assert!((d - 0.5 * 0.85).abs() > 0.1);
}

#[test]
fn test_ring_endpoints_coincide() {
    let space = Space::new();
    let inside = Point::new([0.0; 7]);
    let mut around = inside.clone();
    around.update(PointUpdate {
        o: Some(ObservationPosition::Around.into()),
        ..Default::default()
    });
    let mut above = inside.clone();
    above.update(PointUpdate {
        o: Some(ObservationPosition::Above.into()),
        ..Default::default()
    });

    // "inside" sits at 0.0 and "around" at 1.0, the same place on the ring
    assert_eq!(around.o(), ObservationPosition::Around);
    assert_eq!(space.distance(&inside, &around), 0.0);
    assert!((space.distance(&inside, &above) - 0.5 * (2.0 / 6.0)).abs() < 1e-6);
}

// ============================================================================
// 3. Nearest neighbors
// ============================================================================

#[test]
fn test_neighbors_reference_order() {
    let space = abc();
    let hits = space.neighbors_of("A", 2).unwrap();
    let got: Vec<(String, f32)> = hits
        .into_iter()
        .map(|h| (h.point.name.unwrap(), h.distance))
        .collect();
    assert_eq!(got.len(), 2);
    assert_eq!(got[0].0, "C");
    assert_eq!(got[1].0, "B");
    assert!((got[0].1 - 0.8).abs() < 1e-6);
    assert!((got[1].1 - 1.0).abs() < 1e-6);
}

#[test]
fn test_neighbors_unknown_name() {
    let space = abc();
    assert!(matches!(space.neighbors_of("Z", 2), Err(Error::NotFound(_))));
}

#[test]
fn test_neighbors_after_mutation_see_new_coordinates() {
    let mut space = abc();
    let _ = space.neighbors_of("A", 2).unwrap();
    space
        .update("B", PointUpdate { x: Some(0.1), ..Default::default() })
        .unwrap();
    let hits = space.neighbors_of("A", 1).unwrap();
    assert_eq!(hits[0].point.name.as_deref(), Some("B"));
    assert!((hits[0].distance - 0.1).abs() < 1e-6);
}

// ============================================================================
// 4. Add / remove
// ============================================================================

#[test]
fn test_add_existing_name_replaces_in_place() {
    let mut space = abc();
    space.add(Point::new([0.5, 0.5, 0.0, 0.0, 0.0, 0.0, 0.0]).with_name("B"));
    assert_eq!(space.len(), 3);
    assert_eq!(space.position("B"), Some(1));
    assert_eq!(space.get("B").unwrap().x(), 0.5);
}

#[test]
fn test_remove_then_get_is_not_found() {
    let mut space = abc();
    space.remove("B").unwrap();
    assert!(matches!(space.get("B"), Err(Error::NotFound(_))));
    assert_eq!(space.position("C"), Some(1));
    assert!(matches!(space.remove("B"), Err(Error::NotFound(_))));

    let hits = space.neighbors_of("A", 5).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].point.name.as_deref(), Some("C"));
}

#[test]
fn test_to_vector_is_a_copy() {
    let space = abc();
    let mut v = space.get("B").unwrap().to_vector();
    v[0] = -1.0;
    assert_eq!(space.get("B").unwrap().x(), 1.0);
}

#[test]
fn test_from_vector_rejects_wrong_length() {
    assert!(matches!(Point::from_vector(&[0.0; 6]), Err(Error::Validation(_))));
    assert!(Point::from_vector(&[0.0; 7]).is_ok());
}

// ============================================================================
// 5. Metric laws
// ============================================================================

proptest! {
    #[test]
    fn prop_distance_to_self_is_zero(c in coords()) {
        let space = Space::new();
        let p = Point::new(c);
        prop_assert_eq!(space.distance(&p, &p), 0.0);
    }

    #[test]
    fn prop_distance_is_symmetric(a in coords(), b in coords()) {
        let space = Space::new();
        let (p, q) = (Point::new(a), Point::new(b));
        prop_assert_eq!(space.distance(&p, &q), space.distance(&q, &p));
    }
}
