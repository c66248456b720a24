//! Geographic to local planar coordinate transforms
//!
//! All fusion math runs in a local east/north frame anchored at a session
//! reference point. The mapping is equirectangular:
//! - y (northing) = Δlat · 111111
//! - x (easting)  = Δlon · 111111 · cos(reference latitude)
//!
//! which is accurate to well under a meter within a few kilometers of the
//! reference. Great-circle distances use the haversine formula.

use tracing::debug;

use crate::core::constants::{DEGREE_IN_METERS, EARTH_MEAN_RADIUS_M};
use crate::core::{GeoPoint, PlanarPoint};
use crate::validation::error::{FusionError, FusionResult};

/// Planar offset of `point` from `reference` in meters
pub fn planar_offset(reference: &GeoPoint, point: &GeoPoint) -> PlanarPoint {
    let ref_lat_rad = reference.latitude.to_radians();
    PlanarPoint {
        x: wrap_longitude(point.longitude - reference.longitude) * DEGREE_IN_METERS * ref_lat_rad.cos(),
        y: (point.latitude - reference.latitude) * DEGREE_IN_METERS,
    }
}

/// Longitude (or longitude difference) wrapped into [-180, 180)
pub fn wrap_longitude(degrees: f64) -> f64 {
    (degrees + 180.0).rem_euclid(360.0) - 180.0
}

/// Geographic point at `offset` meters from `reference`; inverse of [`planar_offset`].
///
/// Longitude wraps across the antimeridian and latitude saturates at the poles.
pub fn apply_offset(reference: &GeoPoint, offset: &PlanarPoint) -> GeoPoint {
    let ref_lat_rad = reference.latitude.to_radians();
    GeoPoint {
        latitude: (reference.latitude + offset.y / DEGREE_IN_METERS).clamp(-90.0, 90.0),
        longitude: wrap_longitude(reference.longitude + offset.x / (DEGREE_IN_METERS * ref_lat_rad.cos())),
    }
}

/// Great-circle distance in meters
pub fn haversine_distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_MEAN_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Session-scoped transform between geographic and local planar coordinates
#[derive(Debug, Clone, Default)]
pub struct CoordinateTransform {
    reference: Option<GeoPoint>,
    /// Set on first conversion; the reference cannot move afterwards
    frozen: bool,
}

impl CoordinateTransform {
    /// Transform with no reference; the first `to_planar` call anchors it
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reference(reference: GeoPoint) -> FusionResult<Self> {
        reference.validate()?;
        Ok(Self {
            reference: Some(reference),
            frozen: false,
        })
    }

    pub fn reference(&self) -> Option<&GeoPoint> {
        self.reference.as_ref()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Replace the reference point. Fails once any conversion has used it.
    pub fn set_reference(&mut self, reference: GeoPoint) -> FusionResult<()> {
        if self.frozen {
            if let Some(current) = self.reference {
                return Err(FusionError::ReferenceFrozen {
                    latitude: current.latitude,
                    longitude: current.longitude,
                });
            }
        }
        reference.validate()?;
        self.reference = Some(reference);
        Ok(())
    }

    /// Convert to the local frame. Without a reference, `point` becomes the
    /// reference and the origin is returned.
    pub fn to_planar(&mut self, point: &GeoPoint) -> FusionResult<PlanarPoint> {
        point.validate()?;
        let reference = match self.reference {
            Some(reference) => reference,
            None => {
                debug!(
                    latitude = point.latitude,
                    longitude = point.longitude,
                    "Anchoring planar frame at first converted point"
                );
                self.reference = Some(*point);
                *point
            }
        };
        self.frozen = true;
        Ok(planar_offset(&reference, point))
    }

    /// Convert a local planar point back to geographic coordinates
    pub fn to_geographic(&self, planar: &PlanarPoint) -> FusionResult<GeoPoint> {
        let reference = self.reference.ok_or(FusionError::NotInitialized)?;
        if !planar.x.is_finite() || !planar.y.is_finite() {
            return Err(FusionError::invalid_argument("planar", "non-finite planar coordinate"));
        }
        Ok(apply_offset(&reference, planar))
    }

    /// Great-circle distance between two geographic points
    pub fn distance(&self, a: &GeoPoint, b: &GeoPoint) -> f64 {
        haversine_distance(a, b)
    }

    /// Euclidean distance between two geographic points in the local frame
    pub fn planar_distance(&mut self, a: &GeoPoint, b: &GeoPoint) -> FusionResult<f64> {
        let pa = self.to_planar(a)?;
        let pb = self.to_planar(b)?;
        Ok(pa.distance_to(&pb))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edinburgh() -> GeoPoint {
        GeoPoint::new(55.9229, -3.1745).unwrap()
    }

    #[test]
    fn test_first_conversion_anchors_reference() {
        let mut transform = CoordinateTransform::new();
        assert!(!transform.is_frozen());

        let origin = transform.to_planar(&edinburgh()).unwrap();
        assert_eq!(origin, PlanarPoint::ORIGIN);
        assert!(transform.is_frozen());
        assert_eq!(transform.reference(), Some(&edinburgh()));
    }

    #[test]
    fn test_reference_frozen_after_use() {
        let mut transform = CoordinateTransform::with_reference(edinburgh()).unwrap();
        let other = GeoPoint::new(55.95, -3.19).unwrap();

        // Still movable before any conversion
        assert!(transform.set_reference(other).is_ok());
        transform.to_planar(&other).unwrap();

        let result = transform.set_reference(edinburgh());
        assert!(matches!(result, Err(FusionError::ReferenceFrozen { .. })));
        assert_eq!(transform.reference(), Some(&other));
    }

    #[test]
    fn test_to_geographic_requires_reference() {
        let transform = CoordinateTransform::new();
        let result = transform.to_geographic(&PlanarPoint::new(1.0, 1.0));
        assert_eq!(result, Err(FusionError::NotInitialized));
    }

    #[test]
    fn test_axis_scaling() {
        let mut transform = CoordinateTransform::with_reference(edinburgh()).unwrap();
        let north = GeoPoint::new(55.9239, -3.1745).unwrap();
        let east = GeoPoint::new(55.9229, -3.1735).unwrap();

        let p_north = transform.to_planar(&north).unwrap();
        assert!(p_north.x.abs() < 1e-9);
        assert!((p_north.y - 111.111).abs() < 1e-3);

        let p_east = transform.to_planar(&east).unwrap();
        let expected = 111.111 * 55.9229_f64.to_radians().cos();
        assert!((p_east.x - expected).abs() < 1e-3);
        assert!(p_east.y.abs() < 1e-9);
    }

    #[test]
    fn test_round_trip() {
        let mut transform = CoordinateTransform::with_reference(edinburgh()).unwrap();
        for (dlat, dlon) in [(0.01, 0.02), (-0.02, 0.015), (0.0, -0.03), (0.025, -0.01)] {
            let point = GeoPoint::new(55.9229 + dlat, -3.1745 + dlon).unwrap();
            let planar = transform.to_planar(&point).unwrap();
            let back = transform.to_geographic(&planar).unwrap();
            assert!((back.latitude - point.latitude).abs() < 1e-9);
            assert!((back.longitude - point.longitude).abs() < 1e-9);
        }
    }

    #[test]
    fn test_offset_wraps_across_antimeridian() {
        let mut transform = CoordinateTransform::with_reference(GeoPoint::new(0.0, 179.9999).unwrap()).unwrap();
        let east = transform.to_geographic(&PlanarPoint::new(50.0, 0.0)).unwrap();
        assert!(east.validate().is_ok());
        assert!(east.longitude < -179.999 && east.longitude > -180.0);

        let planar = transform.to_planar(&east).unwrap();
        assert!((planar.x - 50.0).abs() < 1e-6);
        assert!(planar.y.abs() < 1e-9);
    }

    #[test]
    fn test_offset_saturates_at_pole() {
        let transform = CoordinateTransform::with_reference(GeoPoint::new(89.9999, 0.0).unwrap()).unwrap();
        let beyond = transform.to_geographic(&PlanarPoint::new(0.0, 1000.0)).unwrap();
        assert_eq!(beyond.latitude, 90.0);
        assert!(beyond.validate().is_ok());
        assert_eq!(wrap_longitude(180.0), -180.0);
        assert_eq!(wrap_longitude(-190.0), 170.0);
    }

    #[test]
    fn test_haversine_close_to_planar_distance() {
        let mut transform = CoordinateTransform::with_reference(edinburgh()).unwrap();
        let a = edinburgh();
        let b = GeoPoint::new(55.9249, -3.1715).unwrap();

        let great_circle = transform.distance(&a, &b);
        let planar = transform.planar_distance(&a, &b).unwrap();
        // Equirectangular scale differs from the mean radius by well under 1%
        assert!((great_circle - planar).abs() / great_circle < 0.01);
    }

    #[test]
    fn test_haversine_one_degree_latitude() {
        let a = GeoPoint::new(0.0, 0.0).unwrap();
        let b = GeoPoint::new(1.0, 0.0).unwrap();
        let expected = EARTH_MEAN_RADIUS_M * 1.0_f64.to_radians();
        assert!((haversine_distance(&a, &b) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_invalid_points() {
        let mut transform = CoordinateTransform::new();
        let bad = GeoPoint { latitude: 95.0, longitude: 0.0 };
        assert!(matches!(
            transform.to_planar(&bad),
            Err(FusionError::InvalidArgument { .. })
        ));
        assert!(transform.reference().is_none());
    }
}
