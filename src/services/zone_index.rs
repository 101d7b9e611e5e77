//! Zone index: pre-parsed polygons answering "which zones contain this point"
//!
//! Polygons are validated and converted once, when the index is built or
//! reloaded. Per-frame lookups only run the bounds pre-filter and ray casting.

use crate::domain::error::CoreError;
use crate::domain::track::ZoneSet;
use crate::domain::types::{Point, Zone, ZoneId};
use crate::services::geometry::{ray_cast, Bounds, MIN_POLYGON_VERTICES};
use rustc_hash::FxHashMap;
use tracing::info;

/// A validated zone with its vertex list ready for containment tests
#[derive(Debug, Clone)]
struct IndexedZone {
    zone: Zone,
    vertices: Vec<Point>,
    bounds: Bounds,
}

impl IndexedZone {
    fn parse(zone: Zone) -> Result<Self, CoreError> {
        if zone.coordinates.len() < MIN_POLYGON_VERTICES {
            return Err(CoreError::geometry(
                Some(zone.id),
                format!(
                    "needs at least {MIN_POLYGON_VERTICES} vertices, got {}",
                    zone.coordinates.len()
                ),
            ));
        }
        if zone.coordinates.iter().flatten().any(|c| !c.is_finite()) {
            return Err(CoreError::geometry(Some(zone.id), "non-finite coordinate"));
        }

        let vertices: Vec<Point> = zone.coordinates.iter().copied().map(Point::from).collect();
        let bounds = Bounds::of(&vertices);
        Ok(Self { zone, vertices, bounds })
    }

    #[inline]
    fn contains(&self, point: Point) -> bool {
        self.bounds.contains(point) && ray_cast(point, &self.vertices)
    }
}

/// Set of configured zones, ordered by zone id
#[derive(Debug, Clone, Default)]
pub struct ZoneIndex {
    zones: Vec<IndexedZone>,
    by_id: FxHashMap<ZoneId, usize>,
}

impl ZoneIndex {
    /// Build an index, rejecting the whole set if any polygon is invalid
    pub fn new(zones: Vec<Zone>) -> Result<Self, CoreError> {
        let mut parsed = zones.into_iter().map(IndexedZone::parse).collect::<Result<Vec<_>, _>>()?;
        parsed.sort_by_key(|z| z.zone.id);

        if let Some(dup) = parsed.windows(2).find(|w| w[0].zone.id == w[1].zone.id) {
            return Err(CoreError::config(format!("duplicate zone id {}", dup[0].zone.id)));
        }

        let by_id = parsed.iter().enumerate().map(|(i, z)| (z.zone.id, i)).collect();
        Ok(Self { zones: parsed, by_id })
    }

    /// Replace the zone configuration. On error the current zones are kept.
    pub fn reload_zones(&mut self, zones: Vec<Zone>) -> Result<(), CoreError> {
        let rebuilt = Self::new(zones)?;
        info!(
            previous = %self.zones.len(),
            zones = %rebuilt.zones.len(),
            "zones_reloaded"
        );
        *self = rebuilt;
        Ok(())
    }

    /// All zones containing `point`, in ascending zone id order
    pub fn zones_containing(&self, point: Point) -> ZoneSet {
        self.zones.iter().filter(|z| z.contains(point)).map(|z| z.zone.id).collect()
    }

    pub fn get(&self, zone_id: ZoneId) -> Option<&Zone> {
        self.by_id.get(&zone_id).map(|&i| &self.zones[i].zone)
    }

    /// Zone display name, `ZONE_<id>` for unknown or unnamed zones
    pub fn zone_name(&self, zone_id: ZoneId) -> String {
        self.get(zone_id).map(Zone::display_name).unwrap_or_else(|| format!("ZONE_{zone_id}"))
    }

    pub fn zones(&self) -> impl Iterator<Item = &Zone> {
        self.zones.iter().map(|z| &z.zone)
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(id: i32, name: &str, min: f64, max: f64) -> Zone {
        Zone::new(id, name, "product_area", vec![[min, min], [max, min], [max, max], [min, max]])
    }

    #[test]
    fn test_single_zone() {
        let index = ZoneIndex::new(vec![square(1, "Z", 0.0, 10.0)]).unwrap();
        assert_eq!(index.zones_containing(Point::new(5.0, 5.0)).as_slice(), &[ZoneId(1)]);
        assert!(index.zones_containing(Point::new(50.0, 50.0)).is_empty());
    }

    #[test]
    fn test_overlapping_zones_all_returned_in_id_order() {
        let index = ZoneIndex::new(vec![
            square(20, "store", 0.0, 100.0),
            square(3, "entrance", 0.0, 10.0),
        ])
        .unwrap();
        assert_eq!(
            index.zones_containing(Point::new(5.0, 5.0)).as_slice(),
            &[ZoneId(3), ZoneId(20)]
        );
        assert_eq!(index.zones_containing(Point::new(50.0, 50.0)).as_slice(), &[ZoneId(20)]);
    }

    #[test]
    fn test_rejects_degenerate_polygon() {
        let bad = Zone::new(9, "line", "entrance", vec![[0.0, 0.0], [1.0, 1.0]]);
        let err = ZoneIndex::new(vec![square(1, "ok", 0.0, 10.0), bad]).unwrap_err();
        assert_eq!(
            err,
            CoreError::InvalidZoneGeometry {
                zone_id: Some(ZoneId(9)),
                reason: "needs at least 3 vertices, got 2".to_string(),
            }
        );
    }

    #[test]
    fn test_rejects_non_finite_coordinate() {
        let bad = Zone::new(2, "nan", "exit", vec![[0.0, 0.0], [f64::NAN, 0.0], [1.0, 1.0]]);
        assert!(matches!(
            ZoneIndex::new(vec![bad]),
            Err(CoreError::InvalidZoneGeometry { zone_id: Some(ZoneId(2)), .. })
        ));
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let err =
            ZoneIndex::new(vec![square(1, "a", 0.0, 10.0), square(1, "b", 5.0, 15.0)]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_reload_replaces_zones() {
        let mut index = ZoneIndex::new(vec![square(1, "a", 0.0, 10.0)]).unwrap();
        index.reload_zones(vec![square(2, "b", 20.0, 30.0)]).unwrap();
        assert!(index.zones_containing(Point::new(5.0, 5.0)).is_empty());
        assert_eq!(index.zones_containing(Point::new(25.0, 25.0)).as_slice(), &[ZoneId(2)]);
        assert!(index.get(ZoneId(1)).is_none());
    }

    #[test]
    fn test_failed_reload_keeps_previous_zones() {
        let mut index = ZoneIndex::new(vec![square(1, "a", 0.0, 10.0)]).unwrap();
        let bad = Zone::new(5, "bad", "exit", vec![]);
        assert!(index.reload_zones(vec![bad]).is_err());
        assert_eq!(index.len(), 1);
        assert_eq!(index.zones_containing(Point::new(5.0, 5.0)).as_slice(), &[ZoneId(1)]);
    }

    #[test]
    fn test_zone_name() {
        let index = ZoneIndex::new(vec![square(1, "Checkout", 0.0, 10.0)]).unwrap();
        assert_eq!(index.zone_name(ZoneId(1)), "Checkout");
        assert_eq!(index.zone_name(ZoneId(99)), "ZONE_99");
    }
}
