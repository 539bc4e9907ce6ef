use geo::{BooleanOps, Geometry, MultiPolygon, Polygon};

use crate::error::AtlasError;

/// Merges several areal geometries into one.
pub trait Dissolver {
    fn dissolve(&self, geometries: &[&Geometry<f64>]) -> Result<Geometry<f64>, AtlasError>;
}

/// Dissolves by polygon union.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolygonUnion;

impl Dissolver for PolygonUnion {
    fn dissolve(&self, geometries: &[&Geometry<f64>]) -> Result<Geometry<f64>, AtlasError> {
        let mut merged: Option<MultiPolygon<f64>> = None;
        for geometry in geometries {
            let next = to_multi_polygon(geometry)?;
            merged = Some(match merged {
                Some(current) => current.union(&next),
                None => next,
            });
        }
        let merged =
            merged.ok_or_else(|| AtlasError::Geometry("nothing to dissolve".to_string()))?;
        Ok(simplify(merged))
    }
}

fn to_multi_polygon(geometry: &Geometry<f64>) -> Result<MultiPolygon<f64>, AtlasError> {
    match geometry {
        Geometry::Polygon(polygon) => Ok(MultiPolygon::new(vec![polygon.clone()])),
        Geometry::MultiPolygon(multi) => Ok(multi.clone()),
        Geometry::Rect(rect) => Ok(MultiPolygon::new(vec![rect.to_polygon()])),
        Geometry::Triangle(triangle) => Ok(MultiPolygon::new(vec![triangle.to_polygon()])),
        Geometry::GeometryCollection(collection) => {
            let mut polygons: Vec<Polygon<f64>> = Vec::new();
            for item in &collection.0 {
                polygons.extend(to_multi_polygon(item)?.0);
            }
            Ok(MultiPolygon::new(polygons))
        }
        other => Err(AtlasError::Geometry(format!(
            "cannot dissolve non-areal geometry {}",
            geometry_kind(other)
        ))),
    }
}

fn simplify(multi: MultiPolygon<f64>) -> Geometry<f64> {
    if multi.0.len() == 1 {
        let mut polygons = multi.0;
        if let Some(polygon) = polygons.pop() {
            return Geometry::Polygon(polygon);
        }
        return Geometry::MultiPolygon(MultiPolygon::new(polygons));
    }
    Geometry::MultiPolygon(multi)
}

fn geometry_kind(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

#[cfg(test)]
mod tests {
    use geo::{Area, Point, Rect, coord};

    use super::*;

    fn square(x: f64, y: f64) -> Geometry<f64> {
        Geometry::Polygon(Rect::new(coord! { x: x, y: y }, coord! { x: x + 1.0, y: y + 1.0 }).to_polygon())
    }

    #[test]
    fn adjacent_squares_merge_into_one_polygon() {
        let a = square(0.0, 0.0);
        let b = square(1.0, 0.0);
        let merged = PolygonUnion.dissolve(&[&a, &b]).unwrap();
        assert!(matches!(merged, Geometry::Polygon(_)));
        assert!((merged.unsigned_area() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn disjoint_squares_stay_multi() {
        let a = square(0.0, 0.0);
        let b = square(5.0, 5.0);
        let merged = PolygonUnion.dissolve(&[&a, &b]).unwrap();
        match merged {
            Geometry::MultiPolygon(multi) => assert_eq!(multi.0.len(), 2),
            other => panic!("expected multipolygon, got {other:?}"),
        }
    }

    #[test]
    fn overlapping_area_counted_once() {
        let a = square(0.0, 0.0);
        let merged = PolygonUnion.dissolve(&[&a, &a]).unwrap();
        assert!((merged.unsigned_area() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_points() {
        let point = Geometry::Point(Point::new(0.0, 0.0));
        assert!(PolygonUnion.dissolve(&[&point]).is_err());
        assert!(PolygonUnion.dissolve(&[]).is_err());
    }
}
