use crate::models::tracking::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// Length of a polyline through `points` in order.
pub fn path_length_km<'a>(points: impl IntoIterator<Item = &'a GeoPoint>) -> f64 {
    let mut total = 0.0;
    let mut previous: Option<&GeoPoint> = None;

    for point in points {
        if let Some(prev) = previous {
            total += haversine_km(prev, point);
        }
        previous = Some(point);
    }

    total
}
