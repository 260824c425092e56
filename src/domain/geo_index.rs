// Static reverse lookup from a search circle to the state ASOS networks it touches

const EARTH_RADIUS_KM: f64 = 6371.0;
const KM_PER_DEGREE_LAT: f64 = 111.0;

/// Bounding box of one state-level station network.
#[derive(Debug, Clone, Copy)]
pub struct NetworkBounds {
    pub network: &'static str,
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

const fn bounds(
    network: &'static str,
    min_lat: f64,
    max_lat: f64,
    min_lon: f64,
    max_lon: f64,
) -> NetworkBounds {
    NetworkBounds {
        network,
        min_lat,
        max_lat,
        min_lon,
        max_lon,
    }
}

pub const STATE_NETWORKS: &[NetworkBounds] = &[
    bounds("AL_ASOS", 30.1, 35.1, -88.5, -84.9),
    bounds("AZ_ASOS", 31.3, 37.0, -114.9, -109.0),
    bounds("AR_ASOS", 33.0, 36.5, -94.7, -89.6),
    bounds("CA_ASOS", 32.5, 42.0, -124.5, -114.1),
    bounds("CO_ASOS", 36.9, 41.0, -109.1, -102.0),
    bounds("CT_ASOS", 40.9, 42.1, -73.8, -71.8),
    bounds("DE_ASOS", 38.4, 39.9, -75.8, -75.0),
    bounds("FL_ASOS", 24.4, 31.0, -87.7, -80.0),
    bounds("GA_ASOS", 30.3, 35.0, -85.7, -80.8),
    bounds("ID_ASOS", 41.9, 49.0, -117.3, -111.0),
    bounds("IL_ASOS", 36.9, 42.6, -91.6, -87.0),
    bounds("IN_ASOS", 37.7, 41.8, -88.1, -84.7),
    bounds("IA_ASOS", 40.3, 43.6, -96.7, -90.1),
    bounds("KS_ASOS", 36.9, 40.0, -102.1, -94.5),
    bounds("KY_ASOS", 36.4, 39.2, -89.6, -81.9),
    bounds("LA_ASOS", 28.9, 33.1, -94.1, -88.8),
    bounds("ME_ASOS", 43.0, 47.5, -71.1, -66.9),
    bounds("MD_ASOS", 37.9, 39.8, -79.5, -75.0),
    bounds("MA_ASOS", 41.2, 42.9, -73.6, -69.9),
    bounds("MI_ASOS", 41.6, 48.3, -90.5, -82.4),
    bounds("MN_ASOS", 43.4, 49.4, -97.3, -89.4),
    bounds("MS_ASOS", 30.1, 35.0, -91.7, -88.1),
    bounds("MO_ASOS", 35.9, 40.7, -95.8, -89.1),
    bounds("MT_ASOS", 44.3, 49.0, -116.1, -104.0),
    bounds("NE_ASOS", 40.0, 43.0, -104.1, -95.3),
    bounds("NV_ASOS", 35.0, 42.0, -120.0, -114.0),
    bounds("NH_ASOS", 42.7, 45.4, -72.6, -70.6),
    bounds("NJ_ASOS", 38.9, 41.4, -75.6, -73.9),
    bounds("NM_ASOS", 31.3, 37.0, -109.1, -103.0),
    bounds("NY_ASOS", 40.5, 45.0, -79.8, -71.8),
    bounds("NC_ASOS", 33.8, 36.6, -84.4, -75.4),
    bounds("ND_ASOS", 45.9, 49.0, -104.1, -96.5),
    bounds("OH_ASOS", 38.4, 42.0, -84.9, -80.5),
    bounds("OK_ASOS", 33.6, 37.0, -103.0, -94.4),
    bounds("OR_ASOS", 41.9, 46.3, -124.6, -116.5),
    bounds("PA_ASOS", 39.7, 42.3, -80.6, -74.7),
    bounds("RI_ASOS", 41.1, 42.0, -71.9, -71.1),
    bounds("SC_ASOS", 32.0, 35.2, -83.4, -78.5),
    bounds("SD_ASOS", 42.5, 45.9, -104.1, -96.4),
    bounds("TN_ASOS", 34.9, 36.7, -90.4, -81.6),
    bounds("TX_ASOS", 25.8, 36.5, -106.7, -93.5),
    bounds("UT_ASOS", 37.0, 42.0, -114.1, -109.0),
    bounds("VT_ASOS", 42.7, 45.0, -73.5, -71.5),
    bounds("VA_ASOS", 36.5, 39.5, -83.7, -75.2),
    bounds("WA_ASOS", 45.5, 49.0, -124.8, -116.9),
    bounds("WV_ASOS", 37.2, 40.7, -82.7, -77.7),
    bounds("WI_ASOS", 42.5, 47.1, -92.9, -86.8),
    bounds("WY_ASOS", 41.0, 45.0, -111.1, -104.0),
];

/// Networks whose bounding box overlaps the box enclosing the search circle.
pub fn networks_within(lat: f64, lon: f64, radius_km: f64) -> Vec<&'static str> {
    let dlat = radius_km / KM_PER_DEGREE_LAT;
    let dlon = radius_km / (KM_PER_DEGREE_LAT * lat.to_radians().cos().abs().max(0.01));

    STATE_NETWORKS
        .iter()
        .filter(|b| {
            lat - dlat <= b.max_lat
                && lat + dlat >= b.min_lat
                && lon - dlon <= b.max_lon
                && lon + dlon >= b.min_lon
        })
        .map(|b| b.network)
        .collect()
}

/// Great-circle distance in kilometres.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}
