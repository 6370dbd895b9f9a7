use serde::Serialize;

/// A tide gauge and the forecast place that covers it
///
/// The heights page and the forecast page name locations differently
/// ("La Plata" vs "PUERTO LA PLATA"); a pair links the two.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StationPair {
    pub station: String,
    pub place: String,
}

impl StationPair {
    pub fn new(station: impl Into<String>, place: impl Into<String>) -> Self {
        Self {
            station: station.into(),
            place: place.into(),
        }
    }
}

/// Ordered set of gauge/place pairs to reconcile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationMap {
    pairs: Vec<StationPair>,
}

impl StationMap {
    pub fn new(pairs: Vec<StationPair>) -> Self {
        Self { pairs }
    }

    pub fn pairs(&self) -> &[StationPair] {
        &self.pairs
    }

    pub fn place_for(&self, station: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|p| p.station == station)
            .map(|p| p.place.as_str())
    }

    pub fn station_for(&self, place: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|p| p.place == place)
            .map(|p| p.station.as_str())
    }
}

impl Default for StationMap {
    /// Gauges of the Río de la Plata with a published forecast place.
    /// "Buenos  Aires" carries two spaces, as published on the heights page.
    fn default() -> Self {
        Self::new(vec![
            StationPair::new("Buenos  Aires", "PUERTO DE BUENOS AIRES (Dársena F)"),
            StationPair::new("La Plata", "PUERTO LA PLATA"),
            StationPair::new("Oyarvide", "CANAL PUNTA INDIO (Oyarvide - Km 133)"),
            StationPair::new("San Fernando", "SAN FERNANDO"),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_map_has_four_pairs() {
        let map = StationMap::default();
        assert_eq!(map.pairs().len(), 4);
    }

    #[test]
    fn test_translation_both_ways() {
        let map = StationMap::default();
        assert_eq!(map.place_for("La Plata"), Some("PUERTO LA PLATA"));
        assert_eq!(map.station_for("SAN FERNANDO"), Some("San Fernando"));
        assert_eq!(map.place_for("Mar del Plata"), None);
    }

    #[test]
    fn test_buenos_aires_keeps_double_space() {
        let map = StationMap::default();
        assert!(map.place_for("Buenos  Aires").is_some());
        assert!(map.place_for("Buenos Aires").is_none());
    }
}
