//! Zone data service: the read-only catalogue of suburbs and properties.
//!
//! Suburbs carry a traffic-light classification (green / orange / red) and a
//! liquidity score; properties carry a base value and an idiosyncratic
//! volatility. The catalogue is built deterministically from the config at
//! load time and shared immutably across all simulation paths.

use std::collections::HashMap;

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::rng::RngFactory;

/// Geographic risk tier from the traffic-light classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    Green,
    Orange,
    Red,
}

impl Zone {
    pub fn all() -> [Zone; 3] {
        [Zone::Green, Zone::Orange, Zone::Red]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Zone::Green => "green",
            Zone::Orange => "orange",
            Zone::Red => "red",
        }
    }
}

/// One value per zone. Used for allocations, caps, price paths and
/// anything else keyed by traffic-light tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneMap<T> {
    pub green: T,
    pub orange: T,
    pub red: T,
}

impl<T> ZoneMap<T> {
    pub fn get(&self, zone: Zone) -> &T {
        match zone {
            Zone::Green => &self.green,
            Zone::Orange => &self.orange,
            Zone::Red => &self.red,
        }
    }

    pub fn get_mut(&mut self, zone: Zone) -> &mut T {
        match zone {
            Zone::Green => &mut self.green,
            Zone::Orange => &mut self.orange,
            Zone::Red => &mut self.red,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Zone, &T)> {
        Zone::all().into_iter().map(move |z| (z, self.get(z)))
    }

    pub fn map<U>(&self, mut f: impl FnMut(Zone, &T) -> U) -> ZoneMap<U> {
        ZoneMap {
            green: f(Zone::Green, &self.green),
            orange: f(Zone::Orange, &self.orange),
            red: f(Zone::Red, &self.red),
        }
    }
}

impl<T: Clone> ZoneMap<T> {
    pub fn uniform(value: T) -> Self {
        ZoneMap {
            green: value.clone(),
            orange: value.clone(),
            red: value,
        }
    }
}

impl ZoneMap<f64> {
    pub fn sum(&self) -> f64 {
        self.green + self.orange + self.red
    }
}

/// Per-zone market parameters: appreciation dynamics and credit behaviour.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ZoneParams {
    /// Annualised home-price appreciation drift.
    pub appreciation_mean: f64,
    /// Annualised home-price volatility.
    pub appreciation_vol: f64,
    /// Baseline annual probability of default for loans in this zone.
    pub default_rate: f64,
    /// Fraction of property value recovered on foreclosure.
    pub recovery_rate: f64,
    /// Foreclosure cost as a fraction of property value at exit.
    pub foreclosure_cost_rate: f64,
}

/// Catalogue construction parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogueConfig {
    pub suburbs_per_zone: usize,
    pub properties_per_suburb: usize,
    /// Mean property value per zone (dollars).
    pub value_mean: ZoneMap<f64>,
    /// Property value standard deviation per zone.
    pub value_std: ZoneMap<f64>,
    /// Idiosyncratic annual price volatility per property, per zone.
    pub property_idio_vol: ZoneMap<f64>,
}

impl Default for CatalogueConfig {
    fn default() -> Self {
        CatalogueConfig {
            suburbs_per_zone: 20,
            properties_per_suburb: 50,
            value_mean: ZoneMap {
                green: 900_000.0,
                orange: 650_000.0,
                red: 450_000.0,
            },
            value_std: ZoneMap {
                green: 220_000.0,
                orange: 160_000.0,
                red: 110_000.0,
            },
            property_idio_vol: ZoneMap {
                green: 0.03,
                orange: 0.05,
                red: 0.08,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Suburb {
    pub id: u32,
    pub zone: Zone,
    pub name: String,
    /// Composite zoning score in [0, 100]; higher is stronger.
    pub score: f64,
    /// Liquidity score in [0, 1]; scales sale hazard.
    pub liquidity_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Property {
    pub id: u64,
    pub suburb_id: u32,
    pub zone: Zone,
    /// Appraised value at vintage (dollars).
    pub base_value: f64,
    /// Idiosyncratic annual price volatility.
    pub idio_vol: f64,
}

/// The immutable suburb/property catalogue shared across paths.
#[derive(Debug, Clone)]
pub struct TlsCatalogue {
    suburbs: HashMap<u32, Suburb>,
    properties: HashMap<u64, Property>,
    by_zone: ZoneMap<Vec<u64>>,
}

impl TlsCatalogue {
    /// Build the catalogue deterministically from the config. The catalogue
    /// stream is independent of every per-path stream, so all paths see the
    /// same suburbs and properties.
    pub fn build(config: &CatalogueConfig, seed: u64) -> Self {
        let factory = RngFactory::new(seed);
        let mut rng = factory.stream("tls/catalogue");

        let mut suburbs = HashMap::new();
        let mut properties = HashMap::new();
        let mut by_zone = ZoneMap::uniform(Vec::new());

        let mut suburb_id: u32 = 0;
        let mut property_id: u64 = 0;

        for zone in Zone::all() {
            let (score_lo, score_hi) = match zone {
                Zone::Green => (70.0, 95.0),
                Zone::Orange => (45.0, 70.0),
                Zone::Red => (20.0, 45.0),
            };
            let value_dist =
                Normal::new(*config.value_mean.get(zone), *config.value_std.get(zone))
                    .expect("catalogue value std must be positive");

            for s in 0..config.suburbs_per_zone {
                suburb_id += 1;
                let score = rng.gen_range(score_lo..score_hi);
                let liquidity_score = rng.gen_range(0.3..1.0);
                suburbs.insert(
                    suburb_id,
                    Suburb {
                        id: suburb_id,
                        zone,
                        name: format!("{}-{:03}", zone.name(), s + 1),
                        score,
                        liquidity_score,
                    },
                );

                for _ in 0..config.properties_per_suburb {
                    property_id += 1;
                    let raw: f64 = value_dist.sample(&mut rng);
                    let base_value = raw.max(*config.value_mean.get(zone) * 0.25);
                    properties.insert(
                        property_id,
                        Property {
                            id: property_id,
                            suburb_id,
                            zone,
                            base_value,
                            idio_vol: *config.property_idio_vol.get(zone),
                        },
                    );
                    by_zone.get_mut(zone).push(property_id);
                }
            }
        }

        TlsCatalogue {
            suburbs,
            properties,
            by_zone,
        }
    }

    pub fn suburb(&self, id: u32) -> Result<&Suburb, SimError> {
        self.suburbs
            .get(&id)
            .ok_or_else(|| SimError::missing("suburb", id.to_string()))
    }

    pub fn property(&self, id: u64) -> Result<&Property, SimError> {
        self.properties
            .get(&id)
            .ok_or_else(|| SimError::missing("property", id.to_string()))
    }

    /// Property ids in a zone, in deterministic catalogue order.
    pub fn zone_properties(&self, zone: Zone) -> &[u64] {
        self.by_zone.get(zone)
    }

    pub fn suburb_count(&self) -> usize {
        self.suburbs.len()
    }

    pub fn property_count(&self) -> usize {
        self.properties.len()
    }
}
