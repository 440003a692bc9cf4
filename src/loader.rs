//! Loading region polygons into the map.
//!
//! A load removes the displayed region layer, queries the feature service on a background thread
//! and, once the answer is polled, adds the new layer, fits the view to it and installs the
//! editing interactions. Every load gets a generation number. Answers to loads that were
//! superseded in the meantime are discarded, so a slow answer never replaces a newer region.

use eyre::Context;
use geojson::FeatureCollection;
use log::{error, info, warn};
use poll_promise::Promise;
use std::sync::Arc;
use thiserror::Error;

use crate::Map;
use crate::config::ViewerConfig;
use crate::interactions::InteractionManager;
use crate::layers::Layer;
use crate::layers::geojson::{GeometryError, features_from_collection};
use crate::layers::vector::{FeatureSource, VectorLayer, VectorStyle};
use crate::regions::Smid;
use crate::service::{FeatureService, FeaturesBySqlParameters};

/// Map key of the region layer.
pub const REGION_LAYER: &str = "region";

/// Errors that can occur while loading a region.
#[derive(Error, Debug, PartialEq)]
pub enum LoadError {
    /// The query did not return an answer, or the service reported an error.
    #[error("Region query failed: {0}")]
    QueryFailed(String),

    /// The answer contains geometry that can't be displayed.
    #[error("Region data is malformed")]
    MalformedResponse(#[from] GeometryError),
}

/// What finishing a load did to the map.
#[derive(Debug, PartialEq)]
pub enum LoadOutcome {
    /// The region layer was replaced.
    Loaded {
        /// The loaded region, `None` for the default continent.
        region: Option<Smid>,
        /// The number of features on the new layer.
        features: usize,
    },
    /// The query matched nothing. The map has no region layer.
    Empty {
        /// The requested region.
        region: Option<Smid>,
    },
    /// The load failed and the previous region layer is back.
    Failed {
        /// The requested region.
        region: Option<Smid>,
        /// Why the load failed.
        error: LoadError,
    },
    /// A newer load was started after this one, its answer was dropped.
    Stale {
        /// The generation of the dropped load.
        generation: u64,
    },
}

type QueryResult = Result<FeatureCollection, Arc<eyre::Report>>;

struct PendingQuery {
    generation: u64,
    region: Option<Smid>,
    promise: Promise<QueryResult>,
}

/// Loads regions from a feature service into the region layer of a map.
pub struct RegionLoader {
    service: Arc<dyn FeatureService>,
    config: ViewerConfig,
    style: VectorStyle,
    generation: u64,
    pending: Vec<PendingQuery>,
    previous: Option<Box<dyn Layer>>,
    loading: bool,
}

impl RegionLoader {
    /// Creates a loader querying `service`. New region layers are painted with `style`.
    pub fn new(service: Arc<dyn FeatureService>, config: &ViewerConfig, style: VectorStyle) -> Self {
        Self {
            service,
            config: config.clone(),
            style,
            generation: 0,
            pending: Vec::new(),
            previous: None,
            loading: false,
        }
    }

    /// Starts loading a province, or the default continent when `region` is `None`. Edit mode is
    /// turned off and the region layer is taken off the map until the answer arrives. Returns the
    /// generation of the load.
    pub fn load_region(
        &mut self,
        map: &mut Map,
        interactions: &mut InteractionManager,
        region: Option<Smid>,
    ) -> u64 {
        // While a load is running the displayed layer is already set aside.
        if let Some(layer) = map.remove_layer(REGION_LAYER) {
            self.previous = Some(layer);
        }
        interactions.set_editing(map, false);
        self.loading = true;
        self.generation += 1;
        let generation = self.generation;

        let params = FeaturesBySqlParameters::for_region(&self.config, region);
        info!(
            "Loading region {} (generation {})",
            region.map_or_else(|| "overview".to_string(), |smid| smid.to_string()),
            generation
        );

        let service = Arc::clone(&self.service);
        let promise = Promise::spawn_thread("query_region", move || -> QueryResult {
            service
                .get_features_by_sql(&params)
                .with_context(|| {
                    format!(
                        "Failed to query `{}` from {}",
                        params.query_parameter.attribute_filter,
                        params.dataset_names.join(", ")
                    )
                })
                .map_err(Arc::new)
        });

        self.pending.push(PendingQuery {
            generation,
            region,
            promise,
        });
        generation
    }

    /// Finishes the loads whose answers arrived. Call once per frame.
    pub fn poll(
        &mut self,
        map: &mut Map,
        interactions: &mut InteractionManager,
    ) -> Vec<LoadOutcome> {
        let mut outcomes = Vec::new();
        for query in std::mem::take(&mut self.pending) {
            let PendingQuery {
                generation,
                region,
                promise,
            } = query;
            match promise.try_take() {
                Ok(result) => {
                    outcomes.push(self.finish(generation, region, result, map, interactions));
                }
                Err(promise) => self.pending.push(PendingQuery {
                    generation,
                    region,
                    promise,
                }),
            }
        }
        outcomes
    }

    /// Applies the answer of the load with the given generation to the map.
    pub fn finish(
        &mut self,
        generation: u64,
        region: Option<Smid>,
        result: QueryResult,
        map: &mut Map,
        interactions: &mut InteractionManager,
    ) -> LoadOutcome {
        if generation != self.generation {
            warn!(
                "Dropping answer of load {}, load {} is newer",
                generation, self.generation
            );
            return LoadOutcome::Stale { generation };
        }
        self.loading = false;

        let collection = match result {
            Ok(collection) => collection,
            Err(report) => {
                error!("{:?}", report);
                let message = report
                    .chain()
                    .map(|cause| cause.to_string())
                    .collect::<Vec<_>>()
                    .join(": ");
                return self.restore(map, region, LoadError::QueryFailed(message));
            }
        };

        let features = match features_from_collection(collection) {
            Ok(features) => features,
            Err(e) => {
                error!("Rejecting region data: {}", e);
                return self.restore(map, region, LoadError::MalformedResponse(e));
            }
        };

        self.previous = None;
        if features.is_empty() {
            warn!("Query for region {:?} matched no features", region);
            interactions.uninstall(map);
            return LoadOutcome::Empty { region };
        }

        let count = features.len();
        let layer = VectorLayer::new(FeatureSource::from_features(features))
            .with_style(self.style.clone());
        let source = layer.source();
        let extent = layer.extent();
        map.add_layer(REGION_LAYER, layer);
        if let Some(extent) = extent {
            map.fit_extent(&extent, &self.config.fit_padding);
        }
        interactions.install(map, source);

        info!("Loaded {} features for region {:?}", count, region);
        LoadOutcome::Loaded {
            region,
            features: count,
        }
    }

    fn restore(&mut self, map: &mut Map, region: Option<Smid>, error: LoadError) -> LoadOutcome {
        if let Some(layer) = self.previous.take() {
            map.add_boxed_layer(REGION_LAYER, layer);
        }
        LoadOutcome::Failed { region, error }
    }

    /// Whether the latest load is still waiting for its answer.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// The generation of the latest load.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Waits for all running loads to get their answer.
    #[cfg(test)]
    pub(crate) fn block_until_ready(&self) {
        for query in &self.pending {
            query.promise.block_until_ready();
        }
    }

    /// Drops all running loads. Their answers are never applied.
    pub fn cancel(&mut self) {
        self.pending.clear();
        self.previous = None;
        self.loading = false;
        self.generation += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ViewOptions;
    use crate::interactions::INTERACTION_KEYS;
    use crate::service::ServiceError;
    use serde_json::json;
    use std::sync::Mutex;

    /// Answers by the SMID in the filter: 1 is a large area, 15 a small one, 99 nothing, and
    /// everything else fails.
    #[derive(Default)]
    struct StubService {
        filters: Mutex<Vec<String>>,
    }

    fn rectangle(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> serde_json::Value {
        json!({
            "type": "Feature",
            "properties": {},
            "geometry": {"type": "Polygon", "coordinates": [[
                [min_lon, min_lat], [max_lon, min_lat], [max_lon, max_lat], [min_lon, max_lat], [min_lon, min_lat]
            ]]}
        })
    }

    impl FeatureService for StubService {
        fn get_features_by_sql(
            &self,
            params: &FeaturesBySqlParameters,
        ) -> Result<FeatureCollection, ServiceError> {
            let filter = params.query_parameter.attribute_filter.clone();
            self.filters.lock().unwrap().push(filter.clone());
            let features = match filter.as_str() {
                "SMID = 1" => vec![rectangle(75.0, 18.0, 135.0, 53.0)],
                "SMID = 15" => vec![rectangle(114.0, 36.0, 119.0, 42.0)],
                "SMID = 99" => vec![],
                _ => {
                    return Err(ServiceError::Service {
                        code: 500,
                        message: "boom".to_string(),
                    });
                }
            };
            Ok(serde_json::from_value(json!({
                "type": "FeatureCollection",
                "features": features
            }))
            .unwrap())
        }
    }

    struct Fixture {
        loader: RegionLoader,
        map: Map,
        interactions: InteractionManager,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                loader: RegionLoader::new(
                    Arc::new(StubService::default()),
                    &ViewerConfig::default(),
                    VectorStyle::default(),
                ),
                map: Map::new(ViewOptions::default()),
                interactions: InteractionManager::default(),
            }
        }

        fn load(&mut self, region: Option<Smid>) -> u64 {
            self.loader
                .load_region(&mut self.map, &mut self.interactions, region)
        }

        fn wait(&mut self) -> Vec<LoadOutcome> {
            self.loader.block_until_ready();
            self.loader.poll(&mut self.map, &mut self.interactions)
        }

        fn region_layers(&self) -> usize {
            self.map.layer_keys().filter(|k| *k == REGION_LAYER).count()
        }
    }

    #[test]
    fn load_adds_one_layer_and_inactive_interactions() {
        let mut f = Fixture::new();
        f.load(None);
        assert!(f.loader.is_loading());
        assert_eq!(
            f.wait(),
            vec![LoadOutcome::Loaded {
                region: None,
                features: 1
            }]
        );
        assert!(!f.loader.is_loading());
        assert_eq!(f.region_layers(), 1);
        assert!(f.interactions.is_installed());
        for key in INTERACTION_KEYS {
            assert!(!f.map.interaction_dyn_mut(key).unwrap().is_active());
        }

        f.load(Some(Smid(15)));
        f.wait();
        assert_eq!(f.region_layers(), 1);
        assert_eq!(f.map.interaction_keys().count(), 5);
    }

    #[test]
    fn smaller_region_fits_at_higher_zoom() {
        let mut f = Fixture::new();
        f.load(None);
        f.wait();
        let large_zoom = f.map.zoom;
        f.load(Some(Smid(15)));
        f.wait();
        assert!(f.map.zoom > large_zoom);
        assert!(f.map.center.lon > 110.0 && f.map.center.lon < 120.0);
    }

    #[test]
    fn switching_region_turns_edit_mode_off() {
        let mut f = Fixture::new();
        f.load(Some(Smid(15)));
        f.wait();
        f.interactions.toggle_edit(&mut f.map);
        assert!(f.interactions.is_editing());

        f.load(None);
        assert!(!f.interactions.is_editing());
        f.wait();
        for key in INTERACTION_KEYS {
            assert!(!f.map.interaction_dyn_mut(key).unwrap().is_active());
        }
    }

    #[test]
    fn failure_restores_previous_layer() {
        let mut f = Fixture::new();
        f.load(Some(Smid(15)));
        f.wait();

        f.load(Some(Smid(7)));
        assert_eq!(f.region_layers(), 0);
        match f.wait().as_slice() {
            [
                LoadOutcome::Failed {
                    region: Some(Smid(7)),
                    error: LoadError::QueryFailed(message),
                },
            ] => assert!(message.contains("boom")),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(f.region_layers(), 1);
        assert!(!f.loader.is_loading());
    }

    #[test]
    fn empty_result_leaves_map_empty() {
        let mut f = Fixture::new();
        f.load(Some(Smid(15)));
        f.wait();

        f.load(Some(Smid(99)));
        assert_eq!(
            f.wait(),
            vec![LoadOutcome::Empty {
                region: Some(Smid(99))
            }]
        );
        assert_eq!(f.region_layers(), 0);
        assert!(!f.interactions.is_installed());
        assert_eq!(f.map.interaction_keys().count(), 0);
    }

    #[test]
    fn stale_answers_are_dropped() {
        let mut f = Fixture::new();
        let first = f.load(None);
        let second = f.load(Some(Smid(15)));
        assert!(second > first);

        let stale = FeatureCollection {
            bbox: None,
            features: vec![],
            foreign_members: None,
        };
        let outcome = f.loader.finish(
            first,
            None,
            Ok(stale),
            &mut f.map,
            &mut f.interactions,
        );
        assert_eq!(outcome, LoadOutcome::Stale { generation: first });
        assert!(f.loader.is_loading());

        let outcomes = f.wait();
        assert!(outcomes.contains(&LoadOutcome::Stale { generation: first }));
        assert!(outcomes.contains(&LoadOutcome::Loaded {
            region: Some(Smid(15)),
            features: 1
        }));
        assert_eq!(f.region_layers(), 1);
    }

    #[test]
    fn malformed_geometry_is_a_failure() {
        let mut f = Fixture::new();
        let generation = f.load(None);
        let collection: FeatureCollection = serde_json::from_value(json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {},
                "geometry": {"type": "Point", "coordinates": [1.0, 2.0]}
            }]
        }))
        .unwrap();
        let outcome = f.loader.finish(
            generation,
            None,
            Ok(collection),
            &mut f.map,
            &mut f.interactions,
        );
        assert_eq!(
            outcome,
            LoadOutcome::Failed {
                region: None,
                error: LoadError::MalformedResponse(GeometryError::Unsupported(
                    "Point".to_string()
                )),
            }
        );
        f.loader.cancel();
        assert!(!f.loader.is_loading());
        assert!(f.wait().is_empty());
    }
}
