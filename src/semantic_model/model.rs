//! The semantic model registry

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::data_source::DataSource;
use super::error::ModelError;
use super::measure::Measure;
use super::metric::Metric;
use super::types::{AggregationType, MetricType};

/// Name of the virtual time dimension every measure is aggregated over
pub const METRIC_TIME: &str = "metric_time";

/// Separator between links, element name and granularity in qualified names
pub const DUNDER: &str = "__";

/// Raw declarations as read from YAML
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SemanticManifest {
    #[serde(default)]
    pub data_sources: Vec<DataSource>,
    #[serde(default)]
    pub metrics: Vec<Metric>,
}

/// A validated, read-only semantic model with lookup indexes
#[derive(Debug, Clone)]
pub struct SemanticModel {
    data_sources: Vec<DataSource>,
    metrics: Vec<Metric>,
    source_index: HashMap<String, usize>,
    metric_index: HashMap<String, usize>,
    /// identifier name -> indexes of data sources declaring it, in declaration order
    identifier_index: BTreeMap<String, Vec<usize>>,
    /// measure name -> indexes of data sources declaring it, in declaration order
    measure_index: HashMap<String, Vec<usize>>,
}

impl SemanticModel {
    /// Normalize measures, check model invariants and build indexes
    pub fn try_new(manifest: SemanticManifest) -> Result<Self, ModelError> {
        let mut data_sources = manifest.data_sources;
        for ds in &mut data_sources {
            let measures = std::mem::take(&mut ds.measures);
            ds.measures = measures.into_iter().map(Measure::normalized).collect();
        }

        let mut source_index = HashMap::new();
        let mut identifier_index: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut measure_index: HashMap<String, Vec<usize>> = HashMap::new();
        let mut measure_aggs: HashMap<String, AggregationType> = HashMap::new();

        for (idx, ds) in data_sources.iter().enumerate() {
            if source_index.insert(ds.name.clone(), idx).is_some() {
                return Err(ModelError::DuplicateDataSource { name: ds.name.clone() });
            }
            validate_data_source(ds)?;

            for identifier in &ds.identifiers {
                identifier_index.entry(identifier.name.clone()).or_default().push(idx);
            }
            for measure in &ds.measures {
                match measure_aggs.get(&measure.name) {
                    Some(first) if *first != measure.agg => {
                        return Err(ModelError::ConflictingAggregation {
                            measure: measure.name.clone(),
                            first: *first,
                            second: measure.agg,
                        });
                    }
                    Some(_) => {}
                    None => {
                        measure_aggs.insert(measure.name.clone(), measure.agg);
                    }
                }
                measure_index.entry(measure.name.clone()).or_default().push(idx);
            }
        }

        let mut metric_index = HashMap::new();
        for (idx, metric) in manifest.metrics.iter().enumerate() {
            if metric_index.insert(metric.name.clone(), idx).is_some() {
                return Err(ModelError::DuplicateMetric { name: metric.name.clone() });
            }
        }

        let model = SemanticModel {
            data_sources,
            metrics: manifest.metrics,
            source_index,
            metric_index,
            identifier_index,
            measure_index,
        };
        for metric in &model.metrics {
            model.validate_metric(metric)?;
        }
        model.check_derived_cycles()?;

        debug!(
            data_sources = model.data_sources.len(),
            metrics = model.metrics.len(),
            "Built semantic model"
        );
        Ok(model)
    }

    pub fn data_sources(&self) -> &[DataSource] {
        &self.data_sources
    }

    pub fn data_source(&self, name: &str) -> Option<&DataSource> {
        self.source_index.get(name).map(|&i| &self.data_sources[i])
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    pub fn metric(&self, name: &str) -> Option<&Metric> {
        self.metric_index.get(name).map(|&i| &self.metrics[i])
    }

    /// Data sources declaring an identifier, in declaration order
    pub fn sources_for_identifier<'a>(&'a self, identifier: &str) -> impl Iterator<Item = &'a DataSource> + 'a {
        self.identifier_index
            .get(identifier)
            .into_iter()
            .flatten()
            .map(move |&i| &self.data_sources[i])
    }

    /// Data sources declaring a measure, in declaration order
    pub fn sources_for_measure<'a>(&'a self, measure: &str) -> impl Iterator<Item = &'a DataSource> + 'a {
        self.measure_index
            .get(measure)
            .into_iter()
            .flatten()
            .map(move |&i| &self.data_sources[i])
    }

    /// The first declaration of a measure
    pub fn measure(&self, name: &str) -> Option<&Measure> {
        self.sources_for_measure(name).next().and_then(|ds| ds.get_measure(name))
    }

    fn validate_metric(&self, metric: &Metric) -> Result<(), ModelError> {
        let invalid = |reason: &str| ModelError::InvalidMetric {
            metric: metric.name.clone(),
            reason: reason.to_string(),
        };
        let p = &metric.type_params;
        match metric.metric_type {
            MetricType::MeasureProxy | MetricType::Cumulative => {
                if p.measure.is_none() && p.measures.is_empty() {
                    return Err(invalid("a measure is required"));
                }
                if p.window.is_some() && p.grain_to_date.is_some() {
                    return Err(invalid("window and grain_to_date are mutually exclusive"));
                }
            }
            MetricType::Ratio => {
                if p.numerator.is_none() || p.denominator.is_none() {
                    return Err(invalid("ratio metrics need a numerator and a denominator"));
                }
            }
            MetricType::Expr => {
                if p.expr.is_none() {
                    return Err(invalid("expr metrics need an expr"));
                }
                if p.measure.is_none() && p.measures.is_empty() {
                    return Err(invalid("expr metrics need at least one measure"));
                }
            }
            MetricType::Derived => {
                if p.expr.is_none() || p.metrics.is_empty() {
                    return Err(invalid("derived metrics need an expr and input metrics"));
                }
                for input in &p.metrics {
                    if self.metric(&input.name).is_none() {
                        return Err(ModelError::UnknownMetric {
                            metric: metric.name.clone(),
                            input: input.name.clone(),
                        });
                    }
                }
            }
        }
        for measure in metric.input_measures() {
            if self.measure(measure).is_none() {
                return Err(ModelError::UnknownMeasure {
                    metric: metric.name.clone(),
                    measure: measure.to_string(),
                });
            }
        }
        Ok(())
    }

    fn check_derived_cycles(&self) -> Result<(), ModelError> {
        fn visit<'a>(
            model: &'a SemanticModel,
            name: &'a str,
            stack: &mut Vec<&'a str>,
            done: &mut HashSet<&'a str>,
        ) -> Result<(), ModelError> {
            if done.contains(name) {
                return Ok(());
            }
            if stack.contains(&name) {
                return Err(ModelError::InvalidMetric {
                    metric: name.to_string(),
                    reason: format!("cyclic metric reference through {}", stack.join(" -> ")),
                });
            }
            stack.push(name);
            if let Some(metric) = model.metric(name) {
                for input in metric.input_metrics() {
                    visit(model, &input.name, stack, done)?;
                }
            }
            stack.pop();
            done.insert(name);
            Ok(())
        }

        let mut done = HashSet::new();
        for metric in &self.metrics {
            visit(self, &metric.name, &mut Vec::new(), &mut done)?;
        }
        Ok(())
    }
}

impl TryFrom<SemanticManifest> for SemanticModel {
    type Error = ModelError;

    fn try_from(manifest: SemanticManifest) -> Result<Self, Self::Error> {
        SemanticModel::try_new(manifest)
    }
}

fn validate_data_source(ds: &DataSource) -> Result<(), ModelError> {
    if ds.from_source().is_none() {
        return Err(ModelError::MissingOrigin { data_source: ds.name.clone() });
    }

    let mut names = HashSet::new();
    let element_names = ds
        .identifiers
        .iter()
        .map(|i| &i.name)
        .chain(ds.dimensions.iter().map(|d| &d.name))
        .chain(ds.measures.iter().map(|m| &m.name));
    for name in element_names {
        if name == METRIC_TIME || name.contains(DUNDER) {
            return Err(ModelError::ReservedName {
                data_source: ds.name.clone(),
                name: name.clone(),
            });
        }
        if !names.insert(name.as_str()) {
            return Err(ModelError::DuplicateElement {
                data_source: ds.name.clone(),
                name: name.clone(),
            });
        }
    }

    for dim in ds.time_dimensions() {
        if dim.time_granularity().is_none() {
            return Err(ModelError::MissingTimeGranularity {
                data_source: ds.name.clone(),
                dimension: dim.name.clone(),
            });
        }
    }
    if ds.dimensions.iter().filter(|d| d.is_primary_time()).count() > 1 {
        return Err(ModelError::MultiplePrimaryTimeDimensions { data_source: ds.name.clone() });
    }

    let starts = ds.dimensions.iter().filter(|d| d.is_validity_start()).count();
    let ends = ds.dimensions.iter().filter(|d| d.is_validity_end()).count();
    if starts > 1 || ends > 1 || starts != ends {
        return Err(ModelError::InvalidValidityWindow {
            data_source: ds.name.clone(),
            reason: format!("expected one start and one end marker, found {} and {}", starts, ends),
        });
    }
    if ds.dimensions.iter().any(|d| d.is_validity_start() && d.is_validity_end()) {
        return Err(ModelError::InvalidValidityWindow {
            data_source: ds.name.clone(),
            reason: "a dimension cannot be both window start and window end".to_string(),
        });
    }

    for measure in &ds.measures {
        if ds.agg_time_dimension(measure).is_none() {
            return Err(match &measure.agg_time_dimension {
                Some(dimension) => ModelError::InvalidAggTimeDimension {
                    data_source: ds.name.clone(),
                    measure: measure.name.clone(),
                    dimension: dimension.clone(),
                },
                None => ModelError::MissingAggTimeDimension {
                    data_source: ds.name.clone(),
                    measure: measure.name.clone(),
                },
            });
        }
        if let Some(nad) = &measure.non_additive_dimension {
            let nad_error = |reason: String| ModelError::InvalidNonAdditiveDimension {
                data_source: ds.name.clone(),
                measure: measure.name.clone(),
                reason,
            };
            if !ds.get_dimension(&nad.name).map(|d| d.is_time()).unwrap_or(false) {
                return Err(nad_error(format!("'{}' is not a time dimension", nad.name)));
            }
            if !nad.window_choice.is_window_choice() {
                return Err(nad_error(format!("window_choice must be min or max, got {}", nad.window_choice)));
            }
            for grouping in &nad.window_groupings {
                if ds.get_identifier(grouping).is_none() {
                    return Err(nad_error(format!("window grouping '{}' is not an identifier", grouping)));
                }
            }
        }
        if measure.agg == AggregationType::Percentile && measure.percentile().is_none() {
            return Err(ModelError::InvalidMeasure {
                data_source: ds.name.clone(),
                measure: measure.name.clone(),
                reason: "percentile measures need agg_params.percentile".to_string(),
            });
        }
    }
    Ok(())
}
