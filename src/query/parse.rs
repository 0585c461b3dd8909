//! Query request → validated query spec
//!
//! Every name in a request is resolved against the linkable specs the metrics' data sources
//! can reach. Where filters are rewritten from the names a user writes (`metric_time`,
//! `listing__country_latest`) to the column names of the specs they resolve to.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use super::error::QueryError;
use super::request::QueryRequest;
use super::time::{parse_time, TimeRangeConstraint};
use crate::resolver::LinkableSpecResolver;
use crate::semantic_model::{SemanticModel, TimeGranularity, DUNDER, METRIC_TIME};
use crate::specs::{
    InstanceSpecSet, LinkableSpec, MetricSpec, OrderByItem, OrderBySpec, StructuredLinkableSpecName,
    TimeDimensionSpec, WhereFilterSpec,
};
use crate::sql::{replace_identifiers, sql_identifiers, SqlBindParameters};

const MAX_SUGGESTIONS: usize = 3;

/// A query with every name resolved to a spec
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub metric_specs: Vec<MetricSpec>,
    /// Group-by specs, in request order
    pub linkable_specs: Vec<LinkableSpec>,
    pub where_filter: Option<WhereFilterSpec>,
    /// Resolved `constraint` of each metric the query computes, derived inputs included
    pub metric_filters: BTreeMap<String, WhereFilterSpec>,
    pub time_range: Option<TimeRangeConstraint>,
    pub order_by_specs: Vec<OrderBySpec>,
    pub limit: Option<u64>,
    pub output_table: Option<String>,
}

impl QuerySpec {
    pub fn linkable_spec_set(&self) -> InstanceSpecSet {
        InstanceSpecSet::from_linkable(&self.linkable_specs)
    }

    pub fn metric_time_specs(&self) -> impl Iterator<Item = &TimeDimensionSpec> {
        self.linkable_specs.iter().filter_map(|s| match s {
            LinkableSpec::TimeDimension(td) if td.is_metric_time() => Some(td),
            _ => None,
        })
    }

    pub fn finest_metric_time(&self) -> Option<&TimeDimensionSpec> {
        self.metric_time_specs().min_by_key(|s| s.time_granularity)
    }

    pub fn is_dimension_only(&self) -> bool {
        self.metric_specs.is_empty()
    }
}

/// Which part of the request a name came from; decides the error for unknown names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NameUse {
    GroupBy,
    Filter,
}

pub struct QueryParser<'a> {
    model: &'a SemanticModel,
    /// data source -> linkable specs it reaches
    reachable: HashMap<&'a str, HashSet<LinkableSpec>>,
    /// Every reachable spec, in discovery order
    all_specs: Vec<LinkableSpec>,
}

impl<'a> QueryParser<'a> {
    pub fn new(model: &'a SemanticModel, include_multi_hop: bool) -> Self {
        let resolver = LinkableSpecResolver::new(model, include_multi_hop);
        let mut reachable = HashMap::new();
        let mut all_specs = Vec::new();
        let mut seen = HashSet::new();
        for ds in model.data_sources() {
            let specs = resolver.reachable_specs(&ds.name);
            for spec in &specs {
                if seen.insert(spec.clone()) {
                    all_specs.push(spec.clone());
                }
            }
            reachable.insert(ds.name.as_str(), specs.into_iter().collect());
        }
        QueryParser {
            model,
            reachable,
            all_specs,
        }
    }

    pub fn parse(&self, request: &QueryRequest) -> Result<QuerySpec, QueryError> {
        if request.metrics.is_empty() && request.group_by.is_empty() {
            return Err(QueryError::EmptyQuery);
        }

        let metric_specs = self.parse_metrics(&request.metrics)?;

        let mut linkable_specs: Vec<LinkableSpec> = Vec::new();
        let mut requested: Vec<(&str, LinkableSpec)> = Vec::new();
        for name in &request.group_by {
            let spec = self.resolve_name(name, &metric_specs, NameUse::GroupBy)?;
            if linkable_specs.contains(&spec) {
                return Err(QueryError::DuplicateRequest { name: name.clone() });
            }
            requested.push((name.as_str(), spec.clone()));
            linkable_specs.push(spec);
        }

        let where_filter = match &request.where_constraint {
            Some(sql) if !sql.trim().is_empty() => {
                let params = SqlBindParameters::from_pairs(
                    request.where_bind_parameters.iter().map(|(k, v)| (k.clone(), v.clone())),
                );
                Some(self.parse_where_filter(sql, params, &metric_specs)?)
            }
            _ => None,
        };

        let mut metric_filters = BTreeMap::new();
        for metric in &metric_specs {
            self.collect_metric_filters(&metric.element_name, &mut metric_filters)?;
        }

        let order_by_specs = request
            .order_by
            .iter()
            .map(|raw| parse_order_by(raw, &metric_specs, &requested))
            .collect::<Result<Vec<_>, _>>()?;

        let limit = request
            .limit
            .map(|limit| u64::try_from(limit).map_err(|_| QueryError::NegativeLimit { limit }))
            .transpose()?;

        let spec = QuerySpec {
            metric_specs,
            linkable_specs,
            where_filter,
            metric_filters,
            time_range: None,
            order_by_specs,
            limit,
            output_table: request.output_table.clone(),
        };
        let time_range = parse_time_range(request, spec.finest_metric_time())?;

        debug!(
            metrics = spec.metric_specs.len(),
            group_by = spec.linkable_specs.len(),
            has_where = spec.where_filter.is_some(),
            time_range = ?time_range.map(|r| r.to_string()),
            "Parsed query"
        );
        Ok(QuerySpec { time_range, ..spec })
    }

    fn parse_metrics(&self, names: &[String]) -> Result<Vec<MetricSpec>, QueryError> {
        let mut out: Vec<MetricSpec> = Vec::new();
        for name in names {
            if self.model.metric(name).is_none() {
                return Err(QueryError::UnknownMetric {
                    name: name.clone(),
                    suggestions: suggestions(name, self.model.metrics().iter().map(|m| m.name.clone())),
                });
            }
            let spec = MetricSpec::new(name.clone());
            if out.contains(&spec) {
                return Err(QueryError::DuplicateRequest { name: name.clone() });
            }
            out.push(spec);
        }
        Ok(out)
    }

    /// Measures a metric reads, following derived metrics down to their inputs
    fn measures_of(&self, metric: &str) -> Vec<String> {
        fn visit(model: &SemanticModel, metric: &str, out: &mut Vec<String>) {
            let Some(m) = model.metric(metric) else {
                return;
            };
            for measure in m.input_measures() {
                if !out.iter().any(|x| x == measure) {
                    out.push(measure.to_string());
                }
            }
            for input in m.input_metrics() {
                visit(model, &input.name, out);
            }
        }
        let mut out = Vec::new();
        visit(self.model, metric, &mut out);
        out
    }

    /// Finest declared granularity of the time dimension a measure is aggregated over
    fn agg_time_granularity(&self, measure: &str) -> Option<TimeGranularity> {
        self.model
            .sources_for_measure(measure)
            .filter_map(|ds| {
                let m = ds.get_measure(measure)?;
                ds.agg_time_dimension(m)?.time_granularity()
            })
            .min()
    }

    fn resolve_name(&self, name: &str, metrics: &[MetricSpec], usage: NameUse) -> Result<LinkableSpec, QueryError> {
        let unknown = || match usage {
            NameUse::GroupBy => QueryError::UnknownGroupBy {
                name: name.to_string(),
                suggestions: suggestions(
                    name,
                    self.all_specs
                        .iter()
                        .map(LinkableSpec::qualified_name)
                        .chain(std::iter::once(METRIC_TIME.to_string())),
                ),
            },
            NameUse::Filter => QueryError::UnknownFilterName { name: name.to_string() },
        };

        let parsed = StructuredLinkableSpecName::parse(name).ok_or_else(unknown)?;
        if parsed.element_name == METRIC_TIME && parsed.identifier_link_names.is_empty() {
            return self.resolve_metric_time(name, parsed.time_granularity, metrics);
        }

        let spec = self.match_spec(name, &parsed)?.ok_or_else(unknown)?;
        for metric in metrics {
            self.check_reachable(&spec, metric)?;
        }
        Ok(spec)
    }

    /// The spec `parsed` names. Time dimensions without a granularity resolve to their
    /// finest one.
    fn match_spec(
        &self,
        name: &str,
        parsed: &StructuredLinkableSpecName,
    ) -> Result<Option<LinkableSpec>, QueryError> {
        let candidates: Vec<&LinkableSpec> = self
            .all_specs
            .iter()
            .filter(|s| {
                s.element_name() == parsed.element_name
                    && s.identifier_links() == parsed.identifier_link_names.as_slice()
                    && match (s, parsed.time_granularity) {
                        (LinkableSpec::TimeDimension(td), Some(g)) => td.time_granularity == g,
                        (_, Some(_)) => false,
                        (_, None) => true,
                    }
            })
            .collect();

        let kinds: HashSet<std::mem::Discriminant<LinkableSpec>> =
            candidates.iter().map(|s| std::mem::discriminant(*s)).collect();
        if kinds.len() > 1 {
            return Err(QueryError::AmbiguousName {
                name: name.to_string(),
                reason: "it names both a dimension and an identifier".to_string(),
            });
        }

        let finest_time = candidates
            .iter()
            .filter_map(|s| match s {
                LinkableSpec::TimeDimension(td) => Some(td),
                _ => None,
            })
            .min_by_key(|td| td.time_granularity);
        Ok(match finest_time {
            Some(td) => Some(LinkableSpec::TimeDimension(td.clone())),
            None => candidates.first().map(|s| (*s).clone()),
        })
    }

    /// `metric_time` defaults to the finest granularity every queried measure supports
    fn resolve_metric_time(
        &self,
        name: &str,
        requested: Option<TimeGranularity>,
        metrics: &[MetricSpec],
    ) -> Result<LinkableSpec, QueryError> {
        if metrics.is_empty() {
            return Err(QueryError::MetricTimeWithoutMetrics { name: name.to_string() });
        }

        let mut declared = Vec::new();
        for metric in metrics {
            for measure in self.measures_of(&metric.element_name) {
                let granularity = self.agg_time_granularity(&measure).ok_or_else(|| {
                    QueryError::MissingPrimaryTimeDimension {
                        metric: metric.element_name.clone(),
                    }
                })?;
                declared.push((metric, granularity));
            }
        }

        let coarsest = declared.iter().map(|(_, g)| *g).max().unwrap_or(TimeGranularity::Day);
        let granularity = requested.unwrap_or(coarsest);
        let spec = TimeDimensionSpec::metric_time(granularity);
        if let Some((metric, finest_available)) = declared.iter().find(|(_, g)| granularity < *g) {
            return Err(QueryError::GranularityTooFine {
                spec: spec.qualified_name(),
                metric: metric.element_name.clone(),
                granularity: finest_available.to_string(),
            });
        }
        Ok(spec.into())
    }

    /// Every measure of `metric` must have a data source that reaches `spec`
    fn check_reachable(&self, spec: &LinkableSpec, metric: &MetricSpec) -> Result<(), QueryError> {
        for measure in self.measures_of(&metric.element_name) {
            let reachable = self.model.sources_for_measure(&measure).any(|ds| {
                self.reachable
                    .get(ds.name.as_str())
                    .is_some_and(|specs| specs.contains(spec))
            });
            if !reachable {
                return Err(QueryError::UnresolvableJoin {
                    spec: spec.qualified_name(),
                    metric: metric.element_name.clone(),
                });
            }
        }
        Ok(())
    }

    fn parse_where_filter(
        &self,
        sql: &str,
        bind_parameters: SqlBindParameters,
        metrics: &[MetricSpec],
    ) -> Result<WhereFilterSpec, QueryError> {
        let mut resolved: Vec<(String, LinkableSpec)> = Vec::new();
        for word in sql_identifiers(sql) {
            let spec = self.resolve_name(&word, metrics, NameUse::Filter)?;
            resolved.push((word, spec));
        }
        let where_sql = replace_identifiers(sql, |word| {
            resolved
                .iter()
                .find(|(name, _)| name == word)
                .map(|(_, spec)| spec.qualified_name())
        });

        let mut linkable_specs = Vec::new();
        for (_, spec) in resolved {
            if !linkable_specs.contains(&spec) {
                linkable_specs.push(spec);
            }
        }
        Ok(WhereFilterSpec {
            where_sql,
            bind_parameters,
            linkable_specs,
        })
    }

    fn collect_metric_filters(
        &self,
        metric_name: &str,
        out: &mut BTreeMap<String, WhereFilterSpec>,
    ) -> Result<(), QueryError> {
        let Some(metric) = self.model.metric(metric_name) else {
            return Ok(());
        };
        if out.contains_key(metric_name) {
            return Ok(());
        }
        if let Some(constraint) = &metric.constraint {
            let spec = MetricSpec::new(metric_name);
            let filter = self.parse_where_filter(constraint, SqlBindParameters::new(), std::slice::from_ref(&spec))?;
            out.insert(metric_name.to_string(), filter);
        }
        for input in metric.input_metrics() {
            self.collect_metric_filters(&input.name, out)?;
        }
        Ok(())
    }
}

fn parse_order_by(
    raw: &str,
    metrics: &[MetricSpec],
    requested: &[(&str, LinkableSpec)],
) -> Result<OrderBySpec, QueryError> {
    let (descending, name) = match raw.strip_prefix('-') {
        Some(name) => (true, name.trim()),
        None => (false, raw.trim()),
    };
    let item = if let Some(metric) = metrics.iter().find(|m| m.element_name == name) {
        OrderByItem::Metric(metric.clone())
    } else if let Some((_, spec)) = requested
        .iter()
        .find(|(requested_name, spec)| *requested_name == name || spec.qualified_name() == name)
    {
        OrderByItem::Linkable(spec.clone())
    } else {
        return Err(QueryError::InvalidOrderBy { name: name.to_string() });
    };
    Ok(OrderBySpec { item, descending })
}

/// Open ends default to all time; with `metric_time` requested, both ends widen to whole
/// periods of its finest granularity
fn parse_time_range(
    request: &QueryRequest,
    metric_time: Option<&TimeDimensionSpec>,
) -> Result<Option<TimeRangeConstraint>, QueryError> {
    if request.time_constraint_start.is_none() && request.time_constraint_end.is_none() {
        return Ok(None);
    }
    let all_time = TimeRangeConstraint::all_time();
    let start = match &request.time_constraint_start {
        Some(value) => parse_time(value)?,
        None => all_time.start,
    };
    let end = match &request.time_constraint_end {
        Some(value) => parse_time(value)?,
        None => all_time.end,
    };
    let range = TimeRangeConstraint::new(start, end)?;
    Ok(Some(match metric_time {
        Some(spec) => range.adjust_to_granularity(spec.time_granularity)?,
        None => range,
    }))
}

/// Known names that contain, or share their element with, `name`
fn suggestions(name: &str, known: impl IntoIterator<Item = String>) -> Vec<String> {
    let needle = name.to_lowercase();
    let element = needle.rsplit(DUNDER).next().unwrap_or(&needle).to_string();
    let mut out: Vec<String> = known
        .into_iter()
        .filter(|candidate| {
            let candidate = candidate.to_lowercase();
            candidate.contains(&needle)
                || (!candidate.is_empty() && needle.contains(&candidate))
                || candidate.rsplit(DUNDER).next() == Some(element.as_str())
        })
        .collect();
    out.sort();
    out.dedup();
    out.truncate(MAX_SUGGESTIONS);
    out
}
