use super::references::{fetch_related, RelatedPayload};
use super::{default_max_results, normalize_sources, validate_max_results};
use crate::client::providers::{IdOperation, SourceFailure};
use crate::di::ServiceContext;
use crate::identity::{parse_identifier, Identifier, IdentifierKind};
use crate::merge::{CanonicalRecord, Strategy};
use crate::{Error, Result};
use futures::future::join_all;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const TOP_JOURNALS: usize = 5;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    /// Works the seed cites
    References,
    /// Works that cite the seed
    Citing,
    /// Works a source considers related to the seed
    Similar,
}

impl RelationType {
    pub const ALL: [Self; 3] = [Self::References, Self::Citing, Self::Similar];

    const fn operation(self) -> IdOperation {
        match self {
            Self::References => IdOperation::References,
            Self::Citing => IdOperation::Citing,
            Self::Similar => IdOperation::Similar,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::References => "references",
            Self::Citing => "citing",
            Self::Similar => "similar",
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    /// Relation lists and summary statistics
    #[default]
    Basic,
    /// Additionally build the citation network around the seed
    Network,
}

fn all_relation_types() -> Vec<RelationType> {
    RelationType::ALL.to_vec()
}

const fn default_max_depth() -> u32 {
    1
}

/// Deepest network expansion accepted
pub const MAX_DEPTH: u32 = 3;
/// Most seeds accepted in one request
pub const MAX_SEEDS: usize = 50;

/// One seed identifier or several
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum SeedIdentifiers {
    One(String),
    Many(Vec<String>),
}

impl SeedIdentifiers {
    /// Trimmed, non-empty identifiers in input order
    fn to_list(&self) -> Vec<&str> {
        let raw: Vec<&str> = match self {
            Self::One(id) => vec![id.as_str()],
            Self::Many(ids) => ids.iter().map(String::as_str).collect(),
        };
        raw.into_iter().map(str::trim).filter(|id| !id.is_empty()).collect()
    }
}

impl fmt::Display for SeedIdentifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_list().join(", "))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RelationsInput {
    /// Seed identifier, or a list of them
    #[serde(alias = "identifier")]
    pub identifiers: SeedIdentifiers,
    #[serde(default)]
    pub id_type: Option<IdentifierKind>,
    /// Relations to collect (default: all)
    #[serde(default = "all_relation_types")]
    pub relation_types: Vec<RelationType>,
    #[serde(default)]
    pub analysis_type: AnalysisType,
    /// Cap on each merged relation list (default: 10)
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    /// Hops the network grows out from the seeds (default: 1). Only used by
    /// network analysis.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default)]
    pub sources: Option<Vec<String>>,
}

impl RelationsInput {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self::with_identifiers(SeedIdentifiers::One(identifier.into()))
    }

    pub fn for_seeds<I, S>(identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_identifiers(SeedIdentifiers::Many(
            identifiers.into_iter().map(Into::into).collect(),
        ))
    }

    fn with_identifiers(identifiers: SeedIdentifiers) -> Self {
        Self {
            identifiers,
            id_type: None,
            relation_types: all_relation_types(),
            analysis_type: AnalysisType::default(),
            max_results: default_max_results(),
            max_depth: default_max_depth(),
            sources: None,
        }
    }
}

/// One relation's merged records and the sources behind them
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RelationSet {
    pub relation: RelationType,
    pub records: Vec<CanonicalRecord>,
    pub sources_used: Vec<String>,
    pub sources_failed: Vec<SourceFailure>,
    pub cache_hit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JournalCount {
    pub journal: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RelationStatistics {
    /// Records across every relation, counting repeats
    pub total_records: usize,
    /// Distinct works after cross-relation dedup
    pub unique_records: usize,
    pub per_relation: BTreeMap<RelationType, usize>,
    pub with_doi: usize,
    pub earliest_year: Option<i32>,
    pub latest_year: Option<i32>,
    pub top_journals: Vec<JournalCount>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Seed,
    Reference,
    Citing,
    Similar,
}

impl From<RelationType> for NodeKind {
    fn from(relation: RelationType) -> Self {
        match relation {
            RelationType::References => Self::Reference,
            RelationType::Citing => Self::Citing,
            RelationType::Similar => Self::Similar,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct NetworkNode {
    pub id: String,
    pub label: String,
    /// Relation through which the node was first reached
    pub kind: NodeKind,
    pub publication_date: Option<String>,
    /// Hops from the nearest seed
    pub depth: u32,
}

/// Directed edge; `source` cites `target` for references and citing
/// relations, and is related to it for similar ones
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct NetworkEdge {
    pub source: String,
    pub target: String,
    pub relation: RelationType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct NetworkCluster {
    pub relation: RelationType,
    pub node_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NetworkMetrics {
    pub node_count: usize,
    pub edge_count: usize,
    /// 2E / N
    pub average_degree: f64,
    /// 2E / (N (N - 1)); zero below two nodes
    pub density: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NetworkAnalysis {
    pub nodes: Vec<NetworkNode>,
    pub edges: Vec<NetworkEdge>,
    pub clusters: Vec<NetworkCluster>,
    pub metrics: NetworkMetrics,
    /// Deepest level actually expanded
    pub depth_reached: u32,
}

/// Relations around one seed
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SeedRelations {
    pub identifier: Identifier,
    pub relations: Vec<RelationSet>,
    pub statistics: RelationStatistics,
    /// True only when every relation list came from the cache
    pub cache_hit: bool,
}

/// A seed no source returned any relation for
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SeedFailure {
    pub identifier: Identifier,
    pub error: String,
    pub error_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RelationsResponse {
    /// Seeds with at least one answered relation, in input order
    pub seeds: Vec<SeedRelations>,
    pub failed_seeds: Vec<SeedFailure>,
    /// Across every seed
    pub statistics: RelationStatistics,
    pub network: Option<NetworkAnalysis>,
    pub cache_hit: bool,
}

/// Parameters shared by every relation lookup of one request
#[derive(Debug, Clone, Copy)]
struct RelationQuery<'a> {
    relation_types: &'a [RelationType],
    sources: Option<&'a [String]>,
    max_results: u32,
}

/// References, citing and similar works around one or more seeds
#[derive(Debug, Clone)]
pub struct RelationsTool {
    ctx: Arc<ServiceContext>,
}

impl RelationsTool {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self, input), fields(seeds = %input.identifiers, analysis = ?input.analysis_type))]
    pub async fn execute(&self, input: RelationsInput) -> Result<RelationsResponse> {
        validate_max_results(&self.ctx, input.max_results)?;
        if !(1..=MAX_DEPTH).contains(&input.max_depth) {
            return Err(Error::invalid_input(
                "max_depth",
                format!("must be between 1 and {MAX_DEPTH}"),
            ));
        }

        let raw_seeds = input.identifiers.to_list();
        if raw_seeds.is_empty() {
            return Err(Error::invalid_input(
                "identifiers",
                "at least one identifier is required",
            ));
        }
        if raw_seeds.len() > MAX_SEEDS {
            return Err(Error::invalid_input(
                "identifiers",
                format!("at most {MAX_SEEDS} identifiers per request"),
            ));
        }
        let mut seeds: Vec<Identifier> = Vec::with_capacity(raw_seeds.len());
        for raw in raw_seeds {
            let seed = parse_identifier(raw, input.id_type)?;
            if !seeds.contains(&seed) {
                seeds.push(seed);
            }
        }

        let sources = input.sources.as_deref().map(normalize_sources);
        let mut relation_types = input.relation_types.clone();
        relation_types.sort();
        relation_types.dedup();
        if relation_types.is_empty() {
            return Err(Error::invalid_input(
                "relation_types",
                "at least one relation type is required",
            ));
        }

        let query = RelationQuery {
            relation_types: &relation_types,
            sources: sources.as_deref(),
            max_results: input.max_results,
        };
        let outcomes = join_all(
            seeds
                .iter()
                .map(|seed| async move { (seed, self.collect(seed, query).await) }),
        )
        .await;

        let mut collected = Vec::new();
        let mut failed_seeds = Vec::new();
        let mut all_failures = Vec::new();
        for (seed, outcome) in outcomes {
            match outcome {
                Ok(found) => collected.push(found),
                Err(error @ Error::Aggregation { .. }) => {
                    warn!("No relations for seed {}: {}", seed, error);
                    if let Error::Aggregation { failures, .. } = &error {
                        all_failures.extend(failures.iter().cloned());
                    }
                    failed_seeds.push(SeedFailure {
                        identifier: seed.clone(),
                        error: error.to_string(),
                        error_type: error.error_type().to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        if collected.is_empty() {
            return Err(Error::Aggregation {
                operation: "relations".to_string(),
                failures: all_failures,
            });
        }

        let all_sets: Vec<RelationSet> = collected
            .iter()
            .flat_map(|seed| seed.relations.iter().cloned())
            .collect();
        let statistics = self.statistics(&all_sets);
        let network = match input.analysis_type {
            AnalysisType::Network => Some(self.network(&collected, query, input.max_depth).await),
            AnalysisType::Basic => None,
        };
        let cache_hit = collected.iter().all(|seed| seed.cache_hit);

        info!(
            "Relations for {} seed(s): {} records, {} unique, {} seed(s) failed (cache_hit={})",
            collected.len(),
            statistics.total_records,
            statistics.unique_records,
            failed_seeds.len(),
            cache_hit
        );

        Ok(RelationsResponse {
            seeds: collected,
            failed_seeds,
            statistics,
            network,
            cache_hit,
        })
    }

    /// Every requested relation of one identifier. Fails when no relation
    /// had a source answer.
    async fn collect(&self, id: &Identifier, query: RelationQuery<'_>) -> Result<SeedRelations> {
        let ctx = &self.ctx;
        let outcomes = join_all(query.relation_types.iter().map(|&relation| async move {
            let outcome = fetch_related(
                ctx,
                id,
                relation.operation(),
                query.sources,
                query.max_results,
            )
            .await;
            (relation, outcome)
        }))
        .await;

        let mut relations = Vec::new();
        let mut all_failures = Vec::new();
        for (relation, outcome) in outcomes {
            match outcome {
                Ok(lookup) => {
                    let RelatedPayload { records, report } = lookup.value;
                    relations.push(RelationSet {
                        relation,
                        records,
                        sources_used: report.sources_used,
                        sources_failed: report.sources_failed,
                        cache_hit: lookup.cache_hit,
                    });
                }
                Err(Error::Aggregation { failures, .. }) => {
                    debug!("No source produced {} for {}", relation, id);
                    all_failures.extend(failures.iter().cloned());
                    relations.push(RelationSet {
                        relation,
                        records: Vec::new(),
                        sources_used: Vec::new(),
                        sources_failed: failures,
                        cache_hit: false,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        if relations.iter().all(|set| set.sources_used.is_empty()) {
            return Err(Error::Aggregation {
                operation: format!("relations for {id}"),
                failures: all_failures,
            });
        }

        Ok(SeedRelations {
            identifier: id.clone(),
            statistics: self.statistics(&relations),
            cache_hit: relations.iter().all(|set| set.cache_hit),
            relations,
        })
    }

    /// Network around the seeds, grown level by level up to `max_depth`.
    /// Each level expands at most `max_results` identifier-bearing nodes;
    /// nodes whose relations cannot be fetched stay leaves.
    async fn network(
        &self,
        seeds: &[SeedRelations],
        query: RelationQuery<'_>,
        max_depth: u32,
    ) -> NetworkAnalysis {
        let mut builder = NetworkBuilder::default();
        for seed in seeds {
            builder.add_seed(&seed.identifier);
        }
        for seed in seeds {
            builder.add_relations(&seed.identifier.to_string(), &seed.relations, 1);
        }

        for depth in 2..=max_depth {
            let frontier = builder.frontier(depth - 1, query.max_results as usize);
            if frontier.is_empty() {
                break;
            }
            debug!("Expanding {} node(s) to depth {}", frontier.len(), depth);

            let outcomes = join_all(
                frontier
                    .iter()
                    .map(|id| async move { (id, self.collect(id, query).await) }),
            )
            .await;
            for (id, outcome) in outcomes {
                match outcome {
                    Ok(found) => builder.add_relations(&id.to_string(), &found.relations, depth),
                    Err(e) => debug!("Not expanding {}: {}", id, e),
                }
            }
        }

        builder.finish()
    }

    fn statistics(&self, relations: &[RelationSet]) -> RelationStatistics {
        let all: Vec<CanonicalRecord> = relations
            .iter()
            .flat_map(|set| set.records.iter().cloned())
            .collect();
        let total_records = all.len();
        let unique = self.ctx.merge_engine().merge_canonical(all, Strategy::Union);

        let years: Vec<i32> = unique
            .iter()
            .filter_map(|r| r.publication_date.as_deref())
            .filter_map(|d| d.get(..4)?.parse().ok())
            .collect();

        let mut journals: HashMap<&str, usize> = HashMap::new();
        for journal in unique.iter().filter_map(|r| r.journal.as_deref()) {
            *journals.entry(journal).or_default() += 1;
        }
        let mut top_journals: Vec<JournalCount> = journals
            .into_iter()
            .map(|(journal, count)| JournalCount {
                journal: journal.to_string(),
                count,
            })
            .collect();
        top_journals.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.journal.cmp(&b.journal)));
        top_journals.truncate(TOP_JOURNALS);

        let mut per_relation: BTreeMap<RelationType, usize> = BTreeMap::new();
        for set in relations {
            *per_relation.entry(set.relation).or_default() += set.records.len();
        }

        RelationStatistics {
            total_records,
            unique_records: unique.len(),
            per_relation,
            with_doi: unique.iter().filter(|r| r.doi.is_some()).count(),
            earliest_year: years.iter().min().copied(),
            latest_year: years.iter().max().copied(),
            top_journals,
        }
    }
}

/// Strongest identifier a record carries
fn record_identifier(record: &CanonicalRecord) -> Option<Identifier> {
    let candidates = [
        (IdentifierKind::Doi, &record.doi),
        (IdentifierKind::Pmid, &record.pmid),
        (IdentifierKind::Pmcid, &record.pmcid),
        (IdentifierKind::ArxivId, &record.arxiv_id),
    ];
    candidates
        .into_iter()
        .find_map(|(kind, value)| value.as_ref().map(|v| Identifier::new(kind, v.clone())))
}

/// Stable node id for a record: its strongest identifier, else its title key
fn node_id(record: &CanonicalRecord) -> Option<String> {
    record_identifier(record)
        .map(|id| id.to_string())
        .or_else(|| record.title_key().map(|key| format!("title:{key}")))
}

/// Incremental citation network: one node per distinct work, one edge per
/// (pair, relation), one cluster per relation
#[derive(Debug, Default)]
struct NetworkBuilder {
    nodes: Vec<NetworkNode>,
    seen: BTreeSet<String>,
    identifiers: BTreeMap<String, Identifier>,
    edges: BTreeSet<NetworkEdge>,
    clusters: BTreeMap<RelationType, Vec<String>>,
    depth_reached: u32,
}

impl NetworkBuilder {
    fn add_seed(&mut self, seed: &Identifier) {
        let id = seed.to_string();
        if self.seen.insert(id.clone()) {
            self.identifiers.insert(id.clone(), seed.clone());
            self.nodes.push(NetworkNode {
                label: id.clone(),
                id,
                kind: NodeKind::Seed,
                publication_date: None,
                depth: 0,
            });
        }
    }

    /// Link `center` to every record in `relations`; new nodes are placed at
    /// `depth`
    fn add_relations(&mut self, center: &str, relations: &[RelationSet], depth: u32) {
        self.depth_reached = self.depth_reached.max(depth);
        for set in relations {
            for record in &set.records {
                let Some(id) = node_id(record) else { continue };
                if id == center {
                    continue;
                }

                if self.seen.insert(id.clone()) {
                    if let Some(identifier) = record_identifier(record) {
                        self.identifiers.insert(id.clone(), identifier);
                    }
                    self.nodes.push(NetworkNode {
                        id: id.clone(),
                        label: record.title.clone().unwrap_or_else(|| id.clone()),
                        kind: NodeKind::from(set.relation),
                        publication_date: record.publication_date.clone(),
                        depth,
                    });
                }

                let (source, target) = match set.relation {
                    RelationType::Citing => (id.clone(), center.to_string()),
                    RelationType::References | RelationType::Similar => {
                        (center.to_string(), id.clone())
                    }
                };
                self.edges.insert(NetworkEdge {
                    source,
                    target,
                    relation: set.relation,
                });

                let members = self.clusters.entry(set.relation).or_default();
                if !members.contains(&id) {
                    members.push(id);
                }
            }
        }
    }

    /// Identifier-bearing nodes first reached at `depth`, in discovery order
    fn frontier(&self, depth: u32, limit: usize) -> Vec<Identifier> {
        self.nodes
            .iter()
            .filter(|node| node.depth == depth)
            .filter_map(|node| self.identifiers.get(&node.id).cloned())
            .take(limit)
            .collect()
    }

    fn finish(self) -> NetworkAnalysis {
        let metrics = network_metrics(self.nodes.len(), self.edges.len());
        NetworkAnalysis {
            nodes: self.nodes,
            edges: self.edges.into_iter().collect(),
            clusters: self
                .clusters
                .into_iter()
                .map(|(relation, node_ids)| NetworkCluster { relation, node_ids })
                .collect(),
            metrics,
            depth_reached: self.depth_reached,
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn network_metrics(node_count: usize, edge_count: usize) -> NetworkMetrics {
    let n = node_count as f64;
    let e = edge_count as f64;
    NetworkMetrics {
        node_count,
        edge_count,
        average_degree: if node_count == 0 { 0.0 } else { 2.0 * e / n },
        density: if node_count < 2 {
            0.0
        } else {
            2.0 * e / (n * (n - 1.0))
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(doi: Option<&str>, title: &str) -> CanonicalRecord {
        CanonicalRecord {
            doi: doi.map(str::to_string),
            title: Some(title.to_string()),
            ..CanonicalRecord::default()
        }
    }

    fn set(relation: RelationType, records: Vec<CanonicalRecord>) -> RelationSet {
        RelationSet {
            relation,
            records,
            sources_used: vec!["openalex".to_string()],
            sources_failed: Vec::new(),
            cache_hit: false,
        }
    }

    #[test]
    fn test_network_shape() {
        let seed = Identifier::new(IdentifierKind::Doi, "10.1/seed");
        let relations = vec![
            set(
                RelationType::References,
                vec![record(Some("10.1/a"), "A"), record(Some("10.1/b"), "B")],
            ),
            set(
                RelationType::Citing,
                vec![record(Some("10.1/a"), "A"), record(None, "Untitled preprint")],
            ),
        ];

        let mut builder = NetworkBuilder::default();
        builder.add_seed(&seed);
        builder.add_relations(&seed.to_string(), &relations, 1);
        let network = builder.finish();

        // seed + a + b + preprint
        assert_eq!(network.nodes.len(), 4);
        assert_eq!(network.nodes[0].kind, NodeKind::Seed);
        assert!(network.nodes[1..].iter().all(|node| node.depth == 1));
        assert_eq!(network.depth_reached, 1);
        // a appears in both relations: two edges, one node
        assert_eq!(network.edges.len(), 4);
        assert!(network.edges.contains(&NetworkEdge {
            source: "doi:10.1/a".to_string(),
            target: "doi:10.1/seed".to_string(),
            relation: RelationType::Citing,
        }));
        assert_eq!(network.clusters.len(), 2);
        assert_eq!(network.clusters[1].node_ids, vec!["doi:10.1/a", "title:untitled preprint"]);

        assert_eq!(network.metrics.node_count, 4);
        assert_eq!(network.metrics.edge_count, 4);
        assert!((network.metrics.average_degree - 2.0).abs() < 1e-9);
        assert!((network.metrics.density - 8.0 / 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_metrics_degenerate_graphs() {
        let lone = network_metrics(1, 0);
        assert!(lone.average_degree.abs() < f64::EPSILON);
        assert!(lone.density.abs() < f64::EPSILON);
        let empty = network_metrics(0, 0);
        assert!(empty.average_degree.abs() < f64::EPSILON);
    }

    #[test]
    fn test_frontier_holds_only_identified_nodes_at_depth() {
        let seed = Identifier::new(IdentifierKind::Doi, "10.1/seed");
        let mut builder = NetworkBuilder::default();
        builder.add_seed(&seed);
        builder.add_relations(
            &seed.to_string(),
            &[set(
                RelationType::References,
                vec![
                    record(Some("10.1/a"), "A"),
                    record(None, "No identifier"),
                    record(Some("10.1/b"), "B"),
                ],
            )],
            1,
        );

        let frontier = builder.frontier(1, 10);
        assert_eq!(
            frontier,
            vec![
                Identifier::new(IdentifierKind::Doi, "10.1/a"),
                Identifier::new(IdentifierKind::Doi, "10.1/b"),
            ]
        );
        assert_eq!(builder.frontier(1, 1).len(), 1);
        assert!(builder.frontier(0, 10).iter().all(|id| *id == seed));
        assert!(builder.frontier(2, 10).is_empty());
    }

    #[test]
    fn test_input_defaults_to_all_relations() {
        let input: RelationsInput = serde_json::from_str(r#"{"identifier": "10.1/x"}"#).unwrap();
        assert_eq!(input.relation_types, RelationType::ALL.to_vec());
        assert_eq!(input.analysis_type, AnalysisType::Basic);
        assert_eq!(input.identifiers, SeedIdentifiers::One("10.1/x".to_string()));
        assert_eq!(input.max_depth, 1);
    }

    #[test]
    fn test_input_accepts_seed_lists() {
        let input: RelationsInput = serde_json::from_str(
            r#"{"identifiers": ["10.1/x", "  ", "PMID:1"], "analysis_type": "network", "max_depth": 2}"#,
        )
        .unwrap();
        assert_eq!(input.identifiers.to_list(), vec!["10.1/x", "PMID:1"]);
        assert_eq!(input.analysis_type, AnalysisType::Network);
        assert_eq!(input.max_depth, 2);
    }
}
