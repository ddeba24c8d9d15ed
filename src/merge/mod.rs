//! # Merge/Dedup
//!
//! Folds records that describe the same work into one [`CanonicalRecord`].
//!
//! Two records match when their normalized DOIs are equal. When either side
//! has no DOI they match on normalized title plus first-author surname. Field
//! values are chosen by walking contributors in source-priority order and
//! taking the first non-empty value; the author list is taken whole from the
//! first contributor that has one.

pub mod quality;

use crate::client::{non_empty, RawRecord};
use crate::identity::normalize_doi;
use crate::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// How cross-source matches affect which records are kept
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Keep every distinct record
    #[default]
    Union,
    /// Keep only records found in at least two distinct sources
    Intersection,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Union => f.write_str("union"),
            Self::Intersection => f.write_str("intersection"),
        }
    }
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "union" => Ok(Self::Union),
            "intersection" => Ok(Self::Intersection),
            other => Err(Error::invalid_input(
                "strategy",
                format!("unknown merge strategy '{other}'"),
            )),
        }
    }
}

/// One work as seen across every source that returned it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CanonicalRecord {
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    pub journal: Option<String>,
    pub publication_date: Option<String>,
    /// Normalized (lower-case, prefix-free)
    pub doi: Option<String>,
    pub pmid: Option<String>,
    pub pmcid: Option<String>,
    pub arxiv_id: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub url: Option<String>,
    pub citation_count: Option<u64>,
    /// Every source that contributed a matching record
    pub sources: BTreeSet<String>,
    /// Field name to the source its value came from
    pub provenance: BTreeMap<String, String>,
}

impl From<RawRecord> for CanonicalRecord {
    fn from(raw: RawRecord) -> Self {
        let source = raw.source.trim().to_string();
        let mut record = Self {
            title: non_empty(raw.title),
            authors: raw
                .authors
                .into_iter()
                .filter_map(|a| non_empty(Some(a)))
                .collect(),
            journal: non_empty(raw.journal),
            publication_date: non_empty(raw.publication_date),
            doi: raw.doi.as_deref().and_then(normalize_doi),
            pmid: non_empty(raw.pmid),
            pmcid: non_empty(raw.pmcid).map(|p| p.to_ascii_uppercase()),
            arxiv_id: non_empty(raw.arxiv_id),
            abstract_text: non_empty(raw.abstract_text),
            url: non_empty(raw.url),
            citation_count: raw.citation_count,
            sources: BTreeSet::from([source.clone()]),
            provenance: BTreeMap::new(),
        };

        for field in record.present_fields() {
            record.provenance.insert(field.to_string(), source.clone());
        }
        record
    }
}

impl CanonicalRecord {
    /// Case-folded title with punctuation dropped and whitespace collapsed
    #[must_use]
    pub fn title_key(&self) -> Option<String> {
        self.title.as_deref().map(normalize_title).filter(|t| !t.is_empty())
    }

    #[must_use]
    pub fn first_author_surname(&self) -> Option<String> {
        self.authors.first().and_then(|a| author_surname(a))
    }

    fn present_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.title.is_some() {
            fields.push("title");
        }
        if !self.authors.is_empty() {
            fields.push("authors");
        }
        if self.journal.is_some() {
            fields.push("journal");
        }
        if self.publication_date.is_some() {
            fields.push("publication_date");
        }
        if self.doi.is_some() {
            fields.push("doi");
        }
        if self.pmid.is_some() {
            fields.push("pmid");
        }
        if self.pmcid.is_some() {
            fields.push("pmcid");
        }
        if self.arxiv_id.is_some() {
            fields.push("arxiv_id");
        }
        if self.abstract_text.is_some() {
            fields.push("abstract");
        }
        if self.url.is_some() {
            fields.push("url");
        }
        if self.citation_count.is_some() {
            fields.push("citation_count");
        }
        fields
    }

    /// Title + surname key used when a DOI is missing
    fn match_key(&self) -> Option<(String, String)> {
        Some((self.title_key()?, self.first_author_surname()?))
    }
}

/// Source priority used to resolve conflicting field values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergePolicy {
    priority: Vec<String>,
}

impl MergePolicy {
    pub fn new<I, S>(priority: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            priority: priority.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn priority(&self) -> &[String] {
        &self.priority
    }

    /// Position in the priority list; unlisted sources rank after every
    /// listed one
    #[must_use]
    pub fn rank(&self, source: &str) -> usize {
        self.priority
            .iter()
            .position(|s| s == source)
            .unwrap_or(self.priority.len())
    }

    /// Order two source names by priority, ties broken by name
    #[must_use]
    pub fn compare_sources(&self, a: &str, b: &str) -> Ordering {
        self.rank(a).cmp(&self.rank(b)).then_with(|| a.cmp(b))
    }

    /// Sort source names in priority order
    pub fn sort_sources(&self, sources: &mut [String]) {
        sources.sort_by(|a, b| self.compare_sources(a, b));
    }

    /// Best-ranked contributor of a record
    fn lead_source<'a>(&self, record: &'a CanonicalRecord) -> Option<&'a str> {
        record
            .sources
            .iter()
            .map(String::as_str)
            .min_by(|a, b| self.compare_sources(a, b))
    }

    fn compare_records(&self, a: &CanonicalRecord, b: &CanonicalRecord) -> Ordering {
        let lead_a = self.lead_source(a).unwrap_or_default();
        let lead_b = self.lead_source(b).unwrap_or_default();
        self.compare_sources(lead_a, lead_b)
            .then_with(|| content_key(a).cmp(&content_key(b)))
    }
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self::new(["europe_pmc", "pubmed", "crossref", "openalex", "arxiv"])
    }
}

/// Stateless merge engine parameterized by a [`MergePolicy`]
#[derive(Debug, Clone, Default)]
pub struct MergeEngine {
    policy: MergePolicy,
}

impl MergeEngine {
    #[must_use]
    pub const fn new(policy: MergePolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub const fn policy(&self) -> &MergePolicy {
        &self.policy
    }

    /// Deduplicate provider records into canonical records
    pub fn merge<I>(&self, candidates: I, strategy: Strategy) -> Vec<CanonicalRecord>
    where
        I: IntoIterator<Item = RawRecord>,
    {
        self.merge_canonical(
            candidates.into_iter().map(CanonicalRecord::from).collect(),
            strategy,
        )
    }

    /// Deduplicate already-canonical records. Merging a merge result again
    /// returns it unchanged.
    #[must_use]
    pub fn merge_canonical(
        &self,
        candidates: Vec<CanonicalRecord>,
        strategy: Strategy,
    ) -> Vec<CanonicalRecord> {
        let input_count = candidates.len();
        let mut merged: Vec<CanonicalRecord> = self
            .cluster_and_fold(candidates)
            .into_iter()
            .filter(|record| match strategy {
                Strategy::Union => true,
                Strategy::Intersection => record.sources.len() >= 2,
            })
            .collect();

        merged.sort_by(compare_output);
        debug!(
            "Merged {} candidates into {} records ({})",
            input_count,
            merged.len(),
            strategy
        );
        merged
    }

    /// Fold every candidate into one record regardless of match keys
    #[must_use]
    pub fn consolidate<I>(&self, candidates: I) -> Option<CanonicalRecord>
    where
        I: IntoIterator<Item = RawRecord>,
    {
        let members: Vec<CanonicalRecord> =
            candidates.into_iter().map(CanonicalRecord::from).collect();
        if members.is_empty() {
            None
        } else {
            Some(self.fold(members))
        }
    }

    fn fold(&self, mut members: Vec<CanonicalRecord>) -> CanonicalRecord {
        members.sort_by(|a, b| self.policy.compare_records(a, b));

        let policy = &self.policy;
        let mut merged = CanonicalRecord::default();
        for member in &members {
            merged.sources.extend(member.sources.iter().cloned());
        }

        macro_rules! take_first {
            ($field:ident, $name:literal) => {
                if let Some(member) = members.iter().find(|m| m.$field.is_some()) {
                    merged.$field = member.$field.clone();
                    record_provenance(&mut merged, member, $name, policy);
                }
            };
        }

        take_first!(title, "title");
        take_first!(journal, "journal");
        take_first!(publication_date, "publication_date");
        take_first!(doi, "doi");
        take_first!(pmid, "pmid");
        take_first!(pmcid, "pmcid");
        take_first!(arxiv_id, "arxiv_id");
        take_first!(abstract_text, "abstract");
        take_first!(url, "url");
        take_first!(citation_count, "citation_count");

        if let Some(member) = members.iter().find(|m| !m.authors.is_empty()) {
            merged.authors = member.authors.clone();
            record_provenance(&mut merged, member, "authors", policy);
        }

        merged
    }
}

fn record_provenance(
    merged: &mut CanonicalRecord,
    member: &CanonicalRecord,
    field: &str,
    policy: &MergePolicy,
) {
    let source = member
        .provenance
        .get(field)
        .cloned()
        .or_else(|| policy.lead_source(member).map(str::to_string));
    if let Some(source) = source {
        merged.provenance.insert(field.to_string(), source);
    }
}

type MatchKey = (String, String);

/// Candidates split by how they can match
struct Partition {
    by_doi: BTreeMap<String, Vec<CanonicalRecord>>,
    by_key: BTreeMap<MatchKey, Vec<CanonicalRecord>>,
    singletons: Vec<CanonicalRecord>,
}

/// Records sharing a DOI form one group. A DOI-less record joins the DOI
/// group (lowest DOI first) containing a member with the same title and
/// surname; otherwise DOI-less records group by title and surname. Records
/// with neither a DOI nor a complete title/surname key stay alone. The
/// partition does not depend on input order.
fn partition(candidates: Vec<CanonicalRecord>) -> Partition {
    let mut by_doi: BTreeMap<String, Vec<CanonicalRecord>> = BTreeMap::new();
    let mut without_doi = Vec::new();

    for record in candidates {
        match record.doi.clone() {
            Some(doi) => by_doi.entry(doi).or_default().push(record),
            None => without_doi.push(record),
        }
    }

    let mut doi_by_key: BTreeMap<MatchKey, String> = BTreeMap::new();
    for (doi, members) in &by_doi {
        for key in members.iter().filter_map(CanonicalRecord::match_key) {
            doi_by_key.entry(key).or_insert_with(|| doi.clone());
        }
    }

    let mut by_key: BTreeMap<MatchKey, Vec<CanonicalRecord>> = BTreeMap::new();
    let mut singletons = Vec::new();

    for record in without_doi {
        match record.match_key() {
            Some(key) => {
                if let Some(members) = doi_by_key.get(&key).and_then(|doi| by_doi.get_mut(doi)) {
                    members.push(record);
                } else {
                    by_key.entry(key).or_default().push(record);
                }
            }
            None => singletons.push(record),
        }
    }

    Partition {
        by_doi,
        by_key,
        singletons,
    }
}

impl MergeEngine {
    /// Fold every group, then keep absorbing DOI-less groups whose key
    /// matches a folded DOI record until nothing moves.
    ///
    /// A folded record can take its title from one member and its authors
    /// from another, so its key may match a DOI-less group no single member
    /// matched. Without the fixpoint a second merge would collapse them.
    fn cluster_and_fold(&self, candidates: Vec<CanonicalRecord>) -> Vec<CanonicalRecord> {
        let Partition {
            mut by_doi,
            mut by_key,
            singletons,
        } = partition(candidates);

        let mut folded: BTreeMap<String, CanonicalRecord> = by_doi
            .iter()
            .map(|(doi, members)| (doi.clone(), self.fold(members.clone())))
            .collect();

        loop {
            let mut doi_by_key: BTreeMap<MatchKey, &str> = BTreeMap::new();
            for (doi, record) in &folded {
                if let Some(key) = record.match_key() {
                    doi_by_key.entry(key).or_insert(doi.as_str());
                }
            }

            let moves: Vec<(MatchKey, String)> = by_key
                .keys()
                .filter_map(|key| doi_by_key.get(key).map(|doi| (key.clone(), (*doi).to_string())))
                .collect();
            if moves.is_empty() {
                break;
            }

            let mut touched = BTreeSet::new();
            for (key, doi) in moves {
                if let (Some(members), Some(group)) = (by_key.remove(&key), by_doi.get_mut(&doi)) {
                    group.extend(members);
                    touched.insert(doi);
                }
            }
            for doi in touched {
                if let Some(members) = by_doi.get(&doi) {
                    folded.insert(doi, self.fold(members.clone()));
                }
            }
        }

        folded
            .into_values()
            .chain(by_key.into_values().map(|members| self.fold(members)))
            .chain(singletons.into_iter().map(|record| self.fold(vec![record])))
            .collect()
    }
}

/// Publication date descending (missing last), then normalized title, then doi
fn compare_output(a: &CanonicalRecord, b: &CanonicalRecord) -> Ordering {
    let by_date = match (&a.publication_date, &b.publication_date) {
        (Some(x), Some(y)) => y.cmp(x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };

    by_date
        .then_with(|| a.title_key().cmp(&b.title_key()))
        .then_with(|| match (&a.doi, &b.doi) {
            (Some(x), Some(y)) => x.cmp(y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| content_key(a).cmp(&content_key(b)))
}

/// Total order fallback over the full record content
fn content_key(record: &CanonicalRecord) -> String {
    serde_json::to_string(record).unwrap_or_default()
}

/// Case-fold, replace punctuation with spaces, collapse whitespace
#[must_use]
pub fn normalize_title(title: &str) -> String {
    title
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Surname of an author name in either `Surname, Given` or `Given Surname`
/// form. PubMed-style `Surname AB` (trailing initials) is also recognised.
#[must_use]
pub fn author_surname(name: &str) -> Option<String> {
    let name = name.trim();
    let raw = if let Some((surname, _)) = name.split_once(',') {
        surname
    } else {
        let tokens: Vec<&str> = name.split_whitespace().collect();
        match tokens.as_slice() {
            [] => return None,
            [only] => *only,
            [first, .., last] => {
                if is_initials(last) {
                    *first
                } else {
                    *last
                }
            }
        }
    };

    let surname = normalize_title(raw);
    if surname.is_empty() {
        None
    } else {
        Some(surname)
    }
}

fn is_initials(token: &str) -> bool {
    let letters = token.trim_end_matches('.');
    !letters.is_empty()
        && letters.chars().count() <= 3
        && letters.chars().all(|c| c.is_uppercase() || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(source: &str, title: &str, author: &str, doi: Option<&str>) -> RawRecord {
        RawRecord {
            source: source.to_string(),
            title: Some(title.to_string()),
            authors: vec![author.to_string()],
            doi: doi.map(str::to_string),
            ..RawRecord::default()
        }
    }

    #[test]
    fn test_doi_match_merges_across_sources() {
        let engine = MergeEngine::default();
        let records = vec![
            raw("crossref", "CRISPR screens", "Doudna, Jennifer", Some("https://doi.org/10.1/ABC")),
            raw("pubmed", "CRISPR screens.", "Doudna JA", Some("10.1/abc")),
        ];

        let merged = engine.merge(records, Strategy::Union);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].doi.as_deref(), Some("10.1/abc"));
        assert_eq!(merged[0].sources.len(), 2);
        // pubmed outranks crossref in the default priority
        assert_eq!(merged[0].provenance["title"], "pubmed");
        assert_eq!(merged[0].title.as_deref(), Some("CRISPR screens."));
    }

    #[test]
    fn test_title_author_fallback_without_doi() {
        let engine = MergeEngine::default();
        let records = vec![
            raw("arxiv", "Attention Is All You Need", "Ashish Vaswani", None),
            raw("openalex", "Attention is all you need!", "Vaswani, A.", Some("10.5555/attn")),
        ];

        let merged = engine.merge(records, Strategy::Union);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].doi.as_deref(), Some("10.5555/attn"));
    }

    #[test]
    fn test_different_dois_stay_distinct() {
        let engine = MergeEngine::default();
        let records = vec![
            raw("crossref", "Same title", "Smith, J", Some("10.1/a")),
            raw("pubmed", "Same title", "Smith J", Some("10.1/b")),
        ];
        assert_eq!(engine.merge(records, Strategy::Union).len(), 2);
    }

    #[test]
    fn test_field_union_takes_first_non_empty() {
        let engine = MergeEngine::new(MergePolicy::new(["a", "b"]));
        let mut first = raw("a", "T", "X Y", Some("10.1/x"));
        first.journal = None;
        let mut second = raw("b", "Other title", "Z W", Some("10.1/x"));
        second.journal = Some("Nature".to_string());
        second.authors.push("Q R".to_string());

        let merged = engine.merge(vec![second, first], Strategy::Union);
        assert_eq!(merged[0].title.as_deref(), Some("T"));
        assert_eq!(merged[0].journal.as_deref(), Some("Nature"));
        assert_eq!(merged[0].provenance["journal"], "b");
        // authors come wholesale from the first source that has any
        assert_eq!(merged[0].authors, vec!["X Y".to_string()]);
    }

    #[test]
    fn test_unknown_sources_rank_last_by_name() {
        let policy = MergePolicy::new(["pubmed"]);
        let mut sources = vec!["zeta".to_string(), "alpha".to_string(), "pubmed".to_string()];
        policy.sort_sources(&mut sources);
        assert_eq!(sources, vec!["pubmed", "alpha", "zeta"]);
    }

    #[test]
    fn test_intersection_requires_two_sources() {
        let engine = MergeEngine::default();
        let records = vec![
            raw("pubmed", "Shared", "Lee K", Some("10.1/shared")),
            raw("crossref", "Shared", "Lee, K", Some("10.1/shared")),
            raw("crossref", "Lonely", "Kim, S", Some("10.1/lonely")),
        ];

        let union = engine.merge(records.clone(), Strategy::Union);
        let intersection = engine.merge(records, Strategy::Intersection);
        assert_eq!(union.len(), 2);
        assert_eq!(intersection.len(), 1);
        assert_eq!(intersection[0].doi.as_deref(), Some("10.1/shared"));
    }

    #[test]
    fn test_output_sorted_by_date_desc_missing_last() {
        let engine = MergeEngine::default();
        let mut old = raw("pubmed", "Old", "A B", Some("10.1/old"));
        old.publication_date = Some("2001-02-03".to_string());
        let mut new = raw("pubmed", "New", "A B", Some("10.1/new"));
        new.publication_date = Some("2023".to_string());
        let undated = raw("pubmed", "Undated", "A B", Some("10.1/undated"));

        let merged = engine.merge(vec![undated, old, new], Strategy::Union);
        let titles: Vec<_> = merged.iter().filter_map(|r| r.title.clone()).collect();
        assert_eq!(titles, vec!["New", "Old", "Undated"]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let engine = MergeEngine::default();
        let records = vec![
            raw("pubmed", "One", "Alpha A", Some("10.1/one")),
            raw("crossref", "One", "Alpha, A", Some("10.1/one")),
            raw("arxiv", "Two", "Beta B", None),
            raw("openalex", "Two", "B. Beta", None),
        ];

        let once = engine.merge(records, Strategy::Union);
        let twice = engine.merge_canonical(once.clone(), Strategy::Union);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_doi_less_record_joins_on_folded_key() {
        let engine = MergeEngine::default();
        let mut untitled_authors = raw("pubmed", "Gene editing outcomes", "", Some("10.1/x"));
        untitled_authors.authors.clear();
        let records = vec![
            untitled_authors,
            raw("crossref", "Gene-editing outcomes in mice", "Smith, J", Some("10.1/x")),
            raw("arxiv", "Gene editing outcomes", "J Smith", None),
        ];

        // title comes from pubmed, authors from crossref; only that pair
        // matches the arxiv record
        let once = engine.merge(records.clone(), Strategy::Union);
        assert_eq!(once.len(), 1);
        assert_eq!(
            once[0].sources,
            BTreeSet::from(["arxiv".to_string(), "crossref".to_string(), "pubmed".to_string()])
        );
        assert_eq!(engine.merge_canonical(once.clone(), Strategy::Union), once);

        let intersection = engine.merge(records, Strategy::Intersection);
        assert_eq!(intersection.len(), 1);
    }

    #[test]
    fn test_consolidate() {
        let engine = MergeEngine::default();
        assert!(engine.consolidate(Vec::new()).is_none());

        let mut a = raw("crossref", "Paper", "X Y", Some("10.1/p"));
        a.citation_count = Some(12);
        let mut b = RawRecord::new("pubmed");
        b.pmid = Some("123".to_string());

        let record = engine.consolidate(vec![a, b]).unwrap();
        assert_eq!(record.pmid.as_deref(), Some("123"));
        assert_eq!(record.citation_count, Some(12));
        assert_eq!(record.provenance["pmid"], "pubmed");
    }

    #[test]
    fn test_author_surname_forms() {
        assert_eq!(author_surname("Doudna, Jennifer A."), Some("doudna".to_string()));
        assert_eq!(author_surname("Doudna JA"), Some("doudna".to_string()));
        assert_eq!(author_surname("Jennifer Doudna"), Some("doudna".to_string()));
        assert_eq!(author_surname("Doudna"), Some("doudna".to_string()));
        assert_eq!(author_surname("   "), None);
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("  CRISPR-Cas9:  a  Review. "), "crispr cas9 a review");
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("Intersection".parse::<Strategy>().unwrap(), Strategy::Intersection);
        assert!("xor".parse::<Strategy>().is_err());
    }
}
