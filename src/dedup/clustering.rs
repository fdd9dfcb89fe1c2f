// src/dedup/clustering.rs - Groups scraped listings that advertise the same real-world property
use log::debug;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::unionfind::UnionFind;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::dedup::address::{addresses_match, normalize_address, normalize_agency_name, split_civic};
use crate::models::{OwnerType, Property, PropertyId};
use crate::utils::constants::{
    BAND_EPSILON, DEDUP_PRICE_TOLERANCE, DEDUP_ROOMS_TOLERANCE, DEDUP_SIZE_TOLERANCE,
};

/// One group of listings judged to be the same property.
#[derive(Debug, Clone)]
pub struct PropertyCluster {
    /// Stable across runs for the same members and address.
    pub fingerprint: String,
    pub address_key: String,
    /// Ascending by id.
    pub members: Vec<Property>,
    /// Distinct advertisers, see [`source_identity`].
    pub identities: BTreeSet<String>,
}

impl PropertyCluster {
    pub fn is_multiagency(&self) -> bool {
        self.identities.len() > 1
    }

    pub fn member_ids(&self) -> Vec<PropertyId> {
        self.members.iter().map(|m| m.id).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClusteringOutcome {
    pub clusters: Vec<PropertyCluster>,
    /// Candidates that could not be clustered; left untouched.
    pub excluded: Vec<PropertyId>,
}

/// Who is advertising a listing: the normalized agency name when there is one,
/// otherwise the portal it came from.
pub fn source_identity(property: &Property) -> Option<String> {
    if let Some(name) = property.agency_name.as_deref() {
        let normalized = normalize_agency_name(name);
        if !normalized.is_empty() {
            return Some(normalized);
        }
    }
    let portal = property.portal.as_deref()?.trim().to_lowercase();
    if portal.is_empty() {
        return None;
    }
    Some(match property.owner_type {
        OwnerType::Private => format!("private:{}", portal),
        OwnerType::Agency => format!("portal:{}", portal),
    })
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

fn within(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() / a.max(b) <= tolerance + BAND_EPSILON
}

/// Price within 10% and size within 15% (each relative to the larger value)
/// and rooms within one, judged only on dimensions both listings report. At
/// least one of price or size has to be comparable.
pub fn same_property(a: &Property, b: &Property) -> bool {
    let mut compared = false;
    if let (Some(pa), Some(pb)) = (positive(a.price), positive(b.price)) {
        if !within(pa, pb, DEDUP_PRICE_TOLERANCE) {
            return false;
        }
        compared = true;
    }
    if let (Some(sa), Some(sb)) = (positive(a.size), positive(b.size)) {
        if !within(sa, sb, DEDUP_SIZE_TOLERANCE) {
            return false;
        }
        compared = true;
    }
    if let (Some(ra), Some(rb)) = (a.room_count(), b.room_count()) {
        if (ra - rb).abs() > DEDUP_ROOMS_TOLERANCE {
            return false;
        }
    }
    compared
}

fn fingerprint(address_key: &str, member_ids: &[PropertyId]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(address_key.as_bytes());
    for id in member_ids {
        hasher.update(b"|");
        hasher.update(id.to_string().as_bytes());
    }
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

struct Candidate<'a> {
    property: &'a Property,
    address_key: String,
    identity: String,
}

/// Clusters `candidates`. Output is deterministic for a given input set
/// regardless of input order.
pub fn cluster_candidates(candidates: &[Property]) -> ClusteringOutcome {
    let mut sorted: Vec<&Property> = candidates.iter().collect();
    sorted.sort_by_key(|p| p.id);

    let mut usable: Vec<Candidate> = Vec::with_capacity(sorted.len());
    let mut excluded = Vec::new();
    for property in sorted {
        let address_key = property
            .address
            .as_deref()
            .map(|a| normalize_address(a, property.city.as_deref()))
            .unwrap_or_default();
        let has_metrics = positive(property.price).is_some() || positive(property.size).is_some();
        match source_identity(property) {
            Some(identity) if !address_key.is_empty() && has_metrics => usable.push(Candidate {
                property,
                address_key,
                identity,
            }),
            _ => excluded.push(property.id),
        }
    }

    let groups = group_by_address(&usable);
    let mut clusters = Vec::new();
    for members in groups.values() {
        for sub in split_group(&usable, members) {
            let members: Vec<Property> = sub.iter().map(|&i| usable[i].property.clone()).collect();
            let identities: BTreeSet<String> =
                sub.iter().map(|&i| usable[i].identity.clone()).collect();
            let address_key = usable[sub[0]].address_key.clone();
            let ids: Vec<PropertyId> = members.iter().map(|m| m.id).collect();
            clusters.push(PropertyCluster {
                fingerprint: fingerprint(&address_key, &ids),
                address_key,
                members,
                identities,
            });
        }
    }
    clusters.sort_by_key(|c| c.members[0].id);

    debug!(
        "Clustered {} candidates into {} clusters ({} excluded)",
        usable.len(),
        clusters.len(),
        excluded.len()
    );
    ClusteringOutcome { clusters, excluded }
}

/// Address groups keyed by their lowest member index. Identical keys always
/// share a group; keys with the same civic number and near-identical street
/// names are merged too.
fn group_by_address(usable: &[Candidate]) -> BTreeMap<usize, Vec<usize>> {
    let mut key_index: BTreeMap<&str, usize> = BTreeMap::new();
    for candidate in usable {
        let next = key_index.len();
        key_index.entry(candidate.address_key.as_str()).or_insert(next);
    }

    // Only keys with the same civic tokens can ever match, so compare within those buckets.
    let mut by_civic: HashMap<String, Vec<&str>> = HashMap::new();
    for key in key_index.keys() {
        let (_, civic) = split_civic(key);
        if !civic.is_empty() {
            by_civic.entry(civic.join(" ")).or_default().push(*key);
        }
    }

    let mut union_find = UnionFind::<usize>::new(key_index.len());
    for keys in by_civic.values() {
        for (i, a) in keys.iter().enumerate() {
            for b in &keys[i + 1..] {
                if addresses_match(a, b) {
                    union_find.union(key_index[a], key_index[b]);
                }
            }
        }
    }

    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    let mut group_of_root: HashMap<usize, usize> = HashMap::new();
    for (i, candidate) in usable.iter().enumerate() {
        let root = union_find.find(key_index[candidate.address_key.as_str()]);
        let group = *group_of_root.entry(root).or_insert(i);
        groups.entry(group).or_default().push(i);
    }
    groups
}

/// Splits one address group into sub-clusters: connected components of the
/// same-property graph, each further split so that every member is compatible
/// with every other member.
fn split_group(usable: &[Candidate], members: &[usize]) -> Vec<Vec<usize>> {
    let mut graph: UnGraph<usize, ()> = UnGraph::new_undirected();
    let nodes: Vec<NodeIndex> = members.iter().map(|&i| graph.add_node(i)).collect();
    for a in 0..members.len() {
        for b in (a + 1)..members.len() {
            if same_property(usable[members[a]].property, usable[members[b]].property) {
                graph.add_edge(nodes[a], nodes[b], ());
            }
        }
    }

    let mut visited = vec![false; graph.node_count()];
    let mut result = Vec::new();
    for start in graph.node_indices() {
        if visited[start.index()] {
            continue;
        }
        let mut component = Vec::new();
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            if visited[current.index()] {
                continue;
            }
            visited[current.index()] = true;
            component.push(graph[current]);
            for neighbor in graph.neighbors(current) {
                if !visited[neighbor.index()] {
                    stack.push(neighbor);
                }
            }
        }
        component.sort_unstable();

        // Complete linkage: a chain a~b~c with a!~c must not become one cluster.
        let mut subclusters: Vec<Vec<usize>> = Vec::new();
        for idx in component {
            let home = subclusters.iter_mut().find(|sub| {
                sub.iter()
                    .all(|&other| same_property(usable[idx].property, usable[other].property))
            });
            match home {
                Some(sub) => sub.push(idx),
                None => subclusters.push(vec![idx]),
            }
        }
        result.extend(subclusters);
    }
    result.sort_by_key(|sub| sub[0]);
    result
}
