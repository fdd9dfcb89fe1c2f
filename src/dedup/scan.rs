// src/dedup/scan.rs - Deduplication scan: clusters listings and maintains shared properties
use anyhow::{Context, Result};
use indicatif::MultiProgress;
use log::{debug, info};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::Repository;
use crate::dedup::address::normalize_agency_name;
use crate::dedup::clustering::{cluster_candidates, PropertyCluster};
use crate::models::{
    distinct_agency_count, AgencyListing, DedupScanResult, ListingClassification,
    NewSharedProperty, Property, PropertyId, SharedProperty, SharedPropertyId,
};
use crate::utils::logging::{JobKind, MatchingLogger};
use crate::utils::progress_config::counted_bar;

fn agency_entry(property: &Property) -> AgencyListing {
    let name = property
        .agency_name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .or_else(|| property.portal.clone())
        .unwrap_or_else(|| format!("listing #{}", property.id));
    AgencyListing {
        name,
        link: property.external_link.clone(),
        source_property_id: property.id,
    }
}

/// Adds an entry for every member whose listing and agency are not already
/// represented. Returns true when `agencies` changed.
fn merge_agencies(agencies: &mut Vec<AgencyListing>, members: &[Property]) -> bool {
    let mut known_names: BTreeSet<String> = agencies
        .iter()
        .map(|a| normalize_agency_name(&a.name))
        .collect();
    let mut changed = false;
    for member in members {
        if agencies.iter().any(|a| a.source_property_id == member.id) {
            continue;
        }
        let entry = agency_entry(member);
        if known_names.insert(normalize_agency_name(&entry.name)) {
            agencies.push(entry);
            changed = true;
        }
    }
    changed
}

/// Makes `agencies` describe exactly the cluster: entries for listings that
/// left the cluster are dropped and new members are merged in.
fn sync_agencies(agencies: &mut Vec<AgencyListing>, members: &[Property]) -> bool {
    let before = agencies.len();
    agencies.retain(|a| members.iter().any(|m| m.id == a.source_property_id));
    let pruned = agencies.len() != before;
    merge_agencies(agencies, members) || pruned
}

pub struct DeduplicationService<R: ?Sized> {
    repo: Arc<R>,
}

impl<R: Repository + ?Sized> DeduplicationService<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Shared property already tied to one of the cluster's members, either
    /// through the member's own link or through the agency list. Records
    /// claimed by another cluster in this scan are skipped.
    fn find_existing(
        cluster: &PropertyCluster,
        shared: &HashMap<SharedPropertyId, SharedProperty>,
        by_source: &HashMap<PropertyId, SharedPropertyId>,
        claimed: &HashMap<SharedPropertyId, usize>,
    ) -> Option<SharedPropertyId> {
        cluster
            .members
            .iter()
            .flat_map(|m| {
                let linked = m.shared_property_id.filter(|id| shared.contains_key(id));
                linked.into_iter().chain(by_source.get(&m.id).copied())
            })
            .filter(|id| !claimed.contains_key(id))
            .min()
    }

    async fn save_shared(&self, shared: &SharedProperty, dry_run: bool) -> Result<()> {
        if dry_run {
            return Ok(());
        }
        self.repo
            .update_shared_property(shared)
            .await
            .with_context(|| format!("Failed to update shared property {}", shared.id))
    }

    /// Clusters every scraped listing, creates or extends the shared property
    /// of each multi-agency cluster and writes each member's classification.
    ///
    /// Only rows whose classification actually changes are written, so
    /// running the scan again over unchanged data writes nothing. With
    /// `dry_run` the counts are computed but nothing is persisted.
    pub async fn run_deduplication_scan(
        &self,
        dry_run: bool,
        multi_progress: Option<&MultiProgress>,
    ) -> Result<DedupScanResult> {
        let scan_id = Uuid::new_v4();
        let logger = MatchingLogger::new(JobKind::Dedup);
        logger.log_start(
            &scan_id.to_string(),
            if dry_run { "(dry run, nothing will be written)" } else { "" },
        );

        logger.log_phase("Loading candidates", None);
        let candidates = self
            .repo
            .list_dedup_candidates()
            .await
            .context("Failed to load dedup candidates")?;
        let mut shared: HashMap<SharedPropertyId, SharedProperty> = self
            .repo
            .list_shared_properties()
            .await
            .context("Failed to load shared properties")?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();
        logger.log_data_loaded(candidates.len(), "scraped listings");
        logger.log_data_loaded(shared.len(), "shared properties");

        let mut by_source: HashMap<PropertyId, SharedPropertyId> = HashMap::new();
        for s in shared.values() {
            for agency in &s.agencies {
                by_source
                    .entry(agency.source_property_id)
                    .and_modify(|existing| *existing = (*existing).min(s.id))
                    .or_insert(s.id);
            }
        }

        logger.log_phase("Clustering", None);
        let outcome = cluster_candidates(&candidates);
        logger.log_data_quality_issue(
            "listings without usable address, price or size",
            outcome.excluded.len(),
        );

        let mut result = DedupScanResult {
            scan_id,
            clusters_found: outcome.clusters.len(),
            multiagency_properties: 0,
            exclusive_properties: 0,
            properties_updated: 0,
            shared_properties_created: 0,
            excluded_candidates: outcome.excluded.len(),
        };

        logger.log_phase("Writing shared properties", None);
        let pb = counted_bar(multi_progress, outcome.clusters.len() as u64, "Consolidating clusters");
        let mut updates: Vec<(PropertyId, ListingClassification)> = Vec::new();

        // Cluster index owning each shared property in this scan. Multi-agency
        // clusters claim first so a group that split never folds back into one record.
        let mut claimed: HashMap<SharedPropertyId, usize> = HashMap::new();
        let mut cluster_shared: Vec<Option<SharedPropertyId>> = vec![None; outcome.clusters.len()];
        for (idx, cluster) in outcome.clusters.iter().enumerate() {
            if !cluster.is_multiagency() {
                continue;
            }
            pb.inc(1);
            result.multiagency_properties += 1;
            let shared_id = self
                .consolidate(cluster, &mut shared, &mut by_source, &claimed, dry_run, &mut result)
                .await?;
            if let Some(id) = shared_id {
                claimed.insert(id, idx);
            }
            cluster_shared[idx] = shared_id;
        }

        // Single-source clusters keep an existing link, but each shared
        // property stays with at most one cluster.
        let mut exclusive_links: HashMap<PropertyId, Option<SharedPropertyId>> = HashMap::new();
        for (idx, cluster) in outcome.clusters.iter().enumerate() {
            if cluster.is_multiagency() {
                continue;
            }
            pb.inc(1);
            result.exclusive_properties += 1;
            let mut owned: BTreeSet<SharedPropertyId> = BTreeSet::new();
            for member in &cluster.members {
                let link = match member.shared_property_id {
                    Some(id) if shared.contains_key(&id) => {
                        let owner = *claimed.entry(id).or_insert(idx);
                        if owner == idx {
                            owned.insert(id);
                            Some(id)
                        } else {
                            None
                        }
                    }
                    other => other,
                };
                exclusive_links.insert(member.id, link);
            }
            for id in owned {
                if let Some(record) = shared.get_mut(&id) {
                    let was_multiagency = record.is_multiagency;
                    if sync_agencies(&mut record.agencies, &cluster.members) {
                        record.refresh_multiagency();
                        if was_multiagency && !record.is_multiagency {
                            info!("Shared property {} is no longer multi-agency", id);
                        }
                        self.save_shared(record, dry_run).await?;
                    }
                }
            }
        }

        for (idx, cluster) in outcome.clusters.iter().enumerate() {
            for member in &cluster.members {
                let wanted = if cluster.is_multiagency() {
                    ListingClassification {
                        is_multiagency: true,
                        exclusivity_hint: false,
                        shared_property_id: cluster_shared[idx],
                    }
                } else {
                    ListingClassification {
                        is_multiagency: false,
                        exclusivity_hint: true,
                        shared_property_id: exclusive_links
                            .get(&member.id)
                            .copied()
                            .unwrap_or(member.shared_property_id),
                    }
                };
                if wanted != member.classification() {
                    debug!(
                        "Cluster {}: property {} {:?} -> {:?}",
                        cluster.fingerprint,
                        member.id,
                        member.classification(),
                        wanted
                    );
                    updates.push((member.id, wanted));
                }
            }
        }
        pb.finish_with_message("Clusters consolidated");

        result.properties_updated = if dry_run {
            updates.len()
        } else {
            self.repo
                .update_classifications(&updates)
                .await
                .context("Failed to write listing classifications")?
        };

        logger.log_completion(&format!(
            "{} clusters ({} multi-agency, {} exclusive), {} listings updated, {} shared properties created",
            result.clusters_found,
            result.multiagency_properties,
            result.exclusive_properties,
            result.properties_updated,
            result.shared_properties_created
        ));
        Ok(result)
    }

    /// Creates or extends the shared property of a multi-agency cluster.
    /// Returns its id, or `None` for a record a dry run would have created.
    async fn consolidate(
        &self,
        cluster: &PropertyCluster,
        shared: &mut HashMap<SharedPropertyId, SharedProperty>,
        by_source: &mut HashMap<PropertyId, SharedPropertyId>,
        claimed: &HashMap<SharedPropertyId, usize>,
        dry_run: bool,
        result: &mut DedupScanResult,
    ) -> Result<Option<SharedPropertyId>> {
        if let Some(existing_id) = Self::find_existing(cluster, shared, by_source, claimed) {
            if let Some(existing) = shared.get_mut(&existing_id) {
                if sync_agencies(&mut existing.agencies, &cluster.members) {
                    existing.refresh_multiagency();
                    info!(
                        "Shared property {} now lists {} agencies",
                        existing_id,
                        existing.agencies.len()
                    );
                    self.save_shared(existing, dry_run).await?;
                }
            }
            return Ok(Some(existing_id));
        }

        // First-seen values come from the lowest-id member.
        let first = &cluster.members[0];
        let mut agencies = Vec::new();
        merge_agencies(&mut agencies, &cluster.members);
        let new = NewSharedProperty {
            address: first.address.clone().unwrap_or_else(|| cluster.address_key.clone()),
            address_key: cluster.address_key.clone(),
            city: first.city.clone(),
            price: first.price,
            size: first.size,
            property_type: first.property_type.clone(),
            rooms: first.room_count(),
            location: cluster.members.iter().find_map(|m| m.location),
            is_multiagency: distinct_agency_count(&agencies) > 1,
            agencies,
            match_buyers: true,
        };
        result.shared_properties_created += 1;

        if dry_run {
            return Ok(None);
        }
        let created = self
            .repo
            .insert_shared_property(new)
            .await
            .with_context(|| format!("Failed to create shared property for cluster {}", cluster.fingerprint))?;
        info!(
            "Created shared property {} for cluster {} ({} agencies)",
            created.id,
            cluster.fingerprint,
            created.agencies.len()
        );
        for agency in &created.agencies {
            by_source.insert(agency.source_property_id, created.id);
        }
        let id = created.id;
        shared.insert(id, created);
        Ok(Some(id))
    }
}
