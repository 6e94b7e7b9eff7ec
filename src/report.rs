use std::collections::HashMap;

use crate::domain::{Identifier, TaxonomyGroup, TaxonomyId};
use crate::error::TallyError;
use crate::store::LookupCache;

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub total: usize,
    pub groups: Vec<TaxonomyGroup>,
}

impl Report {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Counts identifiers per taxonomy id, most common first.
///
/// Every identifier must already be cached. Equal counts keep the order in which
/// their taxonomy id was first seen.
pub fn aggregate<C: LookupCache + ?Sized>(
    cache: &C,
    ids: &[Identifier],
) -> Result<Report, TallyError> {
    let counts = count_taxonomy(cache, ids)?;
    let total = ids.len();

    let groups = counts
        .into_iter()
        .map(|(taxonomy_id, count)| {
            let organism_name = cache.find_by_taxonomy(&taxonomy_id)?;
            Ok(TaxonomyGroup {
                taxonomy_id,
                organism_name,
                count,
                ratio: count as f64 / total as f64,
            })
        })
        .collect::<Result<Vec<_>, TallyError>>()?;

    Ok(Report { total, groups })
}

fn count_taxonomy<C: LookupCache + ?Sized>(
    cache: &C,
    ids: &[Identifier],
) -> Result<Vec<(TaxonomyId, usize)>, TallyError> {
    let mut slots = HashMap::<TaxonomyId, usize>::new();
    let mut counts: Vec<(TaxonomyId, usize)> = Vec::new();
    for id in ids {
        let taxonomy_id = cache.get(id)?.taxonomy_id;
        match slots.get(&taxonomy_id) {
            Some(&slot) => counts[slot].1 += 1,
            None => {
                slots.insert(taxonomy_id.clone(), counts.len());
                counts.push((taxonomy_id, 1));
            }
        }
    }
    // stable: ties stay in first-seen order
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    Ok(counts)
}
