// src/ingest/merge.rs
//
// Cross-source dedup. Callers feed candidates in configured source-list
// order; ties keep the first occurrence, so the outcome is deterministic.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::ingest::types::{CandidateEntity, EntityKind};

#[derive(Debug, Default)]
pub struct MergeOutcome {
    pub kept: Vec<CandidateEntity>,
    pub duplicates: usize,
    pub below_threshold: usize,
}

/// Identity of a candidate for dedup purposes. A canonicalized link is the
/// stronger identifier when present; otherwise the case-insensitive
/// (kind, name, sector) tuple.
#[derive(Debug, PartialEq, Eq, Hash)]
enum DedupKey {
    Link(EntityKind, String),
    Fields(EntityKind, String, String),
}

fn dedup_key(entity: &CandidateEntity) -> DedupKey {
    if let Some(link) = entity.link().map(canonicalize_link).filter(|l| !l.is_empty()) {
        return DedupKey::Link(entity.kind(), link);
    }
    DedupKey::Fields(
        entity.kind(),
        entity.display_name().to_lowercase(),
        entity.sector().unwrap_or("").to_lowercase(),
    )
}

/// Strip scheme and `www.`, lowercase, trim trailing slashes.
pub fn canonicalize_link(raw: &str) -> String {
    let mut s = raw.trim().to_ascii_lowercase();
    for prefix in ["https://", "http://"] {
        if let Some(rest) = s.strip_prefix(prefix) {
            s = rest.to_string();
            break;
        }
    }
    if let Some(rest) = s.strip_prefix("www.") {
        s = rest.to_string();
    }
    while s.ends_with('/') {
        s.pop();
    }
    s
}

/// Filter below-threshold candidates, then dedup the rest. On a key
/// collision the strictly higher confidence wins; a tie keeps the earlier
/// candidate in its original position.
pub fn merge(candidates: Vec<CandidateEntity>, threshold: f32) -> MergeOutcome {
    let mut out = MergeOutcome::default();
    let mut index: HashMap<DedupKey, usize> = HashMap::new();

    for candidate in candidates {
        if candidate.confidence() < threshold {
            out.below_threshold += 1;
            continue;
        }
        match index.entry(dedup_key(&candidate)) {
            Entry::Occupied(slot) => {
                out.duplicates += 1;
                let held = &mut out.kept[*slot.get()];
                if candidate.confidence() > held.confidence() {
                    *held = candidate;
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(out.kept.len());
                out.kept.push(candidate);
            }
        }
    }

    out
}
