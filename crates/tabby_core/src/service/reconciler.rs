//! Snapshot reconciliation.
//!
//! # Responsibility
//! - Merge a fresh browser snapshot against the previous tab set.
//! - Attach stored annotations and recompute tiers.
//!
//! # Invariants
//! - Output is the fresh snapshot mapped 1:1, in input order.
//! - Each previous tab lends its id to at most one fresh row; rows sharing a
//!   URL take previous ids oldest-first, then get new ids.
//! - Previous tabs absent from the snapshot are dropped; their annotations
//!   stay in the store.

use crate::classifier::classify;
use crate::model::tab::{RawTab, Tab, TabId};
use crate::repo::metadata_store::MetadataStore;
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

/// Identity bookkeeping for one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Fresh rows that kept a previous id.
    pub reused: usize,
    /// Fresh rows that got a new id.
    pub minted: usize,
    /// Previous tabs with no fresh counterpart.
    pub dropped: usize,
}

/// Reconciles `fresh` against `previous`, reading annotations from `store`.
pub fn reconcile(previous: &[Tab], fresh: &[RawTab], store: &MetadataStore) -> Vec<Tab> {
    reconcile_with_stats(previous, fresh, store).0
}

/// Same as [`reconcile`], also reporting identity reuse counts.
pub fn reconcile_with_stats(
    previous: &[Tab],
    fresh: &[RawTab],
    store: &MetadataStore,
) -> (Vec<Tab>, ReconcileStats) {
    let mut pool = IdentityPool::new(previous);
    let mut stats = ReconcileStats::default();

    let tabs = fresh
        .iter()
        .map(|raw| {
            let id = match pool.take(&raw.url) {
                Some(id) => {
                    stats.reused += 1;
                    id
                }
                None => {
                    stats.minted += 1;
                    Uuid::new_v4()
                }
            };
            let mut tab = Tab {
                id,
                title: raw.title.clone(),
                url: raw.url.clone(),
                browser: raw.browser_name.clone(),
                note: None,
                reminder_at: None,
                tier: classify(&raw.url, &raw.title),
            };
            tab.apply_annotation(store.get(&raw.url));
            tab
        })
        .collect();

    stats.dropped = pool.remaining();
    (tabs, stats)
}

/// Previous ids grouped by URL, consumed front-to-back.
struct IdentityPool<'a> {
    by_url: HashMap<&'a str, VecDeque<TabId>>,
}

impl<'a> IdentityPool<'a> {
    fn new(previous: &'a [Tab]) -> Self {
        let mut by_url: HashMap<&'a str, VecDeque<TabId>> = HashMap::new();
        for tab in previous {
            by_url.entry(tab.url.as_str()).or_default().push_back(tab.id);
        }
        Self { by_url }
    }

    fn take(&mut self, url: &str) -> Option<TabId> {
        self.by_url.get_mut(url).and_then(VecDeque::pop_front)
    }

    fn remaining(&self) -> usize {
        self.by_url.values().map(VecDeque::len).sum()
    }
}
