//! Learning-bridge interfaces and the trunk-VLAN range index.
//!
//! The index partitions the VLAN space into maximal disjoint sub-ranges,
//! each mapped to the exact set of interface uuids whose trunk claims cover
//! it. Updates are all-or-nothing per interface: the old claims are removed
//! and the new ones re-added under one lock, and every touched sub-range is
//! reported to listeners after the lock is dropped.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::debug;

/// An inclusive VLAN id range. Ordered by `(start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VlanRange {
    pub start: u16,
    pub end: u16,
}

impl VlanRange {
    pub fn new(start: u16, end: u16) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    pub fn single(vlan: u16) -> Self {
        Self {
            start: vlan,
            end: vlan,
        }
    }

    pub fn overlaps(&self, other: &VlanRange) -> bool {
        self.start <= other.end && self.end >= other.start
    }

    pub fn contains(&self, other: &VlanRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl fmt::Display for VlanRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// A learning-bridge interface and the trunk VLAN ranges it claims.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LearningBridgeIface {
    pub uuid: String,
    pub interface_name: Option<String>,
    pub trunk_vlans: BTreeSet<VlanRange>,
}

impl LearningBridgeIface {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            ..Self::default()
        }
    }
}

/// Notified after interface updates and per touched VLAN sub-range.
pub trait LearningBridgeListener: Send + Sync {
    fn lb_iface_updated(&self, uuid: &str);
    fn lb_vlan_updated(&self, range: VlanRange);
}

type RangeIndex = BTreeMap<VlanRange, HashSet<String>>;

/// Stored keys overlapping `r`, in ascending order.
///
/// Stored keys are pairwise disjoint, so start order equals end order and
/// the overlap candidates form one contiguous run: iterate backwards from
/// the last key starting at or below `r.end` while keys still reach
/// `r.start`. O(overlap count) per call.
fn overlapping_keys(index: &RangeIndex, r: VlanRange) -> Vec<VlanRange> {
    let upper = VlanRange {
        start: r.end,
        end: u16::MAX,
    };
    let mut keys: Vec<VlanRange> = index
        .range(..=upper)
        .rev()
        .take_while(|(key, _)| key.end >= r.start)
        .map(|(key, _)| *key)
        .collect();
    keys.reverse();
    keys
}

/// Add `uuid`'s claim of `r`, splitting stored ranges so the partition
/// stays disjoint. Touched sub-ranges accumulate in `touched`.
fn add_range(index: &mut RangeIndex, r: VlanRange, uuid: &str, touched: &mut BTreeSet<VlanRange>) {
    let overlapped = overlapping_keys(index, r);
    // cursor is u32 so it can pass u16::MAX when a range ends there
    let mut cursor = u32::from(r.start);
    for key in overlapped {
        let Some(members) = index.remove(&key) else {
            continue;
        };
        touched.insert(key);
        if key.start < r.start {
            let prefix = VlanRange::new(key.start, r.start - 1);
            touched.insert(prefix);
            index.insert(prefix, members.clone());
        }
        let overlap_start = key.start.max(r.start);
        if u32::from(overlap_start) > cursor {
            let gap = VlanRange::new(cursor as u16, overlap_start - 1);
            touched.insert(gap);
            index.insert(gap, HashSet::from([uuid.to_string()]));
        }
        let overlap_end = key.end.min(r.end);
        let overlap = VlanRange::new(overlap_start, overlap_end);
        let mut with_uuid = members.clone();
        with_uuid.insert(uuid.to_string());
        touched.insert(overlap);
        index.insert(overlap, with_uuid);
        if key.end > r.end {
            let suffix = VlanRange::new(r.end + 1, key.end);
            touched.insert(suffix);
            index.insert(suffix, members);
        }
        cursor = u32::from(overlap_end) + 1;
    }
    if cursor <= u32::from(r.end) {
        let tail = VlanRange::new(cursor as u16, r.end);
        touched.insert(tail);
        index.insert(tail, HashSet::from([uuid.to_string()]));
    }
}

/// Remove `uuid` from every stored range overlapping `r`, dropping emptied
/// entries and re-merging adjacent ranges left with identical member sets.
fn remove_range(
    index: &mut RangeIndex,
    r: VlanRange,
    uuid: &str,
    touched: &mut BTreeSet<VlanRange>,
) {
    for key in overlapping_keys(index, r) {
        let mut emptied = false;
        if let Some(members) = index.get_mut(&key) {
            if members.remove(uuid) {
                touched.insert(key);
                emptied = members.is_empty();
            }
        }
        if emptied {
            index.remove(&key);
        }
    }
    coalesce_around(index, r, touched);
}

/// Merge runs of adjacent stored ranges with identical member sets in the
/// neighborhood of `r`.
fn coalesce_around(index: &mut RangeIndex, r: VlanRange, touched: &mut BTreeSet<VlanRange>) {
    let lo = r.start.saturating_sub(1);
    let hi = r.end.saturating_add(1);
    let neighborhood = VlanRange::new(lo, hi);
    let keys = overlapping_keys(index, neighborhood);

    let mut run: Vec<VlanRange> = Vec::with_capacity(keys.len());
    for key in keys {
        let merge = run.last().is_some_and(|prev| {
            u32::from(prev.end) + 1 == u32::from(key.start) && index.get(prev) == index.get(&key)
        });
        if merge {
            if let Some(prev) = run.pop() {
                if let Some(members) = index.remove(&key) {
                    index.remove(&prev);
                    let merged = VlanRange::new(prev.start, key.end);
                    index.insert(merged, members);
                    touched.insert(prev);
                    touched.insert(key);
                    touched.insert(merged);
                    run.push(merged);
                }
            }
        } else {
            run.push(key);
        }
    }
}

#[derive(Default)]
struct ManagerState {
    ifaces: HashMap<String, Arc<LearningBridgeIface>>,
    iface_index: HashMap<String, HashSet<String>>,
    range_index: RangeIndex,
}

/// The learning-bridge manager.
#[derive(Default)]
pub struct LearningBridgeManager {
    state: Mutex<ManagerState>,
    listeners: Mutex<Vec<Arc<dyn LearningBridgeListener>>>,
}

impl LearningBridgeManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register_listener(&self, listener: Arc<dyn LearningBridgeListener>) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(listener);
        }
    }

    pub fn unregister_listener(&self, listener: &Arc<dyn LearningBridgeListener>) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.retain(|l| !Arc::ptr_eq(l, listener));
        }
    }

    fn notify(&self, uuid: &str, touched: BTreeSet<VlanRange>) {
        let listeners = match self.listeners.lock() {
            Ok(listeners) => listeners.clone(),
            Err(_) => return,
        };
        for listener in &listeners {
            listener.lb_iface_updated(uuid);
        }
        for range in touched {
            for listener in &listeners {
                listener.lb_vlan_updated(range);
            }
        }
    }

    /// Upsert an interface, atomically replacing its VLAN claims.
    pub fn update_iface(&self, iface: LearningBridgeIface) {
        let uuid = iface.uuid.clone();
        let mut touched = BTreeSet::new();
        if let Ok(mut state) = self.state.lock() {
            if let Some(old) = state.ifaces.get(&uuid).cloned() {
                if old.interface_name != iface.interface_name {
                    if let Some(name) = &old.interface_name {
                        if let Some(set) = state.iface_index.get_mut(name) {
                            set.remove(&uuid);
                            if set.is_empty() {
                                state.iface_index.remove(name);
                            }
                        }
                    }
                }
                if old.trunk_vlans != iface.trunk_vlans {
                    for range in &old.trunk_vlans {
                        remove_range(&mut state.range_index, *range, &uuid, &mut touched);
                    }
                }
            }
            if let Some(name) = &iface.interface_name {
                state
                    .iface_index
                    .entry(name.clone())
                    .or_default()
                    .insert(uuid.clone());
            }
            for range in &iface.trunk_vlans {
                add_range(&mut state.range_index, *range, &uuid, &mut touched);
            }
            debug!(
                uuid = uuid.as_str(),
                ranges = iface.trunk_vlans.len(),
                "updated learning bridge iface"
            );
            state.ifaces.insert(uuid.clone(), Arc::new(iface));
        }
        self.notify(&uuid, touched);
    }

    /// Remove an interface and all of its VLAN claims.
    pub fn remove_iface(&self, uuid: &str) {
        let mut touched = BTreeSet::new();
        if let Ok(mut state) = self.state.lock() {
            if let Some(old) = state.ifaces.remove(uuid) {
                if let Some(name) = &old.interface_name {
                    if let Some(set) = state.iface_index.get_mut(name) {
                        set.remove(uuid);
                        if set.is_empty() {
                            state.iface_index.remove(name);
                        }
                    }
                }
                for range in &old.trunk_vlans {
                    remove_range(&mut state.range_index, *range, uuid, &mut touched);
                }
            }
        }
        self.notify(uuid, touched);
    }

    pub fn get_iface(&self, uuid: &str) -> Option<Arc<LearningBridgeIface>> {
        let state = self.state.lock().ok()?;
        state.ifaces.get(uuid).cloned()
    }

    pub fn ifaces_by_name(&self, name: &str) -> HashSet<String> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.iface_index.get(name).cloned())
            .unwrap_or_default()
    }

    /// Member set of the stored sub-range exactly equal to `range`; a query
    /// spanning several stored sub-ranges returns empty.
    pub fn ifaces_by_vlan_range(&self, range: VlanRange) -> HashSet<String> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.range_index.get(&range).cloned())
            .unwrap_or_default()
    }

    /// Every stored sub-range whose member set contains `uuid`.
    pub fn vlan_ranges_by_iface(&self, uuid: &str) -> BTreeSet<VlanRange> {
        self.state
            .lock()
            .ok()
            .map(|s| {
                s.range_index
                    .iter()
                    .filter(|(_, members)| members.contains(uuid))
                    .map(|(range, _)| *range)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Visit every stored sub-range and its member set.
    pub fn for_each_vlan_range(&self, mut f: impl FnMut(VlanRange, &HashSet<String>)) {
        if let Ok(state) = self.state.lock() {
            for (range, members) in &state.range_index {
                f(*range, members);
            }
        }
    }
}
