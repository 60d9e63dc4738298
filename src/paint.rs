//! Painted-facet annotations
//!
//! Interactive painting tools mark individual triangles of a volume as
//! support enforcers/blockers, seam preferences, or multi-material
//! segmentation targets. The marks are stored sparsely per triangle as a
//! bitstream of 4-bit groups, with a compact hexadecimal string form per
//! triangle used by project-file round-tripping; the layout of those hex
//! strings is a file-format compatibility surface and must not change.
//!
//! Annotations written through this crate encode one 4-bit group per facet
//! holding the facet's [`FacetState`] code. Longer payloads (recursive
//! triangle-split trees produced by finer-grained painters) round-trip
//! through the hex codec byte-exactly but are treated as opaque beyond
//! their leading group.
//!
//! Annotations are first-class entities: each carries an [`ObjectId`] that
//! copy operations preserve, and a [`Timestamp`] bumped by every mutation so
//! consumers detect changes by timestamp comparison instead of
//! deep-comparing bitstreams.

use crate::id::{ObjectId, Timestamp};

/// Per-facet paint state, 4 bits on the wire
///
/// Code 0 is unpainted. For support and seam annotations codes 1 and 2 are
/// the enforcer/blocker marks; for multi-material segmentation code `k`
/// assigns the facet to extruder `k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FacetState(u8);

impl FacetState {
    /// Unpainted
    pub const NONE: FacetState = FacetState(0);
    /// Enforcer mark (force supports / seam here)
    pub const ENFORCER: FacetState = FacetState(1);
    /// Blocker mark (suppress supports / seam here)
    pub const BLOCKER: FacetState = FacetState(2);

    /// Segmentation state assigning the facet to `extruder` (1-based)
    pub fn extruder(extruder: u8) -> FacetState {
        debug_assert!(extruder >= 1 && extruder <= 15);
        FacetState(extruder & 0x0f)
    }

    /// Wire code (0..=15)
    pub fn code(self) -> u8 {
        self.0
    }

    /// True for the unpainted state
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// One painted facet's slot in the shared bitstream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct FacetMapping {
    facet_idx: u32,
    bitstream_start: usize,
}

/// Sparse per-triangle paint store with change-detection timestamp
///
/// Mappings are kept sorted by facet index; each facet owns the bitstream
/// range from its start to the next mapping's start (or the end).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FacetsAnnotation {
    id: ObjectId,
    mappings: Vec<FacetMapping>,
    bitstream: Vec<bool>,
    #[cfg_attr(feature = "serde", serde(skip))]
    timestamp: Timestamp,
}

impl Default for FacetsAnnotation {
    fn default() -> Self {
        FacetsAnnotation {
            id: ObjectId::next(),
            mappings: Vec::new(),
            bitstream: Vec::new(),
            timestamp: Timestamp::initial(),
        }
    }
}

impl FacetsAnnotation {
    /// Empty annotation with a fresh identity
    pub fn new() -> Self {
        FacetsAnnotation::default()
    }

    /// Identity of this annotation
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Give this annotation a distinct identity; used when the owning
    /// volume is cloned rather than copied
    pub fn set_new_unique_id(&mut self) {
        self.id = ObjectId::next();
    }

    /// True iff no facet carries paint data
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Change counter, bumped on every mutation
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Fast-path change check against another annotation
    pub fn timestamp_matches(&self, other: &FacetsAnnotation) -> bool {
        self.timestamp.matches(other.timestamp)
    }

    /// Content equality, ignoring timestamps
    pub fn equals(&self, other: &FacetsAnnotation) -> bool {
        self.mappings == other.mappings && self.bitstream == other.bitstream
    }

    /// Copy content and timestamp from `other`, skipping the copy entirely
    /// when the timestamps already match; the identity is not copied
    pub fn assign(&mut self, other: &FacetsAnnotation) {
        if !self.timestamp.matches(other.timestamp) {
            self.mappings = other.mappings.clone();
            self.bitstream = other.bitstream.clone();
            self.timestamp = other.timestamp;
        }
    }

    /// Clear all paint data
    ///
    /// Bumps the timestamp even though the content becomes empty: a clear
    /// must register as a change for undo/redo and background diffing.
    pub fn reset(&mut self) {
        self.mappings.clear();
        self.bitstream.clear();
        self.timestamp.touch();
    }

    /// Replace the whole annotation with the given facet states
    ///
    /// Unpainted ([`FacetState::NONE`]) entries are dropped; the rest are
    /// stored in ascending facet order, one 4-bit group each. Returns true
    /// (and bumps the timestamp) iff the stored content actually changed.
    pub fn set_facet_states(&mut self, states: &[(u32, FacetState)]) -> bool {
        let mut painted: Vec<(u32, FacetState)> = states
            .iter()
            .copied()
            .filter(|(_, state)| !state.is_none())
            .collect();
        painted.sort_by_key(|(idx, _)| *idx);
        painted.dedup_by_key(|(idx, _)| *idx);

        let mut mappings = Vec::with_capacity(painted.len());
        let mut bitstream = Vec::with_capacity(painted.len() * 4);
        for (facet_idx, state) in painted {
            mappings.push(FacetMapping {
                facet_idx,
                bitstream_start: bitstream.len(),
            });
            push_group(&mut bitstream, state.code());
        }

        if mappings != self.mappings || bitstream != self.bitstream {
            self.mappings = mappings;
            self.bitstream = bitstream;
            self.timestamp.touch();
            true
        } else {
            false
        }
    }

    /// Paint one facet in place; returns true (and bumps the timestamp)
    /// iff the stored content changed
    ///
    /// Setting [`FacetState::NONE`] removes the facet's paint. A facet
    /// that carried a multi-group payload collapses to the single new
    /// group; the payloads of all other facets survive bit-exact.
    pub fn set_facet_state(&mut self, facet_idx: u32, state: FacetState) -> bool {
        match self.find(facet_idx) {
            Some(i) => {
                let start = self.mappings[i].bitstream_start;
                let end = self
                    .mappings
                    .get(i + 1)
                    .map_or(self.bitstream.len(), |next| next.bitstream_start);
                if state.is_none() {
                    self.bitstream.drain(start..end);
                    self.mappings.remove(i);
                    for mapping in &mut self.mappings[i..] {
                        mapping.bitstream_start -= end - start;
                    }
                    self.timestamp.touch();
                    return true;
                }
                if end - start == 4 && group_value(&self.bitstream, start) == state.code() {
                    return false;
                }
                let mut group = Vec::with_capacity(4);
                push_group(&mut group, state.code());
                self.bitstream.splice(start..end, group);
                for mapping in &mut self.mappings[i + 1..] {
                    mapping.bitstream_start = mapping.bitstream_start + 4 - (end - start);
                }
                self.timestamp.touch();
                true
            }
            None => {
                if state.is_none() {
                    return false;
                }
                let i = self.mappings.partition_point(|m| m.facet_idx < facet_idx);
                let insert_at = self
                    .mappings
                    .get(i)
                    .map_or(self.bitstream.len(), |next| next.bitstream_start);
                let mut group = Vec::with_capacity(4);
                push_group(&mut group, state.code());
                self.bitstream.splice(insert_at..insert_at, group);
                self.mappings.insert(
                    i,
                    FacetMapping {
                        facet_idx,
                        bitstream_start: insert_at,
                    },
                );
                for mapping in &mut self.mappings[i + 1..] {
                    mapping.bitstream_start += 4;
                }
                self.timestamp.touch();
                true
            }
        }
    }

    /// The state of one facet; unpainted facets report [`FacetState::NONE`]
    ///
    /// For multi-group payloads this reads the leading group.
    pub fn facet_state(&self, facet_idx: u32) -> FacetState {
        match self.find(facet_idx) {
            Some(i) => FacetState(group_value(&self.bitstream, self.mappings[i].bitstream_start)),
            None => FacetState::NONE,
        }
    }

    /// Distinct non-zero leading states present, ascending
    ///
    /// For segmentation annotations this is the list of painted extruders.
    pub fn state_indices(&self) -> Vec<u8> {
        let mut states: Vec<u8> = self
            .mappings
            .iter()
            .map(|m| group_value(&self.bitstream, m.bitstream_start))
            .filter(|&code| code != 0)
            .collect();
        states.sort_unstable();
        states.dedup();
        states
    }

    /// Indices of all facets carrying paint data, ascending
    pub fn facet_indices(&self) -> Vec<u32> {
        self.mappings.iter().map(|m| m.facet_idx).collect()
    }

    /// One facet's data as a hexadecimal string, for file export
    ///
    /// One digit per 4-bit group, with the lowest group as the rightmost
    /// character. Exact inverse of [`FacetsAnnotation::set_facet_from_hex`].
    /// Returns `None` for unpainted facets.
    pub fn facet_to_hex(&self, facet_idx: u32) -> Option<String> {
        let i = self.find(facet_idx)?;
        let start = self.mappings[i].bitstream_start;
        let end = self
            .mappings
            .get(i + 1)
            .map_or(self.bitstream.len(), |next| next.bitstream_start);

        let mut out = String::new();
        let mut offset = start;
        while offset < end {
            let code = group_value(&self.bitstream, offset);
            offset += 4;
            let digit = if code < 10 {
                (b'0' + code) as char
            } else {
                (b'A' + (code - 10)) as char
            };
            out.insert(0, digit);
        }
        Some(out)
    }

    /// Append one facet's data from its hexadecimal string form
    ///
    /// Facet indices must be strictly increasing across calls (append-only
    /// decode, as produced by iterating an export). A violating or empty
    /// entry is ignored. Digits are uppercase hex; each contributes one
    /// 4-bit group, rightmost digit lowest.
    pub fn set_facet_from_hex(&mut self, facet_idx: u32, hex: &str) {
        debug_assert!(!hex.is_empty());
        let in_order = self
            .mappings
            .last()
            .map_or(true, |last| last.facet_idx < facet_idx);
        debug_assert!(in_order, "facet indices must be strictly increasing");
        if hex.is_empty() || !in_order {
            return;
        }

        self.mappings.push(FacetMapping {
            facet_idx,
            bitstream_start: self.bitstream.len(),
        });
        for ch in hex.chars().rev() {
            let code = match ch {
                '0'..='9' => ch as u8 - b'0',
                'A'..='F' => 10 + (ch as u8 - b'A'),
                _ => {
                    debug_assert!(false, "invalid hex digit {ch:?}");
                    0
                }
            };
            push_group(&mut self.bitstream, code);
        }
        self.timestamp.touch();
    }

    fn find(&self, facet_idx: u32) -> Option<usize> {
        self.mappings
            .binary_search_by_key(&facet_idx, |m| m.facet_idx)
            .ok()
    }
}

/// Append one 4-bit group, least significant bit first
fn push_group(bitstream: &mut Vec<bool>, code: u8) {
    for i in 0..4 {
        bitstream.push(code & (1 << i) != 0);
    }
}

/// Read one 4-bit group starting at `offset`
fn group_value(bitstream: &[bool], offset: usize) -> u8 {
    let mut code = 0u8;
    for i in (0..4).rev() {
        code = (code << 1) | bitstream[offset + i] as u8;
    }
    code
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_annotations_are_empty_and_matching() {
        let a = FacetsAnnotation::new();
        let b = FacetsAnnotation::new();
        assert!(a.is_empty());
        assert!(a.timestamp_matches(&b));
        assert_eq!(a.facet_state(0), FacetState::NONE);
        assert!(a.facet_to_hex(0).is_none());
    }

    #[test]
    fn test_set_facet_states_and_query() {
        let mut paint = FacetsAnnotation::new();
        let changed = paint.set_facet_states(&[
            (7, FacetState::ENFORCER),
            (2, FacetState::BLOCKER),
            (9, FacetState::NONE), // dropped
        ]);
        assert!(changed);
        assert!(!paint.is_empty());
        assert_eq!(paint.facet_indices(), vec![2, 7]);
        assert_eq!(paint.facet_state(2), FacetState::BLOCKER);
        assert_eq!(paint.facet_state(7), FacetState::ENFORCER);
        assert_eq!(paint.facet_state(9), FacetState::NONE);
        assert_eq!(paint.state_indices(), vec![1, 2]);
    }

    #[test]
    fn test_set_facet_states_detects_no_change() {
        let mut paint = FacetsAnnotation::new();
        assert!(paint.set_facet_states(&[(1, FacetState::ENFORCER)]));
        let ts = paint.timestamp();
        assert!(!paint.set_facet_states(&[(1, FacetState::ENFORCER)]));
        assert!(paint.timestamp().matches(ts));
        // An all-NONE input clears, which counts as a change
        assert!(paint.set_facet_states(&[(1, FacetState::NONE)]));
        assert!(paint.is_empty());
    }

    #[test]
    fn test_set_facet_state_inserts_updates_and_removes() {
        let mut paint = FacetsAnnotation::new();
        assert!(!paint.set_facet_state(5, FacetState::NONE));
        assert!(paint.is_empty());

        assert!(paint.set_facet_state(5, FacetState::ENFORCER));
        assert!(paint.set_facet_state(1, FacetState::BLOCKER));
        assert_eq!(paint.facet_indices(), vec![1, 5]);
        assert_eq!(paint.facet_state(1), FacetState::BLOCKER);
        assert_eq!(paint.facet_state(5), FacetState::ENFORCER);

        // Same state again is not a change.
        let ts = paint.timestamp();
        assert!(!paint.set_facet_state(5, FacetState::ENFORCER));
        assert!(paint.timestamp().matches(ts));

        assert!(paint.set_facet_state(5, FacetState::BLOCKER));
        assert_eq!(paint.facet_state(5), FacetState::BLOCKER);

        assert!(paint.set_facet_state(1, FacetState::NONE));
        assert_eq!(paint.facet_indices(), vec![5]);
        assert!(!paint.set_facet_state(1, FacetState::NONE));
    }

    #[test]
    fn test_set_facet_state_keeps_neighbor_payloads_intact() {
        let mut paint = FacetsAnnotation::new();
        paint.set_facet_from_hex(2, "9C2");
        paint.set_facet_from_hex(7, "F0A7");

        // Insert between the two multi-digit entries.
        assert!(paint.set_facet_state(4, FacetState::extruder(5)));
        assert_eq!(paint.facet_indices(), vec![2, 4, 7]);
        assert_eq!(paint.facet_to_hex(2).unwrap(), "9C2");
        assert_eq!(paint.facet_to_hex(4).unwrap(), "5");
        assert_eq!(paint.facet_to_hex(7).unwrap(), "F0A7");

        // Updating a multi-group entry collapses it to one group.
        assert!(paint.set_facet_state(2, FacetState::ENFORCER));
        assert_eq!(paint.facet_to_hex(2).unwrap(), "1");
        assert_eq!(paint.facet_to_hex(7).unwrap(), "F0A7");

        // Removing the middle entry leaves the others bit-exact.
        assert!(paint.set_facet_state(4, FacetState::NONE));
        assert_eq!(paint.facet_indices(), vec![2, 7]);
        assert_eq!(paint.facet_to_hex(7).unwrap(), "F0A7");
    }

    #[test]
    fn test_hex_digit_per_state() {
        let mut paint = FacetsAnnotation::new();
        paint.set_facet_states(&[
            (0, FacetState::ENFORCER),
            (1, FacetState::BLOCKER),
            (2, FacetState::extruder(11)),
        ]);
        assert_eq!(paint.facet_to_hex(0).unwrap(), "1");
        assert_eq!(paint.facet_to_hex(1).unwrap(), "2");
        assert_eq!(paint.facet_to_hex(2).unwrap(), "B");
    }

    #[test]
    fn test_hex_round_trip_multi_digit() {
        let mut paint = FacetsAnnotation::new();
        paint.set_facet_from_hex(3, "9C2");
        paint.set_facet_from_hex(5, "1");
        paint.set_facet_from_hex(40, "F0A7");
        assert_eq!(paint.facet_to_hex(3).unwrap(), "9C2");
        assert_eq!(paint.facet_to_hex(5).unwrap(), "1");
        assert_eq!(paint.facet_to_hex(40).unwrap(), "F0A7");
        assert_eq!(paint.facet_indices(), vec![3, 5, 40]);
        // Leading group of "9C2" is the rightmost digit
        assert_eq!(paint.facet_state(3), FacetState(2));
    }

    #[test]
    fn test_reset_clears_and_registers_as_change() {
        let mut paint = FacetsAnnotation::new();
        paint.set_facet_states(&[(4, FacetState::ENFORCER)]);
        let snapshot = paint.clone();
        paint.reset();
        assert!(paint.is_empty());
        assert!(
            !paint.timestamp_matches(&snapshot),
            "a clear must be detectable by timestamp"
        );
    }

    #[test]
    fn test_assign_copies_content_and_timestamp_but_not_id() {
        let mut source = FacetsAnnotation::new();
        source.set_facet_states(&[(1, FacetState::extruder(3))]);
        let mut target = FacetsAnnotation::new();
        let target_id = target.id();
        target.assign(&source);
        assert!(target.equals(&source));
        assert!(target.timestamp_matches(&source));
        assert_eq!(target.id(), target_id);
        assert_ne!(target.id(), source.id());
        // Assigning again is a no-op (timestamps already match)
        target.assign(&source);
        assert!(target.equals(&source));
    }

    #[test]
    fn test_state_indices_deduplicates() {
        let mut paint = FacetsAnnotation::new();
        paint.set_facet_states(&[
            (0, FacetState::extruder(2)),
            (1, FacetState::extruder(5)),
            (2, FacetState::extruder(2)),
        ]);
        assert_eq!(paint.state_indices(), vec![2, 5]);
    }
}
