use crate::identify::fragment::Element;

/// Number of tiles in the results grid. Fixed for the lifetime of the app.
pub const SLOT_COUNT: u8 = 10;

/// Identity of one grid tile, 1..=10. The string form (`slot-7`) is what goes
/// over the wire and what the endpoint echoes back as the fragment root's id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(u8);

impl SlotId {
    pub fn new(number: u8) -> Option<Self> {
        if (1..=SLOT_COUNT).contains(&number) {
            Some(Self(number))
        } else {
            None
        }
    }

    pub fn first() -> Self {
        Self(1)
    }

    pub fn number(self) -> u8 {
        self.0
    }

    /// Zero-based position in the grid's slot array.
    pub fn index(self) -> usize {
        (self.0 - 1) as usize
    }

    /// Wire identity, e.g. `slot-3`.
    pub fn element_id(self) -> String {
        format!("slot-{}", self.0)
    }

    pub fn parse_element_id(id: &str) -> Option<Self> {
        let number = id.strip_prefix("slot-")?.parse::<u8>().ok()?;
        Self::new(number)
    }
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "slot-{}", self.0)
    }
}

/// Circular pointer into the slot set. Starts at slot 1, wraps 10 -> 1.
#[derive(Debug, Clone)]
pub struct SlotCursor {
    next: u8,
}

impl SlotCursor {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// The slot the next capture will target.
    pub fn peek(&self) -> SlotId {
        SlotId(self.next)
    }

    /// Returns the current target and advances circularly. Selection and
    /// advancement are one operation so they can never be observed unpaired.
    pub fn take_next(&mut self) -> SlotId {
        let selected = SlotId(self.next);
        self.next = self.next % SLOT_COUNT + 1;
        selected
    }

    pub fn reset(&mut self) {
        self.next = 1;
    }
}

impl Default for SlotCursor {
    fn default() -> Self {
        Self::new()
    }
}

/// Scaled RGBA pixels shown in a tile while its upload is in flight.
#[derive(Debug, Clone)]
pub struct PreviewImage {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Visual state of one tile.
#[derive(Debug, Clone, Default)]
pub enum SlotState {
    #[default]
    Empty,
    /// Capture uploaded, waiting for the endpoint's answer.
    Uploading { preview: PreviewImage },
    /// The exchange failed; the preview stays visible with a failure label.
    Failed { preview: PreviewImage },
    /// Replaced by the endpoint's rendered fragment.
    Filled { fragment: Element },
}

impl SlotState {
    pub fn is_empty(&self) -> bool {
        matches!(self, SlotState::Empty)
    }

    pub fn preview(&self) -> Option<&PreviewImage> {
        match self {
            SlotState::Uploading { preview } | SlotState::Failed { preview } => Some(preview),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Slot {
    pub id: SlotId,
    pub state: SlotState,
    /// Bumped on every state change so renderers know when to rebuild
    /// textures for this tile.
    pub revision: u64,
}

/// The fixed 10-tile results grid. Tiles are mutated in place and never
/// added or removed.
#[derive(Debug)]
pub struct SlotGrid {
    slots: Vec<Slot>,
}

impl SlotGrid {
    pub fn new() -> Self {
        let slots = (1..=SLOT_COUNT)
            .map(|n| Slot {
                id: SlotId(n),
                state: SlotState::Empty,
                revision: 0,
            })
            .collect();
        Self { slots }
    }

    pub fn slot(&self, id: SlotId) -> &Slot {
        &self.slots[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter()
    }

    pub fn set_uploading(&mut self, id: SlotId, preview: PreviewImage) {
        self.set_state(id, SlotState::Uploading { preview });
    }

    /// Keeps the upload preview visible but flags the tile as failed.
    pub fn mark_failed(&mut self, id: SlotId) {
        let slot = &mut self.slots[id.index()];
        let state = std::mem::take(&mut slot.state);
        slot.state = match state {
            SlotState::Uploading { preview } => SlotState::Failed { preview },
            other => other,
        };
        slot.revision += 1;
    }

    pub fn fill(&mut self, id: SlotId, fragment: Element) {
        self.set_state(id, SlotState::Filled { fragment });
    }

    /// Resets every tile to its initial empty display.
    pub fn clear_all(&mut self) {
        for slot in &mut self.slots {
            slot.state = SlotState::Empty;
            slot.revision += 1;
        }
    }

    fn set_state(&mut self, id: SlotId, state: SlotState) {
        let slot = &mut self.slots[id.index()];
        slot.state = state;
        slot.revision += 1;
    }
}

impl Default for SlotGrid {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preview() -> PreviewImage {
        PreviewImage {
            rgba: vec![0; 16],
            width: 2,
            height: 2,
        }
    }

    #[test]
    fn test_slot_id_bounds() {
        assert!(SlotId::new(0).is_none());
        assert!(SlotId::new(1).is_some());
        assert!(SlotId::new(10).is_some());
        assert!(SlotId::new(11).is_none());
    }

    #[test]
    fn test_slot_id_element_id_round_trip() {
        let id = SlotId::new(7).unwrap();
        assert_eq!(id.element_id(), "slot-7");
        assert_eq!(SlotId::parse_element_id("slot-7"), Some(id));
        assert_eq!(SlotId::parse_element_id("slot-0"), None);
        assert_eq!(SlotId::parse_element_id("slot-11"), None);
        assert_eq!(SlotId::parse_element_id("tile-3"), None);
    }

    #[test]
    fn test_cursor_starts_at_one_and_wraps() {
        let mut cursor = SlotCursor::new();
        let order: Vec<u8> = (0..12).map(|_| cursor.take_next().number()).collect();
        assert_eq!(order, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 1, 2]);
        assert_eq!(cursor.peek().number(), 3);
    }

    #[test]
    fn test_cursor_formula_after_n_selections() {
        // After N selections the pointer is ((start - 1 + N) mod 10) + 1.
        for n in 0..25u32 {
            let mut cursor = SlotCursor::new();
            for _ in 0..n {
                cursor.take_next();
            }
            let expected = ((1 - 1 + n) % 10) + 1;
            assert_eq!(cursor.peek().number() as u32, expected, "after {} selections", n);
        }
    }

    #[test]
    fn test_cursor_reset() {
        let mut cursor = SlotCursor::new();
        for _ in 0..7 {
            cursor.take_next();
        }
        cursor.reset();
        assert_eq!(cursor.peek().number(), 1);
    }

    #[test]
    fn test_grid_starts_empty() {
        let grid = SlotGrid::new();
        assert_eq!(grid.iter().count(), 10);
        assert!(grid.iter().all(|slot| slot.state.is_empty()));
    }

    #[test]
    fn test_mark_failed_keeps_preview() {
        let mut grid = SlotGrid::new();
        let id = SlotId::new(3).unwrap();
        grid.set_uploading(id, preview());
        grid.mark_failed(id);
        match &grid.slot(id).state {
            SlotState::Failed { preview } => {
                assert_eq!(preview.width, 2);
                assert_eq!(preview.height, 2);
            }
            other => panic!("expected failed state, got {:?}", other),
        }
    }

    #[test]
    fn test_mark_failed_on_non_uploading_slot_is_noop() {
        let mut grid = SlotGrid::new();
        let id = SlotId::new(5).unwrap();
        grid.mark_failed(id);
        assert!(grid.slot(id).state.is_empty());
    }

    #[test]
    fn test_clear_resets_every_slot() {
        let mut grid = SlotGrid::new();
        grid.set_uploading(SlotId::new(2).unwrap(), preview());
        grid.set_uploading(SlotId::new(9).unwrap(), preview());
        grid.mark_failed(SlotId::new(9).unwrap());
        grid.clear_all();
        assert!(grid.iter().all(|slot| slot.state.is_empty()));
    }

    #[test]
    fn test_revision_tracks_changes() {
        let mut grid = SlotGrid::new();
        let id = SlotId::new(1).unwrap();
        let before = grid.slot(id).revision;
        grid.set_uploading(id, preview());
        assert!(grid.slot(id).revision > before);
    }
}
