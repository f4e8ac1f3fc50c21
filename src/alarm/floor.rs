use crate::core::Floor;

/// Site layout: which floor each reporting device sits on
#[derive(Debug, Clone, Default)]
pub struct FloorPlan {
    floors: Vec<Floor>,
}

impl FloorPlan {
    pub fn new(floors: Vec<Floor>) -> Self {
        FloorPlan { floors }
    }

    pub fn is_empty(&self) -> bool {
        self.floors.is_empty()
    }

    /// Floor whose buzzer or gateway has DevEUI `eui`
    pub fn floor_of(&self, eui: &str) -> Option<&Floor> {
        self.floors.iter().find(|floor| floor.has_device(eui))
    }

    pub fn floor(&self, id: &str) -> Option<&Floor> {
        self.floors.iter().find(|floor| floor.id == id)
    }

    /// A beacon is on the wrong floor only when both floors are known and differ
    pub fn is_wrong_floor(detected: Option<&Floor>, home: Option<&str>) -> bool {
        matches!((detected, home), (Some(floor), Some(home)) if floor.id != home)
    }
}
