use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The four fixed approaches of the intersection. Declaration order is the
/// cycling order and the tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LaneId {
    #[serde(rename = "lane_1")]
    Lane1,
    #[serde(rename = "lane_2")]
    Lane2,
    #[serde(rename = "lane_3")]
    Lane3,
    #[serde(rename = "lane_4")]
    Lane4,
}

/// Compass direction a lane approaches from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl LaneId {
    pub const ALL: [LaneId; 4] = [LaneId::Lane1, LaneId::Lane2, LaneId::Lane3, LaneId::Lane4];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Next lane in the fixed cycle, wrapping from lane 4 back to lane 1.
    pub fn next(self) -> LaneId {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    pub fn direction(self) -> Direction {
        match self {
            LaneId::Lane1 => Direction::North,
            LaneId::Lane2 => Direction::East,
            LaneId::Lane3 => Direction::South,
            LaneId::Lane4 => Direction::West,
        }
    }

    /// Road name shown to operators and in transition logs.
    pub fn label(self) -> &'static str {
        match self {
            LaneId::Lane1 => "Hitech City Main Rd",
            LaneId::Lane2 => "Gachibowli Flyover",
            LaneId::Lane3 => "Jubilee Hills Checkpost",
            LaneId::Lane4 => "Raheja Mindspace",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LaneId::Lane1 => "lane_1",
            LaneId::Lane2 => "lane_2",
            LaneId::Lane3 => "lane_3",
            LaneId::Lane4 => "lane_4",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.pad(match self {
            Direction::North => "N",
            Direction::East => "E",
            Direction::South => "S",
            Direction::West => "W",
        })
    }
}

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for LaneId {
    type Err = String;

    /// Accepts `lane_1`, `1`, or a compass letter (`n`, `e`, `s`, `w`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lane_1" | "1" | "n" | "north" => Ok(LaneId::Lane1),
            "lane_2" | "2" | "e" | "east" => Ok(LaneId::Lane2),
            "lane_3" | "3" | "s" | "south" => Ok(LaneId::Lane3),
            "lane_4" | "4" | "w" | "west" => Ok(LaneId::Lane4),
            other => Err(format!("unknown lane '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightState {
    Red,
    Green,
}

impl fmt::Display for LightState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LightState::Red => f.pad("red"),
            LightState::Green => f.pad("green"),
        }
    }
}

/// Per-lane record of the intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lane {
    pub id: LaneId,
    /// Vehicles queued on the approach.
    pub vehicle_count: u32,
    pub light_state: LightState,
    /// Seconds left in the current phase. Red lanes carry 0.
    pub timer: u32,
    /// Set while an emergency vehicle waits on this approach.
    pub is_emergency: bool,
}

impl Lane {
    /// Creates an empty red lane.
    pub fn new(id: LaneId) -> Self {
        Self {
            id,
            vehicle_count: 0,
            light_state: LightState::Red,
            timer: 0,
            is_emergency: false,
        }
    }

    pub fn is_green(&self) -> bool {
        self.light_state == LightState::Green
    }

    pub fn set_green(&mut self, timer: u32) {
        self.light_state = LightState::Green;
        self.timer = timer;
    }

    pub fn set_red(&mut self) {
        self.light_state = LightState::Red;
        self.timer = 0;
    }

    /// Adds vehicles to the queue without exceeding `cap`.
    pub fn add_vehicles(&mut self, amount: u32, cap: u32) {
        self.vehicle_count = self.vehicle_count.saturating_add(amount).min(cap);
    }

    /// Removes up to `amount` vehicles, flooring at zero.
    pub fn discharge(&mut self, amount: u32) {
        self.vehicle_count = self.vehicle_count.saturating_sub(amount);
    }
}

/// The four lane records in cycling order, all red and empty.
pub fn create_lanes() -> [Lane; 4] {
    LaneId::ALL.map(Lane::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_wraps_after_last_lane() {
        assert_eq!(LaneId::Lane1.next(), LaneId::Lane2);
        assert_eq!(LaneId::Lane3.next(), LaneId::Lane4);
        assert_eq!(LaneId::Lane4.next(), LaneId::Lane1);
    }

    #[test]
    fn directions_match_compass_spellings() {
        for lane in LaneId::ALL {
            let letter = lane.direction().to_string();
            assert_eq!(letter.parse::<LaneId>(), Ok(lane));
        }
        assert_eq!(format!("{:>3}", LaneId::Lane3.direction()), "  S");
    }

    #[test]
    fn parses_operator_spellings() {
        assert_eq!("lane_3".parse::<LaneId>(), Ok(LaneId::Lane3));
        assert_eq!(" 2 ".parse::<LaneId>(), Ok(LaneId::Lane2));
        assert_eq!("W".parse::<LaneId>(), Ok(LaneId::Lane4));
        assert!("lane_5".parse::<LaneId>().is_err());
    }

    #[test]
    fn lane_ids_serialize_with_underscores() {
        let json = serde_json::to_string(&LaneId::Lane2).unwrap();
        assert_eq!(json, "\"lane_2\"");
        let state = serde_json::to_string(&LightState::Green).unwrap();
        assert_eq!(state, "\"green\"");
    }

    #[test]
    fn counts_stay_within_cap() {
        let mut lane = Lane::new(LaneId::Lane1);
        lane.add_vehicles(48, 50);
        lane.add_vehicles(5, 50);
        assert_eq!(lane.vehicle_count, 50);
        lane.discharge(60);
        assert_eq!(lane.vehicle_count, 0);
    }
}
