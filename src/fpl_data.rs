use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Position {
    Goalkeeper,
    Defender,
    Midfielder,
    Forward,
}

impl Position {
    pub const ALL: [Position; 4] = [
        Position::Goalkeeper,
        Position::Defender,
        Position::Midfielder,
        Position::Forward,
    ];

    pub fn from_element_type(code: u32) -> Option<Self> {
        match code {
            1 => Some(Position::Goalkeeper),
            2 => Some(Position::Defender),
            3 => Some(Position::Midfielder),
            4 => Some(Position::Forward),
            _ => None,
        }
    }

    pub fn element_type(self) -> u32 {
        match self {
            Position::Goalkeeper => 1,
            Position::Defender => 2,
            Position::Midfielder => 3,
            Position::Forward => 4,
        }
    }

    pub fn feature_group(self) -> FeatureGroup {
        match self {
            Position::Goalkeeper => FeatureGroup::Goalkeeper,
            Position::Defender => FeatureGroup::Defender,
            Position::Midfielder | Position::Forward => FeatureGroup::Attacker,
        }
    }

    pub fn plural(self) -> &'static str {
        match self {
            Position::Goalkeeper => "goalkeepers",
            Position::Defender => "defenders",
            Position::Midfielder => "midfielders",
            Position::Forward => "forwards",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Position::Goalkeeper => "goalkeeper",
            Position::Defender => "defender",
            Position::Midfielder => "midfielder",
            Position::Forward => "forward",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureGroup {
    Goalkeeper,
    Defender,
    Attacker,
}

impl FeatureGroup {
    pub fn is_goalkeeper(self) -> bool {
        matches!(self, FeatureGroup::Goalkeeper)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PlayerStatus {
    Available,
    Doubtful,
    Injured,
    Suspended,
    NotInSquad,
    Unavailable,
    Other(String),
}

impl PlayerStatus {
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "a" => PlayerStatus::Available,
            "d" => PlayerStatus::Doubtful,
            "i" => PlayerStatus::Injured,
            "s" => PlayerStatus::Suspended,
            "n" => PlayerStatus::NotInSquad,
            "u" => PlayerStatus::Unavailable,
            other => PlayerStatus::Other(other.to_string()),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, PlayerStatus::Available)
    }

    pub fn is_ruled_out(&self) -> bool {
        matches!(
            self,
            PlayerStatus::Injured
                | PlayerStatus::Suspended
                | PlayerStatus::NotInSquad
                | PlayerStatus::Unavailable
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Venue {
    Home,
    Away,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SideStrength {
    pub strength: f64,
    pub overall: f64,
    pub attack: f64,
    pub defence: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Team {
    pub id: u32,
    pub name: String,
    pub short_name: String,
    pub strength: f64,
    pub strength_overall_home: f64,
    pub strength_overall_away: f64,
    pub strength_attack_home: f64,
    pub strength_attack_away: f64,
    pub strength_defence_home: f64,
    pub strength_defence_away: f64,
}

impl Team {
    pub fn side(&self, venue: Venue) -> SideStrength {
        match venue {
            Venue::Home => SideStrength {
                strength: self.strength,
                overall: self.strength_overall_home,
                attack: self.strength_attack_home,
                defence: self.strength_defence_home,
            },
            Venue::Away => SideStrength {
                strength: self.strength,
                overall: self.strength_overall_away,
                attack: self.strength_attack_away,
                defence: self.strength_defence_away,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fixture {
    pub id: u32,
    pub event: Option<u32>,
    pub team_h: u32,
    pub team_a: u32,
    pub finished: bool,
    pub kickoff_time: Option<String>,
}

impl Fixture {
    pub fn venue_of(&self, team_id: u32) -> Option<Venue> {
        if team_id == self.team_h {
            Some(Venue::Home)
        } else if team_id == self.team_a {
            Some(Venue::Away)
        } else {
            None
        }
    }

    pub fn opponent_of(&self, team_id: u32) -> Option<u32> {
        match self.venue_of(team_id)? {
            Venue::Home => Some(self.team_a),
            Venue::Away => Some(self.team_h),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub id: u32,
    pub position: Position,
    pub web_name: String,
    pub team: u32,
    pub points_per_game: f64,
    pub will_play: f64,
}

/// Inclusive, non-empty gameweek range. Only built through [`GameweekRange::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GameweekRange {
    start: u32,
    end: u32,
}

impl GameweekRange {
    pub fn new(start: u32, end: u32) -> PipelineResult<Self> {
        if start == 0 || end < start {
            return Err(PipelineError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn single(gameweek: u32) -> PipelineResult<Self> {
        Self::new(gameweek, gameweek)
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> {
        self.start..=self.end
    }
}
