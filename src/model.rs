//! Domain types — subscribers, quotes, feedback, and the fixed choice sets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Platform identity of a subscriber (Telegram user id).
///
/// For private chats this doubles as the chat id, which is where the bot
/// sends both dialogue replies and scheduled deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriberId(pub i64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Quote categories a subscriber can choose from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Happiness,
    Love,
    Hope,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Happiness, Category::Love, Category::Hope];

    /// Stable identifier used in control tokens and DB rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Happiness => "happiness",
            Self::Love => "love",
            Self::Hope => "hope",
        }
    }

    /// Button/confirmation label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Happiness => "Happiness 🤗",
            Self::Love => "Love ❤️",
            Self::Hope => "Hope 🌈",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "happiness" => Some(Self::Happiness),
            "love" => Some(Self::Love),
            "hope" => Some(Self::Hope),
            _ => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The fixed delivery times offered during onboarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryHour {
    Morning,
    Noon,
    Evening,
}

impl DeliveryHour {
    pub const ALL: [DeliveryHour; 3] = [
        DeliveryHour::Morning,
        DeliveryHour::Noon,
        DeliveryHour::Evening,
    ];

    /// Hour of day (24h clock) the delivery job fires at.
    pub fn hour(&self) -> u8 {
        match self {
            Self::Morning => 8,
            Self::Noon => 12,
            Self::Evening => 18,
        }
    }

    /// Button label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Morning => "8:00 🕗",
            Self::Noon => "12:00 🕛",
            Self::Evening => "18:00 🕕",
        }
    }

    /// "08:00"-style label for confirmations.
    pub fn clock(&self) -> &'static str {
        match self {
            Self::Morning => "08:00",
            Self::Noon => "12:00",
            Self::Evening => "18:00",
        }
    }

    pub fn from_hour(hour: u8) -> Option<Self> {
        match hour {
            8 => Some(Self::Morning),
            12 => Some(Self::Noon),
            18 => Some(Self::Evening),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeliveryHour {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.clock())
    }
}

/// Coarse quote rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Excellent,
    Good,
    Bad,
}

impl Rating {
    pub const ALL: [Rating; 3] = [Rating::Excellent, Rating::Good, Rating::Bad];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Bad => "bad",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Excellent => "Excellent 🌟",
            Self::Good => "Good 👍",
            Self::Bad => "Bad 👎",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "excellent" => Some(Self::Excellent),
            "good" => Some(Self::Good),
            "bad" => Some(Self::Bad),
            _ => None,
        }
    }

    /// The clarification options for this rating, in render order.
    pub fn clarifications(&self) -> [ClarificationTag; 3] {
        use ClarificationTag::*;
        match self {
            Self::Excellent => [SpotOn, MadeMyDay, BeautifulWords],
            Self::Good => [LikedTopic, BitLong, SeenBetter],
            Self::Bad => [BadMood, OffTopic, PoorQuality],
        }
    }
}

impl std::fmt::Display for Rating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rating-specific clarification reason. Each tag belongs to exactly one
/// rating, so a tag can never be mistaken for another rating's option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClarificationTag {
    // excellent
    SpotOn,
    MadeMyDay,
    BeautifulWords,
    // good
    LikedTopic,
    BitLong,
    SeenBetter,
    // bad
    BadMood,
    OffTopic,
    PoorQuality,
}

impl ClarificationTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SpotOn => "spot_on",
            Self::MadeMyDay => "made_my_day",
            Self::BeautifulWords => "beautiful_words",
            Self::LikedTopic => "liked_topic",
            Self::BitLong => "bit_long",
            Self::SeenBetter => "seen_better",
            Self::BadMood => "bad_mood",
            Self::OffTopic => "off_topic",
            Self::PoorQuality => "poor_quality",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::SpotOn => "Spot on 🎯",
            Self::MadeMyDay => "Made my day ☀️",
            Self::BeautifulWords => "Beautiful words ✨",
            Self::LikedTopic => "Liked the topic",
            Self::BitLong => "A bit long",
            Self::SeenBetter => "Seen better",
            Self::BadMood => "Not in the mood",
            Self::OffTopic => "Off topic",
            Self::PoorQuality => "Poorly written",
        }
    }

    /// The rating this tag clarifies.
    pub fn rating(&self) -> Rating {
        match self {
            Self::SpotOn | Self::MadeMyDay | Self::BeautifulWords => Rating::Excellent,
            Self::LikedTopic | Self::BitLong | Self::SeenBetter => Rating::Good,
            Self::BadMood | Self::OffTopic | Self::PoorQuality => Rating::Bad,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "spot_on" => Some(Self::SpotOn),
            "made_my_day" => Some(Self::MadeMyDay),
            "beautiful_words" => Some(Self::BeautifulWords),
            "liked_topic" => Some(Self::LikedTopic),
            "bit_long" => Some(Self::BitLong),
            "seen_better" => Some(Self::SeenBetter),
            "bad_mood" => Some(Self::BadMood),
            "off_topic" => Some(Self::OffTopic),
            "poor_quality" => Some(Self::PoorQuality),
            _ => None,
        }
    }
}

impl std::fmt::Display for ClarificationTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A persisted subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub name: String,
    pub category: Category,
    pub hour: DeliveryHour,
    pub created_at: DateTime<Utc>,
}

impl Subscriber {
    pub fn new(id: SubscriberId, name: impl Into<String>, category: Category, hour: DeliveryHour) -> Self {
        Self {
            id,
            name: name.into(),
            category,
            hour,
            created_at: Utc::now(),
        }
    }
}

/// A quote from the content store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub id: Uuid,
    pub category: Category,
    pub content: String,
    pub author: Option<String>,
}

impl Quote {
    pub fn new(category: Category, content: impl Into<String>, author: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4(),
            category,
            content: content.into(),
            author: author.map(String::from),
        }
    }
}

/// A feedback record, tied to the exact quote delivered at firing time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub id: Uuid,
    pub subscriber_id: SubscriberId,
    pub quote_id: Uuid,
    pub rating: Rating,
    pub clarification: Option<ClarificationTag>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Set once the comment step resolves; finalized rows are never mutated.
    pub finalized_at: Option<DateTime<Utc>>,
}
