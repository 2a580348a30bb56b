//! Inbound dialogue events and the closed control-token enumeration.
//!
//! Menu callbacks arrive as opaque strings; they are parsed into
//! [`ControlToken`] variants and dispatched through the transition table.
//! Unknown or stale tokens parse to `None` and are dropped with a debug log,
//! never pattern-matched loosely.

use std::str::FromStr;

use crate::model::{Category, ClarificationTag, DeliveryHour, Rating};
use crate::transport::MessageId;

/// A slash command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    SelectCategory,
}

impl Command {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "start" => Some(Self::Start),
            "select_category" => Some(Self::SelectCategory),
            _ => None,
        }
    }
}

/// One control on a rendered menu. Tokens are namespaced per menu so a
/// category id can never collide with a clarification tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlToken {
    Category(Category),
    Hour(DeliveryHour),
    Rating(Rating),
    Clarification(ClarificationTag),
    CommentYes,
    CommentNo,
    CommentCancel,
    CancelYes,
    CancelNo,
    Back,
}

impl ControlToken {
    /// Wire form, used as Telegram `callback_data`.
    pub fn as_token(&self) -> String {
        match self {
            Self::Category(c) => format!("cat:{c}"),
            Self::Hour(h) => format!("hour:{}", h.hour()),
            Self::Rating(r) => format!("rate:{r}"),
            Self::Clarification(t) => format!("why:{t}"),
            Self::CommentYes => "comment:yes".into(),
            Self::CommentNo => "comment:no".into(),
            Self::CommentCancel => "comment:cancel".into(),
            Self::CancelYes => "cancel:yes".into(),
            Self::CancelNo => "cancel:no".into(),
            Self::Back => "back".into(),
        }
    }
}

impl FromStr for ControlToken {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || UnknownToken(s.to_string());

        if s == "back" {
            return Ok(Self::Back);
        }
        let (namespace, value) = s.split_once(':').ok_or_else(unknown)?;
        match namespace {
            "cat" => Category::parse(value).map(Self::Category).ok_or_else(unknown),
            "hour" => value
                .parse::<u8>()
                .ok()
                .and_then(DeliveryHour::from_hour)
                .map(Self::Hour)
                .ok_or_else(unknown),
            "rate" => Rating::parse(value).map(Self::Rating).ok_or_else(unknown),
            "why" => ClarificationTag::parse(value)
                .map(Self::Clarification)
                .ok_or_else(unknown),
            "comment" => match value {
                "yes" => Ok(Self::CommentYes),
                "no" => Ok(Self::CommentNo),
                "cancel" => Ok(Self::CommentCancel),
                _ => Err(unknown()),
            },
            "cancel" => match value {
                "yes" => Ok(Self::CancelYes),
                "no" => Ok(Self::CancelNo),
                _ => Err(unknown()),
            },
            _ => Err(unknown()),
        }
    }
}

/// Error for a callback string outside the closed enumeration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown control token: {0}")]
pub struct UnknownToken(pub String);

/// A dialogue event, after transport normalization and token parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Command(Command),
    /// A menu selection plus the message it came from.
    Control(ControlToken, MessageId),
    /// A free-text message.
    Text(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_wire_roundtrip() {
        let tokens = [
            ControlToken::Category(Category::Love),
            ControlToken::Hour(DeliveryHour::Noon),
            ControlToken::Rating(Rating::Bad),
            ControlToken::Clarification(ClarificationTag::BadMood),
            ControlToken::CommentYes,
            ControlToken::CommentNo,
            ControlToken::CommentCancel,
            ControlToken::CancelYes,
            ControlToken::CancelNo,
            ControlToken::Back,
        ];
        for token in tokens {
            let wire = token.as_token();
            assert_eq!(wire.parse::<ControlToken>().unwrap(), token, "{wire}");
        }
    }

    #[test]
    fn unknown_tokens_rejected() {
        for raw in ["", "category1", "cat:despair", "hour:9", "rate:ok", "why:meh", "cancel:maybe", "noise"] {
            assert!(raw.parse::<ControlToken>().is_err(), "{raw:?} should not parse");
        }
    }

    #[test]
    fn category_token_cannot_collide_with_clarification() {
        // Same value under different namespaces parses to different variants.
        let cat: ControlToken = "cat:love".parse().unwrap();
        assert!(matches!(cat, ControlToken::Category(Category::Love)));
        assert!("why:love".parse::<ControlToken>().is_err());
    }

    #[test]
    fn command_parse() {
        assert_eq!(Command::parse("start"), Some(Command::Start));
        assert_eq!(Command::parse("select_category"), Some(Command::SelectCategory));
        assert_eq!(Command::parse("help"), None);
    }
}
