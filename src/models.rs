use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Draft,
    Published,
    Cancelled,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Draft => "draft",
            EventStatus::Published => "published",
            EventStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(EventStatus::Draft),
            "published" => Some(EventStatus::Published),
            "cancelled" => Some(EventStatus::Cancelled),
            _ => None,
        }
    }

    /// `cancelled` is terminal; `published` can only move to `cancelled`.
    pub fn can_become(&self, next: EventStatus) -> bool {
        matches!(
            (self, next),
            (EventStatus::Draft, EventStatus::Published)
                | (EventStatus::Draft, EventStatus::Cancelled)
                | (EventStatus::Published, EventStatus::Cancelled)
        )
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleNeed {
    pub role: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub title: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub location: String,
    pub description: String,
    pub status: EventStatus,
    pub roles_needed: Vec<RoleNeed>,
    pub assigned_uids: Vec<String>,
    pub client_id: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RsvpStatus {
    Accepted,
    Declined,
    Tentative,
    Unanswered,
}

impl RsvpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RsvpStatus::Accepted => "accepted",
            RsvpStatus::Declined => "declined",
            RsvpStatus::Tentative => "tentative",
            RsvpStatus::Unanswered => "unanswered",
        }
    }

    /// Accepts both the current vocabulary and the legacy `yes|no|maybe` one.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "accepted" | "yes" => Some(RsvpStatus::Accepted),
            "declined" | "no" => Some(RsvpStatus::Declined),
            "tentative" | "maybe" => Some(RsvpStatus::Tentative),
            "unanswered" => Some(RsvpStatus::Unanswered),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rsvp {
    pub uid: String,
    pub display_name: Option<String>,
    pub role: Option<String>,
    pub status: RsvpStatus,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RsvpInput {
    pub uid: String,
    pub display_name: Option<String>,
    pub role: Option<String>,
    pub status: RsvpStatus,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Admin,
    Performer,
    #[default]
    Member,
}

impl MemberRole {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(MemberRole::Admin),
            "performer" => Some(MemberRole::Performer),
            "member" => Some(MemberRole::Member),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub section: Option<String>,
    pub role: MemberRole,
    pub updated_at: Option<DateTime<Utc>>,
}
