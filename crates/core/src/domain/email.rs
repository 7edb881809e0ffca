use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::domain::session::SessionId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailId(pub i64);

impl fmt::Display for EmailId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Triage priority. Variant order is the display order: `Urgent` sorts first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Urgent,
    High,
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 4] = [Self::Urgent, Self::High, Self::Medium, Self::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Urgent => "URGENT",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

impl FromStr for Priority {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize_token(value).as_str() {
            "URGENT" => Ok(Self::Urgent),
            "HIGH" => Ok(Self::High),
            "MEDIUM" => Ok(Self::Medium),
            "LOW" => Ok(Self::Low),
            _ => Err(DomainError::UnknownPriority(value.to_owned())),
        }
    }
}

/// Mailbox category. The first six are the documented classification; `Job`,
/// `Linkedin` and `Professional` are what the summarizer writes in practice
/// and are stored lowercase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    Work,
    Personal,
    Marketing,
    Newsletter,
    Notification,
    Support,
    Job,
    Linkedin,
    Professional,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Work => "WORK",
            Self::Personal => "PERSONAL",
            Self::Marketing => "MARKETING",
            Self::Newsletter => "NEWSLETTER",
            Self::Notification => "NOTIFICATION",
            Self::Support => "SUPPORT",
            Self::Job => "job",
            Self::Linkedin => "linkedin",
            Self::Professional => "professional",
        }
    }
}

impl FromStr for Category {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize_token(value).as_str() {
            "WORK" => Ok(Self::Work),
            "PERSONAL" => Ok(Self::Personal),
            "MARKETING" => Ok(Self::Marketing),
            "NEWSLETTER" => Ok(Self::Newsletter),
            "NOTIFICATION" => Ok(Self::Notification),
            "SUPPORT" => Ok(Self::Support),
            "JOB" => Ok(Self::Job),
            "LINKEDIN" => Ok(Self::Linkedin),
            "PROFESSIONAL" => Ok(Self::Professional),
            _ => Err(DomainError::UnknownCategory(value.to_owned())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EmailType {
    ResponseNeeded,
    Informational,
    Urgent,
    Meeting,
    Task,
}

impl EmailType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResponseNeeded => "RESPONSE_NEEDED",
            Self::Informational => "INFORMATIONAL",
            Self::Urgent => "URGENT",
            Self::Meeting => "MEETING",
            Self::Task => "TASK",
        }
    }
}

impl FromStr for EmailType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize_token(value).as_str() {
            "RESPONSE_NEEDED" => Ok(Self::ResponseNeeded),
            "INFORMATIONAL" => Ok(Self::Informational),
            "URGENT" => Ok(Self::Urgent),
            "MEETING" => Ok(Self::Meeting),
            "TASK" => Ok(Self::Task),
            _ => Err(DomainError::UnknownEmailType(value.to_owned())),
        }
    }
}

macro_rules! string_enum_serde {
    ($($name:ident),+) => {
        $(
            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_str())
                }
            }

            impl Serialize for $name {
                fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
                where
                    S: Serializer,
                {
                    serializer.serialize_str(self.as_str())
                }
            }

            impl<'de> Deserialize<'de> for $name {
                fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
                where
                    D: Deserializer<'de>,
                {
                    let raw = String::deserialize(deserializer)?;
                    raw.parse().map_err(serde::de::Error::custom)
                }
            }
        )+
    };
}

string_enum_serde!(Priority, Category, EmailType);

/// A single summarized email as stored in `email_summaries`.
///
/// `category`, `email_type` and `action_needed` are optional: the summarizer
/// leaves them out for some mail, and values outside the known vocabulary are
/// read as absent rather than failing the whole row. Every other field is
/// required.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailRecord {
    pub id: EmailId,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub sender: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub company: String,
    pub subject: String,
    #[serde(default, deserialize_with = "lenient_option")]
    pub category: Option<Category>,
    #[serde(rename = "type", default, deserialize_with = "lenient_option")]
    pub email_type: Option<EmailType>,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub action_needed: Option<String>,
    pub session_id: SessionId,
}

fn normalize_token(value: &str) -> String {
    value.trim().replace([' ', '-'], "_").to_ascii_uppercase()
}

fn lenient_option<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| value.parse().ok()))
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|value| !value.trim().is_empty()))
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::{Category, EmailRecord, EmailType, Priority};

    #[test]
    fn priority_total_order_puts_urgent_first() {
        let mut priorities = vec![Priority::Low, Priority::Urgent, Priority::Medium, Priority::High];
        priorities.sort();
        assert_eq!(priorities, Priority::ALL.to_vec());
    }

    #[test]
    fn enum_parsing_is_case_insensitive() {
        assert_eq!("urgent".parse::<Priority>().expect("priority"), Priority::Urgent);
        assert_eq!("LinkedIn".parse::<Category>().expect("category"), Category::Linkedin);
        assert_eq!(
            "response needed".parse::<EmailType>().expect("type"),
            EmailType::ResponseNeeded
        );
        assert!("critical".parse::<Priority>().is_err());
    }

    #[test]
    fn decodes_row_with_summarizer_vocabulary() {
        let record: EmailRecord = serde_json::from_str(
            r#"{
                "id": 7,
                "sender": "Dana Recruiter",
                "company": "Initech",
                "subject": "Interview availability",
                "category": "job",
                "type": "interview",
                "priority": "URGENT",
                "created_at": "2026-10-18T09:30:00.123456+00:00",
                "action_needed": "Reply with two time slots",
                "session_id": 3
            }"#,
        )
        .expect("decode email");

        assert_eq!(record.category, Some(Category::Job));
        assert_eq!(record.email_type, None, "unknown type vocabulary reads as absent");
        assert_eq!(record.priority, Priority::Urgent);
        assert_eq!(record.action_needed.as_deref(), Some("Reply with two time slots"));
    }

    #[test]
    fn missing_optional_fields_decode_as_none() {
        let record: EmailRecord = serde_json::from_str(
            r#"{
                "id": 8,
                "sender": null,
                "company": "Globex",
                "subject": "Weekly digest",
                "priority": "low",
                "created_at": "2026-10-18T09:30:00Z",
                "action_needed": "  ",
                "session_id": 3
            }"#,
        )
        .expect("decode email");

        assert_eq!(record.sender, "");
        assert_eq!(record.category, None);
        assert_eq!(record.email_type, None);
        assert_eq!(record.action_needed, None);
    }

    #[test]
    fn unknown_priority_fails_the_row() {
        let result = serde_json::from_str::<EmailRecord>(
            r#"{
                "id": 9,
                "sender": "x",
                "company": "y",
                "subject": "z",
                "priority": "SOMEDAY",
                "created_at": "2026-10-18T09:30:00Z",
                "session_id": 3
            }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn category_serializes_to_stored_form() {
        assert_eq!(serde_json::to_string(&Category::Job).expect("json"), "\"job\"");
        assert_eq!(serde_json::to_string(&Category::Work).expect("json"), "\"WORK\"");
    }
}
