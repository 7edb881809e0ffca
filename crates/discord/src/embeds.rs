use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

use mailbrief_core::digest::Digest;
use mailbrief_core::domain::email::{Category, EmailRecord, EmailType, Priority};
use mailbrief_core::domain::session::SummarySession;
use mailbrief_core::pagination::{Navigation, PaginationState};
use mailbrief_core::query::SummaryFilter;

use crate::pagination::custom_id;

pub const OVERVIEW_SUBJECT_CHARS: usize = 40;
pub const DIGEST_SUBJECT_CHARS: usize = 50;

/// Message flag that limits visibility to the invoking user.
pub const EPHEMERAL_FLAG: u64 = 1 << 6;

// Discord rejects the whole message when any of these is exceeded.
const TITLE_LIMIT: usize = 256;
const DESCRIPTION_LIMIT: usize = 4096;
const FIELD_NAME_LIMIT: usize = 256;
const FIELD_VALUE_LIMIT: usize = 1024;
const FOOTER_LIMIT: usize = 2048;

const SUMMARY_COLOR: u32 = 0x0099FF;
const URGENT_DIGEST_COLOR: u32 = 0xFF0000;
const CALM_DIGEST_COLOR: u32 = 0x00FF00;
const ERROR_COLOR: u32 = 0x808080;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl Embed {
    pub fn field(&self, name_fragment: &str) -> Option<&EmbedField> {
        self.fields.iter().find(|field| field.name.contains(name_fragment))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ButtonStyle {
    Primary,
    Secondary,
    Danger,
}

impl Serialize for ButtonStyle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let code = match self {
            Self::Primary => 1,
            Self::Secondary => 2,
            Self::Danger => 4,
        };
        serializer.serialize_u8(code)
    }
}

const BUTTON_COMPONENT: u8 = 2;
const ACTION_ROW_COMPONENT: u8 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ButtonComponent {
    #[serde(rename = "type")]
    pub kind: u8,
    pub style: ButtonStyle,
    pub label: String,
    pub custom_id: String,
    pub disabled: bool,
}

impl ButtonComponent {
    pub fn new(custom_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            kind: BUTTON_COMPONENT,
            style: ButtonStyle::Secondary,
            label: label.into(),
            custom_id: custom_id.into(),
            disabled: false,
        }
    }

    pub fn style(mut self, style: ButtonStyle) -> Self {
        self.style = style;
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ActionRow {
    #[serde(rename = "type")]
    pub kind: u8,
    pub components: Vec<ButtonComponent>,
}

/// Body shared by interaction responses, webhook edits and channel messages.
/// `embeds` and `components` always serialize so an edit clears stale ones.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub embeds: Vec<Embed>,
    pub components: Vec<ActionRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<u64>,
}

impl MessageTemplate {
    pub fn is_ephemeral(&self) -> bool {
        self.flags.is_some_and(|flags| flags & EPHEMERAL_FLAG != 0)
    }

    pub fn buttons(&self) -> impl Iterator<Item = &ButtonComponent> {
        self.components.iter().flat_map(|row| row.components.iter())
    }
}

#[derive(Default)]
pub struct MessageBuilder {
    content: Option<String>,
    embeds: Vec<Embed>,
    components: Vec<ActionRow>,
    flags: Option<u64>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn embed<F>(mut self, build: F) -> Self
    where
        F: FnOnce(&mut EmbedBuilder),
    {
        let mut builder = EmbedBuilder::default();
        build(&mut builder);
        self.embeds.push(builder.build());
        self
    }

    pub fn action_row<F>(mut self, build: F) -> Self
    where
        F: FnOnce(&mut ActionRowBuilder),
    {
        let mut builder = ActionRowBuilder::default();
        build(&mut builder);
        self.components.push(builder.build());
        self
    }

    pub fn ephemeral(mut self) -> Self {
        self.flags = Some(self.flags.unwrap_or_default() | EPHEMERAL_FLAG);
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate {
            content: self.content,
            embeds: self.embeds,
            components: self.components,
            flags: self.flags,
        }
    }
}

#[derive(Default)]
pub struct EmbedBuilder {
    embed: Embed,
}

impl EmbedBuilder {
    pub fn title(&mut self, title: impl Into<String>) -> &mut Self {
        self.embed.title = Some(clamp_chars(title.into(), TITLE_LIMIT));
        self
    }

    pub fn description(&mut self, description: impl Into<String>) -> &mut Self {
        self.embed.description = Some(clamp_chars(description.into(), DESCRIPTION_LIMIT));
        self
    }

    pub fn color(&mut self, color: u32) -> &mut Self {
        self.embed.color = Some(color);
        self
    }

    pub fn field(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        inline: bool,
    ) -> &mut Self {
        self.embed.fields.push(EmbedField {
            name: clamp_chars(name.into(), FIELD_NAME_LIMIT),
            value: clamp_chars(value.into(), FIELD_VALUE_LIMIT),
            inline,
        });
        self
    }

    pub fn footer(&mut self, text: impl Into<String>) -> &mut Self {
        self.embed.footer = Some(EmbedFooter { text: clamp_chars(text.into(), FOOTER_LIMIT) });
        self
    }

    pub fn timestamp(&mut self, at: DateTime<Utc>) -> &mut Self {
        self.embed.timestamp = Some(at.to_rfc3339_opts(SecondsFormat::Secs, true));
        self
    }

    fn build(self) -> Embed {
        self.embed
    }
}

#[derive(Default)]
pub struct ActionRowBuilder {
    components: Vec<ButtonComponent>,
}

impl ActionRowBuilder {
    pub fn button(&mut self, button: ButtonComponent) -> &mut Self {
        self.components.push(button);
        self
    }

    fn build(self) -> ActionRow {
        ActionRow { kind: ACTION_ROW_COMPONENT, components: self.components }
    }
}

pub fn priority_marker(priority: Priority) -> &'static str {
    match priority {
        Priority::Urgent => "🚨",
        Priority::High => "🔴",
        Priority::Medium => "🟡",
        Priority::Low => "🔵",
    }
}

pub fn priority_color(priority: Priority) -> u32 {
    match priority {
        Priority::Urgent => 0xFF0000,
        Priority::High => 0xFF6600,
        Priority::Medium => 0xFFFF00,
        Priority::Low => 0x0099FF,
    }
}

fn category_marker(category: Category) -> &'static str {
    match category {
        Category::Work => "💼",
        Category::Personal => "👤",
        Category::Marketing => "📢",
        Category::Newsletter => "📰",
        Category::Notification => "🔔",
        Category::Support => "🛠️",
        Category::Job => "💼",
        Category::Linkedin => "🔗",
        Category::Professional => "📧",
    }
}

fn type_marker(email_type: EmailType) -> &'static str {
    match email_type {
        EmailType::ResponseNeeded => "✋",
        EmailType::Informational => "ℹ️",
        EmailType::Urgent => "⚡",
        EmailType::Meeting => "📅",
        EmailType::Task => "✅",
    }
}

/// Cuts on a char boundary and marks the cut with an ellipsis.
pub fn truncate_subject(subject: &str, max_chars: usize) -> String {
    let mut chars = subject.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Keeps `text` within `limit` characters, ellipsis included.
fn clamp_chars(text: String, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text;
    }
    truncate_subject(&text, limit.saturating_sub(3))
}

fn display_or_unknown(value: &str) -> &str {
    if value.trim().is_empty() {
        "Unknown"
    } else {
        value
    }
}

fn received_at(at: DateTime<Utc>) -> String {
    at.format("%b %-d, %H:%M UTC").to_string()
}

fn overview_line(record: &EmailRecord, max_chars: usize) -> String {
    format!(
        "{} **{}** - {}",
        priority_marker(record.priority),
        display_or_unknown(&record.company),
        truncate_subject(&record.subject, max_chars)
    )
}

fn summary_title(filter: SummaryFilter) -> String {
    format!("📧 Email Summary - {}", filter.display_name())
}

pub fn overview_embed(filter: SummaryFilter, records: &[EmailRecord]) -> Embed {
    let total_pages = records.len() + 1;
    let lines = records
        .iter()
        .map(|record| overview_line(record, OVERVIEW_SUBJECT_CHARS))
        .collect::<Vec<_>>()
        .join("\n");

    let mut builder = EmbedBuilder::default();
    builder
        .title(summary_title(filter))
        .color(SUMMARY_COLOR)
        .description(lines)
        .footer(format!(
            "Page 1/{total_pages} • {} emails • Use arrows to view details",
            records.len()
        ));
    builder.build()
}

/// Full view of one record. Optional columns only appear when present.
pub fn detail_embed(record: &EmailRecord, page: usize, total_pages: usize) -> Embed {
    let marker = priority_marker(record.priority);
    let mut builder = EmbedBuilder::default();
    builder
        .title(format!("{marker} {}", record.subject))
        .color(priority_color(record.priority))
        .timestamp(record.created_at)
        .field("👤 Sender", display_or_unknown(&record.sender), true)
        .field("🏢 Company", display_or_unknown(&record.company), true)
        .field("📊 Priority", format!("{marker} {}", record.priority.as_str()), true);

    if let Some(category) = record.category {
        builder.field(
            "📂 Category",
            format!("{} {}", category_marker(category), category.as_str()),
            true,
        );
    }
    if let Some(email_type) = record.email_type {
        builder.field("📋 Type", format!("{} {}", type_marker(email_type), email_type.as_str()), true);
    }
    builder.field("⏰ Received", received_at(record.created_at), true);
    if let Some(action) = record.action_needed.as_deref() {
        builder.field("🎯 Action Needed", action, false);
    }

    builder.footer(format!("Page {}/{total_pages} • Email ID: {}", page + 1, record.id));
    builder.build()
}

pub fn navigation_row(key: &str, can_go_previous: bool, can_go_next: bool) -> ActionRow {
    let mut row = ActionRowBuilder::default();
    row.button(
        ButtonComponent::new(custom_id(Navigation::Previous, key), "◀️ Previous")
            .disabled(!can_go_previous),
    )
    .button(ButtonComponent::new(custom_id(Navigation::Next, key), "Next ▶️").disabled(!can_go_next));
    row.build()
}

/// Current page of a paginated reply. A frozen state renders both buttons
/// disabled.
pub fn render_page(state: &PaginationState, key: &str) -> MessageTemplate {
    let embed = match state.current_record() {
        Some(record) => detail_embed(record, state.page(), state.total_pages()),
        None => overview_embed(state.filter(), state.records()),
    };

    MessageTemplate {
        content: None,
        embeds: vec![embed],
        components: vec![navigation_row(key, state.can_go_previous(), state.can_go_next())],
        flags: None,
    }
}

pub fn empty_result_message(filter: SummaryFilter) -> MessageTemplate {
    MessageBuilder::new()
        .embed(|embed| {
            embed
                .title(summary_title(filter))
                .color(SUMMARY_COLOR)
                .description("No emails found for this filter.");
        })
        .build()
}

fn stats_value(session: &SummarySession) -> String {
    format!(
        "**Total:** {}\n**Job Emails:** {}\n**Urgent:** {}",
        session.total_professional_emails, session.job_emails, session.urgent_count
    )
}

fn session_color(session: &SummarySession) -> u32 {
    if session.urgent_count > 0 {
        URGENT_DIGEST_COLOR
    } else {
        CALM_DIGEST_COLOR
    }
}

/// Reply to `summary filter:last`.
pub fn session_summary_message(session: &SummarySession) -> MessageTemplate {
    MessageBuilder::new()
        .embed(|embed| {
            embed
                .title(summary_title(SummaryFilter::Last))
                .description(session.summary_text_or_default())
                .color(session_color(session))
                .timestamp(session.created_at)
                .field("📊 Summary Stats", stats_value(session), true)
                .footer(format!("Session ID: {}", session.id));
        })
        .build()
}

pub fn no_sessions_message() -> MessageTemplate {
    MessageBuilder::new()
        .embed(|embed| {
            embed
                .title(summary_title(SummaryFilter::Last))
                .color(SUMMARY_COLOR)
                .description("No email summaries have been generated yet.");
        })
        .build()
}

pub fn digest_message(digest: &Digest) -> MessageTemplate {
    let session = &digest.session;
    let color = if digest.has_urgent() { URGENT_DIGEST_COLOR } else { CALM_DIGEST_COLOR };

    MessageBuilder::new()
        .embed(|embed| {
            embed
                .title("📧 New Email Summary")
                .description(session.summary_text_or_default())
                .color(color)
                .timestamp(session.created_at)
                .field("📊 Summary Stats", stats_value(session), true);

            if !digest.top.is_empty() {
                let mut lines = digest
                    .top
                    .iter()
                    .map(|record| overview_line(record, DIGEST_SUBJECT_CHARS))
                    .collect::<Vec<_>>()
                    .join("\n");
                if digest.omitted() > 0 {
                    lines.push_str(&format!("\n*... and {} more*", digest.omitted()));
                }
                embed.field(
                    format!("📋 Professional Emails ({})", digest.total_records),
                    lines,
                    false,
                );
            }
        })
        .build()
}

pub fn error_message(summary: &str, correlation_id: &str) -> MessageTemplate {
    MessageBuilder::new()
        .content(format!("❌ {summary}"))
        .embed(|embed| {
            embed.color(ERROR_COLOR).footer(format!("Correlation ID: {correlation_id}"));
        })
        .build()
}

pub fn not_owner_notice() -> MessageTemplate {
    MessageBuilder::new()
        .content("Only the person who ran this command can page through these results.")
        .ephemeral()
        .build()
}

pub fn expired_notice() -> MessageTemplate {
    MessageBuilder::new()
        .content("These results have expired. Run `/summary` again for a fresh view.")
        .ephemeral()
        .build()
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use chrono::{DateTime, Utc};
    use serde_json::json;

    use mailbrief_core::digest::Digest;
    use mailbrief_core::domain::email::{Category, EmailId, EmailRecord, EmailType, Priority};
    use mailbrief_core::domain::session::{SessionId, SummarySession};
    use mailbrief_core::domain::user::UserId;
    use mailbrief_core::pagination::{Navigation, PaginationState};
    use mailbrief_core::query::SummaryFilter;

    use super::{
        detail_embed, digest_message, error_message, not_owner_notice, overview_embed,
        render_page, truncate_subject, MessageBuilder, EPHEMERAL_FLAG,
    };

    fn at(raw: &str) -> DateTime<Utc> {
        raw.parse().expect("timestamp")
    }

    fn record(id: i64, priority: Priority, subject: &str) -> EmailRecord {
        EmailRecord {
            id: EmailId(id),
            sender: "jane@acme.io".to_string(),
            company: "Acme".to_string(),
            subject: subject.to_string(),
            category: None,
            email_type: None,
            priority,
            created_at: at("2026-10-18T09:30:00Z"),
            action_needed: None,
            session_id: SessionId(3),
        }
    }

    fn session(urgent_count: u32) -> SummarySession {
        SummarySession {
            id: SessionId(3),
            created_at: at("2026-10-18T10:00:00Z"),
            summary_text: Some("Two interviews to schedule.".to_string()),
            total_professional_emails: 7,
            job_emails: 4,
            urgent_count,
        }
    }

    #[test]
    fn detail_embed_stays_within_discord_limits() {
        let mut long = record(9, Priority::High, &"s".repeat(300));
        long.action_needed = Some("a".repeat(2_000));

        let embed = detail_embed(&long, 1, 3);

        let title = embed.title.as_deref().expect("title");
        assert_eq!(title.chars().count(), 256);
        assert!(title.starts_with("🔴 sss"));
        assert!(title.ends_with("..."));
        let action = embed.field("Action Needed").expect("action field");
        assert_eq!(action.value.chars().count(), 1_024);
        assert!(action.value.ends_with("..."));
        assert_eq!(embed.field("Sender").expect("sender").value, "jane@acme.io");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_subject("short", 40), "short");
        assert_eq!(truncate_subject("ééééé", 3), "ééé...");
        assert_eq!(truncate_subject(&"x".repeat(40), 40), "x".repeat(40));
    }

    #[test]
    fn overview_lists_one_line_per_record_with_truncated_subject() {
        let long_subject = "Follow-up on the senior platform engineer role and next steps";
        let records = vec![record(1, Priority::Urgent, long_subject), record(2, Priority::Low, "Hi")];

        let embed = overview_embed(SummaryFilter::All, &records);
        let description = embed.description.expect("description");
        let lines: Vec<&str> = description.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("🚨 **Acme** - "));
        assert!(lines[0].ends_with(&format!("{}...", &long_subject[..40])));
        assert_eq!(lines[1], "🔵 **Acme** - Hi");
        assert!(embed.footer.expect("footer").text.starts_with("Page 1/3"));
    }

    #[test]
    fn detail_omits_absent_optional_fields() {
        let embed = detail_embed(&record(9, Priority::High, "Offer letter"), 1, 2);

        assert!(embed.field("Category").is_none());
        assert!(embed.field("Type").is_none());
        assert!(embed.field("Action Needed").is_none());
        assert_eq!(embed.field("Sender").map(|f| f.value.as_str()), Some("jane@acme.io"));
        assert_eq!(embed.footer.expect("footer").text, "Page 2/2 • Email ID: 9");
    }

    #[test]
    fn detail_shows_optional_fields_when_present() {
        let mut full = record(4, Priority::Medium, "Onsite schedule");
        full.category = Some(Category::Job);
        full.email_type = Some(EmailType::Meeting);
        full.action_needed = Some("Confirm Thursday slot".to_string());

        let embed = detail_embed(&full, 1, 2);

        assert_eq!(embed.field("Category").map(|f| f.value.as_str()), Some("💼 job"));
        assert_eq!(embed.field("Type").map(|f| f.value.as_str()), Some("📅 MEETING"));
        let action = embed.field("Action Needed").expect("action field");
        assert_eq!(action.value, "Confirm Thursday slot");
        assert!(!action.inline);
    }

    #[test]
    fn render_page_disables_buttons_at_bounds_and_when_frozen() {
        let now = Instant::now();
        let owner = UserId::from("42");
        let mut state = PaginationState::new(
            owner.clone(),
            vec![record(1, Priority::High, "One")],
            SummaryFilter::High,
            now,
            Duration::from_secs(120),
        );

        let first = render_page(&state, "ix-1");
        let disabled: Vec<bool> = first.buttons().map(|b| b.disabled).collect();
        assert_eq!(disabled, vec![true, false]);
        assert_eq!(
            first.buttons().map(|b| b.custom_id.as_str()).collect::<Vec<_>>(),
            vec!["summary.prev.v1:ix-1", "summary.next.v1:ix-1"]
        );

        state.navigate(&owner, Navigation::Next, now).expect("owner navigates");
        let last = render_page(&state, "ix-1");
        assert_eq!(last.buttons().map(|b| b.disabled).collect::<Vec<_>>(), vec![false, true]);
        assert!(last.embeds[0].title.as_deref().is_some_and(|t| t.ends_with("One")));

        state.freeze();
        let frozen = render_page(&state, "ix-1");
        assert!(frozen.buttons().all(|b| b.disabled));
    }

    #[test]
    fn digest_lists_top_five_and_counts_the_rest() {
        let records: Vec<EmailRecord> =
            (1..=7).map(|id| record(id, Priority::Medium, &format!("Subject {id}"))).collect();
        let digest = Digest::build(session(0), records);

        let message = digest_message(&digest);
        let embed = &message.embeds[0];
        assert_eq!(embed.color, Some(0x00FF00));
        assert_eq!(embed.description.as_deref(), Some("Two interviews to schedule."));

        let list = embed.field("Professional Emails (7)").expect("list field");
        assert_eq!(list.value.lines().filter(|line| line.starts_with("🟡")).count(), 5);
        assert!(list.value.ends_with("*... and 2 more*"));
    }

    #[test]
    fn digest_is_red_when_session_reports_urgent_mail() {
        let digest = Digest::build(session(2), Vec::new());
        let message = digest_message(&digest);

        assert_eq!(message.embeds[0].color, Some(0xFF0000));
        assert!(message.embeds[0].field("Professional Emails").is_none());
        assert!(message.embeds[0]
            .field("Summary Stats")
            .is_some_and(|f| f.value.contains("**Urgent:** 2")));
    }

    #[test]
    fn notices_are_ephemeral_and_errors_carry_correlation_id() {
        assert_eq!(not_owner_notice().flags, Some(EPHEMERAL_FLAG));

        let message = error_message("Error fetching email summaries.", "ix-77");
        assert_eq!(message.content.as_deref(), Some("❌ Error fetching email summaries."));
        assert!(message.embeds[0]
            .footer
            .as_ref()
            .is_some_and(|footer| footer.text.contains("ix-77")));
        assert!(!message.is_ephemeral());
    }

    #[test]
    fn message_serializes_with_discord_component_codes() {
        let message = MessageBuilder::new()
            .content("hello")
            .action_row(|row| {
                row.button(super::ButtonComponent::new("a", "A").disabled(true));
            })
            .build();

        let value = serde_json::to_value(&message).expect("serialize");
        assert_eq!(
            value,
            json!({
                "content": "hello",
                "embeds": [],
                "components": [{
                    "type": 1,
                    "components": [{
                        "type": 2,
                        "style": 2,
                        "label": "A",
                        "custom_id": "a",
                        "disabled": true
                    }]
                }]
            })
        );
    }
}
