//! Discord API types.
//!
//! Only the fields this service reads or writes are modelled; unknown fields
//! are ignored on deserialization.

use lockgate_core::{ApplicationId, GuildId, RoleId, UserId};
use serde::{Deserialize, Serialize};

// =============================================================================
// REST objects
// =============================================================================

/// A Discord user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscordUser {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
}

impl DiscordUser {
    /// Name to greet the user with.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.global_name.as_deref().unwrap_or(&self.username)
    }
}

/// A user's membership in a guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildMember {
    #[serde(default)]
    pub user: Option<DiscordUser>,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub roles: Vec<RoleId>,
}

impl GuildMember {
    /// Whether the member currently holds `role`.
    #[must_use]
    pub fn has_role(&self, role: RoleId) -> bool {
        self.roles.contains(&role)
    }
}

/// A guild role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
}

/// OAuth2 token exchange response.
#[derive(Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Discord's JSON error body.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
}

// =============================================================================
// Interactions
// =============================================================================

/// Interaction type codes.
pub mod interaction_type {
    pub const PING: u8 = 1;
    pub const APPLICATION_COMMAND: u8 = 2;
    pub const MESSAGE_COMPONENT: u8 = 3;
}

/// Interaction callback type codes.
pub mod callback_type {
    pub const PONG: u8 = 1;
    pub const CHANNEL_MESSAGE_WITH_SOURCE: u8 = 4;
    pub const DEFERRED_CHANNEL_MESSAGE_WITH_SOURCE: u8 = 5;
}

/// Message flag that hides a reply from everyone but the invoking user.
pub const EPHEMERAL: u64 = 1 << 6;

/// Custom id of the "unlock" button.
pub const UNLOCK_BUTTON_ID: &str = "unlock";

/// Inbound interaction webhook payload.
#[derive(Debug, Clone, Deserialize)]
pub struct Interaction {
    pub id: String,
    pub application_id: ApplicationId,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub data: Option<InteractionData>,
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    #[serde(default)]
    pub member: Option<GuildMember>,
    #[serde(default)]
    pub user: Option<DiscordUser>,
    pub token: String,
}

impl Interaction {
    /// The invoking user: `member.user` in guilds, `user` in DMs.
    #[must_use]
    pub fn invoker(&self) -> Option<&DiscordUser> {
        self.member
            .as_ref()
            .and_then(|m| m.user.as_ref())
            .or(self.user.as_ref())
    }
}

/// Command or component data of an interaction.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InteractionData {
    /// Slash command name.
    #[serde(default)]
    pub name: Option<String>,
    /// Component custom id.
    #[serde(default)]
    pub custom_id: Option<String>,
}

/// Interaction callback (response) body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InteractionResponse {
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<MessagePayload>,
}

impl InteractionResponse {
    /// `PONG` reply to a `PING`.
    #[must_use]
    pub const fn pong() -> Self {
        Self {
            kind: callback_type::PONG,
            data: None,
        }
    }

    /// Immediate message reply.
    #[must_use]
    pub const fn message(data: MessagePayload) -> Self {
        Self {
            kind: callback_type::CHANNEL_MESSAGE_WITH_SOURCE,
            data: Some(data),
        }
    }

    /// Deferred ephemeral reply, edited later.
    #[must_use]
    pub const fn deferred_ephemeral() -> Self {
        Self {
            kind: callback_type::DEFERRED_CHANNEL_MESSAGE_WITH_SOURCE,
            data: Some(MessagePayload {
                content: None,
                flags: Some(EPHEMERAL),
                components: Vec::new(),
            }),
        }
    }
}

/// Message content for replies, edits and channel posts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MessagePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<ActionRow>,
}

impl MessagePayload {
    /// Plain text message.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// Mark the message ephemeral.
    #[must_use]
    pub const fn ephemeral(mut self) -> Self {
        self.flags = Some(EPHEMERAL);
        self
    }

    /// Attach a row of components.
    #[must_use]
    pub fn with_row(mut self, row: ActionRow) -> Self {
        self.components.push(row);
        self
    }
}

/// Component row (type 1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionRow {
    #[serde(rename = "type")]
    kind: u8,
    pub components: Vec<Button>,
}

impl ActionRow {
    /// Row holding `buttons`.
    #[must_use]
    pub const fn new(components: Vec<Button>) -> Self {
        Self {
            kind: 1,
            components,
        }
    }
}

/// Button component (type 2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Button {
    #[serde(rename = "type")]
    kind: u8,
    pub style: ButtonStyle,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Button {
    /// Button opening `url`.
    #[must_use]
    pub fn link(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            kind: 2,
            style: ButtonStyle::Link,
            label: label.into(),
            custom_id: None,
            url: Some(url.into()),
        }
    }
}

/// Button styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonStyle {
    /// Opens a URL; carries no custom id.
    Link,
}

impl Serialize for ButtonStyle {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let code: u8 = match self {
            Self::Link => 5,
        };
        serializer.serialize_u8(code)
    }
}
