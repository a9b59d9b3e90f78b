//! Message builders for `/unlock` replies.
//!
//! All replies are ephemeral: only the invoking user sees them.

use lockgate_core::{ChannelId, UserId, WalletAddress};
use url::Url;

use super::types::{ActionRow, Button, MessagePayload};

/// Label of the checkout link button.
pub const CLAIM_LABEL: &str = "\u{1F511} Claim Membership";

/// Reply for a user who already holds the role.
#[must_use]
pub fn build_already_member_message(server_name: &str, user: UserId) -> MessagePayload {
    MessagePayload::text(format!(
        "You are already a member of {server_name}, <@{user}>. You can send messages."
    ))
    .ephemeral()
}

/// Reply after granting the role from a wallet already on file.
#[must_use]
pub fn build_granted_message(
    server_name: &str,
    user: UserId,
    wallet: &WalletAddress,
    unlocked_channel: ChannelId,
) -> MessagePayload {
    MessagePayload::text(format!(
        "You already have a valid {server_name} Membership (wallet `{wallet}`). \
         Welcome to {server_name}, <@{user}>. You can start sending messages now. \
         Head over to <#{unlocked_channel}> and tell us a little more about yourself."
    ))
    .ephemeral()
}

/// Reply pointing the user to checkout.
#[must_use]
pub fn build_checkout_message(server_name: &str, checkout_url: &Url) -> MessagePayload {
    MessagePayload::text(format!(
        "You need to go through the checkout and claim a {server_name} membership NFT."
    ))
    .ephemeral()
    .with_row(ActionRow::new(vec![Button::link(
        CLAIM_LABEL,
        checkout_url.as_str(),
    )]))
}

/// Reply when no lock could be queried.
#[must_use]
pub fn build_unavailable_message() -> MessagePayload {
    MessagePayload::text(
        "We could not check your membership right now. Please try again in a few minutes.",
    )
    .ephemeral()
}

/// Reply for unexpected failures.
#[must_use]
pub fn build_error_message(server_name: &str) -> MessagePayload {
    MessagePayload::text(format!(
        "There was an error in accessing {server_name} Discord. Please contact one of the team members."
    ))
    .ephemeral()
}

/// Reply to `/ping`.
#[must_use]
pub fn build_pong_message() -> MessagePayload {
    MessagePayload::text("Pong!").ephemeral()
}

/// Reply to anything this bot does not handle.
#[must_use]
pub fn build_unknown_command_message() -> MessagePayload {
    MessagePayload::text("Unknown command.").ephemeral()
}
