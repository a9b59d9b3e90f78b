//! Discord interaction webhook.
//!
//! Every request is verified against the application public key before the
//! body is parsed. `/unlock` (command or button) is answered right away when
//! the invoking member already holds the role; otherwise the reply is
//! deferred and edited once the resolver has decided.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use lockgate_core::UserId;
use tracing::{error, instrument, warn};

use crate::discord::messages::{
    build_already_member_message, build_checkout_message, build_error_message,
    build_granted_message, build_pong_message, build_unavailable_message,
    build_unknown_command_message,
};
use crate::discord::types::{
    Interaction, InteractionResponse, UNLOCK_BUTTON_ID, interaction_type,
};
use crate::discord::{MessagePayload, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use crate::error::{AppError, Result, set_sentry_user};
use crate::services::UnlockOutcome;
use crate::state::AppState;

/// Handle an interaction webhook request.
#[instrument(skip_all)]
pub async fn handle(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized(format!("Missing {name} header")))
    };
    let signature = header(SIGNATURE_HEADER)?;
    let timestamp = header(TIMESTAMP_HEADER)?;

    state
        .interaction_verifier()
        .verify(timestamp, &body, signature)
        .map_err(|e| {
            warn!(error = %e, "Interaction signature verification failed");
            AppError::Unauthorized("Invalid request signature".to_string())
        })?;

    let interaction: Interaction = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid interaction payload: {e}")))?;

    Ok(Json(dispatch(&state, interaction)).into_response())
}

/// Route an interaction to its reply.
fn dispatch(state: &AppState, interaction: Interaction) -> InteractionResponse {
    let data = interaction.data.clone().unwrap_or_default();

    match interaction.kind {
        interaction_type::PING => InteractionResponse::pong(),
        interaction_type::APPLICATION_COMMAND => match data.name.as_deref() {
            Some("ping") => InteractionResponse::message(build_pong_message()),
            Some("unlock") => unlock(state, interaction),
            _ => InteractionResponse::message(build_unknown_command_message()),
        },
        interaction_type::MESSAGE_COMPONENT
            if data.custom_id.as_deref() == Some(UNLOCK_BUTTON_ID) =>
        {
            unlock(state, interaction)
        }
        _ => InteractionResponse::message(build_unknown_command_message()),
    }
}

/// Answer `/unlock`.
fn unlock(state: &AppState, interaction: Interaction) -> InteractionResponse {
    let settings = state.resolver().settings();

    let Some(user) = interaction.invoker().map(|u| u.id) else {
        return InteractionResponse::message(build_error_message(&settings.server_name));
    };
    set_sentry_user(&user);

    if interaction
        .member
        .as_ref()
        .is_some_and(|m| m.has_role(settings.role_id))
    {
        return InteractionResponse::message(build_already_member_message(
            &settings.server_name,
            user,
        ));
    }

    let state = state.clone();
    let token = interaction.token;
    tokio::spawn(async move {
        let reply = unlock_reply(&state, user).await;
        if let Err(e) = state
            .responder()
            .edit_original_response(&token, &reply)
            .await
        {
            error!(user = %user, error = %e, "Failed to edit deferred unlock reply");
        }
    });

    InteractionResponse::deferred_ephemeral()
}

/// Run the `/unlock` fast path and render the outcome.
async fn unlock_reply(state: &AppState, user: UserId) -> MessagePayload {
    let settings = state.resolver().settings();
    let server_name = &settings.server_name;

    match state.resolver().request_access(user).await {
        Ok(UnlockOutcome::AlreadyMember) => build_already_member_message(server_name, user),
        Ok(UnlockOutcome::Granted { wallet }) => {
            build_granted_message(server_name, user, &wallet, settings.unlocked_channel)
        }
        Ok(UnlockOutcome::CheckoutRequired { nonce }) => {
            let url = state.config().public_url(&format!("/checkout/{nonce}"));
            build_checkout_message(server_name, &url)
        }
        Ok(UnlockOutcome::OracleUnavailable) => build_unavailable_message(),
        Err(e) => {
            let event_id = sentry::capture_error(&e);
            error!(user = %user, error = %e, sentry_event_id = %event_id, "Unlock failed");
            build_error_message(server_name)
        }
    }
}
