//! Recipient resolution against the direct-message index and the directory.

use tracing::{debug, warn};

use crate::client::ProtocolClient;
use crate::error::ResolutionError;
use crate::types::Recipient;

/// Turn a classified recipient into a concrete conversation identifier.
pub(crate) async fn resolve(
    client: &dyn ProtocolClient,
    recipient: &Recipient,
) -> Result<String, ResolutionError> {
    match recipient {
        Recipient::Conversation(id) => Ok(id.clone()),
        Recipient::User(user_id) => resolve_user(client, user_id).await,
        Recipient::Alias(alias) => client
            .resolve_alias(alias)
            .await
            .map_err(ResolutionError::AliasLookup),
    }
}

/// Look the user up in the account's direct-message index, creating and
/// recording a new direct conversation when none is known yet.
async fn resolve_user(
    client: &dyn ProtocolClient,
    user_id: &str,
) -> Result<String, ResolutionError> {
    let mut index = client
        .direct_message_index()
        .await
        .map_err(ResolutionError::IndexFetch)?;

    if let Some(existing) = index.latest_for(user_id) {
        debug!(user = user_id, conversation = existing, "reusing direct conversation");
        return Ok(existing.to_owned());
    }

    let conversation_id = client
        .create_direct_conversation(user_id)
        .await
        .map_err(ResolutionError::ConversationCreate)?;
    debug!(user = user_id, conversation = %conversation_id, "created direct conversation");

    // Two senders racing on an empty index each create a conversation and
    // each write back their own copy of the map; the last write wins and the
    // loser's room goes unrecorded. Accepted, matches the read-modify-write
    // nature of the account-data API.
    index.append(user_id, &conversation_id);
    if let Err(error) = client.replace_direct_message_index(index).await {
        warn!(user = user_id, error = %error, "failed to record new direct conversation");
    }

    Ok(conversation_id)
}
