use super::Handshake;
use crate::error::Result;
use tracing::info;

/// Answerer: read the offer → answer → print once gathered. The channel
/// arrives later as an incoming-channel event.
pub async fn run(mut hs: Handshake) -> Result<()> {
    hs.accept_remote("offer").await?;
    info!("Offer accepted for session {}, gathering answer", hs.controller.session_id());

    hs.local_description_printed().await?;
    Ok(())
}
