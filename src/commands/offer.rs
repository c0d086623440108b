use super::Handshake;
use crate::error::Result;
use tracing::info;

/// Offerer: channel → offer → print once gathered → read the answer.
pub async fn run(mut hs: Handshake) -> Result<()> {
    let channel = hs.controller.create_channel(&hs.label).await?;
    info!("Data channel '{}' created, creating offer", channel.label());
    hs.controller.start_offer().await?;

    hs.local_description_printed().await?;
    hs.accept_remote("answer").await
}
