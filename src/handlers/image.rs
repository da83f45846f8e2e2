//! Image attachments: upload for vision, let the assistant react

use super::HandlerContext;
use crate::Result;
use crate::assistant::{ImageDetail, ImageFileRef, NewMessage, NewPart};
use crate::channels::Attachment;

/// Reply when the image could not be fetched
pub const IMAGE_DOWNLOAD_FAILED: &str = "⚠️ Kon de afbeelding niet downloaden.";

/// Reply when upload or analysis failed
pub const IMAGE_FAILED: &str = "⚠️ Er trad een fout op bij het analyseren van de afbeelding.";

/// Upload purpose for vision input
const VISION_PURPOSE: &str = "vision";

/// Handle a message carrying an image attachment
///
/// The bytes go through a named temp file that is removed when the handler
/// returns, whichever way it returns.
///
/// # Errors
///
/// Returns error only if sending a reply fails
pub async fn handle_image(ctx: HandlerContext<'_>, attachment: &Attachment) -> Result<()> {
    let bytes = match ctx.channel.download_media(attachment).await {
        Ok(bytes) if !bytes.is_empty() => bytes,
        Ok(_) => {
            tracing::warn!(message_id = %ctx.message.id, "image download returned no data");
            return ctx.reply(IMAGE_DOWNLOAD_FAILED).await;
        }
        Err(e) => {
            tracing::warn!(message_id = %ctx.message.id, error = %e, "image download failed");
            return ctx.reply(IMAGE_DOWNLOAD_FAILED).await;
        }
    };

    match react_to_image(ctx, &bytes).await {
        Ok(reply) => ctx.reply(reply).await,
        Err(e) => {
            tracing::error!(message_id = %ctx.message.id, error = %e, "image analysis failed");
            ctx.reply(IMAGE_FAILED).await
        }
    }
}

async fn react_to_image(ctx: HandlerContext<'_>, bytes: &[u8]) -> Result<String> {
    let temp = tempfile::Builder::new()
        .prefix("image_")
        .suffix(".png")
        .tempfile()?;
    tokio::fs::write(temp.path(), bytes).await?;

    let file_id = ctx.conversation.upload(temp.path(), VISION_PURPOSE).await?;
    tracing::info!(file_id = %file_id, size = bytes.len(), "image uploaded");

    ctx.conversation
        .append(&NewMessage::user_parts(vec![
            NewPart::Text {
                text: image_instruction(ctx.persona),
            },
            NewPart::ImageFile {
                image_file: ImageFileRef {
                    file_id,
                    detail: ImageDetail::Low,
                },
            },
        ]))
        .await?;

    let outcome = ctx.conversation.run_and_reply().await?;
    Ok(outcome.into_reply())
}

/// Instruction sent along with the image
#[must_use]
pub fn image_instruction(persona: &str) -> String {
    format!("Je bent {persona}, reageer droog en sarcastisch op de inhoud van deze afbeelding:")
}
