//! Music links: metadata lookup and a category-specific prompt

use super::HandlerContext;
use crate::{Error, Result};
use crate::integrations::{MusicMetadata, SpotifyClient};
use crate::links::{MusicCategory, parse_music_link};

/// Reply when the message holds no parseable link
pub const MUSIC_UNPARSEABLE: &str = "⚠️ Kon geen geldige Spotify-link parsen.";

/// Reply when no access token could be obtained
pub const MUSIC_TOKEN_FAILED: &str = "⚠️ Kon geen Spotify-token ophalen.";

/// Reply when the resource is missing or private
pub const MUSIC_NOT_FOUND: &str = "⚠️ Kon geen Spotify-info vinden. Is dit privé?";

/// Reply for any other failure
pub const MUSIC_FAILED: &str = "⚠️ Er trad een fout op bij het verwerken van de Spotify-link.";

const UNKNOWN: &str = "Onbekend";

/// Handle a message containing a music link
///
/// Failures after the link is parsed never escape: they end in one of the
/// fixed replies.
///
/// # Errors
///
/// Returns error only if sending a reply fails
pub async fn handle_music(ctx: HandlerContext<'_>, spotify: &SpotifyClient) -> Result<()> {
    let Some(link) = parse_music_link(&ctx.message.content) else {
        return ctx.reply(MUSIC_UNPARSEABLE).await;
    };
    tracing::info!(category = %link.category, id = %link.id, "music link, fetching metadata");

    let token = match spotify.access_token().await {
        Ok(token) => token,
        Err(e) => {
            tracing::warn!(error = %e, "no music token");
            return ctx.reply(MUSIC_TOKEN_FAILED).await;
        }
    };

    let metadata = match spotify.fetch_metadata(&link, &token).await {
        Ok(metadata) => metadata,
        Err(Error::MusicNotFound(what)) => {
            tracing::warn!(what = %what, "music metadata not found");
            return ctx.reply(MUSIC_NOT_FOUND).await;
        }
        Err(e) => {
            tracing::error!(error = %e, "music metadata failed");
            return ctx.reply(MUSIC_FAILED).await;
        }
    };

    let prompt = build_music_prompt(ctx.persona, &metadata, Some(link.category));
    let outcome = async {
        ctx.conversation.append_text(prompt).await?;
        ctx.conversation.run_and_reply().await
    }
    .await;

    match outcome {
        Ok(outcome) => ctx.reply(outcome.into_reply()).await,
        Err(e) => {
            tracing::error!(error = %e, "music reaction failed");
            ctx.reply(MUSIC_FAILED).await
        }
    }
}

fn or_unknown(value: Option<&str>) -> &str {
    value.unwrap_or(UNKNOWN)
}

/// Build the reaction prompt for a music resource
///
/// Missing fields render as `Onbekend`, a missing track total as `0`.
/// Without a category the generic prompt is used.
#[must_use]
pub fn build_music_prompt(
    persona: &str,
    metadata: &MusicMetadata,
    category: Option<MusicCategory>,
) -> String {
    let name = or_unknown(metadata.name.as_deref());
    let first_artist = or_unknown(metadata.artists.first().and_then(|a| a.name.as_deref()));

    match category {
        Some(MusicCategory::Track) => {
            let album = or_unknown(metadata.album.as_ref().and_then(|a| a.name.as_deref()));
            format!(
                "Je bent {persona}. Reageer droog en sarcastisch op deze Spotify-track:\n\
                 Titel: {name}\nArtiest: {first_artist}\nAlbum: {album}"
            )
        }
        Some(MusicCategory::Album) => format!(
            "Je bent {persona}. Reageer droog en sarcastisch op dit Spotify-album:\n\
             Albumtitel: {name}\nArtiest: {first_artist}"
        ),
        Some(MusicCategory::Playlist) => {
            let owner = or_unknown(
                metadata
                    .owner
                    .as_ref()
                    .and_then(|o| o.display_name.as_deref()),
            );
            let total = metadata.tracks.as_ref().and_then(|t| t.total).unwrap_or(0);
            format!(
                "Je bent {persona}. Reageer sarcastisch op deze Spotify-playlist:\n\
                 Naam: {name}\nOwner: {owner}\nAantal tracks: {total}"
            )
        }
        Some(MusicCategory::Show) => {
            let publisher = or_unknown(metadata.publisher.as_deref());
            format!(
                "Je bent {persona}. Reageer droog en cynisch op deze Spotify-podcast:\n\
                 Naam: {name}\nPublisher: {publisher}"
            )
        }
        Some(MusicCategory::Episode) => {
            let show = metadata.show.as_ref();
            let show_name = or_unknown(show.and_then(|s| s.name.as_deref()));
            let speakers = or_unknown(show.and_then(|s| s.publisher.as_deref()));
            format!(
                "Je bent {persona}. Reageer sarcastisch op deze Spotify-podcast-aflevering:\n\
                 Aflevering: {name}\nPodcast: {show_name}\nSprekers: {speakers}"
            )
        }
        None => format!(
            "Je bent {persona}. Dit is een onherkenbaar Spotify-object. Reageer cynisch en kort."
        ),
    }
}
