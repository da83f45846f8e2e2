//! Link matching over free message text
//!
//! All matchers are unanchored: a match anywhere in the text counts.

use std::sync::LazyLock;

use regex::Regex;

/// Regex for detecting URLs
static URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://[^\s<>\[\](){}]+").expect("valid regex")
});

/// Music service links: category and opaque id
static MUSIC_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)open\.spotify\.com/(track|album|playlist|show|episode)/([A-Za-z0-9]+)")
        .expect("valid regex")
});

/// Video platform links, long and short form
static VIDEO_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(youtube\.com/watch\?v=|youtu\.be/)").expect("valid regex")
});

/// Kind of music resource a link points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MusicCategory {
    /// Single track
    Track,
    /// Album
    Album,
    /// Playlist
    Playlist,
    /// Podcast show
    Show,
    /// Podcast episode
    Episode,
}

impl MusicCategory {
    /// Parse the path segment used in links (case-insensitive)
    #[must_use]
    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment.to_ascii_lowercase().as_str() {
            "track" => Some(Self::Track),
            "album" => Some(Self::Album),
            "playlist" => Some(Self::Playlist),
            "show" => Some(Self::Show),
            "episode" => Some(Self::Episode),
            _ => None,
        }
    }

    /// Lowercase name, as used in links
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Track => "track",
            Self::Album => "album",
            Self::Playlist => "playlist",
            Self::Show => "show",
            Self::Episode => "episode",
        }
    }

    /// Plural resource collection name in the metadata API
    #[must_use]
    pub const fn collection(self) -> &'static str {
        match self {
            Self::Track => "tracks",
            Self::Album => "albums",
            Self::Playlist => "playlists",
            Self::Show => "shows",
            Self::Episode => "episodes",
        }
    }
}

impl std::fmt::Display for MusicCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed music link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MusicLink {
    /// Resource kind
    pub category: MusicCategory,
    /// Opaque resource id
    pub id: String,
}

/// Detect all URLs in a string
#[must_use]
pub fn detect_urls(text: &str) -> Vec<String> {
    URL_REGEX
        .find_iter(text)
        .map(|m| {
            let url = m.as_str();
            // Clean trailing punctuation
            url.trim_end_matches(|c| matches!(c, '.' | ',' | '!' | '?' | ')' | ']' | '}'))
                .to_string()
        })
        .collect()
}

/// Extract the first music link from text
#[must_use]
pub fn parse_music_link(text: &str) -> Option<MusicLink> {
    let captures = MUSIC_REGEX.captures(text)?;
    let category = MusicCategory::from_segment(captures.get(1)?.as_str())?;
    let id = captures.get(2)?.as_str().to_string();
    Some(MusicLink { category, id })
}

/// Whether the text contains a music link
#[must_use]
pub fn is_music_link(text: &str) -> bool {
    MUSIC_REGEX.is_match(text)
}

/// Whether the text contains a video link
#[must_use]
pub fn is_video_link(text: &str) -> bool {
    VIDEO_REGEX.is_match(text)
}

/// The video URL to hand to the transcript tool
///
/// Picks the first detected URL that is a video link, or the trimmed text
/// when the link is written without a scheme.
#[must_use]
pub fn video_url(text: &str) -> String {
    detect_urls(text)
        .into_iter()
        .find(|url| is_video_link(url))
        .unwrap_or_else(|| text.trim().to_string())
}
