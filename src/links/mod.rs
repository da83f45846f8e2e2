//! Link classifiers
//!
//! Pure pattern matchers used by the dispatcher to route messages to the
//! music and video handlers.

mod detector;

pub use detector::{
    MusicCategory, MusicLink, detect_urls, is_music_link, is_video_link, parse_music_link,
    video_url,
};
