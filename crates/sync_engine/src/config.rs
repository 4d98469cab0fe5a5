use serde::Deserialize;

pub const DEFAULT_CACHE_CAPACITY: usize = 50;
pub const DEFAULT_SCROLL_BOTTOM_THRESHOLD_PX: f32 = 100.0;
pub const DEFAULT_NOTIFICATION_PREVIEW_CHARS: usize = 100;
pub const DEFAULT_DEDUP_WINDOW: usize = 256;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Maximum number of conversations whose history is kept in memory.
    pub cache_capacity: usize,
    /// A reader closer than this to the bottom follows new messages.
    pub scroll_bottom_threshold_px: f32,
    pub notification_preview_chars: usize,
    /// Recently seen message ids remembered per conversation for dedup.
    pub dedup_window: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            scroll_bottom_threshold_px: DEFAULT_SCROLL_BOTTOM_THRESHOLD_PX,
            notification_preview_chars: DEFAULT_NOTIFICATION_PREVIEW_CHARS,
            dedup_window: DEFAULT_DEDUP_WINDOW,
        }
    }
}
