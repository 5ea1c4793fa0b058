//! Current page, page count and layout direction, projected onto the slider.

use crate::provider::GallerySize;

/// Direction pages advance in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LayoutMode {
    #[default]
    LeftToRight,
    RightToLeft,
}

impl LayoutMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "left_to_right" | "ltr" | "left-to-right" => Some(Self::LeftToRight),
            "right_to_left" | "rtl" | "right-to-left" | "manga" => Some(Self::RightToLeft),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LeftToRight => "left_to_right",
            Self::RightToLeft => "right_to_left",
        }
    }

    /// Payload of a pooled layout notification.
    pub fn to_raw(self) -> i64 {
        match self {
            Self::LeftToRight => 0,
            Self::RightToLeft => 1,
        }
    }

    pub fn from_raw(raw: i64) -> Self {
        if raw == 1 {
            Self::RightToLeft
        } else {
            Self::LeftToRight
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::LeftToRight => Self::RightToLeft,
            Self::RightToLeft => Self::LeftToRight,
        }
    }
}

/// What the slider and its two labels show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliderProjection {
    /// Current page number, one-based.
    pub start_label: String,
    /// Page count.
    pub end_label: String,
    pub left_label: String,
    pub right_label: String,
    /// Slider runs from right to left.
    pub reversed: bool,
    pub min: usize,
    pub max: usize,
    pub value: usize,
}

/// Navigation state owned by the consumer thread.
#[derive(Debug, Clone)]
pub struct Navigator {
    current_index: usize,
    size: GallerySize,
    layout_mode: LayoutMode,
    projection: Option<SliderProjection>,
}

impl Navigator {
    pub fn new(layout_mode: LayoutMode) -> Self {
        Self {
            current_index: 0,
            size: GallerySize::Wait,
            layout_mode,
            projection: None,
        }
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn size(&self) -> GallerySize {
        self.size
    }

    /// Page count once known; 0 otherwise.
    pub fn page_count(&self) -> usize {
        self.size.ready().unwrap_or(0)
    }

    pub fn layout_mode(&self) -> LayoutMode {
        self.layout_mode
    }

    /// Slider state, or `None` while there are no pages.
    pub fn projection(&self) -> Option<&SliderProjection> {
        self.projection.as_ref()
    }

    /// Returns true if anything changed. The current index is clamped into
    /// the new range.
    pub fn set_size(&mut self, size: GallerySize) -> bool {
        let mut changed = self.size != size;
        self.size = size;
        if let GallerySize::Ready(n) = size {
            let clamped = self.current_index.min(n.saturating_sub(1));
            changed |= clamped != self.current_index;
            self.current_index = clamped;
        }
        self.refresh();
        changed
    }

    /// Clamped into `[0, size)`. Ignored while there are no pages.
    pub fn set_current_index(&mut self, index: usize) -> bool {
        let Some(index) = self.clamp_index(index) else {
            return false;
        };
        let changed = self.current_index != index;
        self.current_index = index;
        self.refresh();
        changed
    }

    pub fn set_layout_mode(&mut self, mode: LayoutMode) -> bool {
        let changed = self.layout_mode != mode;
        self.layout_mode = mode;
        self.refresh();
        changed
    }

    /// Clamp `index` into `[0, size)`, or `None` while there are no pages.
    pub fn clamp_index(&self, index: usize) -> Option<usize> {
        match self.page_count() {
            0 => None,
            n => Some(index.min(n - 1)),
        }
    }

    pub fn previous_index(&self) -> Option<usize> {
        self.before(self.current_index)
    }

    pub fn next_index(&self) -> Option<usize> {
        self.after(self.current_index)
    }

    fn before(&self, from: usize) -> Option<usize> {
        from.checked_sub(1).filter(|_| self.page_count() > 0)
    }

    fn after(&self, from: usize) -> Option<usize> {
        let next = from + 1;
        (next < self.page_count()).then_some(next)
    }

    /// Page visually left of `from`.
    pub fn left_of(&self, from: usize) -> Option<usize> {
        match self.layout_mode {
            LayoutMode::LeftToRight => self.before(from),
            LayoutMode::RightToLeft => self.after(from),
        }
    }

    /// Page visually right of `from`.
    pub fn right_of(&self, from: usize) -> Option<usize> {
        match self.layout_mode {
            LayoutMode::LeftToRight => self.after(from),
            LayoutMode::RightToLeft => self.before(from),
        }
    }

    /// Target of a move to the visually left page.
    pub fn page_left_target(&self) -> Option<usize> {
        self.left_of(self.current_index)
    }

    /// Target of a move to the visually right page.
    pub fn page_right_target(&self) -> Option<usize> {
        self.right_of(self.current_index)
    }

    /// Zero-based index for a one-based slider value.
    pub fn index_for_slider(&self, value: usize) -> Option<usize> {
        self.clamp_index(value.max(1) - 1)
    }

    fn refresh(&mut self) {
        let size = self.page_count();
        if size == 0 {
            self.projection = None;
            return;
        }

        let start_label = (self.current_index + 1).to_string();
        let end_label = size.to_string();
        let reversed = self.layout_mode == LayoutMode::RightToLeft;
        let (left_label, right_label) = if reversed {
            (end_label.clone(), start_label.clone())
        } else {
            (start_label.clone(), end_label.clone())
        };

        self.projection = Some(SliderProjection {
            start_label,
            end_label,
            left_label,
            right_label,
            reversed,
            min: 1,
            max: size,
            value: self.current_index + 1,
        });
    }
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new(LayoutMode::LeftToRight)
    }
}
