//! # Stream Property
//!
//! One programmable hardware field: its last value, whether that value has
//! changed since the consumer last emitted it, and whether this hardware
//! programs the field at all.

/// Tracked hardware field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamProperty<T> {
    /// Last value set, `None` until first set
    pub value: Option<T>,
    /// Value changed since the dirty flag was last cleared
    pub is_dirty: bool,
    /// Whether requests are applied
    pub supported: bool,
}

impl<T: Copy + PartialEq> StreamProperty<T> {
    /// Field gated by a capability table, unsupported until loaded
    pub const fn gated() -> Self {
        Self {
            value: None,
            is_dirty: false,
            supported: false,
        }
    }

    /// Field every generation programs
    pub const fn ungated() -> Self {
        Self {
            value: None,
            is_dirty: false,
            supported: true,
        }
    }

    /// Apply a request. Ignored when unsupported or `None`; marks dirty
    /// only on an actual change.
    pub fn set(&mut self, value: Option<T>) {
        if !self.supported {
            return;
        }
        if let Some(value) = value {
            if self.value != Some(value) {
                self.value = Some(value);
                self.is_dirty = true;
            }
        }
    }

    /// Take the value of another instance and mark it for re-emission
    pub fn copy_from(&mut self, other: &Self) {
        if other.value.is_some() {
            self.value = other.value;
            self.is_dirty = true;
        }
    }

    /// Forget the pending change
    #[inline]
    pub fn clear_dirty(&mut self) {
        self.is_dirty = false;
    }
}
