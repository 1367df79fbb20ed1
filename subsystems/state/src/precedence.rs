//! # Override Precedence
//!
//! Thread arbitration policy and GRF count are chosen from up to four
//! sources. The merge is ordered:
//!
//! ```text
//!   debug override ─▶ caller request ─▶ hardware default ─▶ previous value
//!        (always)         (if any)       (if no request and
//!                                         force-default or nothing
//!                                         programmed yet)
//! ```
//!
//! The hardware default never replaces an explicit request. It only fills
//! the gap when the caller has no preference.

/// Sources of one overridable value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverrideSources<T> {
    /// What the caller asked for
    pub requested: Option<T>,
    /// What is currently programmed
    pub previous: Option<T>,
    /// Debug knob: use the default whenever the caller has no preference
    pub force_default_if_not_specified: bool,
    /// Debug knob: replace whatever was chosen
    pub override_value: Option<T>,
    /// Hardware default
    pub hardware_default: T,
}

impl<T: Copy> OverrideSources<T> {
    /// Value to apply, `None` to keep the previous one
    pub fn resolve(&self) -> Option<T> {
        if let Some(value) = self.override_value {
            return Some(value);
        }
        match self.requested {
            Some(value) => Some(value),
            None if self.force_default_if_not_specified || self.previous.is_none() => {
                Some(self.hardware_default)
            }
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources(requested: Option<u32>, previous: Option<u32>) -> OverrideSources<u32> {
        OverrideSources {
            requested,
            previous,
            force_default_if_not_specified: false,
            override_value: None,
            hardware_default: 7,
        }
    }

    #[test]
    fn test_request_wins_over_previous() {
        assert_eq!(sources(Some(2), Some(1)).resolve(), Some(2));
    }

    #[test]
    fn test_no_request_keeps_previous() {
        assert_eq!(sources(None, Some(1)).resolve(), None);
    }

    #[test]
    fn test_default_fills_first_use() {
        assert_eq!(sources(None, None).resolve(), Some(7));
    }

    #[test]
    fn test_force_default_replaces_previous_but_not_request() {
        let mut forced = sources(None, Some(1));
        forced.force_default_if_not_specified = true;
        assert_eq!(forced.resolve(), Some(7));

        forced.requested = Some(2);
        assert_eq!(forced.resolve(), Some(2));
    }

    #[test]
    fn test_override_dominates_everything() {
        let mut overridden = sources(Some(2), Some(1));
        overridden.force_default_if_not_specified = true;
        overridden.override_value = Some(9);
        assert_eq!(overridden.resolve(), Some(9));

        overridden.requested = None;
        assert_eq!(overridden.resolve(), Some(9));
    }
}
