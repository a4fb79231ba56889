#![forbid(unsafe_code)]

//! Modifier-key snapshots delivered with pointer and keyboard input.
//!
//! The layout engine never reads the keyboard itself. The host view layer
//! captures the modifier state alongside each pointer event and passes a
//! [`Modifiers`] value into the session controllers.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Snapshot of active modifiers captured with one input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Modifiers {
    pub shift: bool,
    pub alt: bool,
    pub ctrl: bool,
    pub meta: bool,
}

impl Modifiers {
    #[must_use]
    pub const fn none() -> Self {
        Self {
            shift: false,
            alt: false,
            ctrl: false,
            meta: false,
        }
    }

    #[must_use]
    pub const fn shift() -> Self {
        Self {
            shift: true,
            ..Self::none()
        }
    }

    #[must_use]
    pub const fn alt() -> Self {
        Self {
            alt: true,
            ..Self::none()
        }
    }

    /// Shift locks the aspect ratio while resizing.
    #[must_use]
    pub const fn aspect_lock(self) -> bool {
        self.shift
    }

    /// Shift (or the platform command key) extends the selection instead of
    /// replacing it.
    #[must_use]
    pub const fn additive_selection(self) -> bool {
        self.shift || self.meta
    }

    /// Alt temporarily disables grid and edge snapping.
    #[must_use]
    pub const fn suppress_snapping(self) -> bool {
        self.alt
    }
}

/// Cardinal direction for keyboard nudges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum NudgeDirection {
    Up,
    Down,
    Left,
    Right,
}

impl NudgeDirection {
    /// Unit vector for this direction (y grows downward).
    #[must_use]
    pub const fn unit(self) -> (f64, f64) {
        match self {
            Self::Up => (0.0, -1.0),
            Self::Down => (0.0, 1.0),
            Self::Left => (-1.0, 0.0),
            Self::Right => (1.0, 0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_none() {
        assert_eq!(Modifiers::default(), Modifiers::none());
    }

    #[test]
    fn modifier_roles() {
        assert!(Modifiers::shift().aspect_lock());
        assert!(Modifiers::shift().additive_selection());
        assert!(!Modifiers::shift().suppress_snapping());
        assert!(Modifiers::alt().suppress_snapping());
        let meta = Modifiers {
            meta: true,
            ..Modifiers::none()
        };
        assert!(meta.additive_selection());
        assert!(!meta.aspect_lock());
    }

    #[test]
    fn nudge_units_point_the_right_way() {
        assert_eq!(NudgeDirection::Up.unit(), (0.0, -1.0));
        assert_eq!(NudgeDirection::Right.unit(), (1.0, 0.0));
    }
}
