//! Edge-triggered input mapping.
//!
//! Converts continuous state (button snapshots, live cadence) into discrete
//! press/release transitions by diffing against the previous state. Each
//! mapper instance belongs to exactly one device or to the control tick;
//! nothing here is shared across tasks.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::protocol::keypad::{ButtonSnapshot, ControllerSide, PadButton};

/// Immutable button-to-key table for one controller side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyMap {
    map: HashMap<PadButton, String>,
}

impl KeyMap {
    /// Build a key map from explicit entries.
    pub fn new(entries: impl IntoIterator<Item = (PadButton, String)>) -> Self {
        Self {
            map: entries.into_iter().collect(),
        }
    }

    /// Default table for the left-hand controller (directional cluster).
    pub fn default_left() -> Self {
        Self::new([
            (PadButton::Y, "up".to_string()),
            (PadButton::Z, "left".to_string()),
            (PadButton::A, "right".to_string()),
            (PadButton::B, "down".to_string()),
            (PadButton::Side, "q".to_string()),
            (PadButton::OnOff, "escape".to_string()),
            (PadButton::LeftPaddle, "left".to_string()),
            (PadButton::RightPaddle, "left".to_string()),
        ])
    }

    /// Default table for the right-hand controller (action cluster).
    pub fn default_right() -> Self {
        Self::new([
            (PadButton::Y, "x".to_string()),
            (PadButton::Z, "y".to_string()),
            (PadButton::A, "a".to_string()),
            (PadButton::B, "b".to_string()),
            (PadButton::Side, "e".to_string()),
            (PadButton::OnOff, "enter".to_string()),
            (PadButton::LeftPaddle, "right".to_string()),
            (PadButton::RightPaddle, "right".to_string()),
        ])
    }

    /// Key for a button, or `None` if the button is unmapped.
    ///
    /// Unmapped buttons produce no actuation events at all.
    pub fn key_for(&self, button: PadButton) -> Option<&str> {
        self.map.get(&button).map(String::as_str)
    }
}

/// The two per-side key tables. Immutable after configuration; shared
/// read-only across sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMaps {
    /// Table used when a snapshot reports the left controller.
    pub left: KeyMap,
    /// Table used when a snapshot reports the right controller.
    pub right: KeyMap,
}

impl KeyMaps {
    /// The table for a controller side.
    pub fn for_side(&self, side: ControllerSide) -> &KeyMap {
        match side {
            ControllerSide::Left => &self.left,
            ControllerSide::Right => &self.right,
        }
    }
}

impl Default for KeyMaps {
    fn default() -> Self {
        Self {
            left: KeyMap::default_left(),
            right: KeyMap::default_right(),
        }
    }
}

/// Transitions produced by one snapshot. Releases are applied before
/// presses so a key shared between two buttons is never left stuck when one
/// button releases in the same frame another presses.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ButtonTransitions {
    /// Buttons that left the pressed set. Apply these first.
    pub to_release: Vec<PadButton>,
    /// Buttons that entered the pressed set.
    pub to_press: Vec<PadButton>,
}

impl ButtonTransitions {
    /// Whether the snapshot changed nothing.
    pub fn is_empty(&self) -> bool {
        self.to_release.is_empty() && self.to_press.is_empty()
    }
}

/// Edge-triggered mapper for one controller's button snapshots.
#[derive(Debug, Default)]
pub struct InputEdgeMapper {
    pressed: HashSet<PadButton>,
}

impl InputEdgeMapper {
    /// Create a mapper with an empty pressed set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Diff a fresh snapshot against the previous pressed set.
    ///
    /// The current set is every pressed discrete button plus the synthetic
    /// paddle entry when the axis is at full deflection. The previous set is
    /// replaced wholesale, never mutated in place.
    pub fn apply(&mut self, snapshot: &ButtonSnapshot) -> ButtonTransitions {
        let mut current: HashSet<PadButton> = snapshot.pressed_buttons().into_iter().collect();
        if let Some(paddle) = snapshot.paddle() {
            current.insert(paddle);
        }

        let mut to_release: Vec<PadButton> = self.pressed.difference(&current).copied().collect();
        let mut to_press: Vec<PadButton> = current.difference(&self.pressed).copied().collect();
        to_release.sort_by_key(PadButton::name);
        to_press.sort_by_key(PadButton::name);

        self.pressed = current;

        ButtonTransitions {
            to_release,
            to_press,
        }
    }

    /// Release everything still held and clear the set.
    ///
    /// Called on session teardown so no key stays logically down after a
    /// disconnect.
    pub fn flush(&mut self) -> Vec<PadButton> {
        let mut released: Vec<PadButton> = self.pressed.drain().collect();
        released.sort_by_key(PadButton::name);
        released
    }

    /// The buttons currently considered pressed.
    pub fn pressed(&self) -> &HashSet<PadButton> {
        &self.pressed
    }
}

/// Cadence thresholds for the tick-driven key mapper, in RPM.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceThresholds {
    /// Below this, the brake key is held.
    pub lower: f64,
    /// Above this, the spin key is held.
    pub upper: f64,
    /// Above this, the boost key is held in addition to the spin key.
    pub boost: f64,
}

impl Default for CadenceThresholds {
    fn default() -> Self {
        Self {
            lower: 30.0,
            upper: 65.0,
            boost: 100.0,
        }
    }
}

/// Keys the cadence mapper drives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceKeys {
    /// Held while cadence is above the upper threshold.
    pub spin: String,
    /// Held while cadence is below the lower threshold.
    pub brake: String,
    /// Held (with the spin key) while cadence is above the boost threshold.
    pub boost: String,
}

impl Default for CadenceKeys {
    fn default() -> Self {
        Self {
            spin: "a".to_string(),
            brake: "b".to_string(),
            boost: "up".to_string(),
        }
    }
}

/// Key transitions from a cadence change. Releases first, as above.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyTransitions {
    /// Keys that should go up. Apply these first.
    pub to_release: Vec<String>,
    /// Keys that should go down.
    pub to_press: Vec<String>,
}

/// Edge-triggered mapper from live cadence to held keys.
///
/// Driven once per control tick by the orchestrator.
#[derive(Debug)]
pub struct CadenceKeyMapper {
    thresholds: CadenceThresholds,
    keys: CadenceKeys,
    pressed: HashSet<String>,
}

impl CadenceKeyMapper {
    /// Create a mapper from configured thresholds and keys.
    pub fn new(thresholds: CadenceThresholds, keys: CadenceKeys) -> Self {
        Self {
            thresholds,
            keys,
            pressed: HashSet::new(),
        }
    }

    /// Diff the key set required at this cadence against the held set.
    pub fn apply(&mut self, rpm: f64) -> KeyTransitions {
        let mut needed: HashSet<String> = HashSet::new();
        if rpm > self.thresholds.boost {
            needed.insert(self.keys.spin.clone());
            needed.insert(self.keys.boost.clone());
        } else if rpm > self.thresholds.upper {
            needed.insert(self.keys.spin.clone());
        } else if rpm < self.thresholds.lower {
            needed.insert(self.keys.brake.clone());
        }

        let mut to_release: Vec<String> = self.pressed.difference(&needed).cloned().collect();
        let mut to_press: Vec<String> = needed.difference(&self.pressed).cloned().collect();
        to_release.sort();
        to_press.sort();

        self.pressed = needed;

        KeyTransitions {
            to_release,
            to_press,
        }
    }

    /// Release every held key and clear the set.
    pub fn flush(&mut self) -> Vec<String> {
        let mut released: Vec<String> = self.pressed.drain().collect();
        released.sort();
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn snapshot(side: ControllerSide, buttons: &[PadButton], analog_lr: i64) -> ButtonSnapshot {
        ButtonSnapshot {
            side,
            y: buttons.contains(&PadButton::Y),
            z: buttons.contains(&PadButton::Z),
            a: buttons.contains(&PadButton::A),
            b: buttons.contains(&PadButton::B),
            shift: buttons.contains(&PadButton::Side),
            power: buttons.contains(&PadButton::OnOff),
            analog_lr,
            analog_ud: 0,
            unknown_fields: Vec::new(),
        }
    }

    #[test]
    fn test_press_then_add_then_release_all() {
        let mut mapper = InputEdgeMapper::new();

        let t = mapper.apply(&snapshot(ControllerSide::Right, &[PadButton::Y], 0));
        assert_eq!(t.to_press, vec![PadButton::Y]);
        assert!(t.to_release.is_empty());

        let t = mapper.apply(&snapshot(
            ControllerSide::Right,
            &[PadButton::Y, PadButton::A],
            0,
        ));
        assert_eq!(t.to_press, vec![PadButton::A]);
        assert!(t.to_release.is_empty());

        let t = mapper.apply(&snapshot(ControllerSide::Right, &[], 0));
        assert!(t.to_press.is_empty());
        assert_eq!(t.to_release, vec![PadButton::A, PadButton::Y]);
    }

    #[test]
    fn test_unchanged_snapshot_is_empty() {
        let mut mapper = InputEdgeMapper::new();
        mapper.apply(&snapshot(ControllerSide::Left, &[PadButton::B], 0));
        let t = mapper.apply(&snapshot(ControllerSide::Left, &[PadButton::B], 0));
        assert!(t.is_empty());
    }

    #[test]
    fn test_paddle_enters_and_leaves_set() {
        let mut mapper = InputEdgeMapper::new();

        let t = mapper.apply(&snapshot(ControllerSide::Right, &[], 100));
        assert_eq!(t.to_press, vec![PadButton::RightPaddle]);

        // Axis back under threshold releases the paddle.
        let t = mapper.apply(&snapshot(ControllerSide::Right, &[], 99));
        assert_eq!(t.to_release, vec![PadButton::RightPaddle]);
        assert!(t.to_press.is_empty());
    }

    #[test]
    fn test_flush_releases_everything() {
        let mut mapper = InputEdgeMapper::new();
        mapper.apply(&snapshot(ControllerSide::Right, &[PadButton::Y], 100));

        let released = mapper.flush();
        assert_eq!(released, vec![PadButton::RightPaddle, PadButton::Y]);
        assert!(mapper.pressed().is_empty());

        // Second flush has nothing left.
        assert!(mapper.flush().is_empty());
    }

    #[test]
    fn test_default_key_maps() {
        let maps = KeyMaps::default();
        assert_eq!(
            maps.for_side(ControllerSide::Left).key_for(PadButton::Y),
            Some("up")
        );
        assert_eq!(
            maps.for_side(ControllerSide::Right).key_for(PadButton::Y),
            Some("x")
        );
        assert_eq!(
            maps.for_side(ControllerSide::Right)
                .key_for(PadButton::RightPaddle),
            Some("right")
        );
    }

    #[test]
    fn test_unmapped_button() {
        let map = KeyMap::new([(PadButton::Y, "up".to_string())]);
        assert_eq!(map.key_for(PadButton::B), None);
    }

    #[test]
    fn test_cadence_mapper_thresholds() {
        let mut mapper = CadenceKeyMapper::new(CadenceThresholds::default(), CadenceKeys::default());

        // Mid-range: nothing held.
        assert_eq!(mapper.apply(50.0), KeyTransitions::default());

        // Above upper: spin key.
        let t = mapper.apply(70.0);
        assert_eq!(t.to_press, vec!["a".to_string()]);
        assert!(t.to_release.is_empty());

        // Above boost: boost key joins, spin stays held.
        let t = mapper.apply(110.0);
        assert_eq!(t.to_press, vec!["up".to_string()]);
        assert!(t.to_release.is_empty());

        // Below lower: both released, brake pressed.
        let t = mapper.apply(20.0);
        assert_eq!(t.to_release, vec!["a".to_string(), "up".to_string()]);
        assert_eq!(t.to_press, vec!["b".to_string()]);
    }

    #[test]
    fn test_cadence_mapper_flush() {
        let mut mapper = CadenceKeyMapper::new(CadenceThresholds::default(), CadenceKeys::default());
        mapper.apply(120.0);
        assert_eq!(mapper.flush(), vec!["a".to_string(), "up".to_string()]);
        assert!(mapper.flush().is_empty());
    }
}
