//! Control-path selection for UI-interaction tool calls: given an intent like
//! "click this control", try the cheapest strategy expected to succeed
//! (structured accessibility action, then a known keyboard shortcut, then
//! screenshot + vision + coordinate click) and report which one carried it.

pub mod intent;
pub mod selector;
pub mod strategy;

pub use intent::{ControlPath, ElementQuery, UiIntent};
pub use selector::{AttemptFailure, ControlPathReport, ControlPathSelector, UiControlError};
pub use strategy::{
    AccessibilityBridge, AxElement, AxSnapshot, InputDriver, ScreenOracle, ScreenPoint,
    ShortcutChord, ShortcutRegistry, StrategyError, WindowServer,
};
