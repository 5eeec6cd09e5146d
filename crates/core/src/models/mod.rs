//! Data models for the retro board

mod action;
mod card;
mod group;
mod ids;
mod participant;
mod phase;

pub use action::*;
pub use card::*;
pub use group::*;
pub use ids::*;
pub use participant::*;
pub use phase::*;
