//! # Core Types
//!
//! This crate defines the fundamental types shared by every shell service.
//!
//! ## Philosophy
//!
//! - **Identity is explicit**: widgets are addressed by a stable, never-reused
//!   [`WidgetId`], never by display name.
//! - **Versions are typed**: the persisted schema version is a [`SchemaVersion`],
//!   not an ad-hoc string.
//! - **Time is injected**: timestamps come from a [`Clock`], not ambient calls.
//!
//! ## Key Types
//!
//! - [`WidgetId`] / [`WidgetIdAllocator`]: widget identity
//! - [`ContainerId`] / [`ElementId`]: focus history addressing
//! - [`SchemaVersion`] / [`MigrationLineage`]: snapshot schema evolution
//! - [`StateMap`]: serialized widget state

pub mod clock;
pub mod ids;
pub mod schema;
pub mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use ids::{ContainerId, ElementId, WidgetId, WidgetIdAllocator};
pub use schema::{MigrationLineage, SchemaVersion, SchemaVersionError};
pub use state::{
    is_reserved_key, widget_id_of, widget_type_of, StateMap, WIDGET_ID_KEY, WIDGET_TYPE_KEY,
};
