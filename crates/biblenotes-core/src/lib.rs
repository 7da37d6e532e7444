pub mod align;
pub mod api;
pub mod bus;
pub mod config;
pub mod model;
pub mod navigate;
pub mod pane;
pub mod reconcile;
pub mod reference;
pub mod store;

// Re-export main types for convenience
pub use align::AlignmentOverrides;
pub use api::ApiClient;
pub use bus::{Channel, Event, EventBus, HeightMap, PaneId, SelectionSource};
pub use config::Config;
pub use model::{ChapterData, Note, Verse, Version};
pub use navigate::{GotoRequest, NavEffect, NavigationController};
pub use pane::PaneView;
pub use reconcile::{Measurement, Reconciler, SyncTuning};
pub use reference::{parse_reference, Reference};
pub use store::{JsonFileStore, KvStore, MemoryStore, Preferences};
