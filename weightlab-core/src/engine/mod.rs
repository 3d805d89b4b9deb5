//! Snapshot-to-daily expansion engine.
//!
//! Pure, sequential transformations over in-memory tables:
//!
//! 1. [`panel`]: raw closes → forward-filled price panel on the trading calendar
//! 2. [`segment`]: calendar → snapshot-bounded intervals per index
//! 3. [`drift`]: interval + snapshot weights + panel → renormalized drift weights
//! 4. [`expand`]: drives 2 and 3 across every index and snapshot
//! 5. [`merge`]: reconciles persisted snapshot history with newly fetched rows

pub mod drift;
pub mod expand;
pub mod merge;
pub mod panel;
pub mod segment;

pub use drift::{drift_weights, DriftGrid};
pub use expand::{expand, expand_to, ExpandOptions, WeightNormalization};
pub use merge::{fetch_window, refresh, refresh_by, FetchWindow, MergeOutcome};
pub use panel::PricePanel;
pub use segment::{segment, Interval};
