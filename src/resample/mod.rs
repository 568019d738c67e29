//! Resampling, calendar alignment, market-hours snapping and event alignment.
pub mod align;
pub mod calendar;
pub mod event;
pub mod market;
pub mod policy;

pub use align::{align_common, align_series, align_to_dates};
pub use calendar::{calendar_dates, CalendarDates, Frequency};
pub use event::{align_event_before_after, event_windows, EventAlignment, EventWindow};
pub use market::{market_bucket, snap_to_market};
pub use policy::Resampler;
