//! Import pipeline, completion cascade and tracking operations, each expressed as scoped units
//! of work over a [`Store`](crate::db::Store).

use chrono::{NaiveDateTime, Utc};

pub mod completion;
pub mod games;
pub mod import;
pub mod tracking;

/// Wall-clock timestamp in the store's `TIMESTAMP` representation
pub(crate) fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}
