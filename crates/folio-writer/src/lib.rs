//! Background book writing for Folio.
//!
//! - [`ledger`]: word-credit accounting every generation is charged through.
//! - [`driver`]: the chained scene-by-scene job, its worker and its sweep.
//! - [`continuation`]: how one step schedules the next.

pub mod continuation;
pub mod driver;
pub mod error;
pub mod ledger;
mod prompt;

pub use continuation::{Continuation, ContinuationQueue, ContinuationReceiver, continuation_queue};
pub use driver::{Driver, StartReceipt, StepOutcome};
pub use error::{Error, Result};
pub use ledger::{Consumption, Ledger};
