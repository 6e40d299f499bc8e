//! Allocation domain models.
//!
//! Typed records for the three uploaded collections, the validation finding
//! record and the processed snapshot handed to the presentation layer.
//!
//! # Collections
//!
//! | Model | Key | Supplies / demands |
//! |-------|-----|--------------------|
//! | Client | `clientId` | requests tasks, carries priority |
//! | Worker | `workerId` | skills, `maxLoad` slots per available phase |
//! | Task | `taskId` | duration over preferred phases, required skills |

mod cell;
mod client;
pub mod fields;
mod phase;
mod priority;
mod processed;
mod task;
mod validation_error;
mod worker;

pub use cell::CellValue;
pub(crate) use cell::parse_integer;
pub use client::Client;
pub use fields::{EntityKind, FieldAccess};
pub use phase::{parse_phase_list, parse_slot_array, Duration, DurationUnit};
pub use priority::{Priority, PriorityLevel, MAX_PRIORITY, MIN_PRIORITY};
pub use processed::{ProcessedData, ValidationSummary};
pub use task::Task;
pub use validation_error::{ErrorCategory, ErrorType, Severity, ValidationError};
pub use worker::{normalize_skill, Worker};
