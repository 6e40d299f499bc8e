//! Allocation data cleaning for the U-Engine ecosystem.
//!
//! Validates client, worker and task sheets, scores their quality, and
//! applies declarative allocation rules. File parsing, presentation and
//! AI-assisted rule authoring live outside this crate; the core consumes
//! rows and rule objects and returns typed snapshots.
//!
//! # Modules
//!
//! - **`models`**: Domain types: `Client`, `Worker`, `Task`,
//!   `ValidationError`, `ProcessedData`
//! - **`rows`**: Raw rows and header-alias resolution
//! - **`validation`**: Structural and cross-reference checks
//! - **`quality`**: Row-level quality score
//! - **`pipeline`**: Rows → validated snapshot, and re-validation
//! - **`rules`**: Rule model, rule engine, allocation ordering
//! - **`corrections`**: Automatic repair of common findings
//! - **`service`**: Retry boundary for external rule generation
//! - **`config`**: TOML configuration
//!
//! # Example
//! ```
//! use serde_json::json;
//! use u_allocation::config::CoreConfig;
//! use u_allocation::pipeline::{process, DatasetInput};
//!
//! let input = DatasetInput::from_json(&json!({
//!     "clients": [{"ClientID": "C1", "ClientName": "Acme", "PriorityLevel": 3}],
//!     "workers": [],
//!     "tasks": [],
//! }))
//! .unwrap();
//! let data = process(&input, &CoreConfig::default());
//! assert_eq!(data.clients.len(), 1);
//! ```

pub mod config;
pub mod corrections;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod quality;
pub mod rows;
pub mod rules;
pub mod service;
pub mod validation;

pub use config::CoreConfig;
pub use error::{AllocationError, Result};
pub use pipeline::{process, DatasetInput};
