//! HTTP control surface for the courier dispatcher
//!
//! # Endpoints
//!
//! - **`POST /api/messaging/start`** / **`POST /api/messaging/stop`** - Start or
//!   stop automatic processing (idempotent)
//! - **`GET /api/messaging/status`** - Whether automatic processing is running
//! - **`POST /api/messaging/process`** - Run one batch now and report it
//! - **`GET /api/messages/sent`** - Delivered messages with cached delivery data
//! - **`GET /health`** and **`GET /version`**
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use courier_control::{ControlConfig, ControlServer, ControlState, VersionInfo};
//! use courier_delivery::{BatchProcessor, Scheduler};
//!
//! # async fn example(scheduler: Arc<Scheduler>, processor: Arc<BatchProcessor>) -> Result<(), Box<dyn std::error::Error>> {
//! let state = ControlState {
//!     controller: scheduler,
//!     sent: processor,
//!     version: VersionInfo::from_build(),
//! };
//! let server = ControlServer::new(&ControlConfig::default(), state).await?;
//!
//! // Run the control server
//! // server.serve(shutdown_receiver).await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod controller;
mod error;
mod handlers;
mod server;

pub use config::ControlConfig;
pub use controller::ProcessingController;
pub use error::ControlError;
pub use handlers::{ControlState, VersionInfo};
pub use server::{ControlServer, router};
